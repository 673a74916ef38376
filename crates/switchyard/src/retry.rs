use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use switchyard_backend::BackendError;

/// Run `operation` once per entry in `retry_delays_secs`, sleeping for the
/// entry first. Only retryable failures get another attempt.
pub async fn retry_with_delays<T, Op, Fut>(
    operation_name: &str,
    retry_delays_secs: &[u64],
    mut operation: Op,
) -> Result<T, BackendError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = retry_delays_secs.len().max(1);
    let mut attempt = 0;

    loop {
        let delay_secs = retry_delays_secs.get(attempt).copied().unwrap_or(0);
        if delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                warn!(
                    "{operation_name} attempt {} failed, retrying: {error}",
                    attempt + 1
                );
            }
            Err(error) => {
                debug!("{operation_name} gave up after {} attempt(s)", attempt + 1);
                return Err(error);
            }
        }
        attempt += 1;
    }
}
