mod backend;
mod index;
mod runtime;

pub use backend::NodeBackend;
pub use index::{NodeRelease, parse_releases, remote_versions};
pub use runtime::{DEFAULT_DIST_MIRROR, NodeRuntime};
