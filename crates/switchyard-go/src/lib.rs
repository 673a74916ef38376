mod backend;
mod index;
mod runtime;

pub use backend::GoBackend;
pub use index::{GoFile, GoRelease, checksum_for, parse_releases, remote_versions};
pub use runtime::{DEFAULT_DOWNLOAD_BASE, DEFAULT_INDEX_URL, GoRuntime};
