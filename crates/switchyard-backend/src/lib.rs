mod error;
mod registry;
mod traits;
mod types;

pub use error::{BackendError, ErrorKind, NetworkStage};
pub use registry::{RegistryBuilder, RuntimeRegistry};
pub use traits::{VersionManager, VersionManagerClone};
pub use types::{
    InstallPhase, InstallProgress, InstalledVersion, RemoteVersion, VersionTag, VersionTagError,
};
