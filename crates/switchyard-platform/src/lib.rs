mod env_store;
mod path_editor;
mod paths;

pub use env_store::{EnvStoreError, EnvironmentStore, FileStore, MemoryStore};
pub use path_editor::{
    PATH_SEPARATOR, PathChange, PathEdit, PathEditError, PathEditor, PathSignature,
};
pub use paths::{AppPaths, AppPathsError};

#[cfg(windows)]
pub use env_store::RegistryStore;
