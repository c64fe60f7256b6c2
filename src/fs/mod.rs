pub mod backend;
pub mod local;
pub mod path;
pub mod remote;
pub mod types;

pub use backend::{LocalStorage, RemoteStorage};
pub use local::LocalStore;
pub use remote::OpendalRemote;
pub use types::*;

/// Result type of the storage seams.
pub type Result<T> = std::result::Result<T, crate::error::StorageError>;
