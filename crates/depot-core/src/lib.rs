//! depot - provider-backed remote file storage library
//!
//! This library stores, retrieves and removes files on a remote
//! object-storage backend addressed by logical paths. Small files upload
//! in one call; large files go through a resumable chunked session with
//! retry, backoff and offset-correction handling.

pub mod error;
pub mod path;
pub mod remote;
pub mod settings;
pub mod storage;
pub mod upload;

mod runtime;

pub use error::{Error, Result};

// Re-export commonly used types
pub use path::{normalize, split_leaf, validate_path, RemotePath};
pub use remote::{CommitInfo, RemoteError, RemoteResult, RemoteStore, SessionId, WriteMode};
pub use settings::{Provider, Settings};
pub use storage::{Storage, StorageData};
pub use upload::{DEFAULT_CHUNK_SIZE, MAX_TRANSFER_ATTEMPTS};
