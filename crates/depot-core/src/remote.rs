//! Remote capability contract
//!
//! Everything depot knows about a storage backend fits in the
//! [`RemoteStore`] trait: three session primitives for resumable chunked
//! uploads plus single-shot upload, delete, folder creation and download.
//! Backends live in separate crates (see `depot-cloud`) and are plugged in
//! at construction time as `Arc<dyn RemoteStore>`.

use crate::error::Error;
use crate::path::RemotePath;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a backend may fail, classified for the transfer engine's retry
/// policy.
///
/// `Transient` and `Backoff` are recoverable within a chunked session:
/// the engine retries the same phase, sleeping first for `Backoff`.
/// `IncorrectOffset` carries the backend's authoritative byte cursor and is
/// corrected locally before retrying. `Application` is always terminal.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connectivity or timeout class failure, worth retrying as-is
    #[error("transient network failure: {0}")]
    Transient(String),

    /// Backend asked us to slow down before retrying
    #[error("backend requested a {}ms backoff", delay.as_millis())]
    Backoff { delay: Duration },

    /// The session cursor disagrees with what the backend has durably
    /// received; `correct_offset` is the backend's truth
    #[error("session offset mismatch, correct offset is {correct_offset}")]
    IncorrectOffset { correct_offset: u64 },

    /// Any other backend-reported error (permissions, conflicts, quota)
    #[error("{0}")]
    Application(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(err.to_string())
    }
}

/// Opaque identifier of an in-flight upload session, assigned by the
/// backend on session start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to do when the destination path already holds an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the destination already exists
    Add,
    /// Replace whatever is at the destination
    Overwrite,
}

/// Destination and metadata for committing an upload.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub path: RemotePath,
    pub mode: WriteMode,
    /// Source file mtime; backends that cannot store it may drop it
    pub last_modified: Option<DateTime<Utc>>,
}

impl CommitInfo {
    pub fn new(path: RemotePath, mode: WriteMode) -> Self {
        CommitInfo {
            path,
            mode,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.last_modified = Some(ts);
        self
    }
}

/// The capability a storage backend must provide.
///
/// Implementations must be safe for concurrent use: independent transfers
/// share one handle. A session is only ever driven by one transfer at a
/// time, in strictly increasing offset order.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Opens an upload session with its first chunk and returns the
    /// backend-assigned session id.
    async fn session_start(&self, chunk: Bytes) -> RemoteResult<SessionId>;

    /// Appends a chunk at `offset`, which must equal the number of bytes
    /// the backend has durably received for this session.
    async fn session_append(
        &self,
        session: &SessionId,
        offset: u64,
        chunk: Bytes,
    ) -> RemoteResult<()>;

    /// Uploads the final bytes and commits the session to its destination.
    async fn session_finish(
        &self,
        session: &SessionId,
        offset: u64,
        tail: Bytes,
        commit: &CommitInfo,
    ) -> RemoteResult<()>;

    /// Uploads a whole object in one call.
    async fn upload(&self, commit: &CommitInfo, bytes: Bytes) -> RemoteResult<()>;

    /// Deletes the object or folder at `path`, including folder contents.
    async fn delete(&self, path: &RemotePath) -> RemoteResult<()>;

    /// Creates an empty folder at `path`.
    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<()>;

    /// Downloads the object at `path`.
    async fn download(&self, path: &RemotePath) -> RemoteResult<Bytes>;
}
