//! Chunked transfer engine
//!
//! Large files go to the backend through a three-phase upload session:
//!
//!    (1)  Start: open a session by uploading the first chunk
//!    (2) Append: upload further chunks against the session cursor
//!    (3) Finish: upload the remaining bytes and commit to the destination
//!
//! The number of bytes uploaded so far decides which phase an attempt is
//! in, so a retry resumes where the session left off instead of starting
//! over. One shared attempt budget covers the whole transfer. Transient
//! failures retry the same phase, backoff requests sleep first, and offset
//! corrections move the cursor to wherever the backend says its durable
//! bytes end, backward or forward, before retrying. The backend is the
//! source of truth for session progress.

use crate::error::{Error, Result};
use crate::remote::{CommitInfo, RemoteError, RemoteStore, SessionId};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, warn};

/// Size of one chunk of a chunked upload (8 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Attempt budget shared across all phases of one chunked transfer
pub const MAX_TRANSFER_ATTEMPTS: u32 = 5;

/// Failure of a single transfer attempt.
///
/// Remote failures feed the retry policy; local file errors abort the
/// transfer outright since no retry can repair the source file.
enum AttemptError {
    Remote(RemoteError),
    Local(std::io::Error),
}

impl From<RemoteError> for AttemptError {
    fn from(err: RemoteError) -> Self {
        AttemptError::Remote(err)
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(err: std::io::Error) -> Self {
        AttemptError::Local(err)
    }
}

/// Uploads `source` to the backend as a chunked session committed with
/// `commit`.
///
/// `total_size` is fixed for the whole transfer; the source file must not
/// change underneath it. Chunks are re-read from disk on every attempt so
/// an offset correction always resends exactly the bytes the backend is
/// missing. `chunk_size` must be positive; the append loop makes no
/// progress on zero-length chunks. [`crate::Settings::from_json`] enforces
/// this for configured overrides.
pub async fn upload_chunked(
    remote: &dyn RemoteStore,
    source: &Path,
    total_size: u64,
    chunk_size: u64,
    commit: &CommitInfo,
) -> Result<()> {
    let mut session: Option<SessionId> = None;
    let mut uploaded: u64 = 0;
    let mut last_error = String::new();

    for attempt in 1..=MAX_TRANSFER_ATTEMPTS {
        let outcome = run_attempt(
            remote,
            source,
            total_size,
            chunk_size,
            commit,
            &mut session,
            &mut uploaded,
        )
        .await;

        match outcome {
            Ok(()) => {
                debug!(
                    "Chunked upload of {} committed after {} attempt(s)",
                    commit.path, attempt
                );
                return Ok(());
            }
            Err(AttemptError::Local(err)) => {
                error!("Cannot read {} at offset {}: {}", source.display(), uploaded, err);
                return Err(Error::Io(err));
            }
            Err(AttemptError::Remote(RemoteError::Transient(msg))) => {
                warn!(
                    "Transient failure at offset {} (attempt {}/{}): {}",
                    uploaded, attempt, MAX_TRANSFER_ATTEMPTS, msg
                );
                last_error = msg;
            }
            Err(AttemptError::Remote(RemoteError::Backoff { delay })) => {
                warn!(
                    "Backend requested {}ms backoff (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    MAX_TRANSFER_ATTEMPTS
                );
                last_error = format!("backoff of {}ms requested", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
            Err(AttemptError::Remote(RemoteError::IncorrectOffset { correct_offset })) => {
                warn!(
                    "Session cursor corrected from {} to {} (attempt {}/{})",
                    uploaded, correct_offset, attempt, MAX_TRANSFER_ATTEMPTS
                );
                last_error = format!("offset corrected to {}", correct_offset);
                uploaded = correct_offset;
            }
            Err(AttemptError::Remote(err @ RemoteError::Application(_))) => {
                error!("Chunked upload of {} failed permanently: {}", commit.path, err);
                return Err(err.into());
            }
        }
    }

    error!(
        "Chunked upload of {} abandoned after {} attempts: {}",
        commit.path, MAX_TRANSFER_ATTEMPTS, last_error
    );
    Err(Error::AttemptsExhausted {
        attempts: MAX_TRANSFER_ATTEMPTS,
        last_error,
    })
}

/// Drives one attempt from the current cursor to commit.
///
/// `session` and `uploaded` persist across attempts: every successful RPC
/// advances the cursor immediately, so a failure later in the attempt does
/// not forfeit the progress made before it.
async fn run_attempt(
    remote: &dyn RemoteStore,
    source: &Path,
    total_size: u64,
    chunk_size: u64,
    commit: &CommitInfo,
    session: &mut Option<SessionId>,
    uploaded: &mut u64,
) -> std::result::Result<(), AttemptError> {
    let mut file = File::open(source).await?;
    file.seek(SeekFrom::Start(*uploaded)).await?;

    // (1) Start
    let id = match session.as_ref() {
        Some(id) => id.clone(),
        None => {
            let first = chunk_size.min(total_size);
            let chunk = read_chunk(&mut file, first).await?;
            let id = remote.session_start(chunk).await?;
            debug!("Upload session {} started with {} bytes", id, first);
            *session = Some(id.clone());
            *uploaded += first;
            id
        }
    };

    // (2) Append
    while total_size.saturating_sub(*uploaded) > chunk_size {
        let chunk = read_chunk(&mut file, chunk_size).await?;
        remote.session_append(&id, *uploaded, chunk).await?;
        *uploaded += chunk_size;
        debug!("Session {} cursor advanced to {}", id, *uploaded);
    }

    // (3) Finish
    let remaining = total_size.saturating_sub(*uploaded);
    let tail = read_chunk(&mut file, remaining).await?;
    debug!(
        "Finishing session {} with {} bytes at offset {} into {}",
        id, remaining, *uploaded, commit.path
    );
    remote.session_finish(&id, *uploaded, tail, commit).await?;
    *uploaded = total_size;

    Ok(())
}

/// Uploads `source` in a single call, for files at or below the chunking
/// threshold.
pub async fn upload_single_shot(
    remote: &dyn RemoteStore,
    source: &Path,
    commit: &CommitInfo,
) -> Result<()> {
    let bytes = tokio::fs::read(source).await?;
    debug!(
        "Uploading {} bytes to {} in a single call",
        bytes.len(),
        commit.path
    );
    remote.upload(commit, Bytes::from(bytes)).await?;
    Ok(())
}

async fn read_chunk(file: &mut File, len: u64) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
