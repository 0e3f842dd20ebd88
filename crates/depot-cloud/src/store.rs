//! Object store adapter
//!
//! [`ObjectStoreRemote`] implements the depot remote capability on top of
//! any [`object_store::ObjectStore`]. The session protocol only learns its
//! destination at finish time, while object stores bind the target path
//! when a multipart upload opens, so each session uploads to a staging key
//! and the finish step moves the completed object into place.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::path::RemotePath;
use depot_core::remote::{
    CommitInfo, RemoteError, RemoteResult, RemoteStore, SessionId, WriteMode,
};
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutMode, PutOptions, PutPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix under which in-flight session uploads are staged
const STAGING_PREFIX: &str = ".depot/sessions";

struct StagedSession {
    staging: ObjectPath,
    upload: Box<dyn MultipartUpload>,
    /// Bytes durably accepted into this session
    accepted: u64,
    /// Set once the multipart upload completes; a finish retried after a
    /// failed move skips straight to the move
    completed: bool,
}

/// Remote capability backed by an [`ObjectStore`].
///
/// The outer map lock is held only to look sessions up; each session has
/// its own async lock held across its backend calls, so independent
/// transfers never serialize on each other.
pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<StagedSession>>>>,
}

impl ObjectStoreRemote {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        ObjectStoreRemote {
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, id: &SessionId) -> RemoteResult<Arc<AsyncMutex<StagedSession>>> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| {
                RemoteError::Application(format!("unknown upload session: {}", id))
            })
    }

    fn forget_session(&self, id: &SessionId) {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .remove(id.as_str());
    }

    /// Classifies a staged-upload failure. Transient failures leave the
    /// session in place for the caller to retry; application failures are
    /// terminal, so the session and its staged parts are released. Failures
    /// of the final move do not come through here: a completed staged
    /// object stays movable by a retried finish.
    async fn fail_staged(
        &self,
        id: &SessionId,
        staged: &mut StagedSession,
        err: object_store::Error,
    ) -> RemoteError {
        let classified = classify(err);
        if matches!(classified, RemoteError::Application(_)) {
            if let Err(abort_err) = staged.upload.abort().await {
                warn!(
                    "Could not abort staging upload {}: {}",
                    staged.staging, abort_err
                );
            }
            self.forget_session(id);
            debug!("Session {} discarded after terminal failure", id);
        }
        classified
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn session_start(&self, chunk: Bytes) -> RemoteResult<SessionId> {
        let id = Uuid::new_v4().to_string();
        let staging = ObjectPath::from(format!("{}/{}", STAGING_PREFIX, id));

        let mut upload = self.store.put_multipart(&staging).await.map_err(classify)?;
        let len = chunk.len() as u64;
        if let Err(err) = upload.put_part(chunk.into()).await {
            // The caller never learns this session's id, so nothing can
            // resume the staging upload; release it with the failure
            if let Err(abort_err) = upload.abort().await {
                warn!("Could not abort staging upload {}: {}", staging, abort_err);
            }
            return Err(classify(err));
        }
        debug!("Session {} staged at {} with {} bytes", id, staging, len);

        let session = StagedSession {
            staging,
            upload,
            accepted: len,
            completed: false,
        };
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(id.clone(), Arc::new(AsyncMutex::new(session)));

        Ok(SessionId::new(id))
    }

    async fn session_append(
        &self,
        session: &SessionId,
        offset: u64,
        chunk: Bytes,
    ) -> RemoteResult<()> {
        let entry = self.session(session)?;
        let mut staged = entry.lock().await;

        if offset != staged.accepted {
            return Err(RemoteError::IncorrectOffset {
                correct_offset: staged.accepted,
            });
        }

        let len = chunk.len() as u64;
        if let Err(err) = staged.upload.put_part(chunk.into()).await {
            return Err(self.fail_staged(session, &mut staged, err).await);
        }
        staged.accepted += len;
        Ok(())
    }

    async fn session_finish(
        &self,
        session: &SessionId,
        offset: u64,
        tail: Bytes,
        commit: &CommitInfo,
    ) -> RemoteResult<()> {
        let entry = self.session(session)?;
        let mut staged = entry.lock().await;

        if offset != staged.accepted {
            return Err(RemoteError::IncorrectOffset {
                correct_offset: staged.accepted,
            });
        }

        if !staged.completed {
            if !tail.is_empty() {
                let len = tail.len() as u64;
                if let Err(err) = staged.upload.put_part(tail.into()).await {
                    return Err(self.fail_staged(session, &mut staged, err).await);
                }
                staged.accepted += len;
            }
            if let Err(err) = staged.upload.complete().await {
                return Err(self.fail_staged(session, &mut staged, err).await);
            }
            staged.completed = true;
        }

        if let Some(ts) = commit.last_modified {
            // Object stores keep their own modification times
            debug!("Dropping client-modified timestamp {} for {}", ts, commit.path);
        }

        let destination = as_object_path(&commit.path);
        match commit.mode {
            WriteMode::Add => self
                .store
                .rename_if_not_exists(&staged.staging, &destination)
                .await
                .map_err(classify)?,
            WriteMode::Overwrite => self
                .store
                .rename(&staged.staging, &destination)
                .await
                .map_err(classify)?,
        }
        debug!("Session {} committed to {}", session, destination);

        drop(staged);
        self.forget_session(session);
        Ok(())
    }

    async fn upload(&self, commit: &CommitInfo, bytes: Bytes) -> RemoteResult<()> {
        let destination = as_object_path(&commit.path);
        if let Some(ts) = commit.last_modified {
            debug!("Dropping client-modified timestamp {} for {}", ts, commit.path);
        }

        match commit.mode {
            WriteMode::Overwrite => {
                self.store
                    .put(&destination, bytes.into())
                    .await
                    .map_err(classify)?;
            }
            WriteMode::Add => {
                let opts = PutOptions {
                    mode: PutMode::Create,
                    ..Default::default()
                };
                self.store
                    .put_opts(&destination, bytes.into(), opts)
                    .await
                    .map_err(classify)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &RemotePath) -> RemoteResult<()> {
        let key = as_object_path(path);
        let mut existed = false;

        match self.store.delete(&key).await {
            Ok(()) => existed = true,
            Err(object_store::Error::NotFound { .. }) => {}
            Err(err) => return Err(classify(err)),
        }

        let children: Vec<_> = self
            .store
            .list(Some(&key))
            .try_collect()
            .await
            .map_err(classify)?;
        for meta in children {
            match self.store.delete(&meta.location).await {
                Ok(()) => existed = true,
                Err(object_store::Error::NotFound { .. }) => {}
                Err(err) => return Err(classify(err)),
            }
        }

        if !existed {
            return Err(RemoteError::Application(format!("path not found: {}", path)));
        }
        debug!("Deleted {}", path);
        Ok(())
    }

    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<()> {
        let key = as_object_path(path);
        // Object stores have no real folders; a zero-byte marker stands in
        self.store
            .put(&key, PutPayload::from(Bytes::new()))
            .await
            .map_err(classify)?;
        debug!("Created folder marker {}", key);
        Ok(())
    }

    async fn download(&self, path: &RemotePath) -> RemoteResult<Bytes> {
        let key = as_object_path(path);
        let result = self.store.get(&key).await.map_err(classify)?;
        let bytes = result.bytes().await.map_err(classify)?;
        debug!("Downloaded {} bytes from {}", bytes.len(), path);
        Ok(bytes)
    }
}

fn as_object_path(path: &RemotePath) -> ObjectPath {
    ObjectPath::from(path.as_str().trim_start_matches('/'))
}

/// Maps backend errors onto the retry classification. The catch-all
/// `Generic` variant is where transport and connectivity failures land, so
/// it classifies as transient; everything else is an application error.
fn classify(err: object_store::Error) -> RemoteError {
    match err {
        object_store::Error::Generic { .. } => RemoteError::Transient(err.to_string()),
        other => RemoteError::Application(other.to_string()),
    }
}
