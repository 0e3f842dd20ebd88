//! Scriptable in-memory backend
//!
//! [`FakeRemote`] implements the whole remote capability against in-process
//! state and records every call it receives. Session faults can be scripted
//! per call to exercise retry handling. The fake's durable byte counts are
//! authoritative: an append or finish at any other offset earns an offset
//! correction pointing at the bytes the fake actually holds, so scripted
//! partial failures produce exactly the corrections a real backend would.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use depot_core::path::RemotePath;
use depot_core::remote::{
    CommitInfo, RemoteError, RemoteResult, RemoteStore, SessionId, WriteMode,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded backend call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    SessionStart { len: u64 },
    SessionAppend { offset: u64, len: u64 },
    SessionFinish { offset: u64, len: u64, path: String },
    Upload { path: String, len: u64 },
    Delete { path: String },
    CreateFolder { path: String },
    Download { path: String },
}

/// A failure to inject into a session call that would otherwise succeed.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail without applying any bytes
    Transient,
    /// Apply the bytes, then fail anyway; the client's next call at its
    /// stale offset earns a forward offset correction
    TransientAfterApply,
    /// Ask the client to back off for the given delay, applying nothing
    Backoff(Duration),
    /// Drop durable session bytes down to the given length, then fail;
    /// the client's next call earns a backward offset correction
    RollbackTo(u64),
    /// Fail terminally with an application error
    Application(String),
}

#[derive(Debug)]
struct StoredObject {
    bytes: Bytes,
    last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SessionState {
    durable: Vec<u8>,
}

#[derive(Default)]
struct RemoteState {
    objects: HashMap<String, StoredObject>,
    folders: HashSet<String>,
    sessions: HashMap<String, SessionState>,
    calls: Vec<RemoteCall>,
    /// Scripted faults keyed by session-call ordinal (1-based, counting
    /// start, append and finish calls together)
    session_faults: HashMap<usize, Fault>,
    op_faults: VecDeque<Fault>,
    session_seq: usize,
    next_session: u64,
    always_transient: bool,
}

/// In-memory implementation of the remote capability for tests.
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            state: Mutex::new(RemoteState::default()),
        }
    }

    /// A backend where every call fails with a transient error, for
    /// exercising attempt exhaustion.
    pub fn always_transient() -> Self {
        let remote = Self::new();
        remote.lock().always_transient = true;
        remote
    }

    /// Scripts `fault` to fire on the `seq`-th session call (1-based,
    /// counting start, append and finish calls together). Faults fire only
    /// on calls that would otherwise succeed; offset corrections derived
    /// from durable state take precedence.
    pub fn fail_session_call(&self, seq: usize, fault: Fault) {
        self.lock().session_faults.insert(seq, fault);
    }

    /// Queues `fault` against the next single-shot operation (upload,
    /// delete, create_folder or download).
    pub fn push_op_fault(&self, fault: Fault) {
        self.lock().op_faults.push_back(fault);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Bytes of the committed object at `path`, if any.
    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.lock().objects.get(path).map(|o| o.bytes.clone())
    }

    /// Last-modified timestamp recorded for the object at `path`.
    pub fn object_mtime(&self, path: &str) -> Option<DateTime<Utc>> {
        self.lock().objects.get(path).and_then(|o| o.last_modified)
    }

    /// Whether a folder exists at `path`.
    pub fn has_folder(&self, path: &str) -> bool {
        self.lock().folders.contains(path)
    }

    /// Paths of all committed objects, sorted.
    pub fn objects(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().expect("fake remote state poisoned")
    }
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteState {
    fn next_session_fault(&mut self) -> Option<Fault> {
        self.session_seq += 1;
        self.session_faults.remove(&self.session_seq)
    }

    fn commit_object(&mut self, commit: &CommitInfo, bytes: Bytes) -> RemoteResult<()> {
        let key = commit.path.as_str().to_string();
        if commit.mode == WriteMode::Add && self.objects.contains_key(&key) {
            return Err(RemoteError::Application(format!(
                "path already exists: {}",
                key
            )));
        }
        self.objects.insert(
            key,
            StoredObject {
                bytes,
                last_modified: commit.last_modified,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn session_start(&self, chunk: Bytes) -> RemoteResult<SessionId> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::SessionStart {
            len: chunk.len() as u64,
        });

        if state.always_transient {
            state.session_seq += 1;
            return Err(RemoteError::Transient("connection reset".to_string()));
        }

        match state.next_session_fault() {
            None => {}
            Some(Fault::Transient) | Some(Fault::RollbackTo(_)) => {
                return Err(RemoteError::Transient("connection reset".to_string()));
            }
            Some(Fault::TransientAfterApply) => {
                // The session comes into being but the client never learns
                // its id, as when the response is lost on the wire
                state.next_session += 1;
                let id = format!("fake-session-{}", state.next_session);
                state.sessions.insert(
                    id,
                    SessionState {
                        durable: chunk.to_vec(),
                    },
                );
                return Err(RemoteError::Transient("response lost".to_string()));
            }
            Some(Fault::Backoff(delay)) => {
                return Err(RemoteError::Backoff { delay });
            }
            Some(Fault::Application(msg)) => {
                return Err(RemoteError::Application(msg));
            }
        }

        state.next_session += 1;
        let id = format!("fake-session-{}", state.next_session);
        state.sessions.insert(
            id.clone(),
            SessionState {
                durable: chunk.to_vec(),
            },
        );
        Ok(SessionId::new(id))
    }

    async fn session_append(
        &self,
        session: &SessionId,
        offset: u64,
        chunk: Bytes,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::SessionAppend {
            offset,
            len: chunk.len() as u64,
        });

        if state.always_transient {
            state.session_seq += 1;
            return Err(RemoteError::Transient("connection reset".to_string()));
        }

        let durable_len = match state.sessions.get(session.as_str()) {
            Some(s) => s.durable.len() as u64,
            None => {
                state.session_seq += 1;
                return Err(RemoteError::Application(format!(
                    "unknown upload session: {}",
                    session
                )));
            }
        };
        if offset != durable_len {
            state.session_seq += 1;
            return Err(RemoteError::IncorrectOffset {
                correct_offset: durable_len,
            });
        }

        let fault = state.next_session_fault();
        let session_state = state
            .sessions
            .get_mut(session.as_str())
            .expect("session checked above");
        match fault {
            None => {
                session_state.durable.extend_from_slice(&chunk);
                Ok(())
            }
            Some(Fault::Transient) => {
                Err(RemoteError::Transient("connection reset".to_string()))
            }
            Some(Fault::TransientAfterApply) => {
                session_state.durable.extend_from_slice(&chunk);
                Err(RemoteError::Transient("response lost".to_string()))
            }
            Some(Fault::Backoff(delay)) => Err(RemoteError::Backoff { delay }),
            Some(Fault::RollbackTo(len)) => {
                session_state.durable.truncate(len as usize);
                Err(RemoteError::Transient("write partially lost".to_string()))
            }
            Some(Fault::Application(msg)) => Err(RemoteError::Application(msg)),
        }
    }

    async fn session_finish(
        &self,
        session: &SessionId,
        offset: u64,
        tail: Bytes,
        commit: &CommitInfo,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::SessionFinish {
            offset,
            len: tail.len() as u64,
            path: commit.path.as_str().to_string(),
        });

        if state.always_transient {
            state.session_seq += 1;
            return Err(RemoteError::Transient("connection reset".to_string()));
        }

        let durable_len = match state.sessions.get(session.as_str()) {
            Some(s) => s.durable.len() as u64,
            None => {
                state.session_seq += 1;
                return Err(RemoteError::Application(format!(
                    "unknown upload session: {}",
                    session
                )));
            }
        };
        if offset != durable_len {
            state.session_seq += 1;
            return Err(RemoteError::IncorrectOffset {
                correct_offset: durable_len,
            });
        }

        match state.next_session_fault() {
            None => {}
            Some(Fault::Transient) => {
                return Err(RemoteError::Transient("connection reset".to_string()));
            }
            Some(Fault::TransientAfterApply) => {
                let session_state = state
                    .sessions
                    .get_mut(session.as_str())
                    .expect("session checked above");
                session_state.durable.extend_from_slice(&tail);
                return Err(RemoteError::Transient("response lost".to_string()));
            }
            Some(Fault::Backoff(delay)) => {
                return Err(RemoteError::Backoff { delay });
            }
            Some(Fault::RollbackTo(len)) => {
                let session_state = state
                    .sessions
                    .get_mut(session.as_str())
                    .expect("session checked above");
                session_state.durable.truncate(len as usize);
                return Err(RemoteError::Transient("write partially lost".to_string()));
            }
            Some(Fault::Application(msg)) => {
                return Err(RemoteError::Application(msg));
            }
        }

        let mut session_state = state
            .sessions
            .remove(session.as_str())
            .expect("session checked above");
        session_state.durable.extend_from_slice(&tail);
        state.commit_object(commit, Bytes::from(session_state.durable))
    }

    async fn upload(&self, commit: &CommitInfo, bytes: Bytes) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Upload {
            path: commit.path.as_str().to_string(),
            len: bytes.len() as u64,
        });

        if state.always_transient {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        if let Some(fault) = state.op_faults.pop_front() {
            return Err(op_fault_error(fault));
        }

        state.commit_object(commit, bytes)
    }

    async fn delete(&self, path: &RemotePath) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Delete {
            path: path.as_str().to_string(),
        });

        if state.always_transient {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        if let Some(fault) = state.op_faults.pop_front() {
            return Err(op_fault_error(fault));
        }

        let key = path.as_str();
        let prefix = format!("{}/", key);
        let mut existed = state.objects.remove(key).is_some();

        let children: Vec<String> = state
            .objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for child in children {
            state.objects.remove(&child);
            existed = true;
        }

        existed |= state.folders.remove(key);
        let subfolders: Vec<String> = state
            .folders
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .cloned()
            .collect();
        for folder in subfolders {
            state.folders.remove(&folder);
            existed = true;
        }

        if !existed {
            return Err(RemoteError::Application(format!("path not found: {}", key)));
        }
        Ok(())
    }

    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::CreateFolder {
            path: path.as_str().to_string(),
        });

        if state.always_transient {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        if let Some(fault) = state.op_faults.pop_front() {
            return Err(op_fault_error(fault));
        }

        if !state.folders.insert(path.as_str().to_string()) {
            return Err(RemoteError::Application(format!(
                "folder already exists: {}",
                path
            )));
        }
        Ok(())
    }

    async fn download(&self, path: &RemotePath) -> RemoteResult<Bytes> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Download {
            path: path.as_str().to_string(),
        });

        if state.always_transient {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        if let Some(fault) = state.op_faults.pop_front() {
            return Err(op_fault_error(fault));
        }

        state
            .objects
            .get(path.as_str())
            .map(|o| o.bytes.clone())
            .ok_or_else(|| RemoteError::Application(format!("path not found: {}", path)))
    }
}

fn op_fault_error(fault: Fault) -> RemoteError {
    match fault {
        Fault::Transient | Fault::TransientAfterApply | Fault::RollbackTo(_) => {
            RemoteError::Transient("connection reset".to_string())
        }
        Fault::Backoff(delay) => RemoteError::Backoff { delay },
        Fault::Application(msg) => RemoteError::Application(msg),
    }
}
