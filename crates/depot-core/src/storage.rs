//! Storage facade
//!
//! [`Storage`] exposes path-level operations against a remote backend:
//! store, remove, folder creation and removal, retrieval into the local
//! tmp directory, plus tmp cleanup and a whole-root wipe. Every call is
//! blocking; the async backend work runs on the shared runtime. Structural
//! problems with the arguments are rejected before any network call.

use crate::error::{Error, Result};
use crate::path::{normalize, split_leaf, validate_path, RemotePath};
use crate::remote::{CommitInfo, RemoteStore, WriteMode};
use crate::runtime::get_runtime;
use crate::settings::Settings;
use crate::upload::{upload_chunked, upload_single_shot};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a successful store or folder creation.
#[derive(Debug, Clone)]
pub struct StorageData {
    /// Leaf name of the stored object
    pub name: String,
    /// Where the object landed on the backend
    pub remote_path: RemotePath,
    /// Bytes transferred; zero for folders
    pub size: u64,
}

/// Blocking storage operations over a remote backend.
///
/// The backend handle is shared; independent operations may run from
/// multiple threads concurrently. Each chunked upload owns its session
/// privately, so no cross-call state exists beyond the handle itself.
pub struct Storage {
    remote: Arc<dyn RemoteStore>,
    settings: Settings,
}

impl Storage {
    pub fn new(remote: Arc<dyn RemoteStore>, settings: Settings) -> Self {
        Storage { remote, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stores a local file under `target_folder` on the backend, named
    /// after its local leaf name.
    ///
    /// `None` or an empty folder stores directly under the root. Files at
    /// or below twice the chunk size go up in a single call and replace
    /// any existing object; larger files go through a chunked session.
    pub fn store_file(&self, source: &Path, target_folder: Option<&str>) -> Result<StorageData> {
        let folder = target_folder.unwrap_or("");
        validate_path(folder)?;

        let metadata = std::fs::metadata(source)?;
        if metadata.is_dir() {
            return Err(Error::IsADirectory(source.to_path_buf()));
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidPath(format!("Source has no file name: {}", source.display()))
            })?;

        let destination = normalize(folder, &self.settings.root).join(&name);
        let size = metadata.len();
        let last_modified: Option<DateTime<Utc>> = metadata.modified().ok().map(DateTime::from);
        let chunk_size = self.settings.chunk_size();

        let runtime = get_runtime();
        if size <= chunk_size.saturating_mul(2) {
            debug!(
                "Storing {} ({} bytes) to {} in a single call",
                source.display(),
                size,
                destination
            );
            let mut commit = CommitInfo::new(destination.clone(), WriteMode::Overwrite);
            if let Some(ts) = last_modified {
                commit = commit.with_last_modified(ts);
            }
            runtime.block_on(upload_single_shot(self.remote.as_ref(), source, &commit))?;
        } else {
            debug!(
                "Storing {} ({} bytes) to {} in {} byte chunks",
                source.display(),
                size,
                destination,
                chunk_size
            );
            let mut commit = CommitInfo::new(destination.clone(), WriteMode::Add);
            if let Some(ts) = last_modified {
                commit = commit.with_last_modified(ts);
            }
            runtime.block_on(upload_chunked(
                self.remote.as_ref(),
                source,
                size,
                chunk_size,
                &commit,
            ))?;
        }

        Ok(StorageData {
            name,
            remote_path: destination,
            size,
        })
    }

    /// Removes the file at the given logical path.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        validate_path(path)?;

        let (parent, leaf) = split_leaf(path);
        if leaf.is_empty() {
            return Err(Error::InvalidPath(format!(
                "Path does not name a file: {:?}",
                path
            )));
        }

        let target = normalize(&parent, &self.settings.root).join(&leaf);
        debug!("Removing {}", target);

        let runtime = get_runtime();
        runtime.block_on(self.remote.delete(&target))?;
        Ok(())
    }

    /// Creates a folder at the given logical path.
    pub fn create_folder(&self, path: &str) -> Result<StorageData> {
        validate_path(path)?;

        if path.trim().is_empty() {
            return Err(Error::InvalidPath(
                "The path shouldn't be empty".to_string(),
            ));
        }

        let target = normalize(path, &self.settings.root);
        let (_, name) = split_leaf(target.as_str());
        debug!("Creating folder {}", target);

        let runtime = get_runtime();
        runtime.block_on(self.remote.create_folder(&target))?;

        Ok(StorageData {
            name,
            remote_path: target,
            size: 0,
        })
    }

    /// Removes the folder at the given logical path, contents included.
    ///
    /// An empty path is a no-op rather than an error.
    pub fn remove_folder(&self, path: &str) -> Result<()> {
        validate_path(path)?;

        if path.trim().is_empty() {
            return Ok(());
        }

        let target = normalize(path, &self.settings.root);
        debug!("Removing folder {}", target);

        let runtime = get_runtime();
        runtime.block_on(self.remote.delete(&target))?;
        Ok(())
    }

    /// Downloads the file at the given logical path into the tmp directory
    /// and returns the local path.
    pub fn retrieve_file(&self, path: &str) -> Result<PathBuf> {
        self.retrieve_to_tmp(path)
    }

    /// Downloads the file at the given logical path into the tmp directory
    /// and returns a readable handle to the local copy.
    pub fn retrieve_stream(&self, path: &str) -> Result<std::fs::File> {
        let local = self.retrieve_to_tmp(path)?;
        Ok(std::fs::File::open(local)?)
    }

    fn retrieve_to_tmp(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;

        let folded = path.trim().replace('\\', "/");
        if folded.is_empty() {
            return Err(Error::InvalidPath(
                "The path shouldn't be empty".to_string(),
            ));
        }
        if folded.ends_with('/') {
            return Err(Error::InvalidPath(format!(
                "Looks like you're trying to retrieve a folder: {:?}",
                path
            )));
        }

        let (parent, leaf) = split_leaf(&folded);
        let target = normalize(&parent, &self.settings.root).join(&leaf);
        debug!("Retrieving {} into {}", target, self.settings.tmp.display());

        let runtime = get_runtime();
        let bytes = runtime.block_on(self.remote.download(&target))?;

        std::fs::create_dir_all(&self.settings.tmp)?;
        let local = self.settings.tmp.join(&leaf);
        std::fs::write(&local, &bytes)?;

        Ok(local)
    }

    /// Empties the local tmp directory. Removes nothing from the backend.
    pub fn clean(&self) -> Result<()> {
        let tmp = &self.settings.tmp;
        if !tmp.exists() {
            return Ok(());
        }

        debug!("Cleaning tmp directory {}", tmp.display());
        for entry in std::fs::read_dir(tmp)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())?;
            } else {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Deletes everything under the configured root on the backend.
    pub fn wipe(&self) -> Result<()> {
        let root = normalize("", &self.settings.root);
        debug!("Wiping {}", root);

        let runtime = get_runtime();
        runtime.block_on(self.remote.delete(&root))?;
        Ok(())
    }
}
