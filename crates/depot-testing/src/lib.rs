//! Testing utilities for depot
//!
//! This crate provides filesystem fixtures and a scriptable in-memory
//! backend for testing depot-based applications and libraries.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub mod remote;

pub use remote::{FakeRemote, Fault, RemoteCall};

/// Creates a temporary test directory with cleanup on drop
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a new temporary test directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Returns the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates a file with the given name and content in the test directory
    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Creates a file of the given size filled with a positional byte
    /// pattern, so reads from a wrong offset never match
    pub fn create_file_with_size(&self, name: &str, size: u64) -> Result<PathBuf> {
        self.create_file(name, &patterned_bytes(size))
    }

    /// Creates a directory with the given name in the test directory
    pub fn create_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Deterministic content where every byte encodes its own offset modulo a
/// prime, making shifted or duplicated ranges visible in comparisons
pub fn patterned_bytes(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
