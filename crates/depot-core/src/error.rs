//! Error types for depot-core

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the depot library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed on the local filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A logical path was structurally invalid for the requested operation
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A file operation was asked to act on a directory
    #[error("Is a directory: {0}")]
    IsADirectory(PathBuf),

    /// The remote provider rejected the operation
    #[error("Remote error: {0}")]
    Remote(String),

    /// A chunked transfer ran out of its attempt budget
    #[error("Transfer failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    /// Settings file could not be read or parsed
    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Settings(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
