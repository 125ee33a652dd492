//! I/O error types.

use thiserror::Error;

/// Errors during input and output operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input path does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Output path exists and overwrite was not requested.
    #[error("output exists and overwrite is disabled: {0}")]
    AlreadyExists(String),

    /// Unrecognized writer backend or source type.
    #[error("unknown {kind} \"{name}\"")]
    UnknownBackend {
        /// What was being looked up (e.g. "output type").
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// File contents did not match the expected layout.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Underlying HDF5 error.
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the core data model.
    #[error("{0}")]
    Core(#[from] showerpipe_core::Error),
}

/// Result type alias using the I/O Error.
pub type Result<T> = std::result::Result<T, Error>;
