//! Error types for showerpipe.

use thiserror::Error;

/// Errors in camera or subarray geometry construction.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// Pixel arrays passed to a constructor disagree in length.
    #[error("pixel array length mismatch: {name} has {got} entries, expected {expected}")]
    LengthMismatch {
        /// Name of the offending array.
        name: &'static str,
        /// Length received.
        got: usize,
        /// Length required.
        expected: usize,
    },

    /// Unknown pixel shape code (1 = square, 2 = hexagon).
    #[error("unknown pixel shape code {0}")]
    UnknownPixelShape(i32),

    /// A pixel ended up with more neighbors than its shape allows.
    #[error("pixel {pixel} has {count} neighbors, above the bound {bound} for its shape")]
    AdjacencyBound {
        /// Pixel index.
        pixel: usize,
        /// Neighbor count found.
        count: usize,
        /// Maximum allowed for the pixel shape.
        bound: usize,
    },

    /// Calibration produced a non-finite total intensity.
    #[error("non-finite calibrated intensity for telescope {tel_id}")]
    NonFiniteIntensity {
        /// Telescope the image belongs to.
        tel_id: u32,
    },
}

/// Errors during configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unrecognized component, extractor, cleaner, or writer name.
    #[error("unknown {kind} \"{name}\"")]
    UnknownName {
        /// What was being looked up (e.g. "reconstructor").
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// A value failed validation.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// An image quality predicate failed to parse.
    #[error("invalid image query: {0}")]
    Query(String),

    /// The configuration document itself failed to parse.
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Errors attributable to a single event; the pipeline logs and continues.
#[derive(Error, Debug)]
pub enum EventError {
    /// A data level required by a stage is absent.
    #[error("event {event_id} is missing the {layer} layer")]
    MissingLayer {
        /// Event identifier.
        event_id: u64,
        /// Data-level name, e.g. "r1".
        layer: &'static str,
    },

    /// A telescope record does not match its camera description.
    #[error("telescope {tel_id}: {message}")]
    MalformedTelescope {
        /// Telescope identifier.
        tel_id: u32,
        /// Description of the mismatch.
        message: String,
    },

    /// Telescope referenced by an event is not part of the subarray.
    #[error("telescope {tel_id} not present in subarray")]
    UnknownTelescope {
        /// Telescope identifier.
        tel_id: u32,
    },
}

/// Combined error type for the library.
#[derive(Error, Debug)]
pub enum Error {
    /// Geometry construction or invariant failure.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Configuration failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-event failure.
    #[error("event error: {0}")]
    Event(#[from] EventError),
}

/// Result type alias using the combined Error.
pub type Result<T> = std::result::Result<T, Error>;
