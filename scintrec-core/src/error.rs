//! Error types for scintrec-core.

use crate::state::PipelineState;
use thiserror::Error;

/// Result type alias for scintrec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for scintrec operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The plane must contain at least one paddle.
    #[error("invalid paddle count: {0} (a plane needs at least one paddle)")]
    InvalidPaddleCount(usize),

    /// A per-paddle calibration array disagrees with the paddle count.
    #[error("calibration array `{name}` has {actual} entries, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A mandatory calibration key was not found.
    #[error("missing calibration parameter: {0}")]
    MissingParameter(String),

    /// A calibration value is present but unusable.
    #[error("invalid calibration parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// No calibration epoch covers the requested run.
    #[error("no calibration epoch covers run {0}")]
    NoEpochForRun(u32),

    /// Event processing was requested before a calibration was loaded.
    #[error("detector is not initialized (no calibration loaded)")]
    NotInitialized,

    /// A pipeline phase was called out of order.
    #[error("`{operation}` requires the detector to be {expected}, but it is {actual}")]
    PhaseOrder {
        operation: &'static str,
        expected: PipelineState,
        actual: PipelineState,
    },

    /// Track-dependent corrections were requested without track data.
    #[error("track-dependent corrections requested before track data was attached")]
    MissingTrackData,

    /// A paddle index outside `[0, N)`.
    #[error("paddle {paddle} out of range (plane has {n_paddles} paddles)")]
    PaddleOutOfRange { paddle: usize, n_paddles: usize },

    /// Hit list entries must be strictly increasing in paddle index.
    #[error("hit list order violated: paddle {paddle} after paddle {previous}")]
    HitOrder { previous: usize, paddle: usize },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Calibration parse error.
    #[error("calibration parse error: {0}")]
    Json(#[from] serde_json::Error),
}
