//! scintrec-algorithms: per-event reconstruction stages.
//!
//! - **Correction** - pedestal, gain, TDC offsets and timewalk
//! - **Matching** - left/right pairing into the paddle hit list
//! - **Position** - time- and amplitude-based positions, path-length corrections
//! - **Processing** - the [`Reconstructor`] state machine and batch helpers
//!

mod correction;
mod matching;
mod position;
mod processing;

pub use correction::{correct_amplitude, CorrectionEngine, CorrectionSummary};
pub use matching::{combine_amplitudes, combined_uncertainty, MatchSummary, PaddleMatcher};
pub use position::{path_length_correction, y_from_amplitude, y_from_time, PositionEstimator};
pub use processing::{
    reconstruct_events, reconstruct_events_sequential, EventSummary, PaddleHit, Reconstructor,
};

// Re-export core types used in the public API
pub use scintrec_core::{Error, PipelineState, Result, TrackIntercept};
