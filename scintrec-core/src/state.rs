//! Per-event pipeline state machine.

use std::fmt;

/// Lifecycle of a detector instance.
///
/// `Uninitialized` until a calibration is loaded, then once per event
/// `Ready -> Decoded -> Corrected -> Matched -> Estimated`, optionally
/// followed by `PathCorrected` once track data was applied. Clearing the
/// buffers returns the instance to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Decoded,
    Corrected,
    Matched,
    Estimated,
    PathCorrected,
}

impl PipelineState {
    /// True if the pipeline has progressed at least as far as `stage`
    /// for the current event.
    #[inline]
    #[must_use]
    pub fn reached(self, stage: PipelineState) -> bool {
        self >= stage
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Decoded => "decoded",
            PipelineState::Corrected => "corrected",
            PipelineState::Matched => "matched",
            PipelineState::Estimated => "estimated",
            PipelineState::PathCorrected => "path-corrected",
        };
        f.write_str(name)
    }
}
