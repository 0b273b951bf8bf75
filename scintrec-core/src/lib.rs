//! scintrec-core: Core types for scintillator paddle reconstruction.
//!
//! This crate holds the pieces shared by every stage of the per-event
//! pipeline: paddle and side identifiers, the immutable calibration
//! snapshot, the fixed-capacity per-channel buffers and the name-based
//! variable registry used by export collaborators.
//!

pub mod buffer;
pub mod calibration;
pub mod error;
pub mod paddle;
pub mod registry;
pub mod state;
pub mod track;

pub use buffer::{AnomalyKind, ChannelBuffer, DecodeAnomaly, HitList, PlaneBuffer, SideBuffer};
pub use calibration::{
    AmplitudeCombination, Calibration, CalibrationDatabase, CalibrationEpoch, FadcWindow,
    PathLengthCoefficients, SideCalibration, TimewalkParameters,
};
pub use error::{Error, Result};
pub use paddle::{Side, NO_DATA};
pub use registry::{Variable, VariableView};
pub use state::PipelineState;
pub use track::TrackIntercept;
