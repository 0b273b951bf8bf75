//! scintrec-fadc: raw TDC/FADC records and hit decoding.
//!
//! This crate turns the raw records of one event into the per-channel
//! arrays of a [`ChannelBuffer`](scintrec_core::ChannelBuffer).
//!
//! # Key Components
//!
//! - [`RawEvent`] and the [`EventRecords`] trait - the raw data seen by the decoder
//! - [`analyze_waveform`] - pedestal, peak, crossing time and status bits of one FADC window
//! - [`HitDecoder`] - fills both readout paths of the buffer
//!
//! The decoder never applies calibration constants; see the
//! correction stage in `scintrec-algorithms`.

mod decoder;
mod record;
pub mod waveform;

pub use decoder::{DecodeSummary, HitDecoder};
pub use record::{EventRecords, FadcRecord, RawEvent, TdcRecord};
pub use waveform::{analyze_waveform, WaveformFlags, WaveformOutcome, WaveformPulse};

// Re-export core types for convenience
pub use scintrec_core::paddle::Side;
