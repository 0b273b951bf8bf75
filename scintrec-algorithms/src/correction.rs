//! Calibration corrections for decoded channels.
//!
//! Per side and paddle, in this order:
//!
//! 1. `adc_p = adc - pedestal`
//! 2. `adc_c = adc_p / gain`
//! 3. `t = raw * tdc_to_time`
//! 4. `t_o = t - offset - trigger_offset`
//! 5. `t_c = t_o - timewalk(paddle, side, adc_c)`
//!
//! The FADC crossing time goes through steps 3 to 5 with the sample
//! period in place of the TDC conversion.

use scintrec_core::buffer::{ChannelBuffer, SideBuffer};
use scintrec_core::calibration::Calibration;
use scintrec_core::error::{Error, Result};
use scintrec_core::paddle::{Side, NO_DATA};
use std::sync::Arc;

/// Outcome of correcting one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    /// PMTs left uncorrected because their gain or offset is missing.
    pub disabled: Vec<(usize, Side)>,
}

/// Applies the calibration snapshot to decoded channels.
#[derive(Debug, Clone)]
pub struct CorrectionEngine {
    calibration: Arc<Calibration>,
}

impl CorrectionEngine {
    /// Creates an engine reading from `calibration`.
    #[must_use]
    pub fn new(calibration: Arc<Calibration>) -> Self {
        Self { calibration }
    }

    /// Timewalk correction for one PMT at corrected amplitude `amplitude`.
    ///
    /// `k * (1/sqrt(A/MIP) - 1/sqrt(A_ref/MIP))`, zero when the amplitude
    /// is missing or not positive, or when timewalk is disabled.
    #[must_use]
    pub fn timewalk(&self, paddle: usize, side: Side, amplitude: f64) -> f64 {
        if !amplitude.is_finite() || amplitude <= 0.0 {
            return 0.0;
        }
        let Some(params) = self.calibration.timewalk_parameters(paddle, side) else {
            return 0.0;
        };
        let mip = self.calibration.adc_mip;
        let at_amplitude = (amplitude / mip).sqrt().recip();
        let at_reference = (params.reference / mip).sqrt().recip();
        params.coefficient * (at_amplitude - at_reference)
    }

    /// Correct both sides of every paddle.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the buffer was sized for a
    /// different paddle count than the calibration.
    pub fn apply(&self, buffer: &mut ChannelBuffer) -> Result<CorrectionSummary> {
        if buffer.n_paddles() != self.calibration.n_paddles {
            return Err(Error::LengthMismatch {
                name: "channel buffer".to_string(),
                expected: self.calibration.n_paddles,
                actual: buffer.n_paddles(),
            });
        }
        let mut summary = CorrectionSummary::default();
        for side in Side::BOTH {
            let data = buffer.side_mut(side);
            for paddle in 0..self.calibration.n_paddles {
                if !self.correct_channel(paddle, side, data) {
                    summary.disabled.push((paddle, side));
                }
            }
        }
        Ok(summary)
    }

    /// Returns false if the channel has data but cannot be corrected.
    fn correct_channel(&self, paddle: usize, side: Side, data: &mut SideBuffer) -> bool {
        let cal = self.calibration.side(side);
        let has_data = data.tdc[paddle].is_finite()
            || data.adc[paddle].is_finite()
            || data.fadc_time[paddle].is_finite();

        let gain = cal.gain[paddle].filter(|g| g.is_finite() && *g != 0.0);
        let offset = cal.tdc_offset[paddle].filter(|o| o.is_finite());
        let (Some(gain), Some(offset)) = (gain, offset) else {
            data.invalidate_corrections(paddle);
            if has_data {
                tracing::warn!(
                    paddle,
                    %side,
                    "missing gain or offset, channel left uncorrected"
                );
                return false;
            }
            return true;
        };

        // Calibrated pedestal first, measured FADC pedestal as fallback.
        let pedestal = cal.pedestal[paddle]
            .filter(|p| p.is_finite())
            .unwrap_or(data.fadc_pedestal[paddle]);

        let (adc_p, adc_c) = correct_amplitude(data.adc[paddle], pedestal, gain);
        data.adc_p[paddle] = adc_p;
        data.adc_c[paddle] = adc_c;

        let total_offset = offset + self.calibration.trigger_offset[paddle];
        let walk = self.timewalk(paddle, side, adc_c);

        if data.tdc[paddle].is_finite() {
            let t = data.tdc[paddle] * self.calibration.tdc_to_time;
            data.tdc_t[paddle] = t;
            data.offset[paddle] = total_offset;
            data.tdc_o[paddle] = t - total_offset;
            data.timewalk[paddle] = walk;
            data.tdc_c[paddle] = t - total_offset - walk;
        }

        if data.fadc_time[paddle].is_finite() {
            let t = data.fadc_time[paddle] * self.calibration.fadc.sample_period;
            data.fadc_time_c[paddle] = t - total_offset - walk;
        }

        true
    }
}

/// Pedestal subtraction then gain normalization; both [`NO_DATA`] when
/// the amplitude or pedestal is missing.
#[must_use]
pub fn correct_amplitude(adc: f64, pedestal: f64, gain: f64) -> (f64, f64) {
    if !adc.is_finite() || !pedestal.is_finite() {
        return (NO_DATA, NO_DATA);
    }
    let adc_p = adc - pedestal;
    (adc_p, adc_p / gain)
}
