//! Left/right pairing into paddle hits.

use scintrec_core::buffer::ChannelBuffer;
use scintrec_core::calibration::{AmplitudeCombination, Calibration};
use scintrec_core::error::Result;
use scintrec_core::paddle::{Side, NO_DATA};

/// Counts from one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    /// Paddles with both sides timed.
    pub complete: usize,
    /// Paddles with one side timed.
    pub partial: usize,
}

/// Pairs corrected left and right channels into paddle-level hits.
///
/// A complete hit needs a corrected TDC time on both sides. The combined
/// time is the mean of the two, with uncertainty `resolution / sqrt(2)`.
/// Single-sided paddles go to the partial list only.
#[derive(Debug, Clone, Copy)]
pub struct PaddleMatcher {
    resolution: f64,
    combination: AmplitudeCombination,
}

impl PaddleMatcher {
    /// Creates a matcher.
    #[must_use]
    pub fn new(resolution: f64, combination: AmplitudeCombination) -> Self {
        Self {
            resolution,
            combination,
        }
    }

    /// Creates a matcher from the calibration snapshot.
    #[must_use]
    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self::new(calibration.resolution, calibration.amplitude_combination)
    }

    /// Build the hit list of the event.
    ///
    /// # Errors
    /// Only on a broken hit-list invariant, which indicates a bug.
    pub fn match_paddles(&self, buffer: &mut ChannelBuffer) -> Result<MatchSummary> {
        let mut summary = MatchSummary::default();

        for paddle in 0..buffer.n_paddles() {
            let left = buffer.left.tdc_c[paddle];
            let right = buffer.right.tdc_c[paddle];

            match (left.is_finite(), right.is_finite()) {
                (true, true) => {
                    buffer.hits.push(paddle)?;
                    buffer.plane.time[paddle] = 0.5 * (left + right);
                    buffer.plane.dtime[paddle] = combined_uncertainty(self.resolution, 2);
                    buffer.plane.amplitude[paddle] = combine_amplitudes(
                        self.combination,
                        buffer.left.adc_c[paddle],
                        buffer.right.adc_c[paddle],
                    );
                    summary.complete += 1;
                }
                (true, false) => {
                    buffer.partial.push((paddle, Side::Left));
                    summary.partial += 1;
                }
                (false, true) => {
                    buffer.partial.push((paddle, Side::Right));
                    summary.partial += 1;
                }
                (false, false) => {}
            }
        }

        buffer.hits.gather(&buffer.plane);
        Ok(summary)
    }
}

/// Uncertainty of a time built from `sides` independent PMT measurements,
/// each with resolution `resolution`. [`NO_DATA`] for zero sides.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn combined_uncertainty(resolution: f64, sides: usize) -> f64 {
    if sides == 0 {
        return NO_DATA;
    }
    resolution / (sides as f64).sqrt()
}

/// Combine two corrected side amplitudes. [`NO_DATA`] if either is
/// missing, or if a geometric mean is asked of a non-positive value.
#[must_use]
pub fn combine_amplitudes(combination: AmplitudeCombination, left: f64, right: f64) -> f64 {
    if !left.is_finite() || !right.is_finite() {
        return NO_DATA;
    }
    match combination {
        AmplitudeCombination::GeometricMean => {
            if left > 0.0 && right > 0.0 {
                (left * right).sqrt()
            } else {
                NO_DATA
            }
        }
        AmplitudeCombination::ArithmeticMean => 0.5 * (left + right),
        AmplitudeCombination::Sum => left + right,
    }
}
