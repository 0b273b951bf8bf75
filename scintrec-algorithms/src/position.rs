//! Position estimates along the paddle and track-dependent corrections.

use scintrec_core::buffer::ChannelBuffer;
use scintrec_core::calibration::{Calibration, PathLengthCoefficients};
use scintrec_core::paddle::NO_DATA;
use scintrec_core::track::TrackIntercept;

/// Computes hit positions along each matched paddle and, once tracks are
/// known, the path-length corrected times.
#[derive(Debug, Clone, Copy)]
pub struct PositionEstimator {
    speed_in_material: f64,
    attenuation: f64,
    path_length: PathLengthCoefficients,
}

impl PositionEstimator {
    /// Creates an estimator.
    #[must_use]
    pub fn new(
        speed_in_material: f64,
        attenuation: f64,
        path_length: PathLengthCoefficients,
    ) -> Self {
        Self {
            speed_in_material,
            attenuation,
            path_length,
        }
    }

    /// Creates an estimator from the calibration snapshot.
    #[must_use]
    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self::new(
            calibration.speed_in_material,
            calibration.attenuation,
            calibration.path_length,
        )
    }

    /// Hit-level phase: both position estimates for every matched paddle.
    pub fn estimate(&self, buffer: &mut ChannelBuffer) {
        for &paddle in buffer.hits.paddles() {
            buffer.plane.y_time[paddle] = y_from_time(
                self.speed_in_material,
                buffer.left.tdc_c[paddle],
                buffer.right.tdc_c[paddle],
            );
            buffer.plane.y_amplitude[paddle] = y_from_amplitude(
                self.attenuation,
                buffer.left.adc_c[paddle],
                buffer.right.adc_c[paddle],
            );
        }
        buffer.hits.gather(&buffer.plane);
    }

    /// Track-level phase: subtract the path-length correction of the first
    /// track on each matched paddle. Paddles without a track keep
    /// [`NO_DATA`] in the path-corrected arrays.
    pub fn apply_track_corrections(&self, buffer: &mut ChannelBuffer, tracks: &[TrackIntercept]) {
        for &paddle in buffer.hits.paddles() {
            let Some(track) = tracks.iter().find(|t| t.paddle == paddle) else {
                continue;
            };
            let t_pl = path_length_correction(&self.path_length, track);
            buffer.plane.t_pl[paddle] = t_pl;
            buffer.plane.time_pl[paddle] = buffer.plane.time[paddle] - t_pl;
        }
        buffer.hits.gather(&buffer.plane);
    }
}

/// Position from the time difference: `(c_n / 2) * (t_right - t_left)`.
#[must_use]
pub fn y_from_time(speed_in_material: f64, t_left: f64, t_right: f64) -> f64 {
    0.5 * speed_in_material * (t_right - t_left)
}

/// Position from the amplitude ratio: `ln(A_left / A_right) / (2 * att)`,
/// with `att` the attenuation coefficient (inverse length). [`NO_DATA`]
/// unless both amplitudes are positive.
#[must_use]
pub fn y_from_amplitude(attenuation: f64, a_left: f64, a_right: f64) -> f64 {
    if a_left > 0.0 && a_right > 0.0 && a_left.is_finite() && a_right.is_finite() {
        (a_left / a_right).ln() / (2.0 * attenuation)
    } else {
        NO_DATA
    }
}

/// `x_corr * x + th_corr * theta + ph_corr * phi`.
#[must_use]
pub fn path_length_correction(
    coefficients: &PathLengthCoefficients,
    track: &TrackIntercept,
) -> f64 {
    coefficients.x * track.x + coefficients.theta * track.theta + coefficients.phi * track.phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_y_from_time_antisymmetric() {
        let y = y_from_time(0.15, 100.0, 104.0);
        assert_relative_eq!(y, 0.3);
        assert_relative_eq!(y_from_time(0.15, 104.0, 100.0), -y);
        assert_relative_eq!(y_from_time(0.15, 50.0, 50.0), 0.0);
    }

    #[test]
    fn test_y_from_amplitude() {
        assert_relative_eq!(y_from_amplitude(0.5, 2.0, 1.0), 2f64.ln());
        assert_relative_eq!(y_from_amplitude(0.5, 1.0, 1.0), 0.0);
        assert!(y_from_amplitude(0.5, 0.0, 1.0).is_nan());
        assert!(y_from_amplitude(0.5, NO_DATA, 1.0).is_nan());
    }

    #[test]
    fn test_path_length_correction() {
        let coefficients = PathLengthCoefficients {
            x: 2.0,
            theta: 3.0,
            phi: -1.0,
        };
        let track = TrackIntercept::new(0, 0.5, 0.1, 0.2);
        assert_relative_eq!(
            path_length_correction(&coefficients, &track),
            1.0 + 0.3 - 0.2
        );
    }

    #[test]
    fn test_estimate_only_matched_paddles() {
        let mut buffer = ChannelBuffer::new(3).unwrap();
        buffer.left.tdc_c[1] = 10.0;
        buffer.right.tdc_c[1] = 12.0;
        buffer.left.adc_c[1] = 3.0;
        buffer.right.adc_c[1] = 3.0;
        buffer.left.tdc_c[2] = 10.0;
        buffer.hits.push(1).unwrap();

        PositionEstimator::new(0.2, 1.0, PathLengthCoefficients::default())
            .estimate(&mut buffer);

        assert_relative_eq!(buffer.hits.y_from_time()[0], 0.2);
        assert_relative_eq!(buffer.hits.y_from_amplitude()[0], 0.0);
        assert!(buffer.plane.y_time[2].is_nan());
    }

    #[test]
    fn test_track_corrections_use_first_track() {
        let mut buffer = ChannelBuffer::new(2).unwrap();
        buffer.hits.push(0).unwrap();
        buffer.hits.push(1).unwrap();
        buffer.plane.time[0] = 20.0;
        buffer.plane.time[1] = 30.0;
        let coefficients = PathLengthCoefficients {
            x: 1.0,
            theta: 0.0,
            phi: 0.0,
        };
        let estimator = PositionEstimator::new(1.0, 1.0, coefficients);
        let tracks = [
            TrackIntercept::new(0, 2.0, 0.0, 0.0),
            TrackIntercept::new(0, 5.0, 0.0, 0.0),
        ];

        estimator.apply_track_corrections(&mut buffer, &tracks);

        assert_relative_eq!(buffer.plane.t_pl[0], 2.0);
        assert_relative_eq!(buffer.hits.path_corrected_times()[0], 18.0);
        assert!(buffer.hits.path_corrected_times()[1].is_nan());
    }
}
