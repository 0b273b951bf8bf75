//! FADC waveform analysis.
//!
//! One readout window of raw samples is reduced to a pedestal, a peak
//! amplitude, a threshold-crossing time and three status bits:
//!
//! 1. Samples beyond the configured window length are ignored.
//! 2. The pedestal is the mean of the first `n_pedestal` samples.
//! 3. In threshold mode the pulse window runs from `samples_before`
//!    samples before the first sample above `pedestal + threshold` to
//!    `samples_after` samples after it. Otherwise it is everything after
//!    the pedestal samples and the time is taken at the peak.
//! 4. The peak is the largest raw sample in the pulse window; the
//!    integral is the pedestal-subtracted sum over the same window.
#![allow(clippy::cast_precision_loss)]

use scintrec_core::buffer::AnomalyKind;
use scintrec_core::calibration::FadcWindow;

/// Status bits of one waveform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveformFlags {
    /// Some sample reached the overflow level.
    pub overflow: bool,
    /// Some sample reached the underflow level.
    pub underflow: bool,
    /// Pedestal spread beyond tolerance, or a pedestal sample was clipped.
    pub bad_pedestal: bool,
}

/// A pulse found in a waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformPulse {
    /// Mean of the pedestal samples.
    pub pedestal: f64,
    /// Largest raw sample in the pulse window.
    pub peak: f64,
    /// Crossing time in samples (fractional, linearly interpolated).
    pub time: f64,
    /// Pedestal-subtracted sum over the pulse window.
    pub integral: f64,
    /// Status bits.
    pub flags: WaveformFlags,
}

/// Result of analysing one waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveformOutcome {
    /// A usable pulse.
    Pulse(WaveformPulse),
    /// No amplitude or time can be derived.
    NoData {
        /// Why the waveform was rejected.
        reason: AnomalyKind,
        /// Pedestal, when enough samples were present to measure it.
        pedestal: Option<f64>,
        /// Status bits gathered before rejection.
        flags: WaveformFlags,
    },
}

/// Analyse one FADC window.
#[must_use]
pub fn analyze_waveform(samples: &[u16], window: &FadcWindow) -> WaveformOutcome {
    let samples = &samples[..samples.len().min(window.window)];

    if samples.is_empty() {
        return no_data(AnomalyKind::EmptyWaveform, None, WaveformFlags::default());
    }

    let overflow = |s: u16| s >= window.overflow_level;
    let underflow = |s: u16| s <= window.underflow_level;

    if samples.iter().all(|&s| overflow(s)) {
        let flags = WaveformFlags {
            overflow: true,
            ..WaveformFlags::default()
        };
        return no_data(AnomalyKind::AllOverflow, None, flags);
    }
    if samples.iter().all(|&s| underflow(s)) {
        let flags = WaveformFlags {
            underflow: true,
            ..WaveformFlags::default()
        };
        return no_data(AnomalyKind::AllUnderflow, None, flags);
    }

    let n_ped = window.n_pedestal;
    if n_ped == 0 || samples.len() <= n_ped {
        let flags = WaveformFlags {
            bad_pedestal: true,
            ..WaveformFlags::default()
        };
        return no_data(AnomalyKind::MissingPedestal, None, flags);
    }

    let ped_samples = &samples[..n_ped];
    let pedestal = ped_samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n_ped as f64;
    let ped_min = ped_samples.iter().copied().min().unwrap_or_default();
    let ped_max = ped_samples.iter().copied().max().unwrap_or_default();
    let bad_pedestal = f64::from(ped_max - ped_min) > window.pedestal_tolerance
        || ped_samples.iter().any(|&s| overflow(s) || underflow(s));

    let (start, end, time) = if window.threshold_mode {
        let level = pedestal + window.threshold;
        let Some(cross) = (n_ped..samples.len()).find(|&i| f64::from(samples[i]) > level) else {
            let flags = WaveformFlags {
                bad_pedestal,
                ..WaveformFlags::default()
            };
            return no_data(AnomalyKind::NoThresholdCrossing, Some(pedestal), flags);
        };
        let start = cross.saturating_sub(window.samples_before);
        let end = (cross + window.samples_after + 1).min(samples.len());
        (start, end, crossing_time(samples, cross, level))
    } else {
        let start = n_ped;
        let end = samples.len();
        let peak_at = (start..end).max_by_key(|&i| samples[i]).unwrap_or(start);
        (start, end, peak_at as f64)
    };

    let pulse = &samples[start..end];
    let peak = pulse.iter().copied().max().map_or(pedestal, f64::from);
    let integral = pulse.iter().map(|&s| f64::from(s) - pedestal).sum();

    WaveformOutcome::Pulse(WaveformPulse {
        pedestal,
        peak,
        time,
        integral,
        flags: WaveformFlags {
            overflow: pulse.iter().any(|&s| overflow(s)),
            underflow: pulse.iter().any(|&s| underflow(s)),
            bad_pedestal,
        },
    })
}

/// Linear interpolation between the last sample below `level` and the
/// first sample above it.
fn crossing_time(samples: &[u16], cross: usize, level: f64) -> f64 {
    if cross == 0 {
        return 0.0;
    }
    let below = f64::from(samples[cross - 1]);
    let above = f64::from(samples[cross]);
    if above <= below {
        return cross as f64;
    }
    let fraction = ((level - below) / (above - below)).clamp(0.0, 1.0);
    (cross - 1) as f64 + fraction
}

fn no_data(reason: AnomalyKind, pedestal: Option<f64>, flags: WaveformFlags) -> WaveformOutcome {
    WaveformOutcome::NoData {
        reason,
        pedestal,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn window() -> FadcWindow {
        FadcWindow {
            n_pedestal: 4,
            samples_after: 3,
            samples_before: 1,
            window: 16,
            threshold: 50.0,
            ..FadcWindow::default()
        }
    }

    fn pulse(outcome: WaveformOutcome) -> WaveformPulse {
        match outcome {
            WaveformOutcome::Pulse(p) => p,
            WaveformOutcome::NoData { reason, .. } => panic!("expected pulse, got {reason:?}"),
        }
    }

    #[test]
    fn test_simple_pulse() {
        //             ped ped ped ped         cross
        let samples = [100, 102, 98, 100, 110, 200, 400, 300, 150, 100, 100];
        let p = pulse(analyze_waveform(&samples, &window()));

        assert_relative_eq!(p.pedestal, 100.0);
        assert_relative_eq!(p.peak, 400.0);
        // level 150: between 110 (index 4) and 200 (index 5) -> 4 + 40/90
        assert_relative_eq!(p.time, 4.0 + 40.0 / 90.0, epsilon = 1e-12);
        // window [4, 9): 10 + 100 + 300 + 200 + 50
        assert_relative_eq!(p.integral, 660.0);
        assert_eq!(p.flags, WaveformFlags::default());
    }

    #[test]
    fn test_empty_waveform() {
        assert!(matches!(
            analyze_waveform(&[], &window()),
            WaveformOutcome::NoData {
                reason: AnomalyKind::EmptyWaveform,
                ..
            }
        ));
    }

    #[test]
    fn test_all_overflow_has_no_amplitude() {
        let samples = [4095u16; 10];
        match analyze_waveform(&samples, &window()) {
            WaveformOutcome::NoData { reason, flags, .. } => {
                assert_eq!(reason, AnomalyKind::AllOverflow);
                assert!(flags.overflow);
            }
            WaveformOutcome::Pulse(_) => panic!("all-overflow waveform produced a pulse"),
        }
    }

    #[test]
    fn test_all_underflow_has_no_amplitude() {
        let samples = [0u16; 10];
        assert!(matches!(
            analyze_waveform(&samples, &window()),
            WaveformOutcome::NoData {
                reason: AnomalyKind::AllUnderflow,
                ..
            }
        ));
    }

    #[test]
    fn test_short_waveform_misses_pedestal() {
        let samples = [100u16, 100, 100];
        assert!(matches!(
            analyze_waveform(&samples, &window()),
            WaveformOutcome::NoData {
                reason: AnomalyKind::MissingPedestal,
                ..
            }
        ));
    }

    #[test]
    fn test_partial_overflow_is_flagged_but_kept() {
        let samples = [100u16, 100, 100, 100, 500, 4095, 4095, 800, 100];
        let p = pulse(analyze_waveform(&samples, &window()));
        assert!(p.flags.overflow);
        assert_relative_eq!(p.peak, 4095.0);
    }

    #[test]
    fn test_no_crossing() {
        let samples = [100u16, 100, 100, 100, 120, 110, 100];
        match analyze_waveform(&samples, &window()) {
            WaveformOutcome::NoData {
                reason, pedestal, ..
            } => {
                assert_eq!(reason, AnomalyKind::NoThresholdCrossing);
                assert_relative_eq!(pedestal.unwrap(), 100.0);
            }
            WaveformOutcome::Pulse(_) => panic!("sub-threshold waveform produced a pulse"),
        }
    }

    #[test]
    fn test_bad_pedestal_flag() {
        let samples = [80u16, 120, 100, 100, 400, 300, 100];
        let p = pulse(analyze_waveform(&samples, &window()));
        assert!(p.flags.bad_pedestal);
    }

    #[test]
    fn test_window_length_truncates() {
        let mut w = window();
        w.window = 6;
        // The pulse sits after sample 6 and is cut away.
        let samples = [100u16, 100, 100, 100, 100, 100, 900, 900];
        assert!(matches!(
            analyze_waveform(&samples, &w),
            WaveformOutcome::NoData {
                reason: AnomalyKind::NoThresholdCrossing,
                ..
            }
        ));
    }

    #[test]
    fn test_threshold_off_uses_peak_time() {
        let mut w = window();
        w.threshold_mode = false;
        let samples = [100u16, 100, 100, 100, 130, 160, 140, 100];
        let p = pulse(analyze_waveform(&samples, &w));
        assert_relative_eq!(p.time, 5.0);
        assert_relative_eq!(p.peak, 160.0);
        assert_relative_eq!(p.integral, 30.0 + 60.0 + 40.0);
    }
}
