//! Fixed-capacity per-event storage.
//!
//! Every per-channel quantity is a boxed slice of exactly `N` slots,
//! allocated once when the detector is initialized and indexed by paddle.
//! Clearing between events overwrites the slots in place; nothing is
//! reallocated while an event is processed. Derived slots hold
//! [`NO_DATA`] whenever the current event produced no value for them.

use crate::error::{Error, Result};
use crate::paddle::{Side, NO_DATA};
use serde::Serialize;

/// Kind of non-fatal anomaly found while decoding raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Record addressed a paddle outside the plane; the record was dropped.
    PaddleOutOfRange,
    /// More than one TDC hit on a PMT; the earliest channel was kept.
    MultipleTdcHits,
    /// A second waveform for the same PMT; it was ignored.
    DuplicateWaveform,
    /// Waveform without samples.
    EmptyWaveform,
    /// Every sample at the overflow level.
    AllOverflow,
    /// Every sample at the underflow level.
    AllUnderflow,
    /// Some samples in the pulse window overflowed.
    Overflow,
    /// Some samples in the pulse window underflowed.
    Underflow,
    /// Fewer samples than the pedestal window needs.
    MissingPedestal,
    /// Pedestal samples spread beyond tolerance.
    BadPedestal,
    /// No sample crossed the threshold.
    NoThresholdCrossing,
}

/// One decode anomaly, attributed to the raw record that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeAnomaly {
    /// Paddle as addressed by the raw record (may be out of range).
    pub paddle: usize,
    /// PMT side.
    pub side: Side,
    /// What went wrong.
    pub kind: AnomalyKind,
}

fn no_data(n: usize) -> Box<[f64]> {
    vec![NO_DATA; n].into_boxed_slice()
}

fn zeroed<T: Copy + Default>(n: usize) -> Box<[T]> {
    vec![T::default(); n].into_boxed_slice()
}

/// Raw and corrected quantities for one PMT side, one slot per paddle.
#[derive(Debug, Clone)]
pub struct SideBuffer {
    /// TDC records seen on this side in the event.
    pub tdc_hits: u32,
    /// Waveforms that produced an amplitude on this side in the event.
    pub adc_hits: u32,
    /// TDC records per paddle.
    pub tdc_multiplicity: Box<[u32]>,
    /// Selected raw TDC value (channels).
    pub tdc: Box<[f64]>,
    /// TDC time before corrections.
    pub tdc_t: Box<[f64]>,
    /// Total offset subtracted (PMT offset plus trigger offset).
    pub offset: Box<[f64]>,
    /// Offset-corrected time, before timewalk.
    pub tdc_o: Box<[f64]>,
    /// Timewalk correction applied.
    pub timewalk: Box<[f64]>,
    /// Fully corrected TDC time.
    pub tdc_c: Box<[f64]>,
    /// Raw FADC peak (ADC counts).
    pub adc: Box<[f64]>,
    /// Pedestal-subtracted peak.
    pub adc_p: Box<[f64]>,
    /// Gain-normalized amplitude.
    pub adc_c: Box<[f64]>,
    /// FADC threshold-crossing time (samples).
    pub fadc_time: Box<[f64]>,
    /// Corrected FADC time.
    pub fadc_time_c: Box<[f64]>,
    /// Pedestal measured from the leading FADC samples.
    pub fadc_pedestal: Box<[f64]>,
    /// Pedestal-subtracted integral over the pulse window.
    pub fadc_integral: Box<[f64]>,
    /// Waveforms seen per paddle.
    pub fadc_records: Box<[u32]>,
    /// Overflow bit.
    pub overflow: Box<[u8]>,
    /// Underflow bit.
    pub underflow: Box<[u8]>,
    /// Pedestal quality bit (1 = bad pedestal).
    pub pedestal_quality: Box<[u8]>,
}

impl SideBuffer {
    fn new(n: usize) -> Self {
        Self {
            tdc_hits: 0,
            adc_hits: 0,
            tdc_multiplicity: zeroed(n),
            tdc: no_data(n),
            tdc_t: no_data(n),
            offset: no_data(n),
            tdc_o: no_data(n),
            timewalk: no_data(n),
            tdc_c: no_data(n),
            adc: no_data(n),
            adc_p: no_data(n),
            adc_c: no_data(n),
            fadc_time: no_data(n),
            fadc_time_c: no_data(n),
            fadc_pedestal: no_data(n),
            fadc_integral: no_data(n),
            fadc_records: zeroed(n),
            overflow: zeroed(n),
            underflow: zeroed(n),
            pedestal_quality: zeroed(n),
        }
    }

    fn clear(&mut self) {
        self.tdc_hits = 0;
        self.adc_hits = 0;
        self.tdc_multiplicity.fill(0);
        self.fadc_records.fill(0);
        for slots in [
            &mut self.tdc,
            &mut self.tdc_t,
            &mut self.offset,
            &mut self.tdc_o,
            &mut self.timewalk,
            &mut self.tdc_c,
            &mut self.adc,
            &mut self.adc_p,
            &mut self.adc_c,
            &mut self.fadc_time,
            &mut self.fadc_time_c,
            &mut self.fadc_pedestal,
            &mut self.fadc_integral,
        ] {
            slots.fill(NO_DATA);
        }
        self.overflow.fill(0);
        self.underflow.fill(0);
        self.pedestal_quality.fill(0);
    }

    /// Reset every derived (corrected) slot of one paddle to [`NO_DATA`],
    /// leaving the decoded raw values intact.
    pub fn invalidate_corrections(&mut self, paddle: usize) {
        self.tdc_t[paddle] = NO_DATA;
        self.offset[paddle] = NO_DATA;
        self.tdc_o[paddle] = NO_DATA;
        self.timewalk[paddle] = NO_DATA;
        self.tdc_c[paddle] = NO_DATA;
        self.adc_p[paddle] = NO_DATA;
        self.adc_c[paddle] = NO_DATA;
        self.fadc_time_c[paddle] = NO_DATA;
    }
}

/// Paddle-level results, one slot per paddle.
#[derive(Debug, Clone)]
pub struct PlaneBuffer {
    /// Combined corrected time.
    pub time: Box<[f64]>,
    /// Uncertainty of the combined time.
    pub dtime: Box<[f64]>,
    /// Path-length correction applied.
    pub t_pl: Box<[f64]>,
    /// Path-length-corrected time.
    pub time_pl: Box<[f64]>,
    /// Combined amplitude.
    pub amplitude: Box<[f64]>,
    /// Position along the bar from the time difference.
    pub y_time: Box<[f64]>,
    /// Position along the bar from the amplitude ratio.
    pub y_amplitude: Box<[f64]>,
    /// Tracks matched to each paddle.
    pub matches: Box<[u32]>,
}

impl PlaneBuffer {
    fn new(n: usize) -> Self {
        Self {
            time: no_data(n),
            dtime: no_data(n),
            t_pl: no_data(n),
            time_pl: no_data(n),
            amplitude: no_data(n),
            y_time: no_data(n),
            y_amplitude: no_data(n),
            matches: zeroed(n),
        }
    }

    fn clear(&mut self) {
        for slots in [
            &mut self.time,
            &mut self.dtime,
            &mut self.t_pl,
            &mut self.time_pl,
            &mut self.amplitude,
            &mut self.y_time,
            &mut self.y_amplitude,
        ] {
            slots.fill(NO_DATA);
        }
        self.matches.fill(0);
    }
}

/// Paddles with a complete two-sided hit, in increasing paddle order,
/// plus per-hit copies of the plane results.
///
/// Capacity is fixed at `N`; pushing never reallocates.
#[derive(Debug, Clone)]
pub struct HitList {
    n_paddles: usize,
    paddles: Vec<usize>,
    matches: Vec<u32>,
    time: Vec<f64>,
    dtime: Vec<f64>,
    time_pl: Vec<f64>,
    amplitude: Vec<f64>,
    y_time: Vec<f64>,
    y_amplitude: Vec<f64>,
}

impl HitList {
    fn new(n: usize) -> Self {
        Self {
            n_paddles: n,
            paddles: Vec::with_capacity(n),
            matches: Vec::with_capacity(n),
            time: Vec::with_capacity(n),
            dtime: Vec::with_capacity(n),
            time_pl: Vec::with_capacity(n),
            amplitude: Vec::with_capacity(n),
            y_time: Vec::with_capacity(n),
            y_amplitude: Vec::with_capacity(n),
        }
    }

    fn clear(&mut self) {
        self.paddles.clear();
        self.matches.clear();
        self.time.clear();
        self.dtime.clear();
        self.time_pl.clear();
        self.amplitude.clear();
        self.y_time.clear();
        self.y_amplitude.clear();
    }

    /// Appends a paddle.
    ///
    /// # Errors
    /// Fails if the paddle is out of range or not greater than the last
    /// paddle in the list.
    pub fn push(&mut self, paddle: usize) -> Result<()> {
        if paddle >= self.n_paddles {
            return Err(Error::PaddleOutOfRange {
                paddle,
                n_paddles: self.n_paddles,
            });
        }
        if let Some(&previous) = self.paddles.last() {
            if paddle <= previous {
                return Err(Error::HitOrder { previous, paddle });
            }
        }
        self.paddles.push(paddle);
        self.matches.push(0);
        Ok(())
    }

    /// Number of complete hits (`Nhit`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.paddles.len()
    }

    /// True if the event has no complete hit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paddles.is_empty()
    }

    /// Paddle indices of the complete hits.
    #[must_use]
    pub fn paddles(&self) -> &[usize] {
        &self.paddles
    }

    /// Tracks matched to each hit.
    #[must_use]
    pub fn matches(&self) -> &[u32] {
        &self.matches
    }

    /// Mutable track-match counts, written by the track-matching stage.
    pub fn matches_mut(&mut self) -> &mut [u32] {
        &mut self.matches
    }

    /// Combined times, in hit order.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.time
    }

    /// Time uncertainties, in hit order.
    #[must_use]
    pub fn time_uncertainties(&self) -> &[f64] {
        &self.dtime
    }

    /// Path-length-corrected times, in hit order.
    #[must_use]
    pub fn path_corrected_times(&self) -> &[f64] {
        &self.time_pl
    }

    /// Combined amplitudes, in hit order.
    #[must_use]
    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitude
    }

    /// Timing-based positions, in hit order.
    #[must_use]
    pub fn y_from_time(&self) -> &[f64] {
        &self.y_time
    }

    /// Amplitude-based positions, in hit order.
    #[must_use]
    pub fn y_from_amplitude(&self) -> &[f64] {
        &self.y_amplitude
    }

    /// Refresh the per-hit copies from the paddle-indexed results.
    pub fn gather(&mut self, plane: &PlaneBuffer) {
        let pick = |dst: &mut Vec<f64>, src: &[f64], paddles: &[usize]| {
            dst.clear();
            dst.extend(paddles.iter().map(|&p| src[p]));
        };
        pick(&mut self.time, &plane.time, &self.paddles);
        pick(&mut self.dtime, &plane.dtime, &self.paddles);
        pick(&mut self.time_pl, &plane.time_pl, &self.paddles);
        pick(&mut self.amplitude, &plane.amplitude, &self.paddles);
        pick(&mut self.y_time, &plane.y_time, &self.paddles);
        pick(&mut self.y_amplitude, &plane.y_amplitude, &self.paddles);
    }
}

/// All per-event storage of one detector instance.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    n_paddles: usize,
    /// Left PMT quantities.
    pub left: SideBuffer,
    /// Right PMT quantities.
    pub right: SideBuffer,
    /// Paddle-level results.
    pub plane: PlaneBuffer,
    /// Complete hits.
    pub hits: HitList,
    /// Paddles timed on one side only.
    pub partial: Vec<(usize, Side)>,
    /// Decode anomalies of the current event.
    pub anomalies: Vec<DecodeAnomaly>,
}

impl ChannelBuffer {
    /// Allocate buffers for a plane of `n_paddles` paddles.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPaddleCount`] if `n_paddles` is zero.
    pub fn new(n_paddles: usize) -> Result<Self> {
        if n_paddles == 0 {
            return Err(Error::InvalidPaddleCount(n_paddles));
        }
        Ok(Self {
            n_paddles,
            left: SideBuffer::new(n_paddles),
            right: SideBuffer::new(n_paddles),
            plane: PlaneBuffer::new(n_paddles),
            hits: HitList::new(n_paddles),
            partial: Vec::with_capacity(n_paddles),
            // One anomaly per PMT per event covers normal data; noisy events may grow it.
            anomalies: Vec::with_capacity(2 * n_paddles),
        })
    }

    /// Number of paddles the buffers were sized for.
    #[must_use]
    pub fn n_paddles(&self) -> usize {
        self.n_paddles
    }

    /// Reset all per-event counts and mark every derived slot as no data.
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.plane.clear();
        self.hits.clear();
        self.partial.clear();
        self.anomalies.clear();
    }

    /// Storage for one side.
    #[inline]
    #[must_use]
    pub fn side(&self, side: Side) -> &SideBuffer {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Mutable storage for one side.
    #[inline]
    pub fn side_mut(&mut self, side: Side) -> &mut SideBuffer {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Record a decode anomaly.
    pub fn flag(&mut self, paddle: usize, side: Side, kind: AnomalyKind) {
        tracing::debug!(paddle, %side, ?kind, "decode anomaly");
        self.anomalies.push(DecodeAnomaly { paddle, side, kind });
    }
}
