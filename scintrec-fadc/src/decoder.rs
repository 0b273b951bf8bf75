//! Raw record decoding into per-channel buffers.

use crate::record::EventRecords;
use crate::waveform::{analyze_waveform, WaveformFlags, WaveformOutcome};
use scintrec_core::buffer::{AnomalyKind, ChannelBuffer, SideBuffer};
use scintrec_core::calibration::FadcWindow;

/// Record counts of one decoded event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// TDC records stored.
    pub tdc_records: usize,
    /// FADC records that produced a pulse.
    pub fadc_pulses: usize,
    /// Records dropped for addressing a paddle outside the plane.
    pub dropped: usize,
}

/// Fills the raw arrays of a [`ChannelBuffer`] from one event's records.
///
/// TDC: every record increments the side counter and the PMT multiplicity.
/// When a PMT fires more than once the earliest (smallest) channel is kept
/// and a [`AnomalyKind::MultipleTdcHits`] anomaly is recorded.
///
/// FADC: the first waveform of each PMT is analysed; later ones are
/// reported as duplicates. Rejected waveforms leave the amplitude at
/// no data but still set their status bits.
#[derive(Debug, Clone, Default)]
pub struct HitDecoder {
    window: FadcWindow,
}

impl HitDecoder {
    /// Creates a decoder for the given FADC window.
    #[must_use]
    pub fn new(window: FadcWindow) -> Self {
        Self { window }
    }

    /// Decode one event. The buffer must have been cleared.
    pub fn decode<E: EventRecords + ?Sized>(
        &self,
        event: &E,
        buffer: &mut ChannelBuffer,
    ) -> DecodeSummary {
        let n_paddles = buffer.n_paddles();
        let mut summary = DecodeSummary::default();

        for record in event.tdc_records() {
            if record.paddle >= n_paddles {
                buffer.flag(record.paddle, record.side, AnomalyKind::PaddleOutOfRange);
                summary.dropped += 1;
                continue;
            }
            let side = buffer.side_mut(record.side);
            let p = record.paddle;
            side.tdc_hits += 1;
            side.tdc_multiplicity[p] += 1;

            let value = f64::from(record.value);
            if side.tdc[p].is_nan() || value < side.tdc[p] {
                side.tdc[p] = value;
            }
            if side.tdc_multiplicity[p] == 2 {
                buffer.flag(p, record.side, AnomalyKind::MultipleTdcHits);
            }
            summary.tdc_records += 1;
        }

        for record in event.fadc_records() {
            if record.paddle >= n_paddles {
                buffer.flag(record.paddle, record.side, AnomalyKind::PaddleOutOfRange);
                summary.dropped += 1;
                continue;
            }
            let p = record.paddle;
            let side = buffer.side_mut(record.side);
            side.fadc_records[p] += 1;
            if side.fadc_records[p] > 1 {
                buffer.flag(p, record.side, AnomalyKind::DuplicateWaveform);
                continue;
            }

            match analyze_waveform(&record.samples, &self.window) {
                WaveformOutcome::Pulse(pulse) => {
                    side.adc_hits += 1;
                    side.adc[p] = pulse.peak;
                    side.fadc_time[p] = pulse.time;
                    side.fadc_pedestal[p] = pulse.pedestal;
                    side.fadc_integral[p] = pulse.integral;
                    store_flags(side, p, pulse.flags);

                    if pulse.flags.overflow {
                        buffer.flag(p, record.side, AnomalyKind::Overflow);
                    }
                    if pulse.flags.underflow {
                        buffer.flag(p, record.side, AnomalyKind::Underflow);
                    }
                    if pulse.flags.bad_pedestal {
                        buffer.flag(p, record.side, AnomalyKind::BadPedestal);
                    }
                    summary.fadc_pulses += 1;
                }
                WaveformOutcome::NoData {
                    reason,
                    pedestal,
                    flags,
                } => {
                    if let Some(pedestal) = pedestal {
                        side.fadc_pedestal[p] = pedestal;
                    }
                    store_flags(side, p, flags);
                    buffer.flag(p, record.side, reason);
                }
            }
        }

        tracing::trace!(
            event = event.event_number(),
            tdc_records = summary.tdc_records,
            fadc_pulses = summary.fadc_pulses,
            dropped = summary.dropped,
            "event decoded"
        );
        summary
    }
}

fn store_flags(side: &mut SideBuffer, paddle: usize, flags: WaveformFlags) {
    side.overflow[paddle] = u8::from(flags.overflow);
    side.underflow[paddle] = u8::from(flags.underflow);
    side.pedestal_quality[paddle] = u8::from(flags.bad_pedestal);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::record::RawEvent;
    use scintrec_core::paddle::Side;

    fn decode(event: &RawEvent, n: usize) -> (ChannelBuffer, DecodeSummary) {
        let mut buffer = ChannelBuffer::new(n).unwrap();
        let summary = HitDecoder::default().decode(event, &mut buffer);
        (buffer, summary)
    }

    #[test]
    fn test_tdc_records_fill_sides() {
        let event = RawEvent::new(1)
            .with_tdc(2, Side::Left, 1000)
            .with_tdc(2, Side::Right, 1050);
        let (buffer, summary) = decode(&event, 4);

        assert_eq!(summary.tdc_records, 2);
        assert_eq!(buffer.left.tdc[2], 1000.0);
        assert_eq!(buffer.right.tdc[2], 1050.0);
        assert_eq!(buffer.left.tdc_hits, 1);
        assert!(buffer.left.tdc[0].is_nan());
        assert!(buffer.anomalies.is_empty());
    }

    #[test]
    fn test_multiple_hits_keep_earliest() {
        let event = RawEvent::new(1)
            .with_tdc(0, Side::Left, 1200)
            .with_tdc(0, Side::Left, 1100)
            .with_tdc(0, Side::Left, 1300);
        let (buffer, _) = decode(&event, 1);

        assert_eq!(buffer.left.tdc[0], 1100.0);
        assert_eq!(buffer.left.tdc_multiplicity[0], 3);
        assert_eq!(buffer.left.tdc_hits, 3);
        let multiple: Vec<_> = buffer
            .anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::MultipleTdcHits)
            .collect();
        assert_eq!(multiple.len(), 1);
    }

    #[test]
    fn test_out_of_range_record_dropped() {
        let event = RawEvent::new(1)
            .with_tdc(9, Side::Right, 1000)
            .with_tdc(1, Side::Right, 1000)
            .with_fadc(5, Side::Left, vec![100; 10]);
        let (buffer, summary) = decode(&event, 2);

        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.tdc_records, 1);
        assert_eq!(buffer.right.tdc[1], 1000.0);
        assert_eq!(buffer.anomalies[0].kind, AnomalyKind::PaddleOutOfRange);
        assert_eq!(buffer.anomalies[0].paddle, 9);
    }

    #[test]
    fn test_duplicate_waveform_ignored() {
        let first = vec![100, 100, 100, 100, 300, 500, 300, 100];
        let second = vec![100, 100, 100, 100, 900, 1500, 900, 100];
        let event = RawEvent::new(1)
            .with_fadc(0, Side::Left, first)
            .with_fadc(0, Side::Left, second);
        let (buffer, summary) = decode(&event, 1);

        assert_eq!(summary.fadc_pulses, 1);
        assert_eq!(buffer.left.adc[0], 500.0);
        assert_eq!(buffer.anomalies[0].kind, AnomalyKind::DuplicateWaveform);
    }

    #[test]
    fn test_overflow_waveform_is_no_data() {
        let event = RawEvent::new(1).with_fadc(0, Side::Right, vec![4095; 12]);
        let (buffer, summary) = decode(&event, 1);

        assert_eq!(summary.fadc_pulses, 0);
        assert!(buffer.right.adc[0].is_nan());
        assert!(buffer.right.fadc_time[0].is_nan());
        assert_eq!(buffer.right.overflow[0], 1);
        assert_eq!(buffer.right.adc_hits, 0);
        assert_eq!(buffer.anomalies[0].kind, AnomalyKind::AllOverflow);
    }
}
