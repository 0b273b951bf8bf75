//! Raw per-channel records of one event.

use scintrec_core::paddle::Side;
use serde::{Deserialize, Serialize};

/// One TDC value on a logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdcRecord {
    /// Paddle index from the channel map.
    pub paddle: usize,
    /// PMT side.
    pub side: Side,
    /// Raw TDC value (channels).
    pub value: u32,
}

/// One FADC sample window on a logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadcRecord {
    /// Paddle index from the channel map.
    pub paddle: usize,
    /// PMT side.
    pub side: Side,
    /// Raw samples (ADC counts).
    pub samples: Vec<u16>,
}

/// Access to the raw records of one event, already restricted to this
/// detector's logical channels.
///
/// Any event source can feed the decoder by implementing this trait.
pub trait EventRecords {
    /// TDC records, in readout order.
    fn tdc_records(&self) -> &[TdcRecord];

    /// FADC records, in readout order.
    fn fadc_records(&self) -> &[FadcRecord];

    /// Event number, if the source tracks one.
    fn event_number(&self) -> u64 {
        0
    }
}

/// Owned raw event, as read from event files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event number.
    #[serde(default)]
    pub event_number: u64,
    /// TDC records.
    #[serde(default)]
    pub tdc: Vec<TdcRecord>,
    /// FADC records.
    #[serde(default)]
    pub fadc: Vec<FadcRecord>,
}

impl RawEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new(event_number: u64) -> Self {
        Self {
            event_number,
            ..Self::default()
        }
    }

    /// Adds a TDC record.
    #[must_use]
    pub fn with_tdc(mut self, paddle: usize, side: Side, value: u32) -> Self {
        self.tdc.push(TdcRecord {
            paddle,
            side,
            value,
        });
        self
    }

    /// Adds an FADC record.
    #[must_use]
    pub fn with_fadc(mut self, paddle: usize, side: Side, samples: Vec<u16>) -> Self {
        self.fadc.push(FadcRecord {
            paddle,
            side,
            samples,
        });
        self
    }

    /// True if the event has no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tdc.is_empty() && self.fadc.is_empty()
    }
}

impl EventRecords for RawEvent {
    fn tdc_records(&self) -> &[TdcRecord] {
        &self.tdc
    }

    fn fadc_records(&self) -> &[FadcRecord] {
        &self.fadc
    }

    fn event_number(&self) -> u64 {
        self.event_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let event = RawEvent::new(7)
            .with_tdc(2, Side::Left, 1000)
            .with_fadc(2, Side::Right, vec![100, 100, 400]);

        assert_eq!(event.event_number(), 7);
        assert_eq!(event.tdc_records().len(), 1);
        assert_eq!(event.fadc_records()[0].samples.len(), 3);
        assert!(!event.is_empty());
        assert!(RawEvent::new(0).is_empty());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "event_number": 12,
            "tdc": [ { "paddle": 0, "side": "left", "value": 1200 } ]
        }"#;
        let event: RawEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_number, 12);
        assert_eq!(event.tdc[0].side, Side::Left);
        assert!(event.fadc.is_empty());
    }
}
