//! Writers for reconstructed events.

use crate::Result;
use scintrec_algorithms::EventSummary;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output layout of a [`HitFileWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One row per paddle hit.
    #[default]
    Csv,
    /// One JSON object per event.
    JsonLines,
}

const CSV_HEADER: &str = "event,paddle,time,time_uncertainty,amplitude,y_time,y_amplitude";

/// Writer for reconstructed paddle hits.
///
/// Missing quantities are written as `NaN` in CSV and `null` in JSON.
pub struct HitFileWriter<W: Write = BufWriter<File>> {
    writer: W,
    format: OutputFormat,
    events: usize,
}

impl HitFileWriter {
    /// Creates a new file writer, writing the CSV header if needed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), format)
    }
}

impl<W: Write> HitFileWriter<W> {
    /// Wraps an arbitrary sink.
    ///
    /// # Errors
    /// Returns an error if the CSV header cannot be written.
    pub fn new(mut writer: W, format: OutputFormat) -> Result<Self> {
        if format == OutputFormat::Csv {
            writeln!(writer, "{CSV_HEADER}")?;
        }
        Ok(Self {
            writer,
            format,
            events: 0,
        })
    }

    /// Writes one event.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn write_event(&mut self, event: &EventSummary) -> Result<()> {
        match self.format {
            OutputFormat::Csv => {
                for hit in &event.hits {
                    writeln!(
                        self.writer,
                        "{},{},{},{},{},{},{}",
                        event.event_number,
                        hit.paddle,
                        hit.time,
                        hit.time_uncertainty,
                        hit.amplitude,
                        hit.y_time,
                        hit.y_amplitude
                    )?;
                }
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, event)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.events += 1;
        Ok(())
    }

    /// Writes a batch of events.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn write_events(&mut self, events: &[EventSummary]) -> Result<()> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Number of events written so far.
    #[must_use]
    pub fn events_written(&self) -> usize {
        self.events
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the underlying sink fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
