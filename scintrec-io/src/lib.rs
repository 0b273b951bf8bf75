//! scintrec-io: event file reading and result writers.
//!
//! Event files are JSON-lines streams of raw events, read through a
//! memory-mapped file via memmap2. Reconstructed events are written as
//! CSV (one row per paddle hit) or JSON lines (one summary per event).
//!

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{EventFileReader, MappedFileReader};
pub use writer::{HitFileWriter, OutputFormat};
