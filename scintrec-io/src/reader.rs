//! Memory-mapped file readers.
//!

use crate::{Error, Result};
use memmap2::Mmap;
use scintrec_fadc::RawEvent;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and is not expected to be
        // modified while mapped.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reader for JSON-lines event files.
///
/// Each record is one [`RawEvent`] object; any whitespace, including
/// newlines, may separate records.
pub struct EventFileReader {
    reader: MappedFileReader,
}

impl EventFileReader {
    /// Opens an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Lazily parse the events in file order.
    pub fn events(&self) -> impl Iterator<Item = Result<RawEvent>> + '_ {
        serde_json::Deserializer::from_slice(self.reader.as_bytes())
            .into_iter::<RawEvent>()
            .enumerate()
            .map(|(index, event)| event.map_err(|source| Error::InvalidRecord { index, source }))
    }

    /// Parse every event in the file.
    ///
    /// # Errors
    /// Returns the first malformed record.
    pub fn read_all(&self) -> Result<Vec<RawEvent>> {
        let events = self.events().collect::<Result<Vec<_>>>()?;
        tracing::info!(
            path = %self.reader.path().display(),
            events = events.len(),
            bytes = self.file_size(),
            "event file read"
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scintrec_fadc::{EventRecords, Side};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mapped_file_reader() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..64).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 64);
        assert!(!reader.is_empty());
        assert_eq!(reader.as_bytes(), &data[..]);
    }

    #[test]
    fn test_event_file_reader() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"event_number": 1, "tdc": [{{"paddle": 0, "side": "left", "value": 100}}]}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"event_number": 2}}"#).unwrap();
        file.flush().unwrap();

        let events = EventFileReader::open(file.path()).unwrap().read_all().unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tdc_records()[0].side, Side::Left);
        assert_eq!(events[1].event_number(), 2);
        assert!(events[1].is_empty());
    }

    #[test]
    fn test_event_file_reader_empty() {
        let file = NamedTempFile::new().unwrap();
        let reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.file_size(), 0);
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_event_file_reader_reports_bad_record() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"event_number": 1}}"#).unwrap();
        writeln!(file, r#"{{"event_number": "two"}}"#).unwrap();
        file.flush().unwrap();

        let err = EventFileReader::open(file.path())
            .unwrap()
            .read_all()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { index: 1, .. }));
    }
}
