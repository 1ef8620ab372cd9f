//! Manifest record codec: the framed record format shared by the live wire
//! channel, durable manifest files, and list/diff readers.

pub mod attribs;
pub mod entry;
pub mod file;
pub mod framing;
pub mod record;
pub mod wire;

pub use attribs::StatAttribs;
pub use entry::{read_entry, write_entry, write_marker, Entry, ReadMode, ReadOutcome};
pub use file::{ManifestFormat, ManifestReader, ManifestWriter};
pub use record::{ControlMarker, EndFile, EntryKind, LinkKind, ManifestRecord};

use crate::error::Result;

/// Anything records can be read from: a manifest file, the wire channel, or
/// an in-memory queue. Listing/diff consumers go through this seam and never
/// interpret raw bytes.
pub trait RecordSource {
    /// Next record, or `None` at a clean end of stream.
    fn next_record(&mut self) -> Result<Option<ManifestRecord>>;
}

/// Anything records can be written to.
pub trait RecordSink {
    fn write_record(&mut self, record: &ManifestRecord) -> Result<()>;
}

/// In-memory record queue; a staging buffer and the natural test double.
impl RecordSource for std::collections::VecDeque<ManifestRecord> {
    fn next_record(&mut self) -> Result<Option<ManifestRecord>> {
        Ok(self.pop_front())
    }
}

impl RecordSink for std::collections::VecDeque<ManifestRecord> {
    fn write_record(&mut self, record: &ManifestRecord) -> Result<()> {
        self.push_back(record.clone());
        Ok(())
    }
}
