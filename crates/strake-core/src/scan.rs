//! Scanner-facing input types and the phase-1 encode-and-transmit half.
//!
//! The directory walker itself lives outside this crate; it hands over one
//! [`ScanEntry`] per filesystem object and this module turns it into the
//! records phase 1 puts on the wire: attributes, path, link target, and a
//! follow-up metadata announcement where one applies.

use crate::error::{Result, StrakeError};
use crate::manifest::record::{EntryKind, LinkKind, ManifestRecord};
use crate::manifest::{RecordSink, StatAttribs};

/// One filesystem object as the scanner reports it.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub path: String,
    /// Target for link objects.
    pub link_target: Option<String>,
    pub attribs: StatAttribs,
    pub kind: ScanKind,
    /// Whether extended metadata must be announced as a follow-up.
    pub has_extra_metadata: bool,
}

/// Object kind as classified by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Regular,
    /// Regular file on an encrypting filesystem.
    EfsRegular,
    Directory,
    SoftLink,
    HardLink,
    Special,
}

/// Command symbols in effect for one run. Client-side encryption switches
/// the file and metadata symbols once at phase-1 start; everything else is
/// fixed.
#[derive(Debug, Clone, Copy)]
pub struct SymbolSelection {
    file: EntryKind,
    metadata: EntryKind,
}

impl SymbolSelection {
    pub fn new(client_encryption: bool) -> Self {
        if client_encryption {
            Self {
                file: EntryKind::Encrypted,
                metadata: EntryKind::EncMetadata,
            }
        } else {
            Self {
                file: EntryKind::Plain,
                metadata: EntryKind::Metadata,
            }
        }
    }

    /// The command symbol a scanned object is announced under.
    pub fn entry_kind(&self, kind: ScanKind) -> EntryKind {
        match kind {
            ScanKind::Regular => self.file,
            ScanKind::EfsRegular => EntryKind::Efs,
            ScanKind::Directory => EntryKind::Directory,
            ScanKind::SoftLink => EntryKind::SoftLink,
            ScanKind::HardLink => EntryKind::HardLink,
            ScanKind::Special => EntryKind::Special,
        }
    }

    pub fn metadata_kind(&self) -> EntryKind {
        self.metadata
    }
}

/// Transmit one scanned entry: attributes, path, link target for links,
/// then the metadata announcement when the entry carries extended metadata.
pub fn send_entry(
    sink: &mut dyn RecordSink,
    symbols: &SymbolSelection,
    entry: &ScanEntry,
) -> Result<()> {
    let kind = symbols.entry_kind(entry.kind);
    send_one(sink, entry, kind)?;
    if entry.has_extra_metadata {
        send_one(sink, entry, symbols.metadata)?;
    }
    Ok(())
}

fn send_one(sink: &mut dyn RecordSink, entry: &ScanEntry, kind: EntryKind) -> Result<()> {
    sink.write_record(&ManifestRecord::Attribs(entry.attribs.encode()))?;
    sink.write_record(&ManifestRecord::Path {
        kind,
        name: entry.path.clone(),
    })?;
    if let Some(link_kind) = LinkKind::from_entry_kind(kind) {
        let target = entry.link_target.as_ref().ok_or_else(|| {
            StrakeError::Other(format!("link entry without a target: {}", entry.path))
        })?;
        sink.write_record(&ManifestRecord::Link {
            kind: link_kind,
            target: target.clone(),
        })?;
    }
    Ok(())
}
