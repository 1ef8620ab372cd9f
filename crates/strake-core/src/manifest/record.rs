use crate::error::{Result, StrakeError};

/// Kind of filesystem entry a `Path` record announces. The single wire
/// character doubles as the command symbol for the entry's link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain file data.
    Plain,
    /// File data encrypted client-side.
    Encrypted,
    /// Data from an encrypting filesystem; never transparently compressed.
    Efs,
    Directory,
    SoftLink,
    HardLink,
    Special,
    /// Extended metadata carried as a follow-up entry.
    Metadata,
    /// Extended metadata, encrypted client-side.
    EncMetadata,
}

impl EntryKind {
    pub fn symbol(self) -> char {
        match self {
            EntryKind::Plain => 'f',
            EntryKind::Encrypted => 'y',
            EntryKind::Efs => 'k',
            EntryKind::Directory => 'd',
            EntryKind::SoftLink => 'l',
            EntryKind::HardLink => 'L',
            EntryKind::Special => 's',
            EntryKind::Metadata => 'm',
            EntryKind::EncMetadata => 'n',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'f' => Some(EntryKind::Plain),
            'y' => Some(EntryKind::Encrypted),
            'k' => Some(EntryKind::Efs),
            'd' => Some(EntryKind::Directory),
            'l' => Some(EntryKind::SoftLink),
            'L' => Some(EntryKind::HardLink),
            's' => Some(EntryKind::Special),
            'm' => Some(EntryKind::Metadata),
            'n' => Some(EntryKind::EncMetadata),
            _ => None,
        }
    }

    pub fn is_link(self) -> bool {
        matches!(self, EntryKind::SoftLink | EntryKind::HardLink)
    }

    /// Whether entries of this kind carry file data (and therefore an
    /// end-of-data trailer in full manifests).
    pub fn carries_file_data(self) -> bool {
        matches!(
            self,
            EntryKind::Plain
                | EntryKind::Encrypted
                | EntryKind::Efs
                | EntryKind::Metadata
                | EntryKind::EncMetadata
        )
    }

    pub fn is_efs(self) -> bool {
        matches!(self, EntryKind::Efs)
    }
}

/// Link flavor; shares the wire symbol of the corresponding entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Soft,
    Hard,
}

impl LinkKind {
    pub fn symbol(self) -> char {
        match self {
            LinkKind::Soft => 'l',
            LinkKind::Hard => 'L',
        }
    }

    pub fn from_entry_kind(kind: EntryKind) -> Option<Self> {
        match kind {
            EntryKind::SoftLink => Some(LinkKind::Soft),
            EntryKind::HardLink => Some(LinkKind::Hard),
            _ => None,
        }
    }
}

/// End-of-data trailer for a file-bearing entry: byte count and content
/// checksum, framed as `<bytes>:<checksum>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndFile {
    pub bytes: u64,
    pub checksum: String,
}

impl EndFile {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.bytes, self.checksum)
    }

    pub fn parse(payload: &str) -> Result<Self> {
        let (bytes, checksum) = payload.split_once(':').ok_or_else(|| {
            StrakeError::Framing(format!("end-of-data trailer without ':': {payload:?}"))
        })?;
        let bytes = bytes.parse::<u64>().map_err(|_| {
            StrakeError::Framing(format!("bad byte count in end-of-data trailer: {payload:?}"))
        })?;
        Ok(Self {
            bytes,
            checksum: checksum.to_string(),
        })
    }
}

/// Control strings carried in `Generic` records that terminate a reading
/// phase. Reported as a distinct terminal status, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMarker {
    BackupEnd,
    RestoreEnd,
    Phase1End,
    BackupPhase2,
    EstimateEnd,
}

impl ControlMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMarker::BackupEnd => "backupend",
            ControlMarker::RestoreEnd => "restoreend",
            ControlMarker::Phase1End => "phase1end",
            ControlMarker::BackupPhase2 => "backupphase2",
            ControlMarker::EstimateEnd => "estimateend",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backupend" => Some(ControlMarker::BackupEnd),
            "restoreend" => Some(ControlMarker::RestoreEnd),
            "phase1end" => Some(ControlMarker::Phase1End),
            "backupphase2" => Some(ControlMarker::BackupPhase2),
            "estimateend" => Some(ControlMarker::EstimateEnd),
            _ => None,
        }
    }
}

/// One framed record in a manifest or on the wire.
///
/// Link-capable symbols (`l`, `L`) are position-dependent on the wire: the
/// same symbol names the entry's path record and, immediately after it, the
/// link target. Context-free decoding maps them to `Path`; entry assembly
/// reinterprets the record following a link-kind path as the `Link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestRecord {
    /// Encoded stat metadata plus compression flag.
    Attribs(String),
    /// Entry path name, tagged with the entry kind.
    Path { kind: EntryKind, name: String },
    /// Symlink/hardlink target.
    Link { kind: LinkKind, target: String },
    /// Reference to a previously allocated block path.
    DataPath(String),
    /// End-of-data trailer.
    EndFile(EndFile),
    /// Backup-run identifier.
    Timestamp(String),
    Warning(String),
    Error(String),
    /// Control strings such as phase markers.
    Generic(String),
}

impl ManifestRecord {
    pub fn symbol(&self) -> char {
        match self {
            ManifestRecord::Attribs(_) => 'r',
            ManifestRecord::Path { kind, .. } => kind.symbol(),
            ManifestRecord::Link { kind, .. } => kind.symbol(),
            ManifestRecord::DataPath(_) => 't',
            ManifestRecord::EndFile(_) => 'x',
            ManifestRecord::Timestamp(_) => 'b',
            ManifestRecord::Warning(_) => 'w',
            ManifestRecord::Error(_) => 'e',
            ManifestRecord::Generic(_) => 'c',
        }
    }

    pub fn payload(&self) -> std::borrow::Cow<'_, str> {
        use std::borrow::Cow;
        match self {
            ManifestRecord::Attribs(s)
            | ManifestRecord::DataPath(s)
            | ManifestRecord::Timestamp(s)
            | ManifestRecord::Warning(s)
            | ManifestRecord::Error(s)
            | ManifestRecord::Generic(s) => Cow::Borrowed(s),
            ManifestRecord::Path { name, .. } => Cow::Borrowed(name),
            ManifestRecord::Link { target, .. } => Cow::Borrowed(target),
            ManifestRecord::EndFile(end) => Cow::Owned(end.encode()),
        }
    }

    /// Build a record from a decoded frame. Unknown symbols are framing
    /// errors carrying the offending byte for the caller's log.
    pub fn from_frame(symbol: char, payload: Vec<u8>) -> Result<Self> {
        let payload = String::from_utf8(payload)
            .map_err(|_| StrakeError::Framing(format!("non-UTF-8 payload for '{symbol}'")))?;
        if let Some(kind) = EntryKind::from_symbol(symbol) {
            return Ok(ManifestRecord::Path {
                kind,
                name: payload,
            });
        }
        match symbol {
            'r' => Ok(ManifestRecord::Attribs(payload)),
            't' => Ok(ManifestRecord::DataPath(payload)),
            'x' => Ok(ManifestRecord::EndFile(EndFile::parse(&payload)?)),
            'b' => Ok(ManifestRecord::Timestamp(payload)),
            'w' => Ok(ManifestRecord::Warning(payload)),
            'e' => Ok(ManifestRecord::Error(payload)),
            'c' => Ok(ManifestRecord::Generic(payload)),
            other => Err(StrakeError::Framing(format!(
                "unknown record symbol '{other}'"
            ))),
        }
    }

    /// The control marker, if this is a phase-terminating generic record.
    pub fn control_marker(&self) -> Option<ControlMarker> {
        match self {
            ManifestRecord::Generic(s) => ControlMarker::parse(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_free_symbols_roundtrip() {
        let records = vec![
            ManifestRecord::Attribs("1 2 3".into()),
            ManifestRecord::Path {
                kind: EntryKind::Plain,
                name: "/etc/hosts".into(),
            },
            ManifestRecord::Path {
                kind: EntryKind::Directory,
                name: "/etc".into(),
            },
            ManifestRecord::Path {
                kind: EntryKind::Special,
                name: "/dev/null".into(),
            },
            ManifestRecord::Path {
                kind: EntryKind::Efs,
                name: "C:/secret".into(),
            },
            ManifestRecord::Path {
                kind: EntryKind::Metadata,
                name: "/etc/hosts".into(),
            },
            ManifestRecord::DataPath("0000/0000/0001.gz".into()),
            ManifestRecord::EndFile(EndFile {
                bytes: 4096,
                checksum: "d41d8cd9".into(),
            }),
            ManifestRecord::Timestamp("0000005 2026-01-02 03:04:05".into()),
            ManifestRecord::Warning("skipping changed file".into()),
            ManifestRecord::Error("backup not found".into()),
            ManifestRecord::Generic("backupphase2".into()),
        ];
        for record in records {
            let symbol = record.symbol();
            let payload = record.payload().into_owned().into_bytes();
            let decoded = ManifestRecord::from_frame(symbol, payload).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn link_symbols_decode_as_path_records() {
        let decoded = ManifestRecord::from_frame('l', b"target".to_vec()).unwrap();
        assert_eq!(
            decoded,
            ManifestRecord::Path {
                kind: EntryKind::SoftLink,
                name: "target".into()
            }
        );
    }

    #[test]
    fn unknown_symbol_is_framing_error() {
        assert!(matches!(
            ManifestRecord::from_frame('Z', Vec::new()),
            Err(StrakeError::Framing(_))
        ));
    }

    #[test]
    fn endfile_parse_and_encode() {
        let end = EndFile::parse("1234:abcdef").unwrap();
        assert_eq!(end.bytes, 1234);
        assert_eq!(end.checksum, "abcdef");
        assert_eq!(end.encode(), "1234:abcdef");

        assert!(EndFile::parse("no-colon").is_err());
        assert!(EndFile::parse("abc:def").is_err());
        // Empty checksum is allowed.
        assert_eq!(EndFile::parse("0:").unwrap().checksum, "");
    }

    #[test]
    fn control_markers_parse_exactly() {
        for marker in [
            ControlMarker::BackupEnd,
            ControlMarker::RestoreEnd,
            ControlMarker::Phase1End,
            ControlMarker::BackupPhase2,
            ControlMarker::EstimateEnd,
        ] {
            assert_eq!(ControlMarker::parse(marker.as_str()), Some(marker));
        }
        assert_eq!(ControlMarker::parse("backupend "), None);
        let record = ManifestRecord::Generic("phase1end".into());
        assert_eq!(record.control_marker(), Some(ControlMarker::Phase1End));
        assert_eq!(
            ManifestRecord::Generic("hello".into()).control_marker(),
            None
        );
    }
}
