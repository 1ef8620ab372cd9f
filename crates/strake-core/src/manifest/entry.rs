//! Assembling logical entries from record streams and writing them back.

use tracing::warn;

use crate::error::{Result, StrakeError};

use super::attribs::StatAttribs;
use super::framing::HEADER_LEN;
use super::record::{ControlMarker, EndFile, EntryKind, LinkKind, ManifestRecord};
use super::{RecordSink, RecordSource};

/// One filesystem object's full metadata record within a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub attribs: StatAttribs,
    pub kind: EntryKind,
    pub path: String,
    /// Target for soft/hard link entries.
    pub link_target: Option<String>,
    /// Block path reference for entries whose data is already stored.
    pub datapath: Option<String>,
    /// End-of-data trailer; present in full manifests for file-data entries.
    pub endfile: Option<EndFile>,
}

/// How strictly a stream frames its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Live wire channel: warnings are logged and skipped, no end-of-data
    /// trailers (the data phase handles those separately).
    Network,
    /// Phase-1 manifest file: no end-of-data trailers.
    Phase1,
    /// Full manifest file: file-data entries must carry their trailer.
    Full,
}

/// Result of reading one entry's worth of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Entry(Entry),
    /// A phase-transition control string ended reading; a terminal status,
    /// not an error.
    PhaseEnd(ControlMarker),
    /// Clean end of stream before any record of a new entry.
    Eof,
}

fn unexpected(expected: &'static str, record: &ManifestRecord) -> StrakeError {
    StrakeError::UnexpectedRecord {
        expected,
        got: record.symbol(),
    }
}

fn require(source: &mut dyn RecordSource) -> Result<ManifestRecord> {
    source.next_record()?.ok_or(StrakeError::TruncatedRead {
        wanted: HEADER_LEN,
        got: 0,
    })
}

/// Read records in the fixed order `Attribs` → `Path` → optional `Link` →
/// optional `EndFile`, preceded by any `DataPath` reference. A record out of
/// position is `UnexpectedRecord` and is surfaced, never skipped.
pub fn read_entry(source: &mut dyn RecordSource, mode: ReadMode) -> Result<ReadOutcome> {
    // Attribute phase: datapath references and (on the wire) warnings may
    // precede the attributes that open the entry.
    let mut datapath: Option<String> = None;
    let attribs = loop {
        let Some(record) = source.next_record()? else {
            if datapath.is_none() {
                return Ok(ReadOutcome::Eof);
            }
            // The stream died inside an entry.
            return Err(StrakeError::TruncatedRead {
                wanted: HEADER_LEN,
                got: 0,
            });
        };
        match record {
            ManifestRecord::DataPath(path) => datapath = Some(path),
            ManifestRecord::Attribs(payload) => break StatAttribs::decode(&payload)?,
            ManifestRecord::Warning(msg) if mode == ReadMode::Network => {
                warn!(warning = %msg, "warning record from peer");
            }
            record => {
                if let Some(marker) = record.control_marker() {
                    return Ok(ReadOutcome::PhaseEnd(marker));
                }
                return Err(unexpected("attributes", &record));
            }
        }
    };

    // Exactly one path record follows the attributes.
    let record = require(source)?;
    let (kind, path) = match record {
        ManifestRecord::Path { kind, name } => (kind, name),
        record => return Err(unexpected("entry path", &record)),
    };

    // Link entries carry exactly one link-target record.
    let mut link_target = None;
    if kind.is_link() {
        let record = require(source)?;
        match record {
            ManifestRecord::Path {
                kind: link_kind,
                name,
            } if link_kind.is_link() => link_target = Some(name),
            ManifestRecord::Link { target, .. } => link_target = Some(target),
            record => return Err(unexpected("link target", &record)),
        }
    }

    // File-data entries in full manifests terminate with their trailer.
    let mut endfile = None;
    if mode == ReadMode::Full && kind.carries_file_data() {
        let record = require(source)?;
        match record {
            ManifestRecord::EndFile(end) => endfile = Some(end),
            record => return Err(unexpected("end-of-data trailer", &record)),
        }
    }

    Ok(ReadOutcome::Entry(Entry {
        attribs,
        kind,
        path,
        link_target,
        datapath,
        endfile,
    }))
}

/// Emit one entry's records in manifest order: `DataPath` (if set),
/// `Attribs`, `Path`, `Link` (if set), and, for full manifests of
/// file-data entries, `EndFile`. Absent optional records are simply
/// omitted.
pub fn write_entry(sink: &mut dyn RecordSink, entry: &Entry, phase1: bool) -> Result<()> {
    if let Some(datapath) = &entry.datapath {
        sink.write_record(&ManifestRecord::DataPath(datapath.clone()))?;
    }
    sink.write_record(&ManifestRecord::Attribs(entry.attribs.encode()))?;
    sink.write_record(&ManifestRecord::Path {
        kind: entry.kind,
        name: entry.path.clone(),
    })?;
    if let (Some(kind), Some(target)) = (
        LinkKind::from_entry_kind(entry.kind),
        entry.link_target.as_ref(),
    ) {
        sink.write_record(&ManifestRecord::Link {
            kind,
            target: target.clone(),
        })?;
    }
    if !phase1 && entry.kind.carries_file_data() {
        if let Some(end) = &entry.endfile {
            sink.write_record(&ManifestRecord::EndFile(end.clone()))?;
        }
    }
    Ok(())
}

/// Write a phase-transition marker.
pub fn write_marker(sink: &mut dyn RecordSink, marker: ControlMarker) -> Result<()> {
    sink.write_record(&ManifestRecord::Generic(marker.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn attribs_record() -> ManifestRecord {
        ManifestRecord::Attribs(StatAttribs::default().encode())
    }

    fn file_entry() -> Entry {
        Entry {
            attribs: StatAttribs {
                size: 4096,
                compression: 9,
                ..Default::default()
            },
            kind: EntryKind::Plain,
            path: "/home/user/notes.txt".into(),
            link_target: None,
            datapath: Some("0000/0000/0001.gz".into()),
            endfile: Some(EndFile {
                bytes: 4096,
                checksum: "8badf00d".into(),
            }),
        }
    }

    #[test]
    fn full_manifest_entry_roundtrip() {
        let entry = file_entry();
        let mut queue = VecDeque::new();
        write_entry(&mut queue, &entry, false).unwrap();
        let outcome = read_entry(&mut queue, ReadMode::Full).unwrap();
        assert_eq!(outcome, ReadOutcome::Entry(entry));
    }

    #[test]
    fn phase1_entry_omits_endfile() {
        let entry = file_entry();
        let mut queue = VecDeque::new();
        write_entry(&mut queue, &entry, true).unwrap();
        assert!(!queue
            .iter()
            .any(|r| matches!(r, ManifestRecord::EndFile(_))));

        let outcome = read_entry(&mut queue, ReadMode::Phase1).unwrap();
        let ReadOutcome::Entry(read_back) = outcome else {
            panic!("expected entry");
        };
        assert_eq!(read_back.endfile, None);
        assert_eq!(read_back.path, entry.path);
    }

    #[test]
    fn link_entry_roundtrip() {
        let entry = Entry {
            attribs: StatAttribs::default(),
            kind: EntryKind::SoftLink,
            path: "/etc/localtime".into(),
            link_target: Some("/usr/share/zoneinfo/UTC".into()),
            datapath: None,
            endfile: None,
        };
        let mut queue = VecDeque::new();
        write_entry(&mut queue, &entry, false).unwrap();
        let outcome = read_entry(&mut queue, ReadMode::Full).unwrap();
        assert_eq!(outcome, ReadOutcome::Entry(entry));
    }

    #[test]
    fn path_before_attribs_is_unexpected() {
        let mut queue = VecDeque::from(vec![
            ManifestRecord::Path {
                kind: EntryKind::Plain,
                name: "/tmp/x".into(),
            },
            attribs_record(),
        ]);
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::UnexpectedRecord {
                expected: "attributes",
                got: 'f'
            })
        ));
    }

    #[test]
    fn link_entry_without_target_is_unexpected() {
        let mut queue = VecDeque::from(vec![
            attribs_record(),
            ManifestRecord::Path {
                kind: EntryKind::SoftLink,
                name: "/etc/localtime".into(),
            },
            attribs_record(),
        ]);
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::UnexpectedRecord {
                expected: "link target",
                ..
            })
        ));
    }

    #[test]
    fn full_mode_requires_endfile_for_file_data() {
        let mut queue = VecDeque::new();
        write_entry(&mut queue, &file_entry(), true).unwrap();
        // Reading a trailerless stream as a full manifest fails at the
        // missing trailer.
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::TruncatedRead { .. })
        ));
    }

    #[test]
    fn directory_entry_needs_no_endfile() {
        let entry = Entry {
            attribs: StatAttribs::default(),
            kind: EntryKind::Directory,
            path: "/var/log".into(),
            link_target: None,
            datapath: None,
            endfile: None,
        };
        let mut queue = VecDeque::new();
        write_entry(&mut queue, &entry, false).unwrap();
        assert_eq!(
            read_entry(&mut queue, ReadMode::Full).unwrap(),
            ReadOutcome::Entry(entry)
        );
    }

    #[test]
    fn control_marker_ends_phase() {
        let mut queue = VecDeque::new();
        write_marker(&mut queue, ControlMarker::BackupEnd).unwrap();
        assert_eq!(
            read_entry(&mut queue, ReadMode::Full).unwrap(),
            ReadOutcome::PhaseEnd(ControlMarker::BackupEnd)
        );
    }

    #[test]
    fn unknown_generic_mid_stream_is_unexpected() {
        let mut queue = VecDeque::from(vec![ManifestRecord::Generic("hello".into())]);
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::UnexpectedRecord { .. })
        ));
    }

    #[test]
    fn network_mode_skips_warnings() {
        let mut queue = VecDeque::from(vec![
            ManifestRecord::Warning("could not open /proc/1/root".into()),
            attribs_record(),
            ManifestRecord::Path {
                kind: EntryKind::Directory,
                name: "/proc".into(),
            },
        ]);
        let outcome = read_entry(&mut queue, ReadMode::Network).unwrap();
        let ReadOutcome::Entry(entry) = outcome else {
            panic!("expected entry");
        };
        assert_eq!(entry.kind, EntryKind::Directory);
    }

    #[test]
    fn file_mode_rejects_warnings() {
        let mut queue = VecDeque::from(vec![ManifestRecord::Warning("noise".into())]);
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::UnexpectedRecord { got: 'w', .. })
        ));
    }

    #[test]
    fn eof_at_boundary_is_clean() {
        let mut queue = VecDeque::new();
        assert_eq!(
            read_entry(&mut queue, ReadMode::Full).unwrap(),
            ReadOutcome::Eof
        );
    }

    #[test]
    fn eof_after_datapath_is_truncated() {
        let mut queue = VecDeque::from(vec![ManifestRecord::DataPath("0000/0000/0000".into())]);
        assert!(matches!(
            read_entry(&mut queue, ReadMode::Full),
            Err(StrakeError::TruncatedRead { .. })
        ));
    }
}
