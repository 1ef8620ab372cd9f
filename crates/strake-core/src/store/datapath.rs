use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StrakeError};

/// Hard ceiling on `max_storage_subdirs`: each level renders as four hex
/// digits, so 0x10000 distinct values is the full addressable space.
pub const MAX_SUBDIR_LIMIT: u32 = 0x1_0000;

/// Three-level directory address of a stored block.
///
/// Counters are 16-bit-range values held as `u32` so the full-space bound
/// (`max_storage_subdirs = 0x10000`) stays representable during carry checks.
/// The triple always points at the *next unused* slot; it is recovered from
/// the directory tree itself, never from a checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageCursor {
    pub prim: u32,
    pub seco: u32,
    pub tert: u32,
}

impl StorageCursor {
    /// Render the cursor as a relative block path, `PPPP/SSSS/TTTT[.gz]`.
    /// The compression suffix is suppressed for EFS-sourced data, which
    /// cannot be transparently compressed.
    pub fn render(&self, compressed: bool, is_efs: bool) -> String {
        format!(
            "{:04X}/{:04X}/{:04X}{}",
            self.prim,
            self.seco,
            self.tert,
            if compressed && !is_efs { ".gz" } else { "" }
        )
    }
}

/// Hands out storage paths for new blocks under one storage root.
///
/// One instance per backup run; all mutation goes through `&mut self`, and
/// the deduplication engine serializes access (single logical writer per
/// root).
#[derive(Debug)]
pub struct DataPathAllocator {
    base: PathBuf,
    cursor: StorageCursor,
    max_subdirs: u32,
}

impl DataPathAllocator {
    /// Recover the cursor from the on-disk tree under `base` and advance it
    /// to the first free slot.
    ///
    /// Missing directories contribute zero; a base that exists but cannot be
    /// read is an error. The cursor is advanced past the highest existing
    /// leaf only when the deepest level actually contained one, so a fresh
    /// store starts at `0000/0000/0000`.
    pub fn init(base: impl Into<PathBuf>, max_subdirs: u32) -> Result<Self> {
        if max_subdirs == 0 || max_subdirs > MAX_SUBDIR_LIMIT {
            return Err(StrakeError::Config(format!(
                "max_storage_subdirs must be in 1..={MAX_SUBDIR_LIMIT:#X}, got {max_subdirs}"
            )));
        }
        let base = base.into();

        let prim = highest_entry(&base)?;
        let mut cursor = StorageCursor {
            prim: prim.unwrap_or(0),
            seco: 0,
            tert: 0,
        };

        let seco = highest_entry(&base.join(format!("{:04X}", cursor.prim)))?;
        cursor.seco = seco.unwrap_or(0);

        let tert = highest_entry(
            &base.join(format!("{:04X}/{:04X}", cursor.prim, cursor.seco)),
        )?;
        cursor.tert = tert.unwrap_or(0);

        let mut allocator = Self {
            base,
            cursor,
            max_subdirs,
        };

        // The scan landed on the latest data file; step past it. An empty
        // tree has no latest file and slot zero is already free.
        if tert.is_some() {
            allocator.increment()?;
        }

        debug!(
            prim = allocator.cursor.prim,
            seco = allocator.cursor.seco,
            tert = allocator.cursor.tert,
            base = %allocator.base.display(),
            "recovered datapath cursor"
        );

        Ok(allocator)
    }

    /// The next-unused slot.
    pub fn cursor(&self) -> StorageCursor {
        self.cursor
    }

    /// Root directory this allocator assigns paths under.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Render the current (next-unused) slot as a block path.
    pub fn render(&self, compressed: bool, is_efs: bool) -> String {
        self.cursor.render(compressed, is_efs)
    }

    /// Advance to the next slot, carrying `tert` into `seco` into `prim`.
    /// Carrying out of `prim` means the root's path space is used up, a
    /// reported condition, never a silent wraparound.
    pub fn increment(&mut self) -> Result<()> {
        self.cursor.tert += 1;
        if self.cursor.tert >= self.max_subdirs {
            self.cursor.tert = 0;
            self.cursor.seco += 1;
            if self.cursor.seco >= self.max_subdirs {
                self.cursor.seco = 0;
                self.cursor.prim += 1;
                if self.cursor.prim >= self.max_subdirs {
                    return Err(StrakeError::AllocationExhausted);
                }
            }
        }
        Ok(())
    }

    /// Adopt an externally supplied datapath reference (e.g. from a resumed
    /// run's manifest) when it is strictly higher in all three components,
    /// then step past it so the adopted slot is never reissued.
    ///
    /// Legacy tree-style references (leading `t`) and anything that does not
    /// parse as `PPPP/SSSS/TTTT` are no-ops.
    pub fn adopt_if_higher(&mut self, datapath: &str) -> Result<()> {
        let Some(candidate) = parse_triple(datapath) else {
            return Ok(());
        };
        if candidate.prim > self.cursor.prim
            && candidate.seco > self.cursor.seco
            && candidate.tert > self.cursor.tert
        {
            self.cursor = candidate;
            self.increment()?;
        }
        Ok(())
    }
}

/// Parse the leading `PPPP/SSSS/TTTT` of a datapath reference. Trailing
/// text (such as a `.gz` suffix) is ignored. Returns `None` for tree-style
/// references and malformed input.
fn parse_triple(datapath: &str) -> Option<StorageCursor> {
    if datapath.starts_with('t') {
        // The path used the legacy tree-style structure.
        return None;
    }
    let bytes = datapath.as_bytes();
    if bytes.len() < 14 || bytes[4] != b'/' || bytes[9] != b'/' {
        return None;
    }
    let prim = parse_hex4(&datapath[0..4])?;
    let seco = parse_hex4(&datapath[5..9])?;
    let tert = parse_hex4(&datapath[10..14])?;
    Some(StorageCursor { prim, seco, tert })
}

fn parse_hex4(s: &str) -> Option<u32> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

/// Highest hex-named entry in `dir`. Names are taken up to the first `.`
/// (so `0AF3.gz` counts as `0x0AF3`); anything non-hex or out of 16-bit
/// range is ignored, which keeps recovery resilient to stray files.
/// A missing directory is `None`; an unreadable one is an error.
fn highest_entry(dir: &Path) -> Result<Option<u32>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut max: Option<u32> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let stem = name.split('.').next().unwrap_or("");
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }
        let Ok(value) = u32::from_str_radix(stem, 16) else {
            continue;
        };
        if value >= MAX_SUBDIR_LIMIT {
            continue;
        }
        max = Some(max.map_or(value, |m| m.max(value)));
    }
    Ok(max)
}
