use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use strake_types::Signature;
use tracing::debug;

use crate::error::{Result, StrakeError};
use crate::store::StorageCursor;

/// Magic bytes at the start of the sparse index file.
const MAGIC: &[u8; 8] = b"STSPARSE";

/// Current format version.
const VERSION: u32 = 1;

/// Size of the fixed header: magic + version + entry count + reserved.
const HEADER_SIZE: usize = 20;

/// Size of each entry: 32-byte signature + 4-byte score + three 2-byte
/// cursor components + flags byte + reserved byte.
const ENTRY_SIZE: usize = 44;

const FLAG_COMPRESSED: u8 = 0x01;

/// One candidate in the sparse index: a signature, its comparative score,
/// and the generating cursor triple. The rendered block path is derived,
/// never stored, so entries stay fixed-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseEntry {
    pub signature: Signature,
    pub score: u32,
    pub prim: u16,
    pub seco: u16,
    pub tert: u16,
    pub compressed: bool,
}

impl SparseEntry {
    pub fn new(signature: Signature, score: u32, cursor: StorageCursor, compressed: bool) -> Self {
        Self {
            signature,
            score,
            prim: cursor.prim as u16,
            seco: cursor.seco as u16,
            tert: cursor.tert as u16,
            compressed,
        }
    }

    /// Render the stored location as a block path. Tree-style legacy paths
    /// never appear here: the allocator does not generate them.
    pub fn block_path(&self) -> String {
        StorageCursor {
            prim: self.prim as u32,
            seco: self.seco as u32,
            tert: self.tert as u32,
        }
        .render(self.compressed, false)
    }
}

/// Memory-mapped reader over the sorted sparse index file. Lookups use
/// binary search over the fixed-size entries; the OS pages the file in, so
/// resident memory stays bounded no matter how large the store grows.
pub struct SparseIndexFile {
    mmap: Mmap,
    entry_count: u32,
}

impl SparseIndexFile {
    /// Open and validate the sparse index. A missing file is `Ok(None)`
    /// (empty index); a present but malformed file is `IndexCorrupt`, which
    /// the engine treats as "no dedup this run" rather than a fatal error.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // SAFETY: the file is only read, and it is always written atomically
        // (temp + rename), so a mapped view is internally consistent.
        let mmap = unsafe { Mmap::map(&file) }.map_err(StrakeError::Io)?;

        if mmap.len() < HEADER_SIZE {
            return Err(StrakeError::IndexCorrupt(format!(
                "file too small for header: {} bytes",
                mmap.len()
            )));
        }
        if &mmap[0..8] != MAGIC {
            return Err(StrakeError::IndexCorrupt("bad magic".into()));
        }
        let version = u32::from_le_bytes(mmap[8..12].try_into().unwrap());
        if version != VERSION {
            return Err(StrakeError::IndexCorrupt(format!(
                "unsupported version {version}"
            )));
        }
        let entry_count = u32::from_le_bytes(mmap[12..16].try_into().unwrap());
        let expected_size = HEADER_SIZE + (entry_count as usize) * ENTRY_SIZE;
        if mmap.len() != expected_size {
            return Err(StrakeError::IndexCorrupt(format!(
                "size mismatch: {} bytes, expected {expected_size}",
                mmap.len()
            )));
        }

        debug!(entries = entry_count, path = %path.display(), "opened sparse index");

        Ok(Some(Self { mmap, entry_count }))
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    fn signature_bytes_at(&self, i: usize) -> &[u8] {
        let offset = HEADER_SIZE + i * ENTRY_SIZE;
        &self.mmap[offset..offset + 32]
    }

    fn entry_at(&self, i: usize) -> SparseEntry {
        let data = &self.mmap[HEADER_SIZE + i * ENTRY_SIZE..];
        let mut sig = [0u8; 32];
        sig.copy_from_slice(&data[..32]);
        let score = u32::from_le_bytes(data[32..36].try_into().unwrap());
        let prim = u16::from_le_bytes(data[36..38].try_into().unwrap());
        let seco = u16::from_le_bytes(data[38..40].try_into().unwrap());
        let tert = u16::from_le_bytes(data[40..42].try_into().unwrap());
        let flags = data[42];
        SparseEntry {
            signature: Signature(sig),
            score,
            prim,
            seco,
            tert,
            compressed: flags & FLAG_COMPRESSED != 0,
        }
    }

    /// Binary search for a signature.
    pub fn lookup(&self, signature: &Signature) -> Option<SparseEntry> {
        let target = signature.0.as_slice();
        let mut lo: usize = 0;
        let mut hi: usize = self.entry_count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.signature_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Equal => return Some(self.entry_at(mid)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// Iterate over all entries in signature order.
    pub fn iter(&self) -> impl Iterator<Item = SparseEntry> + '_ {
        (0..self.entry_count as usize).map(move |i| self.entry_at(i))
    }
}

/// Write a sparse index file atomically (temp + rename). Entries are sorted
/// by signature before writing so the mmap reader can binary-search.
pub fn write_sparse_file(path: &Path, entries: &mut Vec<SparseEntry>) -> Result<()> {
    entries.sort_unstable_by(|a, b| a.signature.0.cmp(&b.signature.0));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let file = std::fs::File::create(&tmp_path)?;
    let mut w = BufWriter::new(file);

    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&(entries.len() as u32).to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?; // reserved

    for entry in entries.iter() {
        w.write_all(&entry.signature.0)?;
        w.write_all(&entry.score.to_le_bytes())?;
        w.write_all(&entry.prim.to_le_bytes())?;
        w.write_all(&entry.seco.to_le_bytes())?;
        w.write_all(&entry.tert.to_le_bytes())?;
        let flags = if entry.compressed { FLAG_COMPRESSED } else { 0 };
        w.write_all(&[flags, 0])?;
    }

    w.flush()?;
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;

    debug!(entries = entries.len(), path = %path.display(), "wrote sparse index");

    Ok(())
}
