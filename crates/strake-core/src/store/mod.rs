pub mod datapath;

pub use datapath::{DataPathAllocator, StorageCursor, MAX_SUBDIR_LIMIT};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrakeError};

/// Physical block storage under one root directory.
///
/// Paths come from the [`DataPathAllocator`]; this type only performs the
/// writes. Payload bytes arrive with any compression/encryption filters
/// already applied upstream.
pub struct BlockStore {
    root: PathBuf,
}

impl BlockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a block to a temp file in the target directory, then atomically
    /// rename into place, so readers never see a partial block.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Store block bytes at the allocated relative path, creating parent
    /// directories on demand.
    pub fn write_block(&self, block_path: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(block_path);
        match self.atomic_write(&path, data) {
            Err(StrakeError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                self.atomic_write(&path, data)
            }
            other => other,
        }
    }

    /// Read a stored block back. `None` if the path was never written (or
    /// its write failed and left a gap).
    pub fn read_block(&self, block_path: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.root.join(block_path)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Sync the root directory so freshly renamed blocks survive a crash;
    /// the recovery scan in [`DataPathAllocator::init`] is the only durable
    /// cursor record.
    pub fn sync(&self) -> Result<()> {
        match fs::File::open(&self.root) {
            Ok(dir) => {
                dir.sync_all()?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        store.write_block("0000/0000/0000", b"block zero").unwrap();
        assert_eq!(
            store.read_block("0000/0000/0000").unwrap().unwrap(),
            b"block zero"
        );
    }

    #[test]
    fn missing_block_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        assert!(store.read_block("0000/0000/0001").unwrap().is_none());
    }

    #[test]
    fn sync_missing_root_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path().join("never-written"));
        store.sync().unwrap();
    }
}
