use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_max_storage_subdirs() -> u32 {
    30000
}

fn default_batch_threshold() -> usize {
    64
}

/// Parameters for one storage root. The surrounding application owns config
/// file loading; this struct is the seam it fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the block store (the three-level hex tree).
    pub data_root: PathBuf,
    /// Bound on the number of entries per directory level.
    #[serde(default = "default_max_storage_subdirs")]
    pub max_storage_subdirs: u32,
    /// Default compression flag for newly stored blocks.
    #[serde(default)]
    pub compression: bool,
    /// Number of blocks queued before a batched dedup decision resolves.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,
    /// Location of the sparse candidate index. Defaults to `sparse` inside
    /// the data root (a non-hex name, invisible to the allocator's scan).
    #[serde(default)]
    pub sparse_index: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            max_storage_subdirs: default_max_storage_subdirs(),
            compression: false,
            batch_threshold: default_batch_threshold(),
            sparse_index: None,
        }
    }

    /// Resolved path of the sparse candidate index file.
    pub fn sparse_index_path(&self) -> PathBuf {
        self.sparse_index
            .clone()
            .unwrap_or_else(|| self.data_root.join("sparse"))
    }
}
