//! The deduplication engine: one instance per backup run, orchestrating the
//! candidate index and the path allocator into per-block decisions.

use std::path::PathBuf;

use strake_types::Signature;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StrakeError};
use crate::index::sparse::SparseEntry;
use crate::index::CandidateIndex;
use crate::store::{BlockStore, DataPathAllocator, StorageCursor};

/// A unit of file data considered for deduplication. The payload arrives
/// with any compression/encryption filters already applied; the flags only
/// steer path rendering and index bookkeeping.
#[derive(Debug, Clone)]
pub struct Block {
    pub data: Vec<u8>,
    pub compressed: bool,
    pub is_efs: bool,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            compressed: false,
            is_efs: false,
        }
    }
}

/// Outcome of a per-block decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// An acceptable duplicate already exists at this path; nothing written.
    Matched(String),
    /// The block was new and now lives at this path.
    Stored(String),
}

impl Decision {
    /// The block path the manifest record should reference either way.
    pub fn block_path(&self) -> &str {
        match self {
            Decision::Matched(path) | Decision::Stored(path) => path,
        }
    }
}

/// Outcome of the non-blocking batching variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeDecision {
    /// Queued; not enough context yet.
    Pending,
    /// The batch threshold was reached: decisions for every queued block, in
    /// enqueue order.
    Resolved(Vec<Decision>),
}

/// Blocks awaiting a batched decision. Owned by the caller so out-of-order
/// arrival and stream boundaries stay its concern.
#[derive(Debug, Default)]
pub struct PendingBlocks {
    blocks: Vec<Block>,
}

impl PendingBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Per-run deduplication state. All mutation funnels through `&mut self`,
/// which is what makes the allocator's increment the sole source of new
/// paths within a process.
pub struct DedupEngine {
    store: BlockStore,
    allocator: DataPathAllocator,
    index: CandidateIndex,
    sparse_path: PathBuf,
    signature_key: [u8; 32],
    dedup_disabled: bool,
    batch_threshold: usize,
}

impl DedupEngine {
    /// Recover the allocator from the on-disk tree and load the sparse
    /// candidate index.
    ///
    /// Allocator I/O failures are fatal: without a trustworthy cursor the
    /// engine cannot allocate. A corrupt sparse index merely disables
    /// deduplication for the run: losing dedup costs storage efficiency,
    /// not correctness, and the backup must still complete.
    pub fn open(config: &StoreConfig, signature_key: [u8; 32]) -> Result<Self> {
        let allocator = DataPathAllocator::init(&config.data_root, config.max_storage_subdirs)?;
        let sparse_path = config.sparse_index_path();

        let (index, dedup_disabled) = match CandidateIndex::load(&sparse_path) {
            Ok(index) => (index, false),
            Err(StrakeError::IndexCorrupt(reason)) => {
                warn!(%reason, "sparse index unreadable; deduplication disabled for this run");
                (CandidateIndex::empty(), true)
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            store: BlockStore::new(&config.data_root),
            allocator,
            index,
            sparse_path,
            signature_key,
            dedup_disabled,
            batch_threshold: config.batch_threshold.max(1),
        })
    }

    /// Whether the run is operating with deduplication failed open.
    pub fn dedup_disabled(&self) -> bool {
        self.dedup_disabled
    }

    /// The next slot the allocator will issue.
    pub fn cursor(&self) -> StorageCursor {
        self.allocator.cursor()
    }

    /// Feed a datapath reference from a resumed or merged manifest into the
    /// allocator so parallel histories stay monotonic.
    pub fn adopt_datapath(&mut self, datapath: &str) -> Result<()> {
        self.allocator.adopt_if_higher(datapath)
    }

    /// Decide one block: `Matched` against an existing store, or `Stored`
    /// at a freshly allocated path.
    pub fn deduplicate(&mut self, block: &Block) -> Result<Decision> {
        let signature = Signature::compute(&self.signature_key, &block.data);

        if !self.dedup_disabled {
            if let Some(candidate) = self.index.lookup(&signature) {
                self.index.note_hit(&signature);
                let path = candidate.block_path();
                debug!(%signature, %path, "dedup hit");
                return Ok(Decision::Matched(path));
            }
        }

        let path = self.allocator.render(block.compressed, block.is_efs);
        let cursor = self.allocator.cursor();
        // The slot is consumed before the write: a failed write leaves a
        // permanent, harmless gap rather than a reusable path.
        self.allocator.increment()?;
        self.store.write_block(&path, &block.data)?;

        if !self.dedup_disabled {
            self.index.insert(SparseEntry::new(
                signature,
                0,
                cursor,
                block.compressed && !block.is_efs,
            ));
        }

        debug!(%signature, %path, "stored new block");
        Ok(Decision::Stored(path))
    }

    /// Queue a block for a batched decision. Returns `Pending` until the
    /// batch threshold is reached, then resolves the whole queue exactly as
    /// [`Self::deduplicate`] would, in enqueue order.
    pub fn deduplicate_maybe(
        &mut self,
        pending: &mut PendingBlocks,
        block: Block,
    ) -> Result<MaybeDecision> {
        pending.blocks.push(block);
        if pending.blocks.len() < self.batch_threshold {
            return Ok(MaybeDecision::Pending);
        }
        Ok(MaybeDecision::Resolved(self.flush_pending(pending)?))
    }

    /// Resolve everything still queued, in enqueue order.
    pub fn flush_pending(&mut self, pending: &mut PendingBlocks) -> Result<Vec<Decision>> {
        let blocks = std::mem::take(&mut pending.blocks);
        let mut decisions = Vec::with_capacity(blocks.len());
        for block in &blocks {
            decisions.push(self.deduplicate(block)?);
        }
        Ok(decisions)
    }

    /// End-of-run finalization: resolve any queued blocks, flush the sparse
    /// index, and sync the storage root so the next `init` scan recovers the
    /// cursor from what is actually on disk. Returns the tail decisions.
    ///
    /// When the run failed open, the (corrupt) sparse file is left untouched
    /// for inspection; a session with no candidates has nothing to merge.
    pub fn wrap_up(&mut self, pending: &mut PendingBlocks) -> Result<Vec<Decision>> {
        let tail = self.flush_pending(pending)?;
        if !self.dedup_disabled {
            self.index.wrap_up(&self.sparse_path)?;
        }
        self.store.sync()?;

        let cursor = self.allocator.cursor();
        info!(
            prim = cursor.prim,
            seco = cursor.seco,
            tert = cursor.tert,
            session_candidates = self.index.session_len(),
            dedup_disabled = self.dedup_disabled,
            "backup run wrapped up"
        );
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_engine(dir: &std::path::Path) -> DedupEngine {
        let config = StoreConfig::new(dir);
        DedupEngine::open(&config, [0x42; 32]).unwrap()
    }

    #[test]
    fn new_block_is_stored_then_matched() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let block = Block::new(b"the same bytes".to_vec());
        let first = engine.deduplicate(&block).unwrap();
        assert_eq!(first, Decision::Stored("0000/0000/0000".into()));

        let second = engine.deduplicate(&block).unwrap();
        assert_eq!(second, Decision::Matched("0000/0000/0000".into()));

        // Only one copy on disk; the cursor moved exactly once.
        assert_eq!(engine.cursor().tert, 1);
    }

    #[test]
    fn distinct_blocks_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let a = engine.deduplicate(&Block::new(b"aaa".to_vec())).unwrap();
        let b = engine.deduplicate(&Block::new(b"bbb".to_vec())).unwrap();
        assert_eq!(a, Decision::Stored("0000/0000/0000".into()));
        assert_eq!(b, Decision::Stored("0000/0000/0001".into()));
    }

    #[test]
    fn compressed_flag_shapes_path_and_survives_wrap_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let block = Block {
            data: b"gz payload".to_vec(),
            compressed: true,
            is_efs: false,
        };
        let decision = engine.deduplicate(&block).unwrap();
        assert_eq!(decision, Decision::Stored("0000/0000/0000.gz".into()));
        engine.wrap_up(&mut PendingBlocks::new()).unwrap();

        // A fresh run finds the candidate with its suffix intact.
        let mut next = open_engine(dir.path());
        let again = next.deduplicate(&block).unwrap();
        assert_eq!(again, Decision::Matched("0000/0000/0000.gz".into()));
    }

    #[test]
    fn efs_block_path_never_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());
        let block = Block {
            data: b"efs payload".to_vec(),
            compressed: true,
            is_efs: true,
        };
        let decision = engine.deduplicate(&block).unwrap();
        assert_eq!(decision, Decision::Stored("0000/0000/0000".into()));
    }

    #[test]
    fn restart_continues_past_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = open_engine(dir.path());
            engine.deduplicate(&Block::new(b"one".to_vec())).unwrap();
            engine.deduplicate(&Block::new(b"two".to_vec())).unwrap();
            engine.wrap_up(&mut PendingBlocks::new()).unwrap();
        }
        // Simulate a restart with a cold index: the allocator rescan alone
        // must keep paths monotonic.
        let mut engine = open_engine(dir.path());
        let decision = engine.deduplicate(&Block::new(b"three".to_vec())).unwrap();
        assert_eq!(decision, Decision::Stored("0000/0000/0002".into()));
    }

    #[test]
    fn corrupt_sparse_index_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(config.sparse_index_path(), b"garbage").unwrap();

        let mut engine = DedupEngine::open(&config, [0x42; 32]).unwrap();
        assert!(engine.dedup_disabled());

        // Identical blocks both get stored: no dedup, but the backup runs.
        let block = Block::new(b"payload".to_vec());
        assert_eq!(
            engine.deduplicate(&block).unwrap(),
            Decision::Stored("0000/0000/0000".into())
        );
        assert_eq!(
            engine.deduplicate(&block).unwrap(),
            Decision::Stored("0000/0000/0001".into())
        );

        // Wrap-up leaves the corrupt file for inspection.
        engine.wrap_up(&mut PendingBlocks::new()).unwrap();
        assert_eq!(
            std::fs::read(config.sparse_index_path()).unwrap(),
            b"garbage"
        );
    }

    #[test]
    fn batched_decisions_resolve_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::new(dir.path());
        config.batch_threshold = 3;
        let mut engine = DedupEngine::open(&config, [0x42; 32]).unwrap();

        let mut pending = PendingBlocks::new();
        assert_eq!(
            engine
                .deduplicate_maybe(&mut pending, Block::new(b"a".to_vec()))
                .unwrap(),
            MaybeDecision::Pending
        );
        assert_eq!(
            engine
                .deduplicate_maybe(&mut pending, Block::new(b"a".to_vec()))
                .unwrap(),
            MaybeDecision::Pending
        );
        let MaybeDecision::Resolved(decisions) = engine
            .deduplicate_maybe(&mut pending, Block::new(b"b".to_vec()))
            .unwrap()
        else {
            panic!("expected resolution at threshold");
        };

        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions[0], Decision::Stored("0000/0000/0000".into()));
        assert_eq!(decisions[1], Decision::Matched("0000/0000/0000".into()));
        assert_eq!(decisions[2], Decision::Stored("0000/0000/0001".into()));
        assert!(pending.is_empty());
    }

    #[test]
    fn wrap_up_resolves_queued_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());

        let mut pending = PendingBlocks::new();
        engine
            .deduplicate_maybe(&mut pending, Block::new(b"tail".to_vec()))
            .unwrap();
        assert_eq!(pending.len(), 1);

        let tail = engine.wrap_up(&mut pending).unwrap();
        assert_eq!(tail, vec![Decision::Stored("0000/0000/0000".into())]);
        assert!(pending.is_empty());
    }

    #[test]
    fn adopted_datapath_moves_allocation_forward() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open_engine(dir.path());
        engine.adopt_datapath("0001/0001/0004.gz").unwrap();
        let decision = engine.deduplicate(&Block::new(b"x".to_vec())).unwrap();
        assert_eq!(decision, Decision::Stored("0001/0001/0005".into()));
    }
}
