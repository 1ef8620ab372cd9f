pub mod sparse;

use std::collections::HashMap;
use std::path::Path;

use strake_types::Signature;
use tracing::info;

use crate::error::Result;
use sparse::{write_sparse_file, SparseEntry, SparseIndexFile};

/// Candidate chooser: answers "which already-stored block, if any, is an
/// acceptable duplicate of this signature".
///
/// Two tiers: the mmap'd sparse file carries the baseline sample from prior
/// runs; a session `HashMap` holds this run's insertions and score bumps.
/// Lookups consult both and prefer the higher score, session on ties, so the
/// in-memory side stays proportional to one run's new blocks rather than the
/// whole store.
///
/// Scoring convention: higher score preferred; ties broken by most recent
/// insertion. New blocks enter at score 0 and gain 1 per dedup hit.
pub struct CandidateIndex {
    baseline: Option<SparseIndexFile>,
    session: HashMap<Signature, SparseEntry>,
}

impl CandidateIndex {
    /// An index with no baseline: used when there is no sparse file yet, or
    /// when a corrupt one forced the engine to fail open.
    pub fn empty() -> Self {
        Self {
            baseline: None,
            session: HashMap::new(),
        }
    }

    /// Load the baseline from the sparse file at `path`. Missing file is an
    /// empty baseline; a malformed file surfaces `IndexCorrupt` for the
    /// engine's fail-open policy to catch.
    pub fn load(path: &Path) -> Result<Self> {
        let baseline = SparseIndexFile::open(path)?;
        Ok(Self {
            baseline,
            session: HashMap::new(),
        })
    }

    /// Best candidate for a signature across both tiers, or `None`.
    pub fn lookup(&self, signature: &Signature) -> Option<SparseEntry> {
        let from_session = self.session.get(signature).copied();
        let from_baseline = self
            .baseline
            .as_ref()
            .and_then(|b| b.lookup(signature));
        match (from_session, from_baseline) {
            (Some(s), Some(b)) if b.score > s.score => Some(b),
            (Some(s), _) => Some(s),
            (None, other) => other,
        }
    }

    /// Best candidate's rendered block path, or `None`.
    pub fn lookup_path(&self, signature: &Signature) -> Option<String> {
        self.lookup(signature).map(|e| e.block_path())
    }

    /// Record a newly stored block so future lookups can find it. An entry
    /// already present under the signature is replaced when the new score is
    /// at least as high (most recent wins on ties).
    pub fn insert(&mut self, entry: SparseEntry) {
        match self.session.get(&entry.signature) {
            Some(existing) if existing.score > entry.score => {}
            _ => {
                self.session.insert(entry.signature, entry);
            }
        }
    }

    /// Bump the winning candidate's score after a dedup hit, pulling a
    /// baseline-only entry into the session tier.
    pub fn note_hit(&mut self, signature: &Signature) {
        if let Some(mut entry) = self.lookup(signature) {
            entry.score += 1;
            self.session.insert(*signature, entry);
        }
    }

    /// Number of entries added or touched this session.
    pub fn session_len(&self) -> usize {
        self.session.len()
    }

    /// Merge the session tier into the baseline and rewrite the sparse file
    /// atomically. Session entries shadow baseline entries with the same
    /// signature (they carry the bumped score).
    pub fn wrap_up(&self, path: &Path) -> Result<()> {
        let mut merged: Vec<SparseEntry> =
            Vec::with_capacity(self.session.len() + self.baseline_len());

        if let Some(baseline) = &self.baseline {
            for entry in baseline.iter() {
                if !self.session.contains_key(&entry.signature) {
                    merged.push(entry);
                }
            }
        }
        merged.extend(self.session.values().copied());

        write_sparse_file(path, &mut merged)?;

        info!(
            baseline = self.baseline_len(),
            session = self.session.len(),
            merged = merged.len(),
            path = %path.display(),
            "flushed sparse candidate index"
        );
        Ok(())
    }

    fn baseline_len(&self) -> usize {
        self.baseline.as_ref().map_or(0, |b| b.entry_count() as usize)
    }
}
