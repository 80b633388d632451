//! Per-instance file caching for incremental stage runs.
//!
//! A stage may skip a file whose content is unchanged since the last time
//! that stage ran. The cache is owned by a single [`BuildInstance`]
//! (`crate::instance::BuildInstance`) and namespaced by its identity, so
//! concurrent instances never invalidate each other — there is no shared
//! "active instance" slot.
//!
//! Keys are content-addressed: SHA-256 of the file bytes, not mtimes, so a
//! `git checkout` (which resets modification times) doesn't bust the cache.
//! The lint stages are the current users: re-linting an unchanged file is
//! pure waste, and linting has no on-disk output to go stale.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Content-hash cache for one build instance, partitioned by stage name.
#[derive(Debug)]
pub struct StageCache {
    instance_id: u64,
    stages: HashMap<&'static str, HashMap<String, String>>,
}

impl StageCache {
    pub fn new(instance_id: u64) -> Self {
        Self {
            instance_id,
            stages: HashMap::new(),
        }
    }

    /// Identity of the owning build instance.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Whether `rel` was last seen by `stage` with exactly this content hash.
    pub fn is_unchanged(&self, stage: &'static str, rel: &str, hash: &str) -> bool {
        self.stages
            .get(stage)
            .and_then(|files| files.get(rel))
            .is_some_and(|seen| seen == hash)
    }

    /// Record the content hash `stage` just processed for `rel`.
    pub fn record(&mut self, stage: &'static str, rel: String, hash: String) {
        self.stages.entry(stage).or_default().insert(rel, hash);
    }

    /// Number of files recorded for a stage. Test and introspection helper.
    pub fn len(&self, stage: &'static str) -> usize {
        self.stages.get(stage).map_or(0, |files| files.len())
    }
}

/// SHA-256 hash of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
