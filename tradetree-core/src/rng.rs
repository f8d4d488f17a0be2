//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(label, epoch)`
//! tuple, where the label names a node of the expert tree. Sub-seeds are
//! derived via BLAKE3 hashing, independently of traversal or thread scheduling
//! order, so a fit is reproducible regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (label, epoch).
    pub fn sub_seed(&self, label: &str, epoch: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(label.as_bytes());
        hasher.update(&epoch.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, label: &str, epoch: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(label, epoch))
    }
}
