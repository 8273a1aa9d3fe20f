//! Block registry
//!
//! Accumulates the blocks a session has to fetch. Several feature modules
//! usually share one registry (`Arc<BlockRegistry>`) and register their own
//! blocks independently, so `register` is an infallible idempotent upsert.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Region of a block to fetch on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRegistration {
    pub block_id: u16,
    pub start_offset: u32,
    pub length: u32,
}

impl BlockRegistration {
    pub fn new(block_id: u16, start_offset: u32, length: u32) -> Self {
        Self {
            block_id,
            start_offset,
            length,
        }
    }
}

/// Ordered set of block registrations keyed by block id
#[derive(Debug, Default)]
pub struct BlockRegistry {
    entries: RwLock<Vec<BlockRegistration>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a block
    ///
    /// The last `(start_offset, length)` for a block id wins; ranges are not
    /// merged. A re-registered block keeps its original position.
    pub fn register(&self, block_id: u16, start_offset: u32, length: u32) {
        let registration = BlockRegistration::new(block_id, start_offset, length);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|r| r.block_id == block_id) {
            Some(existing) => *existing = registration,
            None => entries.push(registration),
        }
    }

    /// Registrations in first-insertion order
    pub fn list_registered(&self) -> Vec<BlockRegistration> {
        self.entries.read().clone()
    }

    pub fn get(&self, block_id: u16) -> Option<BlockRegistration> {
        self.entries
            .read()
            .iter()
            .find(|r| r.block_id == block_id)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
