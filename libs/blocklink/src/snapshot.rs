//! Block snapshots

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::address::Address;
use crate::codec;
use crate::error::{BlockError, Result};
use crate::value::BlockValue;

/// Raw bytes of one block as fetched
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    pub start_offset: u32,
    pub bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
}

/// Most recently fetched bytes per block plus a connectivity flag
///
/// Stale data stays readable after a failed poll; check `connected` before
/// trusting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    blocks: HashMap<u16, BlockData>,
    connected: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Empty, disconnected snapshot
    pub fn empty() -> Self {
        Self {
            blocks: HashMap::new(),
            connected: false,
            updated_at: None,
        }
    }

    pub(crate) fn from_blocks(blocks: HashMap<u16, BlockData>, updated_at: DateTime<Utc>) -> Self {
        Self {
            blocks,
            connected: true,
            updated_at: Some(updated_at),
        }
    }

    /// Copy of this snapshot with the connectivity flag cleared
    pub(crate) fn disconnected(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            connected: false,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn blocks(&self) -> &HashMap<u16, BlockData> {
        &self.blocks
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time of the last successful poll
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn block(&self, block_id: u16) -> Option<&BlockData> {
        self.blocks.get(&block_id)
    }

    /// Block ids present, sorted
    pub fn block_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.blocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Decode `address` against the stored block buffer
    ///
    /// Addresses are block-absolute; a block fetched from a non-zero start
    /// offset is indexed relative to that start.
    pub fn read(&self, address: &Address) -> Result<BlockValue> {
        self.read_rounded(address, None)
    }

    pub fn read_rounded(&self, address: &Address, round_to: Option<u32>) -> Result<BlockValue> {
        let block = self
            .blocks
            .get(&address.block_id())
            .ok_or(BlockError::BlockNotAvailable(address.block_id()))?;
        // Errors report block-absolute offsets and the block's absolute end
        let out_of_range = || {
            BlockError::out_of_range(
                address.byte_offset(),
                address.byte_len(),
                block.start_offset as usize + block.bytes.len(),
            )
        };
        let relative = address
            .byte_offset()
            .checked_sub(block.start_offset)
            .ok_or_else(out_of_range)?;
        codec::decode_rounded(&address.with_offset(relative), &block.bytes, round_to).map_err(
            |e| match e {
                BlockError::OutOfRange { .. } => out_of_range(),
                other => other,
            },
        )
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_missing_block_is_not_available() {
        let snapshot = Snapshot::empty();
        assert!(!snapshot.is_connected());
        assert_eq!(
            snapshot.read(&Address::real(40, 30)),
            Err(BlockError::BlockNotAvailable(40))
        );
    }

    #[test]
    fn test_disconnected_copy_keeps_data() {
        let mut blocks = HashMap::new();
        blocks.insert(
            32,
            BlockData {
                start_offset: 0,
                bytes: Bytes::from(vec![0u8, 5]),
                fetched_at: Utc::now(),
            },
        );
        let snapshot = Snapshot::from_blocks(blocks, Utc::now());
        let stale = snapshot.disconnected();

        assert!(snapshot.is_connected());
        assert!(!stale.is_connected());
        assert_eq!(stale.updated_at(), snapshot.updated_at());
        assert_eq!(
            stale.read(&Address::word(32, 0)).unwrap(),
            BlockValue::Integer(5)
        );
    }

    #[test]
    fn test_offsets_are_block_absolute() {
        let mut blocks = HashMap::new();
        blocks.insert(
            204,
            BlockData {
                start_offset: 20,
                bytes: Bytes::from(vec![0x00, 0x00, 0x01, 0x00]),
                fetched_at: Utc::now(),
            },
        );
        let snapshot = Snapshot::from_blocks(blocks, Utc::now());
        assert_eq!(
            snapshot.read(&Address::dint(204, 20)).unwrap(),
            BlockValue::Integer(256)
        );
        assert!(matches!(
            snapshot.read(&Address::word(204, 18)),
            Err(BlockError::OutOfRange { .. })
        ));
        assert!(matches!(
            snapshot.read(&Address::word(204, 23)),
            Err(BlockError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_out_of_range_reports_absolute_offsets() {
        let mut blocks = HashMap::new();
        blocks.insert(
            204,
            BlockData {
                start_offset: 20,
                bytes: Bytes::from(vec![0u8; 4]),
                fetched_at: Utc::now(),
            },
        );
        let snapshot = Snapshot::from_blocks(blocks, Utc::now());

        // Below the fetched start
        assert_eq!(
            snapshot.read(&Address::word(204, 18)),
            Err(BlockError::out_of_range(18, 2, 24))
        );
        // Past the fetched end
        let err = snapshot.read(&Address::word(204, 23)).unwrap_err();
        assert_eq!(err, BlockError::out_of_range(23, 2, 24));
        assert_eq!(
            err.to_string(),
            "Out of range: 2 byte(s) at offset 23 exceed buffer of 24 bytes"
        );
    }
}
