//! Mock Transport for Testing
//!
//! In-memory device with scripted blocks and failure injection. Cloning a
//! [`MockTransport`] yields a handle onto the same state, so a test can hand
//! one clone to a session and keep another to script and inspect it.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::{BlockTransport, RunState, TransportResult};
use crate::error::TransportError;

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect(String),
    ReadBlock { block_id: u16, start: u32, length: u32 },
    WriteBlock { block_id: u16, start: u32, data: Vec<u8> },
    RunState,
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    blocks: HashMap<u16, Vec<u8>>,
    fail_connect: bool,
    fail_writes: bool,
    fail_run_state: bool,
    failing_blocks: HashSet<u16>,
    run_state: RunState,
    calls: Vec<MockCall>,
}

/// Mock block transport
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MockTransport::set_block`]
    pub fn with_block(self, block_id: u16, data: Vec<u8>) -> Self {
        self.set_block(block_id, data);
        self
    }

    /// Replace the device-side contents of a block
    pub fn set_block(&self, block_id: u16, data: Vec<u8>) {
        self.state.lock().blocks.insert(block_id, data);
    }

    /// Patch bytes inside a block, growing it if needed
    pub fn patch_block(&self, block_id: u16, offset: usize, data: &[u8]) {
        let mut state = self.state.lock();
        let block = state.blocks.entry(block_id).or_default();
        if block.len() < offset + data.len() {
            block.resize(offset + data.len(), 0);
        }
        block[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Device-side contents of a block
    pub fn block(&self, block_id: u16) -> Option<Vec<u8>> {
        self.state.lock().blocks.get(&block_id).cloned()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn set_fail_run_state(&self, fail: bool) {
        self.state.lock().fail_run_state = fail;
    }

    /// Make reads of one block fail (and drop the link) until cleared
    pub fn set_fail_block(&self, block_id: u16, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_blocks.insert(block_id);
        } else {
            state.failing_blocks.remove(&block_id);
        }
    }

    pub fn set_run_state(&self, run_state: RunState) {
        self.state.lock().run_state = run_state;
    }

    /// Simulate the peer closing the link
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Connect(_)))
    }

    pub fn read_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::ReadBlock { .. }))
    }

    /// All successful and attempted writes, in order
    pub fn writes(&self) -> Vec<(u16, u32, Vec<u8>)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::WriteBlock {
                    block_id,
                    start,
                    data,
                } => Some((*block_id, *start, data.clone())),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl BlockTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self, host: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Connect(host.to_string()));

        if state.fail_connect {
            state.connected = false;
            return Err(TransportError::ConnectionFailed(format!(
                "mock connection to {} refused",
                host
            )));
        }

        state.connected = true;
        debug!("Mock transport connected to {}", host);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read_block(&mut self, block_id: u16, start: u32, length: u32) -> TransportResult<Bytes> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ReadBlock {
            block_id,
            start,
            length,
        });

        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.failing_blocks.contains(&block_id) {
            state.connected = false;
            return Err(TransportError::ConnectionLost(format!(
                "mock read of DB{} failed",
                block_id
            )));
        }

        let block = state
            .blocks
            .get(&block_id)
            .ok_or_else(|| TransportError::Rejected(format!("DB{} not found", block_id)))?;
        let (from, to) = (start as usize, start as usize + length as usize);
        let data = block.get(from..to).ok_or_else(|| {
            TransportError::Rejected(format!(
                "DB{} has {} bytes, requested {}..{}",
                block_id,
                block.len(),
                from,
                to
            ))
        })?;
        Ok(Bytes::copy_from_slice(data))
    }

    async fn write_block(&mut self, block_id: u16, start: u32, data: &[u8]) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::WriteBlock {
            block_id,
            start,
            data: data.to_vec(),
        });

        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_writes {
            state.connected = false;
            return Err(TransportError::ConnectionLost(format!(
                "mock write to DB{} failed",
                block_id
            )));
        }

        let block = state
            .blocks
            .get_mut(&block_id)
            .ok_or_else(|| TransportError::Rejected(format!("DB{} not found", block_id)))?;
        let from = start as usize;
        let target = block
            .get_mut(from..from + data.len())
            .ok_or_else(|| TransportError::Rejected(format!("DB{} write out of bounds", block_id)))?;
        target.copy_from_slice(data);
        Ok(())
    }

    async fn run_state(&mut self) -> TransportResult<RunState> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::RunState);

        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_run_state {
            state.connected = false;
            return Err(TransportError::Timeout("mock SZL request".to_string()));
        }
        Ok(state.run_state)
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Disconnect);
        state.connected = false;
        Ok(())
    }
}
