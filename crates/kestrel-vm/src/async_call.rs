//! Deferred calls registered by a frame and their resolution records.

use crate::error::VmError;
use kestrel_types::{Address, Hash};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Key suffix, after the protected prefix, of pending async call records.
pub const ASYNC_RECORD_TAG: &[u8] = b"ASYNC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsyncCallStatus {
    #[default]
    Pending,
    Resolved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCall {
    pub destination: Address,
    /// Call data, `function@hexarg...`.
    pub data: Vec<u8>,
    /// Gas forwarded to the destination. Zero forwards everything left
    /// once the callback lock is reserved.
    pub gas_limit: u64,
    /// Gas kept back for the callback.
    pub gas_locked: u64,
    pub value: BigUint,
    pub success_callback: String,
    pub error_callback: String,
    pub status: AsyncCallStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsyncCallGroup {
    pub identifier: String,
    pub calls: Vec<AsyncCall>,
}

/// Async calls registered by one frame, grouped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsyncContextInfo {
    pub caller: Address,
    pub groups: Vec<AsyncCallGroup>,
}

impl AsyncContextInfo {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.calls.is_empty())
    }

    pub fn call_count(&self) -> usize {
        self.groups.iter().map(|group| group.calls.len()).sum()
    }

    pub fn pending(&self) -> impl Iterator<Item = &AsyncCall> {
        self.groups
            .iter()
            .flat_map(|group| group.calls.iter())
            .filter(|call| call.status == AsyncCallStatus::Pending)
    }
}

/// Record persisted in the originator's protected storage while a
/// cross-shard call is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncCallRecord {
    pub call_id: Hash,
    pub destination: Address,
    pub group: String,
    pub success_callback: String,
    pub error_callback: String,
    pub gas_locked: u64,
}

impl AsyncCallRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, VmError> {
        bincode::serialize(self).map_err(|e| VmError::ExecutionFailed(format!("encode async record: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VmError> {
        bincode::deserialize(bytes).map_err(|e| VmError::ExecutionFailed(format!("decode async record: {}", e)))
    }
}

/// Identifier linking a deferred call with its callback. `seed` names the
/// top-level call and `sequence` counts the calls issued under it.
pub fn async_call_id(seed: &Hash, origin: &Address, sequence: u64) -> Hash {
    Hash::compute_multi(&[
        seed.as_bytes().as_slice(),
        origin.as_bytes().as_slice(),
        sequence.to_be_bytes().as_slice(),
    ])
}

#[derive(Debug, Clone, Default)]
pub struct AsyncContext {
    info: AsyncContextInfo,
    stack: Vec<AsyncContextInfo>,
    seed: Hash,
    sequence: u64,
}

impl AsyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.info = AsyncContextInfo::default();
        self.stack.clear();
        self.seed = Hash::default();
        self.sequence = 0;
    }

    /// Name the top-level call whose frames issue the coming call ids.
    pub fn set_seed(&mut self, seed: Hash) {
        self.seed = seed;
        self.sequence = 0;
    }

    /// Fresh call id for a call issued by `origin`. The sequence spans every
    /// frame of the top-level call, so nested frames never reuse an id.
    pub fn next_call_id(&mut self, origin: &Address) -> Hash {
        let id = async_call_id(&self.seed, origin, self.sequence);
        self.sequence += 1;
        id
    }

    /// Start an empty registry for a frame called by `caller`.
    pub fn push_state(&mut self, caller: Address) {
        let parent = std::mem::replace(
            &mut self.info,
            AsyncContextInfo {
                caller,
                groups: Vec::new(),
            },
        );
        self.stack.push(parent);
    }

    /// Resume the parent registry, returning the closed frame's calls.
    pub fn pop_state(&mut self) -> Result<AsyncContextInfo, VmError> {
        let parent = self.stack.pop().ok_or(VmError::StateStackUnderflow)?;
        Ok(std::mem::replace(&mut self.info, parent))
    }

    pub fn clear_state_stack(&mut self) {
        if let Some(bottom) = self.stack.drain(..).next() {
            self.info = bottom;
        }
    }

    pub fn info(&self) -> &AsyncContextInfo {
        &self.info
    }

    /// Add `call` to group `identifier`, creating the group on first use.
    pub fn register(&mut self, identifier: &str, call: AsyncCall) {
        match self.info.groups.iter_mut().find(|g| g.identifier == identifier) {
            Some(group) => group.calls.push(call),
            None => self.info.groups.push(AsyncCallGroup {
                identifier: identifier.to_string(),
                calls: vec![call],
            }),
        }
    }

    /// Positions of every pending call, as `(group, index)`.
    pub fn pending_positions(&self) -> Vec<(usize, usize)> {
        let mut positions = Vec::new();
        for (g, group) in self.info.groups.iter().enumerate() {
            for (i, call) in group.calls.iter().enumerate() {
                if call.status == AsyncCallStatus::Pending {
                    positions.push((g, i));
                }
            }
        }
        positions
    }

    pub fn call(&self, group: usize, index: usize) -> Option<(&str, &AsyncCall)> {
        let group = self.info.groups.get(group)?;
        group.calls.get(index).map(|call| (group.identifier.as_str(), call))
    }

    pub fn set_status(&mut self, group: usize, index: usize, status: AsyncCallStatus) {
        if let Some(call) = self.info.groups.get_mut(group).and_then(|g| g.calls.get_mut(index)) {
            call.status = status;
        }
    }
}
