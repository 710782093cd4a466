//! Read access to committed chain state.

use crate::error::VmError;
use crate::output::VmOutput;
use crate::runtime::CallInput;
use kestrel_types::{Address, Hash};
use num_bigint::BigUint;
use std::rc::Rc;

/// Header fields of the block being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    pub timestamp: u64,
    pub random_seed: Hash,
}

/// Committed ledger state, supplied by the node.
///
/// The host only reads through this interface. Writes leave the host as a
/// [`VmOutput`] and are applied by the caller.
pub trait World {
    fn account_exists(&self, address: &Address) -> bool;

    fn balance(&self, address: &Address) -> BigUint;

    fn nonce(&self, address: &Address) -> u64;

    fn code(&self, address: &Address) -> Option<Vec<u8>>;

    fn owner(&self, address: &Address) -> Option<Address>;

    /// Committed value of `key`, empty when absent.
    fn storage(&self, address: &Address, key: &[u8]) -> Vec<u8>;

    fn block_hash(&self, nonce: u64) -> Option<Hash>;

    fn current_block(&self) -> BlockInfo;

    /// Address of the next contract deployed by `creator`.
    fn new_address(&self, creator: &Address, creator_nonce: u64, vm_type: &[u8]) -> Address;

    fn in_same_shard(&self, _a: &Address, _b: &Address) -> bool {
        true
    }

    fn process_builtin_function(&self, input: &CallInput) -> Result<VmOutput, VmError> {
        Err(VmError::FunctionNotFound(input.function.clone()))
    }
}

#[derive(Clone)]
pub struct BlockchainContext {
    world: Rc<dyn World>,
}

impl std::fmt::Debug for BlockchainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainContext").finish_non_exhaustive()
    }
}

impl BlockchainContext {
    pub fn new(world: Rc<dyn World>) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &dyn World {
        self.world.as_ref()
    }

    pub fn account_exists(&self, address: &Address) -> bool {
        self.world.account_exists(address)
    }

    pub fn balance(&self, address: &Address) -> BigUint {
        self.world.balance(address)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.world.nonce(address)
    }

    pub fn code(&self, address: &Address) -> Option<Vec<u8>> {
        self.world.code(address)
    }

    pub fn owner(&self, address: &Address) -> Option<Address> {
        self.world.owner(address)
    }

    pub fn storage(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        self.world.storage(address, key)
    }

    pub fn block_hash(&self, nonce: u64) -> Option<Hash> {
        self.world.block_hash(nonce)
    }

    pub fn current_timestamp(&self) -> u64 {
        self.world.current_block().timestamp
    }

    pub fn current_block(&self) -> BlockInfo {
        self.world.current_block()
    }

    pub fn new_address(&self, creator: &Address, vm_type: &[u8]) -> Address {
        let nonce = self.world.nonce(creator);
        self.world.new_address(creator, nonce, vm_type)
    }

    pub fn in_same_shard(&self, a: &Address, b: &Address) -> bool {
        self.world.in_same_shard(a, b)
    }

    pub fn process_builtin_function(&self, input: &CallInput) -> Result<VmOutput, VmError> {
        self.world.process_builtin_function(input)
    }
}
