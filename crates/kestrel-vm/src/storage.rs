//! Contract storage with pending writes and gas accounting.
//!
//! Reads resolve pending writes of the current transaction first and fall
//! back to committed state. Keys under the protected prefix belong to the
//! protocol and cannot be written by contracts.

use crate::blockchain::BlockchainContext;
use crate::error::VmError;
use crate::gas_metering::MeteringContext;
use crate::output::OutputContext;
use kestrel_types::Address;

/// Result of a storage write, returned to the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Unchanged = 0,
    Modified = 1,
    Added = 2,
    Deleted = 3,
}

impl StorageStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone)]
pub struct StorageContext {
    address: Address,
    stack: Vec<Address>,
    protected_prefix: Vec<u8>,
}

impl StorageContext {
    pub fn new(protected_prefix: Vec<u8>) -> Self {
        Self {
            address: Address::ZERO,
            stack: Vec::new(),
            protected_prefix,
        }
    }

    /// Account whose storage the executing frame reads and writes.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn push_state(&mut self) {
        self.stack.push(self.address);
    }

    pub fn pop_state(&mut self) -> Result<(), VmError> {
        self.address = self.stack.pop().ok_or(VmError::StateStackUnderflow)?;
        Ok(())
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn protected_prefix(&self) -> &[u8] {
        &self.protected_prefix
    }

    pub fn is_protected(&self, key: &[u8]) -> bool {
        key.starts_with(&self.protected_prefix)
    }

    /// Current value of `key` in the executing account.
    pub fn get(&self, key: &[u8], output: &OutputContext, blockchain: &BlockchainContext) -> Vec<u8> {
        self.get_from(&self.address, key, output, blockchain)
    }

    /// Current value of `key` in any account.
    pub fn get_from(
        &self,
        address: &Address,
        key: &[u8],
        output: &OutputContext,
        blockchain: &BlockchainContext,
    ) -> Vec<u8> {
        match output.pending_storage(address, key) {
            Some(value) => value.to_vec(),
            None => blockchain.storage(address, key),
        }
    }

    /// Write `value` under `key` on behalf of the contract, charging gas.
    /// An empty value deletes the key.
    pub fn set(
        &self,
        key: &[u8],
        value: &[u8],
        output: &mut OutputContext,
        blockchain: &BlockchainContext,
        metering: &mut MeteringContext,
    ) -> Result<StorageStatus, VmError> {
        if self.is_protected(key) {
            return Err(VmError::ProtectedStorageKeyViolation);
        }

        let old = self.get(key, output, blockchain);
        let costs = &metering.schedule().base_operation_cost;
        let (status, cost, refund) = if old == value {
            (StorageStatus::Unchanged, costs.data_copy_per_byte * value.len() as u64, 0)
        } else if old.is_empty() {
            (StorageStatus::Added, costs.store_per_byte * value.len() as u64, 0)
        } else if value.is_empty() {
            (StorageStatus::Deleted, 0, costs.release_per_byte * old.len() as u64)
        } else {
            let grown = value.len().saturating_sub(old.len()) as u64;
            let kept = value.len() as u64 - grown;
            (
                StorageStatus::Modified,
                costs.persist_per_byte * kept + costs.store_per_byte * grown,
                costs.release_per_byte * old.len().saturating_sub(value.len()) as u64,
            )
        };

        metering.use_gas(cost)?;
        metering.add_refund(refund);
        if status != StorageStatus::Unchanged {
            output.set_storage(&self.address, key.to_vec(), value.to_vec());
        }
        Ok(status)
    }

    /// Protocol write into `address`, bypassing the protected prefix check and gas.
    pub fn set_protected(&self, address: &Address, key: Vec<u8>, value: Vec<u8>, output: &mut OutputContext) {
        output.set_storage(address, key, value);
    }

    /// Storage key of an internal record: the protected prefix followed by `suffix`.
    pub fn protected_key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.protected_prefix.clone();
        key.extend_from_slice(suffix);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas_metering::GasSchedule;
    use crate::mock::MockWorld;
    use std::rc::Rc;
    use std::sync::Arc;

    struct Fixture {
        storage: StorageContext,
        output: OutputContext,
        blockchain: BlockchainContext,
        metering: MeteringContext,
        world: Rc<MockWorld>,
    }

    fn fixture() -> Fixture {
        let world = Rc::new(MockWorld::new());
        let mut storage = StorageContext::new(b"KESTREL".to_vec());
        storage.set_address(Address::from_bytes([1; 32]));
        let mut metering = MeteringContext::new(Arc::new(GasSchedule::default()), u64::MAX);
        metering.init_for_call(1_000_000);
        Fixture {
            storage,
            output: OutputContext::new(),
            blockchain: BlockchainContext::new(world.clone()),
            metering,
            world,
        }
    }

    fn set(f: &mut Fixture, key: &[u8], value: &[u8]) -> Result<StorageStatus, VmError> {
        f.storage
            .set(key, value, &mut f.output, &f.blockchain, &mut f.metering)
    }

    #[test]
    fn test_status_codes() {
        let mut f = fixture();
        let key = [7u8; 32];
        assert_eq!(set(&mut f, &key, b"abc"), Ok(StorageStatus::Added));
        assert_eq!(set(&mut f, &key, b"abc"), Ok(StorageStatus::Unchanged));
        assert_eq!(set(&mut f, &key, b"abd"), Ok(StorageStatus::Modified));
        assert_eq!(set(&mut f, &key, b""), Ok(StorageStatus::Deleted));
        assert_eq!(set(&mut f, &key, b""), Ok(StorageStatus::Unchanged));
    }

    #[test]
    fn test_reads_pending_before_committed() {
        let mut f = fixture();
        let address = f.storage.address();
        f.world.set_storage(address, b"k".to_vec(), b"committed".to_vec());
        assert_eq!(f.storage.get(b"k", &f.output, &f.blockchain), b"committed".to_vec());

        assert_eq!(set(&mut f, b"k", b"pending"), Ok(StorageStatus::Modified));
        assert_eq!(f.storage.get(b"k", &f.output, &f.blockchain), b"pending".to_vec());
    }

    #[test]
    fn test_gas_new_key_costs_more_than_overwrite() {
        let mut f = fixture();
        set(&mut f, b"k", &[1; 10]).unwrap();
        let added = f.metering.gas_used();
        set(&mut f, b"k", &[2; 10]).unwrap();
        let modified = f.metering.gas_used() - added;
        assert_eq!(added, 500);
        assert_eq!(modified, 100);
    }

    #[test]
    fn test_delete_earns_refund() {
        let mut f = fixture();
        set(&mut f, b"k", &[1; 10]).unwrap();
        set(&mut f, b"k", b"").unwrap();
        assert_eq!(f.metering.gas_refund(), 100);
    }

    #[test]
    fn test_protected_key_rejected() {
        let mut f = fixture();
        let gas_before = f.metering.gas_used();
        assert_eq!(
            set(&mut f, b"KESTRELreward", b"x"),
            Err(VmError::ProtectedStorageKeyViolation)
        );
        assert_eq!(f.metering.gas_used(), gas_before);
        assert!(f.output.pending_storage(&f.storage.address(), b"KESTRELreward").is_none());

        let address = f.storage.address();
        let key = f.storage.protected_key(b"reward");
        f.storage.set_protected(&address, key.clone(), b"x".to_vec(), &mut f.output);
        assert_eq!(f.storage.get(&key, &f.output, &f.blockchain), b"x".to_vec());
    }

    #[test]
    fn test_out_of_gas_leaves_storage_unchanged() {
        let mut f = fixture();
        f.metering.init_for_call(10);
        assert!(matches!(set(&mut f, b"k", &[1; 10]), Err(VmError::OutOfGas { .. })));
        assert!(f.storage.get(b"k", &f.output, &f.blockchain).is_empty());
    }

    #[test]
    fn test_address_stack() {
        let mut f = fixture();
        f.storage.push_state();
        f.storage.set_address(Address::from_bytes([2; 32]));
        f.storage.pop_state().unwrap();
        assert_eq!(f.storage.address(), Address::from_bytes([1; 32]));
        assert_eq!(f.storage.pop_state(), Err(VmError::StateStackUnderflow));
    }
}
