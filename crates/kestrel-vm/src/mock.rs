//! In-memory ledger implementing [`World`], for tests and local tooling.

use crate::blockchain::{BlockInfo, World};
use crate::error::VmError;
use crate::output::VmOutput;
use crate::runtime::CallInput;
use kestrel_types::{Address, Hash};
use num_bigint::{BigInt, BigUint};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

type BuiltinHandler = Rc<dyn Fn(&CallInput) -> Result<VmOutput, VmError>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockAccount {
    pub balance: BigUint,
    pub nonce: u64,
    pub code: Option<Vec<u8>>,
    pub code_metadata: Option<Vec<u8>>,
    pub owner: Option<Address>,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Accounts, block hashes and built-in functions held in memory.
/// Shards are assigned by the last address byte modulo the shard count.
pub struct MockWorld {
    accounts: RefCell<BTreeMap<Address, MockAccount>>,
    block_hashes: RefCell<BTreeMap<u64, Hash>>,
    current_block: Cell<BlockInfo>,
    num_shards: Cell<u8>,
    builtins: RefCell<BTreeMap<String, BuiltinHandler>>,
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockWorld")
            .field("accounts", &self.accounts.borrow().len())
            .field("num_shards", &self.num_shards.get())
            .finish_non_exhaustive()
    }
}

impl MockWorld {
    pub fn new() -> Self {
        Self {
            accounts: RefCell::new(BTreeMap::new()),
            block_hashes: RefCell::new(BTreeMap::new()),
            current_block: Cell::new(BlockInfo::default()),
            num_shards: Cell::new(1),
            builtins: RefCell::new(BTreeMap::new()),
        }
    }

    fn with_account<R>(&self, address: Address, f: impl FnOnce(&mut MockAccount) -> R) -> R {
        f(self.accounts.borrow_mut().entry(address).or_default())
    }

    pub fn account(&self, address: &Address) -> Option<MockAccount> {
        self.accounts.borrow().get(address).cloned()
    }

    pub fn set_balance(&self, address: Address, balance: BigUint) {
        self.with_account(address, |account| account.balance = balance);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.with_account(address, |account| account.nonce = nonce);
    }

    pub fn set_code(&self, address: Address, code: Vec<u8>) {
        self.with_account(address, |account| account.code = Some(code));
    }

    pub fn set_owner(&self, address: Address, owner: Address) {
        self.with_account(address, |account| account.owner = Some(owner));
    }

    pub fn set_storage(&self, address: Address, key: Vec<u8>, value: Vec<u8>) {
        self.with_account(address, |account| {
            if value.is_empty() {
                account.storage.remove(&key);
            } else {
                account.storage.insert(key, value);
            }
        });
    }

    pub fn set_block_hash(&self, nonce: u64, hash: Hash) {
        self.block_hashes.borrow_mut().insert(nonce, hash);
    }

    pub fn set_current_block(&self, block: BlockInfo) {
        self.current_block.set(block);
    }

    pub fn set_num_shards(&self, num_shards: u8) {
        self.num_shards.set(num_shards.max(1));
    }

    pub fn shard_of(&self, address: &Address) -> u8 {
        address.shard_byte() % self.num_shards.get()
    }

    pub fn add_builtin(&self, name: &str, handler: impl Fn(&CallInput) -> Result<VmOutput, VmError> + 'static) {
        self.builtins.borrow_mut().insert(name.to_string(), Rc::new(handler));
    }

    /// Commit the effects of a finished call. Transfers are left for the
    /// protocol to route; value they carry was already debited.
    pub fn apply_output(&self, output: &VmOutput) {
        let mut accounts = self.accounts.borrow_mut();
        for (address, changes) in &output.output_accounts {
            let account = accounts.entry(*address).or_default();
            let balance = BigInt::from(account.balance.clone()) + &changes.balance_delta;
            account.balance = balance.to_biguint().unwrap_or_default();
            account.nonce += changes.nonce_delta;
            for (key, value) in &changes.storage_updates {
                if value.is_empty() {
                    account.storage.remove(key);
                } else {
                    account.storage.insert(key.clone(), value.clone());
                }
            }
            if let Some(code) = &changes.code {
                account.code = Some(code.clone());
            }
            if let Some(metadata) = &changes.code_metadata {
                account.code_metadata = Some(metadata.clone());
            }
            if let Some(owner) = changes.owner {
                account.owner = Some(owner);
            }
        }
        for address in &output.deleted_accounts {
            accounts.remove(address);
        }
    }
}

impl World for MockWorld {
    fn account_exists(&self, address: &Address) -> bool {
        self.accounts.borrow().contains_key(address)
    }

    fn balance(&self, address: &Address) -> BigUint {
        self.accounts
            .borrow()
            .get(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.accounts.borrow().get(address).map_or(0, |account| account.nonce)
    }

    fn code(&self, address: &Address) -> Option<Vec<u8>> {
        self.accounts.borrow().get(address).and_then(|account| account.code.clone())
    }

    fn owner(&self, address: &Address) -> Option<Address> {
        self.accounts.borrow().get(address).and_then(|account| account.owner)
    }

    fn storage(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        self.accounts
            .borrow()
            .get(address)
            .and_then(|account| account.storage.get(key).cloned())
            .unwrap_or_default()
    }

    fn block_hash(&self, nonce: u64) -> Option<Hash> {
        self.block_hashes.borrow().get(&nonce).copied()
    }

    fn current_block(&self) -> BlockInfo {
        self.current_block.get()
    }

    /// Eight zero bytes, the VM type, a hash of creator and nonce, and the
    /// creator's shard byte.
    fn new_address(&self, creator: &Address, creator_nonce: u64, vm_type: &[u8]) -> Address {
        let seed = Hash::compute_multi(&[creator.as_bytes(), &creator_nonce.to_be_bytes(), vm_type]);
        let mut bytes = [0u8; Address::LEN];
        bytes[10..Address::LEN - 1].copy_from_slice(&seed.as_bytes()[10..Address::LEN - 1]);
        for (slot, byte) in bytes[8..10].iter_mut().zip(vm_type) {
            *slot = *byte;
        }
        bytes[Address::LEN - 1] = creator.shard_byte();
        Address::from_bytes(bytes)
    }

    fn in_same_shard(&self, a: &Address, b: &Address) -> bool {
        self.shard_of(a) == self.shard_of(b)
    }

    fn process_builtin_function(&self, input: &CallInput) -> Result<VmOutput, VmError> {
        let handler = self.builtins.borrow().get(&input.function).cloned();
        match handler {
            Some(handler) => handler(input),
            None => Err(VmError::FunctionNotFound(input.function.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputAccount;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn test_apply_output() {
        let world = MockWorld::new();
        world.set_balance(addr(1), BigUint::from(100u32));
        world.set_storage(addr(1), b"gone".to_vec(), b"x".to_vec());

        let mut changes = OutputAccount::new(addr(1));
        changes.balance_delta = BigInt::from(-30);
        changes.nonce_delta = 2;
        changes.storage_updates.insert(b"gone".to_vec(), Vec::new());
        changes.storage_updates.insert(b"kept".to_vec(), b"v".to_vec());
        let mut output = VmOutput::default();
        output.output_accounts.insert(addr(1), changes);
        world.apply_output(&output);

        assert_eq!(world.balance(&addr(1)), BigUint::from(70u32));
        assert_eq!(world.nonce(&addr(1)), 2);
        assert!(world.storage(&addr(1), b"gone").is_empty());
        assert_eq!(world.storage(&addr(1), b"kept"), b"v".to_vec());
    }

    #[test]
    fn test_new_address_layout() {
        let world = MockWorld::new();
        let first = world.new_address(&addr(4), 0, &[5, 0]);
        let second = world.new_address(&addr(4), 1, &[5, 0]);
        assert_ne!(first, second);
        assert!(first.is_smart_contract());
        assert_eq!(&first.as_bytes()[8..10], &[5, 0]);
        assert_eq!(first.shard_byte(), 4);
    }

    #[test]
    fn test_shards() {
        let world = MockWorld::new();
        assert!(world.in_same_shard(&addr(1), &addr(2)));
        world.set_num_shards(2);
        assert!(!world.in_same_shard(&addr(1), &addr(2)));
        assert!(world.in_same_shard(&addr(1), &addr(3)));
    }
}
