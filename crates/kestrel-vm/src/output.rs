//! Observable effects of a call: output accounts, return data and logs.
//!
//! Effects are recorded in layers, one per open frame. Pushing a frame opens
//! an empty layer; committing folds the top layer into the one below it and
//! rolling back drops it. Reads such as pending storage look through the
//! layers from the top down, so a frame sees its parents' uncommitted writes.

use crate::error::VmError;
use crate::runtime::CallType;
use kestrel_types::{Address, Hash};
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use std::collections::BTreeMap;

/// Outcome reported to the protocol for a top-level call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnCode {
    #[default]
    Ok = 0,
    FunctionNotFound = 1,
    FunctionWrongSignature = 2,
    ContractNotFound = 3,
    UserError = 4,
    OutOfGas = 5,
    AccountCollision = 6,
    OutOfFunds = 7,
    CallStackOverFlow = 8,
    ContractInvalid = 9,
    ExecutionFailed = 10,
    UpgradeFailed = 11,
}

impl ReturnCode {
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(code: u64) -> Option<Self> {
        Some(match code {
            0 => ReturnCode::Ok,
            1 => ReturnCode::FunctionNotFound,
            2 => ReturnCode::FunctionWrongSignature,
            3 => ReturnCode::ContractNotFound,
            4 => ReturnCode::UserError,
            5 => ReturnCode::OutOfGas,
            6 => ReturnCode::AccountCollision,
            7 => ReturnCode::OutOfFunds,
            8 => ReturnCode::CallStackOverFlow,
            9 => ReturnCode::ContractInvalid,
            10 => ReturnCode::ExecutionFailed,
            11 => ReturnCode::UpgradeFailed,
            _ => return None,
        })
    }
}

/// Event emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Value or call forwarded to another account, possibly in another shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTransfer {
    pub sender: Address,
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub data: Vec<u8>,
    pub call_type: CallType,
    /// Links an async call with its callback. Zero for plain transfers.
    pub call_id: Hash,
}

/// Pending changes to one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAccount {
    pub address: Address,
    pub nonce_delta: u64,
    pub balance_delta: BigInt,
    /// Key to new value. An empty value deletes the key.
    pub storage_updates: BTreeMap<Vec<u8>, Vec<u8>>,
    pub code: Option<Vec<u8>>,
    pub code_metadata: Option<Vec<u8>>,
    pub owner: Option<Address>,
    pub transfers: Vec<OutputTransfer>,
    pub touched: bool,
}

impl OutputAccount {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce_delta: 0,
            balance_delta: BigInt::zero(),
            storage_updates: BTreeMap::new(),
            code: None,
            code_metadata: None,
            owner: None,
            transfers: Vec::new(),
            touched: false,
        }
    }

    /// Fold `later` into `self`: deltas sum, later writes win.
    pub fn merge(&mut self, later: OutputAccount) {
        self.nonce_delta += later.nonce_delta;
        self.balance_delta += later.balance_delta;
        self.storage_updates.extend(later.storage_updates);
        if later.code.is_some() {
            self.code = later.code;
        }
        if later.code_metadata.is_some() {
            self.code_metadata = later.code_metadata;
        }
        if later.owner.is_some() {
            self.owner = later.owner;
        }
        self.transfers.extend(later.transfers);
        self.touched |= later.touched;
    }
}

/// Terminal artifact of a call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VmOutput {
    pub return_code: ReturnCode,
    pub return_message: String,
    pub return_data: Vec<Vec<u8>>,
    pub gas_remaining: u64,
    pub gas_refund: u64,
    pub output_accounts: BTreeMap<Address, OutputAccount>,
    pub deleted_accounts: Vec<Address>,
    pub logs: Vec<LogEntry>,
}

impl VmOutput {
    /// Output of a call that failed with `err`. Nothing it did survives.
    pub fn from_error(err: &VmError) -> Self {
        Self {
            return_code: err.return_code(),
            return_message: err.to_string(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == ReturnCode::Ok
    }
}

#[derive(Debug, Clone, Default)]
struct OutputLayer {
    accounts: BTreeMap<Address, OutputAccount>,
    return_data: Vec<Vec<u8>>,
    logs: Vec<LogEntry>,
    deleted_accounts: Vec<Address>,
    user_error: bool,
}

impl OutputLayer {
    fn absorb(&mut self, child: OutputLayer) {
        for (address, account) in child.accounts {
            match self.accounts.get_mut(&address) {
                Some(existing) => existing.merge(account),
                None => {
                    self.accounts.insert(address, account);
                }
            }
        }
        self.return_data.extend(child.return_data);
        self.logs.extend(child.logs);
        for address in child.deleted_accounts {
            if !self.deleted_accounts.contains(&address) {
                self.deleted_accounts.push(address);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputContext {
    layers: Vec<OutputLayer>,
}

impl Default for OutputContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputContext {
    pub fn new() -> Self {
        Self {
            layers: vec![OutputLayer::default()],
        }
    }

    pub fn init_state(&mut self) {
        self.layers = vec![OutputLayer::default()];
    }

    fn top(&self) -> &OutputLayer {
        // `layers` always holds the base layer.
        &self.layers[self.layers.len() - 1]
    }

    fn top_mut(&mut self) -> &mut OutputLayer {
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    pub fn push_state(&mut self) {
        self.layers.push(OutputLayer::default());
    }

    /// Commit the top layer into its parent.
    pub fn pop_merge(&mut self) -> Result<(), VmError> {
        if self.layers.len() < 2 {
            return Err(VmError::StateStackUnderflow);
        }
        let child = self.layers.pop().ok_or(VmError::StateStackUnderflow)?;
        self.top_mut().absorb(child);
        Ok(())
    }

    /// Roll back the top layer.
    pub fn pop_discard(&mut self) -> Result<(), VmError> {
        if self.layers.len() < 2 {
            return Err(VmError::StateStackUnderflow);
        }
        self.layers.pop();
        Ok(())
    }

    pub fn clear_state_stack(&mut self) {
        self.layers.truncate(1);
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Pending account in the current layer, created on first touch.
    pub fn account_mut(&mut self, address: &Address) -> &mut OutputAccount {
        let account = self
            .top_mut()
            .accounts
            .entry(*address)
            .or_insert_with(|| OutputAccount::new(*address));
        account.touched = true;
        account
    }

    /// Latest pending value for `key`, looking through every open layer.
    pub fn pending_storage(&self, address: &Address, key: &[u8]) -> Option<&[u8]> {
        self.layers.iter().rev().find_map(|layer| {
            layer
                .accounts
                .get(address)
                .and_then(|account| account.storage_updates.get(key))
                .map(Vec::as_slice)
        })
    }

    pub fn set_storage(&mut self, address: &Address, key: Vec<u8>, value: Vec<u8>) {
        self.account_mut(address).storage_updates.insert(key, value);
    }

    /// Sum of pending balance changes for `address` across all layers.
    pub fn balance_delta(&self, address: &Address) -> BigInt {
        self.layers
            .iter()
            .filter_map(|layer| layer.accounts.get(address))
            .map(|account| &account.balance_delta)
            .sum()
    }

    /// Pending code installed for `address`, if any.
    pub fn pending_code(&self, address: &Address) -> Option<&[u8]> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.accounts.get(address).and_then(|a| a.code.as_deref()))
    }

    /// Move `value` from `sender` to `destination` without any checks.
    pub fn transfer_value(&mut self, sender: &Address, destination: &Address, value: &BigUint) {
        if value.is_zero() {
            self.account_mut(destination);
            return;
        }
        let amount = BigInt::from(value.clone());
        self.account_mut(sender).balance_delta -= &amount;
        self.account_mut(destination).balance_delta += amount;
    }

    /// Record a forwarded transfer or call on `destination`.
    pub fn add_transfer(&mut self, destination: &Address, transfer: OutputTransfer) {
        self.account_mut(destination).transfers.push(transfer);
    }

    pub fn increment_nonce(&mut self, address: &Address) {
        self.account_mut(address).nonce_delta += 1;
    }

    pub fn deploy_code(&mut self, address: &Address, code: Vec<u8>, metadata: Vec<u8>, owner: Address) {
        let account = self.account_mut(address);
        account.code = Some(code);
        account.code_metadata = Some(metadata);
        account.owner = Some(owner);
    }

    /// Mark `address` for deletion, moving `balance` to `beneficiary`.
    pub fn self_destruct(&mut self, address: &Address, beneficiary: &Address, balance: &BigUint) {
        self.transfer_value(address, beneficiary, balance);
        let layer = self.top_mut();
        if !layer.deleted_accounts.contains(address) {
            layer.deleted_accounts.push(*address);
        }
    }

    pub fn write_log(&mut self, address: Address, topics: Vec<[u8; 32]>, data: Vec<u8>) {
        self.top_mut().logs.push(LogEntry { address, topics, data });
    }

    pub fn finish(&mut self, data: Vec<u8>) {
        self.top_mut().return_data.push(data);
    }

    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.top().return_data
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.top().logs
    }

    pub fn signal_user_error(&mut self) {
        self.top_mut().user_error = true;
    }

    pub fn has_user_error(&self) -> bool {
        self.top().user_error
    }

    /// Snapshot of the current layer as a VM output.
    pub fn layer_output(&self, gas_remaining: u64, gas_refund: u64) -> VmOutput {
        let layer = self.top();
        VmOutput {
            return_code: ReturnCode::Ok,
            return_message: String::new(),
            return_data: layer.return_data.clone(),
            gas_remaining,
            gas_refund,
            output_accounts: layer.accounts.clone(),
            deleted_accounts: layer.deleted_accounts.clone(),
            logs: layer.logs.clone(),
        }
    }

    /// Fold a finished call's output, e.g. from a built-in function, into the current layer.
    pub fn merge_vm_output(&mut self, output: &VmOutput) {
        let layer = OutputLayer {
            accounts: output.output_accounts.clone(),
            return_data: output.return_data.clone(),
            logs: output.logs.clone(),
            deleted_accounts: output.deleted_accounts.clone(),
            user_error: false,
        };
        self.top_mut().absorb(layer);
    }

    /// Fold every layer together and take the result, leaving the context empty.
    pub fn take_vm_output(&mut self, gas_remaining: u64, gas_refund: u64) -> VmOutput {
        while self.layers.len() > 1 {
            if let Some(child) = self.layers.pop() {
                self.top_mut().absorb(child);
            }
        }
        let layer = std::mem::take(self.top_mut());
        VmOutput {
            return_code: ReturnCode::Ok,
            return_message: String::new(),
            return_data: layer.return_data,
            gas_remaining,
            gas_refund,
            output_accounts: layer.accounts,
            deleted_accounts: layer.deleted_accounts,
            logs: layer.logs,
        }
    }
}
