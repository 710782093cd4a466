//! The composite host: every context of a call behind one shared handle.
//!
//! The handle is cloned into each wasm store so imports can reach the
//! contexts while the guest runs. Each context sits in its own `RefCell`;
//! a borrow never outlives the host operation that took it, so nested
//! calls started from an import can borrow them again.

use crate::async_call::{AsyncContext, AsyncContextInfo};
use crate::bigint::BigIntContext;
use crate::blockchain::{BlockchainContext, World};
use crate::config::HostParameters;
use crate::ei;
use crate::error::VmError;
use crate::gas_metering::{GasSchedule, MeteringContext};
use crate::output::OutputContext;
use crate::reserved::ReservedFunctions;
use crate::runtime::{CallInput, FrameOutcome, RuntimeContext};
use crate::storage::{StorageContext, StorageStatus};
use crate::wasm_runtime::{WasmRuntime, WasmRuntimeConfig};
use kestrel_crypto::CryptoSuite;
use kestrel_types::{Address, Hash};
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use parking_lot::RwLock;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// Which contexts a frame gets fresh copies of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Entry of a top-level call; its gas is set by `init_for_call`.
    Top,
    /// Callee runs as itself, with its own storage and big integers.
    DestContext,
    /// Callee code runs as the caller, sharing its storage and big integers.
    SameContext,
}

impl FrameKind {
    fn isolates_account(self) -> bool {
        self != FrameKind::SameContext
    }
}

/// What a closed frame leaves behind for its parent.
#[derive(Debug, Clone, Default)]
pub struct FrameResult {
    pub gas_used: u64,
    pub async_info: AsyncContextInfo,
}

struct HostImpl {
    params: HostParameters,
    gas_schedule: RwLock<Arc<GasSchedule>>,
    reserved: ReservedFunctions,
    crypto: CryptoSuite,
    wasm: WasmRuntime,
    blockchain: BlockchainContext,
    runtime: RefCell<RuntimeContext>,
    metering: RefCell<MeteringContext>,
    bigint: RefCell<BigIntContext>,
    output: RefCell<OutputContext>,
    storage: RefCell<StorageContext>,
    async_context: RefCell<AsyncContext>,
}

/// Shared handle to the host.
#[derive(Clone)]
pub struct VmHost(Rc<HostImpl>);

impl std::fmt::Debug for VmHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmHost")
            .field("vm_type", &hex::encode(&self.0.params.vm_type))
            .field("depth", &self.0.runtime.borrow().depth())
            .finish_non_exhaustive()
    }
}

impl VmHost {
    pub fn new(world: Rc<dyn World>, params: HostParameters) -> Result<Self, VmError> {
        Self::with_crypto(world, params, CryptoSuite::default())
    }

    pub fn with_crypto(world: Rc<dyn World>, params: HostParameters, crypto: CryptoSuite) -> Result<Self, VmError> {
        params
            .validate()
            .map_err(|e| VmError::ExecutionFailed(e.to_string()))?;

        let schedule = Arc::new(params.gas_schedule.clone());
        let wasm = WasmRuntime::new(WasmRuntimeConfig {
            max_memory_bytes: params.max_memory_bytes,
            cache_modules: params.flags.aot,
        })?;
        let reserved = ReservedFunctions::new(ei::IMPORT_NAMES.iter().copied(), &params.protocol_builtin_functions);

        info!(
            version = crate::VM_VERSION,
            vm_type = %hex::encode(&params.vm_type),
            reserved = reserved.len(),
            "Contract host created"
        );

        Ok(Self(Rc::new(HostImpl {
            gas_schedule: RwLock::new(schedule.clone()),
            reserved,
            crypto,
            wasm,
            blockchain: BlockchainContext::new(world),
            runtime: RefCell::new(RuntimeContext::new(params.max_call_depth)),
            metering: RefCell::new(MeteringContext::new(schedule, params.block_gas_limit)),
            bigint: RefCell::new(BigIntContext::new()),
            output: RefCell::new(OutputContext::new()),
            storage: RefCell::new(StorageContext::new(params.protected_key_prefix.clone())),
            async_context: RefCell::new(AsyncContext::new()),
            params,
        })))
    }

    pub fn params(&self) -> &HostParameters {
        &self.0.params
    }

    pub fn crypto(&self) -> &CryptoSuite {
        &self.0.crypto
    }

    pub fn wasm(&self) -> &WasmRuntime {
        &self.0.wasm
    }

    pub fn reserved(&self) -> &ReservedFunctions {
        &self.0.reserved
    }

    pub fn blockchain(&self) -> &BlockchainContext {
        &self.0.blockchain
    }

    pub fn runtime(&self) -> RefMut<'_, RuntimeContext> {
        self.0.runtime.borrow_mut()
    }

    pub fn metering(&self) -> RefMut<'_, MeteringContext> {
        self.0.metering.borrow_mut()
    }

    pub fn bigint(&self) -> RefMut<'_, BigIntContext> {
        self.0.bigint.borrow_mut()
    }

    pub fn output(&self) -> RefMut<'_, OutputContext> {
        self.0.output.borrow_mut()
    }

    pub fn storage(&self) -> RefMut<'_, StorageContext> {
        self.0.storage.borrow_mut()
    }

    pub fn async_context(&self) -> RefMut<'_, AsyncContext> {
        self.0.async_context.borrow_mut()
    }

    /// Replace the gas schedule. Calls already running keep the schedule
    /// they started with; the next top-level call picks up this one.
    pub fn gas_schedule_change(&self, schedule: GasSchedule) {
        debug!("Gas schedule replaced");
        *self.0.gas_schedule.write() = Arc::new(schedule);
    }

    /// Schedule of the call in progress.
    pub fn schedule(&self) -> Arc<GasSchedule> {
        self.metering().schedule_handle()
    }

    pub fn use_gas(&self, amount: u64) -> Result<(), VmError> {
        self.metering().use_gas(amount)
    }

    pub fn gas_left(&self) -> u64 {
        self.metering().gas_left()
    }

    pub fn is_builtin_function(&self, name: &str) -> bool {
        self.0.params.flags.builtin_functions && self.0.params.protocol_builtin_functions.contains(name)
    }

    /// Reset every context for a new top-level call.
    pub fn init_state(&self) {
        let schedule = self.0.gas_schedule.read().clone();
        self.metering().set_schedule(schedule);
        self.metering().clear_state_stack();
        self.runtime().init_state();
        self.bigint().init_state();
        self.output().init_state();
        self.storage().clear_state_stack();
        self.async_context().init_state();
    }

    /// Open a frame for `input`. The depth check runs before any context is
    /// pushed, so a refused frame leaves the host untouched.
    pub fn push_state(&self, kind: FrameKind, input: CallInput) -> Result<(), VmError> {
        let caller = input.caller;
        let recipient = input.recipient;
        let gas_provided = input.gas_provided;
        let seed = match kind {
            FrameKind::Top => Some(Hash::compute_multi(&[
                input.original_tx_hash.as_bytes().as_slice(),
                input.current_tx_hash.as_bytes().as_slice(),
                input.async_call_id.as_bytes().as_slice(),
            ])),
            _ => None,
        };

        self.runtime().push_state(input)?;
        if kind != FrameKind::Top {
            self.metering().push_state(gas_provided);
        }
        if kind.isolates_account() {
            self.bigint().push_state();
            let mut storage = self.storage();
            storage.push_state();
            storage.set_address(recipient);
        }
        self.output().push_state();
        let mut async_context = self.async_context();
        if let Some(seed) = seed {
            async_context.set_seed(seed);
        }
        async_context.push_state(caller);
        Ok(())
    }

    /// Close the executing frame. A frame that does not commit has its
    /// effects dropped and its whole gas budget consumed.
    pub fn pop_state(&self, kind: FrameKind, outcome: FrameOutcome) -> Result<FrameResult, VmError> {
        if outcome.is_commit() {
            self.output().pop_merge()?;
        } else {
            self.output().pop_discard()?;
            self.metering().use_all_gas();
        }

        let async_info = self.async_context().pop_state()?;
        if kind.isolates_account() {
            self.bigint().pop_state()?;
            self.storage().pop_state()?;
        }
        let gas_used = match kind {
            FrameKind::Top => self.metering().gas_used(),
            _ => self.metering().pop_state()?,
        };
        self.runtime().pop_state(outcome)?;

        Ok(FrameResult { gas_used, async_info })
    }

    /// Drop every frame left open, e.g. after a fault.
    pub fn clear_state_stack(&self) {
        self.runtime().clear_state_stack();
        self.metering().clear_state_stack();
        self.bigint().clear_state_stack();
        self.output().clear_state_stack();
        self.storage().clear_state_stack();
        self.async_context().clear_state_stack();
    }

    /// Balance as seen by the executing contract. The account value flows
    /// through includes pending changes; every other account reads
    /// committed state.
    pub fn balance(&self, address: &Address) -> BigUint {
        let committed = self.blockchain().balance(address);
        if *address != self.storage().address() {
            return committed;
        }
        let delta = self.output().balance_delta(address);
        (BigInt::from(committed) + delta).to_biguint().unwrap_or_default()
    }

    /// Committed balance plus every pending change.
    fn available_balance(&self, address: &Address) -> BigUint {
        let committed = BigInt::from(self.blockchain().balance(address));
        let delta = self.output().balance_delta(address);
        (committed + delta).to_biguint().unwrap_or_default()
    }

    /// Move value between accounts, failing when `sender` cannot cover it.
    pub fn transfer_value(&self, sender: &Address, destination: &Address, value: &BigUint) -> Result<(), VmError> {
        if !value.is_zero() && self.available_balance(sender) < *value {
            return Err(VmError::OutOfFunds(format!("{} cannot pay {}", sender, value)));
        }
        self.output().transfer_value(sender, destination, value);
        Ok(())
    }

    /// Take value that leaves this shard with a forwarded call.
    pub fn debit_value(&self, sender: &Address, value: &BigUint) -> Result<(), VmError> {
        if value.is_zero() {
            return Ok(());
        }
        if self.available_balance(sender) < *value {
            return Err(VmError::OutOfFunds(format!("{} cannot pay {}", sender, value)));
        }
        self.output().account_mut(sender).balance_delta -= BigInt::from(value.clone());
        Ok(())
    }

    /// Credit value that arrived from outside this shard.
    pub fn credit_value(&self, destination: &Address, value: &BigUint) {
        self.output().account_mut(destination).balance_delta += BigInt::from(value.clone());
    }

    pub fn storage_load(&self, key: &[u8]) -> Vec<u8> {
        let output = self.output();
        self.storage().get(key, &output, self.blockchain())
    }

    pub fn storage_load_from(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        let output = self.output();
        self.storage().get_from(address, key, &output, self.blockchain())
    }

    pub fn storage_store(&self, key: &[u8], value: &[u8]) -> Result<StorageStatus, VmError> {
        let storage = self.storage();
        let mut output = self.output();
        let mut metering = self.metering();
        storage.set(key, value, &mut output, self.blockchain(), &mut metering)
    }

    /// Code of `address`, preferring code deployed earlier in this transaction.
    pub fn code(&self, address: &Address) -> Option<Vec<u8>> {
        let pending = self.output().pending_code(address).map(<[u8]>::to_vec);
        pending.or_else(|| self.blockchain().code(address))
    }

    pub fn owner(&self, address: &Address) -> Option<Address> {
        self.blockchain().owner(address)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mock::MockWorld;
    use crate::runtime::CallState;

    pub(crate) fn test_host(world: MockWorld) -> (VmHost, Rc<MockWorld>) {
        let world = Rc::new(world);
        let host = VmHost::new(world.clone(), HostParameters::default()).unwrap();
        (host, world)
    }

    pub(crate) fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    /// Host with an open top-level frame for `recipient`, as seen by an import.
    pub(crate) fn host_in_call(world: MockWorld, input: CallInput) -> (VmHost, Rc<MockWorld>) {
        let (host, world) = test_host(world);
        host.init_state();
        host.metering().init_for_call(input.gas_provided);
        host.push_state(FrameKind::Top, input).unwrap();
        (host, world)
    }

    #[test]
    fn test_push_pop_restores_contexts() {
        let (host, _) = test_host(MockWorld::new());
        host.init_state();
        host.metering().init_for_call(10_000);
        host.push_state(FrameKind::Top, CallInput::new(addr(1), addr(2), "main", 10_000))
            .unwrap();
        let outer = host.bigint().new_value(7);

        host.push_state(FrameKind::DestContext, CallInput::new(addr(2), addr(3), "inner", 4_000))
            .unwrap();
        assert_eq!(host.storage().address(), addr(3));
        assert!(host.bigint().is_empty());
        host.use_gas(1_000).unwrap();
        let result = host.pop_state(FrameKind::DestContext, FrameOutcome::Commit).unwrap();

        assert_eq!(result.gas_used, 1_000);
        assert_eq!(host.storage().address(), addr(2));
        assert_eq!(host.bigint().get_int64(outer), Ok(7));
        assert_eq!(host.metering().gas_used(), 1_000);
    }

    #[test]
    fn test_same_context_shares_storage_and_bigints() {
        let (host, _) = test_host(MockWorld::new());
        host.init_state();
        host.metering().init_for_call(10_000);
        host.push_state(FrameKind::Top, CallInput::new(addr(1), addr(2), "main", 10_000))
            .unwrap();
        let handle = host.bigint().new_value(1);

        host.push_state(FrameKind::SameContext, CallInput::new(addr(2), addr(5), "lib", 1_000))
            .unwrap();
        assert_eq!(host.storage().address(), addr(2));
        assert_eq!(host.runtime().sc_address(), addr(5));
        host.bigint().set_int64(handle, 99).unwrap();
        host.pop_state(FrameKind::SameContext, FrameOutcome::Commit).unwrap();

        assert_eq!(host.bigint().get_int64(handle), Ok(99));
    }

    #[test]
    fn test_failed_frame_rolls_back_and_burns_budget() {
        let (host, _) = test_host(MockWorld::new());
        host.init_state();
        host.metering().init_for_call(10_000);
        host.push_state(FrameKind::Top, CallInput::new(addr(1), addr(2), "main", 10_000))
            .unwrap();
        host.storage_store(b"key", b"parent").unwrap();
        let used_before = host.metering().gas_used();

        host.push_state(FrameKind::DestContext, CallInput::new(addr(2), addr(2), "inner", 3_000))
            .unwrap();
        host.storage_store(b"key", b"child").unwrap();
        host.pop_state(FrameKind::DestContext, FrameOutcome::Fault).unwrap();

        assert_eq!(host.storage_load(b"key"), b"parent".to_vec());
        assert_eq!(host.metering().gas_used(), used_before + 3_000);
        assert_eq!(host.runtime().state(), CallState::Running);
    }

    #[test]
    fn test_depth_refusal_pushes_nothing() {
        let world = Rc::new(MockWorld::new());
        let params = HostParameters {
            max_call_depth: 1,
            ..HostParameters::default()
        };
        let host = VmHost::new(world, params).unwrap();
        host.init_state();
        host.metering().init_for_call(1_000);
        host.push_state(FrameKind::Top, CallInput::new(addr(1), addr(2), "main", 1_000))
            .unwrap();

        let err = host
            .push_state(FrameKind::DestContext, CallInput::new(addr(2), addr(3), "f", 100))
            .unwrap_err();
        assert_eq!(err, VmError::CallDepthExceeded { depth: 1 });
        assert_eq!(host.metering().depth(), 0);
        assert_eq!(host.output().depth(), 1);
        assert_eq!(host.storage().address(), addr(2));
    }

    #[test]
    fn test_gas_schedule_change_applies_to_next_call() {
        let (host, _) = test_host(MockWorld::new());
        host.init_state();
        assert_eq!(host.schedule().ei_api_cost.get_caller, 100);

        host.gas_schedule_change(GasSchedule::uniform(3));
        assert_eq!(host.schedule().ei_api_cost.get_caller, 100);

        host.init_state();
        assert_eq!(host.schedule().ei_api_cost.get_caller, 3);
    }

    #[test]
    fn test_own_balance_includes_pending() {
        let world = MockWorld::new();
        world.set_balance(addr(1), BigUint::from(100u32));
        world.set_balance(addr(2), BigUint::from(50u32));
        let (host, _) = host_in_call(world, CallInput::new(addr(1), addr(2), "main", 1_000));

        host.transfer_value(&addr(1), &addr(2), &BigUint::from(30u32)).unwrap();
        assert_eq!(host.balance(&addr(2)), BigUint::from(80u32));
        assert_eq!(host.balance(&addr(1)), BigUint::from(100u32));

        let err = host
            .transfer_value(&addr(1), &addr(2), &BigUint::from(71u32))
            .unwrap_err();
        assert!(matches!(err, VmError::OutOfFunds(_)));
    }

    #[test]
    fn test_same_context_balance_reads_caller_account() {
        let world = MockWorld::new();
        world.set_balance(addr(1), BigUint::from(100u32));
        world.set_balance(addr(2), BigUint::from(10u32));
        world.set_balance(addr(5), BigUint::from(7u32));
        let (host, _) = host_in_call(world, CallInput::new(addr(1), addr(2), "main", 1_000));
        host.transfer_value(&addr(1), &addr(2), &BigUint::from(30u32)).unwrap();

        host.push_state(FrameKind::SameContext, CallInput::new(addr(2), addr(5), "lib", 500))
            .unwrap();
        assert_eq!(host.balance(&addr(2)), BigUint::from(40u32));
        assert_eq!(host.balance(&addr(5)), BigUint::from(7u32));
        host.pop_state(FrameKind::SameContext, FrameOutcome::Commit).unwrap();
    }
}
