//! Gas schedule and the per-call gas budget.

use crate::config::{ConfigError, GasScheduleMap};
use crate::error::VmError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

macro_rules! cost_table {
    ($(#[$meta:meta])* $name:ident { $($field:ident => $key:literal = $default:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(#[serde(rename = $key)] pub $field: u64,)*
        }

        impl $name {
            /// Every operation in this table costs `cost`.
            pub fn uniform(cost: u64) -> Self {
                Self { $($field: cost,)* }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $($field: $default,)* }
            }
        }
    };
}

cost_table! {
    /// Per-byte costs shared by several operations.
    BaseOperationCost {
        store_per_byte => "StorePerByte" = 50,
        release_per_byte => "ReleasePerByte" = 10,
        data_copy_per_byte => "DataCopyPerByte" = 3,
        persist_per_byte => "PersistPerByte" = 10,
        compile_per_byte => "CompilePerByte" = 1,
    }
}

cost_table! {
    /// Base cost of each environment interface import.
    EiApiCost {
        get_owner => "GetOwner" = 100,
        get_caller => "GetCaller" = 100,
        get_call_value => "GetCallValue" = 100,
        get_balance => "GetBalance" = 500,
        get_block_hash => "GetBlockHash" = 500,
        get_block_timestamp => "GetBlockTimeStamp" = 100,
        get_num_arguments => "GetNumArguments" = 100,
        get_argument => "GetArgument" = 100,
        get_function => "GetFunction" = 100,
        storage_store => "StorageStore" = 1_000,
        storage_load => "StorageLoad" = 500,
        transfer_value => "TransferValue" = 2_000,
        log => "Log" = 375,
        log_per_topic => "LogPerTopic" = 375,
        signal_error => "SignalError" = 100,
        finish => "Finish" = 100,
        int64_get_argument => "Int64GetArgument" = 100,
        int64_storage_store => "Int64StorageStore" = 1_000,
        int64_storage_load => "Int64StorageLoad" = 500,
        int64_finish => "Int64Finish" = 100,
        get_gas_left => "GetGasLeft" = 50,
        execute_on_dest_context => "ExecuteOnDestContext" = 2_000,
        execute_on_same_context => "ExecuteOnSameContext" = 2_000,
        async_call_step => "AsyncCallStep" = 1_000,
        async_callback_gas_lock => "AsyncCallbackGasLock" = 100_000,
        create_contract => "CreateContract" = 5_000,
        debug_print => "DebugPrint" = 0,
    }
}

cost_table! {
    /// Base cost of each big integer import.
    BigIntApiCost {
        big_int_new => "BigIntNew" = 20,
        big_int_byte_length => "BigIntByteLength" = 20,
        big_int_get_bytes => "BigIntGetBytes" = 30,
        big_int_set_bytes => "BigIntSetBytes" = 30,
        big_int_is_int64 => "BigIntIsInt64" = 20,
        big_int_get_int64 => "BigIntGetInt64" = 20,
        big_int_set_int64 => "BigIntSetInt64" = 20,
        big_int_add => "BigIntAdd" = 40,
        big_int_sub => "BigIntSub" = 40,
        big_int_mul => "BigIntMul" = 80,
        big_int_cmp => "BigIntCmp" = 20,
        big_int_finish => "BigIntFinish" = 100,
        big_int_storage_store => "BigIntStorageStore" = 1_000,
        big_int_storage_load => "BigIntStorageLoad" = 500,
        big_int_get_call_value => "BigIntGetCallValue" = 100,
        big_int_get_argument => "BigIntGetArgument" = 100,
    }
}

cost_table! {
    /// Cost of the cryptographic imports.
    CryptoApiCost {
        sha256 => "SHA256" = 1_000,
        verify_ed25519 => "VerifyEd25519" = 3_000,
        verify_bls => "VerifyBLS" = 12_000,
        verify_secp256k1 => "VerifySecp256k1" = 6_000,
    }
}

cost_table! {
    /// Gas per unit of engine fuel. The engine reports one unit per instruction.
    WasmOpcodeCost {
        instruction => "Instruction" = 1,
    }
}

/// Typed gas schedule built from a [`GasScheduleMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    #[serde(rename = "BaseOperationCost")]
    pub base_operation_cost: BaseOperationCost,
    #[serde(rename = "EIAPICost")]
    pub ei_api_cost: EiApiCost,
    #[serde(rename = "BigIntAPICost")]
    pub big_int_api_cost: BigIntApiCost,
    #[serde(rename = "CryptoAPICost")]
    pub crypto_api_cost: CryptoApiCost,
    #[serde(rename = "WASMOpcodeCost")]
    pub wasm_opcode_cost: WasmOpcodeCost,
}

impl GasSchedule {
    /// Schedule where every operation costs `cost`, used by tests.
    pub fn uniform(cost: u64) -> Self {
        Self {
            base_operation_cost: BaseOperationCost::uniform(cost),
            ei_api_cost: EiApiCost::uniform(cost),
            big_int_api_cost: BigIntApiCost::uniform(cost),
            crypto_api_cost: CryptoApiCost::uniform(cost),
            wasm_opcode_cost: WasmOpcodeCost::uniform(cost.max(1)),
        }
    }

    /// Convert a raw section/operation map. Every operation must be present.
    pub fn from_map(map: &GasScheduleMap) -> Result<Self, ConfigError> {
        let value = toml::Value::try_from(map).map_err(|e| ConfigError::InvalidGasSchedule(e.to_string()))?;
        let schedule: GasSchedule = value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidGasSchedule(e.to_string()))?;
        if schedule.wasm_opcode_cost.instruction == 0 {
            return Err(ConfigError::InvalidGasSchedule(
                "WASMOpcodeCost.Instruction must be positive".to_string(),
            ));
        }
        Ok(schedule)
    }

    /// Flatten back into a raw map.
    pub fn to_map(&self) -> Result<GasScheduleMap, ConfigError> {
        let value = toml::Value::try_from(self).map_err(|e| ConfigError::InvalidGasSchedule(e.to_string()))?;
        value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidGasSchedule(e.to_string()))
    }

    /// Gas charged per unit of engine fuel.
    pub fn fuel_unit(&self) -> u64 {
        self.wasm_opcode_cost.instruction.max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GasFrame {
    provided: u64,
    used: u64,
    refund: u64,
    /// Fuel handed to the engine at the last reconciliation.
    fuel_checkpoint: u64,
}

/// Gas budget of the executing frame plus the budgets of suspended parents.
#[derive(Debug, Clone)]
pub struct MeteringContext {
    schedule: Arc<GasSchedule>,
    block_gas_limit: u64,
    frame: GasFrame,
    stack: Vec<GasFrame>,
}

impl MeteringContext {
    pub fn new(schedule: Arc<GasSchedule>, block_gas_limit: u64) -> Self {
        Self {
            schedule,
            block_gas_limit,
            frame: GasFrame::default(),
            stack: Vec::new(),
        }
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn schedule_handle(&self) -> Arc<GasSchedule> {
        self.schedule.clone()
    }

    /// Install the schedule a new top-level call runs with.
    pub fn set_schedule(&mut self, schedule: Arc<GasSchedule>) {
        self.schedule = schedule;
    }

    /// Start a top-level call with `gas_provided`, capped at the block gas limit.
    pub fn init_for_call(&mut self, gas_provided: u64) {
        self.frame = GasFrame {
            provided: gas_provided.min(self.block_gas_limit),
            ..GasFrame::default()
        };
    }

    pub fn gas_provided(&self) -> u64 {
        self.frame.provided
    }

    pub fn gas_used(&self) -> u64 {
        self.frame.used
    }

    pub fn gas_left(&self) -> u64 {
        self.frame.provided.saturating_sub(self.frame.used)
    }

    pub fn gas_refund(&self) -> u64 {
        self.frame.refund
    }

    /// Deduct `amount` from the budget. On failure the whole remaining budget is consumed.
    pub fn use_gas(&mut self, amount: u64) -> Result<(), VmError> {
        let left = self.gas_left();
        if amount > left {
            self.frame.used = self.frame.provided;
            return Err(VmError::OutOfGas { requested: amount, left });
        }
        self.frame.used += amount;
        Ok(())
    }

    /// Consume the rest of the budget and forfeit pending refunds.
    pub fn use_all_gas(&mut self) {
        self.frame.used = self.frame.provided;
        self.frame.refund = 0;
    }

    /// Give back gas that was reserved but not spent.
    pub fn restore_gas(&mut self, amount: u64) {
        self.frame.used = self.frame.used.saturating_sub(amount);
    }

    pub fn add_refund(&mut self, amount: u64) {
        self.frame.refund = self.frame.refund.saturating_add(amount);
    }

    /// Clamp a requested child gas limit to what this frame can still spend.
    pub fn bound_gas_limit(&self, requested: u64) -> u64 {
        requested.min(self.gas_left())
    }

    /// Fuel the engine may burn before the budget is exhausted.
    pub fn fuel_budget(&self) -> u64 {
        self.gas_left() / self.schedule.fuel_unit()
    }

    /// Record the fuel about to be handed to the engine and return it.
    pub fn checkpoint_fuel(&mut self) -> u64 {
        self.frame.fuel_checkpoint = self.fuel_budget();
        self.frame.fuel_checkpoint
    }

    /// Charge the fuel burnt since the last checkpoint.
    pub fn sync_fuel(&mut self, remaining_fuel: u64) {
        let burnt = self.frame.fuel_checkpoint.saturating_sub(remaining_fuel);
        let gas = burnt.saturating_mul(self.schedule.fuel_unit());
        self.frame.used = self.frame.used.saturating_add(gas).min(self.frame.provided);
        self.frame.fuel_checkpoint = remaining_fuel;
    }

    /// Suspend the current frame and give the child `gas_provided`, bounded by what is left.
    pub fn push_state(&mut self, gas_provided: u64) {
        let provided = self.bound_gas_limit(gas_provided);
        self.stack.push(self.frame);
        self.frame = GasFrame {
            provided,
            ..GasFrame::default()
        };
    }

    /// Resume the parent frame, charging it everything the child used.
    /// Spent gas is never refunded, whether the child committed or not.
    pub fn pop_state(&mut self) -> Result<u64, VmError> {
        let child = self.frame;
        self.frame = self.stack.pop().ok_or(VmError::StateStackUnderflow)?;
        self.frame.used = self.frame.used.saturating_add(child.used).min(self.frame.provided);
        self.frame.refund = self.frame.refund.saturating_add(child.refund);
        Ok(child.used)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }
}
