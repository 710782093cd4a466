//! Kestrel VM - WASM smart-contract host.
//!
//! This crate provides:
//! - Execution contexts (runtime, metering, big integers, output, storage,
//!   blockchain, async calls) behind one [`VmHost`] handle
//! - A state stack for nested calls with commit/rollback semantics
//! - Gas metering reconciled with wasmtime fuel
//! - The environment interface imported by contracts
//! - Deployment, upgrade and the async call protocol

pub mod async_call;
pub mod bigint;
pub mod blockchain;
pub mod call_args;
pub mod config;
pub mod ei;
pub mod error;
pub mod execution;
pub mod gas_metering;
pub mod host;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod output;
pub mod reserved;
pub mod runtime;
pub mod storage;
pub mod wasm_runtime;

pub use async_call::{AsyncCall, AsyncCallRecord, AsyncContextInfo};
pub use blockchain::{BlockInfo, World};
pub use config::{ConfigError, EnableFlags, HostParameters, VmConfig};
pub use error::VmError;
pub use execution::{resolve_async_callback, run_smart_contract_call, run_smart_contract_create};
pub use gas_metering::{GasSchedule, MeteringContext};
pub use host::{FrameKind, VmHost};
pub use output::{LogEntry, OutputAccount, OutputTransfer, ReturnCode, VmOutput};
pub use runtime::{CallInput, CallType, ContractCreateInput};
pub use wasm_runtime::{HostState, WasmRuntime, WasmRuntimeConfig};

/// VM version constant
pub const VM_VERSION: u32 = 1;

/// Maximum WASM memory per contract (16 MB)
pub const MAX_MEMORY_BYTES: usize = 16 * 1024 * 1024;

/// Maximum call depth
pub const MAX_CALL_DEPTH: usize = 64;

/// Maximum contract code size (128 KB)
pub const MAX_CODE_SIZE: usize = 128 * 1024;

/// Gas limit of a block unless configured otherwise.
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 10_000_000;

pub const INIT_FUNCTION_NAME: &str = "init";
pub const CALLBACK_FUNCTION_NAME: &str = "callBack";
pub const UPGRADE_FUNCTION_NAME: &str = "upgradeContract";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_constants() {
        assert_eq!(VM_VERSION, 1);
        assert_eq!(MAX_MEMORY_BYTES, 16 * 1024 * 1024);
        assert_eq!(MAX_CALL_DEPTH, 64);
        assert!(DEFAULT_BLOCK_GAS_LIMIT > 0);
    }

    #[test]
    fn test_reserved_entry_points_are_distinct() {
        let names = [INIT_FUNCTION_NAME, CALLBACK_FUNCTION_NAME, UPGRADE_FUNCTION_NAME];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
