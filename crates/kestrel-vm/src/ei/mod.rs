//! Environment interface: the host functions contracts import.
//!
//! Every import is a plain adapter `fn(&VmHost, &mut [u8], args...) ->
//! Result<_, VmError>` over the guest's linear memory. [`register_imports`]
//! binds them into the linker behind one boundary that reconciles fuel,
//! contains panics and turns errors into traps.

pub mod bigint_api;
pub mod call_api;
pub mod context_api;
pub mod crypto_api;
pub mod debug_api;
pub mod memory;
pub mod output_api;
pub mod storage_api;

use crate::error::VmError;
use crate::host::VmHost;
use crate::wasm_runtime::HostState;
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;
use wasmtime::{Caller, Extern, Linker};

/// Import module name contracts link against.
pub const ENV_MODULE: &str = "env";

/// Every import name. Contracts may not export any of them.
pub const IMPORT_NAMES: &[&str] = &[
    "loadOwner",
    "loadCaller",
    "loadCallValue",
    "getCallValue",
    "loadBalance",
    "loadBlockHash",
    "getBlockTimestamp",
    "getNumArguments",
    "loadArgumentAsBytes",
    "getArgumentLength",
    "loadArgumentAsBigInt",
    "getArgumentAsInt64",
    "loadFunctionName",
    "getGasLeft",
    "storageStoreAsBytes",
    "storageLoadAsBytes",
    "storageStoreAsBigInt",
    "storageLoadAsBigInt",
    "storageStoreAsInt64",
    "storageLoadAsInt64",
    "sendTransaction",
    "executeOnDestContext",
    "executeOnSameContext",
    "asyncCall",
    "writeLog",
    "signalError",
    "returnBigInt",
    "returnInt32",
    "finish",
    "bigIntNew",
    "bigIntByteLength",
    "bigIntGetBytes",
    "bigIntSetBytes",
    "bigIntIsInt64",
    "bigIntGetInt64",
    "bigIntSetInt64",
    "bigIntAdd",
    "bigIntSub",
    "bigIntMul",
    "bigIntCmp",
    "sha256",
    "verifyEd25519",
    "verifyBLS",
    "verifySecp256k1",
    "debugPrintBigInt",
    "debugPrintInt32",
    "debugPrintBytes",
    "debugPrintString",
];

/// Run one adapter for the guest behind `caller`.
fn with_host<R>(
    caller: &mut Caller<'_, HostState>,
    import: &'static str,
    adapter: impl FnOnce(&VmHost, &mut [u8]) -> Result<R, VmError>,
) -> anyhow::Result<R> {
    let host = caller.data().host.clone();
    let remaining = caller.get_fuel()?;
    host.metering().sync_fuel(remaining);

    let memory = caller.get_export("memory").and_then(Extern::into_memory);
    let mut no_memory = [0u8; 0];
    let result = {
        let data: &mut [u8] = match memory {
            Some(memory) => memory.data_mut(&mut *caller),
            None => &mut no_memory,
        };
        panic::catch_unwind(AssertUnwindSafe(|| adapter(&host, data)))
            .unwrap_or_else(|payload| Err(VmError::from_panic(payload)))
    };

    let fuel = host.metering().checkpoint_fuel();
    caller.set_fuel(fuel)?;

    result.map_err(|err| {
        trace!(import, error = %err, "Import failed");
        anyhow::Error::new(err)
    })
}

macro_rules! link {
    ($linker:ident, $name:literal, $adapter:path, ($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        $linker
            .func_wrap(
                ENV_MODULE,
                $name,
                |mut caller: Caller<'_, HostState>, $($arg: $ty),*| -> anyhow::Result<$ret> {
                    with_host(&mut caller, $name, |host, memory| $adapter(host, memory, $($arg),*))
                },
            )
            .map_err(|e| VmError::ExecutionFailed(format!("link {}: {}", $name, e)))?;
    };
}

/// Bind every import into `linker`.
pub fn register_imports(linker: &mut Linker<HostState>) -> Result<(), VmError> {
    link!(linker, "loadOwner", context_api::load_owner, (result_offset: i32) -> ());
    link!(linker, "loadCaller", context_api::load_caller, (result_offset: i32) -> ());
    link!(linker, "loadCallValue", context_api::load_call_value, (result_offset: i32) -> i32);
    link!(linker, "getCallValue", context_api::load_call_value, (result_offset: i32) -> i32);
    link!(linker, "loadBalance", context_api::load_balance, (address_offset: i32, result_offset: i32) -> i32);
    link!(linker, "loadBlockHash", context_api::load_block_hash, (nonce: i64, result_offset: i32) -> i32);
    link!(linker, "getBlockTimestamp", context_api::get_block_timestamp, () -> i64);
    link!(linker, "getNumArguments", context_api::get_num_arguments, () -> i32);
    link!(linker, "loadArgumentAsBytes", context_api::load_argument_as_bytes, (id: i32, arg_offset: i32) -> i32);
    link!(linker, "getArgumentLength", context_api::get_argument_length, (id: i32) -> i32);
    link!(linker, "loadArgumentAsBigInt", context_api::load_argument_as_big_int, (id: i32, dest_handle: i32) -> ());
    link!(linker, "getArgumentAsInt64", context_api::get_argument_as_int64, (id: i32) -> i64);
    link!(linker, "loadFunctionName", context_api::load_function_name, (function_offset: i32) -> i32);
    link!(linker, "getGasLeft", context_api::get_gas_left, () -> i64);

    link!(linker, "storageStoreAsBytes", storage_api::storage_store_as_bytes, (key_offset: i32, data_offset: i32, data_length: i32) -> i32);
    link!(linker, "storageLoadAsBytes", storage_api::storage_load_as_bytes, (key_offset: i32, data_offset: i32) -> i32);
    link!(linker, "storageStoreAsBigInt", storage_api::storage_store_as_big_int, (key_offset: i32, handle: i32) -> i32);
    link!(linker, "storageLoadAsBigInt", storage_api::storage_load_as_big_int, (key_offset: i32, handle: i32) -> i32);
    link!(linker, "storageStoreAsInt64", storage_api::storage_store_as_int64, (key_offset: i32, value: i64) -> i32);
    link!(linker, "storageLoadAsInt64", storage_api::storage_load_as_int64, (key_offset: i32) -> i64);

    link!(linker, "sendTransaction", call_api::send_transaction, (gas_limit: i64, dest_offset: i32, value_handle: i32, data_offset: i32, data_length: i32) -> i32);
    link!(linker, "executeOnDestContext", call_api::execute_on_dest_context, (gas: i64, address_offset: i32, value_offset: i32, function_offset: i32, function_length: i32, num_arguments: i32, arguments_length_offset: i32, data_offset: i32) -> i32);
    link!(linker, "executeOnSameContext", call_api::execute_on_same_context, (gas: i64, address_offset: i32, value_offset: i32, function_offset: i32, function_length: i32, num_arguments: i32, arguments_length_offset: i32, data_offset: i32) -> i32);
    link!(linker, "asyncCall", call_api::async_call, (dest_offset: i32, value_offset: i32, data_offset: i32, length: i32) -> ());

    link!(linker, "writeLog", output_api::write_log, (payload_offset: i32, payload_length: i32, topics_offset: i32, num_topics: i32) -> ());
    link!(linker, "signalError", output_api::signal_error, () -> ());
    link!(linker, "returnBigInt", output_api::return_big_int, (handle: i32) -> ());
    link!(linker, "returnInt32", output_api::return_int32, (value: i32) -> ());
    link!(linker, "finish", output_api::finish, (data_offset: i32, length: i32) -> ());

    link!(linker, "bigIntNew", bigint_api::big_int_new, (small_value: i64) -> i32);
    link!(linker, "bigIntByteLength", bigint_api::big_int_byte_length, (handle: i32) -> i32);
    link!(linker, "bigIntGetBytes", bigint_api::big_int_get_bytes, (handle: i32, result_offset: i32) -> i32);
    link!(linker, "bigIntSetBytes", bigint_api::big_int_set_bytes, (handle: i32, byte_offset: i32, byte_length: i32) -> ());
    link!(linker, "bigIntIsInt64", bigint_api::big_int_is_int64, (handle: i32) -> i32);
    link!(linker, "bigIntGetInt64", bigint_api::big_int_get_int64, (handle: i32) -> i64);
    link!(linker, "bigIntSetInt64", bigint_api::big_int_set_int64, (handle: i32, value: i64) -> ());
    link!(linker, "bigIntAdd", bigint_api::big_int_add, (dest: i32, op1: i32, op2: i32) -> ());
    link!(linker, "bigIntSub", bigint_api::big_int_sub, (dest: i32, op1: i32, op2: i32) -> ());
    link!(linker, "bigIntMul", bigint_api::big_int_mul, (dest: i32, op1: i32, op2: i32) -> ());
    link!(linker, "bigIntCmp", bigint_api::big_int_cmp, (op1: i32, op2: i32) -> i32);

    link!(linker, "sha256", crypto_api::sha256, (data_offset: i32, length: i32, result_offset: i32) -> i32);
    link!(linker, "verifyEd25519", crypto_api::verify_ed25519, (key_offset: i32, message_offset: i32, message_length: i32, sig_offset: i32) -> i32);
    link!(linker, "verifyBLS", crypto_api::verify_bls, (key_offset: i32, message_offset: i32, message_length: i32, sig_offset: i32) -> i32);
    link!(linker, "verifySecp256k1", crypto_api::verify_secp256k1, (key_offset: i32, key_length: i32, message_offset: i32, message_length: i32, sig_offset: i32) -> i32);

    link!(linker, "debugPrintBigInt", debug_api::debug_print_big_int, (handle: i32) -> ());
    link!(linker, "debugPrintInt32", debug_api::debug_print_int32, (value: i32) -> ());
    link!(linker, "debugPrintBytes", debug_api::debug_print_bytes, (offset: i32, length: i32) -> ());
    link!(linker, "debugPrintString", debug_api::debug_print_string, (offset: i32, length: i32) -> ());

    Ok(())
}

/// Encoding of `value` used by the int64 imports: minimal unsigned
/// big-endian when non-negative (zero has no bytes), fixed-width two's
/// complement when negative.
pub fn encode_int64(value: i64) -> Vec<u8> {
    if value < 0 {
        return value.to_be_bytes().to_vec();
    }
    strip_leading_zeros(&value.to_be_bytes()).to_vec()
}

/// Same rule as [`encode_int64`] with a 4-byte negative width.
pub fn encode_int32(value: i32) -> Vec<u8> {
    if value < 0 {
        return value.to_be_bytes().to_vec();
    }
    strip_leading_zeros(&value.to_be_bytes()).to_vec()
}

/// Unsigned big-endian bytes keeping the low 64 bits, as an i64.
pub fn decode_int64(bytes: &[u8]) -> i64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)) as i64
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}
