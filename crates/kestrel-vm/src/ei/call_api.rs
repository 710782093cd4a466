//! Imports that move value or start other calls. A failing child never
//! traps its caller: these imports report it as status 1.

use super::context_api::value_bytes;
use super::memory;
use crate::async_call::{AsyncCall, AsyncCallStatus};
use crate::call_args::CallArgs;
use crate::error::VmError;
use crate::execution;
use crate::host::VmHost;
use crate::output::OutputTransfer;
use crate::runtime::{CallInput, CallType};
use crate::CALLBACK_FUNCTION_NAME;
use kestrel_types::Hash;
use num_bigint::BigUint;
use tracing::debug;

/// Group that `asyncCall` registers into.
pub const DEFAULT_ASYNC_GROUP: &str = "";

const VALUE_LEN: i32 = 32;

fn load_value(memory: &[u8], offset: i32) -> Result<BigUint, VmError> {
    Ok(BigUint::from_bytes_be(memory::load(memory, offset, VALUE_LEN)?))
}

fn status(import: &str, result: Result<(), VmError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            debug!(import, error = %err, "Child call failed");
            1
        }
    }
}

/// Arguments laid out as `num_arguments` little-endian lengths followed by
/// the concatenated argument bytes.
fn load_arguments(memory: &[u8], num_arguments: i32, lengths_offset: i32, data_offset: i32) -> Result<Vec<Vec<u8>>, VmError> {
    let mut arguments = Vec::with_capacity(num_arguments.max(0) as usize);
    let mut cursor = data_offset;
    for index in 0..num_arguments {
        let length = memory::load_i32(memory, lengths_offset.saturating_add(index.saturating_mul(4)))?;
        arguments.push(memory::load(memory, cursor, length)?.to_vec());
        cursor = cursor.saturating_add(length);
    }
    Ok(arguments)
}

/// Build the input of a nested call made by the executing contract.
#[allow(clippy::too_many_arguments)]
fn nested_input(
    host: &VmHost,
    memory: &[u8],
    gas: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> Result<CallInput, VmError> {
    let recipient = memory::load_address(memory, address_offset)?;
    let value = load_value(memory, value_offset)?;
    let function = String::from_utf8(memory::load(memory, function_offset, function_length)?.to_vec())
        .map_err(|_| VmError::ExecutionFailed("function name is not UTF-8".to_string()))?;
    let arguments = load_arguments(memory, num_arguments, arguments_length_offset, data_offset)?;

    let copied: usize = arguments.iter().map(Vec::len).sum();
    host.use_gas(host.schedule().base_operation_cost.data_copy_per_byte * copied as u64)?;

    let runtime = host.runtime();
    let parent = runtime.input();
    Ok(CallInput {
        caller: runtime.sc_address(),
        recipient,
        function,
        arguments,
        call_value: value,
        gas_provided: u64::try_from(gas).unwrap_or(0),
        gas_price: parent.gas_price,
        call_type: CallType::DirectCall,
        current_tx_hash: parent.current_tx_hash,
        original_tx_hash: parent.original_tx_hash,
        async_call_id: Hash::default(),
    })
}

/// Move value from the executing account and forward `data` with
/// `gas_limit` for the destination to run.
pub fn send_transaction(
    host: &VmHost,
    memory: &mut [u8],
    gas_limit: i64,
    dest_offset: i32,
    value_handle: i32,
    data_offset: i32,
    data_length: i32,
) -> Result<i32, VmError> {
    let schedule = host.schedule();
    let per_byte = schedule.base_operation_cost.data_copy_per_byte;
    host.use_gas(
        schedule
            .ei_api_cost
            .transfer_value
            .saturating_add(per_byte.saturating_mul(data_length.max(0) as u64)),
    )?;

    let destination = memory::load_address(memory, dest_offset)?;
    let value = BigUint::from_bytes_be(&value_bytes(host.bigint().get(value_handle)?)?);
    let data = memory::load(memory, data_offset, data_length)?.to_vec();
    let gas_limit = u64::try_from(gas_limit).unwrap_or(0);

    let sender = host.storage().address();
    let parsed = CallArgs::parse(&data);
    let result = parsed.and_then(|_| {
        host.use_gas(gas_limit)?;
        host.transfer_value(&sender, &destination, &value)?;
        host.output().add_transfer(
            &destination,
            OutputTransfer {
                sender,
                value,
                gas_limit,
                gas_locked: 0,
                data,
                call_type: CallType::DirectCall,
                call_id: Hash::default(),
            },
        );
        Ok(())
    });
    match result {
        Err(err @ VmError::OutOfGas { .. }) => Err(err),
        other => Ok(status("sendTransaction", other)),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn execute_on_dest_context(
    host: &VmHost,
    memory: &mut [u8],
    gas: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.execute_on_dest_context)?;
    let input = nested_input(
        host,
        memory,
        gas,
        address_offset,
        value_offset,
        function_offset,
        function_length,
        num_arguments,
        arguments_length_offset,
        data_offset,
    )?;
    let result = execution::execute_on_dest_context(host, input).map(|_| ());
    Ok(status("executeOnDestContext", result))
}

#[allow(clippy::too_many_arguments)]
pub fn execute_on_same_context(
    host: &VmHost,
    memory: &mut [u8],
    gas: i64,
    address_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.execute_on_same_context)?;
    let input = nested_input(
        host,
        memory,
        gas,
        address_offset,
        value_offset,
        function_offset,
        function_length,
        num_arguments,
        arguments_length_offset,
        data_offset,
    )?;
    let result = execution::execute_on_same_context(host, input).map(|_| ());
    Ok(status("executeOnSameContext", result))
}

/// Register a deferred call in the default group. It is settled when the
/// executing frame finishes; execution continues here.
pub fn async_call(
    host: &VmHost,
    memory: &mut [u8],
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    length: i32,
) -> Result<(), VmError> {
    let schedule = host.schedule();
    let per_byte = schedule.base_operation_cost.data_copy_per_byte;
    host.use_gas(
        schedule
            .ei_api_cost
            .async_call_step
            .saturating_add(per_byte.saturating_mul(length.max(0) as u64)),
    )?;

    let destination = memory::load_address(memory, dest_offset)?;
    let value = load_value(memory, value_offset)?;
    let data = memory::load(memory, data_offset, length)?.to_vec();
    CallArgs::parse(&data)?;

    debug!(destination = %destination, "Async call registered");
    host.async_context().register(
        DEFAULT_ASYNC_GROUP,
        AsyncCall {
            destination,
            data,
            gas_limit: 0,
            gas_locked: schedule.ei_api_cost.async_callback_gas_lock,
            value,
            success_callback: CALLBACK_FUNCTION_NAME.to_string(),
            error_callback: CALLBACK_FUNCTION_NAME.to_string(),
            status: AsyncCallStatus::Pending,
        },
    );
    Ok(())
}
