//! Imports reading the call and the chain: caller, value, arguments, blocks.

use super::memory;
use crate::bigint::magnitude_bytes;
use crate::error::VmError;
use crate::host::VmHost;
use num_bigint::BigInt;

pub fn load_owner(host: &VmHost, memory: &mut [u8], result_offset: i32) -> Result<(), VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_owner)?;
    let address = host.runtime().sc_address();
    memory::store(memory, result_offset, address.as_bytes())
}

pub fn load_caller(host: &VmHost, memory: &mut [u8], result_offset: i32) -> Result<(), VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_caller)?;
    let caller = host.runtime().caller();
    memory::store(memory, result_offset, caller.as_bytes())
}

/// Writes the call value as minimal big-endian bytes and returns their count.
pub fn load_call_value(host: &VmHost, memory: &mut [u8], result_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_call_value)?;
    let value = host.runtime().call_value().to_bytes_be();
    let value = if value == [0] { Vec::new() } else { value };
    memory::store(memory, result_offset, &value)?;
    Ok(value.len() as i32)
}

/// Writes the balance as a 32-byte big-endian field.
pub fn load_balance(host: &VmHost, memory: &mut [u8], address_offset: i32, result_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_balance)?;
    let address = memory::load_address(memory, address_offset)?;
    let balance = host.balance(&address).to_bytes_be();
    memory::store_padded(memory, result_offset, &balance, 32)?;
    Ok(0)
}

/// 0 when the hash was written, -1 when the block is unknown.
pub fn load_block_hash(host: &VmHost, memory: &mut [u8], nonce: i64, result_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_block_hash)?;
    match host.blockchain().block_hash(nonce as u64) {
        Some(hash) => {
            memory::store(memory, result_offset, hash.as_bytes())?;
            Ok(0)
        }
        None => Ok(-1),
    }
}

pub fn get_block_timestamp(host: &VmHost, _memory: &mut [u8]) -> Result<i64, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_block_timestamp)?;
    Ok(host.blockchain().current_timestamp() as i64)
}

pub fn get_num_arguments(host: &VmHost, _memory: &mut [u8]) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_num_arguments)?;
    Ok(host.runtime().arguments().len() as i32)
}

/// Writes argument `id` and returns its length, or -1 when there is no such argument.
pub fn load_argument_as_bytes(host: &VmHost, memory: &mut [u8], id: i32, arg_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_argument)?;
    let argument = match host.runtime().argument(id) {
        Ok(argument) => argument.to_vec(),
        Err(_) => return Ok(-1),
    };
    host.use_gas(host.schedule().base_operation_cost.data_copy_per_byte * argument.len() as u64)?;
    memory::store(memory, arg_offset, &argument)?;
    Ok(argument.len() as i32)
}

pub fn get_argument_length(host: &VmHost, _memory: &mut [u8], id: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_argument)?;
    let length = host.runtime().argument(id).map(|argument| argument.len() as i32);
    Ok(length.unwrap_or(-1))
}

pub fn load_argument_as_big_int(host: &VmHost, _memory: &mut [u8], id: i32, dest_handle: i32) -> Result<(), VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_get_argument)?;
    let argument = host.runtime().argument(id)?.to_vec();
    host.bigint().set_bytes(dest_handle, &argument)
}

/// Argument `id` read as unsigned big-endian, keeping the low 64 bits; -1 when absent.
pub fn get_argument_as_int64(host: &VmHost, _memory: &mut [u8], id: i32) -> Result<i64, VmError> {
    host.use_gas(host.schedule().ei_api_cost.int64_get_argument)?;
    let value = host.runtime().argument(id).map(super::decode_int64);
    Ok(value.unwrap_or(-1))
}

/// Writes the called function's name and returns its length, or -1 when there is none.
pub fn load_function_name(host: &VmHost, memory: &mut [u8], function_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_function)?;
    let function = host.runtime().function().to_string();
    if function.is_empty() {
        return Ok(-1);
    }
    memory::store(memory, function_offset, function.as_bytes())?;
    Ok(function.len() as i32)
}

pub fn get_gas_left(host: &VmHost, _memory: &mut [u8]) -> Result<i64, VmError> {
    host.use_gas(host.schedule().ei_api_cost.get_gas_left)?;
    Ok(host.gas_left() as i64)
}

/// Bytes of a call value held by a big integer handle; negative values are rejected.
pub(crate) fn value_bytes(value: &BigInt) -> Result<Vec<u8>, VmError> {
    if value.sign() == num_bigint::Sign::Minus {
        return Err(VmError::ExecutionFailed("negative value".to_string()));
    }
    Ok(magnitude_bytes(value))
}
