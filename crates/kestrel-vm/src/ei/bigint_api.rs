//! Big integer imports. Values stay in the host; the guest holds handles.

use super::memory;
use crate::error::VmError;
use crate::host::VmHost;

/// Per-byte surcharge over the operands of an arithmetic import.
fn charge_operands(host: &VmHost, base: u64, handles: &[i32]) -> Result<(), VmError> {
    let mut bytes = 0u64;
    {
        let bigint = host.bigint();
        for handle in handles {
            bytes += bigint.byte_length(*handle)? as u64;
        }
    }
    let per_byte = host.schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(base.saturating_add(per_byte.saturating_mul(bytes)))
}

pub fn big_int_new(host: &VmHost, _memory: &mut [u8], small_value: i64) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_new)?;
    Ok(host.bigint().new_value(small_value))
}

pub fn big_int_byte_length(host: &VmHost, _memory: &mut [u8], handle: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_byte_length)?;
    Ok(host.bigint().byte_length(handle)? as i32)
}

/// Writes the magnitude bytes and returns their count.
pub fn big_int_get_bytes(host: &VmHost, memory: &mut [u8], handle: i32, result_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_get_bytes)?;
    let bytes = host.bigint().get_bytes(handle)?;
    host.use_gas(host.schedule().base_operation_cost.data_copy_per_byte * bytes.len() as u64)?;
    memory::store(memory, result_offset, &bytes)?;
    Ok(bytes.len() as i32)
}

pub fn big_int_set_bytes(
    host: &VmHost,
    memory: &mut [u8],
    handle: i32,
    byte_offset: i32,
    byte_length: i32,
) -> Result<(), VmError> {
    let cost = host.schedule().big_int_api_cost.big_int_set_bytes;
    let per_byte = host.schedule().base_operation_cost.data_copy_per_byte;
    host.use_gas(cost.saturating_add(per_byte.saturating_mul(byte_length.max(0) as u64)))?;
    let bytes = memory::load(memory, byte_offset, byte_length)?;
    host.bigint().set_bytes(handle, bytes)
}

pub fn big_int_is_int64(host: &VmHost, _memory: &mut [u8], handle: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_is_int64)?;
    Ok(i32::from(host.bigint().is_int64(handle)?))
}

pub fn big_int_get_int64(host: &VmHost, _memory: &mut [u8], handle: i32) -> Result<i64, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_get_int64)?;
    host.bigint().get_int64(handle)
}

pub fn big_int_set_int64(host: &VmHost, _memory: &mut [u8], handle: i32, value: i64) -> Result<(), VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_set_int64)?;
    host.bigint().set_int64(handle, value)
}

pub fn big_int_add(host: &VmHost, _memory: &mut [u8], dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
    charge_operands(host, host.schedule().big_int_api_cost.big_int_add, &[op1, op2])?;
    host.bigint().add(dest, op1, op2)
}

pub fn big_int_sub(host: &VmHost, _memory: &mut [u8], dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
    charge_operands(host, host.schedule().big_int_api_cost.big_int_sub, &[op1, op2])?;
    host.bigint().sub(dest, op1, op2)
}

pub fn big_int_mul(host: &VmHost, _memory: &mut [u8], dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
    charge_operands(host, host.schedule().big_int_api_cost.big_int_mul, &[op1, op2])?;
    host.bigint().mul(dest, op1, op2)
}

pub fn big_int_cmp(host: &VmHost, _memory: &mut [u8], op1: i32, op2: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_cmp)?;
    host.bigint().cmp(op1, op2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::{addr, host_in_call};
    use crate::mock::MockWorld;
    use crate::runtime::CallInput;

    fn host(gas: u64) -> VmHost {
        host_in_call(MockWorld::new(), CallInput::new(addr(1), addr(2), "main", gas)).0
    }

    #[test]
    fn test_handles_start_at_zero() {
        let host = host(100_000);
        let mut memory = vec![0u8; 16];
        assert_eq!(big_int_new(&host, &mut memory, 5), Ok(0));
        assert_eq!(big_int_new(&host, &mut memory, -5), Ok(1));
    }

    #[test]
    fn test_arithmetic_through_handles() {
        let host = host(100_000);
        let mut memory = vec![0u8; 16];
        let a = big_int_new(&host, &mut memory, i64::MAX).unwrap();
        let b = big_int_new(&host, &mut memory, i64::MAX).unwrap();
        big_int_add(&host, &mut memory, a, a, b).unwrap();
        assert_eq!(big_int_is_int64(&host, &mut memory, a), Ok(0));
        assert_eq!(big_int_byte_length(&host, &mut memory, a), Ok(8));

        big_int_sub(&host, &mut memory, a, a, b).unwrap();
        assert_eq!(big_int_get_int64(&host, &mut memory, a), Ok(i64::MAX));
        assert_eq!(big_int_cmp(&host, &mut memory, a, b), Ok(0));

        big_int_set_int64(&host, &mut memory, b, -3).unwrap();
        big_int_mul(&host, &mut memory, b, b, b).unwrap();
        assert_eq!(big_int_get_int64(&host, &mut memory, b), Ok(9));
    }

    #[test]
    fn test_bytes_roundtrip_through_memory() {
        let host = host(100_000);
        let mut memory = vec![0u8; 16];
        memory[..4].copy_from_slice(&[64, 12, 16, 99]);
        let handle = big_int_new(&host, &mut memory, 0).unwrap();
        big_int_set_bytes(&host, &mut memory, handle, 0, 4).unwrap();
        assert_eq!(big_int_get_bytes(&host, &mut memory, handle, 8), Ok(4));
        assert_eq!(&memory[8..12], &[64, 12, 16, 99]);
    }

    #[test]
    fn test_invalid_handle() {
        let host = host(100_000);
        let mut memory = vec![0u8; 16];
        assert_eq!(big_int_add(&host, &mut memory, 0, 1, 2), Err(VmError::InvalidHandle(1)));
        assert_eq!(big_int_get_int64(&host, &mut memory, 3), Err(VmError::InvalidHandle(3)));
    }

    #[test]
    fn test_cost_grows_with_operands() {
        let host = host(1_000_000);
        let mut memory = vec![0u8; 64];
        let small = big_int_new(&host, &mut memory, 1).unwrap();
        memory[..32].fill(0xff);
        let large = big_int_new(&host, &mut memory, 0).unwrap();
        big_int_set_bytes(&host, &mut memory, large, 0, 32).unwrap();

        let before = host.metering().gas_used();
        big_int_add(&host, &mut memory, small, small, small).unwrap();
        let small_cost = host.metering().gas_used() - before;

        let before = host.metering().gas_used();
        big_int_add(&host, &mut memory, large, large, large).unwrap();
        let large_cost = host.metering().gas_used() - before;

        assert!(large_cost > small_cost);
    }
}
