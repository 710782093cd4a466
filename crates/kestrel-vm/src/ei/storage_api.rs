//! Storage imports. Keys are 32 bytes read from guest memory.

use super::memory;
use crate::error::VmError;
use crate::host::VmHost;

/// Status returned for a write the protected prefix refused.
const PROTECTED_KEY_STATUS: i32 = -1;

fn store_status(host: &VmHost, key: &[u8], value: &[u8]) -> Result<i32, VmError> {
    match host.storage_store(key, value) {
        Ok(status) => Ok(status.as_i32()),
        Err(VmError::ProtectedStorageKeyViolation) => Ok(PROTECTED_KEY_STATUS),
        Err(err) => Err(err),
    }
}

fn load_value(host: &VmHost, key: &[u8]) -> Result<Vec<u8>, VmError> {
    let value = host.storage_load(key);
    host.use_gas(host.schedule().base_operation_cost.data_copy_per_byte * value.len() as u64)?;
    Ok(value)
}

pub fn storage_store_as_bytes(
    host: &VmHost,
    memory: &mut [u8],
    key_offset: i32,
    data_offset: i32,
    data_length: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.storage_store)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    let data = memory::load(memory, data_offset, data_length)?;
    store_status(host, &key, data)
}

/// Writes the stored value and returns its length.
pub fn storage_load_as_bytes(host: &VmHost, memory: &mut [u8], key_offset: i32, data_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.storage_load)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    let value = load_value(host, &key)?;
    memory::store(memory, data_offset, &value)?;
    Ok(value.len() as i32)
}

pub fn storage_store_as_big_int(host: &VmHost, memory: &mut [u8], key_offset: i32, handle: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_storage_store)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    let bytes = host.bigint().get_bytes(handle)?;
    store_status(host, &key, &bytes)
}

/// Loads the stored value into `handle` and returns its byte length.
pub fn storage_load_as_big_int(host: &VmHost, memory: &mut [u8], key_offset: i32, handle: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().big_int_api_cost.big_int_storage_load)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    let value = load_value(host, &key)?;
    host.bigint().set_bytes(handle, &value)?;
    Ok(value.len() as i32)
}

pub fn storage_store_as_int64(host: &VmHost, memory: &mut [u8], key_offset: i32, value: i64) -> Result<i32, VmError> {
    host.use_gas(host.schedule().ei_api_cost.int64_storage_store)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    store_status(host, &key, &super::encode_int64(value))
}

pub fn storage_load_as_int64(host: &VmHost, memory: &mut [u8], key_offset: i32) -> Result<i64, VmError> {
    host.use_gas(host.schedule().ei_api_cost.int64_storage_load)?;
    let key = memory::load_array::<32>(memory, key_offset)?;
    let value = load_value(host, &key)?;
    Ok(super::decode_int64(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::{addr, host_in_call};
    use crate::host::FrameKind;
    use crate::mock::MockWorld;
    use crate::runtime::{CallInput, FrameOutcome};
    use crate::storage::StorageStatus;

    fn host() -> VmHost {
        host_in_call(MockWorld::new(), CallInput::new(addr(1), addr(2), "main", 1_000_000)).0
    }

    fn memory_with_key(key: &[u8; 32]) -> Vec<u8> {
        let mut memory = vec![0u8; 128];
        memory[..32].copy_from_slice(key);
        memory
    }

    #[test]
    fn test_bytes_store_and_load() {
        let host = host();
        let mut memory = memory_with_key(&[1; 32]);
        memory[32..35].copy_from_slice(b"abc");

        assert_eq!(
            storage_store_as_bytes(&host, &mut memory, 0, 32, 3),
            Ok(StorageStatus::Added.as_i32())
        );
        assert_eq!(storage_load_as_bytes(&host, &mut memory, 0, 64), Ok(3));
        assert_eq!(&memory[64..67], b"abc");
    }

    #[test]
    fn test_call_value_sized_bytes_roundtrip() {
        let host = host();
        let mut memory = memory_with_key(&[2; 32]);
        let handle = host.bigint().new_value(19 * 256 + 233);
        storage_store_as_big_int(&host, &mut memory, 0, handle).unwrap();
        assert_eq!(storage_load_as_bytes(&host, &mut memory, 0, 64), Ok(2));
        assert_eq!(&memory[64..66], &[19, 233]);
    }

    #[test]
    fn test_int64_roundtrip() {
        let host = host();
        let mut memory = memory_with_key(&[3; 32]);
        for value in [0, 1, 12345, i64::MAX, -1, i64::MIN] {
            storage_store_as_int64(&host, &mut memory, 0, value).unwrap();
            assert_eq!(storage_load_as_int64(&host, &mut memory, 0), Ok(value));
        }
    }

    #[test]
    fn test_big_int_load() {
        let host = host();
        let mut memory = memory_with_key(&[4; 32]);
        storage_store_as_int64(&host, &mut memory, 0, 500).unwrap();
        let handle = host.bigint().new_value(0);
        assert_eq!(storage_load_as_big_int(&host, &mut memory, 0, handle), Ok(2));
        assert_eq!(host.bigint().get_int64(handle), Ok(500));
    }

    #[test]
    fn test_protected_key_returns_status() {
        let host = host();
        let mut key = [0u8; 32];
        key[..7].copy_from_slice(b"KESTREL");
        let mut memory = memory_with_key(&key);
        assert_eq!(storage_store_as_int64(&host, &mut memory, 0, 5), Ok(-1));
        assert_eq!(storage_load_as_int64(&host, &mut memory, 0), Ok(0));
    }

    #[test]
    fn test_rolled_back_child_write_is_invisible() {
        let host = host();
        let mut memory = memory_with_key(&[5; 32]);
        storage_store_as_int64(&host, &mut memory, 0, 1).unwrap();

        host.push_state(FrameKind::DestContext, CallInput::new(addr(2), addr(2), "child", 10_000))
            .unwrap();
        storage_store_as_int64(&host, &mut memory, 0, 2).unwrap();
        assert_eq!(storage_load_as_int64(&host, &mut memory, 0), Ok(2));
        host.pop_state(FrameKind::DestContext, FrameOutcome::Rollback).unwrap();

        assert_eq!(storage_load_as_int64(&host, &mut memory, 0), Ok(1));
    }

    #[test]
    fn test_key_out_of_bounds() {
        let host = host();
        let mut memory = vec![0u8; 16];
        assert!(matches!(
            storage_load_as_int64(&host, &mut memory, 0),
            Err(VmError::MemoryAccessOutOfBounds { .. })
        ));
    }
}
