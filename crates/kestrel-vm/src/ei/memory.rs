//! Bounds-checked access to guest linear memory.

use crate::error::VmError;
use kestrel_types::{Address, Hash};

fn range(memory_len: usize, offset: i32, length: i32) -> Result<std::ops::Range<usize>, VmError> {
    let out_of_bounds = || VmError::MemoryAccessOutOfBounds {
        offset: i64::from(offset),
        length: i64::from(length),
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(length).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > memory_len {
        return Err(out_of_bounds());
    }
    Ok(start..end)
}

pub fn load(memory: &[u8], offset: i32, length: i32) -> Result<&[u8], VmError> {
    let range = range(memory.len(), offset, length)?;
    Ok(&memory[range])
}

pub fn load_array<const N: usize>(memory: &[u8], offset: i32) -> Result<[u8; N], VmError> {
    let mut out = [0u8; N];
    out.copy_from_slice(load(memory, offset, N as i32)?);
    Ok(out)
}

pub fn load_address(memory: &[u8], offset: i32) -> Result<Address, VmError> {
    load_array::<{ Address::LEN }>(memory, offset).map(Address::from_bytes)
}

pub fn load_hash(memory: &[u8], offset: i32) -> Result<Hash, VmError> {
    load_array::<{ Hash::LEN }>(memory, offset).map(Hash::from_bytes)
}

/// Little-endian `i32`, the guest's native layout.
pub fn load_i32(memory: &[u8], offset: i32) -> Result<i32, VmError> {
    load_array::<4>(memory, offset).map(i32::from_le_bytes)
}

pub fn store(memory: &mut [u8], offset: i32, data: &[u8]) -> Result<(), VmError> {
    let length = i32::try_from(data.len()).map_err(|_| VmError::MemoryAccessOutOfBounds {
        offset: i64::from(offset),
        length: data.len() as i64,
    })?;
    let range = range(memory.len(), offset, length)?;
    memory[range].copy_from_slice(data);
    Ok(())
}

/// Write `data` right-aligned in a field of `width` bytes.
pub fn store_padded(memory: &mut [u8], offset: i32, data: &[u8], width: usize) -> Result<(), VmError> {
    if data.len() > width {
        return Err(VmError::ExecutionFailed(format!(
            "{} bytes do not fit in a {}-byte field",
            data.len(),
            width
        )));
    }
    let mut field = vec![0u8; width];
    field[width - data.len()..].copy_from_slice(data);
    store(memory, offset, &field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_load_store() {
        let mut memory = vec![0u8; 64];
        store(&mut memory, 10, b"hello").unwrap();
        assert_eq!(load(&memory, 10, 5).unwrap(), b"hello");
        assert_eq!(load(&memory, 64, 0).unwrap(), b"");
    }

    #[test]
    fn test_out_of_bounds() {
        let mut memory = vec![0u8; 16];
        assert_eq!(
            load(&memory, 10, 7),
            Err(VmError::MemoryAccessOutOfBounds { offset: 10, length: 7 })
        );
        assert!(load(&memory, -1, 1).is_err());
        assert!(load(&memory, 0, -1).is_err());
        assert!(load(&memory, i32::MAX, i32::MAX).is_err());
        assert!(store(&mut memory, 12, b"hello").is_err());
        assert!(load_address(&memory, 0).is_err());
    }

    #[test]
    fn test_padded_field() {
        let mut memory = vec![0xffu8; 8];
        store_padded(&mut memory, 0, &[1, 2], 4).unwrap();
        assert_eq!(&memory[..4], &[0, 0, 1, 2]);
        assert!(store_padded(&mut memory, 0, &[1; 5], 4).is_err());
    }

    #[test]
    fn test_load_i32_le() {
        let memory = [4u8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(load_i32(&memory, 0), Ok(4));
        assert_eq!(load_i32(&memory, 4), Ok(-1));
    }

    proptest! {
        #[test]
        fn prop_load_never_panics(len in 0usize..256, offset in any::<i32>(), length in any::<i32>()) {
            let memory = vec![0u8; len];
            let result = load(&memory, offset, length);
            let fits = offset >= 0 && length >= 0 && (offset as i64 + length as i64) <= len as i64;
            prop_assert_eq!(result.is_ok(), fits);
        }
    }
}
