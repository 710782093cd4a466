//! Debug printing for contract developers. Output goes to the tracing
//! target `kestrel_vm::debug_print` at debug level.

use super::memory;
use crate::error::VmError;
use crate::host::VmHost;
use tracing::debug;

fn charge(host: &VmHost) -> Result<(), VmError> {
    host.use_gas(host.schedule().ei_api_cost.debug_print)
}

pub fn debug_print_big_int(host: &VmHost, _memory: &mut [u8], handle: i32) -> Result<(), VmError> {
    charge(host)?;
    let value = host.bigint().get(handle)?.clone();
    debug!(target: "kestrel_vm::debug_print", handle, %value, "bigint");
    Ok(())
}

pub fn debug_print_int32(host: &VmHost, _memory: &mut [u8], value: i32) -> Result<(), VmError> {
    charge(host)?;
    debug!(target: "kestrel_vm::debug_print", value, "int32");
    Ok(())
}

pub fn debug_print_bytes(host: &VmHost, memory: &mut [u8], offset: i32, length: i32) -> Result<(), VmError> {
    charge(host)?;
    let bytes = memory::load(memory, offset, length)?;
    debug!(target: "kestrel_vm::debug_print", bytes = %hex::encode(bytes), "bytes");
    Ok(())
}

pub fn debug_print_string(host: &VmHost, memory: &mut [u8], offset: i32, length: i32) -> Result<(), VmError> {
    charge(host)?;
    let bytes = memory::load(memory, offset, length)?;
    debug!(target: "kestrel_vm::debug_print", text = %String::from_utf8_lossy(bytes), "string");
    Ok(())
}
