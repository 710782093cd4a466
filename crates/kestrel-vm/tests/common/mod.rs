#![allow(dead_code)]

use kestrel_types::Address;
use kestrel_vm::mock::MockWorld;
use kestrel_vm::{HostParameters, VmHost};
use std::rc::Rc;

pub const GAS: u64 = 2_000_000;

pub fn user(b: u8) -> Address {
    Address::from_bytes([b; 32])
}

/// Contract address ending in `b`, which also picks its shard.
pub fn contract(b: u8) -> Address {
    let mut bytes = [0u8; 32];
    bytes[8] = 5;
    bytes[31] = b;
    Address::from_bytes(bytes)
}

/// WAT string literal body for raw bytes.
pub fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// 32-byte storage key holding `name`, zero padded.
pub fn key(name: &str) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    key.resize(32, 0);
    key
}

pub fn compile(wat: &str) -> Vec<u8> {
    wat::parse_str(wat).unwrap()
}

pub fn deploy(world: &MockWorld, address: Address, wat: &str) {
    world.set_code(address, compile(wat));
}

pub fn host(world: &Rc<MockWorld>) -> VmHost {
    VmHost::new(world.clone(), HostParameters::default()).unwrap()
}

pub fn host_with(world: &Rc<MockWorld>, params: HostParameters) -> VmHost {
    VmHost::new(world.clone(), params).unwrap()
}
