mod common;

use common::*;
use kestrel_vm::mock::MockWorld;
use kestrel_vm::{
    run_smart_contract_call, run_smart_contract_create, CallInput, ContractCreateInput, ReturnCode, World,
    UPGRADE_FUNCTION_NAME,
};
use std::rc::Rc;

fn versioned(version: &str) -> String {
    format!(
        r#"
(module
  (import "env" "getArgumentLength" (func $len (param i32) (result i32)))
  (import "env" "loadArgumentAsBytes" (func $arg (param i32 i32) (result i32)))
  (import "env" "storageStoreAsBytes" (func $store (param i32 i32 i32) (result i32)))
  (import "env" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "greeting")
  (data (i32.const 32) "{version}")
  (func (export "init")
    (if (i32.ge_s (call $len (i32.const 0)) (i32.const 0))
      (then
        (drop (call $store (i32.const 0) (i32.const 64) (call $arg (i32.const 0) (i32.const 64))))))
    (call $finish (i32.const 32) (i32.const {length})))
  (func (export "version")
    (call $finish (i32.const 32) (i32.const {length}))))
"#,
        version = version,
        length = version.len()
    )
}

fn create(world: &Rc<MockWorld>, code: Vec<u8>, arguments: Vec<Vec<u8>>) -> kestrel_vm::VmOutput {
    let host = host(world);
    run_smart_contract_create(
        &host,
        ContractCreateInput {
            caller: user(1),
            code,
            code_metadata: vec![1, 0],
            arguments,
            gas_provided: GAS,
            ..ContractCreateInput::default()
        },
    )
}

#[test_log::test]
fn test_deploy_runs_init() {
    let world = Rc::new(MockWorld::new());
    world.set_nonce(user(1), 3);
    let code = compile(&versioned("v1"));
    let expected = world.new_address(&user(1), 3, &[5, 0]);

    let output = create(&world, code.clone(), vec![b"hello".to_vec()]);
    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);
    assert_eq!(output.return_data, vec![b"v1".to_vec()]);

    let account = &output.output_accounts[&expected];
    assert_eq!(account.code, Some(code));
    assert_eq!(account.code_metadata, Some(vec![1, 0]));
    assert_eq!(account.owner, Some(user(1)));
    assert_eq!(account.storage_updates[&key("greeting")], b"hello".to_vec());
    assert_eq!(output.output_accounts[&user(1)].nonce_delta, 1);

    world.apply_output(&output);
    let host = host(&world);
    let output = run_smart_contract_call(&host, CallInput::new(user(2), expected, "version", GAS));
    assert_eq!(output.return_data, vec![b"v1".to_vec()]);
}

#[test]
fn test_deploy_without_init_export() {
    let world = Rc::new(MockWorld::new());
    let output = create(&world, compile(r#"(module (func (export "main")))"#), Vec::new());
    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);
    assert!(output.output_accounts.values().any(|account| account.code.is_some()));
}

#[test]
fn test_deploy_invalid_code() {
    let world = Rc::new(MockWorld::new());
    let output = create(&world, vec![0, 97, 115, 109, 9, 9], Vec::new());
    assert_eq!(output.return_code, ReturnCode::ContractInvalid);
    assert!(output.output_accounts.is_empty());
}

#[test]
fn test_deploy_collision() {
    let world = Rc::new(MockWorld::new());
    let taken = world.new_address(&user(1), 0, &[5, 0]);
    world.set_code(taken, vec![0]);

    let output = create(&world, compile(&versioned("v1")), Vec::new());
    assert_eq!(output.return_code, ReturnCode::AccountCollision);
}

#[test]
fn test_upgrade_by_owner() {
    let world = Rc::new(MockWorld::new());
    let output = create(&world, compile(&versioned("v1")), Vec::new());
    let address = *output
        .output_accounts
        .iter()
        .find(|(_, account)| account.code.is_some())
        .map(|(address, _)| address)
        .unwrap();
    world.apply_output(&output);

    let host = host(&world);
    let upgrade = CallInput::new(user(1), address, UPGRADE_FUNCTION_NAME, GAS)
        .with_arguments(vec![compile(&versioned("v2")), vec![1, 0], b"again".to_vec()]);
    let output = run_smart_contract_call(&host, upgrade);
    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);
    assert_eq!(output.return_data, vec![b"v2".to_vec()]);
    assert_eq!(
        output.output_accounts[&address].storage_updates[&key("greeting")],
        b"again".to_vec()
    );
    world.apply_output(&output);

    let output = run_smart_contract_call(&host, CallInput::new(user(2), address, "version", GAS));
    assert_eq!(output.return_data, vec![b"v2".to_vec()]);

    let stranger = CallInput::new(user(2), address, UPGRADE_FUNCTION_NAME, GAS)
        .with_arguments(vec![compile(&versioned("v3")), Vec::new()]);
    assert_eq!(run_smart_contract_call(&host, stranger).return_code, ReturnCode::UpgradeFailed);
}

#[test]
fn test_upgrade_to_invalid_code_fails() {
    let world = Rc::new(MockWorld::new());
    let output = create(&world, compile(&versioned("v1")), Vec::new());
    world.apply_output(&output);
    let address = world.new_address(&user(1), 0, &[5, 0]);

    let host = host(&world);
    let upgrade = CallInput::new(user(1), address, UPGRADE_FUNCTION_NAME, GAS)
        .with_arguments(vec![vec![1, 2, 3], Vec::new()]);
    let output = run_smart_contract_call(&host, upgrade);
    assert_eq!(output.return_code, ReturnCode::UpgradeFailed);
    assert_eq!(world.code(&address), Some(compile(&versioned("v1"))));
}
