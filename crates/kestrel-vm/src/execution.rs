//! Call execution: the top-level entry points, nested calls and the
//! deferred call protocol.
//!
//! Every frame follows the same shape: push the contexts, run the body
//! under a panic guard, then pop with commit on success or with rollback
//! otherwise. Pops always run, so an error never leaves a frame open.

use crate::async_call::{AsyncCall, AsyncCallRecord, AsyncCallStatus, AsyncContextInfo, ASYNC_RECORD_TAG};
use crate::call_args::{callback_return_code, encode_callback_data, return_code_bytes, CallArgs};
use crate::error::VmError;
use crate::host::{FrameKind, VmHost};
use crate::output::{OutputAccount, OutputTransfer, ReturnCode, VmOutput};
use crate::runtime::{CallInput, CallType, ContractCreateInput, FrameOutcome};
use crate::{CALLBACK_FUNCTION_NAME, INIT_FUNCTION_NAME, MAX_CODE_SIZE, UPGRADE_FUNCTION_NAME};
use kestrel_types::{Address, Hash};
use num_bigint::BigUint;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, debug_span, warn};

/// Run `body`, turning a panic into a frame error.
fn guarded<T>(body: impl FnOnce() -> Result<T, VmError>) -> Result<T, VmError> {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| Err(VmError::from_panic(payload)))
}

/// Reject calls a contract may not receive directly.
fn check_function_name(host: &VmHost, input: &CallInput) -> Result<(), VmError> {
    if host.reserved().is_reserved(&input.function) {
        return Err(VmError::ReservedFunctionName(input.function.clone()));
    }
    if input.function == INIT_FUNCTION_NAME {
        return Err(VmError::InitFunctionCalled);
    }
    if input.function == CALLBACK_FUNCTION_NAME && input.call_type != CallType::AsynchronousCallBack {
        return Err(VmError::CallbackFunctionCalled);
    }
    Ok(())
}

/// Storage key of the record kept while a deferred call is in flight.
pub fn async_record_key(host: &VmHost, call_id: &Hash) -> Vec<u8> {
    let suffix = [ASYNC_RECORD_TAG, call_id.as_bytes().as_slice()].concat();
    host.storage().protected_key(&suffix)
}

/// Execute a call on an existing contract.
pub fn run_smart_contract_call(host: &VmHost, input: CallInput) -> VmOutput {
    let span = debug_span!("run_smart_contract_call", function = %input.function, recipient = %input.recipient);
    let _enter = span.enter();

    host.init_state();
    let call_type = input.call_type;
    let caller = input.caller;
    let recipient = input.recipient;
    let call_id = input.async_call_id;

    let mut output = guarded(|| do_call(host, input)).unwrap_or_else(|err| {
        debug!(error = %err, "Call failed");
        VmOutput::from_error(&err)
    });
    if call_type == CallType::AsynchronousCall {
        return_to_async_caller(&mut output, recipient, caller, call_id);
    }

    host.clear_state_stack();
    debug!(return_code = ?output.return_code, gas_remaining = output.gas_remaining, "Call finished");
    output
}

fn do_call(host: &VmHost, input: CallInput) -> Result<VmOutput, VmError> {
    host.metering().init_for_call(input.gas_provided);
    if host.is_builtin_function(&input.function) {
        return host.blockchain().process_builtin_function(&input);
    }
    if input.function == UPGRADE_FUNCTION_NAME {
        return upgrade_contract(host, input);
    }
    check_function_name(host, &input)?;
    run_top_frame(host, input, |host| execute_code(host, true))
}

/// Send the outcome of an incoming deferred call back to its originator,
/// together with the gas it did not use.
fn return_to_async_caller(output: &mut VmOutput, recipient: Address, caller: Address, call_id: Hash) {
    let transfer = OutputTransfer {
        sender: recipient,
        value: BigUint::default(),
        gas_limit: output.gas_remaining,
        gas_locked: 0,
        data: encode_callback_data(output.return_code, &output.return_data),
        call_type: CallType::AsynchronousCallBack,
        call_id,
    };
    output.gas_remaining = 0;
    let account = output
        .output_accounts
        .entry(caller)
        .or_insert_with(|| OutputAccount::new(caller));
    account.touched = true;
    account.transfers.push(transfer);
}

/// Open the top frame for `input`, receive the call value and run `body`.
fn run_top_frame(
    host: &VmHost,
    input: CallInput,
    body: impl FnOnce(&VmHost) -> Result<(), VmError>,
) -> Result<VmOutput, VmError> {
    let caller = input.caller;
    let recipient = input.recipient;
    let value = input.call_value.clone();
    let call_type = input.call_type;

    host.push_state(FrameKind::Top, input)?;
    let result = guarded(|| {
        match call_type {
            CallType::DirectCall => host.transfer_value(&caller, &recipient, &value)?,
            _ => host.credit_value(&recipient, &value),
        }
        body(host)
    });

    match result {
        Ok(()) => {
            let gas_remaining = host.gas_left();
            let gas_refund = host.metering().gas_refund();
            host.pop_state(FrameKind::Top, FrameOutcome::Commit)?;
            Ok(host.output().take_vm_output(gas_remaining, gas_refund))
        }
        Err(err) => {
            host.pop_state(FrameKind::Top, FrameOutcome::for_error(&err))?;
            Err(err)
        }
    }
}

/// Compile and run the executing frame's function on its contract code.
/// Without `require_function` a missing export is skipped, as for `init`.
fn execute_code(host: &VmHost, require_function: bool) -> Result<(), VmError> {
    let (address, function) = {
        let runtime = host.runtime();
        (runtime.sc_address(), runtime.function().to_string())
    };
    let code = host.code(&address).ok_or(VmError::ContractNotFound(address))?;
    if code.len() > MAX_CODE_SIZE {
        return Err(VmError::ContractInvalid(format!("code size {} exceeds {}", code.len(), MAX_CODE_SIZE)));
    }
    let compile_cost = host.schedule().base_operation_cost.compile_per_byte;
    host.use_gas(compile_cost.saturating_mul(code.len() as u64))?;

    let code_hash = Hash::compute(&code);
    let module = host.wasm().compile(code_hash, &code)?;
    host.wasm().validate(&module, host.reserved())?;
    if !host.wasm().has_function(&module, &function) {
        if require_function {
            return Err(VmError::FunctionNotFound(function));
        }
        debug!(%address, function = %function, "Optional function not exported");
        return Ok(());
    }

    let instance = host.runtime().attach_instance(code_hash);
    debug!(%address, function = %function, instance = instance.id, "Running contract");
    let result = host.wasm().call(host, &module, &function);
    host.runtime().detach_instance();
    result?;

    if host.output().has_user_error() {
        return Err(VmError::UserSignaledError);
    }
    process_async_calls(host)
}

/// Run a nested call in its own frame. On success its effects are already
/// merged into the caller's frame; the returned output is a copy of them.
pub fn execute_on_dest_context(host: &VmHost, input: CallInput) -> Result<(VmOutput, AsyncContextInfo, u64), VmError> {
    let depth = host.runtime().depth();
    let span = debug_span!("execute_on_dest_context", function = %input.function, depth);
    let _enter = span.enter();

    if host.is_builtin_function(&input.function) {
        return execute_builtin(host, input);
    }
    check_function_name(host, &input)?;

    let caller = input.caller;
    let recipient = input.recipient;
    let value = input.call_value.clone();
    host.push_state(FrameKind::DestContext, input)?;
    let result = guarded(|| {
        host.transfer_value(&caller, &recipient, &value)?;
        execute_code(host, true)
    });

    match result {
        Ok(()) => {
            let gas_remaining = host.gas_left();
            let gas_refund = host.metering().gas_refund();
            let output = host.output().layer_output(gas_remaining, gas_refund);
            let frame = host.pop_state(FrameKind::DestContext, FrameOutcome::Commit)?;
            debug!(gas_used = frame.gas_used, "Nested call committed");
            Ok((output, frame.async_info, frame.gas_used))
        }
        Err(err) => {
            let frame = host.pop_state(FrameKind::DestContext, FrameOutcome::for_error(&err))?;
            debug!(error = %err, gas_used = frame.gas_used, "Nested call rolled back");
            Err(err)
        }
    }
}

/// Run another contract's code as the executing contract, on its storage
/// and big integers. No value moves.
pub fn execute_on_same_context(host: &VmHost, input: CallInput) -> Result<AsyncContextInfo, VmError> {
    let depth = host.runtime().depth();
    let span = debug_span!("execute_on_same_context", function = %input.function, depth);
    let _enter = span.enter();

    if host.is_builtin_function(&input.function) {
        return Err(VmError::BuiltinOnSameContext(input.function));
    }
    check_function_name(host, &input)?;

    host.push_state(FrameKind::SameContext, input)?;
    match guarded(|| execute_code(host, true)) {
        Ok(()) => {
            let frame = host.pop_state(FrameKind::SameContext, FrameOutcome::Commit)?;
            Ok(frame.async_info)
        }
        Err(err) => {
            host.pop_state(FrameKind::SameContext, FrameOutcome::for_error(&err))?;
            debug!(error = %err, "Same-context call rolled back");
            Err(err)
        }
    }
}

/// Hand a built-in call to the world and charge what it reports using.
fn execute_builtin(host: &VmHost, mut input: CallInput) -> Result<(VmOutput, AsyncContextInfo, u64), VmError> {
    input.gas_provided = host.metering().bound_gas_limit(input.gas_provided);
    let output = host.blockchain().process_builtin_function(&input)?;
    let gas_used = input.gas_provided.saturating_sub(output.gas_remaining);
    host.use_gas(gas_used)?;
    host.output().merge_vm_output(&output);
    debug!(function = %input.function, gas_used, "Built-in function executed");
    Ok((output, AsyncContextInfo::default(), gas_used))
}

/// Settle the deferred calls registered by the executing frame: same-shard
/// calls run now with their callbacks, the rest are forwarded.
fn process_async_calls(host: &VmHost) -> Result<(), VmError> {
    let positions = host.async_context().pending_positions();
    if positions.is_empty() {
        return Ok(());
    }

    let (origin, parent) = {
        let runtime = host.runtime();
        (runtime.sc_address(), runtime.input().clone())
    };
    for (group_index, call_index) in positions {
        let (group, call) = {
            let async_context = host.async_context();
            let (group, call) = async_context
                .call(group_index, call_index)
                .ok_or(VmError::StateStackUnderflow)?;
            (group.to_string(), call.clone())
        };
        let call_id = host.async_context().next_call_id(&origin);

        if host.blockchain().in_same_shard(&origin, &call.destination) {
            let status = run_local_async_call(host, origin, &parent, &call, call_id)?;
            host.async_context().set_status(group_index, call_index, status);
        } else {
            forward_async_call(host, origin, &group, &call, call_id)?;
        }
    }
    Ok(())
}

fn run_local_async_call(
    host: &VmHost,
    origin: Address,
    parent: &CallInput,
    call: &AsyncCall,
    call_id: Hash,
) -> Result<AsyncCallStatus, VmError> {
    let args = CallArgs::parse(&call.data)?;
    let gas_left = host.gas_left();
    let gas_locked = call.gas_locked.min(gas_left);
    let available = gas_left - gas_locked;
    let gas_limit = match call.gas_limit {
        0 => available,
        limit => limit.min(available),
    };

    let outcome = if args.is_transfer() {
        host.transfer_value(&origin, &call.destination, &call.value).map(|()| Vec::new())
    } else {
        let input = CallInput {
            caller: origin,
            recipient: call.destination,
            function: args.function,
            arguments: args.arguments,
            call_value: call.value.clone(),
            gas_provided: gas_limit,
            gas_price: parent.gas_price,
            call_type: CallType::AsynchronousCall,
            current_tx_hash: parent.current_tx_hash,
            original_tx_hash: parent.original_tx_hash,
            async_call_id: call_id,
        };
        execute_on_dest_context(host, input).map(|(output, _, _)| output.return_data)
    };
    let (return_code, return_data) = match outcome {
        Ok(data) => (ReturnCode::Ok, data),
        Err(err) => (err.return_code(), Vec::new()),
    };

    let callback = if return_code == ReturnCode::Ok {
        &call.success_callback
    } else {
        &call.error_callback
    };
    let mut arguments = vec![return_code_bytes(return_code)];
    arguments.extend(return_data);
    let callback_input = CallInput {
        caller: call.destination,
        recipient: origin,
        function: callback.clone(),
        arguments,
        call_value: BigUint::default(),
        gas_provided: gas_locked,
        gas_price: parent.gas_price,
        call_type: CallType::AsynchronousCallBack,
        current_tx_hash: parent.current_tx_hash,
        original_tx_hash: parent.original_tx_hash,
        async_call_id: call_id,
    };
    if let Err(err) = execute_on_dest_context(host, callback_input) {
        warn!(callback = %callback, error = %err, "Async callback failed");
    }

    Ok(match return_code {
        ReturnCode::Ok => AsyncCallStatus::Resolved,
        _ => AsyncCallStatus::Rejected,
    })
}

/// Charge the forwarded gas and the callback lock, persist the resolution
/// record and emit the call for the destination shard.
fn forward_async_call(host: &VmHost, origin: Address, group: &str, call: &AsyncCall, call_id: Hash) -> Result<(), VmError> {
    let gas_limit = match call.gas_limit {
        0 => host.gas_left().saturating_sub(call.gas_locked),
        limit => limit,
    };
    host.use_gas(gas_limit.saturating_add(call.gas_locked))?;
    host.debit_value(&origin, &call.value)?;

    let record = AsyncCallRecord {
        call_id,
        destination: call.destination,
        group: group.to_string(),
        success_callback: call.success_callback.clone(),
        error_callback: call.error_callback.clone(),
        gas_locked: call.gas_locked,
    };
    let key = async_record_key(host, &call_id);
    let bytes = record.to_bytes()?;
    {
        let storage = host.storage();
        let mut output = host.output();
        storage.set_protected(&origin, key, bytes, &mut output);
    }

    host.output().add_transfer(
        &call.destination,
        OutputTransfer {
            sender: origin,
            value: call.value.clone(),
            gas_limit,
            gas_locked: call.gas_locked,
            data: call.data.clone(),
            call_type: CallType::AsynchronousCall,
            call_id,
        },
    );
    debug!(%call_id, destination = %call.destination, gas_limit, "Async call forwarded");
    Ok(())
}

/// Deliver the result of a forwarded call to its originator. `input`
/// carries the destination as caller, the originator as recipient, the
/// callback data as arguments and the call id.
pub fn resolve_async_callback(host: &VmHost, input: CallInput) -> VmOutput {
    let span = debug_span!("resolve_async_callback", call_id = %input.async_call_id, recipient = %input.recipient);
    let _enter = span.enter();

    host.init_state();
    let output = guarded(|| do_resolve(host, input)).unwrap_or_else(|err| {
        debug!(error = %err, "Callback failed");
        VmOutput::from_error(&err)
    });
    host.clear_state_stack();
    output
}

fn do_resolve(host: &VmHost, mut input: CallInput) -> Result<VmOutput, VmError> {
    let origin = input.recipient;
    let key = async_record_key(host, &input.async_call_id);
    let bytes = host.blockchain().storage(&origin, &key);
    if bytes.is_empty() {
        return Err(VmError::AsyncCallNotFound(input.async_call_id.to_string()));
    }
    let record = AsyncCallRecord::from_bytes(&bytes)?;
    if record.destination != input.caller {
        return Err(VmError::AsyncCallNotFound(input.async_call_id.to_string()));
    }

    input.gas_provided = input.gas_provided.saturating_add(record.gas_locked);
    input.function = match callback_return_code(&input.arguments) {
        ReturnCode::Ok => record.success_callback,
        _ => record.error_callback,
    };
    input.call_type = CallType::AsynchronousCallBack;
    host.metering().init_for_call(input.gas_provided);

    let record_key = key.clone();
    let result = run_top_frame(host, input, move |host| {
        {
            let storage = host.storage();
            let mut output = host.output();
            storage.set_protected(&origin, record_key, Vec::new(), &mut output);
        }
        execute_code(host, true)
    });

    match result {
        Err(err) if host.params().flags.repair_callback => {
            // The record goes even when the callback fails.
            let mut output = VmOutput::from_error(&err);
            let mut account = OutputAccount::new(origin);
            account.touched = true;
            account.storage_updates.insert(key, Vec::new());
            output.output_accounts.insert(origin, account);
            Ok(output)
        }
        other => other,
    }
}

/// Deploy new contract code and run its `init`.
pub fn run_smart_contract_create(host: &VmHost, input: ContractCreateInput) -> VmOutput {
    let span = debug_span!("run_smart_contract_create", caller = %input.caller, size = input.code.len());
    let _enter = span.enter();

    host.init_state();
    let output = guarded(|| do_create(host, input)).unwrap_or_else(|err| {
        debug!(error = %err, "Deployment failed");
        VmOutput::from_error(&err)
    });
    host.clear_state_stack();
    output
}

fn do_create(host: &VmHost, input: ContractCreateInput) -> Result<VmOutput, VmError> {
    if !host.params().flags.deploy {
        return Err(VmError::DeploymentDisabled);
    }
    host.metering().init_for_call(input.gas_provided);
    host.use_gas(host.schedule().ei_api_cost.create_contract)?;

    let caller = input.caller;
    let address = host.blockchain().new_address(&caller, &host.params().vm_type);
    if host.code(&address).is_some() {
        return Err(VmError::AccountCollision(address));
    }
    debug!(%address, "Deploying contract");

    let mut call = CallInput::new(caller, address, INIT_FUNCTION_NAME, input.gas_provided)
        .with_arguments(input.arguments)
        .with_value(input.call_value)
        .with_tx_hash(input.tx_hash);
    call.gas_price = input.gas_price;
    let (code, metadata) = (input.code, input.code_metadata);

    run_top_frame(host, call, move |host| {
        {
            let mut output = host.output();
            output.increment_nonce(&caller);
            output.deploy_code(&address, code, metadata, caller);
        }
        execute_code(host, false)
    })
}

/// Replace a contract's code. Argument 0 is the code, argument 1 its
/// metadata; the rest go to the new code's `init`.
fn upgrade_contract(host: &VmHost, mut input: CallInput) -> Result<VmOutput, VmError> {
    if input.arguments.len() < 2 {
        return Err(VmError::UpgradeFailed("expected code and metadata arguments".to_string()));
    }
    let caller = input.caller;
    let address = input.recipient;
    if host.owner(&address) != Some(caller) {
        return Err(VmError::UpgradeFailed(format!("{} does not own {}", caller, address)));
    }
    host.use_gas(host.schedule().ei_api_cost.create_contract)?;

    let mut arguments = std::mem::take(&mut input.arguments);
    let metadata = arguments.remove(1);
    let code = arguments.remove(0);
    input.arguments = arguments;
    input.function = INIT_FUNCTION_NAME.to_string();
    debug!(%address, size = code.len(), "Upgrading contract");

    run_top_frame(host, input, move |host| {
        host.output().deploy_code(&address, code, metadata, caller);
        execute_code(host, false).map_err(|err| match err {
            VmError::OutOfGas { .. } => err,
            other => VmError::UpgradeFailed(other.to_string()),
        })
    })
}
