//! Call input and the call state machine.
//!
//! Every call, top-level or nested, enters through [`RuntimeContext::push_state`]
//! and leaves through [`RuntimeContext::pop_state`], so the stack depth is the
//! current synchronous nesting depth.

use crate::error::VmError;
use crate::MAX_CALL_DEPTH;
use kestrel_types::{Address, Hash};
use num_bigint::BigUint;

/// How a call reached the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallType {
    #[default]
    DirectCall,
    /// Execution of a deferred call on its destination.
    AsynchronousCall,
    /// Delivery of a deferred call's result to its originator.
    AsynchronousCallBack,
}

/// A request to execute a contract function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallInput {
    pub caller: Address,
    pub recipient: Address,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    pub gas_provided: u64,
    pub gas_price: u64,
    pub call_type: CallType,
    pub current_tx_hash: Hash,
    pub original_tx_hash: Hash,
    /// Identifies the pending async call a callback resolves.
    pub async_call_id: Hash,
}

impl CallInput {
    pub fn new(caller: Address, recipient: Address, function: impl Into<String>, gas_provided: u64) -> Self {
        Self {
            caller,
            recipient,
            function: function.into(),
            gas_provided,
            ..Self::default()
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_value(mut self, value: BigUint) -> Self {
        self.call_value = value;
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: Hash) -> Self {
        self.current_tx_hash = tx_hash;
        self.original_tx_hash = tx_hash;
        self
    }

    pub fn with_async_call_id(mut self, call_id: Hash) -> Self {
        self.async_call_id = call_id;
        self
    }
}

/// A request to deploy a new contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractCreateInput {
    pub caller: Address,
    pub code: Vec<u8>,
    pub code_metadata: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    pub gas_provided: u64,
    pub gas_price: u64,
    pub tx_hash: Hash,
}

/// Where a frame is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Running,
    Committed,
    RolledBack,
    Faulted,
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Commit,
    /// Signaled user error: effects dropped.
    Rollback,
    /// Gas exhaustion, trap or host fault: effects dropped.
    Fault,
}

impl FrameOutcome {
    pub fn for_error(err: &VmError) -> Self {
        match err {
            VmError::UserSignaledError => FrameOutcome::Rollback,
            _ => FrameOutcome::Fault,
        }
    }

    pub fn is_commit(self) -> bool {
        self == FrameOutcome::Commit
    }
}

/// Live wasm instance attached to the executing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceHandle {
    pub id: u64,
    pub code_hash: Hash,
}

#[derive(Debug, Clone, Default)]
struct RuntimeFrame {
    input: CallInput,
    state: CallState,
    instance: Option<InstanceHandle>,
}

#[derive(Debug, Clone)]
pub struct RuntimeContext {
    frame: RuntimeFrame,
    stack: Vec<RuntimeFrame>,
    max_depth: usize,
    next_instance_id: u64,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(MAX_CALL_DEPTH)
    }
}

impl RuntimeContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frame: RuntimeFrame::default(),
            stack: Vec::new(),
            max_depth,
            next_instance_id: 0,
        }
    }

    /// Back to `Idle` with an empty stack.
    pub fn init_state(&mut self) {
        self.frame = RuntimeFrame::default();
        self.stack.clear();
    }

    /// Open a frame for `input`. Fails before pushing anything when the
    /// maximum depth is reached.
    pub fn push_state(&mut self, input: CallInput) -> Result<(), VmError> {
        let depth = self.stack.len();
        if depth >= self.max_depth {
            return Err(VmError::CallDepthExceeded { depth });
        }
        let parent = std::mem::replace(
            &mut self.frame,
            RuntimeFrame {
                input,
                state: CallState::Running,
                instance: None,
            },
        );
        self.stack.push(parent);
        Ok(())
    }

    /// Close the executing frame and resume its parent. Returns the final state
    /// of the closed frame.
    pub fn pop_state(&mut self, outcome: FrameOutcome) -> Result<CallState, VmError> {
        let parent = self.stack.pop().ok_or(VmError::StateStackUnderflow)?;
        let finished = std::mem::replace(&mut self.frame, parent);
        debug_assert_eq!(finished.state, CallState::Running);
        Ok(match outcome {
            FrameOutcome::Commit => CallState::Committed,
            FrameOutcome::Rollback => CallState::RolledBack,
            FrameOutcome::Fault => CallState::Faulted,
        })
    }

    pub fn clear_state_stack(&mut self) {
        if let Some(bottom) = self.stack.drain(..).next() {
            self.frame = bottom;
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn state(&self) -> CallState {
        self.frame.state
    }

    pub fn input(&self) -> &CallInput {
        &self.frame.input
    }

    pub fn sc_address(&self) -> Address {
        self.frame.input.recipient
    }

    pub fn caller(&self) -> Address {
        self.frame.input.caller
    }

    pub fn function(&self) -> &str {
        &self.frame.input.function
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.frame.input.arguments
    }

    pub fn argument(&self, id: i32) -> Result<&[u8], VmError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.frame.input.arguments.get(index))
            .map(Vec::as_slice)
            .ok_or(VmError::ArgumentIndexOutOfRange(id))
    }

    pub fn call_value(&self) -> &BigUint {
        &self.frame.input.call_value
    }

    /// Record the instance running this frame.
    pub fn attach_instance(&mut self, code_hash: Hash) -> InstanceHandle {
        let handle = InstanceHandle {
            id: self.next_instance_id,
            code_hash,
        };
        self.next_instance_id += 1;
        self.frame.instance = Some(handle);
        handle
    }

    pub fn detach_instance(&mut self) -> Option<InstanceHandle> {
        self.frame.instance.take()
    }

    pub fn instance(&self) -> Option<InstanceHandle> {
        self.frame.instance
    }
}
