use crate::output::ReturnCode;
use kestrel_types::Address;
use thiserror::Error;

/// Errors that terminate or reject a contract call frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("Out of gas: requested {requested}, left {left}")]
    OutOfGas { requested: u64, left: u64 },

    #[error("User error signaled by contract")]
    UserSignaledError,

    #[error("Invalid big integer handle: {0}")]
    InvalidHandle(i32),

    #[error("Memory access out of bounds: offset {offset}, length {length}")]
    MemoryAccessOutOfBounds { offset: i64, length: i64 },

    #[error("Call depth exceeded: {depth}")]
    CallDepthExceeded { depth: usize },

    #[error("Reserved function name: {0}")]
    ReservedFunctionName(String),

    #[error("Write to protected storage key rejected")]
    ProtectedStorageKeyViolation,

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Function has wrong signature: {0}")]
    FunctionWrongSignature(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(Address),

    #[error("Contract invalid: {0}")]
    ContractInvalid(String),

    #[error("Insufficient funds: {0}")]
    OutOfFunds(String),

    #[error("Argument index out of range: {0}")]
    ArgumentIndexOutOfRange(i32),

    #[error("init can only be called on deployment")]
    InitFunctionCalled,

    #[error("callBack can only be called by an async callback")]
    CallbackFunctionCalled,

    #[error("Built-in function {0} cannot run on the same context")]
    BuiltinOnSameContext(String),

    #[error("Contract deployment is disabled")]
    DeploymentDisabled,

    #[error("Upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("Account already exists: {0}")]
    AccountCollision(Address),

    #[error("No pending async call under id {0}")]
    AsyncCallNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Host fault: {0}")]
    HostPanic(String),

    #[error("State stack underflow")]
    StateStackUnderflow,
}

impl VmError {
    /// Return code reported in the VM output for this error.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            VmError::OutOfGas { .. } => ReturnCode::OutOfGas,
            VmError::UserSignaledError => ReturnCode::UserError,
            VmError::CallDepthExceeded { .. } => ReturnCode::CallStackOverFlow,
            VmError::FunctionNotFound(_)
            | VmError::ReservedFunctionName(_)
            | VmError::InitFunctionCalled
            | VmError::CallbackFunctionCalled => ReturnCode::FunctionNotFound,
            VmError::FunctionWrongSignature(_) => ReturnCode::FunctionWrongSignature,
            VmError::ContractNotFound(_) => ReturnCode::ContractNotFound,
            VmError::ContractInvalid(_) | VmError::DeploymentDisabled => ReturnCode::ContractInvalid,
            VmError::OutOfFunds(_) => ReturnCode::OutOfFunds,
            VmError::UpgradeFailed(_) => ReturnCode::UpgradeFailed,
            VmError::AccountCollision(_) => ReturnCode::AccountCollision,
            VmError::InvalidHandle(_)
            | VmError::MemoryAccessOutOfBounds { .. }
            | VmError::ProtectedStorageKeyViolation
            | VmError::ArgumentIndexOutOfRange(_)
            | VmError::BuiltinOnSameContext(_)
            | VmError::AsyncCallNotFound(_)
            | VmError::ExecutionFailed(_)
            | VmError::HostPanic(_)
            | VmError::StateStackUnderflow => ReturnCode::ExecutionFailed,
        }
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        VmError::HostPanic(message)
    }
}

/// Recover a `VmError` from an error raised by the wasm engine.
pub fn from_engine_error(err: &anyhow::Error) -> VmError {
    if let Some(vm_error) = err.downcast_ref::<VmError>() {
        return vm_error.clone();
    }
    match err.downcast_ref::<wasmtime::Trap>() {
        Some(wasmtime::Trap::OutOfFuel) => VmError::OutOfGas { requested: 1, left: 0 },
        Some(wasmtime::Trap::MemoryOutOfBounds) => VmError::MemoryAccessOutOfBounds { offset: -1, length: -1 },
        Some(trap) => VmError::ExecutionFailed(format!("trap: {}", trap)),
        None => VmError::ExecutionFailed(format!("{:#}", err)),
    }
}
