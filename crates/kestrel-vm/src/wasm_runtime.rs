//! Wasmtime engine: compilation, the module cache and running one export.

use crate::ei;
use crate::error::{from_engine_error, VmError};
use crate::host::VmHost;
use crate::reserved::ReservedFunctions;
use kestrel_types::Hash;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, trace};
use wasmtime::{Config, Engine, ExternType, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};

/// WASM engine configuration
#[derive(Debug, Clone)]
pub struct WasmRuntimeConfig {
    /// Linear memory ceiling per instance
    pub max_memory_bytes: usize,
    /// Keep compiled modules keyed by code hash
    pub cache_modules: bool,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: crate::MAX_MEMORY_BYTES,
            cache_modules: true,
        }
    }
}

/// Store data of one instance.
pub struct HostState {
    pub host: VmHost,
    limits: StoreLimits,
}

pub struct WasmRuntime {
    config: WasmRuntimeConfig,
    engine: Engine,
    linker: Linker<HostState>,
    modules: RefCell<HashMap<Hash, Module>>,
}

impl WasmRuntime {
    pub fn new(config: WasmRuntimeConfig) -> Result<Self, VmError> {
        let mut wasmtime_config = Config::new();
        wasmtime_config.consume_fuel(true);
        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| VmError::ExecutionFailed(format!("engine: {}", e)))?;

        let mut linker = Linker::new(&engine);
        ei::register_imports(&mut linker)?;

        Ok(Self {
            config,
            engine,
            linker,
            modules: RefCell::new(HashMap::new()),
        })
    }

    /// Compile `code`, reusing an earlier compilation of the same code hash.
    pub fn compile(&self, code_hash: Hash, code: &[u8]) -> Result<Module, VmError> {
        if let Some(module) = self.modules.borrow().get(&code_hash) {
            trace!(code_hash = %code_hash, "Module cache hit");
            return Ok(module.clone());
        }

        let module = Module::new(&self.engine, code).map_err(|e| VmError::ContractInvalid(format!("{:#}", e)))?;
        debug!(code_hash = %code_hash, size = code.len(), "Module compiled");
        if self.config.cache_modules {
            self.modules.borrow_mut().insert(code_hash, module.clone());
        }
        Ok(module)
    }

    pub fn cached_modules(&self) -> usize {
        self.modules.borrow().len()
    }

    /// Reject modules exporting a reserved name or a function that takes
    /// parameters or returns values.
    pub fn validate(&self, module: &Module, reserved: &ReservedFunctions) -> Result<(), VmError> {
        for export in module.exports() {
            let ExternType::Func(func_type) = export.ty() else {
                continue;
            };
            if reserved.is_reserved(export.name()) {
                return Err(VmError::ContractInvalid(format!(
                    "exports reserved function {}",
                    export.name()
                )));
            }
            if func_type.params().len() != 0 || func_type.results().len() != 0 {
                return Err(VmError::ContractInvalid(format!(
                    "exported function {} has a signature",
                    export.name()
                )));
            }
        }
        Ok(())
    }

    pub fn has_function(&self, module: &Module, name: &str) -> bool {
        matches!(module.get_export(name), Some(ExternType::Func(_)))
    }

    /// Instantiate `module` and run `function` with the fuel left in the
    /// executing frame. Fuel burnt is charged to the frame before returning.
    pub fn call(&self, host: &VmHost, module: &Module, function: &str) -> Result<(), VmError> {
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory_bytes)
            .build();
        let mut store = Store::new(
            &self.engine,
            HostState {
                host: host.clone(),
                limits,
            },
        );
        store.limiter(|state| &mut state.limits);

        let fuel = host.metering().checkpoint_fuel();
        store
            .set_fuel(fuel)
            .map_err(|e| VmError::ExecutionFailed(format!("fuel: {}", e)))?;

        let result = self.run(&mut store, module, function);

        let remaining = store.get_fuel().unwrap_or(0);
        host.metering().sync_fuel(remaining);

        result.map_err(|err| match err {
            VmError::ExecutionFailed(_) if remaining == 0 => VmError::OutOfGas { requested: 1, left: 0 },
            other => other,
        })
    }

    fn run(&self, store: &mut Store<HostState>, module: &Module, function: &str) -> Result<(), VmError> {
        let instance = self
            .linker
            .instantiate(&mut *store, module)
            .map_err(|e| match from_engine_error(&e) {
                VmError::ExecutionFailed(reason) => VmError::ContractInvalid(reason),
                other => other,
            })?;

        let func = instance
            .get_func(&mut *store, function)
            .ok_or_else(|| VmError::FunctionNotFound(function.to_string()))?;
        let func = func
            .typed::<(), ()>(&*store)
            .map_err(|_| VmError::FunctionWrongSignature(function.to_string()))?;

        func.call(&mut *store, ()).map_err(|e| from_engine_error(&e))
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("config", &self.config)
            .field("cached_modules", &self.cached_modules())
            .finish()
    }
}
