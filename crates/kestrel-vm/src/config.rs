//! Host configuration.
//!
//! Handles the construction parameters of a host and the loading of
//! versioned gas schedules from TOML files.

use crate::gas_metering::GasSchedule;
use crate::{DEFAULT_BLOCK_GAS_LIMIT, MAX_CALL_DEPTH, MAX_MEMORY_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Raw gas schedule: section name to operation name to cost.
pub type GasScheduleMap = BTreeMap<String, BTreeMap<String, u64>>;

/// Default VM type tag.
pub const DEFAULT_VM_TYPE: [u8; 2] = [5, 0];

/// Default protected storage key prefix.
pub const DEFAULT_PROTECTED_KEY_PREFIX: &[u8] = b"KESTREL";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid gas schedule: {0}")]
    InvalidGasSchedule(String),

    #[error("Unknown gas schedule version: {0}")]
    UnknownGasScheduleVersion(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Protocol feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnableFlags {
    /// Contracts may be deployed.
    pub deploy: bool,
    /// Modules are compiled ahead of time and cached by code hash.
    pub aot: bool,
    /// A failing async callback still clears its pending record.
    pub repair_callback: bool,
    /// Protocol built-in functions are dispatched to the world.
    pub builtin_functions: bool,
}

impl Default for EnableFlags {
    fn default() -> Self {
        Self {
            deploy: true,
            aot: true,
            repair_callback: true,
            builtin_functions: true,
        }
    }
}

/// Everything a host is constructed with.
#[derive(Debug, Clone)]
pub struct HostParameters {
    pub vm_type: Vec<u8>,
    pub block_gas_limit: u64,
    pub gas_schedule: GasSchedule,
    pub protocol_builtin_functions: BTreeSet<String>,
    pub protected_key_prefix: Vec<u8>,
    pub max_call_depth: usize,
    pub max_memory_bytes: usize,
    pub flags: EnableFlags,
}

impl Default for HostParameters {
    fn default() -> Self {
        Self {
            vm_type: DEFAULT_VM_TYPE.to_vec(),
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            gas_schedule: GasSchedule::default(),
            protocol_builtin_functions: BTreeSet::new(),
            protected_key_prefix: DEFAULT_PROTECTED_KEY_PREFIX.to_vec(),
            max_call_depth: MAX_CALL_DEPTH,
            max_memory_bytes: MAX_MEMORY_BYTES,
            flags: EnableFlags::default(),
        }
    }
}

impl HostParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vm_type.is_empty() {
            return Err(ConfigError::Invalid("VM type cannot be empty".to_string()));
        }
        if self.protected_key_prefix.is_empty() {
            return Err(ConfigError::Invalid("protected key prefix cannot be empty".to_string()));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max call depth cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Gas schedule selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasScheduleConfig {
    /// Directory holding `<version>.toml` files
    pub directory: PathBuf,
    /// Version in use
    pub active_version: String,
}

impl Default for GasScheduleConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("gas_schedules"),
            active_version: "v1".to_string(),
        }
    }
}

/// On-disk host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// VM type tag, hex encoded
    pub vm_type: String,
    pub block_gas_limit: u64,
    pub protected_key_prefix: String,
    pub max_call_depth: usize,
    pub max_memory_bytes: usize,
    pub builtin_functions: Vec<String>,
    pub gas_schedule: GasScheduleConfig,
    pub flags: EnableFlags,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            vm_type: hex::encode(DEFAULT_VM_TYPE),
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            protected_key_prefix: String::from_utf8_lossy(DEFAULT_PROTECTED_KEY_PREFIX).into_owned(),
            max_call_depth: MAX_CALL_DEPTH,
            max_memory_bytes: MAX_MEMORY_BYTES,
            builtin_functions: vec![],
            gas_schedule: GasScheduleConfig::default(),
            flags: EnableFlags::default(),
        }
    }
}

impl VmConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = read(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        hex::decode(&self.vm_type).map_err(|e| ConfigError::Invalid(format!("vm_type: {}", e)))?;
        if self.gas_schedule.active_version.is_empty()
            || self.gas_schedule.active_version.contains(['/', '\\', '.'])
        {
            return Err(ConfigError::UnknownGasScheduleVersion(
                self.gas_schedule.active_version.clone(),
            ));
        }
        Ok(())
    }

    /// Load the active gas schedule and assemble the host parameters.
    /// A relative schedule directory is resolved against `base_dir`.
    pub fn into_host_parameters(self, base_dir: &Path) -> Result<HostParameters, ConfigError> {
        self.validate()?;
        let directory = base_dir.join(&self.gas_schedule.directory);
        let map = load_gas_schedule_version(&directory, &self.gas_schedule.active_version)?;

        let params = HostParameters {
            vm_type: hex::decode(&self.vm_type).map_err(|e| ConfigError::Invalid(e.to_string()))?,
            block_gas_limit: self.block_gas_limit,
            gas_schedule: GasSchedule::from_map(&map)?,
            protocol_builtin_functions: self.builtin_functions.into_iter().collect(),
            protected_key_prefix: self.protected_key_prefix.into_bytes(),
            max_call_depth: self.max_call_depth,
            max_memory_bytes: self.max_memory_bytes,
            flags: self.flags,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Parse a gas schedule file into its raw map.
pub fn load_gas_schedule(path: &Path) -> Result<GasScheduleMap, ConfigError> {
    let contents = read(path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Load `<directory>/<version>.toml`. Versions that are not asked for are never read.
pub fn load_gas_schedule_version(directory: &Path, version: &str) -> Result<GasScheduleMap, ConfigError> {
    let path = directory.join(format!("{}.toml", version));
    if !path.is_file() {
        return Err(ConfigError::UnknownGasScheduleVersion(version.to_string()));
    }
    load_gas_schedule(&path)
}

/// Versions available in a schedule directory, sorted.
pub fn available_gas_schedule_versions(directory: &Path) -> Result<Vec<String>, ConfigError> {
    let entries = std::fs::read_dir(directory).map_err(|e| ConfigError::Io {
        path: directory.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut versions: Vec<String> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .collect();
    versions.sort();
    Ok(versions)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
