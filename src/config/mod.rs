// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of stonne-bridge (tensor compiler to STONNE simulator bridge).

//! Accelerator capability descriptors and their TOML topology files.
//!
//! A topology file is flat; every key is optional and falls back to the
//! MAERI-like default architecture:
//!
//! ```toml
//! name = "TPU"
//! ms_size = 256
//! sparsity_support = false
//! native_conv = false
//! stationary = "filters"
//! print_stats = true
//! ```

pub mod tile;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use tile::TileConfig;

/// Errors raised before any tensor buffer is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read or parsed.
    #[error("failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },
    /// A configuration value is out of range.
    #[error("invalid configuration value `{key}`: {message}")]
    InvalidValue { key: &'static str, message: String },
    /// A shape parameter is zero or otherwise malformed.
    #[error("invalid convolution shape: {0}")]
    InvalidShape(String),
    /// `G` does not divide a channel count.
    #[error("group count {groups} does not evenly divide {what} ({value})")]
    GroupMismatch {
        groups: usize,
        what: &'static str,
        value: usize,
    },
    /// The dilated kernel does not fit inside the padded input.
    #[error("effective kernel extent {effective} exceeds padded input {padded} on the {axis} axis")]
    EmptyOutput {
        axis: &'static str,
        effective: usize,
        padded: usize,
    },
    /// Caller-supplied output extent disagrees with the shape parameters.
    #[error("output {axis} extent mismatch: supplied {supplied}, computed {computed}")]
    OutputExtent {
        axis: &'static str,
        supplied: usize,
        computed: usize,
    },
    /// Only a single input is simulated.
    #[error("batch size {0} is unsupported; the simulator runs a single input")]
    Batch(usize),
    /// Sparsity ratio is a percentage.
    #[error("sparsity ratio {0} is outside 0..=100")]
    SparsityRatio(u32),
}

/// Which GEMM operand stays resident in the simulated compute fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stationarity {
    /// Filters (`MK`) stay resident, activations (`KN`) stream.
    #[default]
    Filters,
    /// Activations stay resident, filters stream.
    Activations,
}

impl std::fmt::Display for Stationarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stationarity::Filters => write!(f, "MK_STA_KN_STR"),
            Stationarity::Activations => write!(f, "MK_STR_KN_STA"),
        }
    }
}

/// Capability descriptor of the simulated accelerator.
///
/// Built fresh for every invocation and shared read-only with the lowering
/// and dispatch code; only the statistics flag is mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    #[serde(default = "default_name")]
    name: String,
    /// Number of multiplier switches.
    #[serde(default = "default_ms_size")]
    ms_size: usize,
    #[serde(default)]
    sparsity_support: bool,
    #[serde(default = "default_native_conv")]
    native_conv: bool,
    #[serde(default)]
    stationary: Stationarity,
    #[serde(default)]
    print_stats: bool,
}

fn default_name() -> String {
    "MAERI".to_string()
}

fn default_ms_size() -> usize {
    64
}

fn default_native_conv() -> bool {
    true
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self::maeri()
    }
}

impl AcceleratorConfig {
    /// Flexible dense accelerator that executes convolutions natively.
    pub fn maeri() -> Self {
        Self {
            name: default_name(),
            ms_size: default_ms_size(),
            sparsity_support: false,
            native_conv: true,
            stationary: Stationarity::Filters,
            print_stats: false,
        }
    }

    /// Sparse GEMM accelerator.
    pub fn sigma() -> Self {
        Self {
            name: "SIGMA".to_string(),
            ms_size: 128,
            sparsity_support: true,
            native_conv: false,
            stationary: Stationarity::Filters,
            print_stats: false,
        }
    }

    /// Weight-stationary systolic array; matrix multiplication only.
    pub fn tpu() -> Self {
        Self {
            name: "TPU".to_string(),
            ms_size: 256,
            sparsity_support: false,
            native_conv: false,
            stationary: Stationarity::Filters,
            print_stats: false,
        }
    }

    /// Builds a descriptor from explicit capability flags.
    pub fn custom(
        name: impl Into<String>,
        ms_size: usize,
        sparsity: bool,
        native_conv: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            name: name.into(),
            ms_size,
            sparsity_support: sparsity,
            native_conv,
            stationary: Stationarity::Filters,
            print_stats: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a topology file. `None` or an empty path yields the default.
    pub fn from_arch_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if !p.as_os_str().is_empty() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: AcceleratorConfig = read_toml(path).map_err(|err| ConfigError::Load {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "name",
                message: "accelerator name must not be empty".into(),
            });
        }
        if self.ms_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ms_size",
                message: "at least one multiplier is required".into(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ms_size(&self) -> usize {
        self.ms_size
    }

    pub fn sparsity_supported(&self) -> bool {
        self.sparsity_support
    }

    pub fn native_conv_supported(&self) -> bool {
        self.native_conv
    }

    pub fn stationary(&self) -> Stationarity {
        self.stationary
    }

    pub fn print_stats(&self) -> bool {
        self.print_stats
    }

    pub fn set_print_stats(&mut self, enabled: bool) {
        self.print_stats = enabled;
    }

    pub fn with_stationary(mut self, stationary: Stationarity) -> Self {
        self.stationary = stationary;
        self
    }
}

/// Read and deserialize a TOML file, attaching the path to any failure.
pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value)
}
