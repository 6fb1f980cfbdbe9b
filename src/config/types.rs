// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for udaq-recorder

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::decimation::DecimationPolicy;
use crate::registry::SourceDescriptor;
use crate::value::ValueType;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub daq: DaqSettings,

    /// Variables offered by the synthetic source of the binary
    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings of one DAQ instance
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DaqSettings {
    #[serde(default = "default_daq_name")]
    pub name: String,

    #[serde(default = "default_enable")]
    pub enable: bool,

    /// Output directory, empty for `<cwd>/uDAQ`
    #[serde(default)]
    pub directory: String,

    #[serde(default = "default_output_format")]
    pub output_format: String, // "hdf5", "root", "arrow"

    #[serde(default = "default_decimation_factor")]
    pub decimation_factor: u32,

    #[serde(default = "default_decimation_threshold")]
    pub decimation_threshold: u32,

    #[serde(default = "default_max_files")]
    pub max_files: u32,

    #[serde(default = "default_entries_per_file")]
    pub entries_per_file: u32,

    /// Columnar checkpoint interval in events, 0 to write only at close
    #[serde(default)]
    pub flush_after_entries: u32,

    /// Columnar buffer compression: "zstd", "lz4" or "none"
    #[serde(default = "default_compression")]
    pub compression: String,
}

impl Default for DaqSettings {
    fn default() -> Self {
        Self {
            name: default_daq_name(),
            enable: default_enable(),
            directory: String::new(),
            output_format: default_output_format(),
            decimation_factor: default_decimation_factor(),
            decimation_threshold: default_decimation_threshold(),
            max_files: default_max_files(),
            entries_per_file: default_entries_per_file(),
            flush_after_entries: 0,
            compression: default_compression(),
        }
    }
}

impl DaqSettings {
    pub fn decimation_policy(&self) -> DecimationPolicy {
        DecimationPolicy::new(self.decimation_factor, self.decimation_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VariableConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub value_type: ValueType,

    #[serde(default = "default_length")]
    pub length: usize,
}

impl VariableConfig {
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(self.name.clone(), self.value_type, self.length)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerConfig {
    #[serde(default = "default_trigger_interval")]
    pub interval_ms: u64,

    /// Number of triggers to emit, 0 to run until interrupted
    #[serde(default)]
    pub count: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_trigger_interval(),
            count: 0,
        }
    }
}

impl TriggerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_daq_name() -> String { "MicroDAQ".to_string() }
fn default_enable() -> bool { true }
fn default_output_format() -> String { "root".to_string() }
fn default_compression() -> String { "zstd".to_string() }
fn default_decimation_factor() -> u32 { 10 }
fn default_decimation_threshold() -> u32 { 1000 }
fn default_max_files() -> u32 { 5 }
fn default_entries_per_file() -> u32 { 100 }
fn default_length() -> usize { 1 }
fn default_trigger_interval() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
