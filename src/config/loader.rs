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

// Configuration loader with environment variable substitution

use super::types::*;
use crate::registry::normalize_name;
use crate::storage::{parse_compression, BackendFactory};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::load_str(&content)
    }

    /// Parse and validate configuration text
    pub fn load_str(content: &str) -> Result<AppConfig> {
        // Substitute environment variables
        let content = Self::substitute_env_vars(content)?;

        // Parse YAML
        let config: AppConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DAQ_DIR:-/data/daq} -> /data/daq (if DAQ_DIR not set)
    pub(crate) fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")?;

        let substituted = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        });
        Ok(substituted.to_string())
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_daq(&config.daq)?;

        // Validate variables
        let mut names = HashSet::new();
        for variable in &config.variables {
            let name = normalize_name(&variable.name);
            if name == "/" {
                bail!("variables: name cannot be empty");
            }
            if variable.length == 0 {
                bail!("variables: '{}' must have length > 0", variable.name);
            }
            if !names.insert(name.clone()) {
                bail!("variables: duplicate variable name '{}'", name);
            }
        }

        if config.trigger.interval_ms == 0 {
            bail!("trigger.interval_ms must be > 0");
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }

    /// Validate the settings of one DAQ instance
    pub fn validate_daq(daq: &DaqSettings) -> Result<()> {
        if daq.decimation_factor == 0 {
            bail!("daq.decimation_factor must be > 0");
        }

        if daq.max_files == 0 {
            bail!("daq.max_files must be > 0");
        }

        if daq.entries_per_file == 0 {
            bail!("daq.entries_per_file must be > 0");
        }

        if !BackendFactory::is_known_format(&daq.output_format) {
            bail!(
                "Unknown output format: '{}'. Supported: hdf5, root, arrow",
                daq.output_format
            );
        }

        if parse_compression(&daq.compression).is_err() {
            bail!(
                "Unknown compression: '{}'. Supported: zstd, lz4, none",
                daq.compression
            );
        }

        Ok(())
    }
}
