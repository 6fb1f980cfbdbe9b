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

// Configuration loading tests

use std::io::Write;
use tempfile::NamedTempFile;
use udaq_recorder::config::{apply_env_overrides, ConfigLoader};
use udaq_recorder::{load_config, AppConfig, ValueType};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_default_config() {
    let config = load_config("config/default.yaml").unwrap();

    assert_eq!(config.daq.name, "MicroDAQ");
    assert!(config.daq.enable);
    assert_eq!(config.daq.output_format, "root");
    assert_eq!(config.daq.compression, "zstd");
    assert_eq!(config.daq.decimation_factor, 10);
    assert_eq!(config.daq.decimation_threshold, 1000);
    assert_eq!(config.daq.max_files, 5);
    assert_eq!(config.daq.entries_per_file, 100);

    assert_eq!(config.variables.len(), 4);
    let trace = &config.variables[3];
    assert_eq!(trace.name, "/Scope/trace");
    assert_eq!(trace.value_type, ValueType::Float32);
    assert_eq!(trace.length, 5000);
    assert_eq!(config.variables[0].length, 1);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let file = write_config(
        r#"
variables:
  - name: /DAQ/x
    type: int16
"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.daq.name, "MicroDAQ");
    assert_eq!(config.daq.directory, "");
    assert_eq!(config.daq.output_format, "root");
    assert_eq!(config.daq.flush_after_entries, 0);
    assert_eq!(config.trigger.interval_ms, 1000);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_directory_from_environment() {
    std::env::set_var("UDAQ_IT_DATA_ROOT", "/srv/daq");
    let file = write_config(
        r#"
daq:
  directory: "${UDAQ_IT_DATA_ROOT}/run1"
  output_format: "${UDAQ_IT_UNSET_FORMAT:-arrow}"
"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.daq.directory, "/srv/daq/run1");
    assert_eq!(config.daq.output_format, "arrow");
    std::env::remove_var("UDAQ_IT_DATA_ROOT");
}

#[test]
fn test_env_overrides() {
    let mut config = AppConfig::default();

    std::env::set_var("UDAQ_DIRECTORY", "/tmp/override");
    std::env::set_var("UDAQ_ENABLE", "off");
    apply_env_overrides(&mut config).unwrap();
    assert_eq!(config.daq.directory, "/tmp/override");
    assert!(!config.daq.enable);

    std::env::set_var("UDAQ_ENABLE", "sometimes");
    assert!(apply_env_overrides(&mut config).is_err());

    std::env::remove_var("UDAQ_DIRECTORY");
    std::env::remove_var("UDAQ_ENABLE");
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        ("daq:\n  output_format: csv\n", "Unknown output format"),
        ("daq:\n  compression: snappy\n", "Unknown compression"),
        ("daq:\n  max_files: 0\n", "max_files"),
        ("daq:\n  entries_per_file: 0\n", "entries_per_file"),
        ("daq:\n  decimation_factor: 0\n", "decimation_factor"),
        ("trigger:\n  interval_ms: 0\n", "interval_ms"),
        ("logging:\n  format: xml\n", "logging.format"),
        (
            "variables:\n  - name: /a\n    type: int8\n  - name: a/\n    type: int8\n",
            "duplicate",
        ),
        (
            "variables:\n  - name: /a\n    type: int8\n    length: 0\n",
            "length",
        ),
        ("variables:\n  - name: /a\n    type: complex\n", "parse"),
    ];

    for (content, expected) in cases {
        let err = ConfigLoader::load_str(content).unwrap_err();
        let message = format!("{:#}", err);
        assert!(
            message.contains(expected),
            "'{}' not in error '{}'",
            expected,
            message
        );
    }
}

#[test]
fn test_format_names_are_case_insensitive() {
    let config = ConfigLoader::load_str("daq:\n  output_format: HDF5\n").unwrap();
    assert_eq!(config.daq.output_format, "HDF5");
}
