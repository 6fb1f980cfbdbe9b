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

use serde::{Deserialize, Serialize};

/// Trigger engine state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DaqState {
    /// DAQ disabled
    #[default]
    Idle,
    /// Enabled, waiting to open a file on the next trigger
    Opening,
    /// File open, writing one event per trigger
    Recording,
    /// File full, the next trigger opens the next buffer
    Rotating,
    /// Opening a file failed, retried on every trigger
    #[serde(rename = "error_open")]
    ErrorOpen,
}

/// Live status of a DAQ instance
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaqStatus {
    pub name: String,
    pub state: DaqState,
    pub current_directory: String,
    pub current_buffer: u32,
    pub current_entry: u32,
    pub error: bool,
    pub missed_triggers: u64,
    pub trigger_period_ms: i64,
    pub total_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default)]
    pub dropped_fields: Vec<String>,
}
