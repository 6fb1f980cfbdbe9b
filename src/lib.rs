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

// Triggered DAQ snapshot recorder
//
// On every trigger the recorder captures the current value of a fixed set of
// process variables and appends it as one event to a ring buffer of files:
// - Registers typed scalar and array variables once per session
// - Decimates large arrays by a configured stride
// - Rotates files by entry count and reuses the oldest buffer index
// - Writes HDF5 (one group per event) or Arrow IPC (one row per event)
// - Tracks missed triggers, trigger period and a sticky error flag

pub mod config;
pub mod decimation;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod registry;
pub mod ring_buffer;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod storage;
pub mod value;

// Re-export main types
pub use config::{load_config, load_config_with_env, AppConfig, DaqSettings};
pub use decimation::DecimationPolicy;
pub use diagnostics::DiagnosticsState;
pub use engine::TriggerEngine;
pub use error::{DaqError, ErrorKind, Result};
pub use registry::{
    DecimationEntry, SessionLayout, SourceDescriptor, SourceVariable, VariableHandle,
    VariableRegistry,
};
pub use ring_buffer::{RingBufferPathManager, RingBufferState};
pub use snapshot::Snapshot;
pub use source::{ChannelSource, DataSource, TriggerEvent, ValueUpdate};
pub use status::{DaqState, DaqStatus};
pub use storage::{BackendFactory, StorageBackend};
pub use value::{TriggerValue, Value, ValueType};
