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

// One trigger's worth of decimated values, in registration order

use chrono::{DateTime, Utc};

use crate::diagnostics::DiagnosticsState;
use crate::registry::{SessionLayout, VariableHandle};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotField {
    pub handle: VariableHandle,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub missed_triggers: u64,
    pub trigger_period_ms: i64,
    fields: Vec<SnapshotField>,
}

impl Snapshot {
    /// Decimate `current` (one value per layout entry, indexed by handle)
    pub fn capture(
        layout: &SessionLayout,
        current: &[Value],
        timestamp: DateTime<Utc>,
        diagnostics: &DiagnosticsState,
    ) -> Self {
        let fields = layout
            .entries()
            .iter()
            .zip(current)
            .map(|(entry, value)| SnapshotField {
                handle: entry.handle,
                value: value.decimate(entry.factor).resized(entry.sampled_length),
            })
            .collect();

        Self {
            timestamp,
            missed_triggers: diagnostics.missed_trigger_count,
            trigger_period_ms: diagnostics.trigger_period_ms,
            fields,
        }
    }

    pub fn fields(&self) -> &[SnapshotField] {
        &self.fields
    }

    pub fn get(&self, handle: VariableHandle) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.handle == handle)
            .map(|f| &f.value)
    }
}
