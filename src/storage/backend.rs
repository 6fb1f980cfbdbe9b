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

// Storage backend trait for event-oriented DAQ files

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::{DaqError, ErrorKind, Result};
use crate::registry::{DecimationEntry, SessionLayout, SourceVariable, VariableHandle};
use crate::snapshot::Snapshot;
use crate::value::Value;

/// Name of the reserved group/prefix holding the diagnostic fields
pub const DIAGNOSTICS_GROUP: &str = "MicroDAQ";
pub const MISSED_TRIGGERS_FIELD: &str = "nMissedTriggers";
pub const TRIGGER_PERIOD_FIELD: &str = "triggerPeriod";

/// One event inside the open file
#[derive(Debug, Clone, PartialEq)]
pub struct EventHandle {
    /// Index of the event within the open file
    pub sequence: u64,
    /// Group name or row label
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// A variable whose output name is already taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConflict {
    pub handle: VariableHandle,
    pub variable: String,
    pub name: String,
}

impl SchemaConflict {
    pub fn to_error(&self) -> DaqError {
        DaqError::SchemaConflict {
            variable: self.variable.clone(),
            name: self.name.clone(),
        }
    }
}

/// Assign output names in registration order. The first variable to claim a
/// name keeps it; later variables mapping to a taken or reserved name are
/// reported as conflicts.
pub fn detect_schema_conflicts<F>(
    layout: &SessionLayout,
    reserved: &[String],
    output_name: F,
) -> Vec<SchemaConflict>
where
    F: Fn(&SourceVariable) -> String,
{
    let mut taken: HashSet<String> = reserved.iter().cloned().collect();
    let mut conflicts = Vec::new();
    for entry in layout.entries() {
        let name = output_name(&entry.variable);
        if !taken.insert(name.clone()) {
            debug!(
                "Output name '{}' of '{}' is already taken",
                name, entry.variable.qualified_name
            );
            conflicts.push(SchemaConflict {
                handle: entry.handle,
                variable: entry.variable.qualified_name.clone(),
                name,
            });
        }
    }
    conflicts
}

/// Write-only storage backend for DAQ events
///
/// A backend is built for one finalized [`SessionLayout`] and writes one file
/// at a time. Each trigger produces one event: `begin_event`, one
/// `write_field` per variable, `write_diagnostics`, `end_event`.
pub trait StorageBackend: Send {
    /// Create the file at `path`, replacing any existing file
    fn open(&mut self, path: &Path) -> Result<()>;

    fn begin_event(&mut self, timestamp: DateTime<Utc>) -> Result<EventHandle>;

    /// Write the decimated value of one variable
    fn write_field(
        &mut self,
        event: &EventHandle,
        entry: &DecimationEntry,
        value: &Value,
    ) -> Result<()>;

    fn write_diagnostics(
        &mut self,
        event: &EventHandle,
        missed_triggers: u64,
        trigger_period_ms: i64,
    ) -> Result<()>;

    fn end_event(&mut self, event: EventHandle) -> Result<()>;

    /// Flush and close the open file. A no-op when nothing is open.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Variables left out of every event because their output name is taken
    fn schema_conflicts(&self) -> &[SchemaConflict];

    /// File name suffix including the dot
    fn suffix(&self) -> &str;

    /// Get backend type identifier
    fn backend_type(&self) -> &str;

    /// Change the checkpoint interval, for backends that buffer events
    fn set_flush_after_entries(&mut self, _flush_after_entries: u32) {}

    /// Whether the file starts with one event of initial values, written
    /// before the first trigger
    fn records_initial_values(&self) -> bool {
        false
    }

    /// Write a full snapshot as one event, skipping conflicting variables
    fn write_event(&mut self, layout: &SessionLayout, snapshot: &Snapshot) -> Result<()> {
        let event = self.begin_event(snapshot.timestamp)?;
        let dropped: HashSet<VariableHandle> =
            self.schema_conflicts().iter().map(|c| c.handle).collect();

        for field in snapshot.fields() {
            if dropped.contains(&field.handle) {
                continue;
            }
            let entry = layout.entry(field.handle).ok_or_else(|| {
                DaqError::backend(format!("unknown variable handle {}", field.handle.index()))
            })?;
            match self.write_field(&event, entry, &field.value) {
                Err(e) if e.kind() == ErrorKind::SchemaConflict => {
                    debug!("Skipping field: {}", e);
                }
                other => other?,
            }
        }

        self.write_diagnostics(&event, snapshot.missed_triggers, snapshot.trigger_period_ms)?;
        self.end_event(event)
    }
}
