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

// Per-trigger diagnostics: missed triggers, trigger period, error flag

use chrono::{DateTime, Utc};

use crate::value::TriggerValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticsState {
    /// Triggers skipped between the last two integer trigger values
    pub missed_trigger_count: u64,
    pub last_trigger_value: Option<TriggerValue>,
    pub last_trigger_timestamp: Option<DateTime<Utc>>,
    /// Wall-clock time between the last two triggers
    pub trigger_period_ms: i64,
    /// Sticky until the DAQ is disabled
    pub error_flag: bool,
}

impl DiagnosticsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a new trigger. Called once per trigger, whatever the
    /// engine state.
    pub fn on_trigger(&mut self, value: &TriggerValue, timestamp: DateTime<Utc>) {
        self.missed_trigger_count = match (
            self.last_trigger_value.as_ref().and_then(TriggerValue::counter),
            value.counter(),
        ) {
            (Some(previous), Some(current)) => {
                let missed = (current - previous - 1).max(0);
                u64::try_from(missed).unwrap_or(u64::MAX)
            }
            _ => 0,
        };

        self.trigger_period_ms = match self.last_trigger_timestamp {
            Some(previous) => (timestamp - previous).num_milliseconds().max(0),
            None => 0,
        };

        self.last_trigger_value = Some(value.clone());
        self.last_trigger_timestamp = Some(timestamp);
    }

    pub fn set_error(&mut self) {
        self.error_flag = true;
    }

    pub fn clear_error(&mut self) {
        self.error_flag = false;
    }
}
