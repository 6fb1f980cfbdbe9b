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

//! Seam to the host that owns the process variables.
//!
//! The host enumerates its variables once and then delivers trigger events,
//! each carrying the values that changed since the previous trigger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::registry::SourceDescriptor;
use crate::value::{TriggerValue, Value};

/// New value of one variable, keyed by its qualified name
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub trigger: TriggerValue,
    pub timestamp: DateTime<Utc>,
    pub updates: Vec<ValueUpdate>,
}

impl TriggerEvent {
    pub fn new(trigger: impl Into<TriggerValue>, timestamp: DateTime<Utc>) -> Self {
        Self {
            trigger: trigger.into(),
            timestamp,
            updates: Vec::new(),
        }
    }

    /// Trigger stamped with the current time
    pub fn now(trigger: impl Into<TriggerValue>) -> Self {
        Self::new(trigger, Utc::now())
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push(ValueUpdate {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Live variables and trigger notifications of the host
#[async_trait]
pub trait DataSource: Send {
    /// Variables offered by the host
    fn sources(&self) -> Vec<SourceDescriptor>;

    /// Wait for the next trigger. `None` once the host has shut down.
    async fn next_trigger(&mut self) -> Option<TriggerEvent>;
}

/// Source fed through a bounded channel
pub struct ChannelSource {
    descriptors: Vec<SourceDescriptor>,
    receiver: mpsc::Receiver<TriggerEvent>,
}

impl ChannelSource {
    pub fn new(
        descriptors: Vec<SourceDescriptor>,
        capacity: usize,
    ) -> (Self, mpsc::Sender<TriggerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                descriptors,
                receiver,
            },
            sender,
        )
    }
}

#[async_trait]
impl DataSource for ChannelSource {
    fn sources(&self) -> Vec<SourceDescriptor> {
        self.descriptors.clone()
    }

    async fn next_trigger(&mut self) -> Option<TriggerEvent> {
        self.receiver.recv().await
    }
}
