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

//! Trigger engine.
//!
//! One engine per DAQ instance. Every trigger updates the diagnostics and,
//! while enabled, appends one event with the decimated values of all
//! variables to the open ring-buffer file:
//!
//! - not open: resolve the buffer index (first trigger only), take the next
//!   buffer name and open it; on failure raise the error flag and retry on
//!   the next trigger
//! - open: write the snapshot, count the entry and close the file once it
//!   holds `entries_per_file` events
//! - disabled with a file open: close it and advance the buffer index
//!
//! Settings changes are applied between triggers, never during one.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::DaqSettings;
use crate::diagnostics::DiagnosticsState;
use crate::error::{DaqError, Result};
use crate::registry::{SessionLayout, VariableHandle};
use crate::ring_buffer::{RingBufferPathManager, RingBufferState};
use crate::snapshot::Snapshot;
use crate::source::{DataSource, TriggerEvent, ValueUpdate};
use crate::status::{DaqState, DaqStatus};
use crate::storage::{BackendFactory, StorageBackend};
use crate::value::Value;

pub struct TriggerEngine {
    settings: DaqSettings,
    layout: Arc<SessionLayout>,
    backend: Box<dyn StorageBackend>,
    ring: RingBufferPathManager,
    diagnostics: DiagnosticsState,
    /// Latest value of every variable, indexed by handle
    current: Vec<Value>,
    state: DaqState,
    buffer_resolved: bool,
    /// An open failure has been logged and not yet recovered
    open_error_reported: bool,
    ignored_updates: HashSet<String>,
    current_file: Option<PathBuf>,
    total_events: u64,
}

impl TriggerEngine {
    /// Engine writing through the backend selected by `settings.output_format`
    pub fn new(settings: DaqSettings, layout: Arc<SessionLayout>) -> Result<Self> {
        let backend = BackendFactory::create(&settings, layout.clone())?;
        Ok(Self::with_backend(settings, layout, backend))
    }

    pub fn with_backend(
        settings: DaqSettings,
        layout: Arc<SessionLayout>,
        backend: Box<dyn StorageBackend>,
    ) -> Self {
        let ring = RingBufferPathManager::new(
            &settings.directory,
            backend.suffix(),
            settings.max_files,
            settings.entries_per_file,
        );

        for conflict in backend.schema_conflicts() {
            warn!(
                "[{}] {}; '{}' is not recorded",
                settings.name,
                conflict.to_error(),
                conflict.variable
            );
        }

        let current = layout
            .entries()
            .iter()
            .map(|e| Value::zeroed(e.variable.value_type, e.variable.element_count))
            .collect();

        let state = if settings.enable {
            DaqState::Opening
        } else {
            DaqState::Idle
        };

        info!(
            "[{}] DAQ ready: {} variables, {} backend, directory {}",
            settings.name,
            layout.len(),
            backend.backend_type(),
            ring.directory().display()
        );

        Self {
            settings,
            layout,
            backend,
            ring,
            diagnostics: DiagnosticsState::new(),
            current,
            state,
            buffer_resolved: false,
            open_error_reported: false,
            ignored_updates: HashSet::new(),
            current_file: None,
            total_events: 0,
        }
    }

    pub fn settings(&self) -> &DaqSettings {
        &self.settings
    }

    pub fn layout(&self) -> &Arc<SessionLayout> {
        &self.layout
    }

    pub fn state(&self) -> DaqState {
        self.state
    }

    pub fn diagnostics(&self) -> &DiagnosticsState {
        &self.diagnostics
    }

    pub fn ring_state(&self) -> &RingBufferState {
        self.ring.state()
    }

    pub fn current_value(&self, handle: VariableHandle) -> Option<&Value> {
        self.current.get(handle.index())
    }

    pub fn current_file(&self) -> Option<&PathBuf> {
        self.current_file.as_ref()
    }

    fn has_schema_conflicts(&self) -> bool {
        !self.backend.schema_conflicts().is_empty()
    }

    /// Replace the runtime settings. Takes effect on the next trigger.
    ///
    /// The output format, the compression and the decimation parameters are
    /// fixed for the session; changes to them are ignored.
    pub fn update_settings(&mut self, settings: DaqSettings) {
        if !settings
            .output_format
            .eq_ignore_ascii_case(&self.settings.output_format)
        {
            warn!(
                "[{}] Output format cannot change while running, keeping '{}'",
                self.settings.name, self.settings.output_format
            );
        }
        if !settings
            .compression
            .eq_ignore_ascii_case(&self.settings.compression)
        {
            warn!(
                "[{}] Compression cannot change while running, keeping '{}'",
                self.settings.name, self.settings.compression
            );
        }
        if settings.decimation_factor != self.settings.decimation_factor
            || settings.decimation_threshold != self.settings.decimation_threshold
        {
            warn!(
                "[{}] Decimation settings are fixed for the session",
                self.settings.name
            );
        }

        self.ring
            .set_limits(settings.max_files, settings.entries_per_file);
        self.backend
            .set_flush_after_entries(settings.flush_after_entries);

        let DaqSettings {
            name,
            enable,
            directory,
            max_files,
            entries_per_file,
            flush_after_entries,
            ..
        } = settings;
        self.settings.name = name;
        self.settings.directory = directory;
        self.settings.max_files = max_files;
        self.settings.entries_per_file = entries_per_file;
        self.settings.flush_after_entries = flush_after_entries;
        self.set_enable(enable);
    }

    pub fn set_enable(&mut self, enable: bool) {
        if enable == self.settings.enable {
            return;
        }
        self.settings.enable = enable;
        info!(
            "[{}] DAQ {}",
            self.settings.name,
            if enable { "enabled" } else { "disabled" }
        );
        if enable && self.state == DaqState::Idle {
            self.state = DaqState::Opening;
        }
    }

    /// Write one event holding the initial values before the first trigger,
    /// for backends that record the starting state. Trigger diagnostics are
    /// left untouched.
    pub fn record_initial_values(&mut self) -> DaqState {
        if !self.settings.enable || !self.backend.records_initial_values() {
            return self.state;
        }
        if !self.backend.is_open() && !self.try_open() {
            return self.state;
        }
        debug!("[{}] Recording initial values", self.settings.name);
        self.write_event(Utc::now());
        self.state
    }

    /// Process one trigger. Storage errors are handled here and reported
    /// through the error flag; the returned state is the state after the
    /// trigger.
    pub fn process_trigger(&mut self, event: TriggerEvent) -> DaqState {
        self.apply_updates(event.updates);
        self.diagnostics.on_trigger(&event.trigger, event.timestamp);

        if !self.settings.enable {
            self.process_disabled();
            return self.state;
        }

        if !self.backend.is_open() && !self.try_open() {
            return self.state;
        }

        self.write_event(event.timestamp);
        self.state
    }

    fn process_disabled(&mut self) {
        if self.backend.is_open() {
            self.close_file();
            self.ring.reset_entries();
            self.ring.advance();
        }
        self.diagnostics.clear_error();
        self.open_error_reported = false;
        self.state = DaqState::Idle;

        if self
            .ring
            .update_daq_path(false, &self.settings.directory)
        {
            // a new directory has its own buffer index
            self.buffer_resolved = false;
        }
    }

    /// Open the next ring-buffer file. Returns false (state ErrorOpen) when
    /// the open failed.
    fn try_open(&mut self) -> bool {
        if !self.buffer_resolved {
            self.buffer_resolved = self.ring.resolve_on_first_trigger();
        }

        // an unknown index could overwrite a newer buffer
        let result = if self.buffer_resolved {
            self.ring
                .next_buffer()
                .and_then(|path| self.backend.open(&path).map(|_| path))
        } else {
            Err(DaqError::io(
                self.ring.directory(),
                std::io::Error::other("ring buffer index could not be resolved"),
            ))
        };

        match result {
            Ok(path) => {
                if self.open_error_reported {
                    info!(
                        "[{}] DAQ file opened after earlier failure: {}",
                        self.settings.name,
                        path.display()
                    );
                } else {
                    info!("[{}] Opened DAQ file {}", self.settings.name, path.display());
                }
                self.open_error_reported = false;
                self.diagnostics.error_flag = self.has_schema_conflicts();
                self.current_file = Some(path);
                self.ring.reset_entries();
                self.state = DaqState::Recording;
                true
            }
            Err(e) => {
                if self.open_error_reported {
                    debug!("[{}] DAQ file open retry failed: {}", self.settings.name, e);
                } else {
                    error!(
                        "[{}] DAQ file could not be opened, retrying on every trigger: {}",
                        self.settings.name, e
                    );
                    self.open_error_reported = true;
                }
                self.diagnostics.set_error();
                self.state = DaqState::ErrorOpen;
                false
            }
        }
    }

    fn write_event(&mut self, timestamp: DateTime<Utc>) {
        let snapshot = Snapshot::capture(&self.layout, &self.current, timestamp, &self.diagnostics);

        if let Err(e) = self.backend.write_event(&self.layout, &snapshot) {
            error!(
                "[{}] Writing DAQ event failed, closing {}: {}",
                self.settings.name,
                self.current_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                e
            );
            self.close_file();
            self.ring.reset_entries();
            self.ring.advance();
            self.diagnostics.set_error();
            self.open_error_reported = true;
            self.state = DaqState::ErrorOpen;
            return;
        }

        self.total_events += 1;
        self.ring.record_entry();
        if self.has_schema_conflicts() {
            self.diagnostics.set_error();
        }

        if self.ring.max_entries_reached() {
            debug!(
                "[{}] DAQ file full, next trigger opens buffer {}",
                self.settings.name,
                self.ring.current_buffer()
            );
            self.close_file();
            self.state = DaqState::Rotating;
        } else {
            self.state = DaqState::Recording;
        }
    }

    fn close_file(&mut self) {
        if let Err(e) = self.backend.close() {
            warn!("[{}] Closing DAQ file failed: {}", self.settings.name, e);
        }
        if let Some(path) = self.current_file.take() {
            debug!("[{}] Closed DAQ file {}", self.settings.name, path.display());
        }
    }

    fn apply_updates(&mut self, updates: Vec<ValueUpdate>) {
        for update in updates {
            let Some(handle) = self.layout.find(&update.name) else {
                if self.ignored_updates.insert(update.name.clone()) {
                    debug!(
                        "[{}] Ignoring update of unregistered variable '{}'",
                        self.settings.name, update.name
                    );
                }
                continue;
            };
            let Some(entry) = self.layout.entry(handle) else {
                continue;
            };
            let expected = entry.variable.value_type;
            if update.value.value_type() != expected {
                if self.ignored_updates.insert(update.name.clone()) {
                    warn!(
                        "[{}] Ignoring {} value for '{}' declared as {}",
                        self.settings.name,
                        update.value.value_type(),
                        entry.variable.qualified_name,
                        expected
                    );
                }
                continue;
            }
            let element_count = entry.variable.element_count;
            if let Some(slot) = self.current.get_mut(handle.index()) {
                *slot = update.value.resized(element_count);
            }
        }
    }

    /// Close any open file. Called when the source ends.
    pub fn shutdown(&mut self) {
        if self.backend.is_open() {
            info!("[{}] Shutting down, closing DAQ file", self.settings.name);
            self.close_file();
            self.ring.reset_entries();
        }
        self.state = DaqState::Idle;
    }

    pub fn status(&self) -> DaqStatus {
        let ring = self.ring.state();
        DaqStatus {
            name: self.settings.name.clone(),
            state: self.state,
            current_directory: ring.current_directory.display().to_string(),
            current_buffer: ring.current_buffer,
            current_entry: ring.current_entry,
            error: self.diagnostics.error_flag,
            missed_triggers: self.diagnostics.missed_trigger_count,
            trigger_period_ms: self.diagnostics.trigger_period_ms,
            total_events: self.total_events,
            current_file: self
                .current_file
                .as_ref()
                .map(|p| p.display().to_string()),
            dropped_fields: self
                .backend
                .schema_conflicts()
                .iter()
                .map(|c| c.variable.clone())
                .collect(),
        }
    }

    /// Consume triggers until the source ends, then close the open file.
    ///
    /// Settings published on `settings` are picked up before the next
    /// trigger; the status is published on `status` after every trigger.
    pub async fn run<S>(
        &mut self,
        source: &mut S,
        mut settings: watch::Receiver<DaqSettings>,
        status: watch::Sender<DaqStatus>,
    ) -> DaqStatus
    where
        S: DataSource + ?Sized,
    {
        self.record_initial_values();
        status.send_replace(self.status());

        while let Some(event) = source.next_trigger().await {
            if settings.has_changed().unwrap_or(false) {
                let updated = settings.borrow_and_update().clone();
                self.update_settings(updated);
            }
            self.process_trigger(event);
            status.send_replace(self.status());
        }

        info!("[{}] Trigger source ended", self.settings.name);
        self.shutdown();
        let final_status = self.status();
        status.send_replace(final_status.clone());
        final_status
    }
}

impl Drop for TriggerEngine {
    fn drop(&mut self) {
        if self.backend.is_open() {
            self.close_file();
        }
    }
}
