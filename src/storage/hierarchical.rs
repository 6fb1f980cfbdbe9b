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

//! Hierarchical (HDF5 layout) backend.
//!
//! Layout of one file:
//!
//! ```text
//! /<YYYY-MM-DD HH:MM:SS.mmm>/            one group per event
//!     <variable path groups>/<name>      float32 dataset per variable
//!     MicroDAQ/nMissedTriggers           float32[1]
//!     MicroDAQ/triggerPeriod             float32[1]
//! ```
//!
//! All values are narrowed to 32-bit floats. The group/dataset operations go
//! through [`GroupStore`] so the encoding does not depend on the HDF5 C
//! library; [`Hdf5Store`] is the real store, built with `storage_hdf5`.

use chrono::{DateTime, Local, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::backend::{
    detect_schema_conflicts, EventHandle, SchemaConflict, StorageBackend, DIAGNOSTICS_GROUP,
    MISSED_TRIGGERS_FIELD, TRIGGER_PERIOD_FIELD,
};
use crate::error::{DaqError, Result};
use crate::registry::{DecimationEntry, SessionLayout};
use crate::value::Value;

pub const HIERARCHICAL_SUFFIX: &str = ".h5";

/// Minimal group/dataset file interface
pub trait GroupStore: Sized + Send {
    /// Create (truncate) the file at `path`
    fn create(path: &Path) -> Result<Self>;

    /// Create a group; its parent must exist
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Create a one-dimensional float32 dataset holding `values`
    fn write_dataset(&mut self, path: &str, values: &[f32]) -> Result<()>;

    fn close(self) -> Result<()>;
}

pub struct HierarchicalBackend<S: GroupStore> {
    layout: Arc<SessionLayout>,
    /// Sub-groups created inside every event group, parents first
    event_groups: Vec<String>,
    conflicts: Vec<SchemaConflict>,
    store: Option<S>,
    event_names: HashSet<String>,
    events_in_file: u64,
}

impl<S: GroupStore> HierarchicalBackend<S> {
    pub fn new(layout: Arc<SessionLayout>) -> Self {
        let diagnostics_group = format!("/{}", DIAGNOSTICS_GROUP);

        let mut event_groups: Vec<String> = layout.group_paths().to_vec();
        if !event_groups.contains(&diagnostics_group) {
            event_groups.push(diagnostics_group.clone());
            event_groups.sort();
        }

        // Datasets may not reuse the path of a group or a diagnostic dataset
        let mut reserved = event_groups.clone();
        reserved.push(format!("{}/{}", diagnostics_group, MISSED_TRIGGERS_FIELD));
        reserved.push(format!("{}/{}", diagnostics_group, TRIGGER_PERIOD_FIELD));
        let conflicts = detect_schema_conflicts(&layout, &reserved, |v| v.qualified_name.clone());

        Self {
            layout,
            event_groups,
            conflicts,
            store: None,
            event_names: HashSet::new(),
            events_in_file: 0,
        }
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    fn store_mut(&mut self) -> Result<&mut S> {
        self.store
            .as_mut()
            .ok_or_else(|| DaqError::backend("no file open"))
    }

    /// Millisecond timestamp in local time, made unique within the file
    fn event_name(&mut self, timestamp: DateTime<Utc>) -> String {
        let base = timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();
        let mut name = base.clone();
        let mut n = 1;
        while self.event_names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.event_names.insert(name.clone());
        name
    }
}

impl<S: GroupStore> StorageBackend for HierarchicalBackend<S> {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.close()?;
        let store = S::create(path)?;
        debug!("Opened hierarchical DAQ file {}", path.display());
        self.store = Some(store);
        Ok(())
    }

    fn begin_event(&mut self, timestamp: DateTime<Utc>) -> Result<EventHandle> {
        if self.store.is_none() {
            return Err(DaqError::backend("no file open"));
        }
        let name = self.event_name(timestamp);
        let groups: Vec<String> = self
            .event_groups
            .iter()
            .map(|g| format!("/{}{}", name, g))
            .collect();

        let store = self.store_mut()?;
        store.create_group(&format!("/{}", name))?;
        for group in &groups {
            store.create_group(group)?;
        }

        Ok(EventHandle {
            sequence: self.events_in_file,
            name,
            timestamp,
        })
    }

    fn write_field(
        &mut self,
        event: &EventHandle,
        entry: &DecimationEntry,
        value: &Value,
    ) -> Result<()> {
        let path = format!("/{}{}", event.name, entry.variable.qualified_name);
        let values = value.to_f32_vec();
        self.store_mut()?.write_dataset(&path, &values)
    }

    fn write_diagnostics(
        &mut self,
        event: &EventHandle,
        missed_triggers: u64,
        trigger_period_ms: i64,
    ) -> Result<()> {
        let group = format!("/{}/{}", event.name, DIAGNOSTICS_GROUP);
        let store = self.store_mut()?;
        store.write_dataset(
            &format!("{}/{}", group, MISSED_TRIGGERS_FIELD),
            &[missed_triggers as f32],
        )?;
        store.write_dataset(
            &format!("{}/{}", group, TRIGGER_PERIOD_FIELD),
            &[trigger_period_ms as f32],
        )
    }

    fn end_event(&mut self, _event: EventHandle) -> Result<()> {
        self.events_in_file += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.event_names.clear();
        self.events_in_file = 0;
        match self.store.take() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.store.is_some()
    }

    fn schema_conflicts(&self) -> &[SchemaConflict] {
        &self.conflicts
    }

    fn suffix(&self) -> &str {
        HIERARCHICAL_SUFFIX
    }

    fn backend_type(&self) -> &str {
        "hdf5"
    }

    fn records_initial_values(&self) -> bool {
        true
    }
}

#[cfg(feature = "storage_hdf5")]
pub use self::hdf5_store::Hdf5Store;

/// Hierarchical backend writing real HDF5 files
#[cfg(feature = "storage_hdf5")]
pub type Hdf5Backend = HierarchicalBackend<Hdf5Store>;

#[cfg(feature = "storage_hdf5")]
mod hdf5_store {
    use super::GroupStore;
    use crate::error::{DaqError, Result};
    use std::path::Path;

    pub struct Hdf5Store {
        file: hdf5::File,
    }

    impl GroupStore for Hdf5Store {
        fn create(path: &Path) -> Result<Self> {
            let file = hdf5::File::create(path)
                .map_err(|e| DaqError::io(path, std::io::Error::other(e.to_string())))?;
            Ok(Self { file })
        }

        fn create_group(&mut self, path: &str) -> Result<()> {
            self.file.create_group(path)?;
            Ok(())
        }

        fn write_dataset(&mut self, path: &str, values: &[f32]) -> Result<()> {
            self.file
                .new_dataset::<f32>()
                .shape([values.len()])
                .create(path)?
                .write(values)?;
            Ok(())
        }

        fn close(self) -> Result<()> {
            self.file.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimation::DecimationPolicy;
    use crate::diagnostics::DiagnosticsState;
    use crate::registry::VariableRegistry;
    use crate::snapshot::Snapshot;
    use crate::value::ValueType;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Group store dumping its content as JSON on close
    #[derive(Default, Serialize, Deserialize)]
    struct JsonStore {
        #[serde(skip)]
        path: PathBuf,
        groups: Vec<String>,
        datasets: BTreeMap<String, Vec<f32>>,
    }

    impl JsonStore {
        fn parent_exists(&self, path: &str) -> bool {
            match path.rfind('/') {
                Some(0) => true,
                Some(idx) => self.groups.iter().any(|g| g == &path[..idx]),
                None => false,
            }
        }

        fn load(path: &Path) -> JsonStore {
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
        }
    }

    impl GroupStore for JsonStore {
        fn create(path: &Path) -> Result<Self> {
            std::fs::File::create(path).map_err(|e| DaqError::io(path, e))?;
            Ok(JsonStore {
                path: path.to_path_buf(),
                ..Default::default()
            })
        }

        fn create_group(&mut self, path: &str) -> Result<()> {
            if !self.parent_exists(path) || self.groups.iter().any(|g| g == path) {
                return Err(DaqError::backend(format!("cannot create group {}", path)));
            }
            self.groups.push(path.to_string());
            Ok(())
        }

        fn write_dataset(&mut self, path: &str, values: &[f32]) -> Result<()> {
            if !self.parent_exists(path) || self.datasets.contains_key(path) {
                return Err(DaqError::backend(format!("cannot create dataset {}", path)));
            }
            self.datasets.insert(path.to_string(), values.to_vec());
            Ok(())
        }

        fn close(self) -> Result<()> {
            let json = serde_json::to_string(&self).map_err(DaqError::backend)?;
            std::fs::write(&self.path, json).map_err(|e| DaqError::io(&self.path, e))
        }
    }

    fn layout() -> Arc<SessionLayout> {
        let mut registry = VariableRegistry::new();
        registry.register("/DAQ/A", ValueType::Int32, 1, "").unwrap();
        registry.register("/DAQ/sub/B", ValueType::Float64, 10, "").unwrap();
        registry.register("/flag", ValueType::Bool, 2, "").unwrap();
        registry.finalize(&DecimationPolicy::new(2, 5)).unwrap()
    }

    fn snapshot(layout: &SessionLayout, a: i32, timestamp: DateTime<Utc>) -> Snapshot {
        let current = vec![
            Value::from(a),
            Value::from((0..10).map(|x| x as f64 + 0.5).collect::<Vec<_>>()),
            Value::from(vec![true, false]),
        ];
        let mut diag = DiagnosticsState::new();
        diag.missed_trigger_count = 2;
        diag.trigger_period_ms = 40;
        Snapshot::capture(layout, &current, timestamp, &diag)
    }

    #[test]
    fn test_engine_records_initial_values_first() {
        use crate::config::DaqSettings;
        use crate::engine::TriggerEngine;
        use crate::source::TriggerEvent;

        let dir = TempDir::new().unwrap();
        let layout = layout();
        let settings = DaqSettings {
            directory: dir.path().display().to_string(),
            output_format: "hdf5".to_string(),
            ..Default::default()
        };
        let backend = Box::new(HierarchicalBackend::<JsonStore>::new(layout.clone()));
        let mut engine = TriggerEngine::with_backend(settings, layout, backend);

        engine.record_initial_values();
        let path = engine.current_file().unwrap().clone();
        assert!(path.to_str().unwrap().ends_with("_buffer0000.h5"));

        let later = Utc::now() + chrono::Duration::seconds(1);
        engine.process_trigger(TriggerEvent::new(0i64, later).with_value("/DAQ/A", 5i32));
        engine.shutdown();

        let store = JsonStore::load(&path);
        let a: Vec<f32> = store
            .datasets
            .iter()
            .filter(|(name, _)| name.ends_with("/DAQ/A"))
            .map(|(_, values)| values[0])
            .collect();
        assert_eq!(a, vec![0.0, 5.0]);
        assert_eq!(engine.status().total_events, 2);
        assert_eq!(engine.diagnostics().trigger_period_ms, 0);
    }

    #[test]
    fn test_event_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.h5");
        let layout = layout();
        let mut backend = HierarchicalBackend::<JsonStore>::new(layout.clone());
        assert!(backend.schema_conflicts().is_empty());

        backend.open(&path).unwrap();
        assert!(backend.is_open());
        let ts = Utc::now();
        backend.write_event(&layout, &snapshot(&layout, 16_777_217, ts)).unwrap();
        backend.close().unwrap();
        assert!(!backend.is_open());

        let store = JsonStore::load(&path);
        let event = format!(
            "/{}",
            ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f")
        );
        assert_eq!(
            store.groups,
            vec![
                event.clone(),
                format!("{}/DAQ", event),
                format!("{}/DAQ/sub", event),
                format!("{}/MicroDAQ", event),
            ]
        );
        // float32 narrowing of int32 is lossy above 2^24
        assert_eq!(store.datasets[&format!("{}/DAQ/A", event)], vec![16_777_216.0]);
        assert_eq!(
            store.datasets[&format!("{}/DAQ/sub/B", event)],
            vec![0.5, 2.5, 4.5, 6.5, 8.5]
        );
        assert_eq!(store.datasets[&format!("{}/flag", event)], vec![1.0, 0.0]);
        assert_eq!(
            store.datasets[&format!("{}/MicroDAQ/nMissedTriggers", event)],
            vec![2.0]
        );
        assert_eq!(
            store.datasets[&format!("{}/MicroDAQ/triggerPeriod", event)],
            vec![40.0]
        );
    }

    #[test]
    fn test_same_millisecond_events_get_unique_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.h5");
        let layout = layout();
        let mut backend = HierarchicalBackend::<JsonStore>::new(layout.clone());
        backend.open(&path).unwrap();

        let ts = Utc::now();
        backend.write_event(&layout, &snapshot(&layout, 1, ts)).unwrap();
        backend.write_event(&layout, &snapshot(&layout, 2, ts)).unwrap();
        backend.close().unwrap();

        let store = JsonStore::load(&path);
        let event = format!(
            "/{}",
            ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f")
        );
        assert_eq!(store.datasets[&format!("{}/DAQ/A", event)], vec![1.0]);
        assert_eq!(store.datasets[&format!("{}_1/DAQ/A", event)], vec![2.0]);
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("events.h5");
        let mut backend = HierarchicalBackend::<JsonStore>::new(layout());
        let err = backend.open(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TransientIo);
        assert!(!backend.is_open());
    }

    #[test]
    fn test_variable_shadowing_group_is_dropped() {
        let mut registry = VariableRegistry::new();
        registry.register("/a/b", ValueType::Int32, 1, "").unwrap();
        let shadow = registry.register("/a", ValueType::Int32, 1, "").unwrap();
        let diag = registry
            .register("/MicroDAQ/triggerPeriod", ValueType::Int32, 1, "")
            .unwrap();
        let layout = registry.finalize(&DecimationPolicy::default()).unwrap();

        let backend = HierarchicalBackend::<JsonStore>::new(layout);
        let dropped: Vec<_> = backend.schema_conflicts().iter().map(|c| c.handle).collect();
        assert_eq!(dropped, vec![shadow, diag]);
    }

    #[test]
    fn test_write_without_open_fails() {
        let layout = layout();
        let mut backend = HierarchicalBackend::<JsonStore>::new(layout.clone());
        let err = backend
            .write_event(&layout, &snapshot(&layout, 1, Utc::now()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendWrite);
        assert_eq!(backend.suffix(), ".h5");
    }
}
