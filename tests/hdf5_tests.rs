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

// HDF5 output read back with the hdf5 crate
#![cfg(feature = "storage_hdf5")]

use chrono::{Duration, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use udaq_recorder::{
    DaqSettings, DecimationPolicy, TriggerEngine, TriggerEvent, ValueType, VariableRegistry,
};

#[test]
fn test_events_become_groups() {
    let dir = TempDir::new().unwrap();
    let mut registry = VariableRegistry::new();
    registry.register("/DAQ/A", ValueType::Int32, 1, "").unwrap();
    registry.register("/DAQ/sub/B", ValueType::Float64, 10, "").unwrap();
    let layout = registry.finalize(&DecimationPolicy::new(2, 5)).unwrap();

    let settings = DaqSettings {
        directory: dir.path().display().to_string(),
        output_format: "hdf5".to_string(),
        entries_per_file: 3,
        ..Default::default()
    };
    let mut engine = TriggerEngine::new(settings, layout).unwrap();

    let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    for i in 0..3i64 {
        let b: Vec<f64> = (0..10).map(|x| (10 * i + x) as f64).collect();
        let event = TriggerEvent::new(i * 2, base + Duration::milliseconds(100 * i))
            .with_value("/DAQ/A", i as i32)
            .with_value("/DAQ/sub/B", b);
        engine.process_trigger(event);
    }
    engine.shutdown();

    let files: Vec<PathBuf> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map(|e| e == "h5").unwrap_or(false))
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].to_str().unwrap().ends_with("_buffer0000.h5"));

    let file = hdf5::File::open(&files[0]).unwrap();
    let mut events = file.member_names().unwrap();
    events.sort();
    assert_eq!(events.len(), 3);

    let last = &events[2];
    let a = file
        .dataset(&format!("{}/DAQ/A", last))
        .unwrap()
        .read_raw::<f32>()
        .unwrap();
    assert_eq!(a, vec![2.0]);

    let b = file
        .dataset(&format!("{}/DAQ/sub/B", last))
        .unwrap()
        .read_raw::<f32>()
        .unwrap();
    assert_eq!(b, vec![20.0, 22.0, 24.0, 26.0, 28.0]);

    // triggers 0, 2, 4: one missed between each
    let missed = file
        .dataset(&format!("{}/MicroDAQ/nMissedTriggers", last))
        .unwrap()
        .read_raw::<f32>()
        .unwrap();
    assert_eq!(missed, vec![1.0]);
    let period = file
        .dataset(&format!("{}/MicroDAQ/triggerPeriod", last))
        .unwrap()
        .read_raw::<f32>()
        .unwrap();
    assert_eq!(period, vec![100.0]);
}
