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

//! Columnar backend writing Apache Arrow IPC files.
//!
//! One table per file, one row per event. Each variable is a column named
//! after its path with '/' replaced by '.' (`/DAQ/out` -> `DAQ.out`). Scalars
//! keep their native type, arrays become fixed-size lists of the decimated
//! length. `timeStamp`, `MicroDAQ.nMissedTriggers` and
//! `MicroDAQ.triggerPeriod` are appended to every row.
//!
//! Rows are buffered and written as one record batch every
//! `flush_after_entries` events (when non-zero) and at close. Batch buffers
//! are compressed with zstd unless configured otherwise.

use arrow::array::{
    ArrayRef, BooleanArray, FixedSizeListArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, StringArray, TimestampMicrosecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef, TimeUnit};
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use arrow::ipc::CompressionType;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::backend::{
    detect_schema_conflicts, EventHandle, SchemaConflict, StorageBackend, DIAGNOSTICS_GROUP,
    MISSED_TRIGGERS_FIELD, TRIGGER_PERIOD_FIELD,
};
use crate::error::{DaqError, Result};
use crate::registry::{DecimationEntry, SessionLayout, VariableHandle};
use crate::value::{Value, ValueType};

pub const COLUMNAR_SUFFIX: &str = ".arrow";
pub const TIMESTAMP_COLUMN: &str = "timeStamp";

/// `/DAQ/sub/out` -> `DAQ.sub.out`
pub fn column_name(qualified_name: &str) -> String {
    qualified_name
        .replace('/', ".")
        .trim_start_matches('.')
        .to_string()
}

/// Buffer compression named by `compression` (case-insensitive)
pub fn parse_compression(compression: &str) -> Result<Option<CompressionType>> {
    match compression.to_lowercase().as_str() {
        "zstd" => Ok(Some(CompressionType::ZSTD)),
        "lz4" => Ok(Some(CompressionType::LZ4_FRAME)),
        "none" | "" => Ok(None),
        _ => Err(DaqError::UnknownCompression(compression.to_string())),
    }
}

pub fn missed_triggers_column() -> String {
    format!("{}.{}", DIAGNOSTICS_GROUP, MISSED_TRIGGERS_FIELD)
}

pub fn trigger_period_column() -> String {
    format!("{}.{}", DIAGNOSTICS_GROUP, TRIGGER_PERIOD_FIELD)
}

fn element_type(value_type: ValueType) -> DataType {
    match value_type {
        ValueType::Int8 => DataType::Int8,
        ValueType::UInt8 => DataType::UInt8,
        ValueType::Int16 => DataType::Int16,
        ValueType::UInt16 => DataType::UInt16,
        ValueType::Int32 => DataType::Int32,
        ValueType::UInt32 => DataType::UInt32,
        ValueType::Int64 => DataType::Int64,
        ValueType::UInt64 => DataType::UInt64,
        ValueType::Float32 => DataType::Float32,
        ValueType::Float64 => DataType::Float64,
        ValueType::Bool => DataType::Boolean,
        ValueType::String => DataType::Utf8,
    }
}

fn item_field(value_type: ValueType) -> FieldRef {
    Arc::new(Field::new("item", element_type(value_type), false))
}

#[derive(Debug, Clone)]
struct ColumnSpec {
    name: String,
    value_type: ValueType,
    length: usize,
}

impl ColumnSpec {
    fn data_type(&self) -> DataType {
        if self.length == 1 {
            element_type(self.value_type)
        } else {
            DataType::FixedSizeList(item_field(self.value_type), self.length as i32)
        }
    }

    /// One array holding the column values of all buffered rows
    fn build(&self, values: Vec<Value>) -> Result<ArrayRef> {
        let flat = flatten(self.value_type, values)?;
        if self.length == 1 {
            return Ok(flat);
        }
        let list = FixedSizeListArray::try_new(
            item_field(self.value_type),
            self.length as i32,
            flat,
            None,
        )?;
        Ok(Arc::new(list))
    }
}

// Concatenate the element vectors of one variant into a single arrow array.
macro_rules! flatten_as {
    ($values:expr, $variant:ident, $array:ty) => {{
        let mut out = Vec::new();
        for value in $values {
            match value {
                Value::$variant(v) => out.extend(v),
                other => {
                    return Err(DaqError::backend(format!(
                        "mixed column types: {} in a {} column",
                        other.value_type(),
                        stringify!($variant)
                    )))
                }
            }
        }
        Arc::new(<$array>::from(out)) as ArrayRef
    }};
}

fn flatten(value_type: ValueType, values: Vec<Value>) -> Result<ArrayRef> {
    Ok(match value_type {
        ValueType::Int8 => flatten_as!(values, Int8, Int8Array),
        ValueType::UInt8 => flatten_as!(values, UInt8, UInt8Array),
        ValueType::Int16 => flatten_as!(values, Int16, Int16Array),
        ValueType::UInt16 => flatten_as!(values, UInt16, UInt16Array),
        ValueType::Int32 => flatten_as!(values, Int32, Int32Array),
        ValueType::UInt32 => flatten_as!(values, UInt32, UInt32Array),
        ValueType::Int64 => flatten_as!(values, Int64, Int64Array),
        ValueType::UInt64 => flatten_as!(values, UInt64, UInt64Array),
        ValueType::Float32 => flatten_as!(values, Float32, Float32Array),
        ValueType::Float64 => flatten_as!(values, Float64, Float64Array),
        ValueType::Bool => flatten_as!(values, Bool, BooleanArray),
        ValueType::String => flatten_as!(values, String, StringArray),
    })
}

struct PendingRow {
    values: Vec<Option<Value>>,
    timestamp_us: i64,
    missed_triggers: i64,
    trigger_period_ms: i64,
}

pub struct ColumnarBackend {
    layout: Arc<SessionLayout>,
    flush_after_entries: u32,
    compression: Option<CompressionType>,
    conflicts: Vec<SchemaConflict>,
    columns: Vec<ColumnSpec>,
    column_index: HashMap<VariableHandle, usize>,
    schema: SchemaRef,
    path: Option<PathBuf>,
    /// Created file, until the first batch turns it into a writer
    file: Option<File>,
    writer: Option<FileWriter<File>>,
    rows: Vec<PendingRow>,
    events_in_file: u64,
}

impl ColumnarBackend {
    pub fn new(layout: Arc<SessionLayout>, flush_after_entries: u32) -> Self {
        let reserved = vec![
            TIMESTAMP_COLUMN.to_string(),
            missed_triggers_column(),
            trigger_period_column(),
        ];
        let conflicts =
            detect_schema_conflicts(&layout, &reserved, |v| column_name(&v.qualified_name));

        let mut columns = Vec::new();
        let mut column_index = HashMap::new();
        for entry in layout.entries() {
            if conflicts.iter().any(|c| c.handle == entry.handle) {
                continue;
            }
            column_index.insert(entry.handle, columns.len());
            columns.push(ColumnSpec {
                name: column_name(&entry.variable.qualified_name),
                value_type: entry.variable.value_type,
                length: entry.sampled_length,
            });
        }

        let mut fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.data_type(), false))
            .collect();
        fields.push(Field::new(
            TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ));
        fields.push(Field::new(missed_triggers_column(), DataType::Int64, false));
        fields.push(Field::new(trigger_period_column(), DataType::Int64, false));

        Self {
            layout,
            flush_after_entries,
            compression: Some(CompressionType::ZSTD),
            conflicts,
            columns,
            column_index,
            schema: Arc::new(Schema::new(fields)),
            path: None,
            file: None,
            writer: None,
            rows: Vec::new(),
            events_in_file: 0,
        }
    }

    pub fn with_compression(mut self, compression: Option<CompressionType>) -> Self {
        self.compression = compression;
        self
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    fn is_file_open(&self) -> bool {
        self.file.is_some() || self.writer.is_some()
    }

    fn current_row(&mut self) -> Result<&mut PendingRow> {
        self.rows
            .last_mut()
            .ok_or_else(|| DaqError::backend("no event in progress"))
    }

    /// Write buffered rows as one record batch
    fn write_pending(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.rows);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        for (i, spec) in self.columns.iter().enumerate() {
            let values = rows
                .iter()
                .map(|row| {
                    row.values[i]
                        .clone()
                        .unwrap_or_else(|| Value::zeroed(spec.value_type, spec.length))
                })
                .collect();
            arrays.push(spec.build(values)?);
        }
        arrays.push(Arc::new(TimestampMicrosecondArray::from(
            rows.iter().map(|r| r.timestamp_us).collect::<Vec<_>>(),
        )));
        arrays.push(Arc::new(Int64Array::from(
            rows.iter().map(|r| r.missed_triggers).collect::<Vec<_>>(),
        )));
        arrays.push(Arc::new(Int64Array::from(
            rows.iter().map(|r| r.trigger_period_ms).collect::<Vec<_>>(),
        )));

        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;

        if self.writer.is_none() {
            let file = self
                .file
                .take()
                .ok_or_else(|| DaqError::backend("no file open"))?;
            let options = IpcWriteOptions::default().try_with_compression(self.compression)?;
            self.writer = Some(FileWriter::try_new_with_options(
                file,
                &self.schema,
                options,
            )?);
            debug!("Created columnar table with {} columns", self.schema.fields().len());
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }
        debug!("Wrote record batch of {} rows", rows.len());
        Ok(())
    }
}

impl StorageBackend for ColumnarBackend {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.close()?;
        let file = File::create(path).map_err(|e| DaqError::io(path, e))?;
        debug!("Opened columnar DAQ file {}", path.display());
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn begin_event(&mut self, timestamp: DateTime<Utc>) -> Result<EventHandle> {
        if !self.is_file_open() {
            return Err(DaqError::backend("no file open"));
        }
        self.rows.push(PendingRow {
            values: vec![None; self.columns.len()],
            timestamp_us: timestamp.timestamp_micros(),
            missed_triggers: 0,
            trigger_period_ms: 0,
        });
        Ok(EventHandle {
            sequence: self.events_in_file,
            name: self.events_in_file.to_string(),
            timestamp,
        })
    }

    fn write_field(
        &mut self,
        _event: &EventHandle,
        entry: &DecimationEntry,
        value: &Value,
    ) -> Result<()> {
        let Some(&index) = self.column_index.get(&entry.handle) else {
            return Err(DaqError::SchemaConflict {
                variable: entry.variable.qualified_name.clone(),
                name: column_name(&entry.variable.qualified_name),
            });
        };
        if value.value_type() != entry.variable.value_type {
            return Err(DaqError::TypeMismatch {
                name: entry.variable.qualified_name.clone(),
                expected: entry.variable.value_type,
                actual: value.value_type(),
            });
        }
        let length = self.columns[index].length;
        let value = value.clone().resized(length);
        self.current_row()?.values[index] = Some(value);
        Ok(())
    }

    fn write_diagnostics(
        &mut self,
        _event: &EventHandle,
        missed_triggers: u64,
        trigger_period_ms: i64,
    ) -> Result<()> {
        let row = self.current_row()?;
        row.missed_triggers = i64::try_from(missed_triggers).unwrap_or(i64::MAX);
        row.trigger_period_ms = trigger_period_ms;
        Ok(())
    }

    fn end_event(&mut self, _event: EventHandle) -> Result<()> {
        self.events_in_file += 1;
        if self.flush_after_entries > 0 && self.rows.len() >= self.flush_after_entries as usize {
            self.write_pending()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut result = if self.is_file_open() {
            self.write_pending()
        } else {
            Ok(())
        };
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.finish() {
                result = result.and(Err(e.into()));
            }
        }
        if let Some(path) = self.path.take() {
            debug!(
                "Closed columnar DAQ file {} ({} events)",
                path.display(),
                self.events_in_file
            );
        }
        self.file = None;
        self.rows.clear();
        self.events_in_file = 0;
        result
    }

    fn is_open(&self) -> bool {
        self.is_file_open()
    }

    fn schema_conflicts(&self) -> &[SchemaConflict] {
        &self.conflicts
    }

    fn suffix(&self) -> &str {
        COLUMNAR_SUFFIX
    }

    fn backend_type(&self) -> &str {
        "arrow"
    }

    fn set_flush_after_entries(&mut self, flush_after_entries: u32) {
        self.flush_after_entries = flush_after_entries;
    }
}
