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

//! Typed values recorded by the DAQ.
//!
//! Every variable value is held as an array; a scalar is an array of length 1.
//! [`Value`] is a tagged union over all supported element types so a snapshot
//! can keep heterogeneous variables in one ordered collection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimation;

/// Element type of a source variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Int8 => "int8",
            ValueType::UInt8 => "uint8",
            ValueType::Int16 => "int16",
            ValueType::UInt16 => "uint16",
            ValueType::Int32 => "int32",
            ValueType::UInt32 => "uint32",
            ValueType::Int64 => "int64",
            ValueType::UInt64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Bool => "bool",
            ValueType::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueType::Bool | ValueType::String)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of one variable
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

// Evaluate `$body` with `$v` bound to the inner vector, whatever the variant.
macro_rules! with_values {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            Value::Int8($v) => $body,
            Value::UInt8($v) => $body,
            Value::Int16($v) => $body,
            Value::UInt16($v) => $body,
            Value::Int32($v) => $body,
            Value::UInt32($v) => $body,
            Value::Int64($v) => $body,
            Value::UInt64($v) => $body,
            Value::Float32($v) => $body,
            Value::Float64($v) => $body,
            Value::Bool($v) => $body,
            Value::String($v) => $body,
        }
    };
}

// Same as `with_values`, but rewraps the result in the same variant.
macro_rules! map_values {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            Value::Int8($v) => Value::Int8($body),
            Value::UInt8($v) => Value::UInt8($body),
            Value::Int16($v) => Value::Int16($body),
            Value::UInt16($v) => Value::UInt16($body),
            Value::Int32($v) => Value::Int32($body),
            Value::UInt32($v) => Value::UInt32($body),
            Value::Int64($v) => Value::Int64($body),
            Value::UInt64($v) => Value::UInt64($body),
            Value::Float32($v) => Value::Float32($body),
            Value::Float64($v) => Value::Float64($body),
            Value::Bool($v) => Value::Bool($body),
            Value::String($v) => Value::String($body),
        }
    };
}

impl Value {
    /// Default value of `len` elements: zero, `false` or the empty string
    pub fn zeroed(value_type: ValueType, len: usize) -> Self {
        match value_type {
            ValueType::Int8 => Value::Int8(vec![0; len]),
            ValueType::UInt8 => Value::UInt8(vec![0; len]),
            ValueType::Int16 => Value::Int16(vec![0; len]),
            ValueType::UInt16 => Value::UInt16(vec![0; len]),
            ValueType::Int32 => Value::Int32(vec![0; len]),
            ValueType::UInt32 => Value::UInt32(vec![0; len]),
            ValueType::Int64 => Value::Int64(vec![0; len]),
            ValueType::UInt64 => Value::UInt64(vec![0; len]),
            ValueType::Float32 => Value::Float32(vec![0.0; len]),
            ValueType::Float64 => Value::Float64(vec![0.0; len]),
            ValueType::Bool => Value::Bool(vec![false; len]),
            ValueType::String => Value::String(vec![String::new(); len]),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int8(_) => ValueType::Int8,
            Value::UInt8(_) => ValueType::UInt8,
            Value::Int16(_) => ValueType::Int16,
            Value::UInt16(_) => ValueType::UInt16,
            Value::Int32(_) => ValueType::Int32,
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Float32(_) => ValueType::Float32,
            Value::Float64(_) => ValueType::Float64,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
        }
    }

    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep every `factor`-th element, see [`decimation::sample`]
    pub fn decimate(&self, factor: usize) -> Value {
        map_values!(self, v => decimation::sample(v, factor))
    }

    /// Pad with defaults or cut so the value has exactly `len` elements
    pub fn resized(mut self, len: usize) -> Value {
        match &mut self {
            Value::Int8(v) => v.resize(len, 0),
            Value::UInt8(v) => v.resize(len, 0),
            Value::Int16(v) => v.resize(len, 0),
            Value::UInt16(v) => v.resize(len, 0),
            Value::Int32(v) => v.resize(len, 0),
            Value::UInt32(v) => v.resize(len, 0),
            Value::Int64(v) => v.resize(len, 0),
            Value::UInt64(v) => v.resize(len, 0),
            Value::Float32(v) => v.resize(len, 0.0),
            Value::Float64(v) => v.resize(len, 0.0),
            Value::Bool(v) => v.resize(len, false),
            Value::String(v) => v.resize(len, String::new()),
        }
        self
    }

    /// Lossy conversion to 32-bit floats, the only element type of the
    /// hierarchical output. Booleans become 0/1, text parses as a number or
    /// becomes NaN.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Value::Int8(v) => v.iter().map(|x| *x as f32).collect(),
            Value::UInt8(v) => v.iter().map(|x| *x as f32).collect(),
            Value::Int16(v) => v.iter().map(|x| *x as f32).collect(),
            Value::UInt16(v) => v.iter().map(|x| *x as f32).collect(),
            Value::Int32(v) => v.iter().map(|x| *x as f32).collect(),
            Value::UInt32(v) => v.iter().map(|x| *x as f32).collect(),
            Value::Int64(v) => v.iter().map(|x| *x as f32).collect(),
            Value::UInt64(v) => v.iter().map(|x| *x as f32).collect(),
            Value::Float32(v) => v.clone(),
            Value::Float64(v) => v.iter().map(|x| *x as f32).collect(),
            Value::Bool(v) => v.iter().map(|x| if *x { 1.0 } else { 0.0 }).collect(),
            Value::String(v) => v
                .iter()
                .map(|s| s.trim().parse::<f32>().unwrap_or(f32::NAN))
                .collect(),
        }
    }
}

macro_rules! impl_from {
    ($($variant:ident $t:ty),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(vec![v])
                }
            }

            impl From<Vec<$t>> for Value {
                fn from(v: Vec<$t>) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    Int8 i8,
    UInt8 u8,
    Int16 i16,
    UInt16 u16,
    Int32 i32,
    UInt32 u32,
    Int64 i64,
    UInt64 u64,
    Float32 f32,
    Float64 f64,
    Bool bool,
    String String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(vec![v.to_string()])
    }
}

/// Value carried by the trigger itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl TriggerValue {
    /// Counter reading for integer triggers, `None` for everything else
    pub fn counter(&self) -> Option<i128> {
        match self {
            TriggerValue::Int(v) => Some(i128::from(*v)),
            TriggerValue::UInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }
}

impl From<i32> for TriggerValue {
    fn from(v: i32) -> Self {
        TriggerValue::Int(i64::from(v))
    }
}

impl From<i64> for TriggerValue {
    fn from(v: i64) -> Self {
        TriggerValue::Int(v)
    }
}

impl From<u32> for TriggerValue {
    fn from(v: u32) -> Self {
        TriggerValue::UInt(u64::from(v))
    }
}

impl From<u64> for TriggerValue {
    fn from(v: u64) -> Self {
        TriggerValue::UInt(v)
    }
}

impl From<f64> for TriggerValue {
    fn from(v: f64) -> Self {
        TriggerValue::Float(v)
    }
}
