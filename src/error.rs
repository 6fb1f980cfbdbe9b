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

// Error taxonomy for the DAQ core

use std::path::PathBuf;
use thiserror::Error;

use crate::value::ValueType;

pub type Result<T> = std::result::Result<T, DaqError>;

/// How the trigger engine reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal, raised before any trigger is processed
    Configuration,
    /// Retried on every trigger while enabled
    TransientIo,
    /// The offending field is dropped, the event continues
    SchemaConflict,
    /// The current file is aborted, the next trigger reopens
    BackendWrite,
}

#[derive(Debug, Error)]
pub enum DaqError {
    #[error("Cannot add '{0}' to the DAQ since a variable with that name is already registered")]
    DuplicateName(String),

    #[error("Invalid variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("No variables connected to the DAQ")]
    NoVariables,

    #[error("Variable registry is already finalized")]
    AlreadyFinalized,

    #[error("Variable registry is not finalized")]
    NotFinalized,

    #[error("Unknown output format: '{0}'. Supported: hdf5, root, arrow")]
    UnknownFormat(String),

    #[error("Output format '{0}' selected but not compiled in")]
    FormatUnavailable(String),

    #[error("Unknown compression: '{0}'. Supported: zstd, lz4, none")]
    UnknownCompression(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output name '{name}' of variable '{variable}' is already taken")]
    SchemaConflict { variable: String, name: String },

    #[error("Backend write failed: {0}")]
    Backend(String),

    #[error("Value for '{name}' has type {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        actual: ValueType,
    },
}

impl DaqError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DaqError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        DaqError::Backend(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DaqError::DuplicateName(_)
            | DaqError::InvalidVariable { .. }
            | DaqError::NoVariables
            | DaqError::AlreadyFinalized
            | DaqError::NotFinalized
            | DaqError::UnknownFormat(_)
            | DaqError::FormatUnavailable(_)
            | DaqError::UnknownCompression(_) => ErrorKind::Configuration,
            DaqError::Io { .. } => ErrorKind::TransientIo,
            DaqError::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            DaqError::Backend(_) | DaqError::TypeMismatch { .. } => ErrorKind::BackendWrite,
        }
    }
}

impl From<arrow::error::ArrowError> for DaqError {
    fn from(err: arrow::error::ArrowError) -> Self {
        DaqError::backend(err)
    }
}

#[cfg(feature = "storage_hdf5")]
impl From<hdf5::Error> for DaqError {
    fn from(err: hdf5::Error) -> Self {
        DaqError::backend(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DaqError::DuplicateName("/a".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DaqError::NoVariables.kind(), ErrorKind::Configuration);
        assert_eq!(
            DaqError::io("/tmp/x", std::io::Error::from(std::io::ErrorKind::NotFound)).kind(),
            ErrorKind::TransientIo
        );
        assert_eq!(
            DaqError::SchemaConflict {
                variable: "/a/b".into(),
                name: "a.b".into()
            }
            .kind(),
            ErrorKind::SchemaConflict
        );
        assert_eq!(DaqError::backend("boom").kind(), ErrorKind::BackendWrite);
    }

    #[test]
    fn test_arrow_io_error_keeps_message() {
        let err: DaqError = arrow::error::ArrowError::IoError(
            "disk full".to_string(),
            std::io::Error::other("no space left"),
        )
        .into();
        assert_eq!(err.kind(), ErrorKind::BackendWrite);
        assert!(err.to_string().contains("disk full"), "{}", err);
    }

    #[test]
    fn test_duplicate_message() {
        let err = DaqError::DuplicateName("/DAQ/out".to_string());
        assert!(err.to_string().contains("/DAQ/out"));
        assert!(err.to_string().contains("already registered"));
    }
}
