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

// Backend factory for creating storage backends from the output format

use std::sync::Arc;

use super::backend::StorageBackend;
use super::columnar::{parse_compression, ColumnarBackend};
use crate::config::DaqSettings;
use crate::error::{DaqError, Result};
use crate::registry::SessionLayout;

/// Output formats accepted by [`BackendFactory::create`]
pub const SUPPORTED_FORMATS: &[&str] = &["hdf5", "root", "arrow"];

pub struct BackendFactory;

impl BackendFactory {
    /// Create the storage backend for the configured output format (case-insensitive)
    pub fn create(
        settings: &DaqSettings,
        layout: Arc<SessionLayout>,
    ) -> Result<Box<dyn StorageBackend>> {
        let format = settings.output_format.as_str();
        match format.to_lowercase().as_str() {
            "hdf5" => Self::create_hdf5(layout),

            "root" | "arrow" => {
                let compression = parse_compression(&settings.compression)?;
                Ok(Box::new(
                    ColumnarBackend::new(layout, settings.flush_after_entries)
                        .with_compression(compression),
                ))
            }

            _ => Err(DaqError::UnknownFormat(format.to_string())),
        }
    }

    /// Whether `format` names a known output format, compiled in or not
    pub fn is_known_format(format: &str) -> bool {
        SUPPORTED_FORMATS.contains(&format.to_lowercase().as_str())
    }

    #[cfg(feature = "storage_hdf5")]
    fn create_hdf5(layout: Arc<SessionLayout>) -> Result<Box<dyn StorageBackend>> {
        Ok(Box::new(super::hierarchical::Hdf5Backend::new(layout)))
    }

    #[cfg(not(feature = "storage_hdf5"))]
    fn create_hdf5(_layout: Arc<SessionLayout>) -> Result<Box<dyn StorageBackend>> {
        Err(DaqError::FormatUnavailable("hdf5".to_string()))
    }
}
