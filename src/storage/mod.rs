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

// Storage backend module
//
// Provides a trait-based abstraction over the file formats a DAQ session
// can write: a hierarchical one (HDF5, one group per event) and a columnar
// one (Arrow IPC, one row per event).
//
// This module focuses on WRITE-ONLY operations.
// Users should read the files with their format's own tools.

pub mod backend;
pub mod columnar;
pub mod factory;
pub mod hierarchical;

pub use backend::{EventHandle, SchemaConflict, StorageBackend};
pub use columnar::{column_name, parse_compression, ColumnarBackend};
pub use factory::BackendFactory;
pub use hierarchical::{GroupStore, HierarchicalBackend};

#[cfg(feature = "storage_hdf5")]
pub use hierarchical::{Hdf5Backend, Hdf5Store};
