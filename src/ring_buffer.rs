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

//! Ring buffer of output files.
//!
//! Files are named `<YYYYMMDDTHHMMSS>_buffer<NNNN><suffix>`. The index of the
//! buffer in use is persisted in a plain-text `currentBuffer` file next to the
//! data files so the rotation continues across restarts. Reusing an index
//! deletes the file that carried it before, which bounds disk usage to
//! `max_buffer_count` files.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{DaqError, Result};

/// Name of the sidecar file holding the current buffer index
pub const BUFFER_INDEX_FILE: &str = "currentBuffer";

/// Files at or below this size are considered empty or broken and are reused
pub const MIN_VIABLE_FILE_BYTES: u64 = 1000;

/// Sub-directory of the working directory used when no directory is configured
pub const DEFAULT_DIRECTORY_NAME: &str = "uDAQ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBufferState {
    pub current_buffer: u32,
    pub max_buffer_count: u32,
    pub current_entry: u32,
    pub entries_per_file: u32,
    pub current_directory: PathBuf,
    pub current_prefix: String,
}

#[derive(Debug)]
pub struct RingBufferPathManager {
    state: RingBufferState,
    suffix: String,
    default_directory: PathBuf,
}

impl RingBufferPathManager {
    /// `directory` may be empty to select `<cwd>/uDAQ`
    pub fn new(directory: &str, suffix: &str, max_buffer_count: u32, entries_per_file: u32) -> Self {
        let default_directory = std::env::current_dir()
            .map(|cwd| cwd.join(DEFAULT_DIRECTORY_NAME))
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DIRECTORY_NAME));

        let mut manager = Self {
            state: RingBufferState {
                current_buffer: 0,
                max_buffer_count: max_buffer_count.max(1),
                current_entry: 0,
                entries_per_file: entries_per_file.max(1),
                current_directory: PathBuf::new(),
                current_prefix: String::new(),
            },
            suffix: suffix.to_string(),
            default_directory,
        };
        manager.state.current_directory = manager.resolve_directory(directory);
        info!(
            "DAQ directory: {}",
            manager.state.current_directory.display()
        );
        manager
    }

    pub fn state(&self) -> &RingBufferState {
        &self.state
    }

    pub fn directory(&self) -> &Path {
        &self.state.current_directory
    }

    pub fn current_buffer(&self) -> u32 {
        self.state.current_buffer
    }

    pub fn current_entry(&self) -> u32 {
        self.state.current_entry
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn set_limits(&mut self, max_buffer_count: u32, entries_per_file: u32) {
        self.state.max_buffer_count = max_buffer_count.max(1);
        self.state.entries_per_file = entries_per_file.max(1);
    }

    fn resolve_directory(&self, configured: &str) -> PathBuf {
        if configured.is_empty() {
            self.default_directory.clone()
        } else {
            PathBuf::from(configured)
        }
    }

    fn is_default_directory(&self) -> bool {
        self.state.current_directory == self.default_directory
    }

    /// Switch to the configured directory. Only honoured while the DAQ is
    /// disabled; returns whether the directory changed.
    pub fn update_daq_path(&mut self, enabled: bool, configured: &str) -> bool {
        if enabled {
            return false;
        }
        let resolved = self.resolve_directory(configured);
        if resolved == self.state.current_directory {
            return false;
        }
        info!("Set new DAQ path: {}", resolved.display());
        self.state.current_directory = resolved;
        true
    }

    /// Read the persisted buffer index. If the file it points to already holds
    /// data, move on to the next index so it is not overwritten.
    ///
    /// Returns false when the directory cannot be reached; the index is left
    /// untouched and the resolution has to be repeated once it is back.
    pub fn resolve_on_first_trigger(&mut self) -> bool {
        if self.is_default_directory() {
            if let Err(e) = fs::create_dir_all(&self.state.current_directory) {
                error!(
                    "Failed to create DAQ directory {}: {}",
                    self.state.current_directory.display(),
                    e
                );
                return false;
            }
        }
        if !self.state.current_directory.is_dir() {
            debug!(
                "DAQ directory {} not reachable, buffer index unresolved",
                self.state.current_directory.display()
            );
            return false;
        }

        let index_path = self.state.current_directory.join(BUFFER_INDEX_FILE);
        match fs::read_to_string(&index_path) {
            Ok(content) => {
                self.state.current_buffer = content.trim().parse().unwrap_or_else(|_| {
                    warn!(
                        "Ignoring unreadable buffer index in {}",
                        index_path.display()
                    );
                    0
                });
                if self.buffer_file_is_viable(self.state.current_buffer) {
                    self.state.current_buffer = self.state.current_buffer.saturating_add(1);
                }
                if self.state.current_buffer >= self.state.max_buffer_count {
                    self.state.current_buffer = 0;
                }
                debug!(
                    "Resuming ring buffer at index {}",
                    self.state.current_buffer
                );
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.state.current_buffer = 0;
                true
            }
            Err(e) => {
                warn!("Failed to read {}: {}", index_path.display(), e);
                false
            }
        }
    }

    /// Name of the file for the current index. Persists the index and deletes
    /// the file previously stored under it.
    pub fn next_buffer(&mut self) -> Result<PathBuf> {
        self.state.current_prefix = Local::now().format("%Y%m%dT%H%M%S").to_string();

        if self.state.current_buffer >= self.state.max_buffer_count {
            self.state.current_buffer = 0;
        }

        let filename = format!(
            "{}_buffer{:04}{}",
            self.state.current_prefix, self.state.current_buffer, self.suffix
        );

        let index_path = self.state.current_directory.join(BUFFER_INDEX_FILE);
        fs::write(&index_path, format!("{}\n", self.state.current_buffer))
            .map_err(|e| DaqError::io(&index_path, e))?;

        self.delete_buffer_files(self.state.current_buffer);

        Ok(self.state.current_directory.join(filename))
    }

    pub fn record_entry(&mut self) {
        self.state.current_entry += 1;
    }

    /// True once the open file holds `entries_per_file` events. The entry
    /// counter is reset and the buffer index advanced; the caller closes the
    /// file and calls [`next_buffer`](Self::next_buffer) before writing again.
    pub fn max_entries_reached(&mut self) -> bool {
        if self.state.current_entry >= self.state.entries_per_file {
            self.advance();
            self.state.current_entry = 0;
            return true;
        }
        false
    }

    /// Move on to the next buffer index
    pub fn advance(&mut self) {
        self.state.current_buffer =
            self.state.current_buffer.saturating_add(1) % self.state.max_buffer_count;
    }

    pub fn reset_entries(&mut self) {
        self.state.current_entry = 0;
    }

    fn buffer_files(&self, index: u32) -> Vec<PathBuf> {
        let pattern = format!("_buffer{:04}{}", index, self.suffix);
        let entries = match fs::read_dir(&self.state.current_directory) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(&pattern))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn buffer_file_is_viable(&self, index: u32) -> bool {
        self.buffer_files(index).iter().any(|path| {
            fs::metadata(path)
                .map(|m| m.len() > MIN_VIABLE_FILE_BYTES)
                .unwrap_or(false)
        })
    }

    fn delete_buffer_files(&self, index: u32) {
        for path in self.buffer_files(index) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed ring buffer file {}", path.display()),
                Err(e) => warn!(
                    "Ring buffer file delete failed for {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}
