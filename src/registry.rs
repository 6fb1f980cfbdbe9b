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

//! Catalog of the variables selected as DAQ sources.
//!
//! Variables are registered once, in a fixed order, and the registry is then
//! finalized into an immutable [`SessionLayout`] that carries the decimation
//! entry of every variable and the sorted list of group paths the
//! hierarchical backend has to create.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::decimation::{sampled_length, DecimationPolicy};
use crate::error::{DaqError, Result};
use crate::value::ValueType;

/// Index of a variable in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableHandle(usize);

impl VariableHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What the host reports for one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub element_count: usize,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType, element_count: usize) -> Self {
        Self {
            name: name.into(),
            value_type,
            element_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceVariable {
    pub qualified_name: String,
    pub value_type: ValueType,
    pub element_count: usize,
    pub owner_group_path: String,
}

impl SourceVariable {
    pub fn is_scalar(&self) -> bool {
        self.element_count == 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecimationEntry {
    pub handle: VariableHandle,
    pub variable: SourceVariable,
    pub factor: usize,
    pub sampled_length: usize,
}

/// Finalized, immutable variable set of a DAQ session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLayout {
    entries: Vec<DecimationEntry>,
    group_paths: Vec<String>,
}

impl SessionLayout {
    pub fn entries(&self) -> &[DecimationEntry] {
        &self.entries
    }

    pub fn entry(&self, handle: VariableHandle) -> Option<&DecimationEntry> {
        self.entries.get(handle.0)
    }

    /// Every path prefix of every variable, sorted so parents precede children
    pub fn group_paths(&self) -> &[String] {
        &self.group_paths
    }

    pub fn find(&self, name: &str) -> Option<VariableHandle> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .find(|e| e.variable.qualified_name == name)
            .map(|e| e.handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct VariableRegistry {
    variables: Vec<SourceVariable>,
    names: HashSet<String>,
    group_paths: BTreeSet<String>,
    layout: Option<Arc<SessionLayout>>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one variable.
    ///
    /// `owner_group_path` may be empty, in which case the parent path of
    /// `name` is used.
    pub fn register(
        &mut self,
        name: &str,
        value_type: ValueType,
        element_count: usize,
        owner_group_path: &str,
    ) -> Result<VariableHandle> {
        if self.layout.is_some() {
            return Err(DaqError::AlreadyFinalized);
        }

        let qualified_name = normalize_name(name);
        if qualified_name == "/" {
            return Err(DaqError::InvalidVariable {
                name: name.to_string(),
                reason: "empty name".to_string(),
            });
        }
        if element_count == 0 {
            return Err(DaqError::InvalidVariable {
                name: qualified_name,
                reason: "zero elements".to_string(),
            });
        }
        if self.names.contains(&qualified_name) {
            return Err(DaqError::DuplicateName(qualified_name));
        }

        let owner_group_path = if owner_group_path.is_empty() {
            parent_path(&qualified_name).to_string()
        } else {
            normalize_name(owner_group_path)
        };

        for prefix in path_prefixes(&qualified_name) {
            self.group_paths.insert(prefix.to_string());
        }

        debug!(
            "Registered DAQ variable '{}' ({}[{}])",
            qualified_name, value_type, element_count
        );

        let handle = VariableHandle(self.variables.len());
        self.names.insert(qualified_name.clone());
        self.variables.push(SourceVariable {
            qualified_name,
            value_type,
            element_count,
            owner_group_path,
        });
        Ok(handle)
    }

    /// Register every descriptor under `name_prefix`
    pub fn add_source<I>(&mut self, name_prefix: &str, descriptors: I) -> Result<Vec<VariableHandle>>
    where
        I: IntoIterator<Item = SourceDescriptor>,
    {
        let prefix = normalize_name(name_prefix);
        descriptors
            .into_iter()
            .map(|d| {
                let name = join_path(&prefix, &d.name);
                self.register(&name, d.value_type, d.element_count, &prefix)
            })
            .collect()
    }

    /// Freeze the variable set and derive one decimation entry per variable
    pub fn finalize(&mut self, policy: &DecimationPolicy) -> Result<Arc<SessionLayout>> {
        if self.layout.is_some() {
            return Err(DaqError::AlreadyFinalized);
        }
        if self.variables.is_empty() {
            return Err(DaqError::NoVariables);
        }

        let entries = self
            .variables
            .iter()
            .enumerate()
            .map(|(i, variable)| {
                let factor = policy.factor_for(variable.element_count);
                DecimationEntry {
                    handle: VariableHandle(i),
                    variable: variable.clone(),
                    factor,
                    sampled_length: sampled_length(variable.element_count, factor),
                }
            })
            .collect::<Vec<_>>();

        let layout = Arc::new(SessionLayout {
            entries,
            group_paths: self.group_paths.iter().cloned().collect(),
        });

        info!(
            "DAQ variable set finalized: {} variables, {} groups",
            layout.len(),
            layout.group_paths.len()
        );

        self.layout = Some(layout.clone());
        Ok(layout)
    }

    pub fn layout(&self) -> Result<Arc<SessionLayout>> {
        self.layout.clone().ok_or(DaqError::NotFinalized)
    }

    pub fn variables(&self) -> &[SourceVariable] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Leading '/', no trailing or doubled separators
pub fn normalize_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn join_path(prefix: &str, name: &str) -> String {
    normalize_name(&format!("{}/{}", prefix, name))
}

fn parent_path(name: &str) -> &str {
    match name.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &name[..idx],
    }
}

/// "/a/b/c" -> ["/a", "/a/b"]
fn path_prefixes(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('/')
        .map(|(idx, _)| idx)
        .filter(|idx| *idx > 0)
        .map(move |idx| &name[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_preserves_order() {
        let mut registry = VariableRegistry::new();
        let a = registry.register("/DAQ/b", ValueType::Int32, 1, "").unwrap();
        let b = registry.register("/DAQ/a", ValueType::Float64, 10, "").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.variables()[0].qualified_name, "/DAQ/b");
        assert_eq!(registry.variables()[1].owner_group_path, "/DAQ");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = VariableRegistry::new();
        registry.register("/DAQ/out", ValueType::Int32, 1, "").unwrap();
        let err = registry
            .register("/DAQ/out", ValueType::Float32, 1, "")
            .unwrap_err();
        assert!(matches!(err, DaqError::DuplicateName(ref n) if n == "/DAQ/out"));

        // Names are compared after normalization, case-sensitive
        assert!(registry.register("DAQ/out/", ValueType::Int32, 1, "").is_err());
        assert!(registry.register("/DAQ/OUT", ValueType::Int32, 1, "").is_ok());
    }

    #[test]
    fn test_invalid_variables() {
        let mut registry = VariableRegistry::new();
        assert!(matches!(
            registry.register("/", ValueType::Int32, 1, ""),
            Err(DaqError::InvalidVariable { .. })
        ));
        assert!(matches!(
            registry.register("/a", ValueType::Int32, 0, ""),
            Err(DaqError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_group_paths_sorted_and_unique() {
        let mut registry = VariableRegistry::new();
        registry.register("/DAQ/z/x", ValueType::Int32, 1, "").unwrap();
        registry.register("/DAQ/a/b/c", ValueType::Int32, 1, "").unwrap();
        registry.register("/DAQ/a/d", ValueType::Int32, 1, "").unwrap();
        registry.register("/top", ValueType::Int32, 1, "").unwrap();
        let layout = registry.finalize(&DecimationPolicy::default()).unwrap();
        assert_eq!(
            layout.group_paths(),
            &["/DAQ", "/DAQ/a", "/DAQ/a/b", "/DAQ/z"]
        );
    }

    #[test]
    fn test_finalize_assigns_decimation() {
        let mut registry = VariableRegistry::new();
        registry.register("/A", ValueType::Int32, 1, "").unwrap();
        registry.register("/B", ValueType::Float64, 10, "").unwrap();
        let layout = registry.finalize(&DecimationPolicy::new(2, 5)).unwrap();

        let a = &layout.entries()[0];
        assert_eq!((a.factor, a.sampled_length), (1, 1));
        let b = &layout.entries()[1];
        assert_eq!((b.factor, b.sampled_length), (2, 5));
        assert_eq!(layout.find("B"), Some(b.handle));
    }

    #[test]
    fn test_finalize_once() {
        let mut registry = VariableRegistry::new();
        assert!(matches!(registry.layout(), Err(DaqError::NotFinalized)));
        assert!(matches!(
            registry.finalize(&DecimationPolicy::default()),
            Err(DaqError::NoVariables)
        ));

        registry.register("/A", ValueType::Int32, 1, "").unwrap();
        registry.finalize(&DecimationPolicy::default()).unwrap();
        assert!(matches!(
            registry.finalize(&DecimationPolicy::default()),
            Err(DaqError::AlreadyFinalized)
        ));
        assert!(matches!(
            registry.register("/B", ValueType::Int32, 1, ""),
            Err(DaqError::AlreadyFinalized)
        ));
    }

    #[test]
    fn test_add_source_with_prefix() {
        let mut registry = VariableRegistry::new();
        let handles = registry
            .add_source(
                "DAQ",
                vec![
                    SourceDescriptor::new("out", ValueType::Int32, 1),
                    SourceDescriptor::new("sub/trace", ValueType::Float32, 100),
                ],
            )
            .unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(registry.variables()[0].qualified_name, "/DAQ/out");
        assert_eq!(registry.variables()[1].qualified_name, "/DAQ/sub/trace");
        assert_eq!(registry.variables()[1].owner_group_path, "/DAQ");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(normalize_name("a//b/"), "/a/b");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/a/b/c"), "/a/b");
        assert_eq!(path_prefixes("/a/b/c").collect::<Vec<_>>(), vec!["/a", "/a/b"]);
        assert!(path_prefixes("/a").next().is_none());
    }
}
