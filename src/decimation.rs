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

//! Data reduction for large arrays.
//!
//! Arrays longer than the threshold keep every `factor`-th element starting at
//! index 0. The sampled length is `len / factor` with integer division, so the
//! elements of a trailing partial stride are dropped.

use serde::{Deserialize, Serialize};

/// Decimation parameters of one DAQ session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimationPolicy {
    pub factor: u32,
    pub threshold: u32,
}

impl Default for DecimationPolicy {
    fn default() -> Self {
        Self {
            factor: 10,
            threshold: 1000,
        }
    }
}

impl DecimationPolicy {
    pub fn new(factor: u32, threshold: u32) -> Self {
        Self { factor, threshold }
    }

    /// Factor for an array of `element_count` elements
    pub fn factor_for(&self, element_count: usize) -> usize {
        decimation_factor(element_count, self.threshold as usize, self.factor as usize)
    }
}

/// `configured_factor` if `element_count > threshold`, else 1.
///
/// The factor never exceeds the element count, so at least one element
/// survives even when the threshold is configured below the factor.
pub fn decimation_factor(element_count: usize, threshold: usize, configured_factor: usize) -> usize {
    if element_count > threshold {
        configured_factor.clamp(1, element_count.max(1))
    } else {
        1
    }
}

/// Number of elements kept by [`sample`]
pub fn sampled_length(element_count: usize, factor: usize) -> usize {
    element_count / factor.max(1)
}

/// Take `buffer[0], buffer[factor], buffer[2 * factor], ...` for
/// `buffer.len() / factor` elements.
pub fn sample<T: Clone>(buffer: &[T], factor: usize) -> Vec<T> {
    let factor = factor.max(1);
    let n = sampled_length(buffer.len(), factor);
    buffer.iter().step_by(factor).take(n).cloned().collect()
}
