/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Typed resource quantities and the bin-packing arithmetic the scheduler needs.

use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// A request or allocation of (fractional cores, memory, disk memory).
///
/// Closed under componentwise add/subtract. `subset` is the partial subtraction used by the
/// admission scheduler: it is only defined when every resulting component is non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ResourceSet {
    pub cores: f64,
    pub memory: u64,
    pub disk_memory: u64,
}

impl ResourceSet {
    pub const ZERO: ResourceSet = ResourceSet {
        cores: 0.0,
        memory: 0,
        disk_memory: 0,
    };

    pub fn new(cores: f64, memory: u64, disk_memory: u64) -> Self {
        ResourceSet {
            cores,
            memory,
            disk_memory,
        }
    }

    pub fn cores(cores: f64) -> Self {
        ResourceSet {
            cores,
            ..Self::ZERO
        }
    }

    pub fn memory(memory: u64) -> Self {
        ResourceSet {
            memory,
            ..Self::ZERO
        }
    }

    /// `self - other`, defined only when every resulting component is >= 0.
    pub fn subset(&self, other: &ResourceSet) -> Option<ResourceSet> {
        if self.cores + f64::EPSILON < other.cores
            || self.memory < other.memory
            || self.disk_memory < other.disk_memory
        {
            return None;
        }
        Some(ResourceSet {
            cores: self.cores - other.cores,
            memory: self.memory - other.memory,
            disk_memory: self.disk_memory - other.disk_memory,
        })
    }

    pub fn fits_within(&self, envelope: &ResourceSet) -> bool {
        envelope.subset(self).is_some()
    }
}

impl Add for ResourceSet {
    type Output = ResourceSet;
    fn add(self, rhs: ResourceSet) -> ResourceSet {
        ResourceSet {
            cores: self.cores + rhs.cores,
            memory: self.memory + rhs.memory,
            disk_memory: self.disk_memory + rhs.disk_memory,
        }
    }
}

impl Sub for ResourceSet {
    type Output = ResourceSet;
    fn sub(self, rhs: ResourceSet) -> ResourceSet {
        ResourceSet {
            cores: self.cores - rhs.cores,
            memory: self.memory.saturating_sub(rhs.memory),
            disk_memory: self.disk_memory.saturating_sub(rhs.disk_memory),
        }
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cores={} memory={} disk_memory={}",
            self.cores,
            pretty_bytes(self.memory),
            pretty_bytes(self.disk_memory)
        )
    }
}

/// The global envelope the engine may allocate concurrently. Acts as the maximum; admitted
/// tasks consume from it and release on completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskManagerResources {
    pub system_resources: ResourceSet,
}

impl TaskManagerResources {
    pub fn new(system_resources: ResourceSet) -> Self {
        TaskManagerResources { system_resources }
    }

    /// An envelope with no binding limit on any dimension (used in tests and by callers that
    /// want the scheduler to never defer for resource reasons).
    pub fn unbounded() -> Self {
        TaskManagerResources {
            system_resources: ResourceSet::new(f64::MAX, u64::MAX, u64::MAX),
        }
    }
}

#[derive(Error, Debug)]
pub enum MemoryParseError {
    #[error("'{0}' is not a parseable memory quantity")]
    Unparseable(String),
}

/// Parses a memory string such as `"2g"`, `"512m"`, `"1024"` (bytes). Case-insensitive.
/// Suffixes `k/kb/m/mb/g/gb/t/tb/p/pb` use base 1024. Returns the sentinel `-1` for
/// unparseable input, mirroring the legacy behavior callers depend on; [`parse_memory_checked`]
/// is the `Result`-returning equivalent for code that wants to handle the error.
pub fn parse_memory(input: &str) -> i64 {
    parse_memory_checked(input).unwrap_or(-1)
}

pub fn parse_memory_checked(input: &str) -> Result<i64, MemoryParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MemoryParseError::Unparseable(input.to_string()));
    }
    let lower = trimmed.to_lowercase();
    let (digits, multiplier) = if let Some(d) = lower.strip_suffix("pb") {
        (d, 1024u64.pow(5))
    } else if let Some(d) = lower.strip_suffix("p") {
        (d, 1024u64.pow(5))
    } else if let Some(d) = lower.strip_suffix("tb") {
        (d, 1024u64.pow(4))
    } else if let Some(d) = lower.strip_suffix("t") {
        (d, 1024u64.pow(4))
    } else if let Some(d) = lower.strip_suffix("gb") {
        (d, 1024u64.pow(3))
    } else if let Some(d) = lower.strip_suffix("g") {
        (d, 1024u64.pow(3))
    } else if let Some(d) = lower.strip_suffix("mb") {
        (d, 1024u64.pow(2))
    } else if let Some(d) = lower.strip_suffix("m") {
        (d, 1024u64.pow(2))
    } else if let Some(d) = lower.strip_suffix("kb") {
        (d, 1024u64)
    } else if let Some(d) = lower.strip_suffix("k") {
        (d, 1024u64)
    } else {
        (lower.as_str(), 1u64)
    };
    let digits = digits.trim();
    let value: u64 = digits
        .parse()
        .map_err(|_| MemoryParseError::Unparseable(input.to_string()))?;
    value
        .checked_mul(multiplier)
        .map(|v| v as i64)
        .ok_or_else(|| MemoryParseError::Unparseable(input.to_string()))
}

/// Formats a byte count the way [`parse_memory`] expects to read it back, choosing the
/// largest suffix that divides evenly so canonical inputs like `"2g"` round-trip.
pub fn pretty_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (1024u64.pow(5), "p"),
        (1024u64.pow(4), "t"),
        (1024u64.pow(3), "g"),
        (1024u64.pow(2), "m"),
        (1024, "k"),
    ];
    for (scale, suffix) in UNITS.iter() {
        if bytes > 0 && bytes % scale == 0 {
            return format!("{}{}", bytes / scale, suffix);
        }
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_defined_when_fits() {
        let envelope = ResourceSet::new(4.0, 1024, 0);
        let request = ResourceSet::new(2.0, 512, 0);
        let remainder = envelope.subset(&request).expect("fits");
        assert_eq!(remainder, ResourceSet::new(2.0, 512, 0));
    }

    #[test]
    fn subset_undefined_when_any_dimension_overflows() {
        let envelope = ResourceSet::new(1.0, 1024, 0);
        let request = ResourceSet::new(2.0, 512, 0);
        assert!(envelope.subset(&request).is_none());
    }

    #[test]
    fn parse_memory_roundtrips_canonical_suffixes() {
        for s in ["2g", "2m", "2k", "1t", "3p"] {
            let bytes = parse_memory(s);
            assert!(bytes >= 0, "{} should parse", s);
            assert_eq!(pretty_bytes(bytes as u64), s);
        }
    }

    #[test]
    fn parse_memory_accepts_bare_bytes() {
        assert_eq!(parse_memory("1024"), 1024);
    }

    #[test]
    fn parse_memory_is_case_insensitive() {
        assert_eq!(parse_memory("2G"), parse_memory("2g"));
        assert_eq!(parse_memory("2GB"), parse_memory("2g"));
    }

    #[test]
    fn parse_memory_unparseable_yields_sentinel() {
        assert_eq!(parse_memory("not-a-size"), -1);
        assert_eq!(parse_memory(""), -1);
    }

    #[test]
    fn exact_envelope_is_admissible() {
        let envelope = ResourceSet::new(1.0, 1, 0);
        assert!(envelope.subset(&envelope).is_some());
    }

    proptest::proptest! {
        #[test]
        fn subset_then_add_back_is_identity(cores in 0.0f64..1000.0, mem in 0u64..1_000_000, req_cores in 0.0f64..1000.0, req_mem in 0u64..1_000_000) {
            let envelope = ResourceSet::new(cores, mem, 0);
            let request = ResourceSet::new(req_cores, req_mem, 0);
            if let Some(remainder) = envelope.subset(&request) {
                let restored = remainder + request;
                proptest::prop_assert!((restored.cores - envelope.cores).abs() < 1e-6);
                proptest::prop_assert_eq!(restored.memory, envelope.memory);
            }
        }
    }
}
