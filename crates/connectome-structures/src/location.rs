// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integer voxel location identifying a synapse within a dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StructureError, StructureResult};

/// Synapse location. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i64; 3]", into = "[i64; 3]")]
pub struct Location {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Location {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec(&self) -> Vec<i64> {
        vec![self.x, self.y, self.z]
    }

    pub fn from_slice(values: &[i64]) -> StructureResult<Self> {
        match values {
            [x, y, z] => Ok(Self::new(*x, *y, *z)),
            _ => Err(StructureError::MalformedLocation(format!(
                "expected 3 coordinates, got {}",
                values.len()
            ))),
        }
    }
}

impl From<[i64; 3]> for Location {
    fn from(v: [i64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Location> for [i64; 3] {
    fn from(l: Location) -> Self {
        [l.x, l.y, l.z]
    }
}

impl From<(i64, i64, i64)> for Location {
    fn from(v: (i64, i64, i64)) -> Self {
        Self::new(v.0, v.1, v.2)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

impl FromStr for Location {
    type Err = StructureError;

    /// Accepts `x,y,z` with optional surrounding parentheses or brackets.
    fn from_str(s: &str) -> StructureResult<Self> {
        let trimmed = s
            .trim()
            .trim_start_matches(['(', '['])
            .trim_end_matches([')', ']']);
        let coords = trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|e| StructureError::MalformedLocation(format!("{}: {}", s, e)))
            })
            .collect::<StructureResult<Vec<i64>>>()?;
        Self::from_slice(&coords)
    }
}
