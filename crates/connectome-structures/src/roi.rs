// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Per-ROI synapse counters.

A [`RoiInfo`] maps ROI names to [`RoiCounter`]s. Counters never go below
zero: a decrement on an empty counter is an invariant violation and is
reported as [`StructureError::CounterUnderflow`]. An ROI whose pre and post
counts both reach zero is dropped from the map, so absence means "not
present" rather than "zero".

The canonical encoding is a JSON object keyed by ROI name:

```text
{"<roi>": {"pre": n, "post": n, "preHP": n, "postHP": n}}
```

`preHP`/`postHP` only appear on counters that track high-precision counts.
Keys are emitted in sorted order, which makes the encoding stable.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{StructureError, StructureResult};
use crate::synapse::SynapseType;

/// Pre/post counts for one ROI, with optional high-precision sub-counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiCounter {
    #[serde(default)]
    pre: u64,
    #[serde(default)]
    post: u64,
    #[serde(rename = "preHP", default, skip_serializing_if = "Option::is_none")]
    pre_hp: Option<u64>,
    #[serde(rename = "postHP", default, skip_serializing_if = "Option::is_none")]
    post_hp: Option<u64>,
}

fn decrement(value: &mut u64, field: &'static str) -> StructureResult<()> {
    match value.checked_sub(1) {
        Some(v) => {
            *value = v;
            Ok(())
        }
        None => Err(StructureError::CounterUnderflow {
            roi: String::new(),
            field,
        }),
    }
}

impl RoiCounter {
    /// Counter without high-precision tracking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter that tracks high-precision sub-counts (starting at zero).
    pub fn with_hp() -> Self {
        Self {
            pre_hp: Some(0),
            post_hp: Some(0),
            ..Self::default()
        }
    }

    pub fn pre(&self) -> u64 {
        self.pre
    }

    pub fn post(&self) -> u64 {
        self.post
    }

    pub fn pre_hp(&self) -> Option<u64> {
        self.pre_hp
    }

    pub fn post_hp(&self) -> Option<u64> {
        self.post_hp
    }

    pub fn tracks_hp(&self) -> bool {
        self.pre_hp.is_some() || self.post_hp.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pre == 0 && self.post == 0
    }

    pub fn increment_pre(&mut self) {
        self.pre += 1;
    }

    pub fn increment_post(&mut self) {
        self.post += 1;
    }

    pub fn decrement_pre(&mut self) -> StructureResult<()> {
        decrement(&mut self.pre, "pre")
    }

    pub fn decrement_post(&mut self) -> StructureResult<()> {
        decrement(&mut self.post, "post")
    }

    pub fn increment_pre_hp(&mut self) {
        *self.pre_hp.get_or_insert(0) += 1;
    }

    pub fn increment_post_hp(&mut self) {
        *self.post_hp.get_or_insert(0) += 1;
    }

    pub fn decrement_pre_hp(&mut self) -> StructureResult<()> {
        match self.pre_hp.as_mut() {
            Some(hp) => decrement(hp, "preHP"),
            None => decrement(&mut 0, "preHP"),
        }
    }

    pub fn decrement_post_hp(&mut self) -> StructureResult<()> {
        match self.post_hp.as_mut() {
            Some(hp) => decrement(hp, "postHP"),
            None => decrement(&mut 0, "postHP"),
        }
    }

    pub fn increment(&mut self, kind: SynapseType) {
        match kind {
            SynapseType::Pre => self.increment_pre(),
            SynapseType::Post => self.increment_post(),
        }
    }

    pub fn decrement(&mut self, kind: SynapseType) -> StructureResult<()> {
        match kind {
            SynapseType::Pre => self.decrement_pre(),
            SynapseType::Post => self.decrement_post(),
        }
    }

    /// Increment the base count and, when `high_precision`, the HP sub-count.
    /// Switches the counter into HP-tracking mode either way.
    pub fn increment_hp(&mut self, kind: SynapseType, high_precision: bool) {
        self.pre_hp.get_or_insert(0);
        self.post_hp.get_or_insert(0);
        self.increment(kind);
        if high_precision {
            match kind {
                SynapseType::Pre => self.increment_pre_hp(),
                SynapseType::Post => self.increment_post_hp(),
            }
        }
    }

    /// Decrement the base count and, when `high_precision`, the HP
    /// sub-count. Either both change or neither does.
    pub fn decrement_hp(&mut self, kind: SynapseType, high_precision: bool) -> StructureResult<()> {
        let mut next = *self;
        if high_precision {
            match kind {
                SynapseType::Pre => next.decrement_pre_hp()?,
                SynapseType::Post => next.decrement_post_hp()?,
            }
        }
        next.decrement(kind)?;
        *self = next;
        Ok(())
    }

    /// Add another counter's counts into this one.
    pub fn absorb(&mut self, other: &RoiCounter) {
        self.pre += other.pre;
        self.post += other.post;
        if let Some(hp) = other.pre_hp {
            *self.pre_hp.get_or_insert(0) += hp;
        }
        if let Some(hp) = other.post_hp {
            *self.post_hp.get_or_insert(0) += hp;
        }
    }
}

/// ROI name -> counter mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiInfo {
    rois: BTreeMap<String, RoiCounter>,
}

impl RoiInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn get(&self, roi: &str) -> Option<&RoiCounter> {
        self.rois.get(roi)
    }

    pub fn contains(&self, roi: &str) -> bool {
        self.rois.contains_key(roi)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RoiCounter)> {
        self.rois.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// ROI names in sorted order.
    pub fn roi_names(&self) -> Vec<String> {
        self.rois.keys().cloned().collect()
    }

    pub fn increment_for_roi(&mut self, roi: &str, kind: SynapseType) {
        self.rois.entry(roi.to_string()).or_default().increment(kind);
    }

    pub fn decrement_for_roi(&mut self, roi: &str, kind: SynapseType) -> StructureResult<()> {
        let counter = self.counter_mut(roi, kind)?;
        counter.decrement(kind).map_err(|e| e.for_roi(roi))?;
        self.prune(roi);
        Ok(())
    }

    pub fn increment_for_roi_hp(&mut self, roi: &str, kind: SynapseType, high_precision: bool) {
        self.rois
            .entry(roi.to_string())
            .or_insert_with(RoiCounter::with_hp)
            .increment_hp(kind, high_precision);
    }

    pub fn decrement_for_roi_hp(
        &mut self,
        roi: &str,
        kind: SynapseType,
        high_precision: bool,
    ) -> StructureResult<()> {
        let counter = self.counter_mut(roi, kind)?;
        counter
            .decrement_hp(kind, high_precision)
            .map_err(|e| e.for_roi(roi))?;
        self.prune(roi);
        Ok(())
    }

    /// Fold another RoiInfo into this one.
    pub fn merge(&mut self, other: &RoiInfo) {
        for (roi, counter) in &other.rois {
            self.rois.entry(roi.clone()).or_default().absorb(counter);
        }
    }

    pub fn total_pre(&self) -> u64 {
        self.rois.values().map(RoiCounter::pre).sum()
    }

    pub fn total_post(&self) -> u64 {
        self.rois.values().map(RoiCounter::post).sum()
    }

    /// Canonical JSON encoding.
    pub fn to_json_string(&self) -> String {
        // A map of plain integers cannot fail to serialize.
        serde_json::to_string(&self.rois).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json_str(encoded: &str) -> StructureResult<Self> {
        if encoded.trim().is_empty() {
            return Ok(Self::default());
        }
        let info: RoiInfo = serde_json::from_str(encoded)
            .map_err(|e| StructureError::MalformedRoiInfo(e.to_string()))?;
        Ok(info)
    }

    fn counter_mut(&mut self, roi: &str, kind: SynapseType) -> StructureResult<&mut RoiCounter> {
        self.rois
            .get_mut(roi)
            .ok_or_else(|| StructureError::CounterUnderflow {
                roi: roi.to_string(),
                field: kind.as_str(),
            })
    }

    fn prune(&mut self, roi: &str) {
        if self.rois.get(roi).is_some_and(RoiCounter::is_empty) {
            self.rois.remove(roi);
        }
    }
}

impl fmt::Display for RoiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

impl FromStr for RoiInfo {
    type Err = StructureError;

    fn from_str(s: &str) -> StructureResult<Self> {
        Self::from_json_str(s)
    }
}
