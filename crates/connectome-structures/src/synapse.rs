// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synapse value types and the synapse addition schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StructureError, StructureResult};
use crate::location::Location;

/// Which side of a synaptic link a synapse sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynapseType {
    Pre,
    Post,
}

impl SynapseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynapseType::Pre => "pre",
            SynapseType::Post => "post",
        }
    }
}

impl fmt::Display for SynapseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynapseType {
    type Err = StructureError;

    fn from_str(s: &str) -> StructureResult<Self> {
        match s {
            "pre" => Ok(SynapseType::Pre),
            "post" => Ok(SynapseType::Post),
            other => Err(StructureError::UnknownSynapseType(other.to_string())),
        }
    }
}

/// Request body for creating one (orphaned) synapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseAddition {
    pub location: Location,
    #[serde(rename = "type")]
    pub kind: SynapseType,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub rois: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl SynapseAddition {
    pub fn new(location: Location, kind: SynapseType, confidence: f64) -> Self {
        Self {
            location,
            kind,
            confidence,
            rois: Vec::new(),
        }
    }

    pub fn with_rois<I, S>(mut self, rois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rois = rois.into_iter().map(Into::into).collect();
        self
    }

    /// Reject malformed confidences and ROI lists before anything is written.
    pub fn validate(&self) -> StructureResult<()> {
        validate_confidence(self.confidence)?;
        let mut seen = std::collections::BTreeSet::new();
        for roi in &self.rois {
            validate_roi_name(roi)?;
            if !seen.insert(roi.as_str()) {
                return Err(StructureError::InvalidValue {
                    field: "rois",
                    reason: format!("ROI '{}' listed twice", roi),
                });
            }
        }
        Ok(())
    }
}

/// A synapse listed in a segment addition: location plus the type it must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynapseRef {
    pub location: Location,
    #[serde(rename = "type")]
    pub kind: SynapseType,
}

pub fn validate_confidence(confidence: f64) -> StructureResult<()> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(StructureError::InvalidValue {
            field: "confidence",
            reason: format!("{} is not within [0, 1]", confidence),
        });
    }
    Ok(())
}

pub fn validate_roi_name(roi: &str) -> StructureResult<()> {
    if roi.is_empty() {
        return Err(StructureError::InvalidValue {
            field: "roi",
            reason: "ROI name is empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synapse_addition_schema() {
        let json = r#"{"location":[1,2,3],"type":"post","confidence":0.4,"rois":["EB","FB"]}"#;
        let addition: SynapseAddition = serde_json::from_str(json).unwrap();
        assert_eq!(addition.location, Location::new(1, 2, 3));
        assert_eq!(addition.kind, SynapseType::Post);
        assert_eq!(addition.rois, vec!["EB".to_string(), "FB".to_string()]);
        assert!(addition.validate().is_ok());
    }

    #[test]
    fn test_confidence_defaults_to_one() {
        let json = r#"{"location":[0,0,0],"type":"pre"}"#;
        let addition: SynapseAddition = serde_json::from_str(json).unwrap();
        assert_eq!(addition.confidence, 1.0);
        assert!(addition.rois.is_empty());
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let addition = SynapseAddition::new(Location::new(0, 0, 0), SynapseType::Pre, 1.5);
        assert!(addition.validate().is_err());
        let addition = SynapseAddition::new(Location::new(0, 0, 0), SynapseType::Pre, f64::NAN);
        assert!(addition.validate().is_err());
    }

    #[test]
    fn test_duplicate_roi_rejected() {
        let addition = SynapseAddition::new(Location::new(0, 0, 0), SynapseType::Pre, 0.9)
            .with_rois(["R1", "R1"]);
        assert!(addition.validate().is_err());
    }

    #[test]
    fn test_synapse_type_parse() {
        assert_eq!("pre".parse::<SynapseType>().unwrap(), SynapseType::Pre);
        assert!("both".parse::<SynapseType>().is_err());
    }
}
