// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Segment addition schema and the optional segment properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{StructureError, StructureResult};
use crate::location::Location;
use crate::mutation_key::MutationKey;
use crate::synapse::SynapseRef;

/// Soma annotation on a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Soma {
    pub location: Location,
    pub radius: f64,
}

impl Soma {
    pub fn validate(&self) -> StructureResult<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(StructureError::InvalidValue {
                field: "soma.radius",
                reason: format!("{} is not a positive radius", self.radius),
            });
        }
        Ok(())
    }
}

/// Request body for adding a segment (one half of a split/merge replay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAddition {
    pub body_id: u64,
    #[serde(default)]
    pub size: Option<u64>,
    pub mutation_uuid: String,
    pub mutation_id: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub soma: Option<Soma>,
    #[serde(default)]
    pub current_synapses: Vec<SynapseRef>,
    /// Bodies the listed synapses were taken from. Recorded for provenance.
    #[serde(default)]
    pub synapse_sources: Vec<u64>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub primary_neurite: Option<String>,
    #[serde(default)]
    pub major_input: Option<String>,
    #[serde(default)]
    pub major_output: Option<String>,
    #[serde(default)]
    pub clonal_unit: Option<String>,
    #[serde(default)]
    pub neurotransmitter: Option<String>,
}

impl SegmentAddition {
    pub fn new(body_id: u64, mutation_uuid: impl Into<String>, mutation_id: u64) -> Self {
        Self {
            body_id,
            size: None,
            mutation_uuid: mutation_uuid.into(),
            mutation_id,
            status: None,
            name: None,
            soma: None,
            current_synapses: Vec::new(),
            synapse_sources: Vec::new(),
            instance: None,
            primary_neurite: None,
            major_input: None,
            major_output: None,
            clonal_unit: None,
            neurotransmitter: None,
        }
    }

    pub fn with_synapses(mut self, synapses: impl IntoIterator<Item = SynapseRef>) -> Self {
        self.current_synapses.extend(synapses);
        self
    }

    /// Idempotency key of this addition.
    pub fn mutation_key(&self) -> StructureResult<MutationKey> {
        MutationKey::new(&self.mutation_uuid, self.mutation_id, self.body_id)
    }

    /// Structural validation; says nothing about what the graph contains.
    pub fn validate(&self) -> StructureResult<()> {
        if self.body_id == 0 {
            return Err(StructureError::InvalidValue {
                field: "bodyId",
                reason: "bodyId must be non-zero".to_string(),
            });
        }
        self.mutation_key()?;
        if let Some(soma) = &self.soma {
            soma.validate()?;
        }
        let mut seen = BTreeSet::new();
        for synapse in &self.current_synapses {
            if !seen.insert(synapse.location) {
                return Err(StructureError::InvalidValue {
                    field: "currentSynapses",
                    reason: format!("synapse {} listed twice", synapse.location),
                });
            }
        }
        Ok(())
    }

    /// Optional properties to write onto the new segment.
    pub fn property_update(&self) -> SegmentPropertyUpdate {
        SegmentPropertyUpdate {
            name: self.name.clone(),
            status: self.status.clone(),
            instance: self.instance.clone(),
            primary_neurite: self.primary_neurite.clone(),
            major_input: self.major_input.clone(),
            major_output: self.major_output.clone(),
            clonal_unit: self.clonal_unit.clone(),
            neurotransmitter: self.neurotransmitter.clone(),
            size: self.size,
            soma: self.soma,
        }
    }
}

/// Optional segment properties that can be set or deleted individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentProperty {
    Name,
    Status,
    Instance,
    PrimaryNeurite,
    MajorInput,
    MajorOutput,
    ClonalUnit,
    Neurotransmitter,
    Soma,
    Size,
}

impl SegmentProperty {
    pub const ALL: [SegmentProperty; 10] = [
        SegmentProperty::Name,
        SegmentProperty::Status,
        SegmentProperty::Instance,
        SegmentProperty::PrimaryNeurite,
        SegmentProperty::MajorInput,
        SegmentProperty::MajorOutput,
        SegmentProperty::ClonalUnit,
        SegmentProperty::Neurotransmitter,
        SegmentProperty::Soma,
        SegmentProperty::Size,
    ];

    /// Stored property keys backing this property.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            SegmentProperty::Name => &["name"],
            SegmentProperty::Status => &["status"],
            SegmentProperty::Instance => &["instance"],
            SegmentProperty::PrimaryNeurite => &["primaryNeurite"],
            SegmentProperty::MajorInput => &["majorInput"],
            SegmentProperty::MajorOutput => &["majorOutput"],
            SegmentProperty::ClonalUnit => &["clonalUnit"],
            SegmentProperty::Neurotransmitter => &["neurotransmitter"],
            SegmentProperty::Soma => &["somaLocation", "somaRadius"],
            SegmentProperty::Size => &["size"],
        }
    }

    /// Whether having this property set is enough to make a segment a Neuron.
    pub fn promotes_to_neuron(&self) -> bool {
        !matches!(self, SegmentProperty::Size)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentProperty::Name => "name",
            SegmentProperty::Status => "status",
            SegmentProperty::Instance => "instance",
            SegmentProperty::PrimaryNeurite => "primaryNeurite",
            SegmentProperty::MajorInput => "majorInput",
            SegmentProperty::MajorOutput => "majorOutput",
            SegmentProperty::ClonalUnit => "clonalUnit",
            SegmentProperty::Neurotransmitter => "neurotransmitter",
            SegmentProperty::Soma => "soma",
            SegmentProperty::Size => "size",
        }
    }
}

impl fmt::Display for SegmentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentProperty {
    type Err = StructureError;

    fn from_str(s: &str) -> StructureResult<Self> {
        SegmentProperty::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| StructureError::InvalidValue {
                field: "property",
                reason: format!("unknown segment property '{}'", s),
            })
    }
}

/// Partial update of segment properties. `None` leaves a property untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentPropertyUpdate {
    pub name: Option<String>,
    pub status: Option<String>,
    pub instance: Option<String>,
    pub primary_neurite: Option<String>,
    pub major_input: Option<String>,
    pub major_output: Option<String>,
    pub clonal_unit: Option<String>,
    pub neurotransmitter: Option<String>,
    pub size: Option<u64>,
    pub soma: Option<Soma>,
}

impl SegmentPropertyUpdate {
    pub fn is_empty(&self) -> bool {
        self.string_properties().next().is_none() && self.size.is_none() && self.soma.is_none()
    }

    /// String-valued properties that are set, paired with their stored key.
    pub fn string_properties(&self) -> impl Iterator<Item = (SegmentProperty, &str)> {
        [
            (SegmentProperty::Name, &self.name),
            (SegmentProperty::Status, &self.status),
            (SegmentProperty::Instance, &self.instance),
            (SegmentProperty::PrimaryNeurite, &self.primary_neurite),
            (SegmentProperty::MajorInput, &self.major_input),
            (SegmentProperty::MajorOutput, &self.major_output),
            (SegmentProperty::ClonalUnit, &self.clonal_unit),
            (SegmentProperty::Neurotransmitter, &self.neurotransmitter),
        ]
        .into_iter()
        .filter_map(|(prop, value)| value.as_deref().map(|v| (prop, v)))
    }

    pub fn validate(&self) -> StructureResult<()> {
        if let Some(soma) = &self.soma {
            soma.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse::SynapseType;

    const UUID: &str = "4b1d8e0f-5f5c-4a7e-9a53-1f0f3f6d2c11";

    #[test]
    fn test_segment_addition_schema() {
        let json = format!(
            r#"{{
                "bodyId": 10,
                "size": 1234,
                "mutationUuid": "{UUID}",
                "mutationId": 7,
                "status": "Traced",
                "name": "MBON01",
                "soma": {{"location": [1, 2, 3], "radius": 5.5}},
                "currentSynapses": [{{"location": [0, 0, 0], "type": "pre"}}],
                "synapseSources": [99]
            }}"#
        );
        let addition: SegmentAddition = serde_json::from_str(&json).unwrap();
        assert_eq!(addition.body_id, 10);
        assert_eq!(addition.size, Some(1234));
        assert_eq!(addition.current_synapses[0].kind, SynapseType::Pre);
        assert_eq!(addition.synapse_sources, vec![99]);
        assert!(addition.validate().is_ok());
        assert_eq!(
            addition.mutation_key().unwrap().to_string(),
            format!("{UUID}:7:10")
        );
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let mut addition = SegmentAddition::new(0, UUID, 1);
        assert!(addition.validate().is_err());

        addition.body_id = 5;
        addition.mutation_uuid = "abc:def".to_string();
        assert!(addition.validate().is_err());

        addition.mutation_uuid = UUID.to_string();
        let loc = Location::new(1, 1, 1);
        addition.current_synapses = vec![
            SynapseRef { location: loc, kind: SynapseType::Pre },
            SynapseRef { location: loc, kind: SynapseType::Pre },
        ];
        assert!(addition.validate().is_err());
    }

    #[test]
    fn test_property_update_strings() {
        let update = SegmentPropertyUpdate {
            name: Some("a".into()),
            status: Some("b".into()),
            ..Default::default()
        };
        let props: Vec<_> = update.string_properties().map(|(p, _)| p).collect();
        assert_eq!(props, vec![SegmentProperty::Name, SegmentProperty::Status]);
        assert!(!update.is_empty());
        assert!(SegmentPropertyUpdate::default().is_empty());
    }

    #[test]
    fn test_property_parse() {
        assert_eq!(
            "primaryNeurite".parse::<SegmentProperty>().unwrap(),
            SegmentProperty::PrimaryNeurite
        );
        assert!("bogus".parse::<SegmentProperty>().is_err());
        assert!(!SegmentProperty::Size.promotes_to_neuron());
    }
}
