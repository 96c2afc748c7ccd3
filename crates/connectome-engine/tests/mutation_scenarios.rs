// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end mutation tests against the in-memory store.
//!
//! Every test finishes with a full audit so derived values are checked
//! against a from-scratch recount, not only the fields asserted directly.

use connectome_engine::{ConnectomeEngine, EngineOptions, MutationOutcome};
use connectome_store::InMemoryGraph;
use connectome_structures::{
    HpThresholds, Location, MutationKey, SegmentAddition, SegmentProperty, SegmentPropertyUpdate,
    SynapseAddition, SynapseRef, SynapseType,
};

const UUID: &str = "0f8b6c1e-3c2a-4d5b-9e7f-112233445566";

const PRE: Location = Location::new(0, 0, 0);
const POST: Location = Location::new(1, 1, 1);

fn open_engine() -> ConnectomeEngine<InMemoryGraph> {
    ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("hemibrain"))
        .expect("Failed to open dataset")
}

fn add_synapse(
    engine: &ConnectomeEngine<InMemoryGraph>,
    location: Location,
    kind: SynapseType,
    confidence: f64,
    rois: &[&str],
) {
    let addition = SynapseAddition::new(location, kind, confidence).with_rois(rois.iter().copied());
    assert_eq!(
        engine.add_synapse(&addition).expect("Failed to add synapse"),
        MutationOutcome::Applied
    );
}

fn segment_addition(body_id: u64, mutation_id: u64, synapses: &[(Location, SynapseType)]) -> SegmentAddition {
    SegmentAddition::new(body_id, UUID, mutation_id).with_synapses(
        synapses
            .iter()
            .map(|&(location, kind)| SynapseRef { location, kind }),
    )
}

fn assert_consistent(engine: &ConnectomeEngine<InMemoryGraph>) {
    let report = engine.audit().expect("Audit failed");
    assert!(report.is_consistent(), "{}", report);
}

/// Linked, orphaned pre/post pair tagged R1.
fn scenario_a() -> ConnectomeEngine<InMemoryGraph> {
    let engine = open_engine();
    add_synapse(&engine, PRE, SynapseType::Pre, 0.9, &["R1"]);
    add_synapse(&engine, POST, SynapseType::Post, 0.9, &["R1"]);
    engine.link_synapses(PRE, POST).expect("Failed to link");
    engine
}

/// Scenario A with the pre-synapse owned by 10 and the post-synapse by 20.
fn scenario_b() -> ConnectomeEngine<InMemoryGraph> {
    let engine = scenario_a();
    engine
        .add_segment(&segment_addition(10, 1, &[(PRE, SynapseType::Pre)]))
        .expect("Failed to add segment 10");
    engine
        .add_segment(&segment_addition(20, 2, &[(POST, SynapseType::Post)]))
        .expect("Failed to add segment 20");
    engine
}

#[test]
fn test_orphaned_synapses_count_only_in_meta() {
    let engine = scenario_a();

    let meta = engine.meta().unwrap();
    assert_eq!(meta.total_pre_count, 1);
    assert_eq!(meta.total_post_count, 1);
    let r1 = meta.roi_info.get("R1").unwrap();
    assert_eq!((r1.pre(), r1.post()), (1, 1));

    let pre = engine.synapse(PRE).unwrap().unwrap();
    assert!(pre.is_orphan());
    assert_eq!(pre.partners, vec![POST]);
    assert!(engine.connects_to(10, 20).unwrap().is_none());
    assert_consistent(&engine);
}

#[test]
fn test_segments_sharing_a_link_are_connected() {
    let engine = scenario_b();

    let edge = engine.connects_to(10, 20).unwrap().unwrap();
    assert_eq!(edge.weight, 1);
    assert_eq!(edge.weight_hp, None);

    let set = engine.connection_set(10, 20).unwrap().unwrap();
    let r1 = set.roi_info.get("R1").unwrap();
    assert_eq!((r1.pre(), r1.post()), (1, 1));
    assert_eq!(set.synapses, vec![PRE, POST]);

    let ten = engine.segment(10).unwrap().unwrap();
    assert_eq!((ten.pre_count, ten.post_count), (1, 0));
    assert_eq!(ten.rois, vec!["R1".to_string()]);
    assert!(!ten.is_neuron);
    assert_eq!(engine.synapse(PRE).unwrap().unwrap().owner, Some(10));
    assert_consistent(&engine);
}

#[test]
fn test_orphaning_removes_the_connection() {
    let engine = scenario_b();

    assert_eq!(engine.orphan_synapse(POST).unwrap(), MutationOutcome::Applied);
    assert!(engine.connects_to(10, 20).unwrap().is_none());
    assert!(engine.connection_set(10, 20).unwrap().is_none());

    let twenty = engine.segment(20).unwrap().unwrap();
    assert_eq!(twenty.post_count, 0);
    assert!(twenty.roi_info.is_empty());
    assert!(twenty.rois.is_empty());

    assert_eq!(engine.orphan_synapse(POST).unwrap(), MutationOutcome::Skipped);
    assert!(engine
        .orphan_synapse(Location::new(9, 9, 9))
        .unwrap_err()
        .is_not_found());
    assert_consistent(&engine);
}

#[test]
fn test_deleting_a_segment_orphans_its_synapses() {
    let engine = scenario_b();

    assert_eq!(engine.delete_segment(10).unwrap(), MutationOutcome::Applied);
    assert!(engine.segment(10).unwrap().is_none());
    assert!(engine.synapse(PRE).unwrap().unwrap().is_orphan());
    assert!(engine.connection_set(10, 20).unwrap().is_none());
    assert!(engine.connections_of(20).unwrap().is_empty());
    assert_eq!(engine.segment(20).unwrap().unwrap().post_count, 1);
    assert_eq!(engine.meta().unwrap().total_pre_count, 1);

    assert_eq!(engine.delete_segment(10).unwrap(), MutationOutcome::Skipped);
    assert_consistent(&engine);
}

#[test]
fn test_replayed_mutation_key_is_a_conflict() {
    let engine = scenario_b();
    engine.delete_segment(10).unwrap();

    let err = engine
        .add_segment(&segment_addition(10, 1, &[(PRE, SynapseType::Pre)]))
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(engine.segment(10).unwrap().is_none());
    assert!(engine.synapse(PRE).unwrap().unwrap().is_orphan());

    let err = engine.add_segment(&segment_addition(20, 3, &[])).unwrap_err();
    assert!(err.is_conflict());
    assert_consistent(&engine);
}

#[test]
fn test_mutation_uuid_is_stored_as_sent() {
    let engine = open_engine();
    let simple = "28841c8277e044a7b187dda03e18da13";
    let hyphenated = "28841c82-77e0-44a7-b187-dda03e18da13";

    engine.add_segment(&SegmentAddition::new(30, "7254f", 1)).unwrap();
    engine.add_segment(&SegmentAddition::new(31, simple, 1)).unwrap();

    let reader = engine.reader();
    assert!(reader.mutation_applied(&MutationKey::new("7254f", 1, 30).unwrap()).unwrap());
    assert!(reader.mutation_applied(&MutationKey::new(simple, 1, 31).unwrap()).unwrap());
    assert!(!reader.mutation_applied(&MutationKey::new(hyphenated, 1, 31).unwrap()).unwrap());

    engine.delete_segment(30).unwrap();
    let err = engine.add_segment(&SegmentAddition::new(30, "7254f", 1)).unwrap_err();
    assert!(err.is_conflict());
    assert!(engine.segment(30).unwrap().is_none());
    assert_consistent(&engine);
}

#[test]
fn test_occupied_location_is_rejected() {
    let engine = scenario_b();
    let err = engine
        .add_synapse(&SynapseAddition::new(PRE, SynapseType::Pre, 0.5))
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(engine.meta().unwrap().total_pre_count, 1);
    assert_eq!(engine.connects_to(10, 20).unwrap().unwrap().weight, 1);
    assert_consistent(&engine);
}

#[test]
fn test_add_segment_validates_listed_synapses() {
    let engine = scenario_b();
    let stray = Location::new(5, 5, 5);
    add_synapse(&engine, stray, SynapseType::Post, 0.9, &[]);

    let missing = segment_addition(30, 10, &[(Location::new(7, 7, 7), SynapseType::Pre)]);
    assert!(engine.add_segment(&missing).unwrap_err().is_not_found());

    let wrong_type = segment_addition(30, 11, &[(stray, SynapseType::Pre)]);
    assert!(engine.add_segment(&wrong_type).unwrap_err().is_consistency());

    // The second synapse is owned, so the whole addition rolls back.
    let owned = segment_addition(30, 12, &[(stray, SynapseType::Post), (PRE, SynapseType::Pre)]);
    assert!(engine.add_segment(&owned).unwrap_err().is_consistency());
    assert!(engine.segment(30).unwrap().is_none());
    assert!(engine.synapse(stray).unwrap().unwrap().is_orphan());

    let bad_uuid = SegmentAddition::new(30, "not:a:uuid", 13);
    assert!(engine.add_segment(&bad_uuid).unwrap_err().is_validation());
    assert_consistent(&engine);
}

#[test]
fn test_roi_changes_reach_every_aggregate() {
    let engine = scenario_b();

    engine.add_roi_to_synapse(POST, "R2").unwrap();
    let twenty = engine.segment(20).unwrap().unwrap();
    assert_eq!(twenty.rois, vec!["R1".to_string(), "R2".to_string()]);
    assert_eq!(engine.meta().unwrap().roi_info.get("R2").unwrap().post(), 1);
    let set = engine.connection_set(10, 20).unwrap().unwrap();
    assert_eq!(set.roi_info.get("R2").unwrap().post(), 1);

    engine.remove_roi_from_synapse(PRE, "R1").unwrap();
    let ten = engine.segment(10).unwrap().unwrap();
    assert!(ten.roi_info.is_empty());
    let set = engine.connection_set(10, 20).unwrap().unwrap();
    let r1 = set.roi_info.get("R1").unwrap();
    assert_eq!((r1.pre(), r1.post()), (0, 1));

    assert!(engine.add_roi_to_synapse(POST, "R2").unwrap_err().is_conflict());
    assert!(engine.remove_roi_from_synapse(PRE, "R1").unwrap_err().is_conflict());
    assert!(engine.add_roi_to_synapse(POST, "").unwrap_err().is_validation());
    assert_consistent(&engine);
}

#[test]
fn test_deleting_an_owned_synapse() {
    let engine = scenario_b();

    assert_eq!(engine.delete_synapse(POST).unwrap(), MutationOutcome::Applied);
    assert!(engine.synapse(POST).unwrap().is_none());
    assert!(engine.connects_to(10, 20).unwrap().is_none());
    assert_eq!(engine.segment(20).unwrap().unwrap().post_count, 0);
    let meta = engine.meta().unwrap();
    assert_eq!((meta.total_pre_count, meta.total_post_count), (1, 0));
    assert_eq!(meta.roi_info.get("R1").unwrap().post(), 0);
    assert!(engine.synapse(PRE).unwrap().unwrap().partners.is_empty());

    assert_eq!(engine.delete_synapse(POST).unwrap(), MutationOutcome::Skipped);
    assert_consistent(&engine);
}

#[test]
fn test_unlink_and_relink_owned_synapses() {
    let engine = scenario_b();

    engine.unlink_synapses(PRE, POST).unwrap();
    assert!(engine.connects_to(10, 20).unwrap().is_none());
    assert!(engine.connection_set(10, 20).unwrap().is_none());
    assert!(engine.unlink_synapses(PRE, POST).unwrap_err().is_not_found());

    engine.link_synapses(PRE, POST).unwrap();
    assert_eq!(engine.connects_to(10, 20).unwrap().unwrap().weight, 1);
    assert!(engine.connection_set(10, 20).unwrap().is_some());
    assert!(engine.link_synapses(PRE, POST).unwrap_err().is_conflict());
    assert!(engine.link_synapses(POST, PRE).unwrap_err().is_consistency());
    assert_consistent(&engine);
}

#[test]
fn test_adding_a_synapse_to_a_segment_raises_weight() {
    let engine = scenario_b();
    let second = Location::new(2, 2, 2);
    add_synapse(&engine, second, SynapseType::Pre, 0.9, &["R3"]);
    engine.link_synapses(second, POST).unwrap();
    assert_eq!(engine.connects_to(10, 20).unwrap().unwrap().weight, 1);

    engine.add_synapse_to_segment(second, 10).unwrap();
    let ten = engine.segment(10).unwrap().unwrap();
    assert_eq!(ten.pre_count, 2);
    assert!(ten.is_neuron);
    assert_eq!(engine.connects_to(10, 20).unwrap().unwrap().weight, 2);
    assert_eq!(engine.connection_set(10, 20).unwrap().unwrap().synapses.len(), 3);

    assert!(engine
        .add_synapse_to_segment(second, 20)
        .unwrap_err()
        .is_consistency());
    assert!(engine
        .add_synapse_to_segment(second, 99)
        .unwrap_err()
        .is_not_found());
    assert_consistent(&engine);
}

#[test]
fn test_self_connection() {
    let engine = scenario_a();
    engine
        .add_segment(&segment_addition(
            40,
            1,
            &[(PRE, SynapseType::Pre), (POST, SynapseType::Post)],
        ))
        .unwrap();

    assert_eq!(engine.connects_to(40, 40).unwrap().unwrap().weight, 1);
    assert_eq!(engine.connections_of(40).unwrap().len(), 1);
    assert_consistent(&engine);

    engine.delete_segment(40).unwrap();
    assert_eq!(engine.meta().unwrap().total_post_count, 1);
    assert_consistent(&engine);
}

#[test]
fn test_high_precision_weights() {
    let thresholds = HpThresholds::new(0.5, 0.8).unwrap();
    let engine = ConnectomeEngine::open(
        InMemoryGraph::new(),
        EngineOptions::new("hemibrain").with_thresholds(thresholds),
    )
    .unwrap();
    let strong = Location::new(1, 0, 0);
    let weak = Location::new(2, 0, 0);
    add_synapse(&engine, PRE, SynapseType::Pre, 0.9, &["EB"]);
    add_synapse(&engine, strong, SynapseType::Post, 0.85, &["EB"]);
    add_synapse(&engine, weak, SynapseType::Post, 0.8, &["EB"]);
    engine.link_synapses(PRE, strong).unwrap();
    engine.link_synapses(PRE, weak).unwrap();
    engine
        .add_segment(&segment_addition(10, 1, &[(PRE, SynapseType::Pre)]))
        .unwrap();
    engine
        .add_segment(&segment_addition(
            20,
            2,
            &[(strong, SynapseType::Post), (weak, SynapseType::Post)],
        ))
        .unwrap();

    let edge = engine.connects_to(10, 20).unwrap().unwrap();
    assert_eq!(edge.weight, 2);
    assert_eq!(edge.weight_hp, Some(1));
    let set = engine.connection_set(10, 20).unwrap().unwrap();
    let eb = set.roi_info.get("EB").unwrap();
    assert_eq!((eb.pre(), eb.post()), (1, 2));
    assert_eq!((eb.pre_hp(), eb.post_hp()), (Some(1), Some(1)));
    assert!(engine.segment(20).unwrap().unwrap().roi_info.get("EB").unwrap().post_hp().is_none());
    assert_eq!(engine.meta().unwrap().thresholds, Some(thresholds));

    engine.orphan_synapse(strong).unwrap();
    let edge = engine.connects_to(10, 20).unwrap().unwrap();
    assert_eq!((edge.weight, edge.weight_hp), (1, Some(0)));
    assert_consistent(&engine);
}

#[test]
fn test_neuron_designation_follows_properties() {
    let engine = open_engine();
    engine.add_segment(&segment_addition(30, 1, &[])).unwrap();
    assert!(!engine.segment(30).unwrap().unwrap().is_neuron);

    let update = SegmentPropertyUpdate {
        status: Some("Traced".to_string()),
        size: Some(4096),
        ..Default::default()
    };
    engine.update_segment_properties(30, &update).unwrap();
    let segment = engine.segment(30).unwrap().unwrap();
    assert!(segment.is_neuron);
    assert_eq!(segment.status.as_deref(), Some("Traced"));
    assert_eq!(segment.size, Some(4096));

    engine.remove_segment_property(30, SegmentProperty::Status).unwrap();
    assert!(!engine.segment(30).unwrap().unwrap().is_neuron);
    assert_eq!(
        engine.remove_segment_property(30, SegmentProperty::Status).unwrap(),
        MutationOutcome::Skipped
    );

    let empty = SegmentPropertyUpdate::default();
    assert!(engine.update_segment_properties(30, &empty).unwrap_err().is_validation());
    assert!(engine.update_segment_properties(31, &update).unwrap_err().is_not_found());
    assert_consistent(&engine);
}

#[test]
fn test_segment_addition_properties_promote() {
    let engine = open_engine();
    let mut addition = segment_addition(50, 1, &[]);
    addition.name = Some("MBON01".to_string());
    engine.add_segment(&addition).unwrap();
    let segment = engine.segment(50).unwrap().unwrap();
    assert!(segment.is_neuron);
    assert_eq!(segment.name.as_deref(), Some("MBON01"));
    assert_consistent(&engine);
}

#[test]
fn test_last_database_edit_moves_forward() {
    let engine = open_engine();
    let before = engine.meta().unwrap().last_database_edit.unwrap();
    add_synapse(&engine, PRE, SynapseType::Pre, 0.9, &[]);
    let after = engine.meta().unwrap().last_database_edit.unwrap();
    assert!(after >= before);

    // Skipped mutations leave it alone.
    engine.delete_segment(77).unwrap();
    assert_eq!(engine.meta().unwrap().last_database_edit.unwrap(), after);
}

#[test]
fn test_reopening_keeps_stored_thresholds() {
    let store = InMemoryGraph::new();
    let thresholds = HpThresholds::new(0.3, 0.4).unwrap();
    let engine = ConnectomeEngine::open(
        store,
        EngineOptions::new("hemibrain").with_thresholds(thresholds),
    )
    .unwrap();
    let snapshot = engine.store().snapshot();

    let reopened = ConnectomeEngine::open(
        InMemoryGraph::from_snapshot(snapshot).unwrap(),
        EngineOptions::new("hemibrain"),
    )
    .unwrap();
    assert_eq!(reopened.thresholds(), Some(&thresholds));

    assert!(ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("bad name"))
        .unwrap_err()
        .is_validation());
}
