// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bulk loading against incremental construction, and snapshot restore.

use connectome::config::ConnectomeConfig;
use connectome::prelude::*;

const UUID: &str = "c4b3a291-7f6e-4d5c-8b4a-39281706f5e4";
const BODIES: [u64; 3] = [1, 2, 3];

struct Fixture {
    synapses: Vec<SynapseAddition>,
    links: Vec<SynapseLink>,
    segments: Vec<(u64, Vec<Location>, Option<&'static str>)>,
}

fn pre(x: i64) -> Location {
    Location::new(x, 0, 0)
}

fn post(x: i64) -> Location {
    Location::new(x, 1, 0)
}

fn fixture() -> Fixture {
    let synapses = vec![
        SynapseAddition::new(pre(0), SynapseType::Pre, 0.9).with_rois(["EB"]),
        SynapseAddition::new(pre(1), SynapseType::Pre, 0.3).with_rois(["EB", "FB"]),
        SynapseAddition::new(pre(2), SynapseType::Pre, 0.7).with_rois(["FB"]),
        SynapseAddition::new(pre(3), SynapseType::Pre, 0.9),
        SynapseAddition::new(post(0), SynapseType::Post, 0.9).with_rois(["EB"]),
        SynapseAddition::new(post(1), SynapseType::Post, 0.6).with_rois(["EB"]),
        SynapseAddition::new(post(2), SynapseType::Post, 0.95).with_rois(["FB"]),
        SynapseAddition::new(post(3), SynapseType::Post, 0.85),
        SynapseAddition::new(post(4), SynapseType::Post, 0.9).with_rois(["PB"]),
        SynapseAddition::new(post(5), SynapseType::Post, 0.1).with_rois(["FB"]),
    ];
    let links = [(0, 0), (0, 1), (1, 2), (2, 3), (2, 0), (3, 4), (1, 5)]
        .into_iter()
        .map(|(p, q)| SynapseLink {
            pre: pre(p),
            post: post(q),
        })
        .collect();
    let segments = vec![
        (1, vec![pre(0), pre(1), post(5)], Some("Traced")),
        (2, vec![post(0), post(1), post(2)], None),
        (3, vec![pre(2), post(3)], None),
    ];
    Fixture {
        synapses,
        links,
        segments,
    }
}

fn options() -> EngineOptions {
    EngineOptions::new("hemibrain").with_thresholds(HpThresholds::new(0.5, 0.8).unwrap())
}

fn kind_at(location: Location) -> SynapseType {
    if location.y == 0 {
        SynapseType::Pre
    } else {
        SynapseType::Post
    }
}

fn bulk_engine(fixture: &Fixture) -> ConnectomeEngine<InMemoryGraph> {
    let engine = ConnectomeEngine::open(InMemoryGraph::new(), options()).unwrap();
    let dataset = BulkDataset {
        synapses: fixture.synapses.clone(),
        links: fixture.links.clone(),
        segments: fixture
            .segments
            .iter()
            .map(|(body, synapses, status)| {
                let mut segment = BulkSegment::new(*body, synapses.iter().copied());
                segment.properties.status = status.map(str::to_string);
                segment
            })
            .collect(),
    };
    let report = engine.bulk_load(&dataset).unwrap();
    assert_eq!(report.synapses, 10);
    assert_eq!(report.links, 7);
    assert_eq!(report.segments, 3);
    assert_eq!(report.unowned_links, 1);
    engine
}

fn incremental_engine(fixture: &Fixture) -> ConnectomeEngine<InMemoryGraph> {
    let engine = ConnectomeEngine::open(InMemoryGraph::new(), options()).unwrap();
    for synapse in &fixture.synapses {
        engine.add_synapse(synapse).unwrap();
    }
    for link in &fixture.links {
        engine.link_synapses(link.pre, link.post).unwrap();
    }
    for (i, (body, synapses, status)) in fixture.segments.iter().enumerate() {
        let mut addition = SegmentAddition::new(*body, UUID, i as u64).with_synapses(
            synapses.iter().map(|&location| SynapseRef {
                location,
                kind: kind_at(location),
            }),
        );
        addition.status = status.map(str::to_string);
        engine.add_segment(&addition).unwrap();
    }
    engine
}

fn assert_same_derived_state(
    left: &ConnectomeEngine<InMemoryGraph>,
    right: &ConnectomeEngine<InMemoryGraph>,
) {
    for body in BODIES {
        let mut a = left.segment(body).unwrap().unwrap();
        let mut b = right.segment(body).unwrap().unwrap();
        a.time_stamp = None;
        b.time_stamp = None;
        assert_eq!(a, b, "segment {}", body);

        for other in BODIES {
            assert_eq!(
                left.connects_to(body, other).unwrap(),
                right.connects_to(body, other).unwrap(),
                "ConnectsTo {} -> {}",
                body,
                other
            );
            let a = left.connection_set(body, other).unwrap();
            let b = right.connection_set(body, other).unwrap();
            assert_eq!(
                a.map(|set| (set.roi_info, set.synapses)),
                b.map(|set| (set.roi_info, set.synapses)),
                "ConnectionSet {} -> {}",
                body,
                other
            );
        }
    }

    let (a, b) = (left.meta().unwrap(), right.meta().unwrap());
    assert_eq!(a.total_pre_count, b.total_pre_count);
    assert_eq!(a.total_post_count, b.total_post_count);
    assert_eq!(a.roi_info, b.roi_info);
    assert_eq!(a.thresholds, b.thresholds);
}

#[test]
fn test_bulk_load_matches_incremental_construction() {
    let fixture = fixture();
    let bulk = bulk_engine(&fixture);
    let incremental = incremental_engine(&fixture);

    assert!(bulk.audit().unwrap().is_consistent());
    assert!(incremental.audit().unwrap().is_consistent());
    assert_same_derived_state(&bulk, &incremental);

    // Only q0 and q2 clear the post threshold.
    let edge = bulk.connects_to(1, 2).unwrap().unwrap();
    assert_eq!(edge.weight, 3);
    assert_eq!(edge.weight_hp, Some(2));
    assert!(bulk.connects_to(1, 1).unwrap().is_some());
    assert!(bulk.segment(1).unwrap().unwrap().is_neuron);
    assert!(!bulk.segment(3).unwrap().unwrap().is_neuron);
}

#[test]
fn test_bulk_loaded_dataset_accepts_further_mutations() {
    let fixture = fixture();
    let bulk = bulk_engine(&fixture);
    let incremental = incremental_engine(&fixture);

    for engine in [&bulk, &incremental] {
        engine.add_synapse_to_segment(post(4), 2).unwrap();
        engine.orphan_synapse(pre(1)).unwrap();
        engine.add_roi_to_synapse(post(0), "PB").unwrap();
        assert!(engine.audit().unwrap().is_consistent());
    }
    assert_same_derived_state(&bulk, &incremental);
    assert!(bulk.connects_to(1, 1).unwrap().is_none());
}

#[test]
fn test_bulk_load_requires_an_empty_dataset() {
    let fixture = fixture();
    let engine = bulk_engine(&fixture);
    let err = engine
        .bulk_load(&BulkDataset {
            synapses: vec![SynapseAddition::new(pre(9), SynapseType::Pre, 1.0)],
            ..BulkDataset::default()
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(engine.synapse(pre(9)).unwrap().is_none());
}

#[test]
fn test_bulk_load_from_json() {
    let engine = ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("json")).unwrap();
    let dataset = BulkDataset::from_json_str(
        r#"{
            "synapses": [
                {"location": [1, 0, 0], "type": "pre", "confidence": 0.9, "rois": ["EB"]},
                {"location": [2, 0, 0], "type": "post", "rois": ["EB"]}
            ],
            "links": [{"pre": [1, 0, 0], "post": [2, 0, 0]}],
            "segments": [
                {"bodyId": 10, "synapses": [[1, 0, 0]], "name": "EPG"},
                {"bodyId": 20, "synapses": [[2, 0, 0]]}
            ]
        }"#,
    )
    .unwrap();
    engine.bulk_load(&dataset).unwrap();

    assert_eq!(engine.connects_to(10, 20).unwrap().unwrap().weight, 1);
    let segment = engine.segment(10).unwrap().unwrap();
    assert_eq!(segment.name.as_deref(), Some("EPG"));
    assert_eq!(segment.rois, vec!["EB".to_string()]);
    assert!(engine.meta().unwrap().last_database_edit.is_some());
    assert!(engine.audit().unwrap().is_consistent());
}

#[test]
fn test_snapshot_restore_through_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hemibrain.json");

    let fixture = fixture();
    let original = bulk_engine(&fixture);
    original.delete_segment(3).unwrap();
    original.save_snapshot(&path).unwrap();

    let mut config = ConnectomeConfig::default();
    config.dataset.name = "hemibrain".to_string();
    config.persistence.snapshot_path = Some(path);
    let restored = ConnectomeEngine::in_memory(&config).unwrap();

    // Thresholds come from the stored Meta node, not the config.
    assert_eq!(
        restored.thresholds().copied(),
        Some(HpThresholds::new(0.5, 0.8).unwrap())
    );
    assert!(restored.segment(3).unwrap().is_none());
    assert!(restored.audit().unwrap().is_consistent());
    assert_same_derived_state_without(&original, &restored, 3);

    restored.add_synapse_to_segment(pre(2), 1).unwrap();
    assert!(restored.audit().unwrap().is_consistent());
}

fn assert_same_derived_state_without(
    left: &ConnectomeEngine<InMemoryGraph>,
    right: &ConnectomeEngine<InMemoryGraph>,
    removed: u64,
) {
    for body in BODIES.into_iter().filter(|&b| b != removed) {
        assert_eq!(left.segment(body).unwrap(), right.segment(body).unwrap());
        assert_eq!(
            left.connections_of(body).unwrap(),
            right.connections_of(body).unwrap()
        );
    }
    assert_eq!(left.meta().unwrap(), right.meta().unwrap());
}
