// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent writers against one in-memory store.

use connectome_store::{
    GraphRead, GraphStore, GraphTransaction, GraphWrite, InMemoryGraph, LockSet, NodeId,
    Properties, PropertyValue,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn counter_node(graph: &InMemoryGraph) -> NodeId {
    let mut tx = graph.begin();
    let mut props = Properties::new();
    props.insert("count".to_string(), PropertyValue::Int(0));
    let id = tx.create_node(&["Meta"], props).unwrap();
    tx.commit().unwrap();
    id
}

#[test]
fn test_locked_increments_are_not_lost() {
    let graph = Arc::new(InMemoryGraph::new());
    let meta = counter_node(&graph);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let graph = Arc::clone(&graph);
            thread::spawn(move || {
                for _ in 0..25 {
                    let mut tx = graph.begin();
                    tx.lock(&LockSet::with_root(meta)).unwrap();
                    let current = tx.node(meta).unwrap().unwrap().int("count").unwrap();
                    tx.set_node_property(meta, "count", PropertyValue::Int(current + 1))
                        .unwrap();
                    tx.commit().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(graph.node(meta).unwrap().unwrap().int("count"), Some(200));
    assert!(graph.locks().locked_targets().is_empty());
}

#[test]
fn test_reader_never_sees_partial_commit() {
    let graph = Arc::new(InMemoryGraph::new());
    let meta = counter_node(&graph);

    let writer = {
        let graph = Arc::clone(&graph);
        thread::spawn(move || {
            for round in 1..=50i64 {
                let mut tx = graph.begin();
                tx.set_node_property(meta, "count", PropertyValue::Int(round)).unwrap();
                tx.set_node_property(meta, "shadow", PropertyValue::Int(round)).unwrap();
                tx.commit().unwrap();
            }
        })
    };

    for _ in 0..200 {
        let node = graph.node(meta).unwrap().unwrap();
        if let Some(shadow) = node.int("shadow") {
            assert_eq!(node.int("count"), Some(shadow));
        }
    }
    writer.join().unwrap();
}

#[test]
fn test_read_view_pins_one_commit_across_lookups() {
    let graph = InMemoryGraph::new();
    let first = counter_node(&graph);
    let second = counter_node(&graph);

    thread::scope(|scope| {
        let view = graph.read_view();
        let writer = scope.spawn(|| {
            let mut tx = graph.begin();
            tx.set_node_property(first, "count", PropertyValue::Int(1)).unwrap();
            tx.set_node_property(second, "count", PropertyValue::Int(1)).unwrap();
            tx.commit().unwrap();
        });
        thread::sleep(Duration::from_millis(50));

        // The commit waits for the view, so both nodes still read 0.
        assert_eq!(view.node(first).unwrap().unwrap().int("count"), Some(0));
        assert!(!writer.is_finished());
        assert_eq!(view.node(second).unwrap().unwrap().int("count"), Some(0));
        drop(view);
        writer.join().unwrap();
    });

    let view = graph.read_view();
    assert_eq!(view.node(first).unwrap().unwrap().int("count"), Some(1));
    assert_eq!(view.node(second).unwrap().unwrap().int("count"), Some(1));
    assert_eq!(view.nodes_with_label("Meta").unwrap().len(), 2);
}
