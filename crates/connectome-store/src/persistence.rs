// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Graph snapshots (save/load)
//!
//! A snapshot is the committed contents of an [`InMemoryGraph`] encoded as
//! JSON: every node and relationship with its id, the declared indexes, and
//! the id counters. Saving writes a sibling temporary file and renames it over
//! the target so a crash never leaves a half-written snapshot behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::memory::{GraphState, InMemoryGraph};
use crate::types::{Edge, EdgeRecord, Node, NodeRecord};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub label: String,
    pub key: String,
}

/// Serializable copy of a committed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub next_node_id: u64,
    pub next_edge_id: u64,
    pub indexes: Vec<IndexSpec>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn save_to_file(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::SnapshotFormat(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

impl InMemoryGraph {
    /// Capture the committed state.
    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read();
        GraphSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            next_node_id: self.next_node.load(Ordering::SeqCst),
            next_edge_id: self.next_edge.load(Ordering::SeqCst),
            indexes: state
                .index_specs()
                .into_iter()
                .map(|(label, key)| IndexSpec { label, key })
                .collect(),
            nodes: state
                .nodes
                .iter()
                .map(|(id, record)| Node::from_record(*id, record.clone()))
                .collect(),
            edges: state
                .edges
                .iter()
                .map(|(id, record)| Edge::from_record(*id, record.clone()))
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> StoreResult<Self> {
        let mut state = GraphState::default();
        for spec in &snapshot.indexes {
            state.ensure_index(&spec.label, &spec.key);
        }
        let mut next_node = snapshot.next_node_id;
        for node in snapshot.nodes {
            next_node = next_node.max(node.id.0 + 1);
            state.put_node(
                node.id,
                NodeRecord {
                    labels: node.labels,
                    properties: node.properties,
                },
            );
        }
        let mut next_edge = snapshot.next_edge_id;
        for edge in snapshot.edges {
            for endpoint in [edge.from, edge.to] {
                if !state.nodes.contains_key(&endpoint) {
                    return Err(StoreError::SnapshotFormat(format!(
                        "relationship {} references missing node {}",
                        edge.id, endpoint
                    )));
                }
            }
            next_edge = next_edge.max(edge.id.0 + 1);
            state.put_edge(
                edge.id,
                EdgeRecord {
                    rel_type: edge.rel_type,
                    from: edge.from,
                    to: edge.to,
                    properties: edge.properties,
                },
            );
        }
        Ok(Self::from_state(state, next_node, next_edge))
    }

    pub fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let snapshot = self.snapshot();
        snapshot.save_to_file(path)?;
        info!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            relationships = snapshot.edges.len(),
            "graph snapshot saved"
        );
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> StoreResult<Self> {
        let graph = Self::from_snapshot(GraphSnapshot::load_from_file(path)?)?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            relationships = graph.edge_count(),
            "graph snapshot loaded"
        );
        Ok(graph)
    }
}
