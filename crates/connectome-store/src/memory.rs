// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
In-memory transactional property graph.

Committed data lives in a [`GraphState`] behind a `parking_lot::RwLock`.
Each transaction stages its writes in a private overlay and reads through it,
so it sees its own changes plus whatever has been committed by others
(read-committed). On commit the overlay is applied under the write lock in a
single step, which makes a transaction's effects visible all at once.

Writes to entities that existed before the transaction take a pessimistic
write lock from the store's [`EntityLockManager`]. Creating or deleting a
relationship also locks both endpoints. Locks are released when the
transaction ends, whether by commit, rollback, or drop.
*/

use ahash::{AHashMap, AHashSet};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::locks::{EntityLockManager, LockSet, LockTarget, TxnId};
use crate::traits::{GraphRead, GraphStore, GraphTransaction, GraphWrite};
use crate::types::{
    Direction, Edge, EdgeId, EdgeRecord, IndexKey, Node, NodeId, NodeRecord, Properties,
    PropertyValue,
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

type PropertyIndex = AHashMap<IndexKey, BTreeSet<NodeId>>;

// ============================================================================
// Committed state
// ============================================================================

/// Committed graph contents plus the lookup structures derived from them.
#[derive(Default)]
pub(crate) struct GraphState {
    pub(crate) nodes: BTreeMap<NodeId, NodeRecord>,
    pub(crate) edges: BTreeMap<EdgeId, EdgeRecord>,
    outgoing: AHashMap<NodeId, BTreeSet<EdgeId>>,
    incoming: AHashMap<NodeId, BTreeSet<EdgeId>>,
    labels: AHashMap<String, BTreeSet<NodeId>>,
    indexes: AHashMap<(String, String), PropertyIndex>,
}

impl GraphState {
    fn index_node(&mut self, id: NodeId, record: &NodeRecord) {
        for label in &record.labels {
            self.labels.entry(label.clone()).or_default().insert(id);
        }
        for ((label, key), entries) in self.indexes.iter_mut() {
            if !record.labels.contains(label) {
                continue;
            }
            if let Some(index_key) = record.properties.get(key).and_then(PropertyValue::index_key) {
                entries.entry(index_key).or_default().insert(id);
            }
        }
    }

    fn unindex_node(&mut self, id: NodeId, record: &NodeRecord) {
        for label in &record.labels {
            if let Some(ids) = self.labels.get_mut(label) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.labels.remove(label);
                }
            }
        }
        for ((label, key), entries) in self.indexes.iter_mut() {
            if !record.labels.contains(label) {
                continue;
            }
            if let Some(index_key) = record.properties.get(key).and_then(PropertyValue::index_key) {
                if let Some(ids) = entries.get_mut(&index_key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        entries.remove(&index_key);
                    }
                }
            }
        }
    }

    pub(crate) fn put_node(&mut self, id: NodeId, record: NodeRecord) {
        if let Some(old) = self.nodes.remove(&id) {
            self.unindex_node(id, &old);
        }
        self.index_node(id, &record);
        self.nodes.insert(id, record);
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<NodeRecord> {
        let old = self.nodes.remove(&id)?;
        self.unindex_node(id, &old);
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        Some(old)
    }

    fn unlink_edge(&mut self, id: EdgeId, record: &EdgeRecord) {
        if let Some(ids) = self.outgoing.get_mut(&record.from) {
            ids.remove(&id);
        }
        if let Some(ids) = self.incoming.get_mut(&record.to) {
            ids.remove(&id);
        }
    }

    pub(crate) fn put_edge(&mut self, id: EdgeId, record: EdgeRecord) {
        if let Some(old) = self.edges.remove(&id) {
            self.unlink_edge(id, &old);
        }
        self.outgoing.entry(record.from).or_default().insert(id);
        self.incoming.entry(record.to).or_default().insert(id);
        self.edges.insert(id, record);
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<EdgeRecord> {
        let old = self.edges.remove(&id)?;
        self.unlink_edge(id, &old);
        Some(old)
    }

    /// Build the (`label`, `key`) index if it does not exist yet.
    pub(crate) fn ensure_index(&mut self, label: &str, key: &str) -> bool {
        let spec = (label.to_string(), key.to_string());
        if self.indexes.contains_key(&spec) {
            return false;
        }
        let mut entries = PropertyIndex::new();
        if let Some(ids) = self.labels.get(label) {
            for id in ids {
                let value = self.nodes.get(id).and_then(|record| record.properties.get(key));
                if let Some(index_key) = value.and_then(PropertyValue::index_key) {
                    entries.entry(index_key).or_default().insert(*id);
                }
            }
        }
        self.indexes.insert(spec, entries);
        true
    }

    pub(crate) fn index_specs(&self) -> Vec<(String, String)> {
        let mut specs: Vec<_> = self.indexes.keys().cloned().collect();
        specs.sort();
        specs
    }

    /// Superset of the nodes that may match; callers re-check each record.
    fn candidates(&self, label: &str, key: &str, value: &PropertyValue) -> Vec<NodeId> {
        if let Some(index_key) = value.index_key() {
            if let Some(entries) = self.indexes.get(&(label.to_string(), key.to_string())) {
                return entries
                    .get(&index_key)
                    .map(|ids| ids.iter().copied().collect())
                    .unwrap_or_default();
            }
        }
        self.labels
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn find(&self, label: &str, key: &str, value: &PropertyValue) -> Vec<Node> {
        self.candidates(label, key, value)
            .into_iter()
            .filter_map(|id| {
                let record = self.nodes.get(&id)?;
                record
                    .matches(label, key, value)
                    .then(|| Node::from_record(id, record.clone()))
            })
            .collect()
    }

    fn with_label(&self, label: &str) -> Vec<NodeId> {
        self.labels
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn edge_ids(&self, node: NodeId, direction: Direction) -> BTreeSet<EdgeId> {
        let mut ids = BTreeSet::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            if let Some(out) = self.outgoing.get(&node) {
                ids.extend(out.iter().copied());
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            if let Some(inc) = self.incoming.get(&node) {
                ids.extend(inc.iter().copied());
            }
        }
        ids
    }
}

fn type_matches(record: &EdgeRecord, rel_type: Option<&str>) -> bool {
    rel_type.map_or(true, |wanted| record.rel_type == wanted)
}

// ============================================================================
// Store
// ============================================================================

/// Thread-safe in-memory graph store.
pub struct InMemoryGraph {
    pub(crate) state: RwLock<GraphState>,
    pub(crate) next_node: AtomicU64,
    pub(crate) next_edge: AtomicU64,
    next_txn: AtomicU64,
    locks: EntityLockManager,
    lock_timeout: Duration,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::from_state(GraphState::default(), 0, 0)
    }

    pub(crate) fn from_state(state: GraphState, next_node: u64, next_edge: u64) -> Self {
        Self {
            state: RwLock::new(state),
            next_node: AtomicU64::new(next_node),
            next_edge: AtomicU64::new(next_edge),
            next_txn: AtomicU64::new(1),
            locks: EntityLockManager::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long a transaction waits for a contended lock before failing.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn locks(&self) -> &EntityLockManager {
        &self.locks
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphRead for GraphState {
    fn node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        Ok(self
            .nodes
            .get(&id)
            .map(|record| Node::from_record(id, record.clone())))
    }

    fn edge(&self, id: EdgeId) -> StoreResult<Option<Edge>> {
        Ok(self
            .edges
            .get(&id)
            .map(|record| Edge::from_record(id, record.clone())))
    }

    fn find_nodes(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Vec<Node>> {
        Ok(self.find(label, key, value))
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<Node>> {
        Ok(self
            .with_label(label)
            .into_iter()
            .filter_map(|id| {
                self.nodes
                    .get(&id)
                    .map(|record| Node::from_record(id, record.clone()))
            })
            .collect())
    }

    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        Ok(self
            .edge_ids(node, direction)
            .into_iter()
            .filter_map(|id| {
                let record = self.edges.get(&id)?;
                type_matches(record, rel_type).then(|| Edge::from_record(id, record.clone()))
            })
            .collect())
    }
}

/// Each call takes the read lock on its own, so two calls may observe
/// different commits. Use [`GraphStore::read_view`] to pin one.
impl GraphRead for InMemoryGraph {
    fn node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.state.read().node(id)
    }

    fn edge(&self, id: EdgeId) -> StoreResult<Option<Edge>> {
        self.state.read().edge(id)
    }

    fn find_nodes(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Vec<Node>> {
        self.state.read().find_nodes(label, key, value)
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<Node>> {
        self.state.read().nodes_with_label(label)
    }

    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        self.state.read().edges_of(node, direction, rel_type)
    }
}

/// Committed state held under the store's read lock.
///
/// Commits wait until the view is dropped, so keep it short-lived and
/// never open a transaction on the same thread while holding one.
pub struct InMemoryReadView<'g> {
    state: RwLockReadGuard<'g, GraphState>,
}

impl GraphRead for InMemoryReadView<'_> {
    fn node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.state.node(id)
    }

    fn edge(&self, id: EdgeId) -> StoreResult<Option<Edge>> {
        self.state.edge(id)
    }

    fn find_nodes(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Vec<Node>> {
        self.state.find_nodes(label, key, value)
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<Node>> {
        self.state.nodes_with_label(label)
    }

    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        self.state.edges_of(node, direction, rel_type)
    }
}

impl GraphStore for InMemoryGraph {
    type Transaction<'a> = InMemoryTransaction<'a>;

    type ReadView<'a> = InMemoryReadView<'a>;

    fn begin(&self) -> InMemoryTransaction<'_> {
        let id = TxnId(self.next_txn.fetch_add(1, Ordering::Relaxed));
        trace!(txn = id.0, "transaction started");
        InMemoryTransaction::new(self, id)
    }

    fn read_view(&self) -> InMemoryReadView<'_> {
        InMemoryReadView {
            state: self.state.read(),
        }
    }

    fn create_index(&self, label: &str, key: &str) {
        if self.state.write().ensure_index(label, key) {
            debug!(label, key, "created property index");
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A transaction over an [`InMemoryGraph`].
///
/// Staged entries map an id to `Some(record)` for created or updated
/// entities and to `None` for deleted ones.
pub struct InMemoryTransaction<'g> {
    graph: &'g InMemoryGraph,
    id: TxnId,
    held: AHashSet<LockTarget>,
    created_nodes: AHashSet<NodeId>,
    created_edges: AHashSet<EdgeId>,
    nodes: AHashMap<NodeId, Option<NodeRecord>>,
    edges: AHashMap<EdgeId, Option<EdgeRecord>>,
    added_out: AHashMap<NodeId, BTreeSet<EdgeId>>,
    added_in: AHashMap<NodeId, BTreeSet<EdgeId>>,
    staged_index: AHashMap<(String, IndexKey), BTreeSet<NodeId>>,
}

impl<'g> InMemoryTransaction<'g> {
    fn new(graph: &'g InMemoryGraph, id: TxnId) -> Self {
        Self {
            graph,
            id,
            held: AHashSet::new(),
            created_nodes: AHashSet::new(),
            created_edges: AHashSet::new(),
            nodes: AHashMap::new(),
            edges: AHashMap::new(),
            added_out: AHashMap::new(),
            added_in: AHashMap::new(),
            staged_index: AHashMap::new(),
        }
    }

    /// Number of locks currently held.
    pub fn held_lock_count(&self) -> usize {
        self.held.len()
    }

    pub fn holds_lock(&self, target: LockTarget) -> bool {
        self.held.contains(&target)
    }

    fn ensure_locked(&mut self, target: LockTarget) -> StoreResult<()> {
        let created = match target {
            LockTarget::Node(id) => self.created_nodes.contains(&id),
            LockTarget::Edge(id) => self.created_edges.contains(&id),
        };
        if created || self.held.contains(&target) {
            return Ok(());
        }
        self.graph
            .locks
            .lock(target, self.id, self.graph.lock_timeout)?;
        self.held.insert(target);
        Ok(())
    }

    fn current_node(&self, id: NodeId) -> Option<NodeRecord> {
        match self.nodes.get(&id) {
            Some(staged) => staged.clone(),
            None => self.graph.state.read().nodes.get(&id).cloned(),
        }
    }

    fn current_edge(&self, id: EdgeId) -> Option<EdgeRecord> {
        match self.edges.get(&id) {
            Some(staged) => staged.clone(),
            None => self.graph.state.read().edges.get(&id).cloned(),
        }
    }

    fn node_for_update(&mut self, id: NodeId) -> StoreResult<NodeRecord> {
        self.ensure_locked(LockTarget::Node(id))?;
        self.current_node(id).ok_or(StoreError::NodeNotFound(id))
    }

    fn stage_node(&mut self, id: NodeId, record: Option<NodeRecord>) {
        if let Some(Some(old)) = self.nodes.remove(&id) {
            for (key, value) in &old.properties {
                if let Some(index_key) = value.index_key() {
                    if let Some(ids) = self.staged_index.get_mut(&(key.clone(), index_key)) {
                        ids.remove(&id);
                    }
                }
            }
        }
        if let Some(new) = &record {
            for (key, value) in &new.properties {
                if let Some(index_key) = value.index_key() {
                    self.staged_index
                        .entry((key.clone(), index_key))
                        .or_default()
                        .insert(id);
                }
            }
        }
        self.nodes.insert(id, record);
    }
}

impl GraphRead for InMemoryTransaction<'_> {
    fn node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        Ok(self.current_node(id).map(|record| Node::from_record(id, record)))
    }

    fn edge(&self, id: EdgeId) -> StoreResult<Option<Edge>> {
        Ok(self.current_edge(id).map(|record| Edge::from_record(id, record)))
    }

    fn find_nodes(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Vec<Node>> {
        let mut found: Vec<Node> = {
            let state = self.graph.state.read();
            state
                .find(label, key, value)
                .into_iter()
                .filter(|node| !self.nodes.contains_key(&node.id))
                .collect()
        };

        let staged: Vec<NodeId> = match value.index_key() {
            Some(index_key) => self
                .staged_index
                .get(&(key.to_string(), index_key))
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            None => self.nodes.keys().copied().collect(),
        };
        for id in staged {
            if let Some(Some(record)) = self.nodes.get(&id) {
                if record.matches(label, key, value) {
                    found.push(Node::from_record(id, record.clone()));
                }
            }
        }
        found.sort_by_key(|node| node.id);
        Ok(found)
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<Node>> {
        let mut found: Vec<Node> = {
            let state = self.graph.state.read();
            state
                .with_label(label)
                .into_iter()
                .filter(|id| !self.nodes.contains_key(id))
                .filter_map(|id| {
                    state
                        .nodes
                        .get(&id)
                        .map(|record| Node::from_record(id, record.clone()))
                })
                .collect()
        };
        for (id, staged) in &self.nodes {
            if let Some(record) = staged {
                if record.labels.contains(label) {
                    found.push(Node::from_record(*id, record.clone()));
                }
            }
        }
        found.sort_by_key(|node| node.id);
        Ok(found)
    }

    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        let state = self.graph.state.read();
        let mut ids = state.edge_ids(node, direction);
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            if let Some(out) = self.added_out.get(&node) {
                ids.extend(out.iter().copied());
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            if let Some(inc) = self.added_in.get(&node) {
                ids.extend(inc.iter().copied());
            }
        }

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match self.edges.get(&id) {
                Some(Some(staged)) => staged,
                Some(None) => continue,
                None => match state.edges.get(&id) {
                    Some(committed) => committed,
                    None => continue,
                },
            };
            if type_matches(record, rel_type) {
                found.push(Edge::from_record(id, record.clone()));
            }
        }
        Ok(found)
    }
}

impl GraphWrite for InMemoryTransaction<'_> {
    fn lock(&mut self, set: &LockSet) -> StoreResult<()> {
        for target in set.ordered() {
            self.ensure_locked(target)?;
        }
        trace!(txn = self.id.0, locks = set.len(), "lock set acquired");
        Ok(())
    }

    fn create_node(&mut self, labels: &[&str], properties: Properties) -> StoreResult<NodeId> {
        let id = NodeId(self.graph.next_node.fetch_add(1, Ordering::Relaxed));
        let record = NodeRecord {
            labels: labels.iter().map(|label| label.to_string()).collect(),
            properties,
        };
        self.created_nodes.insert(id);
        self.stage_node(id, Some(record));
        Ok(id)
    }

    fn set_node_property(&mut self, id: NodeId, key: &str, value: PropertyValue) -> StoreResult<()> {
        let mut record = self.node_for_update(id)?;
        record.properties.insert(key.to_string(), value);
        self.stage_node(id, Some(record));
        Ok(())
    }

    fn remove_node_property(&mut self, id: NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        let mut record = self.node_for_update(id)?;
        let old = record.properties.remove(key);
        if old.is_some() {
            self.stage_node(id, Some(record));
        }
        Ok(old)
    }

    fn add_label(&mut self, id: NodeId, label: &str) -> StoreResult<bool> {
        let mut record = self.node_for_update(id)?;
        let added = record.labels.insert(label.to_string());
        if added {
            self.stage_node(id, Some(record));
        }
        Ok(added)
    }

    fn remove_label(&mut self, id: NodeId, label: &str) -> StoreResult<bool> {
        let mut record = self.node_for_update(id)?;
        let removed = record.labels.remove(label);
        if removed {
            self.stage_node(id, Some(record));
        }
        Ok(removed)
    }

    fn delete_node(&mut self, id: NodeId) -> StoreResult<()> {
        self.node_for_update(id)?;
        let count = self.edges_of(id, Direction::Both, None)?.len();
        if count > 0 {
            return Err(StoreError::NodeHasRelationships { node: id, count });
        }
        self.stage_node(id, None);
        Ok(())
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        properties: Properties,
    ) -> StoreResult<EdgeId> {
        for endpoint in [from, to] {
            self.ensure_locked(LockTarget::Node(endpoint))?;
            if self.current_node(endpoint).is_none() {
                return Err(StoreError::NodeNotFound(endpoint));
            }
        }
        let id = EdgeId(self.graph.next_edge.fetch_add(1, Ordering::Relaxed));
        self.created_edges.insert(id);
        self.edges.insert(
            id,
            Some(EdgeRecord {
                rel_type: rel_type.to_string(),
                from,
                to,
                properties,
            }),
        );
        self.added_out.entry(from).or_default().insert(id);
        self.added_in.entry(to).or_default().insert(id);
        Ok(id)
    }

    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> StoreResult<()> {
        self.ensure_locked(LockTarget::Edge(id))?;
        let mut record = self.current_edge(id).ok_or(StoreError::EdgeNotFound(id))?;
        record.properties.insert(key.to_string(), value);
        self.edges.insert(id, Some(record));
        Ok(())
    }

    fn delete_edge(&mut self, id: EdgeId) -> StoreResult<()> {
        self.ensure_locked(LockTarget::Edge(id))?;
        let record = self.current_edge(id).ok_or(StoreError::EdgeNotFound(id))?;
        self.ensure_locked(LockTarget::Node(record.from))?;
        self.ensure_locked(LockTarget::Node(record.to))?;
        self.edges.insert(id, None);
        Ok(())
    }
}

impl GraphTransaction for InMemoryTransaction<'_> {
    fn id(&self) -> TxnId {
        self.id
    }

    fn commit(mut self) -> StoreResult<()> {
        let nodes = std::mem::take(&mut self.nodes);
        let edges = std::mem::take(&mut self.edges);
        let (nodes_written, edges_written) = (nodes.len(), edges.len());

        {
            let mut state = self.graph.state.write();
            let mut deleted_nodes = Vec::new();
            for (id, staged) in nodes {
                match staged {
                    Some(record) => state.put_node(id, record),
                    None => deleted_nodes.push(id),
                }
            }
            for (id, staged) in edges {
                match staged {
                    Some(record) => state.put_edge(id, record),
                    None => {
                        state.remove_edge(id);
                    }
                }
            }
            for id in deleted_nodes {
                state.remove_node(id);
            }
        }

        debug!(
            txn = self.id.0,
            nodes = nodes_written,
            relationships = edges_written,
            locks = self.held.len(),
            "transaction committed"
        );
        Ok(())
    }

    fn rollback(self) {
        debug!(txn = self.id.0, staged = self.nodes.len() + self.edges.len(), "transaction rolled back");
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        let held: Vec<LockTarget> = self.held.drain().collect();
        self.graph.locks.release_all(self.id, &held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_uncommitted_writes_are_private() {
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin();
        let id = tx.create_node(&["Segment"], props(&[("bodyId", PropertyValue::Int(7))])).unwrap();
        assert!(tx.node(id).unwrap().is_some());
        assert!(graph.node(id).unwrap().is_none());
        tx.commit().unwrap();
        assert_eq!(graph.node(id).unwrap().unwrap().int("bodyId"), Some(7));
    }

    #[test]
    fn test_rollback_discards_writes_and_releases_locks() {
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin();
        let id = tx.create_node(&["Meta"], Properties::new()).unwrap();
        tx.commit().unwrap();

        let mut tx = graph.begin();
        tx.set_node_property(id, "totalPreCount", PropertyValue::Int(3)).unwrap();
        assert!(graph.locks().is_locked(LockTarget::Node(id)));
        tx.rollback();

        assert!(!graph.locks().is_locked(LockTarget::Node(id)));
        assert!(graph.node(id).unwrap().unwrap().property("totalPreCount").is_none());
    }

    #[test]
    fn test_indexed_lookup_sees_staged_and_committed_nodes() {
        let graph = InMemoryGraph::new();
        graph.create_index("Segment", "bodyId");
        let mut tx = graph.begin();
        let a = tx.create_node(&["Segment"], props(&[("bodyId", PropertyValue::Int(1))])).unwrap();
        tx.commit().unwrap();

        let mut tx = graph.begin();
        let b = tx.create_node(&["Segment"], props(&[("bodyId", PropertyValue::Int(2))])).unwrap();
        let value = PropertyValue::Int(1);
        assert_eq!(tx.find_node("Segment", "bodyId", &value).unwrap().map(|n| n.id), Some(a));
        assert_eq!(
            tx.find_node("Segment", "bodyId", &PropertyValue::Int(2)).unwrap().map(|n| n.id),
            Some(b)
        );

        tx.set_node_property(a, "bodyId", PropertyValue::Int(5)).unwrap();
        assert!(tx.find_node("Segment", "bodyId", &value).unwrap().is_none());
        tx.commit().unwrap();

        assert!(graph.find_node("Segment", "bodyId", &value).unwrap().is_none());
        assert_eq!(
            graph.find_node("Segment", "bodyId", &PropertyValue::Int(5)).unwrap().map(|n| n.id),
            Some(a)
        );
    }

    #[test]
    fn test_edges_read_through_overlay() {
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin();
        let a = tx.create_node(&["Segment"], Properties::new()).unwrap();
        let b = tx.create_node(&["Segment"], Properties::new()).unwrap();
        let committed = tx.create_edge(a, b, "ConnectsTo", Properties::new()).unwrap();
        tx.commit().unwrap();

        let mut tx = graph.begin();
        let staged = tx.create_edge(b, a, "ConnectsTo", Properties::new()).unwrap();
        assert_eq!(tx.edges_of(a, Direction::Both, Some("ConnectsTo")).unwrap().len(), 2);
        tx.delete_edge(committed).unwrap();
        let remaining = tx.edges_of(a, Direction::Both, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, staged);
        assert_eq!(graph.edges_of(a, Direction::Outgoing, None).unwrap().len(), 1);
        tx.commit().unwrap();

        assert!(graph.edge(committed).unwrap().is_none());
        assert_eq!(graph.edges_between(b, a, "ConnectsTo").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_node_with_relationships_fails() {
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin();
        let a = tx.create_node(&["Segment"], Properties::new()).unwrap();
        let b = tx.create_node(&["Synapse"], Properties::new()).unwrap();
        tx.create_edge(a, b, "Contains", Properties::new()).unwrap();
        let err = tx.delete_node(a).unwrap_err();
        assert!(matches!(err, StoreError::NodeHasRelationships { count: 1, .. }));
        tx.detach_delete_node(a).unwrap();
        tx.commit().unwrap();
        assert!(graph.node(a).unwrap().is_none());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_concurrent_writer_times_out_on_held_lock() {
        let graph = InMemoryGraph::new().with_lock_timeout(Duration::from_millis(20));
        let mut tx = graph.begin();
        let id = tx.create_node(&["Meta"], Properties::new()).unwrap();
        tx.commit().unwrap();

        let mut first = graph.begin();
        first.lock(LockSet::with_root(id).add_node(id)).unwrap();
        let mut second = graph.begin();
        let err = second.set_node_property(id, "x", PropertyValue::Int(1)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        drop(first);
        second.set_node_property(id, "x", PropertyValue::Int(1)).unwrap();
        second.commit().unwrap();
        assert_eq!(graph.node(id).unwrap().unwrap().int("x"), Some(1));
    }

    #[test]
    fn test_label_changes_are_visible_on_commit() {
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin();
        let id = tx.create_node(&["Segment"], Properties::new()).unwrap();
        tx.commit().unwrap();

        let mut tx = graph.begin();
        assert!(tx.add_label(id, "Neuron").unwrap());
        assert!(!tx.add_label(id, "Neuron").unwrap());
        assert_eq!(tx.nodes_with_label("Neuron").unwrap().len(), 1);
        assert!(graph.nodes_with_label("Neuron").unwrap().is_empty());
        tx.commit().unwrap();
        assert_eq!(graph.nodes_with_label("Neuron").unwrap().len(), 1);
    }
}
