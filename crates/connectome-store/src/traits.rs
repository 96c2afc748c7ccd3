// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backend-neutral property-graph interface
//!
//! The engine is written against these traits only. A backend provides
//! committed reads ([`GraphRead`] on the store itself, or pinned to one commit
//! through [`GraphStore::read_view`]) and transactions that
//! read their own writes, take write locks, and become visible atomically on
//! [`GraphTransaction::commit`].

use crate::error::StoreResult;
use crate::locks::{LockSet, TxnId};
use crate::types::{Direction, Edge, EdgeId, Node, NodeId, Properties, PropertyValue};

/// Read access to a graph (committed state, or a transaction's view of it).
pub trait GraphRead {
    fn node(&self, id: NodeId) -> StoreResult<Option<Node>>;

    fn edge(&self, id: EdgeId) -> StoreResult<Option<Edge>>;

    /// Nodes carrying `label` whose property `key` equals `value`.
    fn find_nodes(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Vec<Node>>;

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<Node>>;

    /// Relationships attached to `node`, optionally restricted to one type.
    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>>;

    fn find_node(&self, label: &str, key: &str, value: &PropertyValue) -> StoreResult<Option<Node>> {
        Ok(self.find_nodes(label, key, value)?.into_iter().next())
    }

    /// Relationships of `rel_type` running from `from` to `to`.
    fn edges_between(&self, from: NodeId, to: NodeId, rel_type: &str) -> StoreResult<Vec<Edge>> {
        Ok(self
            .edges_of(from, Direction::Outgoing, Some(rel_type))?
            .into_iter()
            .filter(|edge| edge.to == to)
            .collect())
    }

    /// Nodes at the far end of `node`'s relationships of `rel_type`.
    fn neighbours(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: &str,
    ) -> StoreResult<Vec<Node>> {
        let mut found = Vec::new();
        for edge in self.edges_of(node, direction, Some(rel_type))? {
            if let Some(other) = self.node(edge.other(node))? {
                found.push(other);
            }
        }
        Ok(found)
    }
}

/// Write access inside a transaction.
///
/// Writing to an entity that existed before the transaction began takes its
/// write lock first, so explicit [`GraphWrite::lock`] calls only decide the
/// order in which locks are taken.
pub trait GraphWrite: GraphRead {
    /// Acquire every lock in `set`, in the set's order.
    fn lock(&mut self, set: &LockSet) -> StoreResult<()>;

    fn create_node(&mut self, labels: &[&str], properties: Properties) -> StoreResult<NodeId>;

    fn set_node_property(&mut self, id: NodeId, key: &str, value: PropertyValue) -> StoreResult<()>;

    fn remove_node_property(&mut self, id: NodeId, key: &str) -> StoreResult<Option<PropertyValue>>;

    /// Returns `true` when the label was not present before.
    fn add_label(&mut self, id: NodeId, label: &str) -> StoreResult<bool>;

    /// Returns `true` when the label was present before.
    fn remove_label(&mut self, id: NodeId, label: &str) -> StoreResult<bool>;

    /// Delete a node that has no relationships left.
    fn delete_node(&mut self, id: NodeId) -> StoreResult<()>;

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        properties: Properties,
    ) -> StoreResult<EdgeId>;

    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> StoreResult<()>;

    fn delete_edge(&mut self, id: EdgeId) -> StoreResult<()>;

    /// Delete a node together with all of its relationships.
    fn detach_delete_node(&mut self, id: NodeId) -> StoreResult<()> {
        for edge in self.edges_of(id, Direction::Both, None)? {
            self.delete_edge(edge.id)?;
        }
        self.delete_node(id)
    }
}

/// A unit of work that becomes visible all at once.
pub trait GraphTransaction: GraphWrite {
    fn id(&self) -> TxnId;

    fn commit(self) -> StoreResult<()>;

    /// Discard all writes and release held locks.
    fn rollback(self);
}

/// A shareable graph backend.
pub trait GraphStore: GraphRead + Send + Sync {
    type Transaction<'a>: GraphTransaction
    where
        Self: 'a;

    /// Committed state that reads as one, all lookups seeing the same commit.
    type ReadView<'a>: GraphRead
    where
        Self: 'a;

    fn begin(&self) -> Self::Transaction<'_>;

    fn read_view(&self) -> Self::ReadView<'_>;

    /// Declare an exact-match index on (`label`, `key`). Idempotent.
    fn create_index(&self, label: &str, key: &str);
}
