// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pessimistic write locks on graph entities
//!
//! A [`LockSet`] names every node and relationship a mutation may touch. It is
//! built before anything is written and acquired in one pass: the root target
//! (the dataset Meta node) first, then all remaining targets in ascending
//! [`LockTarget`] order. Every call site uses the same order, so two
//! transactions whose subgraphs overlap can never wait on each other in a
//! cycle.
//!
//! Locks are owned by a transaction id and released together when the
//! transaction commits or rolls back.

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::types::{EdgeId, NodeId};

/// Transaction identity used as lock owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

/// A lockable graph entity. Ordering is the global acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockTarget {
    Node(NodeId),
    Edge(EdgeId),
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::Node(id) => write!(f, "node {}", id),
            LockTarget::Edge(id) => write!(f, "relationship {}", id),
        }
    }
}

/// Entities to write-lock for one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSet {
    root: Option<LockTarget>,
    targets: BTreeSet<LockTarget>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock set whose first acquisition is always `root`.
    pub fn with_root(root: NodeId) -> Self {
        Self {
            root: Some(LockTarget::Node(root)),
            targets: BTreeSet::new(),
        }
    }

    pub fn add_node(&mut self, id: NodeId) -> &mut Self {
        self.targets.insert(LockTarget::Node(id));
        self
    }

    pub fn add_edge(&mut self, id: EdgeId) -> &mut Self {
        self.targets.insert(LockTarget::Edge(id));
        self
    }

    pub fn contains(&self, target: &LockTarget) -> bool {
        self.root.as_ref() == Some(target) || self.targets.contains(target)
    }

    pub fn len(&self) -> usize {
        self.ordered().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.targets.is_empty()
    }

    /// Targets in acquisition order: root first, then ascending.
    pub fn ordered(&self) -> impl Iterator<Item = LockTarget> + '_ {
        let root = self.root;
        root.into_iter()
            .chain(self.targets.iter().copied().filter(move |t| Some(*t) != root))
    }
}

/// Lock table shared by all transactions of one store.
pub struct EntityLockManager {
    owners: Mutex<AHashMap<LockTarget, TxnId>>,
    released: Condvar,
}

impl EntityLockManager {
    pub fn new() -> Self {
        Self {
            owners: Mutex::new(AHashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Take `target` for `txn` without waiting. Re-entrant for the owner.
    pub fn try_lock(&self, target: LockTarget, txn: TxnId) -> bool {
        let mut owners = self.owners.lock();
        match owners.get(&target) {
            Some(owner) => *owner == txn,
            None => {
                owners.insert(target, txn);
                true
            }
        }
    }

    /// Take `target` for `txn`, blocking until it is free or `timeout` elapses.
    ///
    /// Returns `Ok(true)` when newly acquired and `Ok(false)` when `txn`
    /// already held it.
    pub fn lock(&self, target: LockTarget, txn: TxnId, timeout: Duration) -> StoreResult<bool> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut owners = self.owners.lock();
        loop {
            match owners.get(&target) {
                None => {
                    owners.insert(target, txn);
                    return Ok(true);
                }
                Some(owner) if *owner == txn => return Ok(false),
                Some(owner) => {
                    trace!(%target, waiting = txn.0, holder = owner.0, "waiting for write lock");
                    if self.released.wait_until(&mut owners, deadline).timed_out()
                        && owners.get(&target).is_some_and(|o| *o != txn)
                    {
                        return Err(StoreError::LockTimeout {
                            target,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    pub fn unlock(&self, target: LockTarget, txn: TxnId) {
        let mut owners = self.owners.lock();
        if owners.get(&target) == Some(&txn) {
            owners.remove(&target);
            self.released.notify_all();
        }
    }

    /// Release every listed target still owned by `txn`.
    pub fn release_all(&self, txn: TxnId, targets: &[LockTarget]) {
        if targets.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for target in targets {
            if owners.get(target) == Some(&txn) {
                owners.remove(target);
            }
        }
        self.released.notify_all();
    }

    pub fn is_locked(&self, target: LockTarget) -> bool {
        self.owners.lock().contains_key(&target)
    }

    pub fn holder(&self, target: LockTarget) -> Option<TxnId> {
        self.owners.lock().get(&target).copied()
    }

    pub fn locked_targets(&self) -> Vec<LockTarget> {
        let owners = self.owners.lock();
        let mut targets: Vec<LockTarget> = owners.keys().copied().collect();
        targets.sort();
        targets
    }
}

impl Default for EntityLockManager {
    fn default() -> Self {
        Self::new()
    }
}
