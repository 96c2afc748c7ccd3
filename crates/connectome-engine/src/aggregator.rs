// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
ConnectsTo aggregation.

Folds linked (pre-synapse, post-synapse) pairs into one aggregate per ordered
(pre owner, post owner) pair of segments. Links with an unowned endpoint are
skipped; they are picked up once both ends are owned.

The aggregator is generic over the synapse key so the bulk loader can run it
on locations before any node exists, and the audit can run it on node ids.
*/

use std::collections::{BTreeMap, BTreeSet};

/// Backing pairs of one (pre owner, post owner) connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairAggregate<K: Ord> {
    members: BTreeSet<(K, K)>,
}

impl<K: Ord + Clone> PairAggregate<K> {
    fn new() -> Self {
        Self {
            members: BTreeSet::new(),
        }
    }

    /// Linked (pre, post) synapse pairs realizing the connection.
    pub fn members(&self) -> &BTreeSet<(K, K)> {
        &self.members
    }

    pub fn weight(&self) -> u64 {
        self.members.len() as u64
    }

    /// Distinct member synapses, pre-synapses first.
    pub fn synapses(&self) -> (BTreeSet<K>, BTreeSet<K>) {
        let pre = self.members.iter().map(|(p, _)| p.clone()).collect();
        let post = self.members.iter().map(|(_, q)| q.clone()).collect();
        (pre, post)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectsToAggregator<K: Ord> {
    pairs: BTreeMap<(u64, u64), PairAggregate<K>>,
    skipped: usize,
}

impl<K: Ord + Clone> Default for ConnectsToAggregator<K> {
    fn default() -> Self {
        Self {
            pairs: BTreeMap::new(),
            skipped: 0,
        }
    }
}

impl<K: Ord + Clone> ConnectsToAggregator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `links` using `owner` to resolve each synapse's segment.
    pub fn fold<I, F>(links: I, owner: F) -> Self
    where
        I: IntoIterator<Item = (K, K)>,
        F: Fn(&K) -> Option<u64>,
    {
        let mut aggregator = Self::new();
        for (pre, post) in links {
            let (pre_owner, post_owner) = (owner(&pre), owner(&post));
            aggregator.add_link(pre_owner, pre, post_owner, post);
        }
        aggregator
    }

    /// Record one link. Returns `false` (and counts it as skipped) when
    /// either end is unowned.
    pub fn add_link(
        &mut self,
        pre_owner: Option<u64>,
        pre: K,
        post_owner: Option<u64>,
        post: K,
    ) -> bool {
        match (pre_owner, post_owner) {
            (Some(from), Some(to)) => {
                self.pairs
                    .entry((from, to))
                    .or_insert_with(PairAggregate::new)
                    .members
                    .insert((pre, post));
                true
            }
            _ => {
                self.skipped += 1;
                false
            }
        }
    }

    pub fn get(&self, pre: u64, post: u64) -> Option<&PairAggregate<K>> {
        self.pairs.get(&(pre, post))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Links ignored because an endpoint had no owner.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u64, u64), &PairAggregate<K>)> {
        self.pairs.iter()
    }

    pub fn into_pairs(self) -> BTreeMap<(u64, u64), PairAggregate<K>> {
        self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_groups_links_by_owner_pair() {
        let owners: HashMap<u32, u64> = [(1, 10), (2, 20), (3, 20), (4, 30), (5, 10)]
            .into_iter()
            .collect();
        let links = vec![(1, 2), (1, 3), (5, 4), (1, 4)];
        let agg = ConnectsToAggregator::fold(links, |k| owners.get(k).copied());

        assert_eq!(agg.len(), 2);
        assert_eq!(agg.get(10, 20).unwrap().weight(), 2);
        assert_eq!(agg.get(10, 30).unwrap().weight(), 2);
        let (pre, post) = agg.get(10, 30).unwrap().synapses();
        assert_eq!(pre, BTreeSet::from([1, 5]));
        assert_eq!(post, BTreeSet::from([4]));
    }

    #[test]
    fn test_unowned_endpoints_are_skipped() {
        let owners: HashMap<u32, u64> = [(1, 10)].into_iter().collect();
        let agg = ConnectsToAggregator::fold(vec![(1, 2), (3, 1)], |k| owners.get(k).copied());
        assert!(agg.is_empty());
        assert_eq!(agg.skipped(), 2);
    }

    #[test]
    fn test_duplicate_links_count_once() {
        let agg = ConnectsToAggregator::fold(vec![(1, 2), (1, 2)], |_| Some(7));
        assert_eq!(agg.get(7, 7).unwrap().weight(), 1);
    }

    proptest::proptest! {
        #[test]
        fn weights_do_not_depend_on_link_order(
            links in proptest::collection::vec((0u32..8, 0u32..8), 0..40)
        ) {
            let owner = |k: &u32| if *k == 0 { None } else { Some(u64::from(k % 3)) };
            let forward = ConnectsToAggregator::fold(links.iter().copied(), owner);
            let reverse = ConnectsToAggregator::fold(links.iter().rev().copied(), owner);
            proptest::prop_assert_eq!(forward.into_pairs(), reverse.into_pairs());

            let distinct: BTreeSet<(u32, u32)> = links
                .iter()
                .copied()
                .filter(|(p, q)| *p != 0 && *q != 0)
                .collect();
            let folded = ConnectsToAggregator::fold(links.iter().copied(), owner);
            let total: u64 = folded.iter().map(|(_, agg)| agg.weight()).sum();
            proptest::prop_assert_eq!(total, distinct.len() as u64);
        }
    }
}
