// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Randomized mutation sequences.
//!
//! Any interleaving of synapse and segment mutations, successful or
//! rejected, must leave every derived value equal to a from-scratch
//! recount. The audit does the recount; these tests drive it.

use connectome::prelude::*;
use proptest::prelude::*;

const UUID: &str = "5d3c1a2b-8e4f-4a6b-9c0d-aabbccddeeff";
const ROIS: [&str; 3] = ["EB", "FB", "PB"];
/// Slots below this are pre-synapses, the rest post-synapses.
const PRE_SLOTS: usize = 6;
const SLOTS: usize = 12;

fn location(slot: usize) -> Location {
    Location::new(slot as i64, 0, 0)
}

fn kind(slot: usize) -> SynapseType {
    if slot < PRE_SLOTS {
        SynapseType::Pre
    } else {
        SynapseType::Post
    }
}

#[derive(Debug, Clone)]
enum Op {
    AddSynapse {
        slot: usize,
        confidence: f64,
        rois: Vec<&'static str>,
    },
    DeleteSynapse(usize),
    Orphan(usize),
    Link(usize, usize),
    Unlink(usize, usize),
    AddSegment {
        body: u64,
        slots: Vec<usize>,
        named: bool,
    },
    DeleteSegment(u64),
    AddToSegment(usize, u64),
    AddRoi(usize, &'static str),
    RemoveRoi(usize, &'static str),
}

fn op() -> impl Strategy<Value = Op> {
    let slot = 0..SLOTS;
    let pre = 0..PRE_SLOTS;
    let post = PRE_SLOTS..SLOTS;
    let body = 1u64..5;
    let roi = prop::sample::select(ROIS.to_vec());
    prop_oneof![
        4 => (slot.clone(), 0.0..=1.0f64, prop::sample::subsequence(ROIS.to_vec(), 0..=2))
            .prop_map(|(slot, confidence, rois)| Op::AddSynapse { slot, confidence, rois }),
        1 => slot.clone().prop_map(Op::DeleteSynapse),
        1 => slot.clone().prop_map(Op::Orphan),
        3 => (pre.clone(), post.clone()).prop_map(|(p, q)| Op::Link(p, q)),
        1 => (pre, post).prop_map(|(p, q)| Op::Unlink(p, q)),
        2 => (body.clone(), prop::collection::vec(slot.clone(), 0..4), any::<bool>())
            .prop_map(|(body, slots, named)| Op::AddSegment { body, slots, named }),
        1 => body.clone().prop_map(Op::DeleteSegment),
        2 => (slot.clone(), body).prop_map(|(slot, body)| Op::AddToSegment(slot, body)),
        1 => (slot.clone(), roi.clone()).prop_map(|(slot, roi)| Op::AddRoi(slot, roi)),
        1 => (slot, roi).prop_map(|(slot, roi)| Op::RemoveRoi(slot, roi)),
    ]
}

fn apply(
    engine: &ConnectomeEngine<InMemoryGraph>,
    op: &Op,
    step: u64,
) -> EngineResult<MutationOutcome> {
    match op {
        Op::AddSynapse {
            slot,
            confidence,
            rois,
        } => engine.add_synapse(
            &SynapseAddition::new(location(*slot), kind(*slot), *confidence)
                .with_rois(rois.iter().copied()),
        ),
        Op::DeleteSynapse(slot) => engine.delete_synapse(location(*slot)),
        Op::Orphan(slot) => engine.orphan_synapse(location(*slot)),
        Op::Link(p, q) => engine.link_synapses(location(*p), location(*q)),
        Op::Unlink(p, q) => engine.unlink_synapses(location(*p), location(*q)),
        Op::AddSegment { body, slots, named } => {
            let mut slots = slots.clone();
            slots.sort_unstable();
            slots.dedup();
            let mut addition = SegmentAddition::new(*body, UUID, step).with_synapses(
                slots.iter().map(|&slot| SynapseRef {
                    location: location(slot),
                    kind: kind(slot),
                }),
            );
            if *named {
                addition.name = Some(format!("body-{}", body));
            }
            engine.add_segment(&addition)
        }
        Op::DeleteSegment(body) => engine.delete_segment(*body),
        Op::AddToSegment(slot, body) => engine.add_synapse_to_segment(location(*slot), *body),
        Op::AddRoi(slot, roi) => engine.add_roi_to_synapse(location(*slot), roi),
        Op::RemoveRoi(slot, roi) => engine.remove_roi_from_synapse(location(*slot), roi),
    }
}

fn run_sequence(
    engine: &ConnectomeEngine<InMemoryGraph>,
    ops: &[Op],
) -> Result<(), TestCaseError> {
    for (step, op) in ops.iter().enumerate() {
        if let Err(err) = apply(engine, op, step as u64) {
            prop_assert!(
                !matches!(err, EngineError::Store(_)),
                "store failure on {:?}: {}",
                op,
                err
            );
        }
        let report = engine
            .audit()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(report.is_consistent(), "after {:?}:\n{}", op, report);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn mutation_sequences_stay_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let engine = ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("prop")).unwrap();
        run_sequence(&engine, &ops)?;
    }

    #[test]
    fn mutation_sequences_stay_consistent_with_hp(ops in prop::collection::vec(op(), 1..40)) {
        let options = EngineOptions::new("prop")
            .with_thresholds(HpThresholds::new(0.5, 0.8).unwrap());
        let engine = ConnectomeEngine::open(InMemoryGraph::new(), options).unwrap();
        run_sequence(&engine, &ops)?;
    }

    #[test]
    fn meta_totals_count_every_synapse(
        slots in prop::collection::btree_set(0..SLOTS, 0..SLOTS),
        owned in 0..SLOTS
    ) {
        let engine = ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("prop")).unwrap();
        for &slot in &slots {
            engine
                .add_synapse(&SynapseAddition::new(location(slot), kind(slot), 0.9).with_rois(["EB"]))
                .unwrap();
        }
        let owned: Vec<usize> = slots.iter().copied().take(owned).collect();
        engine
            .add_segment(&SegmentAddition::new(1, UUID, 1).with_synapses(owned.iter().map(|&slot| SynapseRef {
                location: location(slot),
                kind: kind(slot),
            })))
            .unwrap();

        let pre = slots.iter().filter(|&&s| kind(s) == SynapseType::Pre).count() as u64;
        let post = slots.len() as u64 - pre;
        let meta = engine.meta().unwrap();
        prop_assert_eq!(meta.total_pre_count, pre);
        prop_assert_eq!(meta.total_post_count, post);
        let eb_total = meta.roi_info.get("EB").map_or(0, |c| c.pre() + c.post());
        prop_assert_eq!(eb_total, slots.len() as u64);

        let segment = engine.segment(1).unwrap().unwrap();
        prop_assert_eq!(segment.pre_count + segment.post_count, owned.len() as u64);
    }
}

#[test]
fn test_emptied_connection_is_recreated_with_weight_one() {
    let engine =
        ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("prop")).unwrap();
    let (p, q) = (location(0), location(PRE_SLOTS));
    engine
        .add_synapse(&SynapseAddition::new(p, SynapseType::Pre, 0.9))
        .unwrap();
    engine
        .add_synapse(&SynapseAddition::new(q, SynapseType::Post, 0.9))
        .unwrap();
    engine.link_synapses(p, q).unwrap();
    engine
        .add_segment(&SegmentAddition::new(1, UUID, 1).with_synapses([SynapseRef {
            location: p,
            kind: SynapseType::Pre,
        }]))
        .unwrap();
    engine
        .add_segment(&SegmentAddition::new(2, UUID, 2).with_synapses([SynapseRef {
            location: q,
            kind: SynapseType::Post,
        }]))
        .unwrap();
    assert_eq!(engine.connects_to(1, 2).unwrap().unwrap().weight, 1);

    engine.orphan_synapse(p).unwrap();
    assert!(engine.connects_to(1, 2).unwrap().is_none());
    assert!(engine.connection_set(1, 2).unwrap().is_none());

    engine.add_synapse_to_segment(p, 1).unwrap();
    assert_eq!(engine.connects_to(1, 2).unwrap().unwrap().weight, 1);
    assert_eq!(
        engine.connection_set(1, 2).unwrap().unwrap().synapses,
        vec![p, q]
    );
    assert!(engine.audit().unwrap().is_consistent());
}
