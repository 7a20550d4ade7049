//! Property-Based Tests for the Topology Tree
//!
//! # Test Properties
//!
//! 1. **Aggregate invariant**: after any attach/detach/volume sequence every
//!    group's counts equal the sums over its children
//! 2. **Monotonic max id**: the root's `max_volume_id` never decreases
//! 3. **Detach reversal**: attach then detach restores ancestor counts
//! 4. **Reservation coverage**: each budget in `[0, free)` lands on exactly
//!    one storage node, in proportion to its free space

#![cfg(test)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::node::{CapacityNode, DataNode, VolumeInfo};
use super::tree::Topology;
use super::types::{NodeHandle, NodeId, NodeKind, VolumeId};

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    /// Attach storage node `node` to rack `rack` with `max` slots.
    Attach { rack: usize, node: u8, max: i64 },
    /// Detach storage node `node` from rack `rack`.
    Detach { rack: usize, node: u8 },
    /// Report volume `vid` on storage node `node` of rack `rack`.
    AddVolume { rack: usize, node: u8, vid: u32 },
    /// Drop volume `vid` wherever it is hosted in rack `rack`.
    RemoveVolume { rack: usize, vid: u32 },
}

const RACKS: usize = 4;

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..RACKS, 0u8..6, 0i64..8).prop_map(|(rack, node, max)| Op::Attach { rack, node, max }),
        (0..RACKS, 0u8..6).prop_map(|(rack, node)| Op::Detach { rack, node }),
        (0..RACKS, 0u8..6, 1u32..200).prop_map(|(rack, node, vid)| Op::AddVolume {
            rack,
            node,
            vid
        }),
        (0..RACKS, 1u32..200).prop_map(|(rack, vid)| Op::RemoveVolume { rack, vid }),
    ]
}

/// Leaf shapes as (rack, max slots, used slots).
fn layout_strategy() -> impl Strategy<Value = Vec<(usize, i64, u32)>> {
    prop::collection::vec((0..RACKS, 0i64..10, 0u32..6), 1..20)
}

/// Root with two data centers holding two racks each.
fn skeleton() -> (Topology, Vec<NodeHandle>) {
    let mut topology = Topology::new("cluster");
    let mut racks = Vec::new();
    for dc in 0..2 {
        let dc_handle = topology
            .ensure_group(topology.root(), format!("dc{dc}"), NodeKind::DataCenter)
            .unwrap();
        for rack in 0..RACKS / 2 {
            racks.push(
                topology
                    .ensure_group(dc_handle, format!("rack{rack}"), NodeKind::Rack)
                    .unwrap(),
            );
        }
    }
    (topology, racks)
}

fn sums_hold(topology: &Topology) -> bool {
    topology.descendants(topology.root()).into_iter().all(|h| {
        let node = topology.get(h).unwrap();
        let Some(children) = node.children() else {
            return true;
        };
        let mut max = 0;
        let mut active = 0;
        for child in children.values() {
            let c = topology.counters(*child).unwrap();
            if c.max_volume_id > node.max_volume_id() {
                return false;
            }
            max += c.max_volume_count;
            active += c.active_volume_count;
        }
        node.max_volume_count() == max && node.active_volume_count() == active
    })
}

fn apply(topology: &mut Topology, racks: &[NodeHandle], op: &Op) {
    match *op {
        Op::Attach { rack, node, max } => {
            let handle = topology.new_data_node(DataNode::new(format!("dn{node}"), max));
            if !topology.link_child(racks[rack], handle).unwrap() {
                topology.remove_detached(handle).unwrap();
            }
        }
        Op::Detach { rack, node } => {
            if let Some(detached) = topology
                .unlink_child(racks[rack], &NodeId::from(format!("dn{node}")))
                .unwrap()
            {
                topology.remove_detached(detached).unwrap();
            }
        }
        Op::AddVolume { rack, node, vid } => {
            if let Some(handle) = topology.find_child(racks[rack], &NodeId::from(format!("dn{node}"))) {
                topology
                    .add_or_update_volume(handle, VolumeInfo::new(vid, 0))
                    .unwrap();
            }
        }
        Op::RemoveVolume { rack, vid } => {
            let children: Vec<NodeHandle> = topology
                .get(racks[rack])
                .unwrap()
                .children()
                .map(|c| c.values().copied().collect())
                .unwrap_or_default();
            for child in children {
                topology.remove_volume(child, VolumeId(vid)).unwrap();
            }
        }
    }
}

// =============================================================================
// Aggregation Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: sums and max ids stay consistent after every operation.
    #[test]
    fn prop_aggregate_invariant(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (mut topology, racks) = skeleton();
        let mut last_max_id = VolumeId::default();

        for op in &ops {
            apply(&mut topology, &racks, op);
            prop_assert!(sums_hold(&topology), "sum invariant broken after {:?}", op);

            let max_id = topology.counters(topology.root()).unwrap().max_volume_id;
            prop_assert!(max_id >= last_max_id, "max volume id decreased after {:?}", op);
            last_max_id = max_id;
        }
    }

    /// Property: attach followed by detach restores every ancestor's counts.
    #[test]
    fn prop_detach_reverses_attach(
        layout in layout_strategy(),
        rack in 0..RACKS,
        max in 0i64..20,
        used in 0u32..10,
    ) {
        let (mut topology, racks) = skeleton();
        for (i, &(r, m, u)) in layout.iter().enumerate() {
            let mut node = DataNode::new(format!("base{i}"), m);
            for vid in 0..u {
                node = node.with_volume(VolumeInfo::new(vid + 1, 0));
            }
            let handle = topology.new_data_node(node);
            topology.link_child(racks[r], handle).unwrap();
        }

        let ancestors: Vec<NodeHandle> = topology.descendants(topology.root())
            .into_iter()
            .filter(|h| !topology.get(*h).unwrap().is_leaf())
            .collect();
        let before: Vec<_> = ancestors.iter().map(|h| topology.counters(*h).unwrap()).collect();

        let mut node = DataNode::new("extra", max);
        for vid in 0..used {
            node = node.with_volume(VolumeInfo::new(1000 + vid, 0));
        }
        let handle = topology.new_data_node(node);
        prop_assert!(topology.link_child(racks[rack], handle).unwrap());
        prop_assert!(!topology.link_child(racks[rack], handle).unwrap());
        topology.unlink_child(racks[rack], &NodeId::from("extra")).unwrap();

        for (h, old) in ancestors.iter().zip(before) {
            let now = topology.counters(*h).unwrap();
            prop_assert_eq!(now.max_volume_count, old.max_volume_count);
            prop_assert_eq!(now.active_volume_count, old.active_volume_count);
            prop_assert!(now.max_volume_id >= old.max_volume_id);
        }
    }
}

// =============================================================================
// Placement Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: every budget below the root's free space is served, each
    /// storage node serves exactly its free space, and the budget equal to
    /// the root's free space is refused.
    #[test]
    fn prop_reservation_coverage(layout in layout_strategy()) {
        let (mut topology, racks) = skeleton();
        let mut leaves = Vec::new();
        for (i, &(r, m, u)) in layout.iter().enumerate() {
            // Keep each node within capacity so group free space equals the
            // sum of positive leaf free space.
            let used = (u as i64).min(m) as u32;
            let mut node = DataNode::new(format!("dn{i}"), m);
            for vid in 0..used {
                node = node.with_volume(VolumeInfo::new(vid + 1, 0));
            }
            let handle = topology.new_data_node(node);
            topology.link_child(racks[r], handle).unwrap();
            leaves.push(handle);
        }

        let free = topology.free_space(topology.root()).unwrap();
        prop_assert!(free >= 0);
        let free = free as u64;

        let mut hits: HashMap<NodeHandle, i64> = HashMap::new();
        let mut previous: Option<NodeHandle> = None;
        let mut switches = 0usize;
        for budget in 0..free {
            let found = topology.reserve_one_volume(budget, VolumeId(1));
            prop_assert!(found.is_some(), "budget {} not served", budget);
            let found = found.unwrap();
            if previous != Some(found) {
                switches += 1;
                previous = Some(found);
            }
            *hits.entry(found).or_default() += 1;
        }

        for leaf in &leaves {
            let expected = topology.free_space(*leaf).unwrap();
            prop_assert_eq!(hits.get(leaf).copied().unwrap_or(0), expected);
        }
        // Each node owns one contiguous range of budgets.
        prop_assert_eq!(switches, hits.len());
        prop_assert!(topology.reserve_one_volume(free, VolumeId(1)).is_none());
    }
}
