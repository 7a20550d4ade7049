//! Placement Selector
//!
//! Resolves a reservation budget to one storage node. The budget is an index
//! into the virtual concatenation of every descendant leaf's free slots, so
//! a budget drawn uniformly from `[0, free_space)` picks a node with
//! probability proportional to its free space. No weighted list is built:
//! the budget is consumed child by child while walking down the tree.

use tracing::trace;

use super::node::CapacityNode;
use super::tree::Topology;
use super::types::{NodeHandle, VolumeId};

impl Topology {
    /// Reserve one volume slot anywhere in the tree.
    ///
    /// See [`Topology::reserve_one_volume_under`].
    pub fn reserve_one_volume(&self, budget: u64, vid: VolumeId) -> Option<NodeHandle> {
        self.reserve_one_volume_under(self.root(), budget, vid)
    }

    /// Pick the storage node under `handle` that owns slot `budget`.
    ///
    /// Children are visited in id order. A child with no free space is
    /// skipped; a child whose free space is at most the remaining budget
    /// consumes that much of it; otherwise the slot lies inside the child.
    /// A storage node is returned directly, a group is searched with the
    /// reduced budget. If that nested search comes back empty the scan goes
    /// on to later siblings with the budget as it stands.
    ///
    /// `None` means no capacity in this subtree for this budget; only at the
    /// root does it mean the cluster is full. `vid` does not influence the
    /// choice.
    pub fn reserve_one_volume_under(
        &self,
        handle: NodeHandle,
        budget: u64,
        vid: VolumeId,
    ) -> Option<NodeHandle> {
        let children = self.node(handle)?.children()?;
        let mut remaining = budget;

        for &child in children.values() {
            let Some(node) = self.node(child) else {
                continue;
            };
            let free_space = node.free_space();
            if free_space <= 0 {
                continue;
            }
            let free_space = free_space as u64;
            if remaining >= free_space {
                remaining -= free_space;
                continue;
            }

            if node.is_leaf() {
                trace!(volume_id = %vid, node = %node.id(), free_space, "Assigned volume");
                return Some(child);
            }
            if let Some(found) = self.reserve_one_volume_under(child, remaining, vid) {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{DataNode, NodeKind, VolumeInfo};

    fn with_rack(topology: &mut Topology, parent: NodeHandle, id: &str) -> NodeHandle {
        let rack = topology.new_group(id, NodeKind::Rack).unwrap();
        topology.link_child(parent, rack).unwrap();
        rack
    }

    fn with_node(topology: &mut Topology, rack: NodeHandle, id: &str, max: i64, used: u32) -> NodeHandle {
        let mut node = DataNode::new(id, max);
        for vid in 0..used {
            node = node.with_volume(VolumeInfo::new(vid + 1, 0));
        }
        let handle = topology.new_data_node(node);
        topology.link_child(rack, handle).unwrap();
        handle
    }

    #[test]
    fn test_budget_routes_between_racks() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let r1 = with_rack(&mut topology, root, "R1");
        let r2 = with_rack(&mut topology, root, "R2");
        let a = with_node(&mut topology, r1, "a", 3, 0);
        let b = with_node(&mut topology, r2, "b", 2, 0);

        assert_eq!(topology.reserve_one_volume(1, VolumeId(1)), Some(a));
        assert_eq!(topology.reserve_one_volume(4, VolumeId(1)), Some(b));
    }

    #[test]
    fn test_budget_at_total_free_space_fails() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let rack = with_rack(&mut topology, root, "R1");
        with_node(&mut topology, rack, "a", 3, 1);
        with_node(&mut topology, rack, "b", 2, 0);

        let free = topology.free_space(root).unwrap() as u64;
        assert_eq!(free, 4);
        assert!(topology.reserve_one_volume(free - 1, VolumeId(1)).is_some());
        assert!(topology.reserve_one_volume(free, VolumeId(1)).is_none());
        assert!(topology.reserve_one_volume(u64::MAX, VolumeId(1)).is_none());
    }

    #[test]
    fn test_full_nodes_are_skipped() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let rack = with_rack(&mut topology, root, "R1");
        with_node(&mut topology, rack, "a", 2, 2);
        let b = with_node(&mut topology, rack, "b", 1, 0);

        assert_eq!(topology.reserve_one_volume(0, VolumeId(9)), Some(b));
        assert!(topology.reserve_one_volume(1, VolumeId(9)).is_none());
    }

    #[test]
    fn test_overcommitted_node_does_not_absorb_budget() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let rack = with_rack(&mut topology, root, "R1");
        with_node(&mut topology, rack, "a", 1, 3);
        let b = with_node(&mut topology, rack, "b", 4, 0);

        // Rack free space is 2 while b alone offers 4 slots.
        assert_eq!(topology.free_space(rack).unwrap(), 2);
        assert_eq!(topology.reserve_one_volume(0, VolumeId(1)), Some(b));
        assert_eq!(topology.reserve_one_volume(1, VolumeId(1)), Some(b));
        assert!(topology.reserve_one_volume(2, VolumeId(1)).is_none());
    }

    #[test]
    fn test_reserve_under_subtree_and_leaf() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let r1 = with_rack(&mut topology, root, "R1");
        let r2 = with_rack(&mut topology, root, "R2");
        with_node(&mut topology, r1, "a", 3, 0);
        let b = with_node(&mut topology, r2, "b", 2, 0);

        assert_eq!(topology.reserve_one_volume_under(r2, 0, VolumeId(1)), Some(b));
        assert!(topology.reserve_one_volume_under(r2, 2, VolumeId(1)).is_none());
        assert!(topology.reserve_one_volume_under(b, 0, VolumeId(1)).is_none());
    }

    #[test]
    fn test_reservation_coverage_partitions_slots() {
        let mut topology = Topology::new("cluster");
        let root = topology.root();
        let dc = topology.new_group("dc1", NodeKind::DataCenter).unwrap();
        topology.link_child(root, dc).unwrap();
        let r1 = with_rack(&mut topology, dc, "R1");
        let r2 = with_rack(&mut topology, dc, "R2");
        let nodes = [
            with_node(&mut topology, r1, "a", 5, 2),
            with_node(&mut topology, r1, "b", 1, 1),
            with_node(&mut topology, r2, "c", 2, 0),
            with_node(&mut topology, r2, "d", 4, 1),
        ];

        let free = topology.free_space(root).unwrap() as u64;
        let mut hits = std::collections::HashMap::new();
        for r in 0..free {
            let node = topology.reserve_one_volume(r, VolumeId(100)).unwrap();
            *hits.entry(node).or_insert(0i64) += 1;
        }

        for handle in nodes {
            let expected = topology.free_space(handle).unwrap().max(0);
            assert_eq!(hits.get(&handle).copied().unwrap_or(0), expected);
        }
    }
}
