//! Topology Tree
//!
//! The coordinator's view of the cluster layout, used to account capacity
//! and to pick a storage node for every new volume.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Topology (root)                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │      ┌─────────────┐                  ┌─────────────┐        │
//! │      │ DataCenter  │                  │ DataCenter  │        │
//! │      └──────┬──────┘                  └──────┬──────┘        │
//! │      ┌──────┴──────┐                  ┌──────┴──────┐        │
//! │      │    Rack     │                  │    Rack     │        │
//! │      └──────┬──────┘                  └──────┬──────┘        │
//! │   ┌─────────┴─────────┐                      │               │
//! │ ┌─┴────────┐   ┌──────┴───┐            ┌─────┴────┐          │
//! │ │ DataNode │   │ DataNode │            │ DataNode │  leaves  │
//! │ └──────────┘   └──────────┘            └──────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every group caches `max_volume_count`, `active_volume_count` and
//! `max_volume_id` for its subtree. Counter changes start at the node
//! concerned and walk up the parent chain with the same delta.
//!
//! # Components
//!
//! - **Node variants** (`node.rs`): [`GroupNode`], [`DataNode`], the
//!   [`TreeNode`] sum type and the [`CapacityNode`] capability trait
//! - **Arena and aggregation** (`tree.rs`): [`Topology`], attach/detach and
//!   upward counter propagation
//! - **Placement selector** (`placement.rs`): budget-driven, free-space
//!   proportional choice of a storage node
//! - **Writable-volume collector** (`collect.rs`)
//! - **Membership** (`membership.rs`): get-or-create helpers and heartbeat
//!   reconciliation
//! - **Status** (`status.rs`): serialisable snapshot
//!
//! # Example
//!
//! ```
//! use volume_topology::topology::{DataNode, NodeKind, Topology, VolumeId};
//!
//! let mut topology = Topology::new("cluster");
//! let rack = topology.new_group("rack1", NodeKind::Rack).unwrap();
//! topology.link_child(topology.root(), rack).unwrap();
//!
//! let node = topology.new_data_node(DataNode::new("dn1", 3));
//! topology.link_child(rack, node).unwrap();
//!
//! assert_eq!(topology.free_space(topology.root()).unwrap(), 3);
//! assert_eq!(topology.reserve_one_volume(2, VolumeId(1)), Some(node));
//! assert_eq!(topology.reserve_one_volume(3, VolumeId(1)), None);
//! ```

mod collect;
mod membership;
mod node;
mod placement;
mod status;
mod tree;
mod types;

#[cfg(test)]
mod proptest;

pub use membership::{Heartbeat, HeartbeatOutcome};
pub use node::{CapacityNode, DataNode, GroupNode, TreeNode, VolumeInfo};
pub use status::NodeStatus;
pub use tree::Topology;
pub use types::{Counters, NodeHandle, NodeId, NodeKind, VolumeId};
