//! Topology value objects
//!
//! Identifiers, node kinds, arena handles and the per-node capacity counters.

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Node identifier (value object).
///
/// Unique among the children of one parent only, not across the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Cluster-wide volume identifier (value object).
///
/// Ordered, so the highest id observed in a subtree is well defined.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VolumeId(pub u32);

impl VolumeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VolumeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// =============================================================================
// Node Kind
// =============================================================================

/// Level of a node in the topology tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// The whole cluster.
    #[serde(rename = "Topology")]
    Root,
    /// A data center.
    DataCenter,
    /// A rack; the level directly above storage nodes.
    Rack,
    /// A storage server (leaf).
    DataNode,
}

impl NodeKind {
    /// Returns true for the leaf kind.
    pub fn is_leaf(self) -> bool {
        self == NodeKind::DataNode
    }

    /// Whether a node of this kind may hold a child of `child` kind.
    ///
    /// Racks hold storage nodes only, storage nodes hold nothing and the
    /// root is never a child. Root and data centers may nest freely.
    pub fn can_contain(self, child: NodeKind) -> bool {
        match (self, child) {
            (_, NodeKind::Root) => false,
            (NodeKind::DataNode, _) => false,
            (NodeKind::Rack, NodeKind::DataNode) => true,
            (NodeKind::Rack, _) => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Root => write!(f, "Topology"),
            NodeKind::DataCenter => write!(f, "DataCenter"),
            NodeKind::Rack => write!(f, "Rack"),
            NodeKind::DataNode => write!(f, "DataNode"),
        }
    }
}

// =============================================================================
// Node Handle
// =============================================================================

/// Non-owning reference to a node held by a [`Topology`](super::Topology).
///
/// The generation makes a handle to a released slot stale instead of
/// silently aliasing whatever node reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Cached capacity counters carried by every node.
///
/// For a storage node these are its own values; for a group they are the
/// sums over its children, kept current by upward delta propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Capacity ceiling in volume slots.
    pub max_volume_count: i64,

    /// Occupied volume slots.
    pub active_volume_count: i64,

    /// Highest volume id ever observed in the subtree.
    pub max_volume_id: VolumeId,
}

impl Counters {
    /// Free volume slots. Derived, never stored.
    pub fn free_space(&self) -> i64 {
        self.max_volume_count - self.active_volume_count
    }
}
