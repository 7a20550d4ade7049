//! Tree node variants
//!
//! A node is either a [`GroupNode`] (root, data center or rack) holding
//! children, or a [`DataNode`] leaf holding volume records. Both expose the
//! [`CapacityNode`] capability set the aggregation protocol is written
//! against.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Counters, NodeHandle, NodeId, NodeKind, VolumeId};

// =============================================================================
// Capability Trait
// =============================================================================

/// Capabilities shared by every node in the tree.
pub trait CapacityNode {
    fn id(&self) -> &NodeId;

    fn kind(&self) -> NodeKind;

    /// Enclosing node, if attached.
    fn parent(&self) -> Option<NodeHandle>;

    fn set_parent(&mut self, parent: Option<NodeHandle>);

    fn counters(&self) -> &Counters;

    fn counters_mut(&mut self) -> &mut Counters;

    /// Child mapping, `None` for leaves.
    fn children(&self) -> Option<&BTreeMap<NodeId, NodeHandle>>;

    fn is_leaf(&self) -> bool {
        self.kind().is_leaf()
    }

    fn free_space(&self) -> i64 {
        self.counters().free_space()
    }

    fn max_volume_count(&self) -> i64 {
        self.counters().max_volume_count
    }

    fn active_volume_count(&self) -> i64 {
        self.counters().active_volume_count
    }

    fn max_volume_id(&self) -> VolumeId {
        self.counters().max_volume_id
    }
}

// =============================================================================
// Volume Record
// =============================================================================

/// One storage volume as reported by the hosting storage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Cluster-wide volume id
    pub id: VolumeId,

    /// Current occupied size in bytes
    pub size: u64,

    /// Collection the volume belongs to
    #[serde(default)]
    pub collection: String,

    /// Number of files stored
    #[serde(default)]
    pub file_count: u64,

    /// Number of deleted files not yet compacted
    #[serde(default)]
    pub delete_count: u64,

    /// Bytes held by deleted files not yet compacted
    #[serde(default)]
    pub deleted_byte_count: u64,

    /// Set by the storage node when the volume stops taking writes
    #[serde(default)]
    pub read_only: bool,

    /// On-disk format version
    #[serde(default)]
    pub version: u32,
}

impl VolumeInfo {
    pub fn new(id: u32, size: u64) -> Self {
        Self {
            id: VolumeId(id),
            size,
            collection: String::new(),
            file_count: 0,
            delete_count: 0,
            deleted_byte_count: 0,
            read_only: false,
            version: 0,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Whether the volume can still take writes under `size_limit`.
    pub fn is_writable(&self, size_limit: u64) -> bool {
        self.size < size_limit
    }
}

// =============================================================================
// Group Node
// =============================================================================

/// Aggregation point: the cluster root, a data center or a rack.
#[derive(Debug, Clone)]
pub struct GroupNode {
    id: NodeId,
    kind: NodeKind,
    counters: Counters,
    parent: Option<NodeHandle>,
    children: BTreeMap<NodeId, NodeHandle>,
}

impl GroupNode {
    /// Create an empty group. `kind` must not be [`NodeKind::DataNode`];
    /// [`Topology::new_group`](super::Topology::new_group) enforces that.
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            counters: Counters::default(),
            parent: None,
            children: BTreeMap::new(),
        }
    }

    pub fn child(&self, id: &NodeId) -> Option<NodeHandle> {
        self.children.get(id).copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn insert_child(&mut self, id: NodeId, handle: NodeHandle) {
        self.children.insert(id, handle);
    }

    pub(crate) fn remove_child(&mut self, id: &NodeId) -> Option<NodeHandle> {
        self.children.remove(id)
    }
}

impl CapacityNode for GroupNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<NodeHandle>) {
        self.parent = parent;
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    fn children(&self) -> Option<&BTreeMap<NodeId, NodeHandle>> {
        Some(&self.children)
    }
}

// =============================================================================
// Data Node
// =============================================================================

/// A storage server: the leaf of the tree.
#[derive(Debug, Clone)]
pub struct DataNode {
    id: NodeId,
    counters: Counters,
    parent: Option<NodeHandle>,

    /// Most recent heartbeat
    pub(crate) last_seen: DateTime<Utc>,

    /// Address clients use to reach the server
    pub public_url: Option<String>,

    pub(crate) volumes: BTreeMap<VolumeId, VolumeInfo>,
}

impl DataNode {
    /// Create a detached storage node with `max_volume_count` slots.
    pub fn new(id: impl Into<NodeId>, max_volume_count: i64) -> Self {
        Self {
            id: id.into(),
            counters: Counters {
                max_volume_count,
                ..Default::default()
            },
            parent: None,
            last_seen: Utc::now(),
            public_url: None,
            volumes: BTreeMap::new(),
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = last_seen;
        self
    }

    /// Preload a volume before the node is attached.
    ///
    /// Only touches this node's own counters; ancestors pick the values up
    /// when the node is linked.
    pub fn with_volume(mut self, volume: VolumeInfo) -> Self {
        let id = volume.id;
        if self.volumes.insert(id, volume).is_none() {
            self.counters.active_volume_count += 1;
        }
        if id > self.counters.max_volume_id {
            self.counters.max_volume_id = id;
        }
        self
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Fresh means seen at or after the `threshold` instant.
    pub fn is_fresh(&self, threshold: DateTime<Utc>) -> bool {
        self.last_seen >= threshold
    }

    pub fn volume(&self, id: VolumeId) -> Option<&VolumeInfo> {
        self.volumes.get(&id)
    }

    pub fn volumes(&self) -> impl Iterator<Item = &VolumeInfo> {
        self.volumes.values()
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Ids of hosted volumes strictly below `size_limit`, in id order.
    pub fn writable_volumes(&self, size_limit: u64) -> impl Iterator<Item = VolumeId> + '_ {
        self.volumes
            .values()
            .filter(move |v| v.is_writable(size_limit))
            .map(|v| v.id)
    }
}

impl CapacityNode for DataNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::DataNode
    }

    fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<NodeHandle>) {
        self.parent = parent;
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    fn children(&self) -> Option<&BTreeMap<NodeId, NodeHandle>> {
        None
    }
}

// =============================================================================
// Tree Node
// =============================================================================

/// A node stored in the topology arena.
#[derive(Debug, Clone)]
pub enum TreeNode {
    Group(GroupNode),
    Data(DataNode),
}

impl TreeNode {
    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            TreeNode::Group(g) => Some(g),
            TreeNode::Data(_) => None,
        }
    }

    pub fn as_data_node(&self) -> Option<&DataNode> {
        match self {
            TreeNode::Data(d) => Some(d),
            TreeNode::Group(_) => None,
        }
    }

    pub(crate) fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        match self {
            TreeNode::Group(g) => Some(g),
            TreeNode::Data(_) => None,
        }
    }

    pub(crate) fn as_data_node_mut(&mut self) -> Option<&mut DataNode> {
        match self {
            TreeNode::Data(d) => Some(d),
            TreeNode::Group(_) => None,
        }
    }

    fn inner(&self) -> &dyn CapacityNode {
        match self {
            TreeNode::Group(g) => g,
            TreeNode::Data(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CapacityNode {
        match self {
            TreeNode::Group(g) => g,
            TreeNode::Data(d) => d,
        }
    }
}

impl CapacityNode for TreeNode {
    fn id(&self) -> &NodeId {
        self.inner().id()
    }

    fn kind(&self) -> NodeKind {
        self.inner().kind()
    }

    fn parent(&self) -> Option<NodeHandle> {
        self.inner().parent()
    }

    fn set_parent(&mut self, parent: Option<NodeHandle>) {
        self.inner_mut().set_parent(parent);
    }

    fn counters(&self) -> &Counters {
        self.inner().counters()
    }

    fn counters_mut(&mut self) -> &mut Counters {
        self.inner_mut().counters_mut()
    }

    fn children(&self) -> Option<&BTreeMap<NodeId, NodeHandle>> {
        self.inner().children()
    }
}

impl From<GroupNode> for TreeNode {
    fn from(node: GroupNode) -> Self {
        TreeNode::Group(node)
    }
}

impl From<DataNode> for TreeNode {
    fn from(node: DataNode) -> Self {
        TreeNode::Data(node)
    }
}
