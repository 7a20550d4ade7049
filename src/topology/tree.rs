//! Topology arena and aggregation protocol
//!
//! All nodes live in one [`Topology`] and refer to each other through
//! [`NodeHandle`]s. Children are owned by their parent's child map; the
//! parent link is a plain handle used only to walk upward.
//!
//! Every counter change is applied to the node it concerns and then
//! repeated, with the same delta, on each ancestor up to the root. That
//! keeps the sum invariant (a group's counts equal the sums over its
//! children) at O(depth) per change, without re-scanning subtrees.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::node::{CapacityNode, DataNode, GroupNode, TreeNode, VolumeInfo};
use super::types::{Counters, NodeHandle, NodeId, NodeKind, VolumeId};
use crate::error::{Error, Result};

// =============================================================================
// Arena
// =============================================================================

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<TreeNode>,
}

/// The cluster topology tree.
#[derive(Debug, Clone)]
pub struct Topology {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    root: NodeHandle,
}

impl Topology {
    /// Create a tree holding only a root node named `root_id`.
    pub fn new(root_id: impl Into<NodeId>) -> Self {
        let mut topology = Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            root: NodeHandle {
                index: 0,
                generation: 0,
            },
        };
        topology.root = topology.insert(GroupNode::new(root_id.into(), NodeKind::Root).into());
        topology
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, node: TreeNode) -> NodeHandle {
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Create a detached group node (data center or rack).
    pub fn new_group(&mut self, id: impl Into<NodeId>, kind: NodeKind) -> Result<NodeHandle> {
        let id = id.into();
        if matches!(kind, NodeKind::DataNode | NodeKind::Root) {
            return Err(Error::Config(format!(
                "{} cannot be created as a group node ({})",
                id, kind
            )));
        }
        Ok(self.insert(GroupNode::new(id, kind).into()))
    }

    /// Add a detached storage node to the arena.
    pub fn new_data_node(&mut self, node: DataNode) -> NodeHandle {
        self.insert(node.into())
    }

    /// Look up a node; `None` for stale or unknown handles.
    pub fn node(&self, handle: NodeHandle) -> Option<&TreeNode> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get(&self, handle: NodeHandle) -> Result<&TreeNode> {
        self.node(handle).ok_or(Error::NodeNotFound(handle))
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Result<&mut TreeNode> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(Error::NodeNotFound(handle))
    }

    /// Borrow a storage node, failing if the handle names a group.
    pub fn data_node(&self, handle: NodeHandle) -> Result<&DataNode> {
        let node = self.get(handle)?;
        node.as_data_node().ok_or_else(|| Error::NotADataNode {
            node: self.path_or_id(handle),
        })
    }

    fn data_node_mut(&mut self, handle: NodeHandle) -> Result<&mut DataNode> {
        let path = self.path_or_id(handle);
        self.get_mut(handle)?
            .as_data_node_mut()
            .ok_or(Error::NotADataNode { node: path })
    }

    pub fn counters(&self, handle: NodeHandle) -> Result<Counters> {
        Ok(*self.get(handle)?.counters())
    }

    pub fn free_space(&self, handle: NodeHandle) -> Result<i64> {
        Ok(self.get(handle)?.free_space())
    }

    /// Child of `parent` named `id`, if any.
    pub fn find_child(&self, parent: NodeHandle, id: &NodeId) -> Option<NodeHandle> {
        self.node(parent)?.children()?.get(id).copied()
    }

    /// `handle` and every node below it, parents before children.
    pub fn descendants(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            let Some(node) = self.node(h) else { continue };
            out.push(h);
            if let Some(children) = node.children() {
                stack.extend(children.values().rev().copied());
            }
        }
        out
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// Diagnostic path: ancestors' ids joined with `:`, root first.
    pub fn path(&self, handle: NodeHandle) -> Result<String> {
        let node = self.get(handle)?;
        match node.parent() {
            Some(parent) => Ok(format!("{}:{}", self.path(parent)?, node.id())),
            None => Ok(node.id().to_string()),
        }
    }

    fn path_or_id(&self, handle: NodeHandle) -> String {
        self.path(handle).unwrap_or_else(|_| handle.to_string())
    }

    // =========================================================================
    // Upward Propagation
    // =========================================================================

    /// Apply `step` to `start` and then to each ancestor, stopping early
    /// when `step` returns false.
    fn propagate<F>(&mut self, start: NodeHandle, mut step: F) -> Result<()>
    where
        F: FnMut(&mut Counters) -> bool,
    {
        let mut cursor = Some(start);
        while let Some(handle) = cursor {
            let node = self.get_mut(handle)?;
            if !step(node.counters_mut()) {
                break;
            }
            cursor = node.parent();
        }
        Ok(())
    }

    fn propagate_max_volume_count(&mut self, start: NodeHandle, delta: i64) -> Result<()> {
        self.propagate(start, |c| {
            c.max_volume_count += delta;
            true
        })
    }

    fn propagate_active_volume_count(&mut self, start: NodeHandle, delta: i64) -> Result<()> {
        self.propagate(start, |c| {
            c.active_volume_count += delta;
            true
        })
    }

    fn propagate_max_volume_id(&mut self, start: NodeHandle, vid: VolumeId) -> Result<()> {
        self.propagate(start, |c| {
            if c.max_volume_id < vid {
                c.max_volume_id = vid;
                true
            } else {
                false
            }
        })
    }

    /// Add `delta` (may be negative) to a storage node's `max_volume_count`
    /// and every ancestor's.
    ///
    /// Group counters are sums over their children and only move through
    /// their leaves, so a group handle is rejected with `NotADataNode`.
    pub fn up_adjust_max_volume_count(&mut self, handle: NodeHandle, delta: i64) -> Result<()> {
        self.data_node(handle)?;
        self.propagate_max_volume_count(handle, delta)
    }

    /// Add `delta` (may be negative) to a storage node's
    /// `active_volume_count` and every ancestor's. Storage nodes only.
    pub fn up_adjust_active_volume_count(&mut self, handle: NodeHandle, delta: i64) -> Result<()> {
        self.data_node(handle)?;
        self.propagate_active_volume_count(handle, delta)
    }

    /// Raise `max_volume_id` to `vid` on a storage node and its ancestors.
    /// Never lowers it. Storage nodes only.
    pub fn up_adjust_max_volume_id(&mut self, handle: NodeHandle, vid: VolumeId) -> Result<()> {
        self.data_node(handle)?;
        self.propagate_max_volume_id(handle, vid)
    }

    // =========================================================================
    // Attach / Detach
    // =========================================================================

    /// Attach `child` under `parent`.
    ///
    /// Returns `Ok(false)` without touching any counter when `parent`
    /// already holds a child with the same id.
    pub fn link_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<bool> {
        let parent_node = self.get(parent)?;
        let child_node = self.get(child)?;
        let child_id = child_node.id().clone();

        let Some(siblings) = parent_node.children() else {
            return Err(Error::NotAGroup {
                node: self.path_or_id(parent),
            });
        };
        if siblings.contains_key(&child_id) {
            return Ok(false);
        }
        if !parent_node.kind().can_contain(child_node.kind()) {
            return Err(Error::UnexpectedNodeKind {
                parent: self.path_or_id(parent),
                parent_kind: parent_node.kind(),
                child: child_id.to_string(),
                child_kind: child_node.kind(),
            });
        }
        if let Some(current) = child_node.parent() {
            return Err(Error::AlreadyAttached {
                node: child_id.to_string(),
                parent: self.path_or_id(current),
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::WouldCreateCycle {
                node: child_id.to_string(),
                parent: self.path_or_id(parent),
            });
        }

        let counters = *child_node.counters();

        if let Some(group) = self.get_mut(parent)?.as_group_mut() {
            group.insert_child(child_id, child);
        }
        self.get_mut(child)?.set_parent(Some(parent));

        self.propagate_max_volume_count(parent, counters.max_volume_count)?;
        self.propagate_max_volume_id(parent, counters.max_volume_id)?;
        self.propagate_active_volume_count(parent, counters.active_volume_count)?;

        debug!(
            parent = %self.path_or_id(parent),
            child = %self.path_or_id(child),
            active_volume_count = self.get(parent)?.active_volume_count(),
            "Linked child node"
        );
        Ok(true)
    }

    /// Detach the child named `child_id` from `parent`.
    ///
    /// Count contributions are withdrawn from every ancestor; `max_volume_id`
    /// stays where it is. The detached subtree remains in the arena and its
    /// handle is returned so it can be re-linked or released. Returns
    /// `Ok(None)` when there is no such child.
    pub fn unlink_child(
        &mut self,
        parent: NodeHandle,
        child_id: &NodeId,
    ) -> Result<Option<NodeHandle>> {
        let parent_path = self.path_or_id(parent);
        let Some(group) = self.get_mut(parent)?.as_group_mut() else {
            return Err(Error::NotAGroup { node: parent_path });
        };
        let Some(child) = group.remove_child(child_id) else {
            return Ok(None);
        };

        let child_node = self.get_mut(child)?;
        child_node.set_parent(None);
        let counters = *child_node.counters();

        self.propagate_active_volume_count(parent, -counters.active_volume_count)?;
        self.propagate_max_volume_count(parent, -counters.max_volume_count)?;

        debug!(
            parent = %parent_path,
            child = %child_id,
            active_volume_count = self.get(parent)?.active_volume_count(),
            "Unlinked child node"
        );
        Ok(Some(child))
    }

    /// Release a detached subtree and invalidate all of its handles.
    pub fn remove_detached(&mut self, handle: NodeHandle) -> Result<usize> {
        let node = self.get(handle)?;
        if handle == self.root || node.parent().is_some() {
            return Err(Error::StillAttached {
                node: self.path_or_id(handle),
            });
        }

        let doomed = self.descendants(handle);
        for h in &doomed {
            let slot = &mut self.slots[h.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_slots.push(h.index);
        }
        trace!(released = doomed.len(), "Released detached subtree");
        Ok(doomed.len())
    }

    fn is_ancestor_or_self(&self, candidate: NodeHandle, of: NodeHandle) -> bool {
        let mut cursor = Some(of);
        while let Some(h) = cursor {
            if h == candidate {
                return true;
            }
            cursor = self.node(h).and_then(|n| n.parent());
        }
        false
    }

    // =========================================================================
    // Storage Node Operations
    // =========================================================================

    /// Set a storage node's configured capacity, pushing the difference up.
    pub fn set_max_volume_count(&mut self, handle: NodeHandle, max_volume_count: i64) -> Result<()> {
        let delta = max_volume_count - self.data_node(handle)?.max_volume_count();
        if delta != 0 {
            self.propagate_max_volume_count(handle, delta)?;
        }
        Ok(())
    }

    /// Record a volume on a storage node.
    ///
    /// A new volume occupies one slot and may raise the max volume id; a
    /// known one is updated in place. Returns true if the volume was new.
    pub fn add_or_update_volume(&mut self, handle: NodeHandle, volume: VolumeInfo) -> Result<bool> {
        let vid = volume.id;
        let node = self.data_node_mut(handle)?;
        if node.volumes.insert(vid, volume).is_some() {
            return Ok(false);
        }
        self.propagate_active_volume_count(handle, 1)?;
        self.propagate_max_volume_id(handle, vid)?;
        Ok(true)
    }

    /// Drop a volume from a storage node, freeing its slot.
    pub fn remove_volume(&mut self, handle: NodeHandle, vid: VolumeId) -> Result<Option<VolumeInfo>> {
        let removed = self.data_node_mut(handle)?.volumes.remove(&vid);
        if removed.is_some() {
            self.propagate_active_volume_count(handle, -1)?;
        }
        Ok(removed)
    }

    pub fn update_last_seen(&mut self, handle: NodeHandle, seen: DateTime<Utc>) -> Result<()> {
        self.data_node_mut(handle)?.last_seen = seen;
        Ok(())
    }

    pub fn update_public_url(&mut self, handle: NodeHandle, public_url: Option<String>) -> Result<()> {
        self.data_node_mut(handle)?.public_url = public_url;
        Ok(())
    }
}
