//! Membership helpers
//!
//! Get-or-create along a `data center / rack / storage node` path, heartbeat
//! reconciliation and storage node removal, all built on the attach/detach
//! primitives so the aggregate counters stay consistent.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::node::{CapacityNode, DataNode, VolumeInfo};
use super::tree::Topology;
use super::types::{NodeHandle, NodeId, NodeKind, VolumeId};
use crate::error::{Error, Result};

/// Periodic report a storage node sends to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Data center name; the configured default is used when absent
    #[serde(default)]
    pub data_center: Option<String>,

    /// Rack name; the configured default is used when absent
    #[serde(default)]
    pub rack: Option<String>,

    pub node_id: String,

    #[serde(default)]
    pub public_url: Option<String>,

    /// Configured volume slots
    pub max_volume_count: i64,

    /// Every volume currently hosted
    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,

    pub timestamp: DateTime<Utc>,
}

/// Outcome of applying a heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Volumes seen for the first time
    pub added: Vec<VolumeId>,

    /// Volumes no longer reported
    pub removed: Vec<VolumeId>,
}

impl Topology {
    /// Child group `id` of `parent`, created and linked if missing.
    pub fn ensure_group(
        &mut self,
        parent: NodeHandle,
        id: impl Into<NodeId>,
        kind: NodeKind,
    ) -> Result<NodeHandle> {
        let id = id.into();
        if let Some(existing) = self.find_child(parent, &id) {
            let existing_kind = self.get(existing)?.kind();
            if existing_kind != kind {
                return Err(Error::UnexpectedNodeKind {
                    parent: self.path(parent)?,
                    parent_kind: self.get(parent)?.kind(),
                    child: id.to_string(),
                    child_kind: existing_kind,
                });
            }
            return Ok(existing);
        }

        let group = self.new_group(id, kind)?;
        if let Err(e) = self.link_child(parent, group) {
            self.remove_detached(group)?;
            return Err(e);
        }
        info!(node = %self.path(group)?, kind = %kind, "Registered group node");
        Ok(group)
    }

    /// Rack `rack` in data center `data_center`, creating both as needed.
    pub fn ensure_rack(&mut self, data_center: &str, rack: &str) -> Result<NodeHandle> {
        let dc = self.ensure_group(self.root(), data_center, NodeKind::DataCenter)?;
        self.ensure_group(dc, rack, NodeKind::Rack)
    }

    /// Attached storage node named `id`, wherever it sits in the tree.
    ///
    /// Storage node ids name servers, so they are unique cluster-wide even
    /// though the tree only enforces uniqueness among siblings.
    pub fn find_data_node(&self, id: &NodeId) -> Option<NodeHandle> {
        self.descendants(self.root()).into_iter().find(|&h| {
            self.node(h)
                .map_or(false, |node| node.is_leaf() && node.id() == id)
        })
    }

    /// Storage node `node` under `data_center/rack`, created as needed.
    ///
    /// An existing node keeps its counters; call
    /// [`Topology::set_max_volume_count`] to change its capacity. A node
    /// registered under another rack is moved, volumes and all, so its
    /// capacity is never counted twice.
    pub fn ensure_data_node(
        &mut self,
        data_center: &str,
        rack: &str,
        node: &str,
        max_volume_count: i64,
        public_url: Option<String>,
    ) -> Result<NodeHandle> {
        let rack = self.ensure_rack(data_center, rack)?;
        let id = NodeId::from(node);
        if let Some(existing) = self.find_child(rack, &id) {
            return Ok(existing);
        }

        if let Some(existing) = self.find_data_node(&id) {
            let from = self.path(existing)?;
            if let Some(old_parent) = self.get(existing)?.parent() {
                self.unlink_child(old_parent, &id)?;
            }
            self.link_child(rack, existing)?;
            info!(from = %from, to = %self.path(existing)?, "Moved data node");
            return Ok(existing);
        }

        let mut data_node = DataNode::new(id, max_volume_count);
        data_node.public_url = public_url;
        let handle = self.new_data_node(data_node);
        if let Err(e) = self.link_child(rack, handle) {
            self.remove_detached(handle)?;
            return Err(e);
        }
        info!(node = %self.path(handle)?, max_volume_count, "Registered data node");
        Ok(handle)
    }

    /// Bring a storage node's state in line with its latest heartbeat.
    ///
    /// Refreshes `last_seen`, capacity and the public URL (when reported),
    /// adds or updates every reported volume and drops volumes the node no
    /// longer reports.
    pub fn apply_heartbeat(
        &mut self,
        handle: NodeHandle,
        heartbeat: &Heartbeat,
    ) -> Result<HeartbeatOutcome> {
        self.update_last_seen(handle, heartbeat.timestamp)?;
        self.set_max_volume_count(handle, heartbeat.max_volume_count)?;
        if heartbeat.public_url.is_some()
            && self.data_node(handle)?.public_url != heartbeat.public_url
        {
            self.update_public_url(handle, heartbeat.public_url.clone())?;
        }

        let mut outcome = HeartbeatOutcome::default();
        let reported: BTreeSet<VolumeId> = heartbeat.volumes.iter().map(|v| v.id).collect();
        let known: Vec<VolumeId> = self.data_node(handle)?.volumes().map(|v| v.id).collect();

        for vid in known.into_iter().filter(|vid| !reported.contains(vid)) {
            if self.remove_volume(handle, vid)?.is_some() {
                outcome.removed.push(vid);
            }
        }
        for volume in &heartbeat.volumes {
            let vid = volume.id;
            if self.add_or_update_volume(handle, volume.clone())? {
                outcome.added.push(vid);
            }
        }

        debug!(
            node = %heartbeat.node_id,
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            "Applied heartbeat"
        );
        Ok(outcome)
    }

    /// Detach and release storage node `node` under `data_center/rack`.
    ///
    /// Returns false when no such node is registered.
    pub fn remove_data_node(&mut self, data_center: &str, rack: &str, node: &str) -> Result<bool> {
        let Some(dc) = self.find_child(self.root(), &NodeId::from(data_center)) else {
            return Ok(false);
        };
        let Some(rack) = self.find_child(dc, &NodeId::from(rack)) else {
            return Ok(false);
        };
        match self.unlink_child(rack, &NodeId::from(node))? {
            Some(detached) => {
                self.remove_detached(detached)?;
                info!(data_center, node, "Removed data node");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
