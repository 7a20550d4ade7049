//! Writable-Volume Collector
//!
//! Racks are the only level where eligibility is decided: each storage node
//! under a rack that passes the freshness test contributes its volumes
//! below the size limit. Every level above a rack only dispatches to its
//! children and concatenates what they return.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::node::{CapacityNode, TreeNode};
use super::tree::Topology;
use super::types::{NodeHandle, NodeKind, VolumeId};
use crate::error::{Error, Result};

impl Topology {
    /// Volumes under `handle` that can take more data.
    ///
    /// A storage node counts as fresh when its last heartbeat is at or after
    /// `fresh_threshold`; nodes seen earlier are skipped entirely. A volume
    /// is writable when its size is strictly below `size_limit`. Results
    /// keep traversal order and are not de-duplicated. Collecting at a
    /// storage node yields nothing; only racks look inside storage nodes.
    pub fn collect_writable_volumes(
        &self,
        handle: NodeHandle,
        fresh_threshold: DateTime<Utc>,
        size_limit: u64,
    ) -> Result<Vec<VolumeId>> {
        let mut writable = Vec::new();
        self.collect_into(handle, fresh_threshold, size_limit, &mut writable)?;
        Ok(writable)
    }

    fn collect_into(
        &self,
        handle: NodeHandle,
        fresh_threshold: DateTime<Utc>,
        size_limit: u64,
        out: &mut Vec<VolumeId>,
    ) -> Result<()> {
        let group = match self.get(handle)? {
            TreeNode::Group(group) => group,
            TreeNode::Data(_) => return Ok(()),
        };
        let Some(children) = group.children() else {
            return Ok(());
        };

        if group.kind() != NodeKind::Rack {
            for &child in children.values() {
                self.collect_into(child, fresh_threshold, size_limit, out)?;
            }
            return Ok(());
        }

        for &child in children.values() {
            match self.get(child)? {
                TreeNode::Data(data_node) => {
                    if !data_node.is_fresh(fresh_threshold) {
                        continue;
                    }
                    out.extend(data_node.writable_volumes(size_limit));
                }
                TreeNode::Group(misplaced) => {
                    let parent = self.path(handle)?;
                    warn!(rack = %parent, child = %misplaced.id(), "Group node found under rack");
                    return Err(Error::UnexpectedNodeKind {
                        parent,
                        parent_kind: NodeKind::Rack,
                        child: misplaced.id().to_string(),
                        child_kind: misplaced.kind(),
                    });
                }
            }
        }
        Ok(())
    }
}
