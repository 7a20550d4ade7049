//! Serialisable capacity snapshot of the tree, for diagnostics.

use serde::{Deserialize, Serialize};

use super::node::{CapacityNode, TreeNode};
use super::tree::Topology;
use super::types::{NodeHandle, NodeKind, VolumeId};
use crate::error::Result;

/// Capacity report for one node and, recursively, its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStatus {
    pub id: String,
    pub kind: NodeKind,
    pub max: i64,
    pub free: i64,
    pub max_volume_id: VolumeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Hosted volume count, storage nodes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeStatus>,
}

impl NodeStatus {
    /// Pretty-printed JSON, as served to operators.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Topology {
    /// Snapshot of the whole tree.
    pub fn status(&self) -> Result<NodeStatus> {
        self.status_of(self.root())
    }

    /// Snapshot of the subtree rooted at `handle`.
    pub fn status_of(&self, handle: NodeHandle) -> Result<NodeStatus> {
        let node = self.get(handle)?;
        let mut status = NodeStatus {
            id: node.id().to_string(),
            kind: node.kind(),
            max: node.max_volume_count(),
            free: node.free_space(),
            max_volume_id: node.max_volume_id(),
            public_url: None,
            volumes: None,
            children: Vec::new(),
        };

        match node {
            TreeNode::Data(data_node) => {
                status.public_url = data_node.public_url.clone();
                status.volumes = Some(data_node.volume_count());
            }
            TreeNode::Group(group) => {
                if let Some(children) = group.children() {
                    status.children = children
                        .values()
                        .map(|&child| self.status_of(child))
                        .collect::<Result<_>>()?;
                }
            }
        }
        Ok(status)
    }
}
