//! Static layout files
//!
//! A YAML description of data centers, racks and storage nodes, used to
//! seed a [`Topology`] for inspection and tests.
//!
//! ```yaml
//! root: cluster
//! data_centers:
//!   - id: dc1
//!     racks:
//!       - id: rack1
//!         nodes:
//!           - id: node1
//!             max_volume_count: 7
//!             public_url: 10.0.0.1:8080
//!             volumes:
//!               - { id: 1, size: 1024 }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::topology::{DataNode, NodeKind, Topology, VolumeInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default)]
    pub data_centers: Vec<DataCenterLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCenterLayout {
    pub id: String,

    #[serde(default)]
    pub racks: Vec<RackLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackLayout {
    pub id: String,

    #[serde(default)]
    pub nodes: Vec<NodeLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLayout {
    pub id: String,

    pub max_volume_count: i64,

    #[serde(default)]
    pub public_url: Option<String>,

    /// Last heartbeat; the build time is used when absent
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,
}

fn default_root() -> String {
    "topo".to_string()
}

impl Layout {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Build a tree, attaching every level through the normal link path.
    pub fn build(&self, now: DateTime<Utc>) -> Result<Topology> {
        let mut topology = Topology::new(self.root.as_str());
        let root = topology.root();

        for dc in &self.data_centers {
            let dc_handle = topology.ensure_group(root, dc.id.as_str(), NodeKind::DataCenter)?;
            for rack in &dc.racks {
                let rack_handle =
                    topology.ensure_group(dc_handle, rack.id.as_str(), NodeKind::Rack)?;
                for node in &rack.nodes {
                    let mut data_node = DataNode::new(node.id.as_str(), node.max_volume_count)
                        .with_last_seen(node.last_seen.unwrap_or(now));
                    data_node.public_url = node.public_url.clone();
                    for volume in &node.volumes {
                        data_node = data_node.with_volume(volume.clone());
                    }
                    let handle = topology.new_data_node(data_node);
                    if !topology.link_child(rack_handle, handle)? {
                        debug!(node = %node.id, rack = %rack.id, "Skipping duplicate node");
                        topology.remove_detached(handle)?;
                    }
                }
            }
        }
        Ok(topology)
    }
}
