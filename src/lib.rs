//! Volume Topology - cluster topology tree for volume placement
//!
//! Tracks the physical layout of a storage cluster (data center → rack →
//! storage node) together with aggregate capacity counters, and answers the
//! two questions a volume coordinator keeps asking: how much free capacity
//! exists under a node, and which storage node should host the next volume.
//!
//! # Architecture
//!
//! ```text
//! Heartbeats / membership ──▶ ClusterTopology ──▶ Topology (arena tree)
//!                                  │                  │
//!          allocation API ─────────┤ reserve          ├─ aggregation protocol
//!          compaction / GC ────────┘ writable         ├─ placement selector
//!                                                     └─ writable-volume collector
//! ```
//!
//! # Modules
//!
//! - [`topology`] - Tree, aggregation protocol, placement and collection
//! - [`cluster`] - Lock-guarded shared handle used by the coordinator
//! - [`config`] - Size limit, freshness window and default placement names
//! - [`layout`] - YAML layout files for seeding a tree
//! - [`metrics`] - Prometheus collectors for capacity and reservations
//! - [`error`] - Error types

pub mod cluster;
pub mod config;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod topology;

// Re-export commonly used types
pub use cluster::{ClusterTopology, Reservation};
pub use config::TopologyConfig;
pub use error::{Error, Result};
pub use layout::Layout;
pub use metrics::TopologyMetrics;
pub use topology::{DataNode, Heartbeat, NodeHandle, NodeId, NodeKind, Topology, VolumeId, VolumeInfo};
