//! Shared Cluster Topology
//!
//! The coordinator-facing handle. One [`Topology`] is guarded by a single
//! reader/writer lock covering the whole tree, because a counter update
//! walks the full ancestor chain and per-node locking would have to order
//! those walks. Membership changes and reservations take the write lock;
//! collection and reporting take the read lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::config::TopologyConfig;
use crate::error::Result;
use crate::metrics::TopologyMetrics;
use crate::topology::{
    CapacityNode, Heartbeat, HeartbeatOutcome, NodeHandle, NodeId, NodeKind, NodeStatus, Topology,
    VolumeId,
};

/// Storage node chosen for a new volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub node: NodeHandle,
    pub node_id: NodeId,
    pub public_url: Option<String>,
    /// Diagnostic path, e.g. `topo:dc1:rack1:node1`
    pub path: String,
    pub volume_id: VolumeId,
}

/// Thread-safe, cloneable handle to the cluster topology
#[derive(Clone)]
pub struct ClusterTopology {
    inner: Arc<RwLock<Topology>>,
    config: Arc<TopologyConfig>,
    metrics: Option<TopologyMetrics>,
}

impl ClusterTopology {
    /// Create an empty topology rooted at `config.root_id`.
    pub fn new(config: TopologyConfig) -> Result<Self> {
        config.validate()?;
        let topology = Topology::new(config.root_id.as_str());
        Ok(Self::from_topology(topology, config))
    }

    /// Wrap an already built tree.
    pub fn from_topology(topology: Topology, config: TopologyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(topology)),
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// Record reservation outcomes and refresh gauges in `metrics`.
    pub fn with_metrics(mut self, metrics: TopologyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&TopologyMetrics> {
        self.metrics.as_ref()
    }

    /// Shared access to the tree for ad hoc queries.
    pub fn read(&self) -> RwLockReadGuard<'_, Topology> {
        self.inner.read()
    }

    /// Exclusive access to the tree for ad hoc mutations.
    pub fn write(&self) -> RwLockWriteGuard<'_, Topology> {
        self.inner.write()
    }

    // =========================================================================
    // Membership
    // =========================================================================

    #[instrument(skip(self))]
    pub fn get_or_create_data_center(&self, data_center: &str) -> Result<NodeHandle> {
        let mut topology = self.inner.write();
        let root = topology.root();
        topology.ensure_group(root, data_center, NodeKind::DataCenter)
    }

    #[instrument(skip(self))]
    pub fn get_or_create_rack(&self, data_center: &str, rack: &str) -> Result<NodeHandle> {
        self.inner.write().ensure_rack(data_center, rack)
    }

    #[instrument(skip(self))]
    pub fn get_or_create_data_node(
        &self,
        data_center: &str,
        rack: &str,
        node: &str,
        max_volume_count: i64,
        public_url: Option<String>,
    ) -> Result<NodeHandle> {
        self.inner
            .write()
            .ensure_data_node(data_center, rack, node, max_volume_count, public_url)
    }

    /// Register the sender if needed and apply its report, under one lock.
    #[instrument(skip(self, heartbeat), fields(node = %heartbeat.node_id))]
    pub fn process_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(NodeHandle, HeartbeatOutcome)> {
        let data_center = heartbeat
            .data_center
            .as_deref()
            .unwrap_or(&self.config.default_data_center);
        let rack = heartbeat.rack.as_deref().unwrap_or(&self.config.default_rack);

        let mut topology = self.inner.write();
        let handle = topology.ensure_data_node(
            data_center,
            rack,
            &heartbeat.node_id,
            heartbeat.max_volume_count,
            heartbeat.public_url.clone(),
        )?;
        let outcome = topology.apply_heartbeat(handle, heartbeat)?;
        Ok((handle, outcome))
    }

    #[instrument(skip(self))]
    pub fn unregister_data_node(&self, data_center: &str, rack: &str, node: &str) -> Result<bool> {
        let removed = self.inner.write().remove_data_node(data_center, rack, node)?;
        if !removed {
            debug!("Data node was not registered");
        }
        Ok(removed)
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Resolve `budget` to a storage node at the root.
    ///
    /// The caller owns the choice of budget; see [`ClusterTopology::reserve_random`]
    /// for the usual space-proportional draw.
    #[instrument(skip(self))]
    pub fn reserve(&self, budget: u64, volume_id: VolumeId) -> Result<Option<Reservation>> {
        let topology = self.inner.write();
        self.reserve_in(&topology, budget, volume_id)
    }

    /// Reserve with a budget drawn uniformly from the root's free space.
    ///
    /// The draw and the reservation happen under the same lock, so the
    /// budget always matches the tree it is applied to.
    pub fn reserve_random<R: Rng>(
        &self,
        volume_id: VolumeId,
        rng: &mut R,
    ) -> Result<Option<Reservation>> {
        let topology = self.inner.write();
        let free_space = topology.free_space(topology.root())?;
        if free_space <= 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_reservation(false);
            }
            warn!(volume_id = %volume_id, "Cluster has no free volume slots");
            return Ok(None);
        }
        let budget = rng.gen_range(0..free_space as u64);
        self.reserve_in(&topology, budget, volume_id)
    }

    fn reserve_in(
        &self,
        topology: &Topology,
        budget: u64,
        volume_id: VolumeId,
    ) -> Result<Option<Reservation>> {
        let found = topology.reserve_one_volume(budget, volume_id);
        if let Some(metrics) = &self.metrics {
            metrics.record_reservation(found.is_some());
        }

        let Some(node) = found else {
            warn!(
                budget,
                free_space = topology.free_space(topology.root())?,
                "No capacity for volume"
            );
            return Ok(None);
        };
        let data_node = topology.data_node(node)?;
        let reservation = Reservation {
            node,
            node_id: data_node.id().clone(),
            public_url: data_node.public_url.clone(),
            path: topology.path(node)?,
            volume_id,
        };
        info!(node = %reservation.path, volume_id = %volume_id, "Reserved volume slot");
        Ok(Some(reservation))
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Free volume slots across the cluster.
    pub fn free_space(&self) -> Result<i64> {
        let topology = self.inner.read();
        topology.free_space(topology.root())
    }

    /// Writable volumes cluster-wide, using the configured size limit and
    /// freshness window relative to `now`.
    #[instrument(skip(self))]
    pub fn writable_volumes(&self, now: DateTime<Utc>) -> Result<Vec<VolumeId>> {
        let threshold = self.config.freshness_threshold(now);
        let topology = self.inner.read();
        topology.collect_writable_volumes(
            topology.root(),
            threshold,
            self.config.volume_size_limit_bytes,
        )
    }

    pub fn status(&self) -> Result<NodeStatus> {
        self.inner.read().status()
    }

    /// Push current counters into the attached metrics, if any.
    pub fn refresh_metrics(&self) -> Result<()> {
        match &self.metrics {
            Some(metrics) => metrics.observe(&self.inner.read()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::VolumeInfo;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn heartbeat(dc: Option<&str>, node: &str, max: i64, volumes: Vec<VolumeInfo>) -> Heartbeat {
        Heartbeat {
            data_center: dc.map(str::to_string),
            rack: None,
            node_id: node.to_string(),
            public_url: Some(format!("{node}:8080")),
            max_volume_count: max,
            volumes,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_heartbeat_uses_default_placement() {
        let cluster = ClusterTopology::new(TopologyConfig::default()).unwrap();
        let (handle, outcome) = cluster
            .process_heartbeat(&heartbeat(None, "n1", 4, vec![VolumeInfo::new(1, 0)]))
            .unwrap();

        assert_eq!(outcome.added, vec![VolumeId(1)]);
        assert_eq!(
            cluster.read().path(handle).unwrap(),
            "topo:DefaultDataCenter:DefaultRack:n1"
        );
        assert_eq!(cluster.free_space().unwrap(), 3);
    }

    #[test]
    fn test_reserve_reports_node_details() {
        let cluster = ClusterTopology::new(TopologyConfig::default())
            .unwrap()
            .with_metrics(TopologyMetrics::new().unwrap());
        cluster
            .process_heartbeat(&heartbeat(Some("dc1"), "n1", 2, vec![]))
            .unwrap();

        let reservation = cluster.reserve(1, VolumeId(5)).unwrap().unwrap();
        assert_eq!(reservation.node_id, NodeId::from("n1"));
        assert_eq!(reservation.public_url.as_deref(), Some("n1:8080"));
        assert_eq!(reservation.path, "topo:dc1:DefaultRack:n1");
        assert_eq!(reservation.volume_id, VolumeId(5));

        assert!(cluster.reserve(2, VolumeId(5)).unwrap().is_none());
    }

    #[test]
    fn test_reserve_random_is_proportional() {
        let cluster = ClusterTopology::new(TopologyConfig::default()).unwrap();
        cluster.process_heartbeat(&heartbeat(Some("dc1"), "big", 9, vec![])).unwrap();
        cluster.process_heartbeat(&heartbeat(Some("dc2"), "small", 1, vec![])).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let mut big = 0;
        for _ in 0..1000 {
            let reservation = cluster.reserve_random(VolumeId(1), &mut rng).unwrap().unwrap();
            if reservation.node_id == NodeId::from("big") {
                big += 1;
            }
        }
        assert!(big > 800 && big < 980, "big node chosen {big} times");
    }

    #[test]
    fn test_reserve_random_on_full_cluster() {
        let cluster = ClusterTopology::new(TopologyConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(cluster.reserve_random(VolumeId(1), &mut rng).unwrap().is_none());
    }

    #[test]
    fn test_writable_volumes_respect_config() {
        let config = TopologyConfig {
            volume_size_limit_bytes: 100,
            ..Default::default()
        };
        let cluster = ClusterTopology::new(config).unwrap();
        cluster
            .process_heartbeat(&heartbeat(
                Some("dc1"),
                "n1",
                4,
                vec![VolumeInfo::new(1, 99), VolumeInfo::new(2, 100)],
            ))
            .unwrap();

        let now = Utc::now();
        assert_eq!(cluster.writable_volumes(now).unwrap(), vec![VolumeId(1)]);
        assert!(cluster
            .writable_volumes(now + Duration::minutes(5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_heartbeat_from_new_rack_moves_node() {
        let cluster = ClusterTopology::new(TopologyConfig::default()).unwrap();
        let mut report = heartbeat(Some("dc1"), "n1", 5, vec![VolumeInfo::new(1, 0)]);
        report.rack = Some("r1".to_string());
        let (first, _) = cluster.process_heartbeat(&report).unwrap();

        report.rack = Some("r2".to_string());
        let (second, outcome) = cluster.process_heartbeat(&report).unwrap();

        assert_eq!(first, second);
        assert!(outcome.added.is_empty());
        assert_eq!(cluster.free_space().unwrap(), 4);
        assert_eq!(cluster.read().path(second).unwrap(), "topo:dc1:r2:n1");
    }

    #[test]
    fn test_unregister_data_node() {
        let cluster = ClusterTopology::new(TopologyConfig::default()).unwrap();
        cluster.get_or_create_data_node("dc1", "r1", "n1", 3, None).unwrap();
        assert_eq!(cluster.free_space().unwrap(), 3);

        assert!(cluster.unregister_data_node("dc1", "r1", "n1").unwrap());
        assert!(!cluster.unregister_data_node("dc1", "r1", "n1").unwrap());
        assert_eq!(cluster.free_space().unwrap(), 0);
        assert_eq!(cluster.status().unwrap().children.len(), 1);
    }
}
