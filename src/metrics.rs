//! Topology Metrics
//!
//! Prometheus gauges mirroring the cached counters of every node, plus a
//! reservation outcome counter.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::topology::{CapacityNode, Topology};

/// Prometheus collectors for one topology
#[derive(Clone)]
pub struct TopologyMetrics {
    registry: Registry,
    max_volume_count: IntGaugeVec,
    active_volume_count: IntGaugeVec,
    free_space: IntGaugeVec,
    reservations: IntCounterVec,
}

impl TopologyMetrics {
    /// Create the collectors and register them in a private registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let max_volume_count = IntGaugeVec::new(
            Opts::new("topology_max_volume_count", "Volume slots under a node"),
            &["node", "kind"],
        )?;
        let active_volume_count = IntGaugeVec::new(
            Opts::new("topology_active_volume_count", "Occupied volume slots under a node"),
            &["node", "kind"],
        )?;
        let free_space = IntGaugeVec::new(
            Opts::new("topology_free_space", "Free volume slots under a node"),
            &["node", "kind"],
        )?;
        let reservations = IntCounterVec::new(
            Opts::new("topology_reservations_total", "Volume slot reservations by outcome"),
            &["result"],
        )?;

        registry.register(Box::new(max_volume_count.clone()))?;
        registry.register(Box::new(active_volume_count.clone()))?;
        registry.register(Box::new(free_space.clone()))?;
        registry.register(Box::new(reservations.clone()))?;

        Ok(Self {
            registry,
            max_volume_count,
            active_volume_count,
            free_space,
            reservations,
        })
    }

    /// Replace all gauge values with the current state of `topology`.
    pub fn observe(&self, topology: &Topology) -> Result<()> {
        self.max_volume_count.reset();
        self.active_volume_count.reset();
        self.free_space.reset();

        for handle in topology.descendants(topology.root()) {
            let node = topology.get(handle)?;
            let path = topology.path(handle)?;
            let kind = node.kind().to_string();
            let labels = [path.as_str(), kind.as_str()];

            self.max_volume_count
                .with_label_values(&labels)
                .set(node.max_volume_count());
            self.active_volume_count
                .with_label_values(&labels)
                .set(node.active_volume_count());
            self.free_space.with_label_values(&labels).set(node.free_space());
        }
        Ok(())
    }

    pub fn record_reservation(&self, found: bool) {
        let result = if found { "assigned" } else { "no_capacity" };
        self.reservations.with_label_values(&[result]).inc();
    }

    #[cfg(test)]
    fn reservation_count(&self, found: bool) -> u64 {
        let result = if found { "assigned" } else { "no_capacity" };
        self.reservations.with_label_values(&[result]).get()
    }

    /// Render all collectors in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics output is not UTF-8: {}", e)))
    }
}
