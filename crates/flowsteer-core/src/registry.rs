//! Flow and link statistics registry
//!
//! `StatRegistry` is a plain single-owner store. `SharedRegistry` wraps it for
//! push-based ingestion running alongside the decision loop: writers publish
//! whole new versions, readers hold an `Arc` that never changes underneath them.

use crate::telemetry::{list_or_empty, TelemetryPort};
use arc_swap::ArcSwap;
use flowsteer_common::{finite_or_zero, FlowId, FlowStats, LinkId, LinkStats, TelemetryResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Most recent known statistics for every flow and link
#[derive(Debug, Clone, Default)]
pub struct StatRegistry {
    flows: HashMap<FlowId, FlowStats>,
    links: HashMap<LinkId, LinkStats>,
    /// Flow ids in first-seen order, used as the deterministic enumeration order
    flow_order: Vec<FlowId>,
    link_order: Vec<LinkId>,
}

/// Read-only composite of all records plus derived summaries
#[derive(Debug, Clone, Serialize)]
pub struct AggregateState<'a> {
    /// Flow records in first-seen order
    pub flows: Vec<&'a FlowStats>,
    /// Link records in first-seen order
    pub links: Vec<&'a LinkStats>,
    /// Highest link utilization (0.0 with no links)
    pub max_utilization: f64,
    /// Mean flow latency (0.0 with no flows)
    pub mean_latency: f64,
}

impl StatRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored record for `id`
    pub fn update_flow(&mut self, id: FlowId, stats: FlowStats) {
        if !self.flows.contains_key(&id) {
            self.flow_order.push(id.clone());
        }
        self.flows.insert(id, stats);
    }

    /// Replace the stored record for `id`
    pub fn update_link(&mut self, id: LinkId, stats: LinkStats) {
        if !self.links.contains_key(&id) {
            self.link_order.push(id.clone());
        }
        self.links.insert(id, stats);
    }

    /// Get flow record
    pub fn flow(&self, id: &FlowId) -> Option<&FlowStats> {
        self.flows.get(id)
    }

    /// Get link record
    pub fn link(&self, id: &LinkId) -> Option<&LinkStats> {
        self.links.get(id)
    }

    /// Flow ids in first-seen order
    pub fn flow_ids(&self) -> &[FlowId] {
        &self.flow_order
    }

    /// Link ids in first-seen order
    pub fn link_ids(&self) -> &[LinkId] {
        &self.link_order
    }

    /// Number of known flows
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Number of known links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Highest link utilization, 0.0 when there are no links
    pub fn max_utilization(&self) -> f64 {
        self.links
            .values()
            .map(|l| finite_or_zero(l.utilization))
            .fold(0.0, f64::max)
    }

    /// Mean flow latency, 0.0 when there are no flows
    pub fn mean_latency(&self) -> f64 {
        if self.flows.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.flows.values().map(|f| finite_or_zero(f.latency)).sum();
        finite_or_zero(sum / self.flows.len() as f64)
    }

    /// Composite view of every record plus summaries
    pub fn get_flow_state(&self) -> AggregateState<'_> {
        AggregateState {
            flows: self.flow_order.iter().filter_map(|id| self.flows.get(id)).collect(),
            links: self.link_order.iter().filter_map(|id| self.links.get(id)).collect(),
            max_utilization: self.max_utilization(),
            mean_latency: self.mean_latency(),
        }
    }

    /// Build a registry by reading the port on demand
    ///
    /// Links come from `links` (read by position) with unit capacity and no
    /// queue, since the port reports normalized utilization only. A flow or
    /// link whose read fails is left out; only loss of the source fails.
    pub fn fetch<P>(port: &P, links: &[LinkId], utilization_window: f64, latency_window: f64) -> TelemetryResult<Self>
    where
        P: TelemetryPort + ?Sized,
    {
        let mut registry = Self::new();

        for (index, id) in links.iter().enumerate() {
            match port.link_avg_utilization(index, utilization_window) {
                Ok(u) => registry.update_link(id.clone(), LinkStats::new(id.clone(), u, 1.0, 0.0)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(link = %id, error = %e, "link left out of registry"),
            }
        }

        for id in list_or_empty(port.flow_ids(), "flow ids")? {
            match Self::fetch_flow(port, &id, latency_window) {
                Ok(Some(stats)) => registry.update_flow(id, stats),
                Ok(None) => debug!(flow = %id, "no endpoints, flow left out of registry"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(flow = %id, error = %e, "flow left out of registry"),
            }
        }

        Ok(registry)
    }

    fn fetch_flow<P>(port: &P, id: &FlowId, latency_window: f64) -> TelemetryResult<Option<FlowStats>>
    where
        P: TelemetryPort + ?Sized,
    {
        let Some((src, dst)) = port.flow_endpoints(id)? else {
            return Ok(None);
        };
        Ok(Some(FlowStats::new(
            id.clone(),
            src,
            dst,
            port.requested_bandwidth(id)?,
            port.flow_path(id)?,
            port.flow_avg_latency(id, latency_window)?,
        )))
    }
}

/// Registry shared between an ingestion path and the decision loop
#[derive(Debug, Default)]
pub struct SharedRegistry {
    current: ArcSwap<StatRegistry>,
    /// Serializes writers so concurrent updates are not lost
    write_lock: Mutex<()>,
}

impl SharedRegistry {
    /// Create empty shared registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new version with the flow record replaced
    pub fn update_flow(&self, id: FlowId, stats: FlowStats) {
        self.publish(|reg| reg.update_flow(id, stats));
    }

    /// Publish a new version with the link record replaced
    pub fn update_link(&self, id: LinkId, stats: LinkStats) {
        self.publish(|reg| reg.update_link(id, stats));
    }

    /// Apply a batch of changes as one published version
    pub fn publish<F>(&self, apply: F)
    where
        F: FnOnce(&mut StatRegistry),
    {
        let _guard = self.write_lock.lock();
        let mut next = StatRegistry::clone(&self.current.load());
        apply(&mut next);
        self.current.store(Arc::new(next));
    }

    /// Consistent point-in-time view
    pub fn snapshot(&self) -> Arc<StatRegistry> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(id: &str, latency: f64) -> FlowStats {
        FlowStats::new(id, "h1", "h2", 1.0, vec![LinkId::from("L1")], latency)
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let mut reg = StatRegistry::new();
        let mut first = flow("F1", 10.0);
        first.queue_lengths.insert(LinkId::from("L1"), 3.0);
        reg.update_flow(FlowId::from("F1"), first);
        reg.update_flow(FlowId::from("F1"), flow("F1", 20.0));

        let stored = reg.flow(&FlowId::from("F1")).unwrap();
        assert_eq!(stored.latency, 20.0);
        assert!(stored.queue_lengths.is_empty());
        assert_eq!(reg.flow_count(), 1);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let mut reg = StatRegistry::new();
        for id in ["F3", "F1", "F2"] {
            reg.update_flow(FlowId::from(id), flow(id, 1.0));
        }
        reg.update_flow(FlowId::from("F1"), flow("F1", 5.0));

        let ids: Vec<_> = reg.flow_ids().iter().map(FlowId::as_str).collect();
        assert_eq!(ids, ["F3", "F1", "F2"]);
    }

    #[test]
    fn test_summaries() {
        let mut reg = StatRegistry::new();
        let state = reg.get_flow_state();
        assert_eq!(state.max_utilization, 0.0);
        assert_eq!(state.mean_latency, 0.0);

        reg.update_link(LinkId::from("L1"), LinkStats::new("L1", 0.4, 1.0, 0.0));
        reg.update_link(LinkId::from("L2"), LinkStats::new("L2", 0.9, 1.0, 0.0));
        reg.update_flow(FlowId::from("F1"), flow("F1", 10.0));
        reg.update_flow(FlowId::from("F2"), flow("F2", 30.0));

        let state = reg.get_flow_state();
        assert_eq!(state.max_utilization, 0.9);
        assert_eq!(state.mean_latency, 20.0);
        assert_eq!(state.flows.len(), 2);
        assert_eq!(state.links.len(), 2);
    }

    #[test]
    fn test_non_finite_readings_are_neutral() {
        let mut reg = StatRegistry::new();
        reg.update_flow(FlowId::from("F1"), flow("F1", f64::NAN));
        reg.update_link(LinkId::from("L1"), LinkStats::new("L1", f64::INFINITY, 1.0, 0.0));
        assert_eq!(reg.mean_latency(), 0.0);
        assert_eq!(reg.max_utilization(), 0.0);
    }

    #[test]
    fn test_fetch_from_port() {
        use crate::telemetry::{FaultPlan, FlowScenario, LinkScenario, MemoryTelemetry, Scenario};

        let flow = |id: &str| FlowScenario {
            id: id.into(),
            src: "h1".into(),
            dst: "h2".into(),
            bandwidth: 2.0,
            path: vec!["L1".into()],
            latency: 8.0,
            expected_latency: 4.0,
        };
        let port = MemoryTelemetry::new(Scenario {
            links: vec![
                LinkScenario { id: "L1".into(), utilization: 0.6, capacity: 10.0 },
                LinkScenario { id: "L2".into(), utilization: 0.1, capacity: 10.0 },
            ],
            flows: vec![flow("F1"), flow("F2")],
            ..Scenario::default()
        });
        let mut faults = FaultPlan::default();
        faults.flow_faults.insert("F2".into());
        faults.link_faults.insert("L2".into());
        port.set_faults(faults);

        let links = port.link_ids().unwrap();
        let reg = StatRegistry::fetch(&port, &links, 5.0, 5.0).unwrap();

        assert_eq!(reg.flow_ids(), &[FlowId::from("F1")]);
        assert_eq!(reg.link_ids(), &[LinkId::from("L1")]);
        let f1 = reg.flow(&FlowId::from("F1")).unwrap();
        assert_eq!(f1.path, vec![LinkId::from("L1")]);
        assert_eq!(f1.bandwidth, 2.0);
        assert_eq!(reg.link(&LinkId::from("L1")).unwrap().capacity, 1.0);
    }

    #[test]
    fn test_shared_snapshot_is_stable() {
        let shared = SharedRegistry::new();
        shared.update_flow(FlowId::from("F1"), flow("F1", 10.0));

        let before = shared.snapshot();
        shared.update_flow(FlowId::from("F2"), flow("F2", 10.0));

        assert_eq!(before.flow_count(), 1);
        assert_eq!(shared.snapshot().flow_count(), 2);
    }

    #[test]
    fn test_shared_concurrent_writers() {
        let shared = Arc::new(SharedRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let id = format!("F{}-{}", t, i);
                        shared.update_flow(FlowId::from(id.as_str()), flow(&id, 1.0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.snapshot().flow_count(), 100);
    }
}
