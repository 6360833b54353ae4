//! Telemetry port - the only gateway to ground truth
//!
//! Every call may be slow or remote. Implementations report per-item problems
//! as `TelemetryError::Unavailable` and loss of the source as
//! `TelemetryError::Unreachable`; callers in this crate neutralize the former
//! and only let the latter end a step.

mod memory;

pub use memory::{FaultPlan, FlowScenario, LinkScenario, MemoryTelemetry, Scenario};

use flowsteer_common::{FlowId, LinkId, NodeId, SimTime, TelemetryResult};

/// Capability interface implemented by a simulator or controller bridge
pub trait TelemetryPort: Send + Sync {
    /// Flow ids currently known to the source, in the source's order
    fn flow_ids(&self) -> TelemetryResult<Vec<FlowId>>;

    /// Average latency of `flow` over the trailing `window`
    fn flow_avg_latency(&self, flow: &FlowId, window: f64) -> TelemetryResult<f64>;

    /// Source and destination of `flow`, `None` when unknown
    fn flow_endpoints(&self, flow: &FlowId) -> TelemetryResult<Option<(NodeId, NodeId)>>;

    /// Congestion-free baseline latency between two endpoints for `flow`
    fn expected_latency(&self, src: &NodeId, dst: &NodeId, flow: &FlowId) -> TelemetryResult<f64>;

    /// Bandwidth requested by `flow`
    fn requested_bandwidth(&self, flow: &FlowId) -> TelemetryResult<f64>;

    /// Links currently carrying `flow`, in path order
    fn flow_path(&self, flow: &FlowId) -> TelemetryResult<Vec<LinkId>>;

    /// Link ids; this order defines the observation layout
    fn link_ids(&self) -> TelemetryResult<Vec<LinkId>>;

    /// Average utilization of the link at `link_index` in `link_ids()`
    fn link_avg_utilization(&self, link_index: usize, window: f64) -> TelemetryResult<f64>;

    /// Simulation clock, non-decreasing across steps
    fn current_time(&self) -> TelemetryResult<SimTime>;

    /// `false` once the episode is over
    fn is_running(&self) -> TelemetryResult<bool>;

    /// Ask the source to move `flow` to another path
    fn reroute_flow(&self, flow: &FlowId) -> TelemetryResult<bool>;
}

impl<P: TelemetryPort + ?Sized> TelemetryPort for std::sync::Arc<P> {
    fn flow_ids(&self) -> TelemetryResult<Vec<FlowId>> {
        (**self).flow_ids()
    }

    fn flow_avg_latency(&self, flow: &FlowId, window: f64) -> TelemetryResult<f64> {
        (**self).flow_avg_latency(flow, window)
    }

    fn flow_endpoints(&self, flow: &FlowId) -> TelemetryResult<Option<(NodeId, NodeId)>> {
        (**self).flow_endpoints(flow)
    }

    fn expected_latency(&self, src: &NodeId, dst: &NodeId, flow: &FlowId) -> TelemetryResult<f64> {
        (**self).expected_latency(src, dst, flow)
    }

    fn requested_bandwidth(&self, flow: &FlowId) -> TelemetryResult<f64> {
        (**self).requested_bandwidth(flow)
    }

    fn flow_path(&self, flow: &FlowId) -> TelemetryResult<Vec<LinkId>> {
        (**self).flow_path(flow)
    }

    fn link_ids(&self) -> TelemetryResult<Vec<LinkId>> {
        (**self).link_ids()
    }

    fn link_avg_utilization(&self, link_index: usize, window: f64) -> TelemetryResult<f64> {
        (**self).link_avg_utilization(link_index, window)
    }

    fn current_time(&self) -> TelemetryResult<SimTime> {
        (**self).current_time()
    }

    fn is_running(&self) -> TelemetryResult<bool> {
        (**self).is_running()
    }

    fn reroute_flow(&self, flow: &FlowId) -> TelemetryResult<bool> {
        (**self).reroute_flow(flow)
    }
}

/// Top-level collection read: structural faults become an empty list,
/// loss of the source is returned to the caller
pub(crate) fn list_or_empty<T>(
    result: TelemetryResult<Vec<T>>,
    what: &str,
) -> TelemetryResult<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(what, error = %e, "collection unavailable, treating as empty");
            Ok(Vec::new())
        }
    }
}
