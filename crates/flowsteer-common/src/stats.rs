//! Flow and link telemetry records
//!
//! Records are replaced wholesale on every update; there is no partial merge.

use crate::{FlowId, LinkId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Most recent statistics for a single flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    /// Flow identity
    pub flow_id: FlowId,
    /// Source endpoint
    pub src: NodeId,
    /// Destination endpoint
    pub dst: NodeId,
    /// Requested bandwidth (non-negative)
    pub bandwidth: f64,
    /// Links currently carrying the flow, in path order
    pub path: Vec<LinkId>,
    /// Last observed latency
    pub latency: f64,
    /// Queue length readings along the path
    #[serde(default)]
    pub queue_lengths: HashMap<LinkId, f64>,
}

impl FlowStats {
    /// Create a flow record with an empty queue map
    pub fn new(
        flow_id: impl Into<FlowId>,
        src: impl Into<NodeId>,
        dst: impl Into<NodeId>,
        bandwidth: f64,
        path: Vec<LinkId>,
        latency: f64,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            src: src.into(),
            dst: dst.into(),
            bandwidth,
            path,
            latency,
            queue_lengths: HashMap::new(),
        }
    }
}

/// Most recent statistics for a single link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Link identity
    pub link_id: LinkId,
    /// Current utilization, nominally in [0, 1]
    pub utilization: f64,
    /// Capacity (> 0)
    pub capacity: f64,
    /// Flows currently routed over this link
    #[serde(default)]
    pub flows: Vec<FlowId>,
    /// Current queue length
    pub queue_length: f64,
}

impl LinkStats {
    /// Create a link record with no routed flows
    pub fn new(link_id: impl Into<LinkId>, utilization: f64, capacity: f64, queue_length: f64) -> Self {
        Self {
            link_id: link_id.into(),
            utilization,
            capacity,
            flows: Vec::new(),
            queue_length,
        }
    }

    /// Utilization plus queue pressure, both relative to capacity
    ///
    /// Zero for non-positive or non-finite capacity.
    #[inline]
    pub fn pressure(&self) -> f64 {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return 0.0;
        }
        crate::finite_or_zero((self.utilization + self.queue_length) / self.capacity)
    }
}
