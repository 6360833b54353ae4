//! Network state snapshots and fixed-layout observation encoding
//!
//! The layout (link order, then initial flow order) is fixed when the encoder
//! is built. Every observation has `links + flows` entries regardless of how
//! many flows the source reports later.

use crate::registry::StatRegistry;
use crate::telemetry::{list_or_empty, TelemetryPort};
use flowsteer_common::{
    finite_or_zero, FlowId, LinkId, SimTime, TeError, TeResult, TelemetryResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Upper bound for normalized latency
pub const LATENCY_CEILING: f64 = 1e6;

/// Kind of value being normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Link utilization, bounded to [0, 1]
    Utilization,
    /// Flow latency, bounded to [0, 1e6]
    Latency,
}

impl MetricKind {
    /// Inclusive bounds
    pub const fn bounds(self) -> (f64, f64) {
        match self {
            Self::Utilization => (0.0, 1.0),
            Self::Latency => (0.0, LATENCY_CEILING),
        }
    }
}

/// Clamp to the bounds of `kind`; NaN and infinities become 0.0 first
#[inline]
pub fn normalize(value: f64, kind: MetricKind) -> f64 {
    let (lo, hi) = kind.bounds();
    finite_or_zero(value).clamp(lo, hi)
}

/// `normalize` with missing input treated as 0.0
#[inline]
pub fn normalize_opt(value: Option<f64>, kind: MetricKind) -> f64 {
    normalize(value.unwrap_or(0.0), kind)
}

/// Immutable capture of link utilizations and flow latencies at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStateSnapshot {
    time: SimTime,
    link_utilization: HashMap<LinkId, f64>,
    flow_latency: HashMap<FlowId, f64>,
    /// Items that faulted during capture and were recorded as 0.0
    neutralized: usize,
}

impl NetworkStateSnapshot {
    /// Build from raw readings; values are normalized on the way in
    pub fn new<L, F>(time: SimTime, links: L, flows: F) -> Self
    where
        L: IntoIterator<Item = (LinkId, f64)>,
        F: IntoIterator<Item = (FlowId, f64)>,
    {
        Self {
            time,
            link_utilization: links
                .into_iter()
                .map(|(id, u)| (id, normalize(u, MetricKind::Utilization)))
                .collect(),
            flow_latency: flows
                .into_iter()
                .map(|(id, l)| (id, normalize(l, MetricKind::Latency)))
                .collect(),
            neutralized: 0,
        }
    }

    /// Snapshot with no readings
    pub fn empty(time: SimTime) -> Self {
        Self::new(time, std::iter::empty(), std::iter::empty())
    }

    /// Capture from a registry, restricted to `layout`
    ///
    /// Ids the registry does not know are recorded as 0.0.
    pub fn from_registry(registry: &StatRegistry, layout: &ObservationLayout, time: SimTime) -> Self {
        Self::new(
            time,
            layout.links().iter().map(|id| {
                (id.clone(), registry.link(id).map_or(0.0, |l| l.utilization))
            }),
            layout.flows().iter().map(|id| {
                (id.clone(), registry.flow(id).map_or(0.0, |f| f.latency))
            }),
        )
    }

    /// Capture time
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Normalized utilization of `link`
    pub fn utilization(&self, link: &LinkId) -> Option<f64> {
        self.link_utilization.get(link).copied()
    }

    /// Normalized latency of `flow`
    pub fn latency(&self, flow: &FlowId) -> Option<f64> {
        self.flow_latency.get(flow).copied()
    }

    /// All utilization values, unordered
    pub fn utilizations(&self) -> impl Iterator<Item = f64> + '_ {
        self.link_utilization.values().copied()
    }

    /// All latency values, unordered
    pub fn latencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.flow_latency.values().copied()
    }

    /// Items recorded as 0.0 because their read failed
    pub fn neutralized(&self) -> usize {
        self.neutralized
    }

    /// Mean of positive latencies, `None` when there are none
    pub fn mean_latency(&self) -> Option<f64> {
        let (sum, n) = self
            .latencies()
            .filter(|l| l.is_finite() && *l > 0.0)
            .fold((0.0, 0usize), |(s, n), l| (s + l, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Highest non-negative utilization, `None` when there is none
    pub fn max_utilization(&self) -> Option<f64> {
        self.utilizations()
            .filter(|u| u.is_finite() && *u >= 0.0)
            .fold(None, |acc: Option<f64>, u| Some(acc.map_or(u, |m| m.max(u))))
    }
}

/// Fixed ordering of links and flows in every observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationLayout {
    links: Vec<LinkId>,
    flows: Vec<FlowId>,
}

impl ObservationLayout {
    /// Create layout
    pub fn new(links: Vec<LinkId>, flows: Vec<FlowId>) -> Self {
        Self { links, flows }
    }

    /// Layout from the source's current link and flow lists
    ///
    /// A missing list yields an empty segment; only loss of the source fails.
    pub fn from_port<P>(port: &P) -> TelemetryResult<Self>
    where
        P: TelemetryPort + ?Sized,
    {
        let links = list_or_empty(port.link_ids(), "link ids")?;
        let flows = list_or_empty(port.flow_ids(), "flow ids")?;
        Ok(Self { links, flows })
    }

    /// Link order
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Initial flow order
    pub fn flows(&self) -> &[FlowId] {
        &self.flows
    }

    /// Observation length
    pub fn dimension(&self) -> usize {
        self.links.len() + self.flows.len()
    }
}

/// Normalized observation: link utilizations followed by flow latencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    values: Vec<f64>,
    link_count: usize,
}

impl Observation {
    /// All-zero observation for `layout`
    pub fn zeros(layout: &ObservationLayout) -> Self {
        Self {
            values: vec![0.0; layout.dimension()],
            link_count: layout.links().len(),
        }
    }

    /// Flat values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Length
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the layout is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Utilization segment; empty if the link count exceeds the values
    pub fn utilizations(&self) -> &[f64] {
        self.values.get(..self.link_count).unwrap_or(&[])
    }

    /// Latency segment; empty if the link count exceeds the values
    pub fn latencies(&self) -> &[f64] {
        self.values.get(self.link_count..).unwrap_or(&[])
    }

    /// Check length, finiteness and per-segment bounds
    pub fn validate(&self, expected_len: usize) -> TeResult<()> {
        if self.values.len() != expected_len {
            return Err(TeError::InvalidObservation(format!(
                "expected {} values, got {}",
                expected_len,
                self.values.len()
            )));
        }
        if self.link_count > self.values.len() {
            return Err(TeError::InvalidObservation(format!(
                "link count {} exceeds {} values",
                self.link_count,
                self.values.len()
            )));
        }
        let segments = [
            (self.utilizations(), MetricKind::Utilization),
            (self.latencies(), MetricKind::Latency),
        ];
        for (values, kind) in segments {
            let (lo, hi) = kind.bounds();
            if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < lo || **v > hi) {
                return Err(TeError::InvalidObservation(format!(
                    "{:?} value {} outside [{}, {}]",
                    kind, bad, lo, hi
                )));
            }
        }
        Ok(())
    }
}

/// Captures snapshots from telemetry and encodes them in a fixed layout
#[derive(Debug, Clone)]
pub struct StateEncoder {
    layout: ObservationLayout,
    utilization_window: f64,
    latency_window: f64,
}

impl StateEncoder {
    /// Create encoder for a fixed layout
    pub fn new(layout: ObservationLayout, utilization_window: f64, latency_window: f64) -> Self {
        Self {
            layout,
            utilization_window,
            latency_window,
        }
    }

    /// Fixed layout
    pub fn layout(&self) -> &ObservationLayout {
        &self.layout
    }

    /// Observation length
    pub fn dimension(&self) -> usize {
        self.layout.dimension()
    }

    /// Read every layout link and flow at `time`
    ///
    /// Links are read by their layout position. Flows the source no longer
    /// lists, and per-item faults, are recorded as 0.0.
    pub fn capture<P>(&self, port: &P, time: SimTime) -> TelemetryResult<NetworkStateSnapshot>
    where
        P: TelemetryPort + ?Sized,
    {
        let mut neutralized = 0usize;
        let mut neutral = |what: &dyn std::fmt::Display, e: &dyn std::fmt::Display| {
            debug!(item = %what, error = %e, "read failed, recording 0.0");
            neutralized += 1;
            0.0
        };

        let mut links = Vec::with_capacity(self.layout.links.len());
        for (index, id) in self.layout.links.iter().enumerate() {
            let value = match port.link_avg_utilization(index, self.utilization_window) {
                Ok(u) => u,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => neutral(id, &e),
            };
            links.push((id.clone(), value));
        }

        let live: HashSet<FlowId> = list_or_empty(port.flow_ids(), "flow ids")?.into_iter().collect();
        let mut flows = Vec::with_capacity(self.layout.flows.len());
        for id in &self.layout.flows {
            let value = if live.contains(id) {
                match port.flow_avg_latency(id, self.latency_window) {
                    Ok(l) => l,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => neutral(id, &e),
                }
            } else {
                0.0
            };
            flows.push((id.clone(), value));
        }

        let mut snapshot = NetworkStateSnapshot::new(time, links, flows);
        snapshot.neutralized = neutralized;
        Ok(snapshot)
    }

    /// Encode in layout order; ids missing from the snapshot encode as 0.0
    pub fn encode(&self, snapshot: &NetworkStateSnapshot) -> Observation {
        let mut values = Vec::with_capacity(self.dimension());
        values.extend(
            self.layout
                .links
                .iter()
                .map(|id| normalize_opt(snapshot.utilization(id), MetricKind::Utilization)),
        );
        values.extend(
            self.layout
                .flows
                .iter()
                .map(|id| normalize_opt(snapshot.latency(id), MetricKind::Latency)),
        );
        Observation {
            values,
            link_count: self.layout.links.len(),
        }
    }
}
