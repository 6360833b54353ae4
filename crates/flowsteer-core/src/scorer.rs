//! Flow criticality scoring
//!
//! Two interchangeable modes share one output contract: one finite score per
//! flow id, in enumeration order.
//!
//! - Path impact: `bandwidth × Σ (utilization + queue) / capacity` over the
//!   flow's path, read from a [`StatRegistry`].
//! - Latency ratio: `(observed − expected) / expected × max(1, bandwidth)`,
//!   sampled from a [`TelemetryPort`].

use crate::registry::StatRegistry;
use crate::telemetry::TelemetryPort;
use flowsteer_common::{finite_or_zero, FlowId, TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scoring strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Congestion along the flow's path, weighted by bandwidth
    PathImpact,
    /// Latency degradation against baseline, weighted by bandwidth
    #[default]
    LatencyRatio,
}

impl ScoringMode {
    /// Whether a non-positive score disqualifies a flow from rerouting
    #[inline]
    pub const fn drops_non_positive(self) -> bool {
        matches!(self, Self::LatencyRatio)
    }
}

/// Score of one flow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredFlow {
    /// Scored flow
    pub flow_id: FlowId,
    /// Finite criticality, higher is worse
    pub score: f64,
}

/// Scores of every enumerated flow plus the faults that were neutralized
#[derive(Debug, Clone, Default)]
pub struct ScoreBatch {
    /// One entry per successfully scored flow, in enumeration order
    pub scores: Vec<ScoredFlow>,
    /// Flows whose inputs could not be read
    pub faults: Vec<(FlowId, TelemetryError)>,
}

impl ScoreBatch {
    /// Number of scored flows
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether no flow was scored
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Inputs of the latency-ratio score for one flow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    /// Observed average latency over the trailing window
    pub observed: f64,
    /// Congestion-free baseline latency
    pub expected: f64,
    /// Requested bandwidth
    pub bandwidth: f64,
}

/// Criticality scorer
#[derive(Debug, Clone)]
pub struct CongestionScorer {
    mode: ScoringMode,
    /// Trailing window for latency sampling
    window: f64,
}

impl CongestionScorer {
    /// Create scorer for `mode`, sampling latency over `window`
    pub fn new(mode: ScoringMode, window: f64) -> Self {
        Self { mode, window }
    }

    /// Active mode
    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    /// Path-impact score of `flow_id`; 0.0 for unknown flows or links
    pub fn impact_score(registry: &StatRegistry, flow_id: &FlowId) -> f64 {
        let Some(flow) = registry.flow(flow_id) else {
            return 0.0;
        };

        let impact: f64 = flow
            .path
            .iter()
            .filter_map(|link_id| registry.link(link_id))
            .map(|link| link.pressure())
            .sum();

        finite_or_zero(impact * finite_or_zero(flow.bandwidth).max(0.0))
    }

    /// Latency-ratio score; 0.0 unless both latencies are positive
    pub fn ratio_score(sample: &LatencySample) -> f64 {
        let LatencySample { observed, expected, bandwidth } = *sample;
        let ratio = if observed > 0.0 && expected > 0.0 {
            (observed - expected) / expected
        } else {
            0.0
        };
        finite_or_zero(ratio * bandwidth.max(1.0))
    }

    /// Read the latency-ratio inputs of one flow
    ///
    /// `Ok(None)` when the source has no endpoints for the flow.
    pub fn sample_flow<P>(port: &P, flow_id: &FlowId, window: f64) -> TelemetryResult<Option<LatencySample>>
    where
        P: TelemetryPort + ?Sized,
    {
        let observed = port.flow_avg_latency(flow_id, window)?;
        let Some((src, dst)) = port.flow_endpoints(flow_id)? else {
            return Ok(None);
        };
        let expected = port.expected_latency(&src, &dst, flow_id)?;
        let bandwidth = port.requested_bandwidth(flow_id)?;
        Ok(Some(LatencySample { observed, expected, bandwidth }))
    }

    /// Score every registry flow in first-seen order
    pub fn score_registry(&self, registry: &StatRegistry) -> ScoreBatch {
        let scores = registry
            .flow_ids()
            .iter()
            .map(|id| ScoredFlow {
                flow_id: id.clone(),
                score: Self::impact_score(registry, id),
            })
            .collect();
        ScoreBatch { scores, faults: Vec::new() }
    }

    /// Score `flow_ids` from live telemetry
    ///
    /// Flows without endpoints or whose reads fail are left out of the scores,
    /// so they do not count toward the reroute budget; read faults are
    /// reported in the batch. Only loss of the source aborts.
    pub fn score_port<P>(&self, port: &P, flow_ids: &[FlowId]) -> TelemetryResult<ScoreBatch>
    where
        P: TelemetryPort + ?Sized,
    {
        let mut batch = ScoreBatch {
            scores: Vec::with_capacity(flow_ids.len()),
            faults: Vec::new(),
        };

        for flow_id in flow_ids {
            match Self::sample_flow(port, flow_id, self.window) {
                Ok(Some(sample)) => batch.scores.push(ScoredFlow {
                    flow_id: flow_id.clone(),
                    score: Self::ratio_score(&sample),
                }),
                Ok(None) => debug!(flow = %flow_id, "no endpoints, flow skipped"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(flow = %flow_id, error = %e, "sampling failed, flow skipped");
                    batch.faults.push((flow_id.clone(), e));
                }
            }
        }

        Ok(batch)
    }
}

impl Default for CongestionScorer {
    fn default() -> Self {
        Self::new(ScoringMode::default(), 5.0)
    }
}
