//! Decision loop counters

use flowsteer_common::metrics::{HistogramSnapshot, LatencyHistogram};
use flowsteer_common::AtomicCounter;
use serde::Serialize;
use std::time::Duration;

/// Lock-free counters updated by the decision loop
#[derive(Debug, Default)]
pub struct LoopMetrics {
    steps: AtomicCounter,
    gated_steps: AtomicCounter,
    reroutes_requested: AtomicCounter,
    reroutes_succeeded: AtomicCounter,
    neutralized_faults: AtomicCounter,
    step_duration: LatencyHistogram,
}

/// Point-in-time copy of [`LoopMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopMetricsSnapshot {
    /// Steps that read the network
    pub steps: u64,
    /// Steps where the update interval suppressed selection
    pub gated_steps: u64,
    /// Reroute requests issued
    pub reroutes_requested: u64,
    /// Reroute requests the source accepted
    pub reroutes_succeeded: u64,
    /// Reroute requests refused or failed
    pub reroutes_failed: u64,
    /// Per-item telemetry faults recorded as neutral
    pub neutralized_faults: u64,
    /// Wall-clock step duration
    pub step_duration: HistogramSnapshot,
}

impl LoopMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_step(&self, elapsed: Duration, gated: bool) {
        self.steps.inc();
        if gated {
            self.gated_steps.inc();
        }
        self.step_duration.record(elapsed.as_micros() as u64);
    }

    pub(crate) fn record_reroute(&self, succeeded: bool) {
        self.reroutes_requested.inc();
        if succeeded {
            self.reroutes_succeeded.inc();
        }
    }

    pub(crate) fn record_neutralized(&self, count: usize) {
        self.neutralized_faults.add(count as u64);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        let requested = self.reroutes_requested.get();
        let succeeded = self.reroutes_succeeded.get();
        LoopMetricsSnapshot {
            steps: self.steps.get(),
            gated_steps: self.gated_steps.get(),
            reroutes_requested: requested,
            reroutes_succeeded: succeeded,
            reroutes_failed: requested.saturating_sub(succeeded),
            neutralized_faults: self.neutralized_faults.get(),
            step_duration: self.step_duration.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let m = LoopMetrics::new();
        m.record_step(Duration::from_micros(300), false);
        m.record_step(Duration::from_micros(50), true);
        m.record_reroute(true);
        m.record_reroute(false);
        m.record_neutralized(3);

        let snap = m.snapshot();
        assert_eq!(snap.steps, 2);
        assert_eq!(snap.gated_steps, 1);
        assert_eq!(snap.reroutes_requested, 2);
        assert_eq!(snap.reroutes_failed, 1);
        assert_eq!(snap.neutralized_faults, 3);
        assert_eq!(snap.step_duration.count, 2);
    }
}
