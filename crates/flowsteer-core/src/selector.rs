//! Critical flow selection under a reroute budget

use crate::scorer::ScoredFlow;
use flowsteer_common::{finite_or_zero, FlowId, SimTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Selection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Maximum fraction of known flows rerouted in one decision
    pub max_reroute_ratio: f64,
    /// Minimum time between decisions; `None` disables gating
    pub update_interval: Option<SimTime>,
    /// Time a rerouted flow stays ineligible; `None` disables the cooldown
    pub reroute_cooldown: Option<SimTime>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_reroute_ratio: 0.15,
            update_interval: Some(1.0),
            reroute_cooldown: None,
        }
    }
}

/// Reroute budget for `total` flows: `max(1, ⌊total × ratio⌋)`, never above `total`
pub fn reroute_budget(total: usize, max_reroute_ratio: f64) -> usize {
    if total == 0 {
        return 0;
    }
    let raw = (total as f64 * max_reroute_ratio).floor();
    let raw = if raw.is_finite() && raw > 0.0 { raw as usize } else { 0 };
    raw.clamp(1, total)
}

/// Flows sorted by descending score; ties keep their input order
pub fn rank(scores: &[ScoredFlow]) -> Vec<&ScoredFlow> {
    let mut ranked: Vec<&ScoredFlow> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        finite_or_zero(b.score)
            .partial_cmp(&finite_or_zero(a.score))
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

/// Budgeted top-k without time gating
///
/// The budget is computed over every scored flow; `exclude` and (when
/// `drop_non_positive` is set) non-positive scores only remove candidates.
pub fn select_top<F>(
    scores: &[ScoredFlow],
    k: usize,
    max_reroute_ratio: f64,
    drop_non_positive: bool,
    exclude: F,
) -> Vec<FlowId>
where
    F: Fn(&FlowId) -> bool,
{
    let effective_k = k.min(reroute_budget(scores.len(), max_reroute_ratio));
    if effective_k == 0 {
        return Vec::new();
    }

    rank(scores)
        .into_iter()
        .filter(|s| !(drop_non_positive && finite_or_zero(s.score) <= 0.0))
        .filter(|s| !exclude(&s.flow_id))
        .take(effective_k)
        .map(|s| s.flow_id.clone())
        .collect()
}

/// Time-gated critical flow selector
#[derive(Debug, Clone)]
pub struct CriticalFlowSelector {
    config: SelectorConfig,
    /// Time of the previous decision
    last_decision: Option<SimTime>,
    /// Rerouted flows and the time they become eligible again
    cooldowns: HashMap<FlowId, SimTime>,
}

impl CriticalFlowSelector {
    /// Create selector
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            last_decision: None,
            cooldowns: HashMap::new(),
        }
    }

    /// Selection policy
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Time of the previous decision
    pub fn last_decision(&self) -> Option<SimTime> {
        self.last_decision
    }

    /// Whether a decision at `now` would be suppressed by the update interval
    pub fn is_gated(&self, now: SimTime) -> bool {
        match (self.config.update_interval, self.last_decision) {
            (Some(interval), Some(last)) => !(now - last >= interval),
            _ => false,
        }
    }

    /// Pick at most `k` flows to reroute at time `now`
    ///
    /// Returns an empty list without looking at `scores` when gated.
    pub fn select(
        &mut self,
        scores: &[ScoredFlow],
        k: usize,
        now: SimTime,
        drop_non_positive: bool,
    ) -> Vec<FlowId> {
        if self.is_gated(now) {
            debug!(now, last = ?self.last_decision, "decision gated by update interval");
            return Vec::new();
        }

        self.cooldowns.retain(|_, until| *until > now);
        let selected = select_top(
            scores,
            k,
            self.config.max_reroute_ratio,
            drop_non_positive,
            |id| self.cooldowns.contains_key(id),
        );

        debug!(
            now,
            candidates = scores.len(),
            budget = reroute_budget(scores.len(), self.config.max_reroute_ratio),
            selected = selected.len(),
            "critical flows selected"
        );
        self.last_decision = Some(now);
        selected
    }

    /// Start the cooldown of a flow rerouted at `now`
    pub fn mark_rerouted(&mut self, flow_id: &FlowId, now: SimTime) {
        if let Some(cooldown) = self.config.reroute_cooldown {
            self.cooldowns.insert(flow_id.clone(), now + cooldown);
        }
    }

    /// Forget decision history
    pub fn reset(&mut self) {
        self.last_decision = None;
        self.cooldowns.clear();
    }
}

impl Default for CriticalFlowSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[(&str, f64)]) -> Vec<ScoredFlow> {
        values
            .iter()
            .map(|(id, score)| ScoredFlow { flow_id: FlowId::from(*id), score: *score })
            .collect()
    }

    fn ids(selected: &[FlowId]) -> Vec<&str> {
        selected.iter().map(FlowId::as_str).collect()
    }

    #[test]
    fn test_budget() {
        assert_eq!(reroute_budget(20, 0.15), 3);
        assert_eq!(reroute_budget(3, 0.15), 1);
        assert_eq!(reroute_budget(0, 0.15), 0);
        assert_eq!(reroute_budget(4, 5.0), 4);
        assert_eq!(reroute_budget(4, f64::NAN), 1);
    }

    #[test]
    fn test_budget_caps_k() {
        let values: Vec<(String, f64)> = (0..20).map(|i| (format!("F{}", i), i as f64)).collect();
        let batch: Vec<ScoredFlow> = values
            .iter()
            .map(|(id, s)| ScoredFlow { flow_id: FlowId::from(id.as_str()), score: *s })
            .collect();

        let selected = select_top(&batch, 10, 0.15, false, |_| false);
        assert_eq!(ids(&selected), ["F19", "F18", "F17"]);
    }

    #[test]
    fn test_k_caps_budget() {
        let batch = scores(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let selected = select_top(&batch, 1, 1.0, false, |_| false);
        assert_eq!(ids(&selected), ["d"]);
        assert!(select_top(&batch, 0, 1.0, false, |_| false).is_empty());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let batch = scores(&[("x", 1.0), ("y", 5.0), ("z", 1.0), ("w", 1.0)]);
        let ranked: Vec<&str> = rank(&batch).iter().map(|s| s.flow_id.as_str()).collect();
        assert_eq!(ranked, ["y", "x", "z", "w"]);
    }

    #[test]
    fn test_drop_non_positive_before_truncation() {
        let batch = scores(&[("a", 0.0), ("b", -2.0), ("c", 0.5), ("d", 0.0)]);
        let selected = select_top(&batch, 10, 1.0, true, |_| false);
        assert_eq!(ids(&selected), ["c"]);

        let all_neutral = scores(&[("a", 0.0), ("b", -1.0)]);
        assert!(select_top(&all_neutral, 10, 1.0, true, |_| false).is_empty());

        // impact mode keeps zero scores
        let kept = select_top(&all_neutral, 10, 1.0, false, |_| false);
        assert_eq!(ids(&kept), ["a", "b"]);
    }

    #[test]
    fn test_time_gating() {
        let mut selector = CriticalFlowSelector::default();
        let batch = scores(&[("a", 3.0), ("b", 2.0)]);

        assert_eq!(selector.select(&batch, 10, 0.0, true).len(), 1);
        assert!(selector.select(&batch, 10, 0.0, true).is_empty());
        assert!(selector.select(&batch, 10, 0.5, true).is_empty());
        assert_eq!(selector.last_decision(), Some(0.0));
        assert_eq!(selector.select(&batch, 10, 1.0, true).len(), 1);
        assert_eq!(selector.last_decision(), Some(1.0));
    }

    #[test]
    fn test_gating_disabled() {
        let mut selector = CriticalFlowSelector::new(SelectorConfig {
            update_interval: None,
            ..SelectorConfig::default()
        });
        let batch = scores(&[("a", 3.0)]);
        assert_eq!(selector.select(&batch, 10, 0.0, true).len(), 1);
        assert_eq!(selector.select(&batch, 10, 0.0, true).len(), 1);
    }

    #[test]
    fn test_reroute_cooldown() {
        let mut selector = CriticalFlowSelector::new(SelectorConfig {
            max_reroute_ratio: 0.5,
            update_interval: None,
            reroute_cooldown: Some(2.0),
        });
        let batch = scores(&[("a", 3.0), ("b", 2.0), ("c", 1.0), ("d", 0.5)]);

        let first = selector.select(&batch, 10, 0.0, true);
        assert_eq!(ids(&first), ["a", "b"]);
        for id in &first {
            selector.mark_rerouted(id, 0.0);
        }

        assert_eq!(ids(&selector.select(&batch, 10, 1.0, true)), ["c", "d"]);
        assert_eq!(ids(&selector.select(&batch, 10, 2.0, true)), ["a", "b"]);
    }

    #[test]
    fn test_reset_clears_gate() {
        let mut selector = CriticalFlowSelector::default();
        let batch = scores(&[("a", 3.0)]);
        selector.select(&batch, 10, 5.0, true);
        assert!(selector.is_gated(5.5));
        selector.reset();
        assert!(!selector.is_gated(5.5));
    }
}
