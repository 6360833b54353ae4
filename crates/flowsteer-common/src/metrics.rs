//! Lock-free timing metrics for decision steps

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bucket bounds in microseconds; the last bucket is open-ended
const BUCKET_LIMITS_US: [u64; 8] = [100, 1_000, 5_000, 10_000, 50_000, 100_000, 1_000_000, u64::MAX];

/// Lock-free histogram for step duration tracking
#[derive(Debug)]
pub struct LatencyHistogram {
    /// Buckets: <=100μs, <=1ms, <=5ms, <=10ms, <=50ms, <=100ms, <=1s, >1s
    buckets: [AtomicU64; BUCKET_LIMITS_US.len()],
    count: AtomicU64,
    sum_us: AtomicU64,
    min_us: AtomicU64,
    max_us: AtomicU64,
}

impl LatencyHistogram {
    /// Create empty histogram
    #[allow(clippy::declare_interior_mutable_const)]
    pub const fn new() -> Self {
        const EMPTY: AtomicU64 = AtomicU64::new(0);
        Self {
            buckets: [EMPTY; BUCKET_LIMITS_US.len()],
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            min_us: AtomicU64::new(u64::MAX),
            max_us: AtomicU64::new(0),
        }
    }

    /// Record a duration in microseconds
    #[inline]
    pub fn record(&self, duration_us: u64) {
        let bucket = BUCKET_LIMITS_US
            .iter()
            .position(|&limit| duration_us <= limit)
            .unwrap_or(BUCKET_LIMITS_US.len() - 1);

        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(duration_us, Ordering::Relaxed);
        self.min_us.fetch_min(duration_us, Ordering::Relaxed);
        self.max_us.fetch_max(duration_us, Ordering::Relaxed);
    }

    /// Number of recorded samples
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get average duration in microseconds
    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum_us.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Upper bound of the bucket holding percentile `p` (approximate)
    pub fn percentile(&self, p: f64) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let target = ((count as f64) * p).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return BUCKET_LIMITS_US[i];
            }
        }

        BUCKET_LIMITS_US[BUCKET_LIMITS_US.len() - 1]
    }

    /// Get snapshot
    pub fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count();
        HistogramSnapshot {
            count,
            sum_us: self.sum_us.load(Ordering::Relaxed),
            min_us: if count == 0 { 0 } else { self.min_us.load(Ordering::Relaxed) },
            max_us: self.max_us.load(Ordering::Relaxed),
            p50: self.percentile(0.50),
            p99: self.percentile(0.99),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`LatencyHistogram`], durations in microseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    /// Samples recorded
    pub count: u64,
    /// Sum of all samples
    pub sum_us: u64,
    /// Smallest sample (0 when empty)
    pub min_us: u64,
    /// Largest sample
    pub max_us: u64,
    /// Bucket bound at the median
    pub p50: u64,
    /// Bucket bound at the 99th percentile
    pub p99: u64,
}
