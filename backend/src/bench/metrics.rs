//! Metrics collected by a benchmark run

use std::time::Duration;

use pharmaflow_shared::Strategy;
use serde::Serialize;

use crate::error::SaleError;

/// Failed calls grouped by cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureBreakdown {
    pub insufficient_stock: usize,
    pub version_conflict: usize,
    pub lock_timeout: usize,
    pub not_found: usize,
    pub other: usize,
}

impl FailureBreakdown {
    pub fn record(&mut self, err: &SaleError) {
        match err {
            SaleError::InsufficientStock { .. } => self.insufficient_stock += 1,
            SaleError::VersionConflict { .. } => self.version_conflict += 1,
            SaleError::LockTimeout { .. } => self.lock_timeout += 1,
            SaleError::NotFound(_) => self.not_found += 1,
            _ => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.insufficient_stock
            + self.version_conflict
            + self.lock_timeout
            + self.not_found
            + self.other
    }
}

/// Latency distribution of the individual sale calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let total: Duration = sorted.iter().sum();
        Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: total / sorted.len() as u32,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }

    /// Difference between the slowest and the fastest call
    pub fn spread(&self) -> Duration {
        self.max.saturating_sub(self.min)
    }
}

/// Nearest-rank percentile of an ascending sample
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Everything measured by one run of one strategy against one lot
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub strategy: Strategy,
    pub lot_id: i64,
    pub num_callers: usize,
    pub quantity_per_caller: i32,
    pub successes: usize,
    pub failures: usize,
    pub failure_breakdown: FailureBreakdown,
    /// Sale attempts made across all callers, retries included
    pub total_attempts: u64,
    pub total_time: Duration,
    /// Per-caller latency, in completion order of the callers' tasks
    pub latencies: Vec<Duration>,
    pub initial_quantity: i32,
    pub final_quantity: i32,
    pub final_version: i64,
    /// Lowest quantity the sampler saw while the run was in flight
    pub min_observed_quantity: i32,
    /// Ids of the committed sales
    pub sale_ids: Vec<i64>,
}

impl Metrics {
    /// Units that left the lot during the run
    pub fn units_removed(&self) -> i64 {
        i64::from(self.initial_quantity) - i64::from(self.final_quantity)
    }

    /// Units accounted for by successful sales
    pub fn units_sold(&self) -> i64 {
        self.successes as i64 * i64::from(self.quantity_per_caller)
    }

    /// initial − final == quantity_per_caller × successes
    pub fn is_conserved(&self) -> bool {
        self.units_removed() == self.units_sold()
    }

    pub fn latency_summary(&self) -> LatencySummary {
        LatencySummary::from_samples(&self.latencies)
    }

    /// Successful sales per second of wall-clock time
    pub fn throughput(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.successes as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_latency_summary() {
        let samples: Vec<Duration> = (1..=100).map(ms).collect();
        let summary = LatencySummary::from_samples(&samples);

        assert_eq!(summary.min, ms(1));
        assert_eq!(summary.max, ms(100));
        assert_eq!(summary.p50, ms(50));
        assert_eq!(summary.p95, ms(95));
        assert_eq!(summary.p99, ms(99));
        assert_eq!(summary.spread(), ms(99));
        assert_eq!(summary.mean, Duration::from_micros(50_500));
    }

    #[test]
    fn test_latency_summary_single_and_empty() {
        let summary = LatencySummary::from_samples(&[ms(7)]);
        assert_eq!(summary.p50, ms(7));
        assert_eq!(summary.p99, ms(7));

        assert_eq!(LatencySummary::from_samples(&[]), LatencySummary::default());
    }

    #[test]
    fn test_failure_breakdown() {
        let mut breakdown = FailureBreakdown::default();
        breakdown.record(&SaleError::InsufficientStock { requested: 3, available: 0 });
        breakdown.record(&SaleError::VersionConflict { lot_id: 1, expected: 4 });
        breakdown.record(&SaleError::LockTimeout { lot_id: 1 });
        breakdown.record(&SaleError::Internal("boom".into()));

        assert_eq!(breakdown.insufficient_stock, 1);
        assert_eq!(breakdown.version_conflict, 1);
        assert_eq!(breakdown.lock_timeout, 1);
        assert_eq!(breakdown.other, 1);
        assert_eq!(breakdown.total(), 4);
    }
}
