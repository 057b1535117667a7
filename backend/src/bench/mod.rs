//! Benchmark harness for the locking strategies
//!
//! A run seeds one lot, releases many independent callers against it at the
//! same instant and then checks the books: every unit that left the lot must
//! be accounted for by a committed sale, and the lot must never have been
//! observed below zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pharmaflow_shared::{validate_quantity, SaleRequest, Strategy};
use thiserror::Error;
use tokio::sync::Barrier;

use crate::error::SaleError;
use crate::services::{RetryPolicy, SaleReceipt, SaleService};
use crate::store::LedgerStore;

pub mod metrics;
pub mod profile;
pub mod report;

pub use metrics::{FailureBreakdown, LatencySummary, Metrics};
pub use profile::ContentionProfile;
pub use report::{Comparison, Winner};

/// Actor ids handed to simulated callers start here
const FIRST_ACTOR_ID: i64 = 1;

/// Polling period of the stock sampler
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Benchmark errors
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Invalid run plan: {0}")]
    InvalidPlan(String),

    #[error(
        "Conservation violated on lot {lot_id}: {units_removed} units removed but {successes} sales x {quantity_per_caller} units recorded"
    )]
    ConservationViolated {
        lot_id: i64,
        units_removed: i64,
        successes: usize,
        quantity_per_caller: i32,
    },

    #[error("Oversell on lot {lot_id}: quantity observed at {observed}")]
    Oversold { lot_id: i64, observed: i32 },

    #[error("Ledger mismatch for sale {sale_id}: {reason}")]
    LedgerMismatch { sale_id: i64, reason: String },

    #[error("Caller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] SaleError),
}

/// What to run: one strategy, one lot, N callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub lot_id: i64,
    pub strategy: Strategy,
    pub num_callers: usize,
    pub quantity_per_caller: i32,
    pub initial_quantity: i32,
    pub initial_version: i64,
    /// Attempts per caller; 1 measures single-shot behavior
    pub max_attempts: u32,
}

impl RunPlan {
    /// Plan with enough stock for every caller and single-shot callers
    pub fn new(
        lot_id: i64,
        strategy: Strategy,
        num_callers: usize,
        quantity_per_caller: i32,
    ) -> Self {
        Self {
            lot_id,
            strategy,
            num_callers,
            quantity_per_caller,
            initial_quantity: i32::try_from(num_callers)
                .unwrap_or(i32::MAX)
                .saturating_mul(quantity_per_caller),
            initial_version: 1,
            max_attempts: 1,
        }
    }

    /// Seed the lot with `quantity` units at `version`
    pub fn seeded(mut self, quantity: i32, version: i64) -> Self {
        self.initial_quantity = quantity;
        self.initial_version = version;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn validate(&self) -> Result<(), BenchError> {
        if self.num_callers == 0 {
            return Err(BenchError::InvalidPlan("at least one caller is required".into()));
        }
        validate_quantity(self.quantity_per_caller)
            .map_err(|msg| BenchError::InvalidPlan(format!("quantity per caller: {}", msg)))?;
        if self.initial_quantity < 0 || self.initial_version < 0 {
            return Err(BenchError::InvalidPlan(
                "seed quantity and version cannot be negative".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(BenchError::InvalidPlan("max attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of one simulated caller
struct CallerResult {
    latency: Duration,
    attempts: u32,
    result: Result<SaleReceipt, SaleError>,
}

/// Drives concurrent sale attempts and verifies the conservation invariant
pub struct BenchmarkHarness<S: LedgerStore> {
    sales: SaleService<S>,
    retry: RetryPolicy,
}

impl<S: LedgerStore> BenchmarkHarness<S> {
    pub fn new(sales: SaleService<S>) -> Self {
        Self {
            sales,
            retry: RetryPolicy::default(),
        }
    }

    /// Backoff settings used when a plan allows retries
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one plan and verify the books afterwards
    pub async fn run(&self, plan: &RunPlan) -> Result<Metrics, BenchError> {
        plan.validate()?;
        let store = Arc::clone(self.sales.store());
        store
            .reset_lot(plan.lot_id, plan.initial_quantity, plan.initial_version)
            .await?;

        tracing::info!(
            lot_id = plan.lot_id,
            strategy = %plan.strategy,
            callers = plan.num_callers,
            quantity = plan.quantity_per_caller,
            stock = plan.initial_quantity,
            "Starting benchmark run"
        );

        let stop = StopOnDrop::default();
        let sampler = tokio::spawn(sample_min_quantity(
            Arc::clone(&store),
            plan.lot_id,
            plan.initial_quantity,
            SAMPLE_INTERVAL,
            stop.flag(),
        ));

        let barrier = Arc::new(Barrier::new(plan.num_callers));
        let retry = self.retry.with_max_attempts(plan.max_attempts);
        let started = Instant::now();

        let handles: Vec<_> = (0..plan.num_callers)
            .map(|caller| {
                let sales = self.sales.clone();
                let barrier = Arc::clone(&barrier);
                let plan = plan.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    run_caller(&sales, &plan, FIRST_ACTOR_ID + caller as i64, &retry).await
                })
            })
            .collect();

        let mut joined = Vec::with_capacity(handles.len());
        for handle in handles {
            joined.push(handle.await);
        }
        let total_time = started.elapsed();

        stop.signal();
        let min_observed_quantity = sampler.await??;
        let results = joined.into_iter().collect::<Result<Vec<_>, _>>()?;

        let lot = store
            .find_lot(plan.lot_id)
            .await?
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", plan.lot_id)))?;

        let mut breakdown = FailureBreakdown::default();
        let mut latencies = Vec::with_capacity(results.len());
        let mut sale_ids = Vec::new();
        let mut total_attempts = 0u64;

        for caller in results {
            latencies.push(caller.latency);
            total_attempts += u64::from(caller.attempts);
            match caller.result {
                Ok(receipt) => sale_ids.push(receipt.sale_id),
                // Connectivity loss that survived the retries ends the batch.
                Err(err @ SaleError::Connection(_)) => return Err(err.into()),
                Err(err) => breakdown.record(&err),
            }
        }

        let metrics = Metrics {
            strategy: plan.strategy,
            lot_id: plan.lot_id,
            num_callers: plan.num_callers,
            quantity_per_caller: plan.quantity_per_caller,
            successes: sale_ids.len(),
            failures: breakdown.total(),
            failure_breakdown: breakdown,
            total_attempts,
            total_time,
            latencies,
            initial_quantity: plan.initial_quantity,
            final_quantity: lot.quantity_available,
            final_version: lot.version,
            min_observed_quantity: min_observed_quantity.min(lot.quantity_available),
            sale_ids,
        };

        self.verify(&metrics).await?;

        tracing::info!(
            lot_id = plan.lot_id,
            strategy = %plan.strategy,
            successes = metrics.successes,
            failures = metrics.failures,
            final_quantity = metrics.final_quantity,
            elapsed_ms = metrics.total_time.as_millis() as u64,
            "Benchmark run verified"
        );

        Ok(metrics)
    }

    /// Run a profile with both strategies on two separate lots
    pub async fn compare(
        &self,
        profile: ContentionProfile,
        optimistic_lot_id: i64,
        pessimistic_lot_id: i64,
        max_attempts: u32,
    ) -> Result<Comparison, BenchError> {
        let optimistic = self
            .run(&profile
                .plan(optimistic_lot_id, Strategy::Optimistic)
                .with_max_attempts(max_attempts))
            .await?;
        let pessimistic = self
            .run(&profile
                .plan(pessimistic_lot_id, Strategy::Pessimistic)
                .with_max_attempts(max_attempts))
            .await?;

        Ok(Comparison {
            profile,
            optimistic,
            pessimistic,
        })
    }

    /// Check conservation, no oversell and the ledger rows of every sale
    async fn verify(&self, metrics: &Metrics) -> Result<(), BenchError> {
        if metrics.min_observed_quantity < 0 {
            return Err(BenchError::Oversold {
                lot_id: metrics.lot_id,
                observed: metrics.min_observed_quantity,
            });
        }

        if !metrics.is_conserved() {
            return Err(BenchError::ConservationViolated {
                lot_id: metrics.lot_id,
                units_removed: metrics.units_removed(),
                successes: metrics.successes,
                quantity_per_caller: metrics.quantity_per_caller,
            });
        }

        let store = self.sales.store();
        for &sale_id in &metrics.sale_ids {
            let sale = store
                .find_sale(sale_id)
                .await?
                .ok_or_else(|| BenchError::LedgerMismatch {
                    sale_id,
                    reason: "sale row missing".to_string(),
                })?;

            let lot_units: i32 = sale
                .lines
                .iter()
                .filter(|line| line.lot_id == metrics.lot_id)
                .map(|line| line.quantity)
                .sum();
            if lot_units != metrics.quantity_per_caller {
                return Err(BenchError::LedgerMismatch {
                    sale_id,
                    reason: format!(
                        "lines hold {} units, expected {}",
                        lot_units, metrics.quantity_per_caller
                    ),
                });
            }
            if !sale.is_consistent() {
                return Err(BenchError::LedgerMismatch {
                    sale_id,
                    reason: format!(
                        "total {} differs from lines {}",
                        sale.sale.total,
                        sale.computed_total()
                    ),
                });
            }
        }

        Ok(())
    }
}

/// One simulated caller: optimistic callers read their own version first
async fn run_caller<S: LedgerStore>(
    sales: &SaleService<S>,
    plan: &RunPlan,
    actor_id: i64,
    retry: &RetryPolicy,
) -> CallerResult {
    let request = match plan.strategy {
        Strategy::Pessimistic => {
            SaleRequest::pessimistic(plan.lot_id, plan.quantity_per_caller, actor_id)
        }
        Strategy::Optimistic => match sales.store().find_lot(plan.lot_id).await {
            Ok(Some(lot)) => SaleRequest::optimistic(
                plan.lot_id,
                plan.quantity_per_caller,
                actor_id,
                lot.version,
            ),
            Ok(None) => {
                return CallerResult {
                    latency: Duration::ZERO,
                    attempts: 0,
                    result: Err(SaleError::NotFound(format!("Lot {}", plan.lot_id))),
                }
            }
            Err(err) => {
                return CallerResult {
                    latency: Duration::ZERO,
                    attempts: 0,
                    result: Err(err),
                }
            }
        },
    };

    let started = Instant::now();
    let outcome = sales.sell_with_retry(&request, retry).await;
    CallerResult {
        latency: started.elapsed(),
        attempts: outcome.attempts,
        result: outcome.result,
    }
}

/// Poll the committed lot until told to stop, returning the lowest quantity seen
async fn sample_min_quantity<S: LedgerStore>(
    store: Arc<S>,
    lot_id: i64,
    initial: i32,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> Result<i32, SaleError> {
    let mut min = initial;
    loop {
        let done = stop.load(Ordering::SeqCst);
        if let Some(lot) = store.find_lot(lot_id).await? {
            min = min.min(lot.quantity_available);
        }
        if done {
            return Ok(min);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Stop flag for the sampler, raised at the latest when the run returns
#[derive(Default)]
struct StopOnDrop(Arc<AtomicBool>);

impl StopOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }

    fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_seed_saturates_instead_of_truncating() {
        let plan = RunPlan::new(1, Strategy::Pessimistic, usize::MAX, 2);
        assert_eq!(plan.initial_quantity, i32::MAX);

        let plan = RunPlan::new(1, Strategy::Pessimistic, (i32::MAX as usize) + 2, 1);
        assert_eq!(plan.initial_quantity, i32::MAX);

        let plan = RunPlan::new(1, Strategy::Optimistic, 15, 3);
        assert_eq!(plan.initial_quantity, 45);
    }

    #[test]
    fn test_sampler_flag_raised_on_early_return() {
        let flag = {
            let stop = StopOnDrop::default();
            let flag = stop.flag();
            assert!(!flag.load(Ordering::SeqCst));
            flag
        };
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sampler_exits_once_flag_is_raised() {
        let store = Arc::new(crate::store::MemoryLedgerStore::default());
        let stop = StopOnDrop::default();
        let sampler = tokio::spawn(sample_min_quantity(
            store,
            1,
            7,
            SAMPLE_INTERVAL,
            stop.flag(),
        ));
        drop(stop);

        let min = tokio::time::timeout(Duration::from_secs(1), sampler)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(min, 7);
    }
}
