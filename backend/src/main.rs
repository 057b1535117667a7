//! PharmaFlow benchmark runner
//!
//! Runs every contention profile with both locking strategies against the
//! configured ledger store and prints a side-by-side comparison.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use pharmaflow_sales::bench::{BenchmarkHarness, Comparison, ContentionProfile};
use pharmaflow_sales::config::{Config, StoreBackend};
use pharmaflow_sales::services::{RetryPolicy, SaleService};
use pharmaflow_sales::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use pharmaflow_shared::{generate_lot_number, Lot, Medication};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pf_bench=info,pharmaflow_sales=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting PharmaFlow concurrency benchmark");
    tracing::info!("Environment: {}", config.environment);

    match config.store.backend {
        StoreBackend::Memory => {
            let store = MemoryLedgerStore::new(config.locking.lock_timeout());
            seed_memory_store(&store, &config)?;
            run_suite(Arc::new(store), &config).await
        }
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(config.database.acquire_timeout())
                .connect(&config.database.url)
                .await?;
            tracing::info!("Database connection established");

            let store = PgLedgerStore::new(pool, config.locking.lock_timeout());
            if config.database.run_migrations {
                tracing::info!("Running database migrations...");
                store.migrate().await?;
                tracing::info!("Migrations completed");
            }
            run_suite(Arc::new(store), &config).await
        }
    }
}

/// Run every profile, print the comparisons and write the optional report
async fn run_suite<S: LedgerStore>(store: Arc<S>, config: &Config) -> anyhow::Result<()> {
    let bench = &config.bench;
    for lot_id in [bench.optimistic_lot_id, bench.pessimistic_lot_id] {
        if store.find_lot(lot_id).await?.is_none() {
            anyhow::bail!("Benchmark lot {} does not exist; seed it before running", lot_id);
        }
    }

    let harness = BenchmarkHarness::new(SaleService::new(store))
        .with_retry(RetryPolicy::from(config.retry.clone()));

    let mut comparisons: Vec<Comparison> = Vec::new();
    for profile in ContentionProfile::all() {
        let comparison = harness
            .compare(
                profile,
                bench.optimistic_lot_id,
                bench.pessimistic_lot_id,
                bench.max_attempts,
            )
            .await
            .with_context(|| format!("{} run failed", profile.title()))?;
        println!("\n{}", comparison);
        comparisons.push(comparison);
    }

    if let Some(path) = &bench.report_path {
        let report = serde_json::to_string_pretty(&comparisons)?;
        std::fs::write(path, report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    if comparisons.iter().all(Comparison::is_consistent) {
        tracing::info!("Every run conserved stock");
        Ok(())
    } else {
        anyhow::bail!("Stock conservation violated; see the comparison above")
    }
}

/// Demo catalog for the in-memory store: one medication, one lot per strategy
fn seed_memory_store(store: &MemoryLedgerStore, config: &Config) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let expiry = NaiveDate::from_ymd_opt(today.year() + 2, 12, 31)
        .context("Invalid expiry date for demo lots")?;

    store.add_medication(Medication {
        id: 1,
        name: "Paracetamol 500mg".to_string(),
        active_ingredient: "Paracetamol".to_string(),
        price: Decimal::new(250, 2),
        requires_prescription: false,
    });

    for (seq, lot_id) in [config.bench.optimistic_lot_id, config.bench.pessimistic_lot_id]
        .into_iter()
        .enumerate()
    {
        store.add_lot(Lot {
            id: lot_id,
            medication_id: 1,
            lot_number: generate_lot_number(today.year(), seq as i32 + 1),
            quantity_available: 0,
            version: 1,
            expiry,
            purchase_price: Decimal::new(120, 2),
            supplier: Some("Demo Pharma Distribution".to_string()),
        })?;
    }

    Ok(())
}
