//! Configuration management for the PharmaFlow sales core
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with PF_ prefix

use std::path::PathBuf;
use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Ledger store backend selection
    pub store: StoreConfig,

    /// Row locking configuration
    pub locking: LockingConfig,

    /// Caller-driven retry configuration
    pub retry: RetryConfig,

    /// Benchmark harness configuration
    pub bench: BenchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

/// Which ledger store implementation to run against
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockingConfig {
    /// Bounded wait for an exclusive row lock, in milliseconds
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempts per sale, including the first
    pub max_attempts: u32,

    /// First backoff delay after a connection error, in milliseconds
    pub base_backoff_ms: u64,

    /// Upper bound for the backoff delay, in milliseconds
    pub max_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    /// Lot used for optimistic runs
    pub optimistic_lot_id: i64,

    /// Lot used for pessimistic runs
    pub pessimistic_lot_id: i64,

    /// Attempts per simulated caller (1 = single shot)
    pub max_attempts: u32,

    /// Optional path for a JSON report of every run
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("PF_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.url", "postgres://localhost/pharmaflow")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.run_migrations", environment == "development")?
            .set_default("store.backend", "memory")?
            .set_default("locking.lock_timeout_ms", 5000)?
            .set_default("retry.max_attempts", 5)?
            .set_default("retry.base_backoff_ms", 25)?
            .set_default("retry.max_backoff_ms", 1000)?
            .set_default("bench.optimistic_lot_id", 1)?
            .set_default("bench.pessimistic_lot_id", 2)?
            .set_default("bench.max_attempts", 1)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (PF_ prefix)
            .add_source(
                Environment::with_prefix("PF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl LockingConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 25,
            max_backoff_ms: 1000,
        }
    }
}
