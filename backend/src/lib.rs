//! PharmaFlow sales core
//!
//! Records sales against lot stock under two interchangeable concurrency
//! strategies, and benchmarks them against each other.

pub mod bench;
pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{SaleError, SaleResult};
