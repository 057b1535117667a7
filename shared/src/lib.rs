//! Shared types and models for the PharmaFlow sales ledger
//!
//! This crate contains the domain models and the request/outcome contract
//! exchanged between the sales core and the layers that call into it.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
