//! Domain models for the PharmaFlow sales ledger

mod audit;
mod lot;
mod medication;
mod sale;
mod user;

pub use audit::*;
pub use lot::*;
pub use medication::*;
pub use sale::*;
pub use user::*;
