//! Business logic services for the PharmaFlow sales core

pub mod access;
pub mod inventory;
pub mod locking;
pub mod sale;

pub use access::{AccessPolicy, AllowAll, RoleAccessPolicy};
pub use inventory::InventoryService;
pub use locking::{Locking, LockingStrategy, OptimisticLocking, PessimisticLocking, Reservation};
pub use sale::{RetryOutcome, RetryPolicy, SaleReceipt, SaleService};
