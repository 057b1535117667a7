//! Ledger store: lots, sales, sale lines and the audit trail
//!
//! A store hands out transactions. A transaction is a scoped value: dropping
//! it without calling [`LedgerTx::commit`] discards every write and releases
//! every row lock it holds.

use async_trait::async_trait;
use pharmaflow_shared::{AuditEntry, Lot, LotStock, NewAuditEntry, SaleWithLines};
use rust_decimal::Decimal;

use crate::error::SaleResult;

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, MemoryLedgerStore};
pub use postgres::PgLedgerStore;

/// Input for writing a sale line
#[derive(Debug, Clone, PartialEq)]
pub struct NewSaleLine {
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Result of a version-guarded decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalDecrement {
    /// The row was updated; `remaining` is the quantity written
    Applied { remaining: i32 },
    /// No row carries the expected version (or the lot is gone)
    VersionMismatch,
    /// The row carries the expected version but holds fewer units
    Insufficient { available: i32 },
}

/// One open transaction against the ledger
#[async_trait]
pub trait LedgerTx: Send {
    /// Read a lot without taking any lock
    async fn lot(&mut self, lot_id: i64) -> SaleResult<Option<Lot>>;

    /// Read a lot under an exclusive row lock held until the transaction ends.
    ///
    /// Waits at most the store's lock timeout, then fails with `LockTimeout`.
    async fn lot_for_update(&mut self, lot_id: i64) -> SaleResult<Option<Lot>>;

    /// Overwrite the available quantity of a lot locked by this transaction
    /// and bump its version
    async fn set_lot_quantity(&mut self, lot_id: i64, quantity: i32) -> SaleResult<()>;

    /// Decrement a lot only if its version still equals `expected_version`
    /// and it still holds at least `quantity` units, bumping the version.
    ///
    /// Waits for an in-flight writer of the row before evaluating the guard.
    async fn decrement_if_version(
        &mut self,
        lot_id: i64,
        quantity: i32,
        expected_version: i64,
    ) -> SaleResult<ConditionalDecrement>;

    /// Current price of the medication the lot belongs to
    async fn unit_price(&mut self, lot_id: i64) -> SaleResult<Option<Decimal>>;

    /// Insert a sale header with a zero total, returning its id
    async fn insert_sale(&mut self, actor_id: i64) -> SaleResult<i64>;

    /// Insert a sale line, returning its id
    async fn insert_sale_line(&mut self, line: &NewSaleLine) -> SaleResult<i64>;

    /// Recompute a sale's total from its lines and store it
    async fn update_sale_total(&mut self, sale_id: i64) -> SaleResult<Decimal>;

    async fn commit(self) -> SaleResult<()>;

    async fn rollback(self) -> SaleResult<()>;
}

/// Durable relational state of the sales ledger
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx + 'static;

    /// Open a new transaction
    async fn begin(&self) -> SaleResult<Self::Tx>;

    /// Committed state of a lot
    async fn find_lot(&self, lot_id: i64) -> SaleResult<Option<Lot>>;

    /// Stock of every lot, optionally restricted to one medication
    async fn list_stock(&self, medication_id: Option<i64>) -> SaleResult<Vec<LotStock>>;

    /// Reset a lot's quantity and version; used to prepare benchmark runs
    async fn reset_lot(&self, lot_id: i64, quantity: i32, version: i64) -> SaleResult<()>;

    /// A committed sale with its lines
    async fn find_sale(&self, sale_id: i64) -> SaleResult<Option<SaleWithLines>>;

    /// Number of committed sales
    async fn count_sales(&self) -> SaleResult<i64>;

    async fn record_audit(&self, entry: NewAuditEntry) -> SaleResult<AuditEntry>;

    /// Most recent audit entries first, optionally for one actor
    async fn audit_log(&self, actor_id: Option<i64>, limit: i64) -> SaleResult<Vec<AuditEntry>>;
}
