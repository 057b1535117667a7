//! In-process ledger store
//!
//! Committed rows live behind one short-lived `parking_lot` mutex. Each lot
//! row additionally owns an async mutex that plays the part of a row-level
//! write lock: it is taken by `lot_for_update`, by conditional updates and by
//! plain updates, and is held by the transaction until commit or rollback.
//! Transactions buffer their writes and apply them in one step on commit,
//! so nothing they do is visible to other transactions before that.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pharmaflow_shared::{
    sale_total, validate_lot_number, validate_price, AuditEntry, Lot, LotStock, Medication,
    NewAuditEntry, Sale, SaleLine, SaleStatus, SaleWithLines,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::{ConditionalDecrement, LedgerStore, LedgerTx, NewSaleLine};
use crate::error::{SaleError, SaleResult};

/// Steps of a sale transaction that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertSale,
    InsertSaleLine,
    UpdateSaleTotal,
    Commit,
}

#[derive(Default)]
struct LedgerState {
    medications: BTreeMap<i64, Medication>,
    lots: BTreeMap<i64, Lot>,
    sales: BTreeMap<i64, Sale>,
    sale_lines: Vec<SaleLine>,
    audit: Vec<AuditEntry>,
}

struct Inner {
    state: Mutex<LedgerState>,
    row_locks: Mutex<HashMap<i64, Arc<RowLock<()>>>>,
    next_sale_id: AtomicI64,
    next_line_id: AtomicI64,
    next_audit_id: AtomicI64,
    lock_timeout: Duration,
    faults: Mutex<HashSet<FaultPoint>>,
    offline: AtomicBool,
    failing_connections: AtomicU32,
}

impl Inner {
    fn row_lock(&self, lot_id: i64) -> Arc<RowLock<()>> {
        self.row_locks
            .lock()
            .entry(lot_id)
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }

    fn check_online(&self) -> SaleResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SaleError::Connection("ledger store is unreachable".to_string()));
        }
        Ok(())
    }

    fn check_fault(&self, point: FaultPoint) -> SaleResult<()> {
        if self.faults.lock().contains(&point) {
            return Err(SaleError::Internal(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }
}

/// In-memory ledger store with real row-lock and compare-and-swap semantics
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl MemoryLedgerStore {
    /// Create an empty store whose row locks wait at most `lock_timeout`
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LedgerState::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_sale_id: AtomicI64::new(1),
                next_line_id: AtomicI64::new(1),
                next_audit_id: AtomicI64::new(1),
                lock_timeout,
                faults: Mutex::new(HashSet::new()),
                offline: AtomicBool::new(false),
                failing_connections: AtomicU32::new(0),
            }),
        }
    }

    /// Register a medication in the catalog
    pub fn add_medication(&self, medication: Medication) {
        self.inner
            .state
            .lock()
            .medications
            .insert(medication.id, medication);
    }

    /// Receive a lot into stock
    pub fn add_lot(&self, lot: Lot) -> SaleResult<()> {
        let invalid = |field: &str, message: &str| SaleError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        };
        if lot.quantity_available < 0 {
            return Err(invalid("quantity_available", "Quantity cannot be negative"));
        }
        validate_lot_number(&lot.lot_number).map_err(|msg| invalid("lot_number", msg))?;
        validate_price(lot.purchase_price).map_err(|msg| invalid("purchase_price", msg))?;

        let mut state = self.inner.state.lock();
        if !state.medications.contains_key(&lot.medication_id) {
            return Err(SaleError::NotFound(format!("Medication {}", lot.medication_id)));
        }
        state.lots.insert(lot.id, lot);
        Ok(())
    }

    /// Committed lines written against a lot
    pub fn sale_lines_for_lot(&self, lot_id: i64) -> Vec<SaleLine> {
        self.inner
            .state
            .lock()
            .sale_lines
            .iter()
            .filter(|line| line.lot_id == lot_id)
            .cloned()
            .collect()
    }

    /// Make every subsequent transaction fail at `point` until cleared
    pub fn inject_fault(&self, point: FaultPoint) {
        self.inner.faults.lock().insert(point);
    }

    pub fn clear_faults(&self) {
        self.inner.faults.lock().clear();
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `begin` fail with a connection error
    pub fn fail_next_connections(&self, count: u32) {
        self.inner.failing_connections.store(count, Ordering::SeqCst);
    }
}

/// Transaction over a [`MemoryLedgerStore`]
pub struct MemoryTx {
    inner: Arc<Inner>,
    row_guards: HashMap<i64, OwnedMutexGuard<()>>,
    lots: HashMap<i64, Lot>,
    sales: BTreeMap<i64, Sale>,
    lines: Vec<SaleLine>,
}

impl MemoryTx {
    /// Take the row lock on a lot unless this transaction already holds it
    async fn lock_row(&mut self, lot_id: i64) -> SaleResult<()> {
        if self.row_guards.contains_key(&lot_id) {
            return Ok(());
        }
        let row = self.inner.row_lock(lot_id);
        let guard = tokio::time::timeout(self.inner.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| SaleError::LockTimeout { lot_id })?;
        self.row_guards.insert(lot_id, guard);
        Ok(())
    }

    /// The lot as this transaction sees it: its own write, else the committed row
    fn current_lot(&self, lot_id: i64) -> Option<Lot> {
        if let Some(lot) = self.lots.get(&lot_id) {
            return Some(lot.clone());
        }
        self.inner.state.lock().lots.get(&lot_id).cloned()
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lot(&mut self, lot_id: i64) -> SaleResult<Option<Lot>> {
        self.inner.check_online()?;
        Ok(self.current_lot(lot_id))
    }

    async fn lot_for_update(&mut self, lot_id: i64) -> SaleResult<Option<Lot>> {
        self.inner.check_online()?;
        self.lock_row(lot_id).await?;
        Ok(self.current_lot(lot_id))
    }

    async fn set_lot_quantity(&mut self, lot_id: i64, quantity: i32) -> SaleResult<()> {
        self.inner.check_online()?;
        if quantity < 0 {
            return Err(SaleError::Internal(format!(
                "lot {} quantity cannot become negative",
                lot_id
            )));
        }
        self.lock_row(lot_id).await?;
        let mut lot = self
            .current_lot(lot_id)
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", lot_id)))?;
        lot.quantity_available = quantity;
        lot.version += 1;
        self.lots.insert(lot_id, lot);
        Ok(())
    }

    async fn decrement_if_version(
        &mut self,
        lot_id: i64,
        quantity: i32,
        expected_version: i64,
    ) -> SaleResult<ConditionalDecrement> {
        self.inner.check_online()?;
        let already_locked = self.row_guards.contains_key(&lot_id);
        // Like a relational UPDATE: wait for an in-flight writer, then re-check the guard.
        self.lock_row(lot_id).await?;

        let outcome = match self.current_lot(lot_id) {
            Some(lot) if lot.version != expected_version => ConditionalDecrement::VersionMismatch,
            None => ConditionalDecrement::VersionMismatch,
            Some(lot) if !lot.can_cover(quantity) => ConditionalDecrement::Insufficient {
                available: lot.quantity_available,
            },
            Some(lot) => {
                let remaining = lot.quantity_available - quantity;
                self.lots.insert(
                    lot_id,
                    Lot {
                        quantity_available: remaining,
                        version: lot.version + 1,
                        ..lot
                    },
                );
                ConditionalDecrement::Applied { remaining }
            }
        };

        // A row the update did not touch is not kept locked.
        if !already_locked && !matches!(outcome, ConditionalDecrement::Applied { .. }) {
            self.row_guards.remove(&lot_id);
        }
        Ok(outcome)
    }

    async fn unit_price(&mut self, lot_id: i64) -> SaleResult<Option<Decimal>> {
        self.inner.check_online()?;
        let Some(lot) = self.current_lot(lot_id) else {
            return Ok(None);
        };
        let state = self.inner.state.lock();
        Ok(state.medications.get(&lot.medication_id).map(|m| m.price))
    }

    async fn insert_sale(&mut self, actor_id: i64) -> SaleResult<i64> {
        self.inner.check_online()?;
        self.inner.check_fault(FaultPoint::InsertSale)?;
        let id = self.inner.next_sale_id.fetch_add(1, Ordering::SeqCst);
        self.sales.insert(
            id,
            Sale {
                id,
                actor_id,
                total: Decimal::ZERO,
                status: SaleStatus::Completed,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn insert_sale_line(&mut self, line: &NewSaleLine) -> SaleResult<i64> {
        self.inner.check_online()?;
        self.inner.check_fault(FaultPoint::InsertSaleLine)?;
        if !self.sales.contains_key(&line.sale_id) {
            return Err(SaleError::NotFound(format!("Sale {}", line.sale_id)));
        }
        if self.current_lot(line.lot_id).is_none() {
            return Err(SaleError::NotFound(format!("Lot {}", line.lot_id)));
        }
        let id = self.inner.next_line_id.fetch_add(1, Ordering::SeqCst);
        self.lines.push(SaleLine {
            id,
            sale_id: line.sale_id,
            lot_id: line.lot_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
        Ok(id)
    }

    async fn update_sale_total(&mut self, sale_id: i64) -> SaleResult<Decimal> {
        self.inner.check_online()?;
        self.inner.check_fault(FaultPoint::UpdateSaleTotal)?;
        let lines: Vec<SaleLine> = self
            .lines
            .iter()
            .filter(|line| line.sale_id == sale_id)
            .cloned()
            .collect();
        let total = sale_total(&lines);
        let sale = self
            .sales
            .get_mut(&sale_id)
            .ok_or_else(|| SaleError::NotFound(format!("Sale {}", sale_id)))?;
        sale.total = total;
        Ok(total)
    }

    async fn commit(mut self) -> SaleResult<()> {
        self.inner.check_online()?;
        self.inner.check_fault(FaultPoint::Commit)?;
        {
            let mut state = self.inner.state.lock();
            for (id, lot) in self.lots.drain() {
                state.lots.insert(id, lot);
            }
            state.sales.append(&mut self.sales);
            state.sale_lines.append(&mut self.lines);
        }
        // Row locks go only after the new rows are visible.
        self.row_guards.clear();
        Ok(())
    }

    async fn rollback(self) -> SaleResult<()> {
        tracing::debug!(
            locked_rows = self.row_guards.len(),
            staged_sales = self.sales.len(),
            "Rolling back in-memory transaction"
        );
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> SaleResult<MemoryTx> {
        self.inner.check_online()?;
        let refused = self
            .inner
            .failing_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SaleError::Connection("connection refused".to_string()));
        }
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            row_guards: HashMap::new(),
            lots: HashMap::new(),
            sales: BTreeMap::new(),
            lines: Vec::new(),
        })
    }

    async fn find_lot(&self, lot_id: i64) -> SaleResult<Option<Lot>> {
        self.inner.check_online()?;
        Ok(self.inner.state.lock().lots.get(&lot_id).cloned())
    }

    async fn list_stock(&self, medication_id: Option<i64>) -> SaleResult<Vec<LotStock>> {
        self.inner.check_online()?;
        let state = self.inner.state.lock();
        let stock = state
            .lots
            .values()
            .filter(|lot| medication_id.map_or(true, |id| lot.medication_id == id))
            .filter_map(|lot| {
                state.medications.get(&lot.medication_id).map(|m| LotStock {
                    lot: lot.clone(),
                    medication_name: m.name.clone(),
                    unit_price: m.price,
                })
            })
            .collect();
        Ok(stock)
    }

    async fn reset_lot(&self, lot_id: i64, quantity: i32, version: i64) -> SaleResult<()> {
        self.inner.check_online()?;
        let row = self.inner.row_lock(lot_id);
        let _guard = tokio::time::timeout(self.inner.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| SaleError::LockTimeout { lot_id })?;

        let mut state = self.inner.state.lock();
        let lot = state
            .lots
            .get_mut(&lot_id)
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", lot_id)))?;
        lot.quantity_available = quantity;
        lot.version = version;
        Ok(())
    }

    async fn find_sale(&self, sale_id: i64) -> SaleResult<Option<SaleWithLines>> {
        self.inner.check_online()?;
        let state = self.inner.state.lock();
        Ok(state.sales.get(&sale_id).map(|sale| SaleWithLines {
            sale: sale.clone(),
            lines: state
                .sale_lines
                .iter()
                .filter(|line| line.sale_id == sale_id)
                .cloned()
                .collect(),
        }))
    }

    async fn count_sales(&self) -> SaleResult<i64> {
        self.inner.check_online()?;
        Ok(self.inner.state.lock().sales.len() as i64)
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> SaleResult<AuditEntry> {
        self.inner.check_online()?;
        let record = AuditEntry {
            id: self.inner.next_audit_id.fetch_add(1, Ordering::SeqCst),
            actor_id: entry.actor_id,
            action: entry.action,
            resource: entry.resource,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.inner.state.lock().audit.push(record.clone());
        Ok(record)
    }

    async fn audit_log(&self, actor_id: Option<i64>, limit: i64) -> SaleResult<Vec<AuditEntry>> {
        self.inner.check_online()?;
        let state = self.inner.state.lock();
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|entry| actor_id.map_or(true, |id| entry.actor_id == id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
