//! PostgreSQL ledger store

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pharmaflow_shared::{
    AuditEntry, Lot, LotStock, NewAuditEntry, Sale, SaleLine, SaleStatus, SaleWithLines,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::{ConditionalDecrement, LedgerStore, LedgerTx, NewSaleLine};
use crate::error::{SaleError, SaleResult};

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
    lock_timeout: Duration,
}

/// Row for lot queries
#[derive(Debug, FromRow)]
struct LotRow {
    id: i64,
    medication_id: i64,
    lot_number: String,
    quantity_available: i32,
    version: i64,
    expiry: NaiveDate,
    purchase_price: Decimal,
    supplier: Option<String>,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Lot {
            id: row.id,
            medication_id: row.medication_id,
            lot_number: row.lot_number,
            quantity_available: row.quantity_available,
            version: row.version,
            expiry: row.expiry,
            purchase_price: row.purchase_price,
            supplier: row.supplier,
        }
    }
}

/// Row for stock queries
#[derive(Debug, FromRow)]
struct StockRow {
    #[sqlx(flatten)]
    lot: LotRow,
    medication_name: String,
    unit_price: Decimal,
}

/// Row for sale header queries
#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    actor_id: i64,
    total: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

/// Row for sale line queries
#[derive(Debug, FromRow)]
struct SaleLineRow {
    id: i64,
    sale_id: i64,
    lot_id: i64,
    quantity: i32,
    unit_price: Decimal,
}

/// Row for audit queries
#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    actor_id: i64,
    action: String,
    resource: Option<String>,
    details: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            resource: row.resource,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

const LOT_COLUMNS: &str =
    "id, medication_id, lot_number, quantity_available, version, expiry, purchase_price, supplier";

impl PgLedgerStore {
    /// Create a new PgLedgerStore instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.db).await
    }
}

/// Transaction over a [`PgLedgerStore`]; sqlx rolls it back when dropped
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lot(&mut self, lot_id: i64) -> SaleResult<Option<Lot>> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE id = $1",
            LOT_COLUMNS
        ))
        .bind(lot_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Lot::from))
    }

    async fn lot_for_update(&mut self, lot_id: i64) -> SaleResult<Option<Lot>> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE id = $1 FOR UPDATE",
            LOT_COLUMNS
        ))
        .bind(lot_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| SaleError::from_lock_wait(e, lot_id))?;

        Ok(row.map(Lot::from))
    }

    async fn set_lot_quantity(&mut self, lot_id: i64, quantity: i32) -> SaleResult<()> {
        let result = sqlx::query(
            "UPDATE lots SET quantity_available = $1, version = version + 1 WHERE id = $2",
        )
        .bind(quantity)
        .bind(lot_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| SaleError::from_lock_wait(e, lot_id))?;

        if result.rows_affected() == 0 {
            return Err(SaleError::NotFound(format!("Lot {}", lot_id)));
        }

        Ok(())
    }

    async fn decrement_if_version(
        &mut self,
        lot_id: i64,
        quantity: i32,
        expected_version: i64,
    ) -> SaleResult<ConditionalDecrement> {
        let remaining = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE lots
            SET quantity_available = quantity_available - $1, version = version + 1
            WHERE id = $2 AND version = $3 AND quantity_available >= $1
            RETURNING quantity_available
            "#,
        )
        .bind(quantity)
        .bind(lot_id)
        .bind(expected_version)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| SaleError::from_lock_wait(e, lot_id))?;

        if let Some(remaining) = remaining {
            return Ok(ConditionalDecrement::Applied { remaining });
        }

        // Nothing matched: tell a moved version apart from a stock shortfall.
        let current = sqlx::query_as::<_, (i32, i64)>(
            "SELECT quantity_available, version FROM lots WHERE id = $1",
        )
        .bind(lot_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match current {
            Some((available, version)) if version == expected_version => {
                ConditionalDecrement::Insufficient { available }
            }
            _ => ConditionalDecrement::VersionMismatch,
        })
    }

    async fn unit_price(&mut self, lot_id: i64) -> SaleResult<Option<Decimal>> {
        let price = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT m.price FROM lots l
            JOIN medications m ON l.medication_id = m.id
            WHERE l.id = $1
            "#,
        )
        .bind(lot_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(price)
    }

    async fn insert_sale(&mut self, actor_id: i64) -> SaleResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sales (actor_id, total, status) VALUES ($1, 0, $2) RETURNING id",
        )
        .bind(actor_id)
        .bind(SaleStatus::Completed.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn insert_sale_line(&mut self, line: &NewSaleLine) -> SaleResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sale_lines (sale_id, lot_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(line.sale_id)
        .bind(line.lot_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn update_sale_total(&mut self, sale_id: i64) -> SaleResult<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE sales
            SET total = (
                SELECT COALESCE(SUM(quantity * unit_price), 0)
                FROM sale_lines WHERE sale_id = $1
            )
            WHERE id = $1
            RETURNING total
            "#,
        )
        .bind(sale_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| SaleError::NotFound(format!("Sale {}", sale_id)))?;

        Ok(total)
    }

    async fn commit(self) -> SaleResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> SaleResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> SaleResult<PgLedgerTx> {
        let mut tx = self.db.begin().await?;

        // Bounds every row-lock wait in this transaction. SET takes no bind
        // parameters; the value is an integer formatted here.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(PgLedgerTx { tx })
    }

    async fn find_lot(&self, lot_id: i64) -> SaleResult<Option<Lot>> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE id = $1",
            LOT_COLUMNS
        ))
        .bind(lot_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Lot::from))
    }

    async fn list_stock(&self, medication_id: Option<i64>) -> SaleResult<Vec<LotStock>> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT l.id, l.medication_id, l.lot_number, l.quantity_available, l.version,
                   l.expiry, l.purchase_price, l.supplier,
                   m.name AS medication_name, m.price AS unit_price
            FROM lots l
            JOIN medications m ON l.medication_id = m.id
            WHERE $1::BIGINT IS NULL OR m.id = $1
            ORDER BY l.expiry ASC, l.id ASC
            "#,
        )
        .bind(medication_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LotStock {
                lot: r.lot.into(),
                medication_name: r.medication_name,
                unit_price: r.unit_price,
            })
            .collect())
    }

    async fn reset_lot(&self, lot_id: i64, quantity: i32, version: i64) -> SaleResult<()> {
        let result =
            sqlx::query("UPDATE lots SET quantity_available = $1, version = $2 WHERE id = $3")
                .bind(quantity)
                .bind(version)
                .bind(lot_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(SaleError::NotFound(format!("Lot {}", lot_id)));
        }

        Ok(())
    }

    async fn find_sale(&self, sale_id: i64) -> SaleResult<Option<SaleWithLines>> {
        let Some(row) = sqlx::query_as::<_, SaleRow>(
            "SELECT id, actor_id, total, status, created_at FROM sales WHERE id = $1",
        )
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, SaleLineRow>(
            r#"
            SELECT id, sale_id, lot_id, quantity, unit_price
            FROM sale_lines
            WHERE sale_id = $1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.db)
        .await?;

        let status = SaleStatus::parse(&row.status)
            .ok_or_else(|| SaleError::Internal(format!("unknown sale status {}", row.status)))?;

        Ok(Some(SaleWithLines {
            sale: Sale {
                id: row.id,
                actor_id: row.actor_id,
                total: row.total,
                status,
                created_at: row.created_at,
            },
            lines: lines
                .into_iter()
                .map(|l| SaleLine {
                    id: l.id,
                    sale_id: l.sale_id,
                    lot_id: l.lot_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
        }))
    }

    async fn count_sales(&self) -> SaleResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> SaleResult<AuditEntry> {
        let row = sqlx::query_as::<_, AuditRow>(
            r#"
            INSERT INTO audit_log (actor_id, action, resource, details)
            VALUES ($1, $2, $3, $4)
            RETURNING id, actor_id, action, resource, details, created_at
            "#,
        )
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.details)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn audit_log(&self, actor_id: Option<i64>, limit: i64) -> SaleResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor_id, action, resource, details, created_at
            FROM audit_log
            WHERE $1::BIGINT IS NULL OR actor_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(actor_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
