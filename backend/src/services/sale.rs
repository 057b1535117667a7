//! Sale orchestrator: reservation, sale header, sale line and total as one unit

use std::sync::Arc;
use std::time::Duration;

use pharmaflow_shared::{
    validate_sale_request, NewAuditEntry, Permission, SaleOutcome, SaleRequest, Strategy,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::RetryConfig;
use crate::error::{SaleError, SaleResult};
use crate::services::access::{AccessPolicy, AllowAll};
use crate::services::locking::{Locking, LockingStrategy, Reservation};
use crate::store::{LedgerStore, LedgerTx, NewSaleLine};

/// Sale service recording sales against lot stock
pub struct SaleService<S: LedgerStore> {
    store: Arc<S>,
    policy: Arc<dyn AccessPolicy>,
}

impl<S: LedgerStore> Clone for SaleService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
        }
    }
}

/// A committed sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleReceipt {
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
    /// Units left on the lot right after the sale
    pub remaining: i32,
    /// Lot version written by the sale
    pub version: i64,
    pub strategy: Strategy,
}

/// Caller-driven retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// No retries at all
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Exponential backoff before attempt `attempt + 1`, capped at `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Final result of a sale after retries, with the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: SaleResult<SaleReceipt>,
    pub attempts: u32,
}

impl<S: LedgerStore> SaleService<S> {
    /// Create a SaleService for callers already authorized upstream
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, Arc::new(AllowAll))
    }

    /// Create a SaleService that checks every sale against `policy`
    pub fn with_policy(store: Arc<S>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Sell and report the result as a structured outcome; never fails
    pub async fn sell(&self, request: &SaleRequest) -> SaleOutcome {
        match self.execute_sale(request).await {
            Ok(receipt) => SaleOutcome::completed(receipt.sale_id, receipt.total),
            Err(err) => err.into(),
        }
    }

    /// Run one sale attempt: policy check, reservation and sale rows in a
    /// single transaction, then the audit record
    pub async fn execute_sale(&self, request: &SaleRequest) -> SaleResult<SaleReceipt> {
        validate_sale_request(request).map_err(|(field, message)| SaleError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        })?;

        self.policy
            .authorize(request.actor_id, Permission::SalesCreate)?;

        let locking = Locking::for_request(request)?;
        let mut tx = self.store.begin().await?;

        let receipt = match record_sale(&mut tx, request, &locking).await {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        lot_id = request.lot_id,
                        "Rollback after failed sale also failed: {}",
                        rollback_err
                    );
                }
                tracing::debug!(
                    lot_id = request.lot_id,
                    strategy = %request.strategy,
                    code = %err.code(),
                    "Sale rolled back: {}",
                    err
                );
                return Err(err);
            }
        };

        tx.commit().await?;

        tracing::info!(
            sale_id = receipt.sale_id,
            lot_id = receipt.lot_id,
            quantity = receipt.quantity,
            total = %receipt.total,
            strategy = %receipt.strategy,
            "Sale committed"
        );

        self.audit(request.actor_id, &receipt).await;

        Ok(receipt)
    }

    /// Sell, retrying the failures a caller can recover from.
    ///
    /// A version conflict re-reads the lot's current version before the next
    /// attempt. Lock timeouts are retried immediately; connection errors back
    /// off exponentially.
    pub async fn sell_with_retry(
        &self,
        request: &SaleRequest,
        retry: &RetryPolicy,
    ) -> RetryOutcome {
        let mut request = request.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.execute_sale(&request).await {
                Ok(receipt) => {
                    return RetryOutcome {
                        result: Ok(receipt),
                        attempts: attempt,
                    }
                }
                Err(err) if err.is_retryable() && attempt < retry.max_attempts => err,
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            };

            tracing::warn!(lot_id = request.lot_id, attempt, "Retrying sale after: {}", err);

            match err {
                SaleError::VersionConflict { .. } => {
                    match self.store.find_lot(request.lot_id).await {
                        Ok(Some(lot)) => request = request.with_expected_version(lot.version),
                        Ok(None) => {
                            return RetryOutcome {
                                result: Err(SaleError::NotFound(format!(
                                    "Lot {}",
                                    request.lot_id
                                ))),
                                attempts: attempt,
                            }
                        }
                        Err(_) => tokio::time::sleep(retry.backoff(attempt)).await,
                    }
                    tokio::task::yield_now().await;
                }
                SaleError::LockTimeout { .. } => tokio::task::yield_now().await,
                _ => tokio::time::sleep(retry.backoff(attempt)).await,
            }
        }
    }

    async fn audit(&self, actor_id: i64, receipt: &SaleReceipt) {
        let permission = Permission::SalesCreate;
        let details = serde_json::json!({
            "sale_id": receipt.sale_id,
            "lot_id": receipt.lot_id,
            "quantity": receipt.quantity,
            "unit_price": receipt.unit_price.to_string(),
            "total": receipt.total.to_string(),
            "strategy": receipt.strategy.as_str(),
        });

        let entry = NewAuditEntry {
            actor_id,
            action: permission.as_str().to_string(),
            resource: Some(permission.resource().to_string()),
            details: Some(details.to_string()),
        };

        // The sale is already committed; a lost audit record must not undo it.
        if let Err(e) = self.store.record_audit(entry).await {
            tracing::warn!(sale_id = receipt.sale_id, "Failed to record audit entry: {}", e);
        }
    }
}

/// Reserve stock and write the sale rows inside `tx`
async fn record_sale<T: LedgerTx>(
    tx: &mut T,
    request: &SaleRequest,
    locking: &Locking,
) -> SaleResult<SaleReceipt> {
    let Reservation {
        lot_id,
        quantity,
        unit_price,
        remaining,
        version,
    } = locking.reserve(tx, request.lot_id, request.quantity).await?;

    let sale_id = tx.insert_sale(request.actor_id).await?;
    tx.insert_sale_line(&NewSaleLine {
        sale_id,
        lot_id,
        quantity,
        unit_price,
    })
    .await?;
    let total = tx.update_sale_total(sale_id).await?;

    Ok(SaleReceipt {
        sale_id,
        lot_id,
        quantity,
        unit_price,
        total,
        remaining,
        version,
        strategy: locking.kind(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let retry = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
        };

        assert_eq!(retry.backoff(1), Duration::from_millis(10));
        assert_eq!(retry.backoff(2), Duration::from_millis(20));
        assert_eq!(retry.backoff(3), Duration::from_millis(40));
        assert_eq!(retry.backoff(5), Duration::from_millis(100));
        assert_eq!(retry.backoff(40), Duration::from_millis(100));
    }

    #[test]
    fn test_single_attempt_policy() {
        assert_eq!(RetryPolicy::single_attempt().max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }
}
