//! Locking strategies for reserving lot stock inside a sale transaction
//!
//! Both strategies run inside a transaction opened by the caller and never
//! commit or roll it back themselves; the transaction boundary belongs to the
//! sale orchestrator.

use async_trait::async_trait;
use pharmaflow_shared::{SaleRequest, Strategy};
use rust_decimal::Decimal;

use crate::error::{SaleError, SaleResult};
use crate::store::{ConditionalDecrement, LedgerTx};

/// Stock reserved for a pending sale
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub lot_id: i64,
    pub quantity: i32,
    /// Medication price captured at reservation time
    pub unit_price: Decimal,
    /// Units left on the lot after this reservation
    pub remaining: i32,
    /// Lot version written by this reservation
    pub version: i64,
}

/// Attempt to reserve `quantity` units of a lot
#[async_trait]
pub trait LockingStrategy: Send + Sync {
    fn kind(&self) -> Strategy;

    async fn reserve<T: LedgerTx>(
        &self,
        tx: &mut T,
        lot_id: i64,
        quantity: i32,
    ) -> SaleResult<Reservation>;
}

async fn medication_price<T: LedgerTx>(tx: &mut T, lot_id: i64) -> SaleResult<Decimal> {
    tx.unit_price(lot_id)
        .await?
        .ok_or_else(|| SaleError::NotFound(format!("Medication for lot {}", lot_id)))
}

/// Exclusive row lock held until the transaction ends.
///
/// Correctness comes from mutual exclusion: every pessimistic attempt on the
/// same lot is serialized by the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PessimisticLocking;

#[async_trait]
impl LockingStrategy for PessimisticLocking {
    fn kind(&self) -> Strategy {
        Strategy::Pessimistic
    }

    async fn reserve<T: LedgerTx>(
        &self,
        tx: &mut T,
        lot_id: i64,
        quantity: i32,
    ) -> SaleResult<Reservation> {
        let lot = tx
            .lot_for_update(lot_id)
            .await?
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", lot_id)))?;

        if !lot.can_cover(quantity) {
            return Err(SaleError::InsufficientStock {
                requested: quantity,
                available: lot.quantity_available,
            });
        }

        let remaining = lot.quantity_available - quantity;
        tx.set_lot_quantity(lot_id, remaining).await?;
        let unit_price = medication_price(tx, lot_id).await?;

        tracing::debug!(lot_id, quantity, remaining, "Reserved stock under row lock");

        Ok(Reservation {
            lot_id,
            quantity,
            unit_price,
            remaining,
            version: lot.version + 1,
        })
    }
}

/// Version-stamped compare-and-swap.
///
/// Reads without locking and writes only if the lot still carries
/// `expected_version`. A lost race surfaces as `VersionConflict`; the caller
/// re-reads the version and decides whether to retry.
#[derive(Debug, Clone, Copy)]
pub struct OptimisticLocking {
    pub expected_version: i64,
}

impl OptimisticLocking {
    pub fn new(expected_version: i64) -> Self {
        Self { expected_version }
    }
}

#[async_trait]
impl LockingStrategy for OptimisticLocking {
    fn kind(&self) -> Strategy {
        Strategy::Optimistic
    }

    async fn reserve<T: LedgerTx>(
        &self,
        tx: &mut T,
        lot_id: i64,
        quantity: i32,
    ) -> SaleResult<Reservation> {
        let lot = tx
            .lot(lot_id)
            .await?
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", lot_id)))?;

        if !lot.can_cover(quantity) {
            return Err(SaleError::InsufficientStock {
                requested: quantity,
                available: lot.quantity_available,
            });
        }

        // The row may have moved on since the read; its guarded update decides.
        let remaining = match tx
            .decrement_if_version(lot_id, quantity, self.expected_version)
            .await?
        {
            ConditionalDecrement::Applied { remaining } => remaining,
            ConditionalDecrement::VersionMismatch => {
                return Err(SaleError::VersionConflict {
                    lot_id,
                    expected: self.expected_version,
                })
            }
            ConditionalDecrement::Insufficient { available } => {
                return Err(SaleError::InsufficientStock {
                    requested: quantity,
                    available,
                })
            }
        };

        let unit_price = medication_price(tx, lot_id).await?;

        tracing::debug!(
            lot_id,
            quantity,
            remaining,
            version = self.expected_version + 1,
            "Reserved stock by version check"
        );

        Ok(Reservation {
            lot_id,
            quantity,
            unit_price,
            remaining,
            version: self.expected_version + 1,
        })
    }
}

/// Strategy chosen for one request
#[derive(Debug, Clone, Copy)]
pub enum Locking {
    Pessimistic(PessimisticLocking),
    Optimistic(OptimisticLocking),
}

impl Locking {
    /// Pick the strategy a request asks for
    pub fn for_request(request: &SaleRequest) -> SaleResult<Self> {
        match request.strategy {
            Strategy::Pessimistic => Ok(Locking::Pessimistic(PessimisticLocking)),
            Strategy::Optimistic => {
                let expected_version =
                    request
                        .expected_version
                        .ok_or_else(|| SaleError::Validation {
                            field: "expected_version".to_string(),
                            message: "Expected version is required for the optimistic strategy"
                                .to_string(),
                        })?;
                Ok(Locking::Optimistic(OptimisticLocking::new(expected_version)))
            }
        }
    }
}

#[async_trait]
impl LockingStrategy for Locking {
    fn kind(&self) -> Strategy {
        match self {
            Locking::Pessimistic(s) => s.kind(),
            Locking::Optimistic(s) => s.kind(),
        }
    }

    async fn reserve<T: LedgerTx>(
        &self,
        tx: &mut T,
        lot_id: i64,
        quantity: i32,
    ) -> SaleResult<Reservation> {
        match self {
            Locking::Pessimistic(s) => s.reserve(tx, lot_id, quantity).await,
            Locking::Optimistic(s) => s.reserve(tx, lot_id, quantity).await,
        }
    }
}
