//! Inventory queries over lot stock

use std::sync::Arc;

use chrono::NaiveDate;
use pharmaflow_shared::{validate_not_expired, Lot, LotStock};

use crate::error::{SaleError, SaleResult};
use crate::store::LedgerStore;

/// Inventory service for stock lookups and lot preparation
pub struct InventoryService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for InventoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> InventoryService<S> {
    /// Create a new InventoryService instance
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get a lot by id
    pub async fn get_lot(&self, lot_id: i64) -> SaleResult<Lot> {
        self.store
            .find_lot(lot_id)
            .await?
            .ok_or_else(|| SaleError::NotFound(format!("Lot {}", lot_id)))
    }

    /// List stock, optionally for one medication
    pub async fn list_stock(&self, medication_id: Option<i64>) -> SaleResult<Vec<LotStock>> {
        self.store.list_stock(medication_id).await
    }

    /// Total units available for a medication across all its lots
    pub async fn total_stock(&self, medication_id: i64) -> SaleResult<i64> {
        let lots = self.store.list_stock(Some(medication_id)).await?;
        Ok(lots
            .iter()
            .map(|s| i64::from(s.lot.quantity_available))
            .sum())
    }

    /// Lots of a medication that can still be sold on `today`, earliest expiry first
    pub async fn sellable_lots(
        &self,
        medication_id: i64,
        today: NaiveDate,
    ) -> SaleResult<Vec<Lot>> {
        let mut lots: Vec<Lot> = self
            .store
            .list_stock(Some(medication_id))
            .await?
            .into_iter()
            .map(|s| s.lot)
            .filter(|lot| {
                lot.quantity_available > 0 && validate_not_expired(lot.expiry, today).is_ok()
            })
            .collect();
        lots.sort_by_key(|lot| (lot.expiry, lot.id));
        Ok(lots)
    }

    /// Lots at or below `threshold` units
    pub async fn low_stock(&self, threshold: i32) -> SaleResult<Vec<LotStock>> {
        Ok(self
            .store
            .list_stock(None)
            .await?
            .into_iter()
            .filter(|s| s.lot.quantity_available <= threshold)
            .collect())
    }

    /// Put a lot into a known state before a measured run
    pub async fn prepare_lot(&self, lot_id: i64, quantity: i32, version: i64) -> SaleResult<()> {
        if quantity < 0 {
            return Err(SaleError::Validation {
                field: "quantity".to_string(),
                message: "Quantity cannot be negative".to_string(),
            });
        }
        if version < 0 {
            return Err(SaleError::Validation {
                field: "version".to_string(),
                message: "Version cannot be negative".to_string(),
            });
        }

        self.store.reset_lot(lot_id, quantity, version).await?;
        tracing::info!(lot_id, quantity, version, "Lot prepared");
        Ok(())
    }
}
