//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pharmaflow_sales::services::SaleService;
use pharmaflow_sales::store::MemoryLedgerStore;
use pharmaflow_shared::{Lot, Medication};
use rust_decimal::Decimal;

pub const MEDICATION_ID: i64 = 1;
pub const LOT_ID: i64 = 1;

// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn paracetamol() -> Medication {
    Medication {
        id: MEDICATION_ID,
        name: "Paracetamol 500mg".to_string(),
        active_ingredient: "Paracetamol".to_string(),
        price: dec("2.50"),
        requires_prescription: false,
    }
}

pub fn lot(id: i64, quantity: i32) -> Lot {
    Lot {
        id,
        medication_id: MEDICATION_ID,
        lot_number: format!("LOT-2026-{:04}", id),
        quantity_available: quantity,
        version: 1,
        expiry: NaiveDate::from_ymd_opt(2028, 6, 30).unwrap(),
        purchase_price: dec("1.20"),
        supplier: Some("Acme Distribution".to_string()),
    }
}

/// Store holding one medication and one lot with `quantity` units at version 1
pub fn store_with_lot(quantity: i32) -> Arc<MemoryLedgerStore> {
    store_with_lot_and_timeout(quantity, Duration::from_secs(5))
}

pub fn store_with_lot_and_timeout(
    quantity: i32,
    lock_timeout: Duration,
) -> Arc<MemoryLedgerStore> {
    let store = MemoryLedgerStore::new(lock_timeout);
    store.add_medication(paracetamol());
    store.add_lot(lot(LOT_ID, quantity)).unwrap();
    Arc::new(store)
}

pub fn sales(store: &Arc<MemoryLedgerStore>) -> SaleService<MemoryLedgerStore> {
    SaleService::new(Arc::clone(store))
}
