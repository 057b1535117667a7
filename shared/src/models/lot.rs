//! Lot models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tracked, finite quantity of one medication with an expiry date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub id: i64,
    pub medication_id: i64,
    /// Supplier lot number (e.g., "LOT-2026-0001")
    pub lot_number: String,
    /// Units available for sale, never negative
    pub quantity_available: i32,
    /// Bumped on every successful reservation; guard value for optimistic updates
    pub version: i64,
    pub expiry: NaiveDate,
    pub purchase_price: Decimal,
    pub supplier: Option<String>,
}

impl Lot {
    /// Whether the lot can cover `quantity` units
    pub fn can_cover(&self, quantity: i32) -> bool {
        quantity <= self.quantity_available
    }
}

/// Stock view of a lot joined with its medication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LotStock {
    pub lot: Lot,
    pub medication_name: String,
    pub unit_price: Decimal,
}

/// Build a lot number in the catalog's format
pub fn generate_lot_number(year: i32, sequence: i32) -> String {
    format!("LOT-{}-{:04}", year, sequence)
}
