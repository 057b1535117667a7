//! Medication catalog models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A medication in the catalog. Its price is the unit price charged at sale time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub active_ingredient: String,
    pub price: Decimal,
    pub requires_prescription: bool,
}
