//! Sale ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sale header. `total` is derived from the lines, never supplied by a caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: i64,
    pub actor_id: i64,
    pub total: Decimal,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a sale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    #[default]
    Completed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SaleStatus::Pending),
            "completed" => Some(SaleStatus::Completed),
            "cancelled" => Some(SaleStatus::Cancelled),
            _ => None,
        }
    }
}

/// A line item of a sale, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i32,
    /// Price snapshot taken at reservation time
    pub unit_price: Decimal,
}

impl SaleLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A sale together with its lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleWithLines {
    #[serde(flatten)]
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
}

impl SaleWithLines {
    /// Sum of the line subtotals
    pub fn computed_total(&self) -> Decimal {
        sale_total(&self.lines)
    }

    /// Whether the stored header total matches the lines
    pub fn is_consistent(&self) -> bool {
        self.sale.total == self.computed_total()
    }
}

/// Total of a set of sale lines
pub fn sale_total(lines: &[SaleLine]) -> Decimal {
    lines.iter().map(SaleLine::subtotal).sum()
}
