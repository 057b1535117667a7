//! Request/outcome contract of the sales core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Concurrency-control strategy used to reserve stock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Exclusive row lock held for the whole sale transaction
    Pessimistic,
    /// Version-stamped compare-and-swap, retried by the caller
    Optimistic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Pessimistic => "pessimistic",
            Strategy::Optimistic => "optimistic",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pessimistic" => Ok(Strategy::Pessimistic),
            "optimistic" => Ok(Strategy::Optimistic),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

/// A request to sell units from one lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct SaleRequest {
    pub lot_id: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub actor_id: i64,
    pub strategy: Strategy,
    /// Required for the optimistic strategy only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

impl SaleRequest {
    pub fn pessimistic(lot_id: i64, quantity: i32, actor_id: i64) -> Self {
        Self {
            lot_id,
            quantity,
            actor_id,
            strategy: Strategy::Pessimistic,
            expected_version: None,
        }
    }

    pub fn optimistic(lot_id: i64, quantity: i32, actor_id: i64, expected_version: i64) -> Self {
        Self {
            lot_id,
            quantity,
            actor_id,
            strategy: Strategy::Optimistic,
            expected_version: Some(expected_version),
        }
    }

    /// Same request against a freshly read version
    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Stable error codes surfaced to callers; transport mapping is theirs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InsufficientStock,
    VersionConflict,
    LockTimeout,
    ConnectionError,
    ValidationError,
    InsufficientPermissions,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::LockTimeout => "LOCK_TIMEOUT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of a sale attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl SaleOutcome {
    pub fn completed(sale_id: i64, total: Decimal) -> Self {
        Self {
            success: true,
            message: format!("Sale recorded. Total: ${}", total),
            sale_id: Some(sale_id),
            total: Some(total),
            error: None,
        }
    }

    pub fn failed(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            sale_id: None,
            total: None,
            error: Some(error),
        }
    }
}
