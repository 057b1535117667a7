//! Validation utilities for the PharmaFlow sales ledger

use chrono::NaiveDate;
use rust_decimal::Decimal;
use validator::Validate;

use crate::types::{SaleRequest, Strategy};

// ============================================================================
// Sale Validations
// ============================================================================

/// Validate a sale quantity (must be a positive number of units)
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a sale request, including the per-strategy rules the derive cannot express
pub fn validate_sale_request(request: &SaleRequest) -> Result<(), (&'static str, &'static str)> {
    if request.validate().is_err() {
        return Err(("quantity", "Quantity must be positive"));
    }
    match (request.strategy, request.expected_version) {
        (Strategy::Optimistic, None) => Err((
            "expected_version",
            "Expected version is required for the optimistic strategy",
        )),
        (Strategy::Optimistic, Some(version)) if version < 0 => {
            Err(("expected_version", "Expected version cannot be negative"))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a unit or purchase price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    Ok(())
}

/// Validate lot number format (LOT-YYYY-NNNN)
pub fn validate_lot_number(lot_number: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = lot_number.split('-').collect();
    if parts.len() != 3 || parts[0] != "LOT" {
        return Err("Lot number must look like LOT-YYYY-NNNN");
    }
    if parts[1].len() != 4 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
        return Err("Lot number year must have 4 digits");
    }
    if parts[2].is_empty() || !parts[2].chars().all(|c| c.is_ascii_digit()) {
        return Err("Lot number sequence must be numeric");
    }
    Ok(())
}

/// Check whether a lot can still be sold on `today`
pub fn validate_not_expired(expiry: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if expiry < today {
        return Err("Lot has expired");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generate_lot_number;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn test_pessimistic_request_needs_no_version() {
        let request = SaleRequest::pessimistic(1, 2, 7);
        assert!(validate_sale_request(&request).is_ok());
    }

    #[test]
    fn test_optimistic_request_requires_version() {
        let mut request = SaleRequest::optimistic(1, 2, 7, 3);
        assert!(validate_sale_request(&request).is_ok());

        request.expected_version = None;
        let (field, _) = validate_sale_request(&request).unwrap_err();
        assert_eq!(field, "expected_version");
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let request = SaleRequest::pessimistic(1, 0, 7);
        let (field, _) = validate_sale_request(&request).unwrap_err();
        assert_eq!(field, "quantity");
    }

    #[test]
    fn test_negative_version_rejected() {
        let request = SaleRequest::optimistic(1, 1, 7, -1);
        assert!(validate_sale_request(&request).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Decimal::new(1250, 2)).is_ok());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn test_validate_lot_number() {
        assert!(validate_lot_number(&generate_lot_number(2026, 12)).is_ok());
        assert!(validate_lot_number("LOT-2026-0001").is_ok());
        assert!(validate_lot_number("LOT-26-0001").is_err());
        assert!(validate_lot_number("BATCH-2026-0001").is_err());
        assert!(validate_lot_number("LOT-2026-").is_err());
    }

    #[test]
    fn test_validate_not_expired() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        assert!(validate_not_expired(tomorrow, today).is_ok());
        assert!(validate_not_expired(today, today).is_ok());
        assert!(validate_not_expired(yesterday, today).is_err());
    }
}
