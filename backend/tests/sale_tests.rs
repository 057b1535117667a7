//! Sale orchestration tests
//!
//! Tests for the sale transaction including:
//! - All-or-nothing sale rows
//! - Audit trail after commit only
//! - Access policy gate
//! - Structured outcomes

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pharmaflow_sales::services::{RetryPolicy, RoleAccessPolicy, SaleService};
use pharmaflow_sales::store::{FaultPoint, LedgerStore};
use pharmaflow_sales::SaleError;
use pharmaflow_shared::{ErrorCode, Role, SaleRequest, SaleStatus};

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn test_committed_sale_rows_are_consistent() {
    let store = store_with_lot(10);
    let sales = sales(&store);

    let receipt = sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 3, 7))
        .await
        .unwrap();

    let sale = store.find_sale(receipt.sale_id).await.unwrap().unwrap();
    assert_eq!(sale.sale.actor_id, 7);
    assert_eq!(sale.sale.status, SaleStatus::Completed);
    assert_eq!(sale.sale.total, dec("7.50"));
    assert_eq!(sale.lines.len(), 1);
    assert_eq!(sale.lines[0].lot_id, LOT_ID);
    assert_eq!(sale.lines[0].quantity, 3);
    assert_eq!(sale.lines[0].unit_price, dec("2.50"));
    assert!(sale.is_consistent());
}

#[tokio::test]
async fn test_failure_after_reservation_rolls_everything_back() {
    for fault in [
        FaultPoint::InsertSale,
        FaultPoint::InsertSaleLine,
        FaultPoint::UpdateSaleTotal,
        FaultPoint::Commit,
    ] {
        for request in [
            SaleRequest::pessimistic(LOT_ID, 2, 7),
            SaleRequest::optimistic(LOT_ID, 2, 7, 1),
        ] {
            let store = store_with_lot(10);
            let sales = sales(&store);
            store.inject_fault(fault);

            let err = sales.execute_sale(&request).await.unwrap_err();
            assert!(matches!(err, SaleError::Internal(_)), "{:?}: {}", fault, err);

            let lot = store.find_lot(LOT_ID).await.unwrap().unwrap();
            assert_eq!(lot.quantity_available, 10, "{:?}", fault);
            assert_eq!(lot.version, 1, "{:?}", fault);
            assert_eq!(store.count_sales().await.unwrap(), 0, "{:?}", fault);
            assert!(store.sale_lines_for_lot(LOT_ID).is_empty());
            assert!(store.audit_log(None, 10).await.unwrap().is_empty());
        }
    }
}

#[tokio::test]
async fn test_lot_usable_after_failed_sale() {
    let store = store_with_lot_and_timeout(10, Duration::from_millis(100));
    let sales = sales(&store);

    store.inject_fault(FaultPoint::UpdateSaleTotal);
    sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 2, 7))
        .await
        .unwrap_err();
    store.clear_faults();

    let receipt = sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 2, 7))
        .await
        .unwrap();
    assert_eq!(receipt.remaining, 8);
}

// ============================================================================
// Audit Trail
// ============================================================================

#[tokio::test]
async fn test_audit_entry_written_after_commit() {
    let store = store_with_lot(10);
    let sales = sales(&store);

    let receipt = sales
        .execute_sale(&SaleRequest::optimistic(LOT_ID, 2, 42, 1))
        .await
        .unwrap();

    let entries = store.audit_log(Some(42), 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "sales_create");
    assert_eq!(entries[0].resource.as_deref(), Some("sales"));

    let details: serde_json::Value =
        serde_json::from_str(entries[0].details.as_deref().unwrap()).unwrap();
    assert_eq!(details["sale_id"], receipt.sale_id);
    assert_eq!(details["quantity"], 2);
    assert_eq!(details["strategy"], "optimistic");

    assert!(store.audit_log(Some(7), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_audit_entry_for_failed_sale() {
    let store = store_with_lot(1);
    let sales = sales(&store);

    sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 5, 7))
        .await
        .unwrap_err();

    assert!(store.audit_log(None, 10).await.unwrap().is_empty());
}

// ============================================================================
// Access Policy
// ============================================================================

#[tokio::test]
async fn test_access_policy_gates_sales() {
    let store = store_with_lot(10);
    let policy = RoleAccessPolicy::new()
        .with_role(1, Role::Pharmacist)
        .with_role(2, Role::Researcher);
    let sales = SaleService::with_policy(Arc::clone(&store), Arc::new(policy));

    sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 1, 1))
        .await
        .unwrap();

    let err = sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, SaleError::InsufficientPermissions(_)));

    let err = sales
        .execute_sale(&SaleRequest::pessimistic(LOT_ID, 1, 99))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientPermissions);

    let lot = store.find_lot(LOT_ID).await.unwrap().unwrap();
    assert_eq!(lot.quantity_available, 9);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_non_positive_quantity_rejected() {
    let store = store_with_lot(10);
    let sales = sales(&store);

    for quantity in [0, -3] {
        let err = sales
            .execute_sale(&SaleRequest::pessimistic(LOT_ID, quantity, 7))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    let lot = store.find_lot(LOT_ID).await.unwrap().unwrap();
    assert_eq!(lot.version, 1);
}

// ============================================================================
// Connectivity And Retry
// ============================================================================

#[tokio::test]
async fn test_retry_recovers_from_connection_errors() {
    let store = store_with_lot(10);
    let sales = sales(&store);
    store.fail_next_connections(2);

    let retry = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    };
    let outcome = sales
        .sell_with_retry(&SaleRequest::pessimistic(LOT_ID, 1, 7), &retry)
        .await;

    assert_eq!(outcome.attempts, 3);
    assert!(outcome.result.is_ok());
}

#[tokio::test]
async fn test_single_attempt_surfaces_connection_error() {
    let store = store_with_lot(10);
    let sales = sales(&store);
    store.fail_next_connections(1);

    let outcome = sales
        .sell_with_retry(&SaleRequest::pessimistic(LOT_ID, 1, 7), &RetryPolicy::single_attempt())
        .await;

    assert_eq!(outcome.attempts, 1);
    assert!(matches!(outcome.result, Err(SaleError::Connection(_))));
}

#[tokio::test]
async fn test_offline_store_reports_connection_error() {
    let store = store_with_lot(10);
    let sales = sales(&store);
    store.set_offline(true);

    let outcome = sales.sell(&SaleRequest::pessimistic(LOT_ID, 1, 7)).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error, Some(ErrorCode::ConnectionError));

    store.set_offline(false);
    assert!(sales.sell(&SaleRequest::pessimistic(LOT_ID, 1, 7)).await.success);
}

// ============================================================================
// Outcome Contract
// ============================================================================

#[tokio::test]
async fn test_outcome_json_shape() {
    let store = store_with_lot(5);
    let sales = sales(&store);

    let ok = sales.sell(&SaleRequest::pessimistic(LOT_ID, 3, 7)).await;
    assert!(ok.success);
    assert_eq!(ok.message, "Sale recorded. Total: $7.50");

    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["sale_id"], 1);
    assert!(json.get("error").is_none());

    let failed = sales.sell(&SaleRequest::pessimistic(LOT_ID, 3, 7)).await;
    let json = serde_json::to_value(&failed).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "INSUFFICIENT_STOCK");
    assert!(json.get("sale_id").is_none());
    assert!(json.get("total").is_none());
}
