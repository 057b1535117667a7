//! Inventory service tests
//!
//! Tests for stock lookups including:
//! - Stock listing with medication names and prices
//! - Sellable lots ordered by expiry
//! - Lot preparation

mod common;

use chrono::NaiveDate;
use common::*;
use pharmaflow_sales::services::InventoryService;
use pharmaflow_sales::SaleError;
use pharmaflow_shared::{Lot, Medication};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn catalog() -> std::sync::Arc<pharmaflow_sales::store::MemoryLedgerStore> {
    let store = store_with_lot(10);
    store.add_medication(Medication {
        id: 2,
        name: "Amoxicillin 250mg".to_string(),
        active_ingredient: "Amoxicillin".to_string(),
        price: dec("8.90"),
        requires_prescription: true,
    });
    store
        .add_lot(Lot {
            expiry: date(2027, 1, 31),
            ..lot(2, 4)
        })
        .unwrap();
    store
        .add_lot(Lot {
            expiry: date(2026, 3, 1),
            ..lot(3, 6)
        })
        .unwrap();
    store
        .add_lot(Lot {
            medication_id: 2,
            ..lot(4, 0)
        })
        .unwrap();
    store
}

#[tokio::test]
async fn test_get_lot() {
    let inventory = InventoryService::new(catalog());

    let lot = inventory.get_lot(LOT_ID).await.unwrap();
    assert_eq!(lot.quantity_available, 10);

    let err = inventory.get_lot(42).await.unwrap_err();
    assert!(matches!(err, SaleError::NotFound(_)));
}

#[tokio::test]
async fn test_list_stock_joins_medication() {
    let inventory = InventoryService::new(catalog());

    let all = inventory.list_stock(None).await.unwrap();
    assert_eq!(all.len(), 4);

    let amoxicillin = inventory.list_stock(Some(2)).await.unwrap();
    assert_eq!(amoxicillin.len(), 1);
    assert_eq!(amoxicillin[0].medication_name, "Amoxicillin 250mg");
    assert_eq!(amoxicillin[0].unit_price, dec("8.90"));
}

#[tokio::test]
async fn test_total_stock() {
    let inventory = InventoryService::new(catalog());

    assert_eq!(inventory.total_stock(MEDICATION_ID).await.unwrap(), 20);
    assert_eq!(inventory.total_stock(2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sellable_lots_skip_expired_and_empty() {
    let inventory = InventoryService::new(catalog());

    let lots = inventory
        .sellable_lots(MEDICATION_ID, date(2026, 10, 17))
        .await
        .unwrap();
    let ids: Vec<i64> = lots.iter().map(|l| l.id).collect();
    // Lot 3 expired in March; lot 2 expires before lot 1
    assert_eq!(ids, vec![2, 1]);

    assert!(inventory.sellable_lots(2, date(2026, 10, 17)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_low_stock() {
    let inventory = InventoryService::new(catalog());

    let low: Vec<i64> = inventory
        .low_stock(5)
        .await
        .unwrap()
        .iter()
        .map(|s| s.lot.id)
        .collect();
    assert_eq!(low, vec![2, 4]);
}

#[tokio::test]
async fn test_prepare_lot() {
    let inventory = InventoryService::new(catalog());

    inventory.prepare_lot(LOT_ID, 15, 1).await.unwrap();
    let lot = inventory.get_lot(LOT_ID).await.unwrap();
    assert_eq!(lot.quantity_available, 15);
    assert_eq!(lot.version, 1);

    let err = inventory.prepare_lot(LOT_ID, -1, 1).await.unwrap_err();
    assert!(matches!(err, SaleError::Validation { .. }));

    let err = inventory.prepare_lot(99, 5, 1).await.unwrap_err();
    assert!(matches!(err, SaleError::NotFound(_)));
}

#[tokio::test]
async fn test_add_lot_rejects_negative_quantity_and_unknown_medication() {
    let store = store_with_lot(1);

    assert!(store.add_lot(lot(5, -1)).is_err());
    assert!(store
        .add_lot(Lot {
            medication_id: 77,
            ..lot(6, 1)
        })
        .is_err());
}

#[tokio::test]
async fn test_add_lot_validates_lot_number_and_purchase_price() {
    let store = store_with_lot(1);

    let err = store
        .add_lot(Lot {
            lot_number: "BATCH-1".to_string(),
            ..lot(5, 3)
        })
        .unwrap_err();
    assert!(matches!(err, SaleError::Validation { ref field, .. } if field == "lot_number"));

    let err = store
        .add_lot(Lot {
            purchase_price: dec("-0.50"),
            ..lot(6, 3)
        })
        .unwrap_err();
    assert!(matches!(err, SaleError::Validation { ref field, .. } if field == "purchase_price"));

    let inventory = InventoryService::new(store);
    assert!(matches!(
        inventory.get_lot(5).await.unwrap_err(),
        SaleError::NotFound(_)
    ));
    assert_eq!(inventory.total_stock(MEDICATION_ID).await.unwrap(), 1);
}
