//! End-to-end scenarios over the wired engine: the conservation, atomicity,
//! idempotency and cache-coverage properties the services promise.

use bodega_core::{
    CoreError, FamilyGroup, Money, NewPayment, NewPurchase, NewPurchaseLine, PaymentMethod,
    PurchaseStatus, TransferItem, TransferRequest, VariantKey,
};
use bodega_db::{Database, DbConfig};
use bodega_engine::{Backoffice, CacheConfig, EngineError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn office_with_db() -> (Backoffice, Database) {
    init_tracing();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    (Backoffice::new(db.clone(), CacheConfig::default()), db)
}

fn key(product: i64, branch: i64) -> VariantKey {
    VariantKey {
        product_id: product,
        size_id: 1,
        color_id: 1,
        branch_id: branch,
    }
}

fn items(entries: &[(i64, i64)]) -> Vec<TransferItem> {
    entries
        .iter()
        .map(|&(product, quantity)| TransferItem {
            product_id: product,
            size_id: 1,
            color_id: 1,
            quantity,
        })
        .collect()
}

fn transfer(from: Option<i64>, to: i64, entries: &[(i64, i64)]) -> TransferRequest {
    TransferRequest {
        movement_id: None,
        from_branch_id: from,
        to_branch_id: to,
        items: items(entries),
        notes: None,
        actor: Some("tester".to_string()),
    }
}

fn one_line_purchase(provider_id: i64, product_id: i64, quantity: i64, cost_cents: i64) -> NewPurchase {
    NewPurchase {
        provider_id,
        invoice_ref: Some("INV-0001".to_string()),
        discount_cents: 0,
        lines: vec![NewPurchaseLine {
            product_id,
            size_id: 2,
            color_id: 3,
            cost_cents,
            quantity,
            discount_cents: 0,
        }],
    }
}

// =============================================================================
// The reference scenario: purchase → debit → payment → receive
// =============================================================================

#[tokio::test]
async fn purchase_payment_receive_lifecycle() {
    let (office, _db) = office_with_db().await;
    let provider = 9;

    assert_eq!(office.ledger.balance(provider).await.unwrap(), Money::zero());

    // Purchase of 10 units at $1.00 → debit 1000.
    let purchase = office
        .purchasing
        .create(one_line_purchase(provider, 42, 10, 100))
        .await
        .unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Draft);
    assert_eq!(purchase.total_cents, 1000);
    assert_eq!(
        office.ledger.balance(provider).await.unwrap(),
        Money::from_cents(1000)
    );

    office.purchasing.submit(&purchase.id).await.unwrap();
    let pending = office.purchasing.pending_deliveries().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, purchase.id);

    // Pay 400 against the purchase → balance 600.
    let payment = office
        .purchasing
        .record_payment(NewPayment {
            provider_id: provider,
            purchase_id: Some(purchase.id.clone()),
            amount_cents: 400,
            method: PaymentMethod::BankTransfer,
            reference: Some("TRX-77".to_string()),
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(
        office.ledger.balance(provider).await.unwrap(),
        Money::from_cents(600)
    );
    assert_eq!(
        office.purchasing.outstanding(&purchase.id).await.unwrap(),
        Money::from_cents(600)
    );

    // Receive into branch 5: variant goes 0 → 10.
    let variant = VariantKey {
        product_id: 42,
        size_id: 2,
        color_id: 3,
        branch_id: 5,
    };
    assert_eq!(office.stock.quantity(&variant).await.unwrap(), 0);

    let movement_id = office.purchasing.receive(&purchase.id, 5).await.unwrap();
    assert_eq!(office.stock.quantity(&variant).await.unwrap(), 10);

    let movement = office.stock.movement(&movement_id).await.unwrap();
    assert!(movement.is_receipt());
    assert_eq!(office.stock.movement_items(&movement_id).await.unwrap().len(), 1);

    // Second receive: AlreadyReceived, stock credited exactly once.
    let err = office.purchasing.receive(&purchase.id, 5).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::AlreadyReceived { .. })
    ));
    assert_eq!(office.stock.quantity(&variant).await.unwrap(), 10);

    let received = office.purchasing.get(&purchase.id).await.unwrap();
    assert_eq!(received.status, PurchaseStatus::Received);
    assert!(received.delivery_date.is_some());
    assert!(office.purchasing.pending_deliveries().await.unwrap().is_empty());

    // Ledger: debit then credit, every prefix balance correct.
    let entries = office.ledger.movements(provider).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_debit());
    assert_eq!(entries[0].purchase_id.as_deref(), Some(purchase.id.as_str()));
    assert!(entries[1].is_credit());
    assert_eq!(entries[1].payment_id.as_deref(), Some(payment.id.as_str()));
    assert!(office.ledger.validate(provider).await.unwrap().valid);
}

// =============================================================================
// Conservation and atomicity
// =============================================================================

#[tokio::test]
async fn transfer_conserves_total_stock() {
    let (office, _db) = office_with_db().await;

    office
        .stock
        .transfer(transfer(None, 1, &[(1, 20), (2, 8)]))
        .await
        .unwrap();

    let total_before: i64 = office.stock.product_summary(1, None).await.unwrap().total
        + office.stock.product_summary(2, None).await.unwrap().total;

    office
        .stock
        .transfer(transfer(Some(1), 2, &[(1, 7), (2, 3)]))
        .await
        .unwrap();

    let summary_1 = office.stock.product_summary(1, None).await.unwrap();
    let summary_2 = office.stock.product_summary(2, None).await.unwrap();
    assert_eq!(summary_1.total + summary_2.total, total_before);
    assert_eq!(office.stock.quantity(&key(1, 1)).await.unwrap(), 13);
    assert_eq!(office.stock.quantity(&key(1, 2)).await.unwrap(), 7);
}

#[tokio::test]
async fn insufficient_item_rolls_back_whole_transfer() {
    let (office, _db) = office_with_db().await;

    office
        .stock
        .transfer(transfer(None, 1, &[(1, 10), (2, 2)]))
        .await
        .unwrap();

    let err = office
        .stock
        .transfer(transfer(Some(1), 2, &[(1, 4), (2, 5)]))
        .await
        .unwrap_err();

    match err {
        EngineError::Core(CoreError::InsufficientStock {
            variant,
            available,
            requested,
        }) => {
            assert_eq!(variant.product_id, 2);
            assert_eq!(variant.branch_id, 1);
            assert_eq!(available, 2);
            assert_eq!(requested, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // All N variants unchanged, nothing landed at the destination.
    assert_eq!(office.stock.quantity(&key(1, 1)).await.unwrap(), 10);
    assert_eq!(office.stock.quantity(&key(2, 1)).await.unwrap(), 2);
    assert_eq!(office.stock.quantity(&key(1, 2)).await.unwrap(), 0);
    assert_eq!(office.stock.quantity(&key(2, 2)).await.unwrap(), 0);
}

#[tokio::test]
async fn transfer_with_supplied_id_deduplicates_retries() {
    let (office, _db) = office_with_db().await;

    office
        .stock
        .transfer(transfer(None, 1, &[(1, 10)]))
        .await
        .unwrap();

    let mut request = transfer(Some(1), 2, &[(1, 4)]);
    request.movement_id = Some("move-abc".to_string());

    let first = office.stock.transfer(request.clone()).await.unwrap();
    let second = office.stock.transfer(request).await.unwrap();

    assert_eq!(first, "move-abc");
    assert_eq!(second, "move-abc");
    // Applied once, not twice.
    assert_eq!(office.stock.quantity(&key(1, 1)).await.unwrap(), 6);
    assert_eq!(office.stock.quantity(&key(1, 2)).await.unwrap(), 4);
}

#[tokio::test]
async fn empty_transfer_is_rejected() {
    let (office, _db) = office_with_db().await;

    let err = office
        .stock
        .transfer(transfer(Some(1), 2, &[]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::Validation(_))
    ));
}

// =============================================================================
// Cache coverage
// =============================================================================

#[tokio::test]
async fn summary_is_memoized_until_a_mutation_invalidates_it() {
    let (office, db) = office_with_db().await;
    let k = key(1, 1);

    office
        .stock
        .transfer(transfer(None, 1, &[(1, 10)]))
        .await
        .unwrap();
    assert_eq!(office.stock.product_summary(1, None).await.unwrap().total, 10);

    // A write that bypasses the engine is invisible: the cache serves the
    // memoized summary. This is what makes invalidation coverage a
    // correctness property rather than a freshness tweak.
    db.variants().set_quantity(&k, 99).await.unwrap();
    assert_eq!(office.stock.product_summary(1, None).await.unwrap().total, 10);

    // The engine's own write path invalidates, so the next read is fresh.
    office.stock.set_quantity(&k, 25).await.unwrap();
    assert_eq!(office.stock.product_summary(1, None).await.unwrap().total, 25);
}

#[tokio::test]
async fn branch_reads_refresh_after_each_movement() {
    let (office, _db) = office_with_db().await;

    office
        .stock
        .transfer(transfer(None, 1, &[(1, 5)]))
        .await
        .unwrap();
    assert_eq!(office.stock.variants_in_branch(1).await.unwrap().len(), 1);
    assert!(office.stock.variants_in_branch(2).await.unwrap().is_empty());

    office
        .stock
        .transfer(transfer(Some(1), 2, &[(1, 2)]))
        .await
        .unwrap();

    let at_source = office.stock.variants_in_branch(1).await.unwrap();
    let at_dest = office.stock.variants_in_branch(2).await.unwrap();
    assert_eq!(at_source[0].quantity, 3);
    assert_eq!(at_dest.len(), 1);
    assert_eq!(at_dest[0].quantity, 2);
}

#[tokio::test]
async fn balance_reads_refresh_after_each_posting() {
    let (office, _db) = office_with_db().await;
    let provider = 4;

    office
        .ledger
        .post_debit(provider, Money::from_cents(500), None)
        .await
        .unwrap();
    assert_eq!(
        office.ledger.balance(provider).await.unwrap(),
        Money::from_cents(500)
    );

    office
        .ledger
        .post_credit(provider, Money::from_cents(200), None, None)
        .await
        .unwrap();
    assert_eq!(
        office.ledger.balance(provider).await.unwrap(),
        Money::from_cents(300)
    );
    assert_eq!(office.ledger.movements(provider).await.unwrap().len(), 2);
}

// =============================================================================
// Ledger drift
// =============================================================================

#[tokio::test]
async fn drift_is_detected_then_repaired_explicitly() {
    let (office, db) = office_with_db().await;
    let provider = 6;

    office
        .ledger
        .post_debit(provider, Money::from_cents(1000), None)
        .await
        .unwrap();
    let corrupted = office
        .ledger
        .post_credit(provider, Money::from_cents(300), None, None)
        .await
        .unwrap();
    assert!(office.ledger.require_balanced(provider).await.is_ok());

    // Out-of-band corruption of a stored running balance.
    sqlx::query("UPDATE provider_ledger SET balance_cents = 123 WHERE id = ?1")
        .bind(&corrupted.id)
        .execute(db.pool())
        .await
        .unwrap();
    office.cache.clear().await;

    let report = office.ledger.validate(provider).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.expected_cents, 700);

    let err = office.ledger.require_balanced(provider).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::LedgerImbalance {
            expected_cents: 700,
            ..
        })
    ));

    // Detection never repairs; repair is the explicit recalculate call.
    assert!(!office.ledger.validate(provider).await.unwrap().valid);
    let repaired = office.ledger.recalculate(provider).await.unwrap();
    assert_eq!(repaired, Money::from_cents(700));
    assert!(office.ledger.validate(provider).await.unwrap().valid);
    assert_eq!(
        office.ledger.balance(provider).await.unwrap(),
        Money::from_cents(700)
    );
}

// =============================================================================
// Purchase workflow edges
// =============================================================================

#[tokio::test]
async fn wrong_state_transitions_are_rejected() {
    let (office, _db) = office_with_db().await;

    let purchase = office
        .purchasing
        .create(one_line_purchase(1, 1, 5, 100))
        .await
        .unwrap();

    // Receive before submit: still a draft.
    let err = office.purchasing.receive(&purchase.id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InvalidState {
            current: PurchaseStatus::Draft,
            ..
        })
    ));

    office.purchasing.submit(&purchase.id).await.unwrap();
    let err = office.purchasing.submit(&purchase.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::InvalidState { .. })));

    let cancelled = office.purchasing.cancel(&purchase.id).await.unwrap();
    assert_eq!(cancelled.status, PurchaseStatus::Cancelled);

    // A cancelled purchase can be neither received nor cancelled again.
    let err = office.purchasing.receive(&purchase.id, 1).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::InvalidState { .. })));
    let err = office.purchasing.cancel(&purchase.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::InvalidState { .. })));

    let err = office.purchasing.receive("no-such-purchase", 1).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn payment_validation_edges() {
    let (office, _db) = office_with_db().await;

    let purchase = office
        .purchasing
        .create(one_line_purchase(1, 1, 5, 100))
        .await
        .unwrap();

    // Payment against someone else's purchase.
    let err = office
        .purchasing
        .record_payment(NewPayment {
            provider_id: 2,
            purchase_id: Some(purchase.id.clone()),
            amount_cents: 100,
            method: PaymentMethod::Cash,
            reference: None,
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

    // General account credit, no purchase link.
    office
        .purchasing
        .record_payment(NewPayment {
            provider_id: 1,
            purchase_id: None,
            amount_cents: 150,
            method: PaymentMethod::Cash,
            reference: None,
            notes: Some("a cuenta".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(
        office.ledger.balance(1).await.unwrap(),
        Money::from_cents(350)
    );
}

#[tokio::test]
async fn line_barcodes_derive_without_touching_stock() {
    let (office, _db) = office_with_db().await;

    let purchase = office
        .purchasing
        .create(one_line_purchase(1, 42, 10, 100))
        .await
        .unwrap();

    let codes = office.purchasing.generate_barcodes(&purchase.id).await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].quantity, 10);
    assert_eq!(codes[0].barcode.len(), bodega_core::barcode::BARCODE_LEN);

    // Read/derive only: no stock landed anywhere.
    let summary = office.stock.product_summary(42, None).await.unwrap();
    assert_eq!(summary.total, 0);

    let err = office
        .purchasing
        .generate_barcodes("no-such-purchase")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound { .. })));
}

// =============================================================================
// Manual correction path
// =============================================================================

#[tokio::test]
async fn set_quantity_creates_missing_variant_with_barcode() {
    let (office, _db) = office_with_db().await;
    let k = key(3, 2);

    office.stock.set_quantity(&k, 12).await.unwrap();
    assert_eq!(office.stock.quantity(&k).await.unwrap(), 12);

    let listed = office.stock.variants_in_branch(2).await.unwrap();
    assert_eq!(listed.len(), 1);
    let found = office
        .stock
        .variant_by_barcode(&listed[0].barcode)
        .await
        .unwrap();
    assert_eq!(found.key(), k);

    let err = office.stock.set_quantity(&k, -1).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
}

// =============================================================================
// Family groups
// =============================================================================

#[tokio::test]
async fn group_forest_promotes_dangling_parents_and_scopes_queries() {
    let (office, _db) = office_with_db().await;

    for (id, name, parent) in [
        (1, "Ropa", None),
        (2, "Camisas", Some(1)),
        (3, "Pantalones", Some(1)),
        (4, "Huérfano", Some(99)), // parent never synced
    ] {
        office
            .groups
            .add_group(FamilyGroup {
                id,
                name: name.to_string(),
                parent_group_id: parent,
                marked_as_root: parent.is_none(),
            })
            .await
            .unwrap();
    }

    let trees = office.groups.trees().await.unwrap();
    let root_ids: Vec<i64> = trees.iter().map(|t| t.id).collect();
    assert_eq!(root_ids, vec![1, 4]);
    assert_eq!(trees[0].children.len(), 2);

    let mut scope = office.groups.scope_ids(1).await.unwrap();
    scope.sort_unstable();
    assert_eq!(scope, vec![1, 2, 3]);

    // New group invalidates the cached forest.
    office
        .groups
        .add_group(FamilyGroup {
            id: 5,
            name: "Polos".to_string(),
            parent_group_id: Some(2),
            marked_as_root: false,
        })
        .await
        .unwrap();
    let mut scope = office.groups.scope_ids(1).await.unwrap();
    scope.sort_unstable();
    assert_eq!(scope, vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn cyclic_groups_fail_the_forest_and_are_not_cached() {
    let (office, db) = office_with_db().await;

    // A cycle can only arrive out-of-band; the builder must reject it.
    for (id, parent) in [(1, Some(2)), (2, Some(1))] {
        db.groups()
            .insert(&FamilyGroup {
                id,
                name: format!("G{}", id),
                parent_group_id: parent,
                marked_as_root: false,
            })
            .await
            .unwrap();
    }

    let err = office.groups.forest().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InvalidHierarchy { .. })
    ));

    // The failure was not memoized: repairing the rows repairs the read.
    sqlx::query("UPDATE family_groups SET parent_group_id = NULL WHERE id = 1")
        .execute(db.pool())
        .await
        .unwrap();
    let forest = office.groups.forest().await.unwrap();
    assert_eq!(forest.len(), 2);
}
