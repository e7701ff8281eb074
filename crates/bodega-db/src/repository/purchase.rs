//! # Purchase Repository
//!
//! Database operations for purchases, purchase lines and provider payments.
//!
//! ## Purchase Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Purchase Lifecycle                                │
//! │                                                                         │
//! │  1. CREATE DRAFT                                                       │
//! │     └── create() → Purchase { status: Draft } + lines                  │
//! │                                                                         │
//! │  2. SUBMIT                                                             │
//! │     └── transition(Draft → PendingDelivery)                            │
//! │                                                                         │
//! │  3. RECEIVE                                                            │
//! │     └── mark_received() → guarded UPDATE (WHERE status =               │
//! │         'pending_delivery'), so the transition commits AT MOST ONCE    │
//! │         even under concurrent retries                                  │
//! │                                                                         │
//! │  4. (ALTERNATIVE) CANCEL                                               │
//! │     └── from Draft or PendingDelivery only                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::ledger::LedgerRepository;
use bodega_core::{LedgerEntry, Payment, Purchase, PurchaseLine, PurchaseStatus};

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Inserts a purchase and its lines in one transaction.
    pub async fn create(&self, purchase: &Purchase, lines: &[PurchaseLine]) -> DbResult<()> {
        debug!(id = %purchase.id, provider_id = purchase.provider_id, "Inserting purchase");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, provider_id, subtotal_cents, discount_cents, total_cents,
                status, invoice_ref, delivery_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&purchase.id)
        .bind(purchase.provider_id)
        .bind(purchase.subtotal_cents)
        .bind(purchase.discount_cents)
        .bind(purchase.total_cents)
        .bind(purchase.status)
        .bind(&purchase.invoice_ref)
        .bind(purchase.delivery_date)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO purchase_lines (
                    id, purchase_id, product_id, size_id, color_id,
                    cost_cents, quantity, discount_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&line.id)
            .bind(&line.purchase_id)
            .bind(line.product_id)
            .bind(line.size_id)
            .bind(line.color_id)
            .bind(line.cost_cents)
            .bind(line.quantity)
            .bind(line.discount_cents)
            .bind(line.subtotal_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Inserts a purchase, its lines and the provider debit in ONE
    /// transaction.
    ///
    /// A purchase and its ledger debit are created together; there is no
    /// window in which one exists without the other. A zero-total purchase
    /// posts no debit and returns `None`.
    ///
    /// The caller must hold the provider's posting serialization (the engine
    /// does) so the appended seq cannot race another post.
    pub async fn create_with_debit(
        &self,
        purchase: &Purchase,
        lines: &[PurchaseLine],
    ) -> DbResult<Option<LedgerEntry>> {
        debug!(
            id = %purchase.id,
            provider_id = purchase.provider_id,
            total_cents = purchase.total_cents,
            "Inserting purchase with ledger debit"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, provider_id, subtotal_cents, discount_cents, total_cents,
                status, invoice_ref, delivery_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&purchase.id)
        .bind(purchase.provider_id)
        .bind(purchase.subtotal_cents)
        .bind(purchase.discount_cents)
        .bind(purchase.total_cents)
        .bind(purchase.status)
        .bind(&purchase.invoice_ref)
        .bind(purchase.delivery_date)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO purchase_lines (
                    id, purchase_id, product_id, size_id, color_id,
                    cost_cents, quantity, discount_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&line.id)
            .bind(&line.purchase_id)
            .bind(line.product_id)
            .bind(line.size_id)
            .bind(line.color_id)
            .bind(line.cost_cents)
            .bind(line.quantity)
            .bind(line.discount_cents)
            .bind(line.subtotal_cents)
            .execute(&mut *tx)
            .await?;
        }

        let entry = if purchase.total_cents > 0 {
            Some(
                LedgerRepository::append_in(
                    &mut tx,
                    purchase.provider_id,
                    purchase.total_cents,
                    0,
                    Some(&purchase.id),
                    None,
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;
        Ok(entry)
    }

    /// Inserts a payment and its provider credit in ONE transaction.
    ///
    /// The caller must hold the provider's posting serialization.
    pub async fn add_payment_with_credit(&self, payment: &Payment) -> DbResult<LedgerEntry> {
        debug!(
            id = %payment.id,
            provider_id = payment.provider_id,
            amount_cents = payment.amount_cents,
            "Recording payment with ledger credit"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, provider_id, purchase_id, amount_cents, method,
                reference, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(payment.provider_id)
        .bind(&payment.purchase_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        let entry = LedgerRepository::append_in(
            &mut tx,
            payment.provider_id,
            0,
            payment.amount_cents,
            payment.purchase_id.as_deref(),
            Some(&payment.id),
        )
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Gets a purchase by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT id, provider_id, subtotal_cents, discount_cents, total_cents,
                   status, invoice_ref, delivery_date, created_at, updated_at
            FROM purchases
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Gets all lines of a purchase.
    pub async fn lines(&self, purchase_id: &str) -> DbResult<Vec<PurchaseLine>> {
        let lines = sqlx::query_as::<_, PurchaseLine>(
            r#"
            SELECT id, purchase_id, product_id, size_id, color_id,
                   cost_cents, quantity, discount_cents, subtotal_cents
            FROM purchase_lines
            WHERE purchase_id = ?1
            ORDER BY id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists purchases in a given status, oldest first.
    pub async fn list_by_status(&self, status: PurchaseStatus) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT id, provider_id, subtotal_cents, discount_cents, total_cents,
                   status, invoice_ref, delivery_date, created_at, updated_at
            FROM purchases
            WHERE status = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(purchases)
    }

    /// Guarded status transition.
    ///
    /// Returns whether a row changed: `false` means the purchase was not in
    /// `from` (possibly raced by a concurrent transition). The caller decides
    /// how to report that.
    pub async fn transition(
        &self,
        id: &str,
        from: PurchaseStatus,
        to: PurchaseStatus,
    ) -> DbResult<bool> {
        debug!(id = %id, %from, %to, "Transitioning purchase");

        let result = sqlx::query(
            r#"
            UPDATE purchases SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks a pending purchase as received and stamps the delivery date.
    ///
    /// The `WHERE status = 'pending_delivery'` guard makes this commit at
    /// most once; a second call returns `false`.
    pub async fn mark_received(&self, id: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE purchases SET status = 'received', delivery_date = ?2, updated_at = ?2
            WHERE id = ?1 AND status = 'pending_delivery'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a provider payment.
    pub async fn add_payment(&self, payment: &Payment) -> DbResult<()> {
        debug!(
            id = %payment.id,
            provider_id = payment.provider_id,
            amount_cents = payment.amount_cents,
            "Recording payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, provider_id, purchase_id, amount_cents, method,
                reference, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(payment.provider_id)
        .bind(&payment.purchase_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets all payments against a purchase.
    pub async fn payments_for_purchase(&self, purchase_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, provider_id, purchase_id, amount_cents, method,
                   reference, notes, created_at
            FROM payments
            WHERE purchase_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Gets all payments to a provider (purchase-linked or general credits).
    pub async fn payments_for_provider(&self, provider_id: i64) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, provider_id, purchase_id, amount_cents, method,
                   reference, notes, created_at
            FROM payments
            WHERE provider_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Total amount paid against a purchase.
    pub async fn total_paid(&self, purchase_id: &str) -> DbResult<i64> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(amount_cents) FROM payments WHERE purchase_id = ?1")
                .bind(purchase_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(total.unwrap_or(0))
    }
}

/// Generates a new purchase id.
pub fn generate_purchase_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new purchase line id.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new payment id.
pub fn generate_payment_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use bodega_core::PaymentMethod;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn draft_purchase(id: &str, provider_id: i64, total_cents: i64) -> Purchase {
        let now = Utc::now();
        Purchase {
            id: id.to_string(),
            provider_id,
            subtotal_cents: total_cents,
            discount_cents: 0,
            total_cents,
            status: PurchaseStatus::Draft,
            invoice_ref: None,
            delivery_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(id: &str, purchase_id: &str, product_id: i64, quantity: i64) -> PurchaseLine {
        PurchaseLine {
            id: id.to_string(),
            purchase_id: purchase_id.to_string(),
            product_id,
            size_id: 1,
            color_id: 1,
            cost_cents: 100,
            quantity,
            discount_cents: 0,
            subtotal_cents: 100 * quantity,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let db = test_db().await;
        let repo = db.purchases();

        repo.create(
            &draft_purchase("p1", 7, 1000),
            &[line("l1", "p1", 1, 5), line("l2", "p1", 2, 5)],
        )
        .await
        .unwrap();

        let purchase = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Draft);
        assert_eq!(purchase.total_cents, 1000);
        assert_eq!(repo.lines("p1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_guarded_transition() {
        let db = test_db().await;
        let repo = db.purchases();
        repo.create(&draft_purchase("p1", 7, 1000), &[]).await.unwrap();

        assert!(repo
            .transition("p1", PurchaseStatus::Draft, PurchaseStatus::PendingDelivery)
            .await
            .unwrap());

        // Wrong source state changes nothing.
        assert!(!repo
            .transition("p1", PurchaseStatus::Draft, PurchaseStatus::Cancelled)
            .await
            .unwrap());

        let status = repo.get("p1").await.unwrap().unwrap().status;
        assert_eq!(status, PurchaseStatus::PendingDelivery);
    }

    #[tokio::test]
    async fn test_mark_received_commits_at_most_once() {
        let db = test_db().await;
        let repo = db.purchases();
        repo.create(&draft_purchase("p1", 7, 1000), &[]).await.unwrap();
        repo.transition("p1", PurchaseStatus::Draft, PurchaseStatus::PendingDelivery)
            .await
            .unwrap();

        assert!(repo.mark_received("p1").await.unwrap());
        assert!(!repo.mark_received("p1").await.unwrap());

        let purchase = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Received);
        assert!(purchase.delivery_date.is_some());
    }

    #[tokio::test]
    async fn test_payments_and_total_paid() {
        let db = test_db().await;
        let repo = db.purchases();
        repo.create(&draft_purchase("p1", 7, 1000), &[]).await.unwrap();

        for (id, amount) in [("pay1", 400), ("pay2", 250)] {
            repo.add_payment(&Payment {
                id: id.to_string(),
                provider_id: 7,
                purchase_id: Some("p1".to_string()),
                amount_cents: amount,
                method: PaymentMethod::Cash,
                reference: None,
                notes: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.total_paid("p1").await.unwrap(), 650);
        assert_eq!(repo.payments_for_purchase("p1").await.unwrap().len(), 2);
        assert_eq!(repo.payments_for_provider(7).await.unwrap().len(), 2);
        assert_eq!(repo.total_paid("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_with_debit_commits_both_or_neither() {
        let db = test_db().await;
        let repo = db.purchases();

        let entry = repo
            .create_with_debit(&draft_purchase("p1", 7, 1000), &[line("l1", "p1", 1, 5)])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.debit_cents, 1000);
        assert_eq!(entry.purchase_id.as_deref(), Some("p1"));
        assert_eq!(db.ledger().latest_balance_cents(7).await.unwrap(), 1000);

        // Re-inserting the same purchase id fails; the second debit must not
        // survive the rolled-back transaction.
        assert!(repo
            .create_with_debit(&draft_purchase("p1", 7, 500), &[])
            .await
            .is_err());
        assert_eq!(db.ledger().latest_balance_cents(7).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_add_payment_with_credit() {
        let db = test_db().await;
        let repo = db.purchases();
        repo.create_with_debit(&draft_purchase("p1", 7, 1000), &[])
            .await
            .unwrap();

        let entry = repo
            .add_payment_with_credit(&Payment {
                id: "pay1".to_string(),
                provider_id: 7,
                purchase_id: Some("p1".to_string()),
                amount_cents: 400,
                method: PaymentMethod::BankTransfer,
                reference: Some("TRX-99".to_string()),
                notes: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(entry.credit_cents, 400);
        assert_eq!(entry.payment_id.as_deref(), Some("pay1"));
        assert_eq!(db.ledger().latest_balance_cents(7).await.unwrap(), 600);
        assert_eq!(repo.total_paid("p1").await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let db = test_db().await;
        let repo = db.purchases();
        repo.create(&draft_purchase("p1", 7, 100), &[]).await.unwrap();
        repo.create(&draft_purchase("p2", 7, 200), &[]).await.unwrap();
        repo.transition("p2", PurchaseStatus::Draft, PurchaseStatus::PendingDelivery)
            .await
            .unwrap();

        let pending = repo.list_by_status(PurchaseStatus::PendingDelivery).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "p2");
    }
}
