//! # Stock Movement Repository
//!
//! Persistence for the immutable movement audit trail, and the transactional
//! core of a transfer.
//!
//! ## Transfer Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     One Transfer, One Transaction                       │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    1. Pre-check EVERY source quantity                                  │
//! │       └── any shortfall → InsufficientStock, ROLLBACK, nothing moved   │
//! │    2. For each item: decrement source (if any), increment destination  │
//! │    3. Insert movement header + items (immutable audit facts)           │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Two transfers touching disjoint variants may run in parallel; two     │
//! │  touching an overlapping variant serialize on SQLite's single writer.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::variant::VariantRepository;
use bodega_core::{CoreError, MovementItem, StockMovement, TransferItem, VariantKey};

/// Repository for stock movement operations.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Gets a movement header by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<StockMovement>> {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, from_branch_id, to_branch_id, notes, actor, created_at
            FROM stock_movements
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movement)
    }

    /// Checks whether a movement id was already committed (retry dedup).
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Gets all items of a movement.
    pub async fn items(&self, movement_id: &str) -> DbResult<Vec<MovementItem>> {
        let items = sqlx::query_as::<_, MovementItem>(
            r#"
            SELECT id, movement_id, product_id, size_id, color_id, quantity
            FROM stock_movement_items
            WHERE movement_id = ?1
            ORDER BY id
            "#,
        )
        .bind(movement_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Movement history touching a branch (as source or destination),
    /// newest first.
    pub async fn list_for_branch(&self, branch_id: i64, limit: u32) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, from_branch_id, to_branch_id, notes, actor, created_at
            FROM stock_movements
            WHERE from_branch_id = ?1 OR to_branch_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Applies a movement atomically: pre-check, quantity deltas, audit rows.
    ///
    /// ## Arguments
    /// * `movement` - Header to record (id decides retry identity)
    /// * `items` - Lines to move; all succeed or none do
    /// * `new_barcodes` - Barcodes for destination variants that do not exist
    ///   yet, keyed by destination variant key
    ///
    /// ## Errors
    /// * `InsufficientStock` (as `DbError::Domain`) names the first offending
    ///   variant; no quantity is written in that case.
    pub async fn apply(
        &self,
        movement: &StockMovement,
        items: &[TransferItem],
        new_barcodes: &HashMap<VariantKey, String>,
    ) -> DbResult<()> {
        debug!(
            movement_id = %movement.id,
            from = ?movement.from_branch_id,
            to = movement.to_branch_id,
            items = items.len(),
            "Applying stock movement"
        );

        let mut tx = self.pool.begin().await?;

        // Pre-check all sources in one pass before any write.
        if let Some(from_branch) = movement.from_branch_id {
            for item in items {
                let key = item.variant_key(from_branch);
                let available: Option<i64> = sqlx::query_scalar(
                    r#"
                    SELECT quantity FROM variants
                    WHERE product_id = ?1 AND size_id = ?2 AND color_id = ?3 AND branch_id = ?4
                    "#,
                )
                .bind(key.product_id)
                .bind(key.size_id)
                .bind(key.color_id)
                .bind(key.branch_id)
                .fetch_optional(&mut *tx)
                .await?;

                let available = available.unwrap_or(0);
                if available < item.quantity {
                    return Err(CoreError::InsufficientStock {
                        variant: key,
                        available,
                        requested: item.quantity,
                    }
                    .into());
                }
            }
        }

        // Apply the deltas.
        for item in items {
            if let Some(from_branch) = movement.from_branch_id {
                VariantRepository::apply_delta_in(
                    &mut tx,
                    &item.variant_key(from_branch),
                    -item.quantity,
                    None,
                )
                .await?;
            }

            let dest = item.variant_key(movement.to_branch_id);
            VariantRepository::apply_delta_in(
                &mut tx,
                &dest,
                item.quantity,
                new_barcodes.get(&dest).map(String::as_str),
            )
            .await?;
        }

        // Record the immutable audit facts.
        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, from_branch_id, to_branch_id, notes, actor, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&movement.id)
        .bind(movement.from_branch_id)
        .bind(movement.to_branch_id)
        .bind(&movement.notes)
        .bind(&movement.actor)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO stock_movement_items (id, movement_id, product_id, size_id, color_id, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&movement.id)
            .bind(item.product_id)
            .bind(item.size_id)
            .bind(item.color_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            receipt = movement.is_receipt(),
            "Stock movement committed"
        );
        Ok(())
    }
}

/// Generates a new movement id.
pub fn generate_movement_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn item(product: i64, quantity: i64) -> TransferItem {
        TransferItem {
            product_id: product,
            size_id: 1,
            color_id: 1,
            quantity,
        }
    }

    fn movement(id: &str, from: Option<i64>, to: i64) -> StockMovement {
        StockMovement {
            id: id.to_string(),
            from_branch_id: from,
            to_branch_id: to,
            notes: None,
            actor: Some("tester".to_string()),
            created_at: Utc::now(),
        }
    }

    fn barcodes(entries: &[(i64, i64, &str)]) -> HashMap<VariantKey, String> {
        entries
            .iter()
            .map(|&(product, branch, code)| {
                (
                    VariantKey {
                        product_id: product,
                        size_id: 1,
                        color_id: 1,
                        branch_id: branch,
                    },
                    code.to_string(),
                )
            })
            .collect()
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_receipt_creates_destination_variants() {
        let db = test_db().await;
        let repo = db.movements();

        repo.apply(
            &movement("m1", None, 5),
            &[item(1, 10)],
            &barcodes(&[(1, 5, "0000100100100000010")]),
        )
        .await
        .unwrap();

        let key = item(1, 10).variant_key(5);
        assert_eq!(db.variants().quantity(&key).await.unwrap(), 10);
        assert!(repo.exists("m1").await.unwrap());
        assert_eq!(repo.items("m1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_between_branches() {
        let db = test_db().await;
        let repo = db.movements();

        repo.apply(
            &movement("m1", None, 1),
            &[item(1, 10)],
            &barcodes(&[(1, 1, "0000100100100000011")]),
        )
        .await
        .unwrap();

        repo.apply(
            &movement("m2", Some(1), 2),
            &[item(1, 4)],
            &barcodes(&[(1, 2, "0000100100100000012")]),
        )
        .await
        .unwrap();

        assert_eq!(db.variants().quantity(&item(1, 0).variant_key(1)).await.unwrap(), 6);
        assert_eq!(db.variants().quantity(&item(1, 0).variant_key(2)).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_insufficient_item_fails_whole_movement() {
        let db = test_db().await;
        let repo = db.movements();

        repo.apply(
            &movement("m1", None, 1),
            &[item(1, 10), item(2, 1)],
            &barcodes(&[(1, 1, "0000100100100000013"), (2, 1, "0000200100100000014")]),
        )
        .await
        .unwrap();

        // Item for product 2 over-draws: the whole movement must be a no-op.
        let err = repo
            .apply(
                &movement("m2", Some(1), 2),
                &[item(1, 5), item(2, 3)],
                &barcodes(&[(1, 2, "0000100100100000015"), (2, 2, "0000200100100000016")]),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 1,
                requested: 3,
                ..
            })
        ));
        assert_eq!(db.variants().quantity(&item(1, 0).variant_key(1)).await.unwrap(), 10);
        assert_eq!(db.variants().quantity(&item(2, 0).variant_key(1)).await.unwrap(), 1);
        assert_eq!(db.variants().quantity(&item(1, 0).variant_key(2)).await.unwrap(), 0);
        assert!(!repo.exists("m2").await.unwrap());
    }

    #[tokio::test]
    async fn test_conservation_across_transfer() {
        let db = test_db().await;
        let repo = db.movements();

        repo.apply(
            &movement("m1", None, 1),
            &[item(1, 8)],
            &barcodes(&[(1, 1, "0000100100100000017")]),
        )
        .await
        .unwrap();

        let before = db.variants().summarize_by_product(1, None).await.unwrap().total;

        repo.apply(
            &movement("m2", Some(1), 2),
            &[item(1, 3)],
            &barcodes(&[(1, 2, "0000100100100000018")]),
        )
        .await
        .unwrap();

        let after = db.variants().summarize_by_product(1, None).await.unwrap().total;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_branch_history_lists_both_directions() {
        let db = test_db().await;
        let repo = db.movements();

        repo.apply(
            &movement("m1", None, 1),
            &[item(1, 5)],
            &barcodes(&[(1, 1, "0000100100100000019")]),
        )
        .await
        .unwrap();
        repo.apply(
            &movement("m2", Some(1), 2),
            &[item(1, 2)],
            &barcodes(&[(1, 2, "0000100100100000020")]),
        )
        .await
        .unwrap();

        let history = repo.list_for_branch(1, 10).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"m1"));
        assert!(ids.contains(&"m2"));

        let branch_2 = repo.list_for_branch(2, 10).await.unwrap();
        assert_eq!(branch_2.len(), 1);
        assert_eq!(branch_2[0].id, "m2");
    }
}
