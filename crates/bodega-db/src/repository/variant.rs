//! # Variant Repository
//!
//! Authoritative per-branch stock quantities.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Two Deliberately Distinct Write Paths                 │
//! │                                                                         │
//! │  apply_delta (audited)             set_quantity (manual correction)    │
//! │  ───────────────────────           ──────────────────────────────      │
//! │  Driven by stock movements.        Direct assignment, bypasses         │
//! │  Pre-checked: a delta that         movement audit. Used by the         │
//! │  would go negative fails with      update-stock correction surface.    │
//! │  InsufficientStock and writes      Still respects quantity >= 0.       │
//! │  nothing.                                                              │
//! │                                                                         │
//! │  Variants are never deleted, only zeroed, so historical movements      │
//! │  always keep a referent.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bodega_core::{BranchQuantity, CoreError, ProductStockSummary, Variant, VariantKey};

/// Repository for variant stock operations.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    /// Creates a new VariantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Gets a variant by its business key.
    pub async fn get(&self, key: &VariantKey) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, product_id, size_id, color_id, branch_id,
                   quantity, barcode, created_at, updated_at
            FROM variants
            WHERE product_id = ?1 AND size_id = ?2 AND color_id = ?3 AND branch_id = ?4
            "#,
        )
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(key.color_id)
        .bind(key.branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Gets a variant by its barcode.
    pub async fn find_by_barcode(&self, barcode: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, product_id, size_id, color_id, branch_id,
                   quantity, barcode, created_at, updated_at
            FROM variants
            WHERE barcode = ?1
            "#,
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Checks whether a barcode is already taken.
    ///
    /// Collision probe for the barcode generator.
    pub async fn barcode_exists(&self, barcode: &str) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM variants WHERE barcode = ?1")
                .bind(barcode)
                .fetch_one(&self.pool)
                .await?;

        Ok(count > 0)
    }

    /// Current quantity of a variant, 0 if the variant is unknown.
    pub async fn quantity(&self, key: &VariantKey) -> DbResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT quantity FROM variants
            WHERE product_id = ?1 AND size_id = ?2 AND color_id = ?3 AND branch_id = ?4
            "#,
        )
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(key.color_id)
        .bind(key.branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// Lists all variants held at a branch, heaviest stock first.
    pub async fn list_by_branch(&self, branch_id: i64) -> DbResult<Vec<Variant>> {
        let variants = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, product_id, size_id, color_id, branch_id,
                   quantity, barcode, created_at, updated_at
            FROM variants
            WHERE branch_id = ?1
            ORDER BY quantity DESC, product_id, size_id, color_id
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }

    /// Total and per-branch stock of one product.
    ///
    /// ## Arguments
    /// * `product_id` - Product to summarize
    /// * `branch_id` - Restrict to one branch when set
    pub async fn summarize_by_product(
        &self,
        product_id: i64,
        branch_id: Option<i64>,
    ) -> DbResult<ProductStockSummary> {
        let rows: Vec<(i64, i64)> = match branch_id {
            Some(branch) => {
                sqlx::query_as(
                    r#"
                    SELECT branch_id, SUM(quantity)
                    FROM variants
                    WHERE product_id = ?1 AND branch_id = ?2
                    GROUP BY branch_id
                    ORDER BY branch_id
                    "#,
                )
                .bind(product_id)
                .bind(branch)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT branch_id, SUM(quantity)
                    FROM variants
                    WHERE product_id = ?1
                    GROUP BY branch_id
                    ORDER BY branch_id
                    "#,
                )
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let per_branch: Vec<BranchQuantity> = rows
            .into_iter()
            .map(|(branch_id, quantity)| BranchQuantity {
                branch_id,
                quantity,
            })
            .collect();
        let total = per_branch.iter().map(|b| b.quantity).sum();

        Ok(ProductStockSummary {
            product_id,
            total,
            per_branch,
        })
    }

    /// Atomically adds `delta` (may be negative) to a variant's quantity.
    ///
    /// Fails with `InsufficientStock` before writing if the result would go
    /// negative. A positive delta on an unknown variant creates it, which
    /// requires `barcode_if_new`.
    pub async fn apply_delta(
        &self,
        key: &VariantKey,
        delta: i64,
        barcode_if_new: Option<&str>,
    ) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let quantity = Self::apply_delta_in(&mut tx, key, delta, barcode_if_new).await?;
        tx.commit().await?;

        debug!(variant = %key, delta, quantity, "Applied stock delta");
        Ok(quantity)
    }

    /// Delta application on an open connection/transaction.
    ///
    /// The movement repository composes several of these into one atomic
    /// transfer. Returns the resulting quantity.
    pub(crate) async fn apply_delta_in(
        conn: &mut SqliteConnection,
        key: &VariantKey,
        delta: i64,
        barcode_if_new: Option<&str>,
    ) -> DbResult<i64> {
        let existing: Option<(String, i64)> = sqlx::query_as(
            r#"
            SELECT id, quantity FROM variants
            WHERE product_id = ?1 AND size_id = ?2 AND color_id = ?3 AND branch_id = ?4
            "#,
        )
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(key.color_id)
        .bind(key.branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        match existing {
            Some((id, quantity)) => {
                let next = quantity + delta;
                if next < 0 {
                    return Err(CoreError::InsufficientStock {
                        variant: *key,
                        available: quantity,
                        requested: -delta,
                    }
                    .into());
                }

                sqlx::query("UPDATE variants SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
                    .bind(&id)
                    .bind(next)
                    .bind(Utc::now())
                    .execute(&mut *conn)
                    .await?;

                Ok(next)
            }
            None => {
                if delta < 0 {
                    return Err(CoreError::InsufficientStock {
                        variant: *key,
                        available: 0,
                        requested: -delta,
                    }
                    .into());
                }

                let barcode = barcode_if_new.ok_or_else(|| {
                    DbError::Internal(format!("no barcode provided for new variant {}", key))
                })?;
                Self::insert_in(conn, key, delta, barcode).await?;

                Ok(delta)
            }
        }
    }

    /// Inserts a fresh variant row on an open connection/transaction.
    async fn insert_in(
        conn: &mut SqliteConnection,
        key: &VariantKey,
        quantity: i64,
        barcode: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_id, size_id, color_id, branch_id,
                quantity, barcode, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(key.color_id)
        .bind(key.branch_id)
        .bind(quantity)
        .bind(barcode)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Creates a variant row with an initial quantity.
    pub async fn create(
        &self,
        key: &VariantKey,
        quantity: i64,
        barcode: &str,
    ) -> DbResult<Variant> {
        debug!(variant = %key, quantity, barcode, "Creating variant");

        let mut conn = self.pool.acquire().await?;
        Self::insert_in(&mut conn, key, quantity, barcode).await?;
        drop(conn);

        self.get(key).await?.ok_or_else(|| {
            DbError::Internal(format!("variant {} missing after insert", key))
        })
    }

    /// Directly sets a variant's quantity (manual correction path).
    ///
    /// Bypasses movement audit by design; see the module docs. Fails with
    /// NotFound when the variant does not exist.
    pub async fn set_quantity(&self, key: &VariantKey, quantity: i64) -> DbResult<()> {
        debug!(variant = %key, quantity, "Setting stock quantity directly");

        let result = sqlx::query(
            r#"
            UPDATE variants SET quantity = ?5, updated_at = ?6
            WHERE product_id = ?1 AND size_id = ?2 AND color_id = ?3 AND branch_id = ?4
            "#,
        )
        .bind(key.product_id)
        .bind(key.size_id)
        .bind(key.color_id)
        .bind(key.branch_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", key.to_string()));
        }

        Ok(())
    }

    /// Counts variant rows (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn key(product: i64, branch: i64) -> VariantKey {
        VariantKey {
            product_id: product,
            size_id: 1,
            color_id: 1,
            branch_id: branch,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_variant_has_zero_quantity() {
        let db = test_db().await;
        assert_eq!(db.variants().quantity(&key(1, 1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_delta_creates_and_accumulates() {
        let db = test_db().await;
        let repo = db.variants();
        let k = key(1, 1);

        assert_eq!(repo.apply_delta(&k, 10, Some("0000100100100000001")).await.unwrap(), 10);
        assert_eq!(repo.apply_delta(&k, 5, None).await.unwrap(), 15);
        assert_eq!(repo.quantity(&k).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_overdraw_fails_and_leaves_quantity_unchanged() {
        let db = test_db().await;
        let repo = db.variants();
        let k = key(1, 1);
        repo.create(&k, 3, "0000100100100000002").await.unwrap();

        let err = repo.apply_delta(&k, -5, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 3,
                requested: 5,
                ..
            })
        ));
        assert_eq!(repo.quantity(&k).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_negative_delta_on_unknown_variant_fails() {
        let db = test_db().await;
        let err = db.variants().apply_delta(&key(9, 9), -1, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_summarize_by_product() {
        let db = test_db().await;
        let repo = db.variants();
        repo.create(&key(7, 1), 4, "0000700100100000001").await.unwrap();
        repo.create(&key(7, 2), 6, "0000700100100000002").await.unwrap();
        repo.create(&key(8, 1), 9, "0000800100100000003").await.unwrap();

        let summary = repo.summarize_by_product(7, None).await.unwrap();
        assert_eq!(summary.total, 10);
        assert_eq!(summary.per_branch.len(), 2);

        let only_branch_2 = repo.summarize_by_product(7, Some(2)).await.unwrap();
        assert_eq!(only_branch_2.total, 6);
        assert_eq!(only_branch_2.per_branch.len(), 1);
        assert_eq!(only_branch_2.per_branch[0].branch_id, 2);
    }

    #[tokio::test]
    async fn test_set_quantity_is_a_direct_write() {
        let db = test_db().await;
        let repo = db.variants();
        let k = key(1, 1);
        repo.create(&k, 3, "0000100100100000003").await.unwrap();

        repo.set_quantity(&k, 42).await.unwrap();
        assert_eq!(repo.quantity(&k).await.unwrap(), 42);

        let missing = repo.set_quantity(&key(5, 5), 1).await.unwrap_err();
        assert!(matches!(missing, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_barcode_is_rejected() {
        let db = test_db().await;
        let repo = db.variants();
        repo.create(&key(1, 1), 1, "0000100100100000004").await.unwrap();

        let err = repo.create(&key(1, 2), 1, "0000100100100000004").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert!(repo.barcode_exists("0000100100100000004").await.unwrap());
    }
}
