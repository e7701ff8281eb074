//! # Provider Ledger Repository
//!
//! Append-only debit/credit postings with a running balance per provider.
//!
//! ## Posting Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Append One Entry                                  │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    1. Read latest (seq, balance) for the provider                      │
//! │    2. next_seq = seq + 1 (or 1)                                        │
//! │    3. balance = balance + debit - credit                               │
//! │    4. INSERT entry                                                     │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  The engine serializes posts per provider; UNIQUE(provider_id, seq)    │
//! │  is the backstop that turns a lost race into a visible error instead   │
//! │  of a silently wrong balance.                                          │
//! │                                                                         │
//! │  Entries are never mutated. Corrections are offsetting entries;        │
//! │  recalculate() rewrites ONLY the derived balance column.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bodega_core::{BalanceValidation, LedgerEntry};

/// Repository for provider ledger operations.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends one entry with the next seq and running balance.
    ///
    /// Exactly one of `debit_cents` / `credit_cents` must be positive; the
    /// two service operations (post_debit / post_credit) guarantee that and
    /// the schema CHECK enforces it.
    pub async fn append(
        &self,
        provider_id: i64,
        debit_cents: i64,
        credit_cents: i64,
        purchase_id: Option<&str>,
        payment_id: Option<&str>,
    ) -> DbResult<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = Self::append_in(
            &mut tx,
            provider_id,
            debit_cents,
            credit_cents,
            purchase_id,
            payment_id,
        )
        .await?;
        tx.commit().await?;

        debug!(
            provider_id,
            seq = entry.seq,
            balance_cents = entry.balance_cents,
            "Ledger entry appended"
        );
        Ok(entry)
    }

    /// Entry append on an open connection/transaction.
    ///
    /// The purchase repository composes this with purchase/payment inserts so
    /// a purchase and its debit (or a payment and its credit) commit together.
    pub(crate) async fn append_in(
        conn: &mut SqliteConnection,
        provider_id: i64,
        debit_cents: i64,
        credit_cents: i64,
        purchase_id: Option<&str>,
        payment_id: Option<&str>,
    ) -> DbResult<LedgerEntry> {
        if (debit_cents > 0) == (credit_cents > 0) {
            return Err(DbError::Internal(format!(
                "ledger entry must have exactly one of debit/credit, got {} / {}",
                debit_cents, credit_cents
            )));
        }

        let latest: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT seq, balance_cents FROM provider_ledger
            WHERE provider_id = ?1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (last_seq, last_balance) = latest.unwrap_or((0, 0));
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            provider_id,
            seq: last_seq + 1,
            debit_cents,
            credit_cents,
            balance_cents: last_balance + debit_cents - credit_cents,
            purchase_id: purchase_id.map(str::to_string),
            payment_id: payment_id.map(str::to_string),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO provider_ledger (
                id, provider_id, seq, debit_cents, credit_cents, balance_cents,
                purchase_id, payment_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.provider_id)
        .bind(entry.seq)
        .bind(entry.debit_cents)
        .bind(entry.credit_cents)
        .bind(entry.balance_cents)
        .bind(&entry.purchase_id)
        .bind(&entry.payment_id)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Latest stored balance, 0 when the provider has no entries.
    pub async fn latest_balance_cents(&self, provider_id: i64) -> DbResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT balance_cents FROM provider_ledger
            WHERE provider_id = ?1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or(0))
    }

    /// All entries for a provider, by seq ascending.
    pub async fn movements(&self, provider_id: i64) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, provider_id, seq, debit_cents, credit_cents, balance_cents,
                   purchase_id, payment_id, created_at
            FROM provider_ledger
            WHERE provider_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Replays all entries and compares against the stored balances.
    ///
    /// `valid` requires EVERY intermediate `balance_cents` to match the
    /// replay, not just the final one. Detection only: repairing drift is
    /// `recalculate`'s job.
    pub async fn validate(&self, provider_id: i64) -> DbResult<BalanceValidation> {
        let entries = self.movements(provider_id).await?;

        let mut running: i64 = 0;
        let mut all_match = true;
        for entry in &entries {
            running += entry.signed_amount_cents();
            if entry.balance_cents != running {
                all_match = false;
            }
        }

        let actual_cents = entries.last().map(|e| e.balance_cents).unwrap_or(0);
        Ok(BalanceValidation {
            valid: all_match && running == actual_cents,
            expected_cents: running,
            actual_cents,
        })
    }

    /// Rewrites every entry's running balance by replaying debits/credits in
    /// seq order. Returns the final balance.
    pub async fn recalculate(&self, provider_id: i64) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;

        let entries: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, debit_cents, credit_cents FROM provider_ledger
            WHERE provider_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(provider_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut running: i64 = 0;
        for (id, debit_cents, credit_cents) in entries {
            running += debit_cents - credit_cents;
            sqlx::query("UPDATE provider_ledger SET balance_cents = ?2 WHERE id = ?1")
                .bind(&id)
                .bind(running)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(provider_id, balance_cents = running, "Ledger balances recalculated");
        Ok(running)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_provider_has_zero_balance() {
        let db = test_db().await;
        assert_eq!(db.ledger().latest_balance_cents(1).await.unwrap(), 0);
        assert!(db.ledger().movements(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seq_and_running_balance() {
        let db = test_db().await;
        let repo = db.ledger();

        let e1 = repo.append(1, 1000, 0, Some("p1"), None).await.unwrap();
        let e2 = repo.append(1, 0, 400, Some("p1"), Some("pay1")).await.unwrap();
        let e3 = repo.append(1, 250, 0, None, None).await.unwrap();

        assert_eq!((e1.seq, e1.balance_cents), (1, 1000));
        assert_eq!((e2.seq, e2.balance_cents), (2, 600));
        assert_eq!((e3.seq, e3.balance_cents), (3, 850));
        assert_eq!(repo.latest_balance_cents(1).await.unwrap(), 850);
    }

    #[tokio::test]
    async fn test_providers_are_independent() {
        let db = test_db().await;
        let repo = db.ledger();

        repo.append(1, 1000, 0, None, None).await.unwrap();
        let other = repo.append(2, 70, 0, None, None).await.unwrap();

        assert_eq!(other.seq, 1);
        assert_eq!(repo.latest_balance_cents(1).await.unwrap(), 1000);
        assert_eq!(repo.latest_balance_cents(2).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_rejects_both_or_neither_side() {
        let db = test_db().await;
        let repo = db.ledger();

        assert!(repo.append(1, 0, 0, None, None).await.is_err());
        assert!(repo.append(1, 100, 100, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_detects_and_recalculate_repairs_drift() {
        let db = test_db().await;
        let repo = db.ledger();

        repo.append(1, 1000, 0, None, None).await.unwrap();
        let e2 = repo.append(1, 0, 400, None, None).await.unwrap();
        repo.append(1, 200, 0, None, None).await.unwrap();

        assert!(repo.validate(1).await.unwrap().valid);

        // Corrupt an intermediate balance out-of-band.
        sqlx::query("UPDATE provider_ledger SET balance_cents = 999 WHERE id = ?1")
            .bind(&e2.id)
            .execute(db.pool())
            .await
            .unwrap();

        let report = repo.validate(1).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.expected_cents, 800);

        let repaired = repo.recalculate(1).await.unwrap();
        assert_eq!(repaired, 800);
        assert!(repo.validate(1).await.unwrap().valid);
    }

    /// Every prefix of the ledger must carry a correct running balance.
    #[tokio::test]
    async fn test_every_intermediate_balance_is_correct() {
        let db = test_db().await;
        let repo = db.ledger();

        let amounts: [(i64, i64); 5] = [(500, 0), (0, 200), (300, 0), (0, 600), (250, 0)];
        for (debit, credit) in amounts {
            repo.append(3, debit, credit, None, None).await.unwrap();
        }

        let entries = repo.movements(3).await.unwrap();
        let mut running = 0;
        for entry in &entries {
            running += entry.signed_amount_cents();
            assert_eq!(entry.balance_cents, running);
        }
        assert_eq!(repo.latest_balance_cents(3).await.unwrap(), running);
    }
}
