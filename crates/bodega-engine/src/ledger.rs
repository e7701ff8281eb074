//! # Ledger Service
//!
//! Provider-level debit/credit postings over the append-only ledger.
//!
//! ## Posting Serialization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Per-Provider Serialization Point                       │
//! │                                                                         │
//! │  post_debit(P, ...) ──► lock(P) ──► read latest ──► append ──► unlock  │
//! │  post_credit(P, ...) ─────┘  (waits)                                   │
//! │                                                                         │
//! │  post_debit(Q, ...) ──► lock(Q) ──► ...    (independent, in parallel)  │
//! │                                                                         │
//! │  No two posts for one provider interleave; the UNIQUE(provider, seq)   │
//! │  index backstops the invariant if a second engine instance appears.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drift handling: `validate` detects, `recalculate` repairs. Nothing here
//! silently auto-corrects.
//!
//! ## Invalidation contract (every posting path)
//! - `ledger:{provider}:` — balance and movement listings of that provider

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::cache::{ReadCache, Ttl};
use crate::error::EngineResult;
use crate::keys;
use bodega_core::{BalanceValidation, CoreError, LedgerEntry, Money, ValidationError};
use bodega_db::Database;

/// Service for provider ledger operations.
pub struct LedgerService {
    db: Database,
    cache: Arc<ReadCache>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl LedgerService {
    /// Creates a new LedgerService.
    pub fn new(db: Database, cache: Arc<ReadCache>) -> Self {
        LedgerService {
            db,
            cache,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the posting serialization for one provider.
    ///
    /// Also used by the purchase service so purchase-debit and payment-credit
    /// transactions take part in the same serialization.
    pub(crate) async fn lock_provider(&self, provider_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(provider_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub(crate) async fn invalidate_provider(&self, provider_id: i64) {
        self.cache
            .invalidate_prefix(&keys::ledger_prefix(provider_id))
            .await;
    }

    /// Posts a purchase obligation (debe) and returns the new entry.
    pub async fn post_debit(
        &self,
        provider_id: i64,
        amount: Money,
        purchase_id: Option<&str>,
    ) -> EngineResult<LedgerEntry> {
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive { field: "amount" }.into());
        }

        let _guard = self.lock_provider(provider_id).await;
        let entry = self
            .db
            .ledger()
            .append(provider_id, amount.cents(), 0, purchase_id, None)
            .await?;
        self.invalidate_provider(provider_id).await;

        info!(
            provider_id,
            seq = entry.seq,
            amount = %amount,
            balance = %entry.balance(),
            "Debit posted"
        );
        Ok(entry)
    }

    /// Posts a payment credit (haber) and returns the new entry.
    pub async fn post_credit(
        &self,
        provider_id: i64,
        amount: Money,
        purchase_id: Option<&str>,
        payment_id: Option<&str>,
    ) -> EngineResult<LedgerEntry> {
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive { field: "amount" }.into());
        }

        let _guard = self.lock_provider(provider_id).await;
        let entry = self
            .db
            .ledger()
            .append(provider_id, 0, amount.cents(), purchase_id, payment_id)
            .await?;
        self.invalidate_provider(provider_id).await;

        info!(
            provider_id,
            seq = entry.seq,
            amount = %amount,
            balance = %entry.balance(),
            "Credit posted"
        );
        Ok(entry)
    }

    /// Current balance: the latest entry's running balance, 0 if none.
    pub async fn balance(&self, provider_id: i64) -> EngineResult<Money> {
        self.cache
            .get_or_insert_with(&keys::ledger_balance(provider_id), Ttl::Short, || async {
                let cents = self.db.ledger().latest_balance_cents(provider_id).await?;
                Ok(Money::from_cents(cents))
            })
            .await
    }

    /// All entries for a provider, by seq ascending.
    pub async fn movements(&self, provider_id: i64) -> EngineResult<Vec<LedgerEntry>> {
        self.cache
            .get_or_insert_with(
                &keys::ledger_movements(provider_id),
                Ttl::Medium,
                || async { self.db.ledger().movements(provider_id).await.map_err(Into::into) },
            )
            .await
    }

    /// Replays the ledger and compares every stored balance. Detection only.
    pub async fn validate(&self, provider_id: i64) -> EngineResult<BalanceValidation> {
        Ok(self.db.ledger().validate(provider_id).await?)
    }

    /// Like [`validate`](Self::validate) but turns a mismatch into
    /// `LedgerImbalance`, for callers that treat drift as fatal.
    pub async fn require_balanced(&self, provider_id: i64) -> EngineResult<()> {
        let report = self.validate(provider_id).await?;
        if report.valid {
            Ok(())
        } else {
            Err(CoreError::LedgerImbalance {
                provider_id,
                expected_cents: report.expected_cents,
                actual_cents: report.actual_cents,
            }
            .into())
        }
    }

    /// Rewrites every stored balance by replaying the entries. Explicit
    /// repair for drift found by [`validate`](Self::validate).
    pub async fn recalculate(&self, provider_id: i64) -> EngineResult<Money> {
        let _guard = self.lock_provider(provider_id).await;
        let cents = self.db.ledger().recalculate(provider_id).await?;
        self.invalidate_provider(provider_id).await;

        info!(provider_id, balance_cents = cents, "Ledger recalculated");
        Ok(Money::from_cents(cents))
    }
}
