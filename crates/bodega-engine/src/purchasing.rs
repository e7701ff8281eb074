//! # Purchase Service
//!
//! The purchase workflow state machine and provider payments.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create()          submit()              receive(branch)              │
//! │      │                 │                      │                        │
//! │      ▼                 ▼                      ▼                        │
//! │   ┌───────┐      ┌──────────────────┐    ┌──────────┐                  │
//! │   │ Draft │ ───► │ PendingDelivery  │ ──►│ Received │  (terminal)      │
//! │   └───┬───┘      └────────┬─────────┘    └──────────┘                  │
//! │       │                   │                                            │
//! │       └───────┬───────────┘                                            │
//! │               ▼ cancel()                                               │
//! │         ┌───────────┐                                                  │
//! │         │ Cancelled │  (terminal)                                      │
//! │         └───────────┘                                                  │
//! │                                                                         │
//! │  receive() is idempotent under retry:                                  │
//! │    1. the receipt movement id is derived from the purchase id, so a    │
//! │       raced retry dedups in the movement engine and stock is credited  │
//! │       exactly once;                                                    │
//! │    2. the status flip is a guarded UPDATE; the loser of a race (or a   │
//! │       second call) gets AlreadyReceived, never a second credit.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Purchase creation and its ledger debit commit in ONE transaction, as do a
//! payment and its credit; there is no window where one exists without the
//! other.
//!
//! ## Invalidation contract
//! - create: `ledger:{provider}:` (debit), `purchases:pending` untouched
//!   (a draft is not pending)
//! - submit / cancel: `purchase:{id}`, `purchases:pending`
//! - receive: `purchase:{id}`, `purchases:pending`, plus the stock keys the
//!   movement invalidates
//! - record_payment: `ledger:{provider}:`, `purchase:{id}` when linked

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::barcode::BarcodeGenerator;
use crate::cache::{ReadCache, Ttl};
use crate::error::EngineResult;
use crate::keys;
use crate::ledger::LedgerService;
use crate::stock::StockService;
use bodega_core::{
    validation, CoreError, LineBarcode, Money, NewPayment, NewPurchase, Payment, Purchase,
    PurchaseLine, PurchaseStatus, TransferItem, ValidationError,
};
use bodega_db::repository::purchase::{generate_line_id, generate_payment_id, generate_purchase_id};
use bodega_db::Database;

/// Service for the purchase workflow.
#[derive(Clone)]
pub struct PurchaseService {
    db: Database,
    cache: Arc<ReadCache>,
    stock: StockService,
    ledger: Arc<LedgerService>,
    barcodes: Arc<BarcodeGenerator>,
}

impl PurchaseService {
    /// Creates a new PurchaseService.
    pub fn new(
        db: Database,
        cache: Arc<ReadCache>,
        stock: StockService,
        ledger: Arc<LedgerService>,
        barcodes: Arc<BarcodeGenerator>,
    ) -> Self {
        PurchaseService {
            db,
            cache,
            stock,
            ledger,
            barcodes,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a Draft purchase and posts its provider debit, atomically.
    pub async fn create(&self, input: NewPurchase) -> EngineResult<Purchase> {
        validation::validate_new_purchase(&input).map_err(CoreError::from)?;

        let purchase_id = generate_purchase_id();
        let now = Utc::now();

        let mut lines = Vec::with_capacity(input.lines.len());
        let mut subtotal_cents: i64 = 0;
        for line in &input.lines {
            let line_subtotal =
                PurchaseLine::compute_subtotal_cents(line.cost_cents, line.quantity, line.discount_cents);
            subtotal_cents += line_subtotal;
            lines.push(PurchaseLine {
                id: generate_line_id(),
                purchase_id: purchase_id.clone(),
                product_id: line.product_id,
                size_id: line.size_id,
                color_id: line.color_id,
                cost_cents: line.cost_cents,
                quantity: line.quantity,
                discount_cents: line.discount_cents,
                subtotal_cents: line_subtotal,
            });
        }

        let purchase = Purchase {
            id: purchase_id,
            provider_id: input.provider_id,
            subtotal_cents,
            discount_cents: input.discount_cents,
            total_cents: subtotal_cents - input.discount_cents,
            status: PurchaseStatus::Draft,
            invoice_ref: input.invoice_ref,
            delivery_date: None,
            created_at: now,
            updated_at: now,
        };

        // The debit shares the provider's posting serialization with every
        // other ledger write.
        let _guard = self.ledger.lock_provider(purchase.provider_id).await;
        self.db.purchases().create_with_debit(&purchase, &lines).await?;
        drop(_guard);
        self.ledger.invalidate_provider(purchase.provider_id).await;

        info!(
            purchase_id = %purchase.id,
            provider_id = purchase.provider_id,
            total = %purchase.total(),
            lines = lines.len(),
            "Purchase created"
        );
        Ok(purchase)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Confirms a Draft purchase with the provider (Draft → PendingDelivery).
    pub async fn submit(&self, purchase_id: &str) -> EngineResult<Purchase> {
        let flipped = self
            .db
            .purchases()
            .transition(
                purchase_id,
                PurchaseStatus::Draft,
                PurchaseStatus::PendingDelivery,
            )
            .await?;
        if !flipped {
            return Err(self.transition_failure(purchase_id, "submit").await);
        }

        self.cache.invalidate(&keys::purchase(purchase_id)).await;
        self.cache.invalidate(&keys::pending_deliveries()).await;

        info!(purchase_id, "Purchase submitted");
        self.load(purchase_id).await
    }

    /// Abandons a purchase (Draft or PendingDelivery → Cancelled).
    pub async fn cancel(&self, purchase_id: &str) -> EngineResult<Purchase> {
        let purchases = self.db.purchases();
        let flipped = purchases
            .transition(purchase_id, PurchaseStatus::Draft, PurchaseStatus::Cancelled)
            .await?
            || purchases
                .transition(
                    purchase_id,
                    PurchaseStatus::PendingDelivery,
                    PurchaseStatus::Cancelled,
                )
                .await?;
        if !flipped {
            return Err(self.transition_failure(purchase_id, "cancel").await);
        }

        self.cache.invalidate(&keys::purchase(purchase_id)).await;
        self.cache.invalidate(&keys::pending_deliveries()).await;

        info!(purchase_id, "Purchase cancelled");
        self.load(purchase_id).await
    }

    /// Receives a pending purchase into a branch: credits stock through the
    /// movement engine and flips the status. Returns the movement id.
    ///
    /// Retry-safe: a second call (or the loser of a concurrent race) gets
    /// `AlreadyReceived` and stock stays credited exactly once.
    pub async fn receive(&self, purchase_id: &str, branch_id: i64) -> EngineResult<String> {
        let purchase = self.load(purchase_id).await?;
        match purchase.status {
            PurchaseStatus::PendingDelivery => {}
            PurchaseStatus::Received => {
                return Err(CoreError::AlreadyReceived {
                    purchase_id: purchase_id.to_string(),
                }
                .into());
            }
            current => {
                return Err(CoreError::InvalidState {
                    purchase_id: purchase_id.to_string(),
                    current,
                    operation: "receive",
                }
                .into());
            }
        }

        let lines = self.db.purchases().lines(purchase_id).await?;
        let items: Vec<TransferItem> = lines
            .iter()
            .map(|line| TransferItem {
                product_id: line.product_id,
                size_id: line.size_id,
                color_id: line.color_id,
                quantity: line.quantity,
            })
            .collect();

        // Derived movement id: the dedup identity of this receipt.
        let movement_id = format!("recv-{}", purchase_id);
        self.stock
            .receive_into(
                Some(movement_id.clone()),
                branch_id,
                items,
                Some(format!("Receipt of purchase {}", purchase_id)),
                None,
            )
            .await?;

        let flipped = self.db.purchases().mark_received(purchase_id).await?;
        self.cache.invalidate(&keys::purchase(purchase_id)).await;
        self.cache.invalidate(&keys::pending_deliveries()).await;

        if !flipped {
            // A concurrent receive won the status flip; its movement (same
            // derived id) already credited the stock, ours deduplicated.
            return Err(CoreError::AlreadyReceived {
                purchase_id: purchase_id.to_string(),
            }
            .into());
        }

        info!(purchase_id, branch_id, movement_id = %movement_id, "Purchase received");
        Ok(movement_id)
    }

    async fn transition_failure(&self, purchase_id: &str, operation: &'static str) -> crate::EngineError {
        match self.db.purchases().get(purchase_id).await {
            Ok(Some(purchase)) => CoreError::InvalidState {
                purchase_id: purchase_id.to_string(),
                current: purchase.status,
                operation,
            }
            .into(),
            Ok(None) => CoreError::not_found("Purchase", purchase_id).into(),
            Err(err) => err.into(),
        }
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records a provider payment and posts its ledger credit, atomically.
    ///
    /// When linked to a purchase, the purchase must exist and belong to the
    /// paying provider.
    pub async fn record_payment(&self, input: NewPayment) -> EngineResult<Payment> {
        validation::validate_payment(&input).map_err(CoreError::from)?;

        if let Some(purchase_id) = &input.purchase_id {
            let purchase = self
                .db
                .purchases()
                .get(purchase_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Purchase", purchase_id.clone()))?;
            if purchase.provider_id != input.provider_id {
                return Err(ValidationError::Mismatch {
                    field: "provider_id",
                    reason: format!(
                        "purchase {} belongs to provider {}",
                        purchase_id, purchase.provider_id
                    ),
                }
                .into());
            }
        }

        let payment = Payment {
            id: generate_payment_id(),
            provider_id: input.provider_id,
            purchase_id: input.purchase_id,
            amount_cents: input.amount_cents,
            method: input.method,
            reference: input.reference,
            notes: input.notes,
            created_at: Utc::now(),
        };

        let _guard = self.ledger.lock_provider(payment.provider_id).await;
        self.db.purchases().add_payment_with_credit(&payment).await?;
        drop(_guard);
        self.ledger.invalidate_provider(payment.provider_id).await;
        if let Some(purchase_id) = &payment.purchase_id {
            self.cache.invalidate(&keys::purchase(purchase_id)).await;
        }

        info!(
            payment_id = %payment.id,
            provider_id = payment.provider_id,
            amount = %payment.amount(),
            "Payment recorded"
        );
        Ok(payment)
    }

    /// All payments against a purchase.
    pub async fn payments(&self, purchase_id: &str) -> EngineResult<Vec<Payment>> {
        Ok(self.db.purchases().payments_for_purchase(purchase_id).await?)
    }

    /// Total paid against a purchase.
    pub async fn total_paid(&self, purchase_id: &str) -> EngineResult<Money> {
        let cents = self.db.purchases().total_paid(purchase_id).await?;
        Ok(Money::from_cents(cents))
    }

    /// What remains owed on one purchase (total - paid).
    pub async fn outstanding(&self, purchase_id: &str) -> EngineResult<Money> {
        let purchase = self.load(purchase_id).await?;
        let paid = self.total_paid(purchase_id).await?;
        Ok(purchase.total() - paid)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a purchase by id. Cache-first.
    pub async fn get(&self, purchase_id: &str) -> EngineResult<Purchase> {
        let key = keys::purchase(purchase_id);
        let id = purchase_id.to_string();
        self.cache
            .get_or_insert_with(&key, Ttl::Short, || async move {
                self.db
                    .purchases()
                    .get(&id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("Purchase", id).into())
            })
            .await
    }

    /// Lines of a purchase.
    pub async fn lines(&self, purchase_id: &str) -> EngineResult<Vec<PurchaseLine>> {
        Ok(self.db.purchases().lines(purchase_id).await?)
    }

    /// Purchases awaiting delivery, oldest first. Cache-first.
    pub async fn pending_deliveries(&self) -> EngineResult<Vec<Purchase>> {
        self.cache
            .get_or_insert_with(&keys::pending_deliveries(), Ttl::Short, || async {
                self.db
                    .purchases()
                    .list_by_status(PurchaseStatus::PendingDelivery)
                    .await
                    .map_err(Into::into)
            })
            .await
    }

    /// Derives label barcodes for a purchase's line items.
    ///
    /// Read/derive only: nothing is reserved or stored; stock (and its
    /// barcodes) lands when the purchase is received.
    pub async fn generate_barcodes(&self, purchase_id: &str) -> EngineResult<Vec<LineBarcode>> {
        // Existence check first so an unknown id is NotFound, not an empty list.
        let _ = self.load(purchase_id).await?;
        let lines = self.db.purchases().lines(purchase_id).await?;

        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            let code = self
                .barcodes
                .generate(
                    &self.db.variants(),
                    line.product_id,
                    line.size_id,
                    line.color_id,
                )
                .await?;
            out.push(LineBarcode {
                line_id: line.id,
                product_id: line.product_id,
                size_id: line.size_id,
                color_id: line.color_id,
                quantity: line.quantity,
                barcode: code,
            });
        }
        Ok(out)
    }

    /// Authoritative (uncached) load used inside mutations.
    async fn load(&self, purchase_id: &str) -> EngineResult<Purchase> {
        self.db
            .purchases()
            .get(purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Purchase", purchase_id).into())
    }
}
