//! # Stock Service
//!
//! Orchestrates stock movements over the variant store: transfers between
//! branches, receipts (external inflow), the manual-correction write path,
//! and the cache-first stock reads.
//!
//! ## Transfer Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transfer(request)                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate (non-empty, positive quantities, from ≠ to)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  movement_id already committed? ──yes──► return it (retry dedup)       │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  plan barcodes for destination variants that don't exist yet           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MovementRepository::apply  (pre-check + deltas + audit, ONE txn)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  invalidate branch/product cache keys                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invalidation contract
//! - transfer / receive_into: `branch:{from}:`, `branch:{to}:`, and
//!   `product:{p}:` for every touched product
//! - set_quantity: `branch:{b}:` and `product:{p}:` of the corrected variant

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::barcode::BarcodeGenerator;
use crate::cache::{ReadCache, Ttl};
use crate::error::EngineResult;
use crate::keys;
use bodega_core::{
    validation, CoreError, MovementItem, ProductStockSummary, StockMovement, TransferItem,
    TransferRequest, ValidationError, Variant, VariantKey,
};
use bodega_db::repository::movement::generate_movement_id;
use bodega_db::Database;

/// Service for stock movement and stock read operations.
#[derive(Clone)]
pub struct StockService {
    db: Database,
    cache: Arc<ReadCache>,
    barcodes: Arc<BarcodeGenerator>,
}

impl StockService {
    /// Creates a new StockService.
    pub fn new(db: Database, cache: Arc<ReadCache>, barcodes: Arc<BarcodeGenerator>) -> Self {
        StockService {
            db,
            cache,
            barcodes,
        }
    }

    // =========================================================================
    // Movements
    // =========================================================================

    /// Moves quantities from a source branch to a destination branch (or
    /// receives external inflow when `from_branch_id` is None) as a single
    /// unit of work. Returns the movement id.
    ///
    /// Retries: transfer is not naturally idempotent, so callers that retry
    /// must supply `movement_id`; a request whose id was already committed
    /// returns that id without moving anything again.
    pub async fn transfer(&self, request: TransferRequest) -> EngineResult<String> {
        validation::validate_transfer(&request).map_err(CoreError::from)?;

        if let Some(id) = &request.movement_id {
            if self.db.movements().exists(id).await? {
                info!(movement_id = %id, "Movement already committed, retry deduplicated");
                return Ok(id.clone());
            }
        }
        let movement_id = request
            .movement_id
            .clone()
            .unwrap_or_else(generate_movement_id);

        // Destination variants that don't exist yet need a barcode before the
        // transaction can create them.
        let mut new_barcodes: HashMap<VariantKey, String> = HashMap::new();
        for item in &request.items {
            let dest = item.variant_key(request.to_branch_id);
            if !new_barcodes.contains_key(&dest) && self.db.variants().get(&dest).await?.is_none() {
                let code = self
                    .barcodes
                    .generate(
                        &self.db.variants(),
                        dest.product_id,
                        dest.size_id,
                        dest.color_id,
                    )
                    .await?;
                new_barcodes.insert(dest, code);
            }
        }

        let movement = StockMovement {
            id: movement_id.clone(),
            from_branch_id: request.from_branch_id,
            to_branch_id: request.to_branch_id,
            notes: request.notes.clone(),
            actor: request.actor.clone(),
            created_at: Utc::now(),
        };

        self.db
            .movements()
            .apply(&movement, &request.items, &new_barcodes)
            .await?;
        self.invalidate_after_movement(&movement, &request.items)
            .await;

        info!(
            movement_id = %movement_id,
            from = ?movement.from_branch_id,
            to = movement.to_branch_id,
            items = request.items.len(),
            "Stock movement applied"
        );
        Ok(movement_id)
    }

    /// Receives external inflow into a branch (purchase delivery or manual
    /// intake). A receive only increments.
    pub async fn receive_into(
        &self,
        movement_id: Option<String>,
        branch_id: i64,
        items: Vec<TransferItem>,
        notes: Option<String>,
        actor: Option<String>,
    ) -> EngineResult<String> {
        self.transfer(TransferRequest {
            movement_id,
            from_branch_id: None,
            to_branch_id: branch_id,
            items,
            notes,
            actor,
        })
        .await
    }

    async fn invalidate_after_movement(&self, movement: &StockMovement, items: &[TransferItem]) {
        if let Some(from) = movement.from_branch_id {
            self.cache
                .invalidate_prefix(&keys::branch_prefix(from))
                .await;
        }
        self.cache
            .invalidate_prefix(&keys::branch_prefix(movement.to_branch_id))
            .await;

        let products: BTreeSet<i64> = items.iter().map(|item| item.product_id).collect();
        for product_id in products {
            self.cache
                .invalidate_prefix(&keys::product_prefix(product_id))
                .await;
        }
    }

    /// Gets a committed movement header.
    pub async fn movement(&self, movement_id: &str) -> EngineResult<StockMovement> {
        self.db
            .movements()
            .get(movement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Movement", movement_id).into())
    }

    /// Gets the items of a committed movement.
    pub async fn movement_items(&self, movement_id: &str) -> EngineResult<Vec<MovementItem>> {
        Ok(self.db.movements().items(movement_id).await?)
    }

    /// Movement history touching a branch, newest first.
    pub async fn movements_for_branch(
        &self,
        branch_id: i64,
        limit: u32,
    ) -> EngineResult<Vec<StockMovement>> {
        Ok(self.db.movements().list_for_branch(branch_id, limit).await?)
    }

    // =========================================================================
    // Manual correction
    // =========================================================================

    /// Directly sets a variant's quantity.
    ///
    /// This is the manual-correction surface, deliberately separate from the
    /// audited movement path. An unknown variant is created (with a fresh
    /// barcode) so corrections work before any movement exists.
    pub async fn set_quantity(&self, key: &VariantKey, quantity: i64) -> EngineResult<()> {
        if quantity < 0 {
            return Err(ValidationError::MustNotBeNegative { field: "quantity" }.into());
        }

        match self.db.variants().get(key).await? {
            Some(_) => self.db.variants().set_quantity(key, quantity).await?,
            None => {
                let code = self
                    .barcodes
                    .generate(
                        &self.db.variants(),
                        key.product_id,
                        key.size_id,
                        key.color_id,
                    )
                    .await?;
                self.db.variants().create(key, quantity, &code).await?;
            }
        }

        self.cache
            .invalidate_prefix(&keys::branch_prefix(key.branch_id))
            .await;
        self.cache
            .invalidate_prefix(&keys::product_prefix(key.product_id))
            .await;

        info!(variant = %key, quantity, "Stock quantity corrected");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current quantity of a variant, 0 if unknown. Authoritative read.
    pub async fn quantity(&self, key: &VariantKey) -> EngineResult<i64> {
        Ok(self.db.variants().quantity(key).await?)
    }

    /// Looks up a variant by barcode. Authoritative read.
    pub async fn variant_by_barcode(&self, code: &str) -> EngineResult<Variant> {
        self.db
            .variants()
            .find_by_barcode(code)
            .await?
            .ok_or_else(|| CoreError::not_found("Variant", code).into())
    }

    /// All variants held at a branch. Cache-first.
    pub async fn variants_in_branch(&self, branch_id: i64) -> EngineResult<Vec<Variant>> {
        self.cache
            .get_or_insert_with(&keys::branch_variants(branch_id), Ttl::Short, || async {
                self.db
                    .variants()
                    .list_by_branch(branch_id)
                    .await
                    .map_err(Into::into)
            })
            .await
    }

    /// Stock summary of a product, optionally restricted to a branch.
    /// Cache-first.
    pub async fn product_summary(
        &self,
        product_id: i64,
        branch_id: Option<i64>,
    ) -> EngineResult<ProductStockSummary> {
        let key = match branch_id {
            Some(branch) => keys::product_summary_in_branch(product_id, branch),
            None => keys::product_summary(product_id),
        };
        self.cache
            .get_or_insert_with(&key, Ttl::Short, || async {
                self.db
                    .variants()
                    .summarize_by_product(product_id, branch_id)
                    .await
                    .map_err(Into::into)
            })
            .await
    }
}
