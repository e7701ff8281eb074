//! # bodega-engine: Service Layer for Bodega
//!
//! Orchestrates `bodega-core` (pure rules) and `bodega-db` (authoritative
//! store) into the operations callers consume, behind a read-through cache
//! that every mutation invalidates precisely.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         bodega-engine                                   │
//! │                                                                         │
//! │   Caller (API layer, CLI, tests)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   ┌──────────────────── Backoffice ────────────────────────────┐       │
//! │   │                                                             │       │
//! │   │  StockService      PurchaseService     LedgerService       │       │
//! │   │  transfer          create/submit       post_debit          │       │
//! │   │  receive_into      cancel/receive      post_credit         │       │
//! │   │  set_quantity      record_payment      balance/validate    │       │
//! │   │  summaries         barcodes/pending    recalculate         │       │
//! │   │        │                 │                  │              │       │
//! │   │        └────────┬────────┴───────┬──────────┘              │       │
//! │   │                 ▼                ▼                         │       │
//! │   │             ReadCache     GroupService                     │       │
//! │   └─────────────────────────────────────────────────────────────┘      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   bodega-db (SQLite) ── single authoritative store                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cache`] - read-through memoizer with TTL categories + invalidation
//! - [`keys`] - the cache key layout (the invalidation contract's vocabulary)
//! - [`stock`] - stock movement engine and stock reads
//! - [`purchasing`] - purchase workflow and payments
//! - [`ledger`] - provider debit/credit ledger
//! - [`groups`] - family-group forest
//! - [`barcode`] - collision-checked barcode generation
//! - [`config`] - cache TTL configuration

// =============================================================================
// Module Declarations
// =============================================================================

pub mod barcode;
pub mod cache;
pub mod config;
pub mod error;
pub mod groups;
pub mod keys;
pub mod ledger;
pub mod purchasing;
pub mod stock;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use barcode::BarcodeGenerator;
pub use cache::{ReadCache, Ttl};
pub use config::CacheConfig;
pub use error::{EngineError, EngineResult};
pub use groups::GroupService;
pub use ledger::LedgerService;
pub use purchasing::PurchaseService;
pub use stock::StockService;

use std::sync::Arc;

use bodega_db::Database;

// =============================================================================
// Backoffice Facade
// =============================================================================

/// All services wired over one database and one shared cache.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./bodega.db")).await?;
/// let office = Backoffice::new(db, CacheConfig::default());
///
/// let movement = office.stock.transfer(request).await?;
/// let balance = office.ledger.balance(provider_id).await?;
/// ```
pub struct Backoffice {
    pub cache: Arc<ReadCache>,
    pub stock: StockService,
    pub purchasing: PurchaseService,
    pub ledger: Arc<LedgerService>,
    pub groups: GroupService,
}

impl Backoffice {
    /// Wires every service over the given database.
    pub fn new(db: Database, cache_config: CacheConfig) -> Self {
        let cache = Arc::new(ReadCache::new(cache_config));
        let barcodes = Arc::new(BarcodeGenerator::new());

        let ledger = Arc::new(LedgerService::new(db.clone(), cache.clone()));
        let stock = StockService::new(db.clone(), cache.clone(), barcodes.clone());
        let purchasing = PurchaseService::new(
            db.clone(),
            cache.clone(),
            stock.clone(),
            ledger.clone(),
            barcodes,
        );
        let groups = GroupService::new(db, cache.clone());

        Backoffice {
            cache,
            stock,
            purchasing,
            ledger,
            groups,
        }
    }
}
