//! # bodega-db: Database Layer for Bodega
//!
//! This crate provides database access for the Bodega back-office core.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega Data Flow                                 │
//! │                                                                         │
//! │  Engine service call (transfer, receive, post_debit)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bodega-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (variant.rs,  │    │  (embedded)  │  │   │
//! │  │   │               │    │  movement.rs, │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  purchase.rs, │    │ 001_init.sql │  │   │
//! │  │   │ Management    │    │  ledger.rs)   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (one authoritative store; the engine's cache is       │
//! │  an optimization layered on top, never a source of truth)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (variant, movement, etc.)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bodega_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/bodega.db")).await?;
//!
//! let summary = db.variants().summarize_by_product(42, None).await?;
//! let balance = db.ledger().latest_balance_cents(7).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::group::GroupRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::movement::MovementRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::variant::VariantRepository;
