//! # Error Types
//!
//! Domain-specific error types for bodega-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bodega-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bodega-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  bodega-engine errors                                                  │
//! │  └── EngineError      - What service callers see                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (variant key, purchase id, etc.)
//! 3. Errors are enum variants, never String
//! 4. Precondition failures imply NO partial mutation happened

use thiserror::Error;

use crate::types::{PurchaseStatus, VariantKey};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A movement would draw more stock than a source variant holds.
    ///
    /// Raised by the pre-check, before any quantity is written: a transfer
    /// with one insufficient item among N leaves all N variants unchanged.
    #[error("Insufficient stock for {variant}: available {available}, requested {requested}")]
    InsufficientStock {
        variant: VariantKey,
        available: i64,
        requested: i64,
    },

    /// A purchase is not in a state that allows the requested transition.
    #[error("Purchase {purchase_id} is {current}, cannot {operation}")]
    InvalidState {
        purchase_id: String,
        current: PurchaseStatus,
        operation: &'static str,
    },

    /// A purchase was already received; stock was credited exactly once.
    ///
    /// This is the retry guard of the receive workflow: callers that time
    /// out may safely re-invoke receive and treat this error as success.
    #[error("Purchase {purchase_id} was already received")]
    AlreadyReceived { purchase_id: String },

    /// Entity cannot be found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Could not derive a unique barcode within the attempt budget.
    #[error("Barcode generation failed after {attempts} attempts")]
    BarcodeGenerationFailed { attempts: u32 },

    /// A provider's stored balance does not match a replay of its entries.
    ///
    /// Detected by validation, never auto-corrected; repair requires an
    /// explicit recalculation.
    #[error(
        "Ledger imbalance for provider {provider_id}: expected {expected_cents}, stored {actual_cents}"
    )]
    LedgerImbalance {
        provider_id: i64,
        expected_cents: i64,
        actual_cents: i64,
    },

    /// The family-group input cannot form a forest.
    #[error("Invalid group hierarchy at group {group_id}: {reason}")]
    InvalidHierarchy { group_id: i64, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements, before any
/// business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// A collection that must have members is empty.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: &'static str },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: &'static str, min: i64, max: i64 },

    /// Collection exceeds its allowed size.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: &'static str, max: usize },

    /// Two fields that must agree do not.
    #[error("{field} mismatch: {reason}")]
    Mismatch { field: &'static str, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
