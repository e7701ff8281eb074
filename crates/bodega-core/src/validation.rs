//! # Validation Module
//!
//! Input validation for the service operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (API / UI)                                            │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  └── Runs before any engine precondition check or write                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0, amount > 0, one-of debit/credit)            │
//! │  └── UNIQUE / foreign key constraints                                  │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{NewPayment, NewPurchase, TransferRequest};
use crate::{MAX_ITEM_QUANTITY, MAX_MOVEMENT_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Quantity / Amount Validators
// =============================================================================

/// Validates a stock quantity for a movement or purchase line.
///
/// ## Rules
/// - Must be strictly positive (zero-quantity lines carry no information)
/// - Must not exceed MAX_ITEM_QUANTITY
///
/// Quantities are integers by construction: fractional quantities cannot be
/// expressed in the request types.
pub fn validate_quantity(field: &'static str, quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive { field });
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field,
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a monetary amount that must be strictly positive.
pub fn validate_positive_amount(field: &'static str, amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive { field });
    }
    Ok(())
}

/// Validates a monetary amount that may be zero (discounts, costs).
pub fn validate_non_negative_amount(
    field: &'static str,
    amount_cents: i64,
) -> ValidationResult<()> {
    if amount_cents < 0 {
        return Err(ValidationError::MustNotBeNegative { field });
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a stock movement request.
///
/// ## Rules
/// - Items must be non-empty: empty transfers are rejected, not recorded
/// - At most MAX_MOVEMENT_ITEMS items
/// - Every quantity positive and in range
/// - When a source branch is set, it must differ from the destination
pub fn validate_transfer(request: &TransferRequest) -> ValidationResult<()> {
    if request.items.is_empty() {
        return Err(ValidationError::Empty { field: "items" });
    }
    if request.items.len() > MAX_MOVEMENT_ITEMS {
        return Err(ValidationError::TooMany {
            field: "items",
            max: MAX_MOVEMENT_ITEMS,
        });
    }
    if request.from_branch_id == Some(request.to_branch_id) {
        return Err(ValidationError::Mismatch {
            field: "to_branch_id",
            reason: "source and destination branch are the same".to_string(),
        });
    }
    for item in &request.items {
        validate_quantity("items.quantity", item.quantity)?;
    }
    Ok(())
}

/// Validates a new purchase.
///
/// ## Rules
/// - Lines must be non-empty
/// - Per line: cost >= 0, quantity positive, discount >= 0 and not larger
///   than the undiscounted line total
/// - Purchase-level discount >= 0 and not larger than the subtotal
pub fn validate_new_purchase(purchase: &NewPurchase) -> ValidationResult<()> {
    if purchase.lines.is_empty() {
        return Err(ValidationError::Empty { field: "lines" });
    }
    validate_non_negative_amount("discount_cents", purchase.discount_cents)?;

    let mut subtotal: i64 = 0;
    for line in &purchase.lines {
        validate_non_negative_amount("lines.cost_cents", line.cost_cents)?;
        validate_quantity("lines.quantity", line.quantity)?;
        validate_non_negative_amount("lines.discount_cents", line.discount_cents)?;

        let gross = line.cost_cents * line.quantity;
        if line.discount_cents > gross {
            return Err(ValidationError::Mismatch {
                field: "lines.discount_cents",
                reason: "line discount exceeds line total".to_string(),
            });
        }
        subtotal += gross - line.discount_cents;
    }

    if purchase.discount_cents > subtotal {
        return Err(ValidationError::Mismatch {
            field: "discount_cents",
            reason: "purchase discount exceeds subtotal".to_string(),
        });
    }
    Ok(())
}

/// Validates a new provider payment.
pub fn validate_payment(payment: &NewPayment) -> ValidationResult<()> {
    validate_positive_amount("amount_cents", payment.amount_cents)
}

// =============================================================================
// Unit Tests
// =============================================================================
