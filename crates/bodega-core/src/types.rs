//! # Domain Types
//!
//! Core domain types used throughout Bodega.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Variant      │   │  StockMovement  │   │    Purchase     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  product_id     │   │  from_branch?   │   │  provider_id    │       │
//! │  │  size × color   │   │  to_branch      │   │  status         │       │
//! │  │  branch_id      │   │  items[]        │   │  total_cents    │       │
//! │  │  quantity       │   └─────────────────┘   └─────────────────┘       │
//! │  │  barcode        │                                                   │
//! │  └─────────────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │   LedgerEntry   │   │   FamilyGroup   │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  seq (per prov) │   │  id             │       │
//! │                        │  debit │ credit │   │  parent_group?  │       │
//! │                        │  balance_cents  │   │  name           │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Rows have a UUID `id` for relations; variants additionally have a business
//! identity `(product_id, size_id, color_id, branch_id)` and a unique barcode.
//! Catalog references (product, size, color, branch, provider, group) are i64
//! ids owned by the back-office catalog, which is outside this core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Variant
// =============================================================================

/// Business identity of a variant: one size×color of a product at one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    pub branch_id: i64,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product {} size {} color {} @ branch {}",
            self.product_id, self.size_id, self.color_id, self.branch_id
        )
    }
}

/// A stock-holding variant row.
///
/// Quantities are mutated only through stock movements (or the explicitly
/// separate manual-correction path); variant rows are never deleted, only
/// zeroed, so historical movements keep a referent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Variant {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    /// Branch (sucursal) holding this stock.
    pub branch_id: i64,
    /// On-hand quantity. Never negative.
    pub quantity: i64,
    /// Unique scannable identifier for this size×color combination.
    pub barcode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Returns the business identity of this variant.
    #[inline]
    pub fn key(&self) -> VariantKey {
        VariantKey {
            product_id: self.product_id,
            size_id: self.size_id,
            color_id: self.color_id,
            branch_id: self.branch_id,
        }
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// An immutable audit record of stock moving between branches.
///
/// `from_branch_id = None` denotes a receipt: external inflow (purchase
/// delivery or manual intake) that only credits the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub from_branch_id: Option<i64>,
    pub to_branch_id: i64,
    pub notes: Option<String>,
    /// Who requested the movement (free-form user reference).
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// True when this movement is an external inflow (no source branch).
    #[inline]
    pub fn is_receipt(&self) -> bool {
        self.from_branch_id.is_none()
    }
}

/// One line of a stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MovementItem {
    pub id: String,
    pub movement_id: String,
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    /// Units moved. Always positive.
    pub quantity: i64,
}

impl MovementItem {
    /// The variant this item touches at the given branch.
    #[inline]
    pub fn variant_key(&self, branch_id: i64) -> VariantKey {
        VariantKey {
            product_id: self.product_id,
            size_id: self.size_id,
            color_id: self.color_id,
            branch_id,
        }
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// The status of a provider purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Being composed; line items can still change.
    Draft,
    /// Confirmed with the provider, awaiting delivery.
    PendingDelivery,
    /// Delivered; stock has been credited to a branch.
    Received,
    /// Abandoned before delivery.
    Cancelled,
}

impl PurchaseStatus {
    /// Stable string form, matching the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Draft => "draft",
            PurchaseStatus::PendingDelivery => "pending_delivery",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    /// Received and Cancelled admit no further transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Received | PurchaseStatus::Cancelled)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for PurchaseStatus {
    fn default() -> Self {
        PurchaseStatus::Draft
    }
}

/// A purchase order against a provider.
///
/// Invariant: `subtotal_cents` equals the sum of line subtotals and
/// `total_cents = subtotal_cents - discount_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Purchase {
    pub id: String,
    pub provider_id: i64,
    pub subtotal_cents: i64,
    /// Purchase-level discount, on top of any per-line discounts.
    pub discount_cents: i64,
    pub total_cents: i64,
    pub status: PurchaseStatus,
    /// Provider invoice reference, when known.
    pub invoice_ref: Option<String>,
    /// Set when the purchase transitions to Received.
    pub delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    /// Returns the subtotal as Money.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item on a purchase.
///
/// Carries the size/color defaults used to derive the destination variant
/// when the purchase is received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseLine {
    pub id: String,
    pub purchase_id: String,
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    pub cost_cents: i64,
    pub quantity: i64,
    pub discount_cents: i64,
    pub subtotal_cents: i64,
}

impl PurchaseLine {
    /// Line subtotal: unit cost × quantity, less the line discount.
    pub fn compute_subtotal_cents(cost_cents: i64, quantity: i64, discount_cents: i64) -> i64 {
        Money::from_cents(cost_cents)
            .multiply_quantity(quantity)
            .cents()
            - discount_cents
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Check,
}

/// A payment made to a provider.
///
/// `purchase_id = None` is a general account credit not tied to one invoice.
/// Every payment produces exactly one credit entry in the provider ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub provider_id: i64,
    pub purchase_id: Option<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    /// External reference (transfer number, check number, etc.).
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Provider Ledger
// =============================================================================

/// One append-only posting to a provider's running balance.
///
/// Invariants:
/// - exactly one of `debit_cents` / `credit_cents` is non-zero;
/// - `seq` is monotonic per provider, starting at 1;
/// - `balance_cents(seq) = balance_cents(seq-1) + debit - credit`.
///
/// Entries are never mutated; corrections are offsetting entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LedgerEntry {
    pub id: String,
    pub provider_id: i64,
    pub seq: i64,
    /// Increases what is owed to the provider (debe).
    pub debit_cents: i64,
    /// Decreases what is owed to the provider (haber).
    pub credit_cents: i64,
    /// Running balance after this entry.
    pub balance_cents: i64,
    pub purchase_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[inline]
    pub fn is_debit(&self) -> bool {
        self.debit_cents > 0
    }

    #[inline]
    pub fn is_credit(&self) -> bool {
        self.credit_cents > 0
    }

    /// The signed delta this entry applies to the balance.
    #[inline]
    pub fn signed_amount_cents(&self) -> i64 {
        self.debit_cents - self.credit_cents
    }

    /// Returns the running balance as Money.
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }
}

// =============================================================================
// Family Group
// =============================================================================

/// A named category node used to scope/filter products.
///
/// Groups form a forest; `marked_as_root` is a display hint, not a structural
/// constraint (a node with a parent may still be marked).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FamilyGroup {
    pub id: i64,
    pub name: String,
    pub parent_group_id: Option<i64>,
    pub marked_as_root: bool,
}

// =============================================================================
// Service Inputs
// =============================================================================

/// One line of a requested stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    pub quantity: i64,
}

impl TransferItem {
    /// The variant this item resolves to at the given branch.
    #[inline]
    pub fn variant_key(&self, branch_id: i64) -> VariantKey {
        VariantKey {
            product_id: self.product_id,
            size_id: self.size_id,
            color_id: self.color_id,
            branch_id,
        }
    }
}

/// A requested stock movement.
///
/// `movement_id` may be supplied by the caller to make retries safe: a
/// transfer re-submitted with an id that was already committed is returned
/// as-is and not applied again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub movement_id: Option<String>,
    pub from_branch_id: Option<i64>,
    pub to_branch_id: i64,
    pub items: Vec<TransferItem>,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

/// Input for creating a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchase {
    pub provider_id: i64,
    pub invoice_ref: Option<String>,
    /// Purchase-level discount in cents.
    pub discount_cents: i64,
    pub lines: Vec<NewPurchaseLine>,
}

/// Input for one purchase line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseLine {
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    pub cost_cents: i64,
    pub quantity: i64,
    pub discount_cents: i64,
}

/// Input for recording a provider payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub provider_id: i64,
    pub purchase_id: Option<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Read Models
// =============================================================================

/// Per-branch quantity of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchQuantity {
    pub branch_id: i64,
    pub quantity: i64,
}

/// Stock of one product, totalled and broken down per branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStockSummary {
    pub product_id: i64,
    pub total: i64,
    pub per_branch: Vec<BranchQuantity>,
}

/// Result of checking a provider's stored balance against a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceValidation {
    pub valid: bool,
    /// Balance obtained by folding all entries from seq 1.
    pub expected_cents: i64,
    /// Stored balance of the latest entry (0 if none).
    pub actual_cents: i64,
}

/// A derived label barcode for one purchase line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBarcode {
    pub line_id: String,
    pub product_id: i64,
    pub size_id: i64,
    pub color_id: i64,
    pub quantity: i64,
    pub barcode: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
