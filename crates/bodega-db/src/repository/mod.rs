//! # Repository Implementations
//!
//! One repository per aggregate:
//!
//! - [`variant`] - per-branch stock quantities
//! - [`movement`] - immutable movement audit + transfer transaction
//! - [`purchase`] - purchases, lines and provider payments
//! - [`ledger`] - append-only provider debit/credit ledger
//! - [`group`] - family group list

pub mod group;
pub mod ledger;
pub mod movement;
pub mod purchase;
pub mod variant;
