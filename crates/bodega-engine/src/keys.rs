//! # Cache Key Layout
//!
//! Every cached read and every invalidation goes through these builders, so
//! the invalidation contract is checkable in one place.
//!
//! ## Layout
//! ```text
//! branch:{branch_id}:variants            per-branch variant list
//! product:{product_id}:summary:all       product stock summary
//! product:{product_id}:summary:branch:{branch_id}
//! purchase:{purchase_id}                 one purchase
//! purchases:pending                      pending-delivery listing
//! ledger:{provider_id}:balance           provider balance
//! ledger:{provider_id}:movements         provider ledger listing
//! groups:forest                          family-group forest
//! ```
//!
//! Segments are ':'-delimited and numeric ids are always followed by ':' (or
//! end the key), so `branch:1:` can never match keys of branch 12 when used
//! as an invalidation prefix.

/// All cached reads for one branch.
pub fn branch_prefix(branch_id: i64) -> String {
    format!("branch:{}:", branch_id)
}

/// Variant list of one branch.
pub fn branch_variants(branch_id: i64) -> String {
    format!("branch:{}:variants", branch_id)
}

/// All cached reads for one product.
pub fn product_prefix(product_id: i64) -> String {
    format!("product:{}:", product_id)
}

/// Unfiltered stock summary of one product.
pub fn product_summary(product_id: i64) -> String {
    format!("product:{}:summary:all", product_id)
}

/// Stock summary of one product restricted to one branch.
pub fn product_summary_in_branch(product_id: i64, branch_id: i64) -> String {
    format!("product:{}:summary:branch:{}", product_id, branch_id)
}

/// One purchase by id.
pub fn purchase(purchase_id: &str) -> String {
    format!("purchase:{}", purchase_id)
}

/// The pending-deliveries listing.
pub fn pending_deliveries() -> String {
    "purchases:pending".to_string()
}

/// All cached reads for one provider's ledger.
pub fn ledger_prefix(provider_id: i64) -> String {
    format!("ledger:{}:", provider_id)
}

/// Provider balance.
pub fn ledger_balance(provider_id: i64) -> String {
    format!("ledger:{}:balance", provider_id)
}

/// Provider ledger listing.
pub fn ledger_movements(provider_id: i64) -> String {
    format!("ledger:{}:movements", provider_id)
}

/// All cached group reads.
pub fn groups_prefix() -> String {
    "groups:".to_string()
}

/// The family-group forest.
pub fn groups_forest() -> String {
    "groups:forest".to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Prefix invalidation must never leak across numerically-adjacent ids.
    #[test]
    fn test_prefixes_are_id_safe() {
        assert!(branch_variants(1).starts_with(&branch_prefix(1)));
        assert!(!branch_variants(12).starts_with(&branch_prefix(1)));

        assert!(product_summary(3).starts_with(&product_prefix(3)));
        assert!(product_summary_in_branch(3, 9).starts_with(&product_prefix(3)));
        assert!(!product_summary(31).starts_with(&product_prefix(3)));

        assert!(ledger_balance(7).starts_with(&ledger_prefix(7)));
        assert!(ledger_movements(7).starts_with(&ledger_prefix(7)));
        assert!(!ledger_balance(71).starts_with(&ledger_prefix(7)));

        assert!(groups_forest().starts_with(&groups_prefix()));
    }
}
