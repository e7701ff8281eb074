//! # Barcode Generator
//!
//! Collision-checked barcode generation over the pure composition in
//! `bodega_core::barcode`.
//!
//! ## Generation Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sample = now_micros + process-local counter   (strictly increasing)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  compose(product, size, color, sample)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  already stored? ──no──► done                                          │
//! │       │ yes                                                             │
//! │       ▼                                                                 │
//! │  retry with fresh sample (backoff, bounded attempts)                   │
//! │       │ budget exhausted                                                │
//! │       ▼                                                                 │
//! │  BarcodeGenerationFailed                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The counter makes same-microsecond calls produce distinct samples, so a
//! burst of generations for one (product, size, color) yields distinct codes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::error::EngineResult;
use bodega_core::{barcode, CoreError};
use bodega_db::VariantRepository;

/// Attempt budget before giving up on a unique code.
const MAX_ATTEMPTS: u32 = 5;

/// Collision-checked barcode generator.
///
/// One instance per engine; the counter is what disambiguates concurrent
/// calls inside one microsecond.
#[derive(Debug)]
pub struct BarcodeGenerator {
    counter: AtomicU64,
}

impl BarcodeGenerator {
    pub fn new() -> Self {
        BarcodeGenerator {
            counter: AtomicU64::new(0),
        }
    }

    fn sample(&self) -> u64 {
        let micros = Utc::now().timestamp_micros().max(0) as u64;
        micros.wrapping_add(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Derives a barcode that is not already stored in the variant store.
    ///
    /// ## Errors
    /// `BarcodeGenerationFailed` after `MAX_ATTEMPTS` collisions.
    pub async fn generate(
        &self,
        variants: &VariantRepository,
        product_id: i64,
        size_id: i64,
        color_id: i64,
    ) -> EngineResult<String> {
        for attempt in 0..MAX_ATTEMPTS {
            let code = barcode::compose(product_id, size_id, color_id, self.sample());

            if !variants.barcode_exists(&code).await? {
                return Ok(code);
            }

            debug!(attempt, code, "Barcode collision, retrying");
            tokio::time::sleep(Duration::from_millis(1u64 << attempt)).await;
        }

        Err(CoreError::BarcodeGenerationFailed {
            attempts: MAX_ATTEMPTS,
        }
        .into())
    }
}

impl Default for BarcodeGenerator {
    fn default() -> Self {
        BarcodeGenerator::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bodega_db::{Database, DbConfig};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_burst_generates_distinct_codes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let variants = db.variants();
        let generator = BarcodeGenerator::new();

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let code = generator.generate(&variants, 42, 7, 13).await.unwrap();
            assert!(barcode::is_well_formed(&code));
            assert!(seen.insert(code), "duplicate code in burst");
        }
    }

    #[tokio::test]
    async fn test_generated_code_avoids_stored_barcodes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let variants = db.variants();
        let generator = BarcodeGenerator::new();

        let code = generator.generate(&variants, 1, 1, 1).await.unwrap();
        variants
            .create(
                &bodega_core::VariantKey {
                    product_id: 1,
                    size_id: 1,
                    color_id: 1,
                    branch_id: 1,
                },
                1,
                &code,
            )
            .await
            .unwrap();

        let next = generator.generate(&variants, 1, 1, 1).await.unwrap();
        assert_ne!(code, next);
    }
}
