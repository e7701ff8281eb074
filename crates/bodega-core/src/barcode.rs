//! # Barcode Composition
//!
//! Derives scannable identifiers for variants.
//!
//! ## Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Barcode Layout (19 digits)                         │
//! │                                                                         │
//! │   ┌─────────┬───────┬───────┬────────────┐                             │
//! │   │ product │ size  │ color │   suffix   │                             │
//! │   │ 5 digits│3 digit│3 digit│  8 digits  │                             │
//! │   └─────────┴───────┴───────┴────────────┘                             │
//! │                                                                         │
//! │   00042    007     013     83412907                                    │
//! │                                                                         │
//! │   The suffix is time-derived, so re-adding stock for the same          │
//! │   (product, size, color) later yields a fresh code.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Composition is pure: the caller supplies the time-derived `sample`.
//! Uniqueness against already-stored barcodes is enforced by the engine,
//! which probes the variant store and retries with a new sample.

// Segment widths. The total length is their sum.
pub const PRODUCT_WIDTH: u32 = 5;
pub const SIZE_WIDTH: u32 = 3;
pub const COLOR_WIDTH: u32 = 3;
pub const SUFFIX_WIDTH: u32 = 8;

/// Total barcode length in digits.
pub const BARCODE_LEN: usize =
    (PRODUCT_WIDTH + SIZE_WIDTH + COLOR_WIDTH + SUFFIX_WIDTH) as usize;

/// Composes a barcode from catalog ids and a time-derived sample.
///
/// Ids wider than their segment wrap modulo the segment capacity; the
/// time-derived suffix is what keeps repeated combinations distinct.
///
/// ## Example
/// ```rust
/// use bodega_core::barcode::compose;
///
/// let code = compose(42, 7, 13, 83_412_907);
/// assert_eq!(code, "0004200701383412907");
/// ```
pub fn compose(product_id: i64, size_id: i64, color_id: i64, sample: u64) -> String {
    format!(
        "{:0pw$}{:0sw$}{:0cw$}{:0xw$}",
        product_id.rem_euclid(10i64.pow(PRODUCT_WIDTH)),
        size_id.rem_euclid(10i64.pow(SIZE_WIDTH)),
        color_id.rem_euclid(10i64.pow(COLOR_WIDTH)),
        sample % 10u64.pow(SUFFIX_WIDTH),
        pw = PRODUCT_WIDTH as usize,
        sw = SIZE_WIDTH as usize,
        cw = COLOR_WIDTH as usize,
        xw = SUFFIX_WIDTH as usize,
    )
}

/// Checks that a string has the shape of a composed barcode.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == BARCODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_layout() {
        let code = compose(42, 7, 13, 83_412_907);
        assert_eq!(code.len(), BARCODE_LEN);
        assert_eq!(&code[0..5], "00042");
        assert_eq!(&code[5..8], "007");
        assert_eq!(&code[8..11], "013");
        assert_eq!(&code[11..], "83412907");
    }

    #[test]
    fn test_distinct_samples_give_distinct_codes() {
        let a = compose(1, 1, 1, 1000);
        let b = compose(1, 1, 1, 1001);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wide_ids_wrap_into_segment() {
        // 1_234_567 doesn't fit 5 digits; it wraps to 34567.
        let code = compose(1_234_567, 0, 0, 0);
        assert_eq!(&code[0..5], "34567");
        assert_eq!(code.len(), BARCODE_LEN);
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed(&compose(42, 7, 13, 1)));
        assert!(!is_well_formed("123"));
        assert!(!is_well_formed("00042007013834129x7"));
    }
}
