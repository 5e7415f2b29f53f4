//! Document numbering tests
//!
//! Property and unit tests for:
//! - Next number is always past every counter already issued
//! - Foreign and malformed numbers never affect a series
//! - Paper series wrap back to 1

use proptest::prelude::*;
use shared::numbering::{
    self, format_document_number, next_document_number, numeric_suffix, DocumentSeries,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Non-wrapping series used for business documents
fn series_strategy() -> impl Strategy<Value = DocumentSeries> {
    prop_oneof![
        Just(numbering::TAX_INVOICE),
        Just(numbering::PAYMENT_RECEIPT),
        Just(numbering::PURCHASE_ORDER),
        Just(numbering::GOODS_RECEIPT),
        Just(numbering::QUALITY_CHECK),
        Just(numbering::VENDOR),
        Just(numbering::SITE),
    ]
}

fn counters_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..50_000, 0..20)
}

// ============================================================================
// Property: Monotonic Numbering
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The next number's counter is one past the highest issued counter
    #[test]
    fn prop_next_number_follows_highest(
        series in series_strategy(),
        counters in counters_strategy(),
    ) {
        let issued: Vec<String> = counters
            .iter()
            .map(|c| format_document_number(series.prefix, series.width, *c))
            .collect();

        let next = series.next(issued.iter().map(String::as_str));
        let next_counter = numeric_suffix(&next, series.prefix).unwrap();
        let highest = counters.iter().copied().max().unwrap_or(0);

        prop_assert_eq!(next_counter, highest + 1);
        for number in &issued {
            prop_assert_ne!(number, &next);
        }
    }

    /// Issuing numbers one after another never repeats or goes backwards
    #[test]
    fn prop_sequential_issue_is_strictly_increasing(
        series in series_strategy(),
        count in 1usize..40,
    ) {
        let mut issued: Vec<String> = Vec::new();
        let mut last = 0u64;
        for _ in 0..count {
            let next = series.next(issued.iter().map(String::as_str));
            let counter = numeric_suffix(&next, series.prefix).unwrap();
            prop_assert!(counter > last);
            last = counter;
            issued.push(next);
        }
    }

    /// Numbers from other prefixes and junk suffixes are ignored
    #[test]
    fn prop_foreign_numbers_ignored(
        counters in counters_strategy(),
        junk in prop::collection::vec("[A-Z]{1,4}-?[0-9A-Z]{0,6}", 0..10),
    ) {
        let series = numbering::PURCHASE_ORDER;
        let mut issued: Vec<String> = counters.iter().map(|c| format!("PO-{c}")).collect();
        let baseline = series.next(issued.iter().map(String::as_str));

        issued.extend(junk.into_iter().filter(|j| numeric_suffix(j, "PO-").is_none()));
        issued.push(format!("GRN-{}", 900_000));
        let with_noise = series.next(issued.iter().map(String::as_str));

        prop_assert_eq!(baseline, with_noise);
    }

    /// Padding keeps at least the configured width
    #[test]
    fn prop_padding_width(counter in 1u64..9_999) {
        let number = format_document_number("INV-", 4, counter);
        prop_assert_eq!(number.len(), "INV-".len() + 4);
        prop_assert_eq!(numeric_suffix(&number, "INV-"), Some(counter));
    }
}

// ============================================================================
// Wrapping Series Tests
// ============================================================================

mod wrapping {
    use super::*;

    #[test]
    fn paper_series_wraps_after_limit() {
        assert_eq!(numbering::SHUTTER_PAPER.next(["S9999", "S0004"]), "S0001");
        assert_eq!(numbering::FRAME_PAPER.next(["F9998"]), "F9999");
    }

    #[test]
    fn paper_series_by_category() {
        assert_eq!(numbering::production_paper_series("Shutter").prefix, "S");
        assert_eq!(numbering::production_paper_series("Frame").prefix, "F");
        assert_eq!(numbering::production_paper_series("Laminate").prefix, "P");
    }

    #[test]
    fn explicit_wrap_limit() {
        assert_eq!(next_document_number("X", 2, Some(99), ["X99"]), "X01");
        assert_eq!(next_document_number("X", 2, None, ["X99"]), "X100");
    }
}

// ============================================================================
// Serial Number Tests
// ============================================================================

mod serial_numbers {
    use super::*;

    #[test]
    fn serial_increments_per_user_counter() {
        let (serial, counter) = numbering::next_serial_number(Some("K"), 41).unwrap();
        assert_eq!(serial, "K00042");
        assert_eq!(counter, 42);
    }

    #[test]
    fn serial_requires_prefix() {
        assert!(numbering::next_serial_number(None, 0).is_none());
    }
}
