//! Billing tests
//!
//! Property and unit tests for:
//! - Invoice grand total identity
//! - GST components rounded to paise
//! - Credit limit checks are monotonic in the invoice amount

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{check_credit_limit, compute_invoice_totals, summarize_items, DispatchItem, InvoiceLine};

fn money(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Intra-state lines carry CGST + SGST, inter-state lines carry IGST
fn invoice_line_strategy() -> impl Strategy<Value = InvoiceLine> {
    (
        1i64..500,
        1i64..5_000_000,
        prop_oneof![Just(5i64), Just(12), Just(18), Just(28)],
        any::<bool>(),
    )
        .prop_map(|(qty, rate_paise, gst, inter_state)| {
            let quantity = Decimal::from(qty);
            let rate = money(rate_paise);
            let (cgst, sgst, igst) = if inter_state {
                (Decimal::ZERO, Decimal::ZERO, Decimal::from(gst))
            } else {
                let half = Decimal::from(gst) / Decimal::TWO;
                (half, half, Decimal::ZERO)
            };
            InvoiceLine {
                description: "Flush door".to_string(),
                hsn_code: Some("4418".to_string()),
                quantity,
                rate,
                taxable_value: quantity * rate,
                cgst_rate: cgst,
                sgst_rate: sgst,
                igst_rate: igst,
            }
        })
}

fn lines_strategy() -> impl Strategy<Value = Vec<InvoiceLine>> {
    prop::collection::vec(invoice_line_strategy(), 0..10)
}

// ============================================================================
// Property: Invoice Totals
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// grand_total = subtotal + cgst + sgst + igst + freight + round_off
    #[test]
    fn prop_grand_total_identity(
        lines in lines_strategy(),
        freight in 0i64..1_000_000,
        round_off in -99i64..=99,
    ) {
        let totals = compute_invoice_totals(&lines, money(freight), money(round_off));
        prop_assert_eq!(
            totals.grand_total,
            totals.subtotal + totals.cgst_amount + totals.sgst_amount + totals.igst_amount
                + money(freight) + money(round_off)
        );
        prop_assert_eq!(totals.total_tax(), totals.cgst_amount + totals.sgst_amount + totals.igst_amount);
    }

    /// Subtotal is the sum of taxable values and tax parts are rounded to paise
    #[test]
    fn prop_subtotal_and_rounding(lines in lines_strategy()) {
        let totals = compute_invoice_totals(&lines, Decimal::ZERO, Decimal::ZERO);
        let taxable: Decimal = lines.iter().map(|l| l.taxable_value).sum();
        prop_assert_eq!(totals.subtotal, taxable);
        for part in [totals.cgst_amount, totals.sgst_amount, totals.igst_amount] {
            prop_assert!(part >= Decimal::ZERO);
            prop_assert_eq!(part, part.round_dp(2));
        }
    }

    /// CGST and SGST always match on intra-state invoices
    #[test]
    fn prop_cgst_equals_sgst(lines in lines_strategy()) {
        let totals = compute_invoice_totals(&lines, Decimal::ZERO, Decimal::ZERO);
        prop_assert_eq!(totals.cgst_amount, totals.sgst_amount);
    }
}

// ============================================================================
// Property: Credit Limit
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// If an invoice breaches the limit, any larger invoice breaches it too
    #[test]
    fn prop_credit_check_monotonic(
        limit in 1i64..10_000_000,
        outstanding in 0i64..10_000_000,
        total in 0i64..10_000_000,
        extra in 0i64..1_000_000,
    ) {
        let small = check_credit_limit(Some(money(limit)), money(outstanding), money(total));
        let large = check_credit_limit(Some(money(limit)), money(outstanding), money(total + extra));
        if small.exceeded {
            prop_assert!(large.exceeded);
        }
        prop_assert_eq!(small.exposure, money(outstanding + total));
        prop_assert_eq!(small.exceeded, outstanding + total > limit);
    }

    /// Parties without a limit, or with a zero limit, are never blocked
    #[test]
    fn prop_no_limit_never_blocks(outstanding in 0i64..i64::MAX / 4, total in 0i64..i64::MAX / 4) {
        prop_assert!(!check_credit_limit(None, money(outstanding), money(total)).exceeded);
        prop_assert!(!check_credit_limit(Some(Decimal::ZERO), money(outstanding), money(total)).exceeded);
    }
}

// ============================================================================
// Gate Pass Summary Tests
// ============================================================================

mod gate_pass_summary {
    use super::*;

    fn item(quantity: i64) -> DispatchItem {
        DispatchItem {
            product_description: "Frame 2100x900".to_string(),
            quantity: Decimal::from(quantity),
            unit: Some("nos".to_string()),
            packing_details: None,
        }
    }

    #[test]
    fn summary_counts_lines_and_quantity() {
        let summary = summarize_items(&[item(4), item(6)]);
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.total_quantity, Decimal::from(10));
        assert_eq!(summary.descriptions.len(), 2);
    }

    #[test]
    fn empty_dispatch_summary() {
        let summary = summarize_items(&[]);
        assert_eq!(summary.line_count, 0);
        assert_eq!(summary.total_quantity, Decimal::ZERO);
    }
}
