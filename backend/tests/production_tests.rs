//! Production and sales calculation tests
//!
//! Property and unit tests for:
//! - Shop-floor task balances
//! - Schedule slot validation
//! - Quotation totals with GST

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    compute_quotation_totals, conversion_rate, is_reschedule, pass_rate, task_balance,
    ApprovalStatus, DepartmentSlot, InspectionQuantities, QuotationLine,
};
use uuid::Uuid;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
}

// ============================================================================
// Property: Task Balance
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// balance + completed == quantity whenever the report is accepted
    #[test]
    fn prop_task_balance(quantity in 0i32..10_000, completed in -50i32..12_000) {
        match task_balance(quantity, completed) {
            Ok(balance) => {
                prop_assert!(balance >= 0);
                prop_assert_eq!(balance + completed, quantity);
            }
            Err(_) => prop_assert!(completed < 0 || completed > quantity),
        }
    }

    /// Slots need a positive quantity and an end on or after the start
    #[test]
    fn prop_department_slot(length in -10i64..30, quantity in -5i32..100) {
        let planned_end = if length >= 0 {
            start_date().checked_add_days(Days::new(length as u64)).unwrap()
        } else {
            start_date().checked_sub_days(Days::new(length.unsigned_abs())).unwrap()
        };
        let slot = DepartmentSlot {
            department_id: Uuid::new_v4(),
            supervisor_type: Some("Pressing".to_string()),
            planned_start: start_date(),
            planned_end,
            quantity,
        };
        prop_assert_eq!(slot.validate().is_ok(), length >= 0 && quantity > 0);
    }

    /// Passed plus failed may not exceed inspected
    #[test]
    fn prop_inspection_quantities(inspected in 0i32..500, passed in 0i32..500, failed in 0i32..500) {
        let q = InspectionQuantities { inspected, passed, failed };
        prop_assert_eq!(q.validate().is_ok(), passed + failed <= inspected);
    }

    /// Quotation total is the discounted subtotal plus 18% GST
    #[test]
    fn prop_quotation_totals(
        lines in prop::collection::vec((1i64..100, 100i64..10_000_000), 1..8),
        discount_pct in 0i64..=30,
    ) {
        let lines: Vec<QuotationLine> = lines
            .into_iter()
            .map(|(quantity, rate)| QuotationLine {
                description: "Membrane door".to_string(),
                quantity: Decimal::from(quantity),
                rate: Decimal::new(rate, 2),
                discount: Decimal::ZERO,
                product_id: None,
            })
            .collect();
        let totals = compute_quotation_totals(&lines, Decimal::ZERO, Some(Decimal::from(discount_pct)));
        let taxable = totals.subtotal - totals.discount_amount;
        prop_assert_eq!(totals.total_amount, taxable + totals.tax_amount);
        prop_assert_eq!(totals.tax_amount, (taxable * Decimal::from(18) / Decimal::ONE_HUNDRED).round_dp(2));
        prop_assert!(totals.discount_amount <= totals.subtotal);
    }
}

mod rates {
    use super::*;

    #[test]
    fn rates_with_no_data_are_zero() {
        assert_eq!(conversion_rate(0, 0), Decimal::ZERO);
        assert_eq!(pass_rate(0, 0), Decimal::ZERO);
    }

    #[test]
    fn rates_round_to_two_places() {
        assert_eq!(conversion_rate(1, 3), Decimal::new(3333, 2));
        assert_eq!(pass_rate(2, 1), Decimal::new(6667, 2));
    }
}

mod scheduling {
    use super::*;

    #[test]
    fn same_dates_are_not_a_reschedule() {
        let end = start_date().checked_add_days(Days::new(5)).unwrap();
        assert!(!is_reschedule((start_date(), end), Some(start_date()), None));
        assert!(is_reschedule((start_date(), end), None, Some(start_date())));
    }

    #[test]
    fn captain_measurements_wait_for_approval() {
        assert_eq!(ApprovalStatus::initial_for(true), ApprovalStatus::PendingApproval);
        assert_eq!(ApprovalStatus::initial_for(false), ApprovalStatus::Approved);
    }
}
