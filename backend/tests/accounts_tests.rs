//! Accounts receivable tests
//!
//! Property and unit tests for:
//! - Receipt allocation keeps allocated + unallocated == payment
//! - Aging buckets follow days overdue
//! - Reconciliation closing balance

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    age_receivable, credit_period_days, days_overdue, parse_payment_terms_days,
    reconciliation_closing, validate_allocation, AgingBucket, AgingTotals, AllocationError,
    ReceiptBalance, ReceivableStatus,
};

/// Money from paise
fn money(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000).prop_map(money)
}

fn allocation_plan_strategy() -> impl Strategy<Value = (Decimal, Vec<(Decimal, Decimal)>)> {
    (
        amount_strategy(),
        prop::collection::vec((amount_strategy(), amount_strategy()), 1..12),
    )
}

// ============================================================================
// Property: Allocation Invariant
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any sequence of allocations keeps the receipt balanced and never overdraws it
    #[test]
    fn prop_allocation_keeps_receipt_balanced((payment, attempts) in allocation_plan_strategy()) {
        let mut balance = ReceiptBalance::new(payment);
        let mut applied = Decimal::ZERO;

        for (amount, outstanding) in attempts {
            match balance.allocate(amount, outstanding) {
                Ok(next) => {
                    prop_assert!(amount <= balance.unallocated_amount);
                    prop_assert!(amount <= outstanding);
                    applied += amount;
                    balance = next;
                }
                Err(_) => {
                    prop_assert!(amount > balance.unallocated_amount || amount > outstanding);
                }
            }
            prop_assert!(balance.is_consistent());
            prop_assert!(balance.unallocated_amount >= Decimal::ZERO);
            prop_assert_eq!(balance.allocated_amount, applied);
        }
    }

    /// Non-positive amounts are always refused
    #[test]
    fn prop_non_positive_allocation_refused(paise in -1_000_000i64..=0, available in amount_strategy()) {
        prop_assert_eq!(
            validate_allocation(money(paise), available, available),
            Err(AllocationError::NonPositive)
        );
    }

    /// closing = opening + invoices - payments
    #[test]
    fn prop_reconciliation_identity(
        opening in -5_000_000i64..5_000_000,
        invoices in 0i64..5_000_000,
        payments in 0i64..5_000_000,
    ) {
        let closing = reconciliation_closing(money(opening), money(invoices), money(payments));
        prop_assert_eq!(closing + money(payments), money(opening) + money(invoices));
    }
}

// ============================================================================
// Property: Aging Buckets
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A later day never moves a receivable into an earlier bucket
    #[test]
    fn prop_aging_bucket_monotonic(days in -30i64..400, extra in 0i64..120) {
        let rank = |b: AgingBucket| AgingBucket::ALL.iter().position(|x| *x == b).unwrap();
        prop_assert!(rank(AgingBucket::classify(days)) <= rank(AgingBucket::classify(days + extra)));
    }

    /// Days overdue is never negative and matches the calendar difference once past due
    #[test]
    fn prop_days_overdue(offset in -200i64..200) {
        let due = date(2024, 6, 1);
        let today = if offset >= 0 {
            due.checked_add_days(Days::new(offset as u64)).unwrap()
        } else {
            due.checked_sub_days(Days::new(offset.unsigned_abs())).unwrap()
        };
        prop_assert_eq!(days_overdue(due, today), offset.max(0));
    }

    /// The aged outstanding amount is invoice minus paid
    #[test]
    fn prop_aging_outstanding(invoice in amount_strategy(), paid_share in 0u32..=100) {
        let paid = (invoice * Decimal::from(paid_share) / Decimal::ONE_HUNDRED).round_dp(2);
        let snapshot = age_receivable(date(2024, 1, 10), 30, invoice, paid, date(2024, 3, 1));
        prop_assert_eq!(snapshot.outstanding, invoice - paid);
        prop_assert_eq!(snapshot.days_overdue, 21);
        prop_assert_eq!(snapshot.bucket, AgingBucket::Days0To30);
    }
}

mod aging_boundaries {
    use super::*;

    #[test]
    fn due_today_is_current() {
        assert_eq!(AgingBucket::classify(0), AgingBucket::Current);
        assert_eq!(AgingBucket::classify(1), AgingBucket::Days0To30);
    }

    #[test]
    fn bucket_edges() {
        assert_eq!(AgingBucket::classify(30), AgingBucket::Days0To30);
        assert_eq!(AgingBucket::classify(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::classify(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::classify(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::classify(91), AgingBucket::Over90);
    }

    #[test]
    fn totals_split_current_from_overdue() {
        let mut totals = AgingTotals::default();
        totals.add(AgingBucket::Current, money(100_000));
        totals.add(AgingBucket::Days31To60, money(25_050));
        totals.add(AgingBucket::Over90, money(10_000));
        assert_eq!(totals.total(), money(135_050));
        assert_eq!(totals.overdue(), money(35_050));
    }
}

mod receivable_status {
    use super::*;

    #[test]
    fn settled_within_tolerance() {
        assert_eq!(ReceivableStatus::derive(money(1), money(99_999), 10), ReceivableStatus::Paid);
    }

    #[test]
    fn partial_payment_wins_over_overdue() {
        assert_eq!(
            ReceivableStatus::derive(money(5_000), money(1_000), 45),
            ReceivableStatus::PartiallyPaid
        );
        assert_eq!(ReceivableStatus::derive(money(5_000), Decimal::ZERO, 45), ReceivableStatus::Overdue);
        assert_eq!(ReceivableStatus::derive(money(5_000), Decimal::ZERO, 0), ReceivableStatus::Outstanding);
    }

    #[test]
    fn credit_period_prefers_payment_terms() {
        assert_eq!(parse_payment_terms_days("Net 45 days"), Some(45));
        assert_eq!(credit_period_days(Some("Net 45 days"), Some(30)), 45);
        assert_eq!(credit_period_days(Some("Advance"), Some(30)), 30);
        assert_eq!(credit_period_days(None, None), 0);
    }
}
