//! Receipts, allocations, receivables aging and reconciliation

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum PaymentMode ("payment mode") {
        Cash => "cash",
        Cheque => "cheque",
        Neft => "neft",
        Rtgs => "rtgs",
        Upi => "upi",
        BankTransfer => "bank_transfer",
    }
}

crate::string_enum! {
    pub enum ReceiptStatus ("payment receipt status") {
        Pending => "pending",
        Received => "received",
        Cleared => "cleared",
        Bounced => "bounced",
    }
}

impl Workflow for ReceiptStatus {
    const ENTITY: &'static str = "payment receipt";

    fn allowed_next(&self) -> &'static [Self] {
        use ReceiptStatus::*;
        match self {
            Pending => &[Received, Bounced],
            Received => &[Cleared, Bounced],
            Cleared | Bounced => &[],
        }
    }
}

impl ReceiptStatus {
    /// Cheques wait for clearance, everything else counts as received
    pub fn initial_for(mode: PaymentMode) -> Self {
        if mode == PaymentMode::Cheque {
            ReceiptStatus::Pending
        } else {
            ReceiptStatus::Received
        }
    }

    /// Receipts that count as money in for reconciliation
    pub const COLLECTED: &'static [ReceiptStatus] = &[ReceiptStatus::Received, ReceiptStatus::Cleared];
}

crate::string_enum! {
    pub enum ReconciliationStatus ("reconciliation status") {
        Draft => "draft",
        Approved => "approved",
    }
}

impl Workflow for ReconciliationStatus {
    const ENTITY: &'static str = "reconciliation";

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            ReconciliationStatus::Draft => &[ReconciliationStatus::Approved],
            ReconciliationStatus::Approved => &[],
        }
    }
}

crate::string_enum! {
    /// Overdue-days classification for receivables reporting
    pub enum AgingBucket ("aging bucket") {
        Current => "current",
        Days0To30 => "0-30",
        Days31To60 => "31-60",
        Days61To90 => "61-90",
        Over90 => "90+",
    }
}

impl AgingBucket {
    /// Bucket for a receivable `days_overdue` days past its due date
    pub fn classify(days_overdue: i64) -> Self {
        match days_overdue {
            i64::MIN..=0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days0To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }
}

crate::string_enum! {
    pub enum ReceivableStatus ("receivable status") {
        Outstanding => "outstanding",
        PartiallyPaid => "partially_paid",
        Overdue => "overdue",
        Paid => "paid",
    }
}

/// Outstanding balances at or below this are treated as settled
pub const SETTLEMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

impl ReceivableStatus {
    pub fn derive(outstanding: Decimal, paid: Decimal, days_overdue: i64) -> Self {
        if outstanding <= SETTLEMENT_TOLERANCE {
            ReceivableStatus::Paid
        } else if paid > Decimal::ZERO {
            ReceivableStatus::PartiallyPaid
        } else if days_overdue > 0 {
            ReceivableStatus::Overdue
        } else {
            ReceivableStatus::Outstanding
        }
    }
}

/// First run of digits in free-text payment terms, e.g. "Net 45 days" → 45
pub fn parse_payment_terms_days(terms: &str) -> Option<i64> {
    let digits: String = terms
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Credit period in days: payment terms first, then the party's credit days
pub fn credit_period_days(payment_terms: Option<&str>, credit_days: Option<i32>) -> i64 {
    payment_terms
        .and_then(parse_payment_terms_days)
        .or(credit_days.map(i64::from))
        .unwrap_or(0)
}

pub fn due_date(invoice_date: NaiveDate, credit_period_days: i64) -> NaiveDate {
    invoice_date + Duration::days(credit_period_days)
}

pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days().max(0)
}

/// Aging snapshot of a single invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgingSnapshot {
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub bucket: AgingBucket,
    pub status: ReceivableStatus,
    pub outstanding: Decimal,
}

pub fn age_receivable(
    invoice_date: NaiveDate,
    credit_period_days: i64,
    invoice_amount: Decimal,
    paid_amount: Decimal,
    today: NaiveDate,
) -> AgingSnapshot {
    let due = due_date(invoice_date, credit_period_days);
    let overdue = days_overdue(due, today);
    let outstanding = invoice_amount - paid_amount;
    AgingSnapshot {
        due_date: due,
        days_overdue: overdue,
        bucket: AgingBucket::classify(overdue),
        status: ReceivableStatus::derive(outstanding, paid_amount, overdue),
        outstanding,
    }
}

/// Why an allocation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Allocation amount must be greater than zero")]
    NonPositive,

    #[error("Allocation amount {requested} exceeds unallocated amount {available}")]
    ExceedsUnallocated { requested: Decimal, available: Decimal },

    #[error("Allocation amount {requested} exceeds invoice outstanding {outstanding}")]
    ExceedsInvoiceOutstanding {
        requested: Decimal,
        outstanding: Decimal,
    },
}

/// Money split of a payment receipt. `allocated + unallocated == payment_amount`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptBalance {
    pub payment_amount: Decimal,
    pub allocated_amount: Decimal,
    pub unallocated_amount: Decimal,
}

impl ReceiptBalance {
    pub fn new(payment_amount: Decimal) -> Self {
        Self {
            payment_amount,
            allocated_amount: Decimal::ZERO,
            unallocated_amount: payment_amount,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.allocated_amount + self.unallocated_amount == self.payment_amount
    }

    /// Apply an allocation against an invoice with `invoice_outstanding` left to pay
    pub fn allocate(
        &self,
        amount: Decimal,
        invoice_outstanding: Decimal,
    ) -> Result<ReceiptBalance, AllocationError> {
        validate_allocation(amount, self.unallocated_amount, invoice_outstanding)?;
        Ok(ReceiptBalance {
            payment_amount: self.payment_amount,
            allocated_amount: self.allocated_amount + amount,
            unallocated_amount: self.unallocated_amount - amount,
        })
    }
}

pub fn validate_allocation(
    amount: Decimal,
    unallocated: Decimal,
    invoice_outstanding: Decimal,
) -> Result<(), AllocationError> {
    if amount <= Decimal::ZERO {
        return Err(AllocationError::NonPositive);
    }
    if amount > unallocated {
        return Err(AllocationError::ExceedsUnallocated {
            requested: amount,
            available: unallocated,
        });
    }
    if amount > invoice_outstanding {
        return Err(AllocationError::ExceedsInvoiceOutstanding {
            requested: amount,
            outstanding: invoice_outstanding,
        });
    }
    Ok(())
}

/// `closing = opening + invoices - payments`
pub fn reconciliation_closing(opening: Decimal, invoices: Decimal, payments: Decimal) -> Decimal {
    opening + invoices - payments
}

/// Bucket totals for one party or the whole ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgingTotals {
    pub current: Decimal,
    pub days_0_30: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub over_90: Decimal,
}

impl AgingTotals {
    pub fn add(&mut self, bucket: AgingBucket, amount: Decimal) {
        let slot = match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days0To30 => &mut self.days_0_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.over_90,
        };
        *slot += amount;
    }

    pub fn total(&self) -> Decimal {
        self.current + self.days_0_30 + self.days_31_60 + self.days_61_90 + self.over_90
    }

    pub fn overdue(&self) -> Decimal {
        self.total() - self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(AgingBucket::classify(-5), AgingBucket::Current);
        assert_eq!(AgingBucket::classify(0), AgingBucket::Current);
        assert_eq!(AgingBucket::classify(1), AgingBucket::Days0To30);
        assert_eq!(AgingBucket::classify(30), AgingBucket::Days0To30);
        assert_eq!(AgingBucket::classify(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::classify(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::classify(61), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::classify(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::classify(91), AgingBucket::Over90);
    }

    #[test]
    fn test_bucket_labels() {
        assert_eq!(AgingBucket::Over90.as_str(), "90+");
        assert_eq!("31-60".parse::<AgingBucket>().unwrap(), AgingBucket::Days31To60);
    }

    #[test]
    fn test_payment_terms_parsing() {
        assert_eq!(parse_payment_terms_days("Net 45 days"), Some(45));
        assert_eq!(parse_payment_terms_days("30"), Some(30));
        assert_eq!(parse_payment_terms_days("50% Advance - 50% Delivery"), Some(50));
        assert_eq!(parse_payment_terms_days("Advance"), None);
    }

    #[test]
    fn test_credit_period_fallbacks() {
        assert_eq!(credit_period_days(Some("Net 15"), Some(60)), 15);
        assert_eq!(credit_period_days(Some("Credit"), Some(60)), 60);
        assert_eq!(credit_period_days(None, None), 0);
    }

    #[test]
    fn test_not_yet_due_is_current() {
        let snapshot = age_receivable(date(2024, 3, 1), 30, dec("1000"), Decimal::ZERO, date(2024, 3, 20));
        assert_eq!(snapshot.due_date, date(2024, 3, 31));
        assert_eq!(snapshot.days_overdue, 0);
        assert_eq!(snapshot.bucket, AgingBucket::Current);
        assert_eq!(snapshot.status, ReceivableStatus::Outstanding);
    }

    #[test]
    fn test_overdue_receivable() {
        let snapshot = age_receivable(date(2024, 1, 1), 30, dec("1000"), Decimal::ZERO, date(2024, 3, 15));
        assert_eq!(snapshot.days_overdue, 44);
        assert_eq!(snapshot.bucket, AgingBucket::Days31To60);
        assert_eq!(snapshot.status, ReceivableStatus::Overdue);
    }

    #[test]
    fn test_receivable_status_precedence() {
        assert_eq!(ReceivableStatus::derive(dec("0.01"), dec("999.99"), 40), ReceivableStatus::Paid);
        assert_eq!(ReceivableStatus::derive(dec("500"), dec("500"), 40), ReceivableStatus::PartiallyPaid);
        assert_eq!(ReceivableStatus::derive(dec("500"), Decimal::ZERO, 1), ReceivableStatus::Overdue);
        assert_eq!(ReceivableStatus::derive(dec("500"), Decimal::ZERO, 0), ReceivableStatus::Outstanding);
    }

    #[test]
    fn test_allocation_exceeding_unallocated_is_refused() {
        let balance = ReceiptBalance::new(dec("10000"));
        let err = balance.allocate(dec("10000.01"), dec("50000")).unwrap_err();
        assert!(matches!(err, AllocationError::ExceedsUnallocated { .. }));
    }

    #[test]
    fn test_allocation_exceeding_invoice_is_refused() {
        let balance = ReceiptBalance::new(dec("10000"));
        let err = balance.allocate(dec("6000"), dec("5000")).unwrap_err();
        assert!(matches!(err, AllocationError::ExceedsInvoiceOutstanding { .. }));
    }

    #[test]
    fn test_allocation_keeps_balance() {
        let balance = ReceiptBalance::new(dec("10000"))
            .allocate(dec("4000"), dec("4000"))
            .unwrap()
            .allocate(dec("6000"), dec("8000"))
            .unwrap();
        assert_eq!(balance.allocated_amount, dec("10000"));
        assert_eq!(balance.unallocated_amount, Decimal::ZERO);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_initial_receipt_status() {
        assert_eq!(ReceiptStatus::initial_for(PaymentMode::Cheque), ReceiptStatus::Pending);
        assert_eq!(ReceiptStatus::initial_for(PaymentMode::Neft), ReceiptStatus::Received);
    }

    #[test]
    fn test_reconciliation_closing() {
        assert_eq!(reconciliation_closing(dec("1000"), dec("5000"), dec("4500")), dec("1500"));
    }

    #[test]
    fn test_aging_totals() {
        let mut totals = AgingTotals::default();
        totals.add(AgingBucket::Current, dec("100"));
        totals.add(AgingBucket::Over90, dec("50"));
        totals.add(AgingBucket::Over90, dec("25"));
        assert_eq!(totals.total(), dec("175"));
        assert_eq!(totals.overdue(), dec("75"));
    }
}
