//! Billing requests, delivery challans and GST tax invoices

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

crate::string_enum! {
    /// Billing request raised by dispatch for a finished production paper
    pub enum BillingRequestStatus ("billing request status") {
        Pending => "pending",
        DcCreated => "dc_created",
        InvoiceCreated => "invoice_created",
        BillingApproved => "billing_approved",
        SentToDispatch => "sent_to_dispatch",
    }
}

impl Workflow for BillingRequestStatus {
    const ENTITY: &'static str = "billing request";

    fn allowed_next(&self) -> &'static [Self] {
        use BillingRequestStatus::*;
        match self {
            Pending => &[DcCreated],
            DcCreated => &[InvoiceCreated],
            InvoiceCreated => &[BillingApproved],
            BillingApproved => &[SentToDispatch],
            SentToDispatch => &[],
        }
    }
}

crate::string_enum! {
    pub enum ChallanStatus ("delivery challan status") {
        Draft => "draft",
        Approved => "approved",
        SentToDispatch => "sent_to_dispatch",
    }
}

impl Workflow for ChallanStatus {
    const ENTITY: &'static str = "delivery challan";

    fn allowed_next(&self) -> &'static [Self] {
        use ChallanStatus::*;
        match self {
            Draft => &[Approved],
            Approved => &[SentToDispatch],
            SentToDispatch => &[],
        }
    }
}

impl ChallanStatus {
    /// Challans can be edited until they leave for dispatch
    pub fn is_editable(&self) -> bool {
        *self != ChallanStatus::SentToDispatch
    }

    /// Statuses a challan steps through when its invoice goes to dispatch.
    /// A challan nobody approved is approved on the way.
    pub fn route_to_dispatch(self) -> &'static [ChallanStatus] {
        match self {
            ChallanStatus::Draft => &[ChallanStatus::Approved, ChallanStatus::SentToDispatch],
            ChallanStatus::Approved => &[ChallanStatus::SentToDispatch],
            ChallanStatus::SentToDispatch => &[],
        }
    }
}

crate::string_enum! {
    pub enum InvoiceStatus ("tax invoice status") {
        Draft => "draft",
        Approved => "approved",
        SentToDispatch => "sent_to_dispatch",
    }
}

impl Workflow for InvoiceStatus {
    const ENTITY: &'static str = "tax invoice";

    fn allowed_next(&self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Draft => &[Approved],
            Approved => &[SentToDispatch],
            SentToDispatch => &[],
        }
    }
}

impl InvoiceStatus {
    /// Statuses whose grand totals count towards a party's outstanding balance
    pub const OUTSTANDING: &'static [InvoiceStatus] =
        &[InvoiceStatus::Approved, InvoiceStatus::SentToDispatch];

    pub fn is_editable(&self) -> bool {
        *self != InvoiceStatus::SentToDispatch
    }
}

/// Line on a delivery challan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallanItem {
    pub description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Line on a tax invoice with its GST rates in percent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLine {
    pub description: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub taxable_value: Decimal,
    #[serde(default)]
    pub cgst_rate: Decimal,
    #[serde(default)]
    pub sgst_rate: Decimal,
    #[serde(default)]
    pub igst_rate: Decimal,
}

impl InvoiceLine {
    pub fn cgst(&self) -> Decimal {
        percent_of(self.taxable_value, self.cgst_rate)
    }

    pub fn sgst(&self) -> Decimal {
        percent_of(self.taxable_value, self.sgst_rate)
    }

    pub fn igst(&self) -> Decimal {
        percent_of(self.taxable_value, self.igst_rate)
    }
}

/// Money totals of a tax invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub freight: Decimal,
    pub round_off: Decimal,
    pub grand_total: Decimal,
}

impl InvoiceTotals {
    pub fn total_tax(&self) -> Decimal {
        self.cgst_amount + self.sgst_amount + self.igst_amount
    }
}

/// `grand_total = subtotal + cgst + sgst + igst + freight + round_off`
pub fn compute_invoice_totals(
    lines: &[InvoiceLine],
    freight: Decimal,
    round_off: Decimal,
) -> InvoiceTotals {
    let subtotal: Decimal = lines.iter().map(|l| l.taxable_value).sum();
    let cgst_amount = round_money(lines.iter().map(InvoiceLine::cgst).sum());
    let sgst_amount = round_money(lines.iter().map(InvoiceLine::sgst).sum());
    let igst_amount = round_money(lines.iter().map(InvoiceLine::igst).sum());

    InvoiceTotals {
        subtotal,
        cgst_amount,
        sgst_amount,
        igst_amount,
        freight,
        round_off,
        grand_total: subtotal + cgst_amount + sgst_amount + igst_amount + freight + round_off,
    }
}

/// Outcome of checking a new invoice against the party's credit limit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditCheck {
    pub credit_limit: Option<Decimal>,
    pub outstanding: Decimal,
    pub exposure: Decimal,
    pub exceeded: bool,
}

/// Blocks when `outstanding + new_total > credit_limit`.
///
/// No limit means no block, and a limit of zero counts as no limit.
pub fn check_credit_limit(
    credit_limit: Option<Decimal>,
    outstanding: Decimal,
    new_total: Decimal,
) -> CreditCheck {
    let credit_limit = credit_limit.filter(|limit| *limit > Decimal::ZERO);
    let exposure = outstanding + new_total;
    let exceeded = credit_limit.map(|limit| exposure > limit).unwrap_or(false);
    CreditCheck {
        credit_limit,
        outstanding,
        exposure,
        exceeded,
    }
}

pub(crate) fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ensure_transition;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(taxable: &str, cgst: &str, sgst: &str, igst: &str) -> InvoiceLine {
        InvoiceLine {
            description: "Flush door 32mm".to_string(),
            hsn_code: Some("4418".to_string()),
            quantity: dec("1"),
            rate: dec(taxable),
            taxable_value: dec(taxable),
            cgst_rate: dec(cgst),
            sgst_rate: dec(sgst),
            igst_rate: dec(igst),
        }
    }

    #[test]
    fn test_intra_state_invoice() {
        let lines = vec![line("10000", "9", "9", "0"), line("5000", "9", "9", "0")];
        let totals = compute_invoice_totals(&lines, dec("500"), dec("-0.40"));

        assert_eq!(totals.subtotal, dec("15000"));
        assert_eq!(totals.cgst_amount, dec("1350"));
        assert_eq!(totals.sgst_amount, dec("1350"));
        assert_eq!(totals.igst_amount, Decimal::ZERO);
        assert_eq!(totals.grand_total, dec("18199.60"));
    }

    #[test]
    fn test_inter_state_invoice() {
        let totals = compute_invoice_totals(&[line("2500", "0", "0", "18")], Decimal::ZERO, Decimal::ZERO);
        assert_eq!(totals.igst_amount, dec("450"));
        assert_eq!(totals.grand_total, dec("2950"));
    }

    #[test]
    fn test_credit_limit_blocks_over_limit() {
        let check = check_credit_limit(Some(dec("100000")), dec("80000"), dec("25000"));
        assert!(check.exceeded);
        assert_eq!(check.exposure, dec("105000"));
    }

    #[test]
    fn test_credit_limit_allows_exact_limit() {
        let check = check_credit_limit(Some(dec("100000")), dec("75000"), dec("25000"));
        assert!(!check.exceeded);
    }

    #[test]
    fn test_no_credit_limit_never_blocks() {
        assert!(!check_credit_limit(None, dec("9999999"), dec("1")).exceeded);
    }

    #[test]
    fn test_request_workflow_is_linear() {
        use BillingRequestStatus::*;
        assert!(ensure_transition(Pending, DcCreated).is_ok());
        assert!(ensure_transition(Pending, InvoiceCreated).is_err());
        assert!(ensure_transition(BillingApproved, SentToDispatch).is_ok());
        assert!(SentToDispatch.is_terminal());
    }

    #[test]
    fn test_zero_credit_limit_means_unlimited() {
        let check = check_credit_limit(Some(Decimal::ZERO), Decimal::from(50_000), Decimal::from(1));
        assert!(!check.exceeded);
        assert_eq!(check.credit_limit, None);
        assert!(check_credit_limit(Some(Decimal::ONE), Decimal::ZERO, Decimal::from(2)).exceeded);
    }

    #[test]
    fn test_unapproved_challan_is_approved_on_the_way_to_dispatch() {
        let mut current = ChallanStatus::Draft;
        for step in ChallanStatus::Draft.route_to_dispatch() {
            assert!(ensure_transition(current, *step).is_ok(), "{current} -> {step}");
            current = *step;
        }
        assert_eq!(current, ChallanStatus::SentToDispatch);
        assert!(ensure_transition(ChallanStatus::Draft, ChallanStatus::SentToDispatch).is_err());
        assert!(ChallanStatus::SentToDispatch.route_to_dispatch().is_empty());
    }

    #[test]
    fn test_sent_documents_are_frozen() {
        assert!(!ChallanStatus::SentToDispatch.is_editable());
        assert!(ChallanStatus::Approved.is_editable());
        assert!(!InvoiceStatus::SentToDispatch.is_editable());
    }
}
