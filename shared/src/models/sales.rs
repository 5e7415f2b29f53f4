//! Sales pipeline: leads, quotations, sales orders, measurement requests

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::billing::{percent_of, round_money};
use crate::workflow::Workflow;

/// GST applied to quotations, in percent
pub const QUOTATION_GST_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 0);

crate::string_enum! {
    pub enum LeadStatus ("lead status") {
        New => "New",
        Contacted => "Contacted",
        Qualified => "Qualified",
        QuotationSent => "Quotation Sent",
        Won => "Won",
        Lost => "Lost",
    }
}

impl Workflow for LeadStatus {
    const ENTITY: &'static str = "lead";

    fn allowed_next(&self) -> &'static [Self] {
        use LeadStatus::*;
        match self {
            New => &[Contacted, Won, Lost],
            Contacted => &[Qualified, Won, Lost],
            Qualified => &[QuotationSent, Won, Lost],
            QuotationSent => &[Won, Lost],
            Won | Lost => &[],
        }
    }
}

crate::string_enum! {
    pub enum QuotationStatus ("quotation status") {
        Draft => "Draft",
        Sent => "Sent",
        Accepted => "Accepted",
        Rejected => "Rejected",
        Expired => "Expired",
    }
}

impl Workflow for QuotationStatus {
    const ENTITY: &'static str = "quotation";

    fn allowed_next(&self) -> &'static [Self] {
        use QuotationStatus::*;
        match self {
            Draft => &[Sent],
            Sent => &[Accepted, Rejected, Expired],
            Accepted | Rejected | Expired => &[],
        }
    }
}

crate::string_enum! {
    pub enum SalesOrderStatus ("sales order status") {
        Confirmed => "Confirmed",
        MeasurementPending => "Measurement Pending",
        InProduction => "In Production",
        ReadyForDispatch => "Ready for Dispatch",
        Dispatched => "Dispatched",
        Delivered => "Delivered",
    }
}

impl Workflow for SalesOrderStatus {
    const ENTITY: &'static str = "sales order";

    fn allowed_next(&self) -> &'static [Self] {
        use SalesOrderStatus::*;
        match self {
            Confirmed => &[MeasurementPending],
            MeasurementPending => &[InProduction],
            InProduction => &[ReadyForDispatch],
            ReadyForDispatch => &[Dispatched],
            Dispatched => &[Delivered],
            Delivered => &[],
        }
    }
}

impl SalesOrderStatus {
    /// Sales may no longer edit an order once production has started
    pub fn is_locked_for_sales(&self) -> bool {
        matches!(
            self,
            SalesOrderStatus::InProduction
                | SalesOrderStatus::ReadyForDispatch
                | SalesOrderStatus::Dispatched
                | SalesOrderStatus::Delivered
        )
    }
}

crate::string_enum! {
    pub enum MeasurementRequestStatus ("measurement request status") {
        Pending => "Pending",
        Assigned => "Assigned",
        Scheduled => "Scheduled",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

impl Workflow for MeasurementRequestStatus {
    const ENTITY: &'static str = "measurement request";

    fn allowed_next(&self) -> &'static [Self] {
        use MeasurementRequestStatus::*;
        match self {
            Pending => &[Assigned, Cancelled],
            Assigned => &[Scheduled, Cancelled],
            Scheduled => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

/// Quotation line: `amount = quantity * rate - discount`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationLine {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub product_id: Option<uuid::Uuid>,
}

impl QuotationLine {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.rate - self.discount
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotationTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Quotation totals with 18% GST on the discounted subtotal.
///
/// A discount percentage, when given, overrides the flat discount amount.
pub fn compute_quotation_totals(
    lines: &[QuotationLine],
    discount_amount: Decimal,
    discount_percentage: Option<Decimal>,
) -> QuotationTotals {
    let subtotal = round_money(lines.iter().map(QuotationLine::amount).sum());
    let discount_amount = match discount_percentage {
        Some(pct) if !pct.is_zero() => round_money(percent_of(subtotal, pct)),
        _ => round_money(discount_amount),
    };
    let taxable = subtotal - discount_amount;
    let tax_amount = round_money(percent_of(taxable, QUOTATION_GST_RATE));

    QuotationTotals {
        subtotal,
        discount_amount,
        tax_amount,
        total_amount: taxable + tax_amount,
    }
}

/// Won leads over all leads, in percent
pub fn conversion_rate(won: i64, total: i64) -> Decimal {
    if total <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(won) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(qty: &str, rate: &str, discount: &str) -> QuotationLine {
        QuotationLine {
            description: "Bedroom door shutter".to_string(),
            quantity: dec(qty),
            rate: dec(rate),
            discount: dec(discount),
            product_id: None,
        }
    }

    #[test]
    fn test_quotation_totals_flat_discount() {
        let totals = compute_quotation_totals(&[line("10", "4500", "0"), line("2", "9000", "500")], dec("1000"), None);
        assert_eq!(totals.subtotal, dec("62500"));
        assert_eq!(totals.discount_amount, dec("1000"));
        assert_eq!(totals.tax_amount, dec("11070"));
        assert_eq!(totals.total_amount, dec("72570"));
    }

    #[test]
    fn test_quotation_totals_percentage_discount() {
        let totals = compute_quotation_totals(&[line("10", "1000", "0")], dec("999"), Some(dec("10")));
        assert_eq!(totals.discount_amount, dec("1000"));
        assert_eq!(totals.tax_amount, dec("1620"));
        assert_eq!(totals.total_amount, dec("10620"));
    }

    #[test]
    fn test_order_lock_after_production() {
        assert!(!SalesOrderStatus::Confirmed.is_locked_for_sales());
        assert!(!SalesOrderStatus::MeasurementPending.is_locked_for_sales());
        assert!(SalesOrderStatus::InProduction.is_locked_for_sales());
        assert!(SalesOrderStatus::Delivered.is_locked_for_sales());
    }

    #[test]
    fn test_conversion_rate() {
        assert_eq!(conversion_rate(0, 0), Decimal::ZERO);
        assert_eq!(conversion_rate(1, 4), dec("25"));
    }
}
