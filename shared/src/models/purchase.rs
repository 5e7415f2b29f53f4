//! Purchase requisitions, orders, goods receipts and vendor bills

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::billing::{percent_of, round_money};
use crate::workflow::Workflow;

crate::string_enum! {
    pub enum RequisitionStatus ("purchase requisition status") {
        Draft => "Draft",
        Submitted => "Submitted",
        Approved => "Approved",
        Rejected => "Rejected",
        ConvertedToPo => "Converted to PO",
    }
}

impl Workflow for RequisitionStatus {
    const ENTITY: &'static str = "purchase requisition";

    fn allowed_next(&self) -> &'static [Self] {
        use RequisitionStatus::*;
        match self {
            Draft => &[Submitted],
            Submitted => &[Approved, Rejected],
            Approved => &[ConvertedToPo],
            Rejected | ConvertedToPo => &[],
        }
    }
}

crate::string_enum! {
    pub enum PurchaseOrderStatus ("purchase order status") {
        Draft => "Draft",
        Approved => "Approved",
        SentToVendor => "Sent to Vendor",
        PartiallyReceived => "Partially Received",
        Closed => "Closed",
    }
}

impl Workflow for PurchaseOrderStatus {
    const ENTITY: &'static str = "purchase order";

    fn allowed_next(&self) -> &'static [Self] {
        use PurchaseOrderStatus::*;
        match self {
            Draft => &[Approved],
            Approved => &[SentToVendor, PartiallyReceived, Closed],
            SentToVendor => &[PartiallyReceived, Closed],
            PartiallyReceived => &[Closed],
            Closed => &[],
        }
    }
}

impl PurchaseOrderStatus {
    /// Orders against which goods may be received
    pub const RECEIVABLE: &'static [PurchaseOrderStatus] = &[
        PurchaseOrderStatus::Approved,
        PurchaseOrderStatus::SentToVendor,
        PurchaseOrderStatus::PartiallyReceived,
    ];

    /// Status after `received` of `ordered` units have arrived
    pub fn after_receipt(ordered: Decimal, received: Decimal) -> Self {
        if received >= ordered {
            PurchaseOrderStatus::Closed
        } else {
            PurchaseOrderStatus::PartiallyReceived
        }
    }
}

crate::string_enum! {
    pub enum GrnStatus ("goods receipt status") {
        Draft => "Draft",
        Approved => "Approved",
        Rejected => "Rejected",
    }
}

impl Workflow for GrnStatus {
    const ENTITY: &'static str = "goods receipt note";

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            GrnStatus::Draft => &[GrnStatus::Approved, GrnStatus::Rejected],
            GrnStatus::Approved | GrnStatus::Rejected => &[],
        }
    }
}

crate::string_enum! {
    pub enum VendorBillStatus ("vendor bill status") {
        Pending => "Pending",
        Approved => "Approved",
        Paid => "Paid",
        Rejected => "Rejected",
    }
}

impl Workflow for VendorBillStatus {
    const ENTITY: &'static str = "vendor bill";

    fn allowed_next(&self) -> &'static [Self] {
        use VendorBillStatus::*;
        match self {
            Pending => &[Approved, Rejected],
            Approved => &[Paid],
            Paid | Rejected => &[],
        }
    }
}

/// Requested material on a requisition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequisitionItem {
    pub item_name: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub required_by: Option<chrono::NaiveDate>,
}

/// Priced line on a purchase order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderLine {
    pub item_name: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    pub rate: Decimal,
    #[serde(default)]
    pub tax_percent: Decimal,
}

impl PurchaseOrderLine {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.rate
    }

    pub fn tax_amount(&self) -> Decimal {
        percent_of(self.amount(), self.tax_percent)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseOrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub total_quantity: Decimal,
}

pub fn compute_po_totals(lines: &[PurchaseOrderLine]) -> PurchaseOrderTotals {
    let subtotal: Decimal = lines.iter().map(PurchaseOrderLine::amount).sum();
    let tax_amount = round_money(lines.iter().map(PurchaseOrderLine::tax_amount).sum());
    PurchaseOrderTotals {
        subtotal,
        tax_amount,
        total_amount: subtotal + tax_amount,
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
    }
}

/// Received material line on a goods receipt note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrnLine {
    pub item_name: String,
    pub received_quantity: Decimal,
    #[serde(default)]
    pub rejected_quantity: Decimal,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl GrnLine {
    pub fn accepted_quantity(&self) -> Result<Decimal, &'static str> {
        if self.received_quantity < Decimal::ZERO || self.rejected_quantity < Decimal::ZERO {
            return Err("Quantities cannot be negative");
        }
        if self.rejected_quantity > self.received_quantity {
            return Err("Rejected quantity cannot exceed received quantity");
        }
        Ok(self.received_quantity - self.rejected_quantity)
    }
}

/// Received, rejected and accepted totals across a GRN
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrnTotals {
    pub received: Decimal,
    pub rejected: Decimal,
    pub accepted: Decimal,
}

pub fn compute_grn_totals(lines: &[GrnLine]) -> Result<GrnTotals, &'static str> {
    let mut totals = GrnTotals {
        received: Decimal::ZERO,
        rejected: Decimal::ZERO,
        accepted: Decimal::ZERO,
    };
    for line in lines {
        totals.accepted += line.accepted_quantity()?;
        totals.received += line.received_quantity;
        totals.rejected += line.rejected_quantity;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn po_line(qty: &str, rate: &str, tax: &str) -> PurchaseOrderLine {
        PurchaseOrderLine {
            item_name: "Laminate sheet".to_string(),
            quantity: dec(qty),
            unit: Some("sheet".to_string()),
            rate: dec(rate),
            tax_percent: dec(tax),
        }
    }

    #[test]
    fn test_po_totals() {
        let totals = compute_po_totals(&[po_line("10", "850", "18"), po_line("4", "1200", "12")]);
        assert_eq!(totals.subtotal, dec("13300"));
        assert_eq!(totals.tax_amount, dec("2106"));
        assert_eq!(totals.total_amount, dec("15406"));
        assert_eq!(totals.total_quantity, dec("14"));
    }

    #[test]
    fn test_grn_accepted_quantity() {
        let line = GrnLine {
            item_name: "Plywood 19mm".to_string(),
            received_quantity: dec("50"),
            rejected_quantity: dec("3"),
            rejection_reason: Some("Edge damage".to_string()),
        };
        assert_eq!(line.accepted_quantity().unwrap(), dec("47"));
    }

    #[test]
    fn test_grn_rejects_more_than_received() {
        let line = GrnLine {
            item_name: "Plywood 19mm".to_string(),
            received_quantity: dec("5"),
            rejected_quantity: dec("6"),
            rejection_reason: None,
        };
        assert!(line.accepted_quantity().is_err());
        assert!(compute_grn_totals(&[line]).is_err());
    }

    #[test]
    fn test_po_status_after_receipt() {
        assert_eq!(
            PurchaseOrderStatus::after_receipt(dec("100"), dec("40")),
            PurchaseOrderStatus::PartiallyReceived
        );
        assert_eq!(
            PurchaseOrderStatus::after_receipt(dec("100"), dec("100")),
            PurchaseOrderStatus::Closed
        );
    }

    #[test]
    fn test_status_strings_match_stored_values() {
        assert_eq!(RequisitionStatus::ConvertedToPo.as_str(), "Converted to PO");
        assert_eq!(
            "Sent to Vendor".parse::<PurchaseOrderStatus>().unwrap(),
            PurchaseOrderStatus::SentToVendor
        );
    }
}
