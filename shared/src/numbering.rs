//! Document numbering
//!
//! Numbers are a fixed prefix followed by a decimal counter, e.g. `INV-0001`
//! or `PO-302`. The next number is one past the highest counter already used
//! with the same prefix.

use chrono::NaiveDate;
use serde::Serialize;

/// A numbering series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentSeries {
    pub prefix: &'static str,
    /// Zero-padding width, 0 for none
    pub width: usize,
    /// Counter restarts at 1 once it would exceed this value
    pub wrap_at: Option<u64>,
}

impl DocumentSeries {
    pub const fn new(prefix: &'static str, width: usize) -> Self {
        Self {
            prefix,
            width,
            wrap_at: None,
        }
    }

    pub const fn wrapping(prefix: &'static str, width: usize, wrap_at: u64) -> Self {
        Self {
            prefix,
            width,
            wrap_at: Some(wrap_at),
        }
    }

    /// Next number in this series given the numbers already issued
    pub fn next<'a, I>(&self, existing: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        next_document_number(self.prefix, self.width, self.wrap_at, existing)
    }
}

// Sales
pub const LEAD: DocumentSeries = DocumentSeries::new("LD-", 4);
pub const SITE_PROJECT: DocumentSeries = DocumentSeries::new("PJ-", 4);
pub const QUOTATION: DocumentSeries = DocumentSeries::new("QT-", 4);
pub const SALES_ORDER: DocumentSeries = DocumentSeries::new("SO-", 4);
pub const MEASUREMENT_REQUEST: DocumentSeries = DocumentSeries::new("MR-", 4);

// Production
pub const MEASUREMENT: DocumentSeries = DocumentSeries::new("MP", 5);
pub const SHUTTER_PAPER: DocumentSeries = DocumentSeries::wrapping("S", 4, 9999);
pub const FRAME_PAPER: DocumentSeries = DocumentSeries::wrapping("F", 4, 9999);
pub const GENERAL_PAPER: DocumentSeries = DocumentSeries::wrapping("P", 4, 9999);

// Quality
pub const QUALITY_CHECK: DocumentSeries = DocumentSeries::new("QC", 3);
pub const REWORK_JOB: DocumentSeries = DocumentSeries::new("RW", 3);
pub const QC_CERTIFICATE: DocumentSeries = DocumentSeries::new("QCCERT", 3);

// Billing and dispatch
pub const BILLING_REQUEST: DocumentSeries = DocumentSeries::new("DR-", 4);
pub const DELIVERY_CHALLAN: DocumentSeries = DocumentSeries::new("DC-", 4);
pub const TAX_INVOICE: DocumentSeries = DocumentSeries::new("INV-", 4);
pub const DISPATCH: DocumentSeries = DocumentSeries::new("DSP-", 4);
pub const GATE_PASS: DocumentSeries = DocumentSeries::new("GP-", 4);

// Accounts
pub const PAYMENT_RECEIPT: DocumentSeries = DocumentSeries::new("PR-", 4);
pub const RECONCILIATION: DocumentSeries = DocumentSeries::new("REC-", 4);

// Purchase
pub const VENDOR: DocumentSeries = DocumentSeries::new("VEN", 4);
pub const PURCHASE_REQUISITION: DocumentSeries = DocumentSeries::new("PR-", 0);
pub const PURCHASE_ORDER: DocumentSeries = DocumentSeries::new("PO-", 0);
pub const GOODS_RECEIPT: DocumentSeries = DocumentSeries::new("GRN-", 0);
pub const PURCHASE_RETURN: DocumentSeries = DocumentSeries::new("PRET-", 3);
pub const VENDOR_BILL: DocumentSeries = DocumentSeries::new("VB-", 3);

// Master data
pub const SUPPLIER: DocumentSeries = DocumentSeries::new("SUP", 3);
pub const CUSTOMER: DocumentSeries = DocumentSeries::new("CUS", 4);
pub const DOOR_PRODUCT: DocumentSeries = DocumentSeries::new("D", 4);
pub const FRAME_PRODUCT: DocumentSeries = DocumentSeries::new("F", 4);
pub const SITE: DocumentSeries = DocumentSeries::new("SITE-", 4);

/// Serial number rows on a measurement sheet: `A00001`
pub const MEASUREMENT_SERIAL_WIDTH: usize = 5;
pub const MEASUREMENT_SERIAL_WRAP: u64 = 99_999;

/// Production paper series for a product category
pub fn production_paper_series(product_category: &str) -> DocumentSeries {
    match product_category {
        "Shutter" => SHUTTER_PAPER,
        "Frame" => FRAME_PAPER,
        _ => GENERAL_PAPER,
    }
}

/// Product code series for a product category
pub fn product_series(product_category: &str) -> DocumentSeries {
    if product_category == "Door" {
        DOOR_PRODUCT
    } else {
        FRAME_PRODUCT
    }
}

/// Prefix for measurement tasks issued on `date`: `MT-20240115-`
pub fn measurement_task_prefix(date: NaiveDate) -> String {
    format!("MT-{}-", date.format("%Y%m%d"))
}

/// Numeric counter of `number` when it starts with `prefix` and the rest is digits
pub fn numeric_suffix(number: &str, prefix: &str) -> Option<u64> {
    let rest = number.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Render a counter in a series
pub fn format_document_number(prefix: &str, width: usize, counter: u64) -> String {
    format!("{}{:0width$}", prefix, counter, width = width)
}

/// Next document number after the highest counter found in `existing`
pub fn next_document_number<'a, I>(
    prefix: &str,
    width: usize,
    wrap_at: Option<u64>,
    existing: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter_map(|n| numeric_suffix(n, prefix))
        .max()
        .unwrap_or(0);

    let mut next = max.saturating_add(1);
    if let Some(limit) = wrap_at {
        if next > limit {
            next = 1;
        }
    }
    format_document_number(prefix, width, next)
}

/// Next per-user serial number, `None` when the user has no prefix
pub fn next_serial_number(prefix: Option<&str>, counter: u64) -> Option<(String, u64)> {
    let prefix = prefix.filter(|p| !p.is_empty())?;
    let mut next = counter + 1;
    if next > MEASUREMENT_SERIAL_WRAP {
        next = 1;
    }
    Some((
        format_document_number(prefix, MEASUREMENT_SERIAL_WIDTH, next),
        next,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number() {
        assert_eq!(PAYMENT_RECEIPT.next(std::iter::empty()), "PR-0001");
        assert_eq!(PURCHASE_ORDER.next(std::iter::empty()), "PO-1");
        assert_eq!(QUALITY_CHECK.next(std::iter::empty()), "QC001");
    }

    #[test]
    fn test_sequential_numbers() {
        let first = PAYMENT_RECEIPT.next(std::iter::empty());
        let second = PAYMENT_RECEIPT.next([first.as_str()]);
        assert_eq!(second, "PR-0002");
    }

    #[test]
    fn test_uses_highest_suffix_not_latest() {
        let existing = ["INV-0007", "INV-0012", "INV-0003"];
        assert_eq!(TAX_INVOICE.next(existing), "INV-0013");
    }

    #[test]
    fn test_ignores_foreign_numbers() {
        let existing = ["PO-12", "PO-ABC", "GRN-99", "PO-"];
        assert_eq!(PURCHASE_ORDER.next(existing), "PO-13");
    }

    #[test]
    fn test_unpadded_counter_grows() {
        assert_eq!(GOODS_RECEIPT.next(["GRN-557"]), "GRN-558");
        assert_eq!(PURCHASE_ORDER.next(["PO-99"]), "PO-100");
    }

    #[test]
    fn test_padding_overflows_gracefully() {
        assert_eq!(QUALITY_CHECK.next(["QC999"]), "QC1000");
    }

    #[test]
    fn test_paper_series_wraps() {
        assert_eq!(SHUTTER_PAPER.next(["S9999"]), "S0001");
        assert_eq!(production_paper_series("Frame").next(["F0041"]), "F0042");
        assert_eq!(production_paper_series("Door").prefix, "P");
    }

    #[test]
    fn test_measurement_task_prefix() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let prefix = measurement_task_prefix(date);
        assert_eq!(prefix, "MT-20240115-");
        assert_eq!(
            next_document_number(&prefix, 3, None, ["MT-20240115-004"]),
            "MT-20240115-005"
        );
    }

    #[test]
    fn test_serial_numbers() {
        assert_eq!(next_serial_number(Some("A"), 0), Some(("A00001".to_string(), 1)));
        assert_eq!(next_serial_number(Some("B"), 99_999), Some(("B00001".to_string(), 1)));
        assert_eq!(next_serial_number(None, 5), None);
        assert_eq!(next_serial_number(Some(""), 5), None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn prop_next_is_above_every_issued_counter(
                counters in prop::collection::vec(1u64..100_000, 0..20),
                width in 0usize..6,
            ) {
                let issued: Vec<String> = counters
                    .iter()
                    .map(|c| format_document_number("INV-", width, *c))
                    .collect();
                let next = next_document_number("INV-", width, None, issued.iter().map(String::as_str));
                let counter = numeric_suffix(&next, "INV-").unwrap();

                prop_assert_eq!(counter, counters.iter().max().copied().unwrap_or(0) + 1);
                prop_assert!(!issued.contains(&next));
            }

            #[test]
            fn prop_wrapping_series_stays_in_range(last in 0u64..=9_999) {
                let next = SHUTTER_PAPER.next([format_document_number("S", 4, last).as_str()]);
                let counter = numeric_suffix(&next, "S").unwrap();
                prop_assert!((1..=9_999).contains(&counter));
                prop_assert_eq!(next.len(), 5);
            }
        }
    }
}
