//! WebAssembly module for Doorworks ERP
//!
//! Lets the browser preview the numbers the server will compute:
//! - Quotation, invoice and purchase order totals
//! - Credit limit checks before an invoice is approved
//! - Receivable due dates, aging and payment allocation limits
//! - The next document number a form is about to be given
//! - GSTIN / PAN checks on party and vendor forms

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("doorworks-wasm ready"));
}

fn to_js(err: String) -> JsValue {
    JsValue::from_str(&err)
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|e| format!("Invalid {field} '{raw}': {e}"))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid {field} '{raw}': {e}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

fn quotation_totals_json(
    lines_json: &str,
    discount_amount: &str,
    discount_percentage: &str,
) -> Result<String, String> {
    let lines: Vec<QuotationLine> = serde_json::from_str(lines_json)
        .map_err(|e| format!("Invalid quotation lines JSON: {e}"))?;
    let discount_amount = if discount_amount.trim().is_empty() {
        Decimal::ZERO
    } else {
        parse_decimal("discount_amount", discount_amount)?
    };
    let discount_percentage = if discount_percentage.trim().is_empty() {
        None
    } else {
        Some(parse_decimal("discount_percentage", discount_percentage)?)
    };
    to_json(&compute_quotation_totals(&lines, discount_amount, discount_percentage))
}

/// Quotation totals (subtotal, discount, 18% GST, total) as JSON.
/// Leave `discount_percentage` empty to use the flat `discount_amount`.
#[wasm_bindgen]
pub fn calculate_quotation_totals(
    lines_json: &str,
    discount_amount: &str,
    discount_percentage: &str,
) -> Result<String, JsValue> {
    quotation_totals_json(lines_json, discount_amount, discount_percentage).map_err(to_js)
}

fn invoice_totals_json(lines_json: &str, freight: &str, round_off: &str) -> Result<String, String> {
    let lines: Vec<InvoiceLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid invoice lines JSON: {e}"))?;
    let totals = compute_invoice_totals(
        &lines,
        parse_decimal("freight", freight)?,
        parse_decimal("round_off", round_off)?,
    );
    to_json(&totals)
}

/// Invoice totals for a JSON array of invoice lines, returned as JSON
#[wasm_bindgen]
pub fn calculate_invoice_totals(
    lines_json: &str,
    freight: &str,
    round_off: &str,
) -> Result<String, JsValue> {
    invoice_totals_json(lines_json, freight, round_off).map_err(to_js)
}

fn po_totals_json(lines_json: &str) -> Result<String, String> {
    let lines: Vec<PurchaseOrderLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid order lines JSON: {e}"))?;
    to_json(&compute_po_totals(&lines))
}

/// Purchase order totals for a JSON array of order lines, returned as JSON
#[wasm_bindgen]
pub fn calculate_po_totals(lines_json: &str) -> Result<String, JsValue> {
    po_totals_json(lines_json).map_err(to_js)
}

fn credit_exceeded(credit_limit: &str, outstanding: &str, invoice_total: &str) -> Result<bool, String> {
    let limit = if credit_limit.trim().is_empty() {
        None
    } else {
        Some(parse_decimal("credit_limit", credit_limit)?)
    };
    let check = check_credit_limit(
        limit,
        parse_decimal("outstanding", outstanding)?,
        parse_decimal("invoice_total", invoice_total)?,
    );
    Ok(check.exceeded)
}

/// Whether approving an invoice would push the party past its credit limit.
/// An empty `credit_limit` means the party has no limit.
#[wasm_bindgen]
pub fn would_exceed_credit_limit(
    credit_limit: &str,
    outstanding: &str,
    invoice_total: &str,
) -> Result<bool, JsValue> {
    credit_exceeded(credit_limit, outstanding, invoice_total).map_err(to_js)
}

fn aging_json(
    invoice_date: &str,
    payment_terms: Option<String>,
    credit_days: Option<i32>,
    invoice_amount: &str,
    paid_amount: &str,
    today: &str,
) -> Result<String, String> {
    let period = credit_period_days(payment_terms.as_deref(), credit_days);
    let snapshot = age_receivable(
        parse_date("invoice_date", invoice_date)?,
        period,
        parse_decimal("invoice_amount", invoice_amount)?,
        parse_decimal("paid_amount", paid_amount)?,
        parse_date("today", today)?,
    );
    to_json(&snapshot)
}

/// Aging snapshot (due date, days overdue, bucket, status) of one invoice as JSON
#[wasm_bindgen]
pub fn age_invoice(
    invoice_date: &str,
    payment_terms: Option<String>,
    credit_days: Option<i32>,
    invoice_amount: &str,
    paid_amount: &str,
    today: &str,
) -> Result<String, JsValue> {
    aging_json(invoice_date, payment_terms, credit_days, invoice_amount, paid_amount, today)
        .map_err(to_js)
}

fn due_date_string(
    invoice_date: &str,
    payment_terms: Option<String>,
    credit_days: Option<i32>,
) -> Result<String, String> {
    let period = credit_period_days(payment_terms.as_deref(), credit_days);
    let due = due_date(parse_date("invoice_date", invoice_date)?, period);
    Ok(due.format("%Y-%m-%d").to_string())
}

/// Due date (`YYYY-MM-DD`) from the party's payment terms, falling back to credit days
#[wasm_bindgen]
pub fn invoice_due_date(
    invoice_date: &str,
    payment_terms: Option<String>,
    credit_days: Option<i32>,
) -> Result<String, JsValue> {
    due_date_string(invoice_date, payment_terms, credit_days).map_err(to_js)
}

/// Aging bucket label for a number of days past due
#[wasm_bindgen]
pub fn aging_bucket_label(days_overdue: i32) -> String {
    AgingBucket::classify(i64::from(days_overdue)).to_string()
}

fn allocation_error(amount: &str, unallocated: &str, outstanding: &str) -> Result<Option<String>, String> {
    let result = validate_allocation(
        parse_decimal("amount", amount)?,
        parse_decimal("unallocated", unallocated)?,
        parse_decimal("outstanding", outstanding)?,
    );
    Ok(result.err().map(|e| e.to_string()))
}

/// Reason an allocation would be refused, or `undefined` when it is acceptable
#[wasm_bindgen]
pub fn check_allocation(
    amount: &str,
    unallocated: &str,
    outstanding: &str,
) -> Result<Option<String>, JsValue> {
    allocation_error(amount, unallocated, outstanding).map_err(to_js)
}

/// Preview of the next number in a series, e.g. `("INV-", 4, ["INV-0007"])` gives `INV-0008`
#[wasm_bindgen]
pub fn next_document_number(prefix: &str, width: usize, existing: Vec<String>) -> String {
    shared::numbering::next_document_number(prefix, width, None, existing.iter().map(String::as_str))
}

/// GSTIN format check for party and vendor forms
#[wasm_bindgen]
pub fn is_valid_gstin(gstin: &str) -> bool {
    validate_gstin(gstin).is_ok()
}

#[wasm_bindgen]
pub fn is_valid_pan(pan: &str) -> bool {
    validate_pan(pan).is_ok()
}

/// Door types a flat still needs, given the door types already fixed
#[wasm_bindgen]
pub fn pending_door_labels(
    main_door: bool,
    bedroom_door: bool,
    bathroom_door: bool,
    kitchen_door: bool,
    fixed_door_types: Vec<String>,
) -> js_sys::Array {
    let required = DoorRequirements {
        main_door,
        bedroom_door,
        bathroom_door,
        kitchen_door,
    };
    pending_doors(required, fixed_door_types.iter().map(String::as_str))
        .into_iter()
        .map(JsValue::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_totals_json() {
        let lines = r#"[{"description":"Flush door","quantity":"2","rate":"5000",
            "taxable_value":"10000","cgst_rate":"9","sgst_rate":"9"}]"#;
        let json = invoice_totals_json(lines, "250", "0").unwrap();
        let totals: InvoiceTotals = serde_json::from_str(&json).unwrap();
        assert_eq!(totals.grand_total, Decimal::from(12_050));
    }

    #[test]
    fn test_quotation_totals_json() {
        let lines = r#"[{"description":"Panel door","quantity":"4","rate":"2500"}]"#;
        let json = quotation_totals_json(lines, "", "10").unwrap();
        let totals: QuotationTotals = serde_json::from_str(&json).unwrap();
        assert_eq!(totals.subtotal, Decimal::from(10_000));
        assert_eq!(totals.discount_amount, Decimal::from(1_000));
        assert_eq!(totals.total_amount, Decimal::from(10_620));
    }

    #[test]
    fn test_due_date_from_terms() {
        assert_eq!(
            due_date_string("2024-01-10", Some("Net 30".to_string()), Some(45)).unwrap(),
            "2024-02-09"
        );
        assert_eq!(due_date_string("2024-01-10", None, Some(15)).unwrap(), "2024-01-25");
        assert_eq!(due_date_string("2024-01-10", None, None).unwrap(), "2024-01-10");
        assert!(due_date_string("10/01/2024", None, None).is_err());
    }

    #[test]
    fn test_next_document_number_preview() {
        let existing = vec!["INV-0007".to_string(), "INV-0012".to_string()];
        assert_eq!(next_document_number("INV-", 4, existing), "INV-0013");
        assert_eq!(next_document_number("PO-", 0, Vec::new()), "PO-1");
    }

    #[test]
    fn test_invoice_totals_rejects_bad_input() {
        assert!(invoice_totals_json("not json", "0", "0").is_err());
        assert!(invoice_totals_json("[]", "ten", "0").is_err());
    }

    #[test]
    fn test_credit_check() {
        assert!(credit_exceeded("100000", "90000", "20000").unwrap());
        assert!(!credit_exceeded("100000", "80000", "20000").unwrap());
        assert!(!credit_exceeded("", "900000", "1").unwrap());
    }

    #[test]
    fn test_aging_bucket_labels() {
        assert_eq!(aging_bucket_label(0), "current");
        assert_eq!(aging_bucket_label(45), "31-60");
        assert_eq!(aging_bucket_label(120), "90+");
    }

    #[test]
    fn test_allocation_check() {
        assert_eq!(allocation_error("500", "1000", "800").unwrap(), None);
        assert!(allocation_error("0", "1000", "800").unwrap().is_some());
        assert!(allocation_error("900", "1000", "800").unwrap().is_some());
    }

    #[test]
    fn test_tax_id_checks() {
        assert!(is_valid_gstin("27AAPFU0939F1ZV"));
        assert!(!is_valid_gstin("27AAPFU0939F1Z"));
        assert!(is_valid_pan("AAPFU0939F"));
        assert!(!is_valid_pan("AAPF0939F"));
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn pending_door_labels_returns_js_strings() {
        let labels = pending_door_labels(true, true, false, false, vec!["Main Door".to_string()]);
        let labels: Vec<String> = labels.iter().filter_map(|v| v.as_string()).collect();
        assert!(!labels.iter().any(|l| l == "Main Door"));
        assert!(labels.iter().any(|l| l == "Bedroom Door"));
    }

    #[wasm_bindgen_test]
    fn malformed_totals_surface_as_js_errors() {
        assert!(calculate_invoice_totals("not json", "0", "0").is_err());
    }
}
