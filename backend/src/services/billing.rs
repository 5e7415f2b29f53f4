//! Billing requests, delivery challans and GST tax invoices

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    check_credit_limit, compute_invoice_totals, ensure_one_of, ensure_transition, numbering,
    BillingRequestStatus, ChallanItem, ChallanStatus, CreditCheck, InvoiceLine, InvoiceStatus,
    PaperStatus, StatusCount,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::next_number;
use crate::services::production::{ProductionPaper, PAPER_COLUMNS};
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct BillingService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BillingRequest {
    pub id: Uuid,
    pub request_number: String,
    pub production_paper_id: Uuid,
    pub production_paper_number: String,
    pub party_id: Uuid,
    pub party_name: String,
    pub site_address: Option<String>,
    pub remarks: Option<String>,
    pub status: String,
    pub requested_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBillingRequestInput {
    pub production_paper_id: Uuid,
    pub site_address: Option<String>,
    pub remarks: Option<String>,
}

pub(crate) const REQUEST_COLUMNS: &str = "id, request_number, production_paper_id, \
     production_paper_number, party_id, party_name, site_address, remarks, status, requested_by, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeliveryChallan {
    pub id: Uuid,
    pub dc_number: String,
    pub billing_request_id: Uuid,
    pub party_id: Uuid,
    pub party_name: String,
    pub dc_date: NaiveDate,
    pub delivery_address: Option<String>,
    pub vehicle_number: Option<String>,
    pub items: Json<Vec<ChallanItem>>,
    pub remarks: Option<String>,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChallanInput {
    pub billing_request_id: Uuid,
    pub dc_date: Option<NaiveDate>,
    pub delivery_address: Option<String>,
    pub vehicle_number: Option<String>,
    pub items: Vec<ChallanItem>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChallanInput {
    pub delivery_address: Option<String>,
    pub vehicle_number: Option<String>,
    pub items: Option<Vec<ChallanItem>>,
    pub remarks: Option<String>,
}

const CHALLAN_COLUMNS: &str = "id, dc_number, billing_request_id, party_id, party_name, dc_date, \
     delivery_address, vehicle_number, items, remarks, status, approved_by, approved_at, \
     created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaxInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub billing_request_id: Uuid,
    pub delivery_challan_id: Option<Uuid>,
    pub party_id: Uuid,
    pub party_name: String,
    pub party_gstin: Option<String>,
    pub invoice_date: NaiveDate,
    pub place_of_supply: Option<String>,
    pub items: Json<Vec<InvoiceLine>>,
    pub subtotal: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub freight: Decimal,
    pub round_off: Decimal,
    pub grand_total: Decimal,
    pub outstanding_amount: Decimal,
    pub credit_limit_check: bool,
    pub credit_limit_exceeded: bool,
    pub credit_override_by: Option<Uuid>,
    pub credit_override_at: Option<DateTime<Utc>>,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceInput {
    pub billing_request_id: Uuid,
    pub delivery_challan_id: Option<Uuid>,
    pub invoice_date: Option<NaiveDate>,
    pub place_of_supply: Option<String>,
    pub items: Vec<InvoiceLine>,
    #[serde(default)]
    pub freight: Decimal,
    #[serde(default)]
    pub round_off: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceInput {
    pub place_of_supply: Option<String>,
    pub items: Option<Vec<InvoiceLine>>,
    pub freight: Option<Decimal>,
    pub round_off: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveInvoiceInput {
    #[serde(default)]
    pub override_credit_limit: bool,
}

pub(crate) const INVOICE_COLUMNS: &str = "id, invoice_number, billing_request_id, \
     delivery_challan_id, party_id, party_name, party_gstin, invoice_date, place_of_supply, items, \
     subtotal, cgst_amount, sgst_amount, igst_amount, freight, round_off, grand_total, \
     outstanding_amount, credit_limit_check, credit_limit_exceeded, credit_override_by, \
     credit_override_at, status, approved_by, approved_at, created_by, created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct BillingDashboard {
    pub requests_by_status: Vec<StatusCount>,
    pub invoices_by_status: Vec<StatusCount>,
    pub pending_approval_value: Decimal,
    pub credit_blocked_invoices: i64,
}

#[derive(Debug, Deserialize)]
pub struct BillingFilter {
    pub status: Option<String>,
    pub party_id: Option<Uuid>,
}

fn check_invoice_lines(lines: &[InvoiceLine]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::validation("items", "At least one line item is required"));
    }
    for line in lines {
        check_field("items.quantity", shared::validate_positive(line.quantity))?;
        check_field("items.rate", shared::validate_non_negative(line.rate))?;
        check_field("items.taxable_value", shared::validate_non_negative(line.taxable_value))?;
        for rate in [line.cgst_rate, line.sgst_rate, line.igst_rate] {
            check_field("items.tax_rate", shared::validate_percentage(rate))?;
        }
    }
    Ok(())
}

fn check_challan_items(items: &[ChallanItem]) -> AppResult<()> {
    for item in items {
        check_field("items.quantity", shared::validate_positive(item.quantity))?;
    }
    Ok(())
}

/// Credit exposure of a party for a new invoice total.
///
/// Locks the party row so concurrent invoices for one party are checked in turn.
async fn credit_check(
    conn: &mut PgConnection,
    party_id: Uuid,
    exclude_invoice: Option<Uuid>,
    new_total: Decimal,
) -> AppResult<CreditCheck> {
    let credit_limit = sqlx::query_scalar::<_, Option<Decimal>>(
        "SELECT credit_limit FROM parties WHERE id = $1 FOR UPDATE",
    )
    .bind(party_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Party".to_string()))?;

    let statuses: Vec<&str> = InvoiceStatus::OUTSTANDING.iter().map(|s| s.as_str()).collect();
    let outstanding = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(i.grand_total - COALESCE(
                   (SELECT SUM(a.allocated_amount) FROM payment_allocations a WHERE a.invoice_id = i.id),
                   0)), 0)
        FROM tax_invoices i
        WHERE i.party_id = $1 AND i.status = ANY($2) AND ($3::uuid IS NULL OR i.id <> $3)
        "#,
    )
    .bind(party_id)
    .bind(statuses)
    .bind(exclude_invoice)
    .fetch_one(&mut *conn)
    .await?;

    Ok(check_credit_limit(credit_limit, outstanding, new_total))
}

async fn move_request(
    conn: &mut PgConnection,
    request_id: Uuid,
    next: BillingRequestStatus,
) -> AppResult<()> {
    let current: BillingRequestStatus =
        lock_status(&mut *conn, "billing_requests", request_id, "Billing request").await?;
    ensure_transition(current, next)?;
    sqlx::query("UPDATE billing_requests SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(request_id)
        .bind(next.as_str())
        .execute(&mut *conn)
        .await?;
    tracing::info!(%request_id, from = %current, to = %next, "Billing request status changed");
    Ok(())
}

async fn load_request(conn: &mut PgConnection, id: Uuid) -> AppResult<BillingRequest> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM billing_requests WHERE id = $1");
    sqlx::query_as::<_, BillingRequest>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Billing request".to_string()))
}

async fn load_invoice(conn: &mut PgConnection, id: Uuid) -> AppResult<TaxInvoice> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM tax_invoices WHERE id = $1");
    sqlx::query_as::<_, TaxInvoice>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Tax invoice".to_string()))
}

impl BillingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Billing requests ----

    pub async fn list_requests(&self, filter: BillingFilter) -> AppResult<Vec<BillingRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM billing_requests \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR party_id = $2) \
             ORDER BY created_at DESC"
        );
        let requests = sqlx::query_as::<_, BillingRequest>(&sql)
            .bind(filter.status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(requests)
    }

    pub async fn get_request(&self, id: Uuid) -> AppResult<BillingRequest> {
        let mut conn = self.db.acquire().await?;
        load_request(&mut conn, id).await
    }

    pub async fn create_request(
        &self,
        user_id: Uuid,
        input: CreateBillingRequestInput,
    ) -> AppResult<BillingRequest> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM production_papers WHERE id = $1 AND NOT is_deleted FOR UPDATE"
        );
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(input.production_paper_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))?;
        let paper_status: PaperStatus = shared::parse_status(&paper.status)?;
        ensure_one_of(paper_status, &[PaperStatus::ReadyForDispatch])?;

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT request_number FROM billing_requests WHERE production_paper_id = $1",
        )
        .bind(paper.id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(number) = existing {
            return Err(AppError::BusinessRule(format!(
                "Billing request {} already exists for paper {}",
                number, paper.paper_number
            )));
        }

        let number = next_number(&mut tx, "billing_requests", "request_number", numbering::BILLING_REQUEST).await?;
        let sql = format!(
            r#"
            INSERT INTO billing_requests (request_number, production_paper_id, production_paper_number,
                                          party_id, party_name, site_address, remarks, status, requested_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let request = sqlx::query_as::<_, BillingRequest>(&sql)
            .bind(&number)
            .bind(paper.id)
            .bind(&paper.paper_number)
            .bind(paper.party_id)
            .bind(&paper.party_name)
            .bind(input.site_address)
            .bind(input.remarks)
            .bind(BillingRequestStatus::Pending.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(request = %number, paper = %paper.paper_number, "Billing request raised");
        Ok(request)
    }

    // ---- Delivery challans ----

    pub async fn list_challans(&self, filter: BillingFilter) -> AppResult<Vec<DeliveryChallan>> {
        let sql = format!(
            "SELECT {CHALLAN_COLUMNS} FROM delivery_challans \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR party_id = $2) \
             ORDER BY created_at DESC"
        );
        let challans = sqlx::query_as::<_, DeliveryChallan>(&sql)
            .bind(filter.status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(challans)
    }

    pub async fn get_challan(&self, id: Uuid) -> AppResult<DeliveryChallan> {
        let sql = format!("SELECT {CHALLAN_COLUMNS} FROM delivery_challans WHERE id = $1");
        sqlx::query_as::<_, DeliveryChallan>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Delivery challan".to_string()))
    }

    pub async fn create_challan(&self, user_id: Uuid, input: CreateChallanInput) -> AppResult<DeliveryChallan> {
        check_challan_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        let request = load_request(&mut tx, input.billing_request_id).await?;
        let status: BillingRequestStatus = lock_status(
            &mut tx,
            "billing_requests",
            request.id,
            "Billing request",
        )
        .await?;
        ensure_one_of(status, &[BillingRequestStatus::Pending])?;

        let number = next_number(&mut tx, "delivery_challans", "dc_number", numbering::DELIVERY_CHALLAN).await?;
        let sql = format!(
            r#"
            INSERT INTO delivery_challans (dc_number, billing_request_id, party_id, party_name, dc_date,
                                           delivery_address, vehicle_number, items, remarks, status, created_by)
            VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_DATE), $6, $7, $8, $9, $10, $11)
            RETURNING {CHALLAN_COLUMNS}
            "#
        );
        let challan = sqlx::query_as::<_, DeliveryChallan>(&sql)
            .bind(&number)
            .bind(request.id)
            .bind(request.party_id)
            .bind(&request.party_name)
            .bind(input.dc_date)
            .bind(input.delivery_address.or(request.site_address))
            .bind(input.vehicle_number)
            .bind(Json(&input.items))
            .bind(input.remarks)
            .bind(ChallanStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        move_request(&mut tx, request.id, BillingRequestStatus::DcCreated).await?;
        tx.commit().await?;
        tracing::info!(dc = %number, request = %request.request_number, "Delivery challan created");
        Ok(challan)
    }

    pub async fn update_challan(&self, id: Uuid, input: UpdateChallanInput) -> AppResult<DeliveryChallan> {
        if let Some(items) = &input.items {
            check_challan_items(items)?;
        }

        let mut tx = self.db.begin().await?;
        let current: ChallanStatus = lock_status(&mut tx, "delivery_challans", id, "Delivery challan").await?;
        if !current.is_editable() {
            return Err(AppError::BusinessRule(
                "Delivery challan cannot be edited after it is sent to dispatch".to_string(),
            ));
        }

        let sql = format!(
            r#"
            UPDATE delivery_challans SET
                delivery_address = COALESCE($2, delivery_address),
                vehicle_number = COALESCE($3, vehicle_number),
                items = COALESCE($4, items),
                remarks = COALESCE($5, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CHALLAN_COLUMNS}
            "#
        );
        let challan = sqlx::query_as::<_, DeliveryChallan>(&sql)
            .bind(id)
            .bind(input.delivery_address)
            .bind(input.vehicle_number)
            .bind(input.items.as_ref().map(Json))
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(challan)
    }

    pub async fn approve_challan(&self, approver: Uuid, id: Uuid) -> AppResult<DeliveryChallan> {
        let mut tx = self.db.begin().await?;
        let current: ChallanStatus = lock_status(&mut tx, "delivery_challans", id, "Delivery challan").await?;
        ensure_transition(current, ChallanStatus::Approved)?;

        let sql = format!(
            r#"
            UPDATE delivery_challans
            SET status = $2, approved_by = $3, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {CHALLAN_COLUMNS}
            "#
        );
        let challan = sqlx::query_as::<_, DeliveryChallan>(&sql)
            .bind(id)
            .bind(ChallanStatus::Approved.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(dc = %challan.dc_number, "Delivery challan approved");
        Ok(challan)
    }

    // ---- Tax invoices ----

    pub async fn list_invoices(&self, filter: BillingFilter) -> AppResult<Vec<TaxInvoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM tax_invoices \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR party_id = $2) \
             ORDER BY created_at DESC"
        );
        let invoices = sqlx::query_as::<_, TaxInvoice>(&sql)
            .bind(filter.status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(invoices)
    }

    pub async fn get_invoice(&self, id: Uuid) -> AppResult<TaxInvoice> {
        let mut conn = self.db.acquire().await?;
        load_invoice(&mut conn, id).await
    }

    /// Totals and the party credit check are computed inside the creating transaction
    pub async fn create_invoice(&self, user_id: Uuid, input: CreateInvoiceInput) -> AppResult<TaxInvoice> {
        check_invoice_lines(&input.items)?;
        let totals = compute_invoice_totals(&input.items, input.freight, input.round_off);

        let mut tx = self.db.begin().await?;
        let request = load_request(&mut tx, input.billing_request_id).await?;
        let status: BillingRequestStatus =
            lock_status(&mut tx, "billing_requests", request.id, "Billing request").await?;
        ensure_one_of(status, &[BillingRequestStatus::DcCreated])?;

        let challan_id = match input.delivery_challan_id {
            Some(id) => Some(id),
            None => sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM delivery_challans WHERE billing_request_id = $1 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(request.id)
            .fetch_optional(&mut *tx)
            .await?,
        };
        let gstin = sqlx::query_scalar::<_, Option<String>>("SELECT gstin_number FROM parties WHERE id = $1")
            .bind(request.party_id)
            .fetch_one(&mut *tx)
            .await?;

        let credit = credit_check(&mut tx, request.party_id, None, totals.grand_total).await?;
        if credit.exceeded {
            tracing::warn!(
                party = %request.party_name,
                exposure = %credit.exposure,
                limit = ?credit.credit_limit,
                "Invoice exceeds party credit limit"
            );
        }

        let number = next_number(&mut tx, "tax_invoices", "invoice_number", numbering::TAX_INVOICE).await?;
        let sql = format!(
            r#"
            INSERT INTO tax_invoices (
                invoice_number, billing_request_id, delivery_challan_id, party_id, party_name,
                party_gstin, invoice_date, place_of_supply, items, subtotal, cgst_amount,
                sgst_amount, igst_amount, freight, round_off, grand_total, outstanding_amount,
                credit_limit_check, credit_limit_exceeded, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, CURRENT_DATE), $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let invoice = sqlx::query_as::<_, TaxInvoice>(&sql)
            .bind(&number)
            .bind(request.id)
            .bind(challan_id)
            .bind(request.party_id)
            .bind(&request.party_name)
            .bind(gstin)
            .bind(input.invoice_date)
            .bind(input.place_of_supply)
            .bind(Json(&input.items))
            .bind(totals.subtotal)
            .bind(totals.cgst_amount)
            .bind(totals.sgst_amount)
            .bind(totals.igst_amount)
            .bind(totals.freight)
            .bind(totals.round_off)
            .bind(totals.grand_total)
            .bind(credit.outstanding)
            .bind(credit.credit_limit.is_some())
            .bind(credit.exceeded)
            .bind(InvoiceStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        move_request(&mut tx, request.id, BillingRequestStatus::InvoiceCreated).await?;
        tx.commit().await?;
        tracing::info!(invoice = %number, grand_total = %totals.grand_total, "Tax invoice created");
        Ok(invoice)
    }

    pub async fn update_invoice(&self, id: Uuid, input: UpdateInvoiceInput) -> AppResult<TaxInvoice> {
        let mut tx = self.db.begin().await?;
        let current: InvoiceStatus = lock_status(&mut tx, "tax_invoices", id, "Tax invoice").await?;
        if !current.is_editable() {
            return Err(AppError::BusinessRule(
                "Tax invoice cannot be edited after it is sent to dispatch".to_string(),
            ));
        }
        let existing = load_invoice(&mut tx, id).await?;

        let items = input.items.unwrap_or(existing.items.0);
        check_invoice_lines(&items)?;
        let totals = compute_invoice_totals(
            &items,
            input.freight.unwrap_or(existing.freight),
            input.round_off.unwrap_or(existing.round_off),
        );
        let credit = credit_check(&mut tx, existing.party_id, Some(id), totals.grand_total).await?;

        let sql = format!(
            r#"
            UPDATE tax_invoices SET
                place_of_supply = COALESCE($2, place_of_supply),
                items = $3, subtotal = $4, cgst_amount = $5, sgst_amount = $6, igst_amount = $7,
                freight = $8, round_off = $9, grand_total = $10, outstanding_amount = $11,
                credit_limit_check = $12, credit_limit_exceeded = $13, updated_at = NOW()
            WHERE id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let invoice = sqlx::query_as::<_, TaxInvoice>(&sql)
            .bind(id)
            .bind(input.place_of_supply)
            .bind(Json(&items))
            .bind(totals.subtotal)
            .bind(totals.cgst_amount)
            .bind(totals.sgst_amount)
            .bind(totals.igst_amount)
            .bind(totals.freight)
            .bind(totals.round_off)
            .bind(totals.grand_total)
            .bind(credit.outstanding)
            .bind(credit.credit_limit.is_some())
            .bind(credit.exceeded)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(invoice)
    }

    /// `may_override` is true for callers allowed to waive the credit block
    pub async fn approve_invoice(
        &self,
        approver: Uuid,
        id: Uuid,
        input: ApproveInvoiceInput,
        may_override: bool,
    ) -> AppResult<TaxInvoice> {
        let mut tx = self.db.begin().await?;
        let current: InvoiceStatus = lock_status(&mut tx, "tax_invoices", id, "Tax invoice").await?;
        ensure_transition(current, InvoiceStatus::Approved)?;
        let invoice = load_invoice(&mut tx, id).await?;

        let overriding = invoice.credit_limit_exceeded && input.override_credit_limit;
        if invoice.credit_limit_exceeded {
            if !input.override_credit_limit {
                return Err(AppError::BusinessRule(format!(
                    "Invoice {} exceeds the credit limit of {}",
                    invoice.invoice_number, invoice.party_name
                )));
            }
            if !may_override {
                return Err(AppError::InsufficientPermissions);
            }
        }

        let sql = format!(
            r#"
            UPDATE tax_invoices SET
                status = $2, approved_by = $3, approved_at = NOW(),
                credit_override_by = CASE WHEN $4 THEN $3 ELSE credit_override_by END,
                credit_override_at = CASE WHEN $4 THEN NOW() ELSE credit_override_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let invoice = sqlx::query_as::<_, TaxInvoice>(&sql)
            .bind(id)
            .bind(InvoiceStatus::Approved.as_str())
            .bind(approver)
            .bind(overriding)
            .fetch_one(&mut *tx)
            .await?;

        move_request(&mut tx, invoice.billing_request_id, BillingRequestStatus::BillingApproved).await?;
        tx.commit().await?;
        if overriding {
            tracing::warn!(invoice = %invoice.invoice_number, %approver, "Credit limit overridden");
        }
        tracing::info!(invoice = %invoice.invoice_number, "Tax invoice approved");
        Ok(invoice)
    }

    /// Hands the invoice, its billing request and challans over to dispatch
    pub async fn send_to_dispatch(&self, id: Uuid) -> AppResult<TaxInvoice> {
        let mut tx = self.db.begin().await?;
        let current: InvoiceStatus = lock_status(&mut tx, "tax_invoices", id, "Tax invoice").await?;
        ensure_transition(current, InvoiceStatus::SentToDispatch)?;

        let sql = format!(
            "UPDATE tax_invoices SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, TaxInvoice>(&sql)
            .bind(id)
            .bind(InvoiceStatus::SentToDispatch.as_str())
            .fetch_one(&mut *tx)
            .await?;

        move_request(&mut tx, invoice.billing_request_id, BillingRequestStatus::SentToDispatch).await?;
        let challans = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, status FROM delivery_challans WHERE billing_request_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(invoice.billing_request_id)
        .fetch_all(&mut *tx)
        .await?;
        for (challan_id, raw) in challans {
            let mut from: ChallanStatus = shared::parse_status(&raw)?;
            let route = from.route_to_dispatch();
            for step in route {
                ensure_transition(from, *step)?;
                from = *step;
            }
            if route.is_empty() {
                continue;
            }
            sqlx::query(
                "UPDATE delivery_challans SET status = $2, \
                     approved_at = COALESCE(approved_at, NOW()), updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(challan_id)
            .bind(ChallanStatus::SentToDispatch.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(invoice = %invoice.invoice_number, "Invoice sent to dispatch");
        Ok(invoice)
    }

    pub async fn dashboard(&self) -> AppResult<BillingDashboard> {
        let requests_by_status = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM billing_requests GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;
        let invoices_by_status = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM tax_invoices GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;

        let (pending_approval_value, credit_blocked_invoices) = sqlx::query_as::<_, (Decimal, i64)>(
            "SELECT COALESCE(SUM(grand_total), 0), COUNT(*) FILTER (WHERE credit_limit_exceeded) \
             FROM tax_invoices WHERE status = $1",
        )
        .bind(InvoiceStatus::Draft.as_str())
        .fetch_one(&self.db)
        .await?;

        let to_counts = |rows: Vec<(String, i64)>| {
            rows.into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect()
        };
        Ok(BillingDashboard {
            requests_by_status: to_counts(requests_by_status),
            invoices_by_status: to_counts(invoices_by_status),
            pending_approval_value,
            credit_blocked_invoices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn line(taxable: &str) -> InvoiceLine {
        InvoiceLine {
            description: "Flush door 32mm".to_string(),
            hsn_code: Some("4418".to_string()),
            quantity: Decimal::from(10),
            rate: Decimal::from_str("1500").unwrap(),
            taxable_value: Decimal::from_str(taxable).unwrap(),
            cgst_rate: Decimal::from(9),
            sgst_rate: Decimal::from(9),
            igst_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn test_invoice_lines_are_checked() {
        assert!(check_invoice_lines(&[line("15000")]).is_ok());
        assert!(check_invoice_lines(&[]).is_err());
        assert!(check_invoice_lines(&[line("-1")]).is_err());

        let mut bad_rate = line("100");
        bad_rate.igst_rate = Decimal::from(120);
        assert!(check_invoice_lines(&[bad_rate]).is_err());
    }

    #[test]
    fn test_approve_input_defaults_to_no_override() {
        let input: ApproveInvoiceInput = serde_json::from_str("{}").unwrap();
        assert!(!input.override_credit_limit);
    }
}
