//! Purchase pipeline: vendors, requisitions, purchase orders, goods receipts,
//! returns and vendor bills

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute_grn_totals, compute_po_totals, ensure_one_of, ensure_transition, numbering, GrnLine,
    GrnStatus, PurchaseOrderLine, PurchaseOrderStatus, RequisitionItem, RequisitionStatus,
    StatusCount, VendorBillStatus,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::next_number;
use crate::services::status::{delete_row, lock_status};

#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

// ---- Vendors ----

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vendor {
    pub id: Uuid,
    pub vendor_code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub payment_terms: Option<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVendorInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub payment_terms: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVendorInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub payment_terms: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct VendorFilter {
    pub search: Option<String>,
    pub active: Option<bool>,
}

const VENDOR_COLUMNS: &str = "id, vendor_code, name, contact_person, email, phone, address, \
     gstin, pan, payment_terms, is_active, created_by, created_at, updated_at";

fn check_vendor_ids(gstin: Option<&str>, pan: Option<&str>) -> AppResult<()> {
    if let Some(gstin) = gstin {
        check_field("gstin", shared::validate_gstin(gstin))?;
    }
    if let Some(pan) = pan {
        check_field("pan", shared::validate_pan(pan))?;
    }
    Ok(())
}

// ---- Requisitions ----

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseRequisition {
    pub id: Uuid,
    pub pr_number: String,
    pub department: Option<String>,
    pub items: Json<Vec<RequisitionItem>>,
    pub justification: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub requested_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequisitionInput {
    pub department: Option<String>,
    pub items: Vec<RequisitionItem>,
    pub justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequisitionInput {
    pub department: Option<String>,
    pub items: Option<Vec<RequisitionItem>>,
    pub justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequisitionInput {
    pub reason: String,
}

const REQUISITION_COLUMNS: &str = "id, pr_number, department, items, justification, status, \
     rejection_reason, approved_by, approved_at, requested_by, created_at, updated_at";

fn check_requisition_items(items: &[RequisitionItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("items", "At least one item is required"));
    }
    for item in items {
        check_field("items.item_name", shared::validate_non_empty(&item.item_name))?;
        check_field("items.quantity", shared::validate_positive(item.quantity))?;
    }
    Ok(())
}

// ---- Purchase orders ----

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub requisition_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub po_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Json<Vec<PurchaseOrderLine>>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub total_quantity: Decimal,
    pub received_quantity: Decimal,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderInput {
    pub requisition_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Vec<PurchaseOrderLine>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<String>,
    pub vendor_id: Option<Uuid>,
}

const PO_COLUMNS: &str = "id, po_number, requisition_id, vendor_id, vendor_name, po_date, \
     expected_delivery_date, items, subtotal, tax_amount, total_amount, total_quantity, \
     received_quantity, status, approved_by, approved_at, created_by, created_at, updated_at";

fn check_po_lines(lines: &[PurchaseOrderLine]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::validation("items", "At least one line is required"));
    }
    for line in lines {
        check_field("items.item_name", shared::validate_non_empty(&line.item_name))?;
        check_field("items.quantity", shared::validate_positive(line.quantity))?;
        check_field("items.rate", shared::validate_non_negative(line.rate))?;
        check_field("items.tax_percent", shared::validate_percentage(line.tax_percent))?;
    }
    Ok(())
}

// ---- Goods receipts ----

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GoodsReceiptNote {
    pub id: Uuid,
    pub grn_number: String,
    pub purchase_order_id: Uuid,
    pub vendor_id: Uuid,
    pub receipt_date: NaiveDate,
    pub vendor_invoice_number: Option<String>,
    pub items: Json<Vec<GrnLine>>,
    pub total_received: Decimal,
    pub total_rejected: Decimal,
    pub total_accepted: Decimal,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub received_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGrnInput {
    pub purchase_order_id: Uuid,
    pub vendor_id: Uuid,
    pub receipt_date: Option<NaiveDate>,
    pub vendor_invoice_number: Option<String>,
    pub items: Vec<GrnLine>,
}

const GRN_COLUMNS: &str = "id, grn_number, purchase_order_id, vendor_id, receipt_date, \
     vendor_invoice_number, items, total_received, total_rejected, total_accepted, status, \
     approved_by, approved_at, received_by, created_at, updated_at";

// ---- Returns and bills ----

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseReturn {
    pub id: Uuid,
    pub return_number: String,
    pub grn_id: Uuid,
    pub item_name: String,
    pub return_quantity: Decimal,
    pub reason: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReturnInput {
    pub grn_id: Uuid,
    pub item_name: String,
    pub return_quantity: Decimal,
    pub reason: String,
}

const RETURN_COLUMNS: &str =
    "id, return_number, grn_id, item_name, return_quantity, reason, created_by, created_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VendorBill {
    pub id: Uuid,
    pub bill_number: String,
    pub grn_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_invoice_number: Option<String>,
    pub bill_date: NaiveDate,
    pub bill_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBillInput {
    pub grn_id: Uuid,
    pub vendor_invoice_number: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub bill_amount: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BillStatusInput {
    pub status: VendorBillStatus,
}

const BILL_COLUMNS: &str = "id, bill_number, grn_id, vendor_id, vendor_invoice_number, bill_date, \
     bill_amount, tax_amount, total_amount, status, approved_by, approved_at, paid_at, \
     created_by, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct PurchaseStatusFilter {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseDashboard {
    pub open_requisitions: i64,
    pub orders_by_status: Vec<StatusCount>,
    pub pending_grns: i64,
    pub unpaid_bill_value: Decimal,
}

/// Most that may still be returned of one GRN item.
///
/// Rejected stock is returned first; an item with nothing rejected may
/// return from its accepted quantity. Earlier returns count against the limit.
fn return_limit(line: &GrnLine, already_returned: Decimal) -> Result<Decimal, &'static str> {
    let accepted = line.accepted_quantity()?;
    let base = if line.rejected_quantity > Decimal::ZERO {
        line.rejected_quantity
    } else {
        accepted
    };
    Ok((base - already_returned).max(Decimal::ZERO))
}

async fn load_grn(conn: &mut PgConnection, id: Uuid) -> AppResult<GoodsReceiptNote> {
    let sql = format!("SELECT {GRN_COLUMNS} FROM goods_receipt_notes WHERE id = $1");
    sqlx::query_as::<_, GoodsReceiptNote>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Goods receipt note".to_string()))
}

async fn vendor_name(conn: &mut PgConnection, vendor_id: Uuid) -> AppResult<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM vendors WHERE id = $1")
        .bind(vendor_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Vendor".to_string()))
}

impl PurchaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Vendors ----

    pub async fn list_vendors(&self, filter: VendorFilter) -> AppResult<Vec<Vendor>> {
        let sql = format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors \
             WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR vendor_code ILIKE '%' || $1 || '%') \
               AND ($2::bool IS NULL OR is_active = $2) \
             ORDER BY name"
        );
        let vendors = sqlx::query_as::<_, Vendor>(&sql)
            .bind(filter.search)
            .bind(filter.active)
            .fetch_all(&self.db)
            .await?;
        Ok(vendors)
    }

    pub async fn get_vendor(&self, id: Uuid) -> AppResult<Vendor> {
        let sql = format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1");
        sqlx::query_as::<_, Vendor>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vendor".to_string()))
    }

    pub async fn create_vendor(&self, user_id: Uuid, input: CreateVendorInput) -> AppResult<Vendor> {
        input.validate()?;
        check_vendor_ids(input.gstin.as_deref(), input.pan.as_deref())?;

        let mut tx = self.db.begin().await?;
        let code = next_number(&mut tx, "vendors", "vendor_code", numbering::VENDOR).await?;
        let sql = format!(
            r#"
            INSERT INTO vendors (vendor_code, name, contact_person, email, phone, address, gstin, pan,
                                 payment_terms, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {VENDOR_COLUMNS}
            "#
        );
        let vendor = sqlx::query_as::<_, Vendor>(&sql)
            .bind(&code)
            .bind(input.name.trim())
            .bind(input.contact_person)
            .bind(input.email)
            .bind(input.phone)
            .bind(input.address)
            .bind(input.gstin.map(|g| g.trim().to_uppercase()))
            .bind(input.pan.map(|p| p.trim().to_uppercase()))
            .bind(input.payment_terms)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(vendor = %code, name = %vendor.name, "Vendor created");
        Ok(vendor)
    }

    pub async fn update_vendor(&self, id: Uuid, input: UpdateVendorInput) -> AppResult<Vendor> {
        input.validate()?;
        check_vendor_ids(input.gstin.as_deref(), input.pan.as_deref())?;

        let sql = format!(
            r#"
            UPDATE vendors SET
                name = COALESCE($2, name),
                contact_person = COALESCE($3, contact_person),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                gstin = COALESCE($7, gstin),
                pan = COALESCE($8, pan),
                payment_terms = COALESCE($9, payment_terms),
                is_active = COALESCE($10, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VENDOR_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Vendor>(&sql)
            .bind(id)
            .bind(input.name.map(|n| n.trim().to_string()))
            .bind(input.contact_person)
            .bind(input.email)
            .bind(input.phone)
            .bind(input.address)
            .bind(input.gstin.map(|g| g.trim().to_uppercase()))
            .bind(input.pan.map(|p| p.trim().to_uppercase()))
            .bind(input.payment_terms)
            .bind(input.is_active)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vendor".to_string()))
    }

    pub async fn delete_vendor(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "vendors", id, "Vendor").await
    }

    // ---- Requisitions ----

    pub async fn list_requisitions(&self, filter: PurchaseStatusFilter) -> AppResult<Vec<PurchaseRequisition>> {
        let sql = format!(
            "SELECT {REQUISITION_COLUMNS} FROM purchase_requisitions \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        let requisitions = sqlx::query_as::<_, PurchaseRequisition>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(requisitions)
    }

    pub async fn get_requisition(&self, id: Uuid) -> AppResult<PurchaseRequisition> {
        let sql = format!("SELECT {REQUISITION_COLUMNS} FROM purchase_requisitions WHERE id = $1");
        sqlx::query_as::<_, PurchaseRequisition>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase requisition".to_string()))
    }

    pub async fn create_requisition(
        &self,
        user_id: Uuid,
        input: CreateRequisitionInput,
    ) -> AppResult<PurchaseRequisition> {
        check_requisition_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        let number = next_number(&mut tx, "purchase_requisitions", "pr_number", numbering::PURCHASE_REQUISITION).await?;
        let sql = format!(
            r#"
            INSERT INTO purchase_requisitions (pr_number, department, items, justification, status, requested_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {REQUISITION_COLUMNS}
            "#
        );
        let requisition = sqlx::query_as::<_, PurchaseRequisition>(&sql)
            .bind(&number)
            .bind(input.department)
            .bind(Json(&input.items))
            .bind(input.justification)
            .bind(RequisitionStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(requisition = %number, lines = input.items.len(), "Purchase requisition raised");
        Ok(requisition)
    }

    pub async fn update_requisition(
        &self,
        id: Uuid,
        input: UpdateRequisitionInput,
    ) -> AppResult<PurchaseRequisition> {
        if let Some(items) = &input.items {
            check_requisition_items(items)?;
        }

        let mut tx = self.db.begin().await?;
        let current: RequisitionStatus =
            lock_status(&mut tx, "purchase_requisitions", id, "Purchase requisition").await?;
        ensure_one_of(current, &[RequisitionStatus::Draft])?;

        let sql = format!(
            r#"
            UPDATE purchase_requisitions SET
                department = COALESCE($2, department),
                items = COALESCE($3, items),
                justification = COALESCE($4, justification),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REQUISITION_COLUMNS}
            "#
        );
        let requisition = sqlx::query_as::<_, PurchaseRequisition>(&sql)
            .bind(id)
            .bind(input.department)
            .bind(input.items.as_ref().map(Json))
            .bind(input.justification)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(requisition)
    }

    pub async fn submit_requisition(&self, id: Uuid) -> AppResult<PurchaseRequisition> {
        self.decide_requisition(id, RequisitionStatus::Submitted, None, None).await
    }

    pub async fn approve_requisition(&self, approver: Uuid, id: Uuid) -> AppResult<PurchaseRequisition> {
        self.decide_requisition(id, RequisitionStatus::Approved, Some(approver), None).await
    }

    pub async fn reject_requisition(
        &self,
        id: Uuid,
        input: RejectRequisitionInput,
    ) -> AppResult<PurchaseRequisition> {
        check_field("reason", shared::validate_non_empty(&input.reason))?;
        self.decide_requisition(id, RequisitionStatus::Rejected, None, Some(input.reason)).await
    }

    async fn decide_requisition(
        &self,
        id: Uuid,
        next: RequisitionStatus,
        approver: Option<Uuid>,
        reason: Option<String>,
    ) -> AppResult<PurchaseRequisition> {
        let mut tx = self.db.begin().await?;
        let current: RequisitionStatus =
            lock_status(&mut tx, "purchase_requisitions", id, "Purchase requisition").await?;
        ensure_transition(current, next)?;

        let sql = format!(
            r#"
            UPDATE purchase_requisitions SET
                status = $2,
                approved_by = COALESCE($3, approved_by),
                approved_at = CASE WHEN $3::uuid IS NULL THEN approved_at ELSE NOW() END,
                rejection_reason = COALESCE($4, rejection_reason),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REQUISITION_COLUMNS}
            "#
        );
        let requisition = sqlx::query_as::<_, PurchaseRequisition>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(approver)
            .bind(reason)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(requisition = %requisition.pr_number, from = %current, to = %next, "Requisition status changed");
        Ok(requisition)
    }

    // ---- Purchase orders ----

    pub async fn list_orders(&self, filter: PurchaseOrderFilter) -> AppResult<Vec<PurchaseOrder>> {
        let sql = format!(
            "SELECT {PO_COLUMNS} FROM purchase_orders \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR vendor_id = $2) \
             ORDER BY created_at DESC"
        );
        let orders = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(filter.status)
            .bind(filter.vendor_id)
            .fetch_all(&self.db)
            .await?;
        Ok(orders)
    }

    pub async fn get_order(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        let sql = format!("SELECT {PO_COLUMNS} FROM purchase_orders WHERE id = $1");
        sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))
    }

    pub async fn create_order(&self, user_id: Uuid, input: CreatePurchaseOrderInput) -> AppResult<PurchaseOrder> {
        check_po_lines(&input.items)?;
        let totals = compute_po_totals(&input.items);

        let mut tx = self.db.begin().await?;
        if let Some(requisition_id) = input.requisition_id {
            let current: RequisitionStatus = lock_status(
                &mut tx,
                "purchase_requisitions",
                requisition_id,
                "Purchase requisition",
            )
            .await
            .map_err(|err| match err {
                AppError::NotFound(_) => AppError::BusinessRule("Requisition does not exist".to_string()),
                other => other,
            })?;
            ensure_one_of(current, &[RequisitionStatus::Approved])?;
            sqlx::query("UPDATE purchase_requisitions SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(requisition_id)
                .bind(RequisitionStatus::ConvertedToPo.as_str())
                .execute(&mut *tx)
                .await?;
        }
        let vendor = vendor_name(&mut tx, input.vendor_id).await?;

        let number = next_number(&mut tx, "purchase_orders", "po_number", numbering::PURCHASE_ORDER).await?;
        let sql = format!(
            r#"
            INSERT INTO purchase_orders (po_number, requisition_id, vendor_id, vendor_name, po_date,
                                         expected_delivery_date, items, subtotal, tax_amount, total_amount,
                                         total_quantity, received_quantity, status, created_by)
            VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_DATE), $6, $7, $8, $9, $10, $11, 0, $12, $13)
            RETURNING {PO_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(&number)
            .bind(input.requisition_id)
            .bind(input.vendor_id)
            .bind(&vendor)
            .bind(input.po_date)
            .bind(input.expected_delivery_date)
            .bind(Json(&input.items))
            .bind(totals.subtotal)
            .bind(totals.tax_amount)
            .bind(totals.total_amount)
            .bind(totals.total_quantity)
            .bind(PurchaseOrderStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(po = %number, vendor = %vendor, total = %totals.total_amount, "Purchase order created");
        Ok(order)
    }

    pub async fn approve_order(&self, approver: Uuid, id: Uuid) -> AppResult<PurchaseOrder> {
        self.move_order(id, PurchaseOrderStatus::Approved, Some(approver)).await
    }

    pub async fn send_order_to_vendor(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        self.move_order(id, PurchaseOrderStatus::SentToVendor, None).await
    }

    async fn move_order(
        &self,
        id: Uuid,
        next: PurchaseOrderStatus,
        approver: Option<Uuid>,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;
        let current: PurchaseOrderStatus = lock_status(&mut tx, "purchase_orders", id, "Purchase order").await?;
        let expected = match next {
            PurchaseOrderStatus::Approved => PurchaseOrderStatus::Draft,
            _ => PurchaseOrderStatus::Approved,
        };
        ensure_one_of(current, &[expected])?;
        ensure_transition(current, next)?;

        let sql = format!(
            r#"
            UPDATE purchase_orders SET
                status = $2,
                approved_by = COALESCE($3, approved_by),
                approved_at = CASE WHEN $3::uuid IS NULL THEN approved_at ELSE NOW() END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PO_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(po = %order.po_number, from = %current, to = %next, "Purchase order status changed");
        Ok(order)
    }

    // ---- Goods receipts ----

    pub async fn list_grns(&self, purchase_order_id: Option<Uuid>) -> AppResult<Vec<GoodsReceiptNote>> {
        let sql = format!(
            "SELECT {GRN_COLUMNS} FROM goods_receipt_notes \
             WHERE ($1::uuid IS NULL OR purchase_order_id = $1) ORDER BY created_at DESC"
        );
        let grns = sqlx::query_as::<_, GoodsReceiptNote>(&sql)
            .bind(purchase_order_id)
            .fetch_all(&self.db)
            .await?;
        Ok(grns)
    }

    pub async fn get_grn(&self, id: Uuid) -> AppResult<GoodsReceiptNote> {
        let mut conn = self.db.acquire().await?;
        load_grn(&mut conn, id).await
    }

    /// Receive goods against an order; the accepted quantity is booked on
    /// the order straight away
    pub async fn create_grn(&self, user_id: Uuid, input: CreateGrnInput) -> AppResult<GoodsReceiptNote> {
        if input.items.is_empty() {
            return Err(AppError::validation("items", "At least one line is required"));
        }
        let totals = compute_grn_totals(&input.items).map_err(|msg| AppError::validation("items", msg))?;

        let mut tx = self.db.begin().await?;
        let order_status: PurchaseOrderStatus =
            lock_status(&mut tx, "purchase_orders", input.purchase_order_id, "Purchase order").await?;
        vendor_name(&mut tx, input.vendor_id).await?;
        ensure_one_of(order_status, PurchaseOrderStatus::RECEIVABLE)?;

        let (ordered, received) = sqlx::query_as::<_, (Decimal, Decimal)>(
            "SELECT total_quantity, received_quantity FROM purchase_orders WHERE id = $1",
        )
        .bind(input.purchase_order_id)
        .fetch_one(&mut *tx)
        .await?;
        let now_received = received + totals.accepted;
        let next = PurchaseOrderStatus::after_receipt(ordered, now_received);
        if next != order_status {
            ensure_transition(order_status, next)?;
        }
        sqlx::query(
            "UPDATE purchase_orders SET received_quantity = $2, status = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(input.purchase_order_id)
        .bind(now_received)
        .bind(next.as_str())
        .execute(&mut *tx)
        .await?;

        let number = next_number(&mut tx, "goods_receipt_notes", "grn_number", numbering::GOODS_RECEIPT).await?;
        let sql = format!(
            r#"
            INSERT INTO goods_receipt_notes (grn_number, purchase_order_id, vendor_id, receipt_date,
                                             vendor_invoice_number, items, total_received, total_rejected,
                                             total_accepted, status, received_by)
            VALUES ($1, $2, $3, COALESCE($4, CURRENT_DATE), $5, $6, $7, $8, $9, $10, $11)
            RETURNING {GRN_COLUMNS}
            "#
        );
        let grn = sqlx::query_as::<_, GoodsReceiptNote>(&sql)
            .bind(&number)
            .bind(input.purchase_order_id)
            .bind(input.vendor_id)
            .bind(input.receipt_date)
            .bind(input.vendor_invoice_number)
            .bind(Json(&input.items))
            .bind(totals.received)
            .bind(totals.rejected)
            .bind(totals.accepted)
            .bind(GrnStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            grn = %number,
            accepted = %totals.accepted,
            rejected = %totals.rejected,
            order_status = %next,
            "Goods received"
        );
        Ok(grn)
    }

    pub async fn approve_grn(&self, approver: Uuid, id: Uuid) -> AppResult<GoodsReceiptNote> {
        self.decide_grn(id, GrnStatus::Approved, approver).await
    }

    pub async fn reject_grn(&self, approver: Uuid, id: Uuid) -> AppResult<GoodsReceiptNote> {
        self.decide_grn(id, GrnStatus::Rejected, approver).await
    }

    async fn decide_grn(&self, id: Uuid, next: GrnStatus, approver: Uuid) -> AppResult<GoodsReceiptNote> {
        let mut tx = self.db.begin().await?;
        let current: GrnStatus = lock_status(&mut tx, "goods_receipt_notes", id, "Goods receipt note").await?;
        ensure_transition(current, next)?;

        let sql = format!(
            r#"
            UPDATE goods_receipt_notes SET status = $2, approved_by = $3, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {GRN_COLUMNS}
            "#
        );
        let grn = sqlx::query_as::<_, GoodsReceiptNote>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(grn = %grn.grn_number, status = %next, "Goods receipt decided");
        Ok(grn)
    }

    // ---- Returns ----

    pub async fn list_returns(&self, grn_id: Option<Uuid>) -> AppResult<Vec<PurchaseReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM purchase_returns \
             WHERE ($1::uuid IS NULL OR grn_id = $1) ORDER BY created_at DESC"
        );
        let returns = sqlx::query_as::<_, PurchaseReturn>(&sql)
            .bind(grn_id)
            .fetch_all(&self.db)
            .await?;
        Ok(returns)
    }

    pub async fn create_return(&self, user_id: Uuid, input: CreateReturnInput) -> AppResult<PurchaseReturn> {
        check_field("return_quantity", shared::validate_positive(input.return_quantity))?;
        check_field("reason", shared::validate_non_empty(&input.reason))?;

        let mut tx = self.db.begin().await?;
        sqlx::query("SELECT id FROM goods_receipt_notes WHERE id = $1 FOR UPDATE")
            .bind(input.grn_id)
            .execute(&mut *tx)
            .await?;
        let grn = load_grn(&mut tx, input.grn_id).await?;
        let line = grn
            .items
            .iter()
            .find(|l| l.item_name == input.item_name)
            .ok_or_else(|| {
                AppError::BusinessRule(format!("{} is not on {}", input.item_name, grn.grn_number))
            })?;

        let already_returned = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(return_quantity), 0) FROM purchase_returns WHERE grn_id = $1 AND item_name = $2",
        )
        .bind(grn.id)
        .bind(&input.item_name)
        .fetch_one(&mut *tx)
        .await?;
        let limit = return_limit(line, already_returned).map_err(|msg| AppError::validation("items", msg))?;
        if input.return_quantity > limit {
            return Err(AppError::BusinessRule(format!(
                "Return quantity {} exceeds returnable quantity {}",
                input.return_quantity, limit
            )));
        }

        let number = next_number(&mut tx, "purchase_returns", "return_number", numbering::PURCHASE_RETURN).await?;
        let sql = format!(
            r#"
            INSERT INTO purchase_returns (return_number, grn_id, item_name, return_quantity, reason, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RETURN_COLUMNS}
            "#
        );
        let purchase_return = sqlx::query_as::<_, PurchaseReturn>(&sql)
            .bind(&number)
            .bind(grn.id)
            .bind(&input.item_name)
            .bind(input.return_quantity)
            .bind(input.reason)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(purchase_return = %number, grn = %grn.grn_number, "Purchase return recorded");
        Ok(purchase_return)
    }

    // ---- Vendor bills ----

    pub async fn list_bills(&self, filter: PurchaseStatusFilter) -> AppResult<Vec<VendorBill>> {
        let sql = format!(
            "SELECT {BILL_COLUMNS} FROM vendor_bills WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY bill_date DESC"
        );
        let bills = sqlx::query_as::<_, VendorBill>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(bills)
    }

    pub async fn get_bill(&self, id: Uuid) -> AppResult<VendorBill> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM vendor_bills WHERE id = $1");
        sqlx::query_as::<_, VendorBill>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vendor bill".to_string()))
    }

    pub async fn create_bill(&self, user_id: Uuid, input: CreateBillInput) -> AppResult<VendorBill> {
        check_field("bill_amount", shared::validate_positive(input.bill_amount))?;
        check_field("tax_amount", shared::validate_non_negative(input.tax_amount))?;

        let mut tx = self.db.begin().await?;
        let grn = load_grn(&mut tx, input.grn_id).await?;
        let grn_status: GrnStatus = shared::parse_status(&grn.status)?;
        ensure_one_of(grn_status, &[GrnStatus::Approved])?;

        let number = next_number(&mut tx, "vendor_bills", "bill_number", numbering::VENDOR_BILL).await?;
        let sql = format!(
            r#"
            INSERT INTO vendor_bills (bill_number, grn_id, vendor_id, vendor_invoice_number, bill_date,
                                      bill_amount, tax_amount, total_amount, status, created_by)
            VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_DATE), $6, $7, $8, $9, $10)
            RETURNING {BILL_COLUMNS}
            "#
        );
        let bill = sqlx::query_as::<_, VendorBill>(&sql)
            .bind(&number)
            .bind(grn.id)
            .bind(grn.vendor_id)
            .bind(input.vendor_invoice_number.or(grn.vendor_invoice_number))
            .bind(input.bill_date)
            .bind(input.bill_amount)
            .bind(input.tax_amount)
            .bind(input.bill_amount + input.tax_amount)
            .bind(VendorBillStatus::Pending.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(bill = %number, grn = %grn.grn_number, total = %bill.total_amount, "Vendor bill booked");
        Ok(bill)
    }

    pub async fn update_bill_status(&self, user_id: Uuid, id: Uuid, input: BillStatusInput) -> AppResult<VendorBill> {
        let mut tx = self.db.begin().await?;
        let current: VendorBillStatus = lock_status(&mut tx, "vendor_bills", id, "Vendor bill").await?;
        ensure_transition(current, input.status)?;

        let sql = format!(
            r#"
            UPDATE vendor_bills SET
                status = $2,
                approved_by = CASE WHEN $2 = 'Approved' THEN $3 ELSE approved_by END,
                approved_at = CASE WHEN $2 = 'Approved' THEN NOW() ELSE approved_at END,
                paid_at = CASE WHEN $2 = 'Paid' THEN NOW() ELSE paid_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {BILL_COLUMNS}
            "#
        );
        let bill = sqlx::query_as::<_, VendorBill>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(bill = %bill.bill_number, from = %current, to = %input.status, "Vendor bill status changed");
        Ok(bill)
    }

    pub async fn dashboard(&self) -> AppResult<PurchaseDashboard> {
        let open_requisitions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM purchase_requisitions WHERE status IN ($1, $2, $3)",
        )
        .bind(RequisitionStatus::Draft.as_str())
        .bind(RequisitionStatus::Submitted.as_str())
        .bind(RequisitionStatus::Approved.as_str())
        .fetch_one(&self.db)
        .await?;

        let orders_by_status = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM purchase_orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

        let pending_grns = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goods_receipt_notes WHERE status = $1")
            .bind(GrnStatus::Draft.as_str())
            .fetch_one(&self.db)
            .await?;

        let unpaid_bill_value = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(total_amount), 0) FROM vendor_bills WHERE status IN ($1, $2)",
        )
        .bind(VendorBillStatus::Pending.as_str())
        .bind(VendorBillStatus::Approved.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(PurchaseDashboard {
            open_requisitions,
            orders_by_status,
            pending_grns,
            unpaid_bill_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grn_line(received: i64, rejected: i64) -> GrnLine {
        GrnLine {
            item_name: "Teak veneer".to_string(),
            received_quantity: Decimal::from(received),
            rejected_quantity: Decimal::from(rejected),
            rejection_reason: None,
        }
    }

    #[test]
    fn test_rejected_stock_bounds_returns() {
        assert_eq!(return_limit(&grn_line(100, 8), Decimal::ZERO), Ok(Decimal::from(8)));
        assert_eq!(return_limit(&grn_line(100, 8), Decimal::from(5)), Ok(Decimal::from(3)));
    }

    #[test]
    fn test_accepted_stock_bounds_returns_without_rejects() {
        assert_eq!(return_limit(&grn_line(40, 0), Decimal::ZERO), Ok(Decimal::from(40)));
        assert_eq!(return_limit(&grn_line(40, 0), Decimal::from(50)), Ok(Decimal::ZERO));
    }

    #[test]
    fn test_invalid_grn_line_has_no_limit() {
        assert!(return_limit(&grn_line(5, 9), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_vendor_tax_ids() {
        assert!(check_vendor_ids(None, None).is_ok());
        assert!(check_vendor_ids(None, Some("ABCDE1234F")).is_ok());
        assert!(check_vendor_ids(None, Some("1234")).is_err());
        assert!(check_vendor_ids(Some("not-a-gstin"), None).is_err());
    }

    #[test]
    fn test_po_lines_are_checked() {
        let line = PurchaseOrderLine {
            item_name: "Hinges".to_string(),
            quantity: Decimal::from(200),
            unit: Some("nos".to_string()),
            rate: Decimal::from(35),
            tax_percent: Decimal::from(18),
        };
        assert!(check_po_lines(&[line.clone()]).is_ok());
        assert!(check_po_lines(&[]).is_err());
        assert!(check_po_lines(&[PurchaseOrderLine { tax_percent: Decimal::from(150), ..line }]).is_err());
    }
}
