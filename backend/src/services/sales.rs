//! Sales pipeline: leads, site projects, quotations, sales orders,
//! measurement requests and follow-ups

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute_quotation_totals, conversion_rate, ensure_transition, numbering, LeadStatus,
    MeasurementRequestStatus, QuotationLine, QuotationStatus, SalesOrderStatus, StatusCount,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::{numbering::next_number, status::delete_row, status::lock_status};

#[derive(Clone)]
pub struct SalesService {
    db: PgPool,
}

// ============================================================================
// Leads
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub lead_number: String,
    pub customer_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub requirement: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub status: String,
    pub assigned_to: Option<Uuid>,
    pub converted_to_party_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadInput {
    pub customer_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub requirement: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadInput {
    pub customer_name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub requirement: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertLeadInput {
    pub party_id: Uuid,
}

const LEAD_COLUMNS: &str = "id, lead_number, customer_name, contact_person, phone, email, source, \
     requirement, estimated_value, status, assigned_to, converted_to_party_id, converted_at, \
     created_by, created_at, updated_at";

// ============================================================================
// Site projects
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteProject {
    pub id: Uuid,
    pub project_code: String,
    pub party_id: Uuid,
    pub project_name: String,
    pub site_address: Option<String>,
    pub city: Option<String>,
    pub expected_start_date: Option<NaiveDate>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SiteProjectInput {
    pub party_id: Uuid,
    pub project_name: String,
    pub site_address: Option<String>,
    pub city: Option<String>,
    pub expected_start_date: Option<NaiveDate>,
    pub status: Option<String>,
}

const PROJECT_COLUMNS: &str = "id, project_code, party_id, project_name, site_address, city, \
     expected_start_date, status, created_by, created_at, updated_at";

// ============================================================================
// Quotations
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Quotation {
    pub id: Uuid,
    pub quotation_number: String,
    pub lead_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub site_project_id: Option<Uuid>,
    pub customer_name: String,
    pub quotation_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub items: Json<Vec<QuotationLine>>,
    pub subtotal: Decimal,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_approved_by: Option<Uuid>,
    pub discount_approved_at: Option<DateTime<Utc>>,
    pub terms: Option<String>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuotationInput {
    pub lead_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub site_project_id: Option<Uuid>,
    pub customer_name: String,
    pub quotation_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub items: Vec<QuotationLine>,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub discount_percentage: Option<Decimal>,
    pub terms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuotationInput {
    pub customer_name: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub items: Option<Vec<QuotationLine>>,
    pub discount_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub terms: Option<String>,
    pub status: Option<QuotationStatus>,
}

const QUOTATION_COLUMNS: &str = "id, quotation_number, lead_id, party_id, site_project_id, \
     customer_name, quotation_date, valid_until, items, subtotal, discount_percentage, \
     discount_amount, tax_amount, total_amount, discount_approved_by, discount_approved_at, \
     terms, status, created_by, created_at, updated_at";

// ============================================================================
// Sales orders and measurement requests
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SalesOrder {
    pub id: Uuid,
    pub order_number: String,
    pub quotation_id: Option<Uuid>,
    pub party_id: Uuid,
    pub party_name: String,
    pub site_project_id: Option<Uuid>,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Json<Vec<QuotationLine>>,
    pub total_amount: Decimal,
    pub site_address: Option<String>,
    pub measurement_requested: bool,
    pub status: String,
    pub remarks: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSalesOrderInput {
    pub quotation_id: Option<Uuid>,
    pub party_id: Uuid,
    pub site_project_id: Option<Uuid>,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<QuotationLine>,
    pub total_amount: Option<Decimal>,
    pub site_address: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSalesOrderInput {
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Option<Vec<QuotationLine>>,
    pub total_amount: Option<Decimal>,
    pub site_address: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SalesOrderStatusInput {
    pub status: SalesOrderStatus,
}

/// Sales order together with the measurement request raised for it
#[derive(Debug, Serialize)]
pub struct CreatedSalesOrder {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub measurement_request: MeasurementRequest,
}

const ORDER_COLUMNS: &str = "id, order_number, quotation_id, party_id, party_name, site_project_id, \
     order_date, expected_delivery_date, items, total_amount, site_address, measurement_requested, \
     status, remarks, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeasurementRequest {
    pub id: Uuid,
    pub request_number: String,
    pub sales_order_id: Uuid,
    pub party_id: Uuid,
    pub party_name: String,
    pub site_address: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub measurement_id: Option<Uuid>,
    pub status: String,
    pub remarks: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeasurementRequestInput {
    pub assigned_to: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub measurement_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub status: Option<MeasurementRequestStatus>,
}

const REQUEST_COLUMNS: &str = "id, request_number, sales_order_id, party_id, party_name, site_address, \
     assigned_to, scheduled_date, measurement_id, status, remarks, completed_at, created_by, \
     created_at, updated_at";

// ============================================================================
// Follow-ups and dashboard
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FollowUp {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub follow_up_date: NaiveDate,
    pub follow_up_type: String,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub next_follow_up_date: Option<NaiveDate>,
    pub is_completed: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFollowUpInput {
    pub lead_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub follow_up_date: NaiveDate,
    pub follow_up_type: Option<String>,
    pub notes: Option<String>,
    pub next_follow_up_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFollowUpInput {
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_type: Option<String>,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub next_follow_up_date: Option<NaiveDate>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpFilter {
    pub lead_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub pending_only: Option<bool>,
}

const FOLLOW_UP_COLUMNS: &str = "id, lead_id, sales_order_id, party_id, follow_up_date, follow_up_type, \
     notes, outcome, next_follow_up_date, is_completed, created_by, created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct SalesDashboard {
    pub total_leads: i64,
    pub leads_by_status: Vec<StatusCount>,
    pub quotations_by_status: Vec<StatusCount>,
    pub confirmed_orders: i64,
    pub total_order_value: Decimal,
    pub pending_measurement_requests: i64,
    pub conversion_rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

fn check_lines(lines: &[QuotationLine]) -> AppResult<()> {
    for line in lines {
        check_field("items.quantity", shared::validate_positive(line.quantity))?;
        check_field("items.rate", shared::validate_non_negative(line.rate))?;
        check_field("items.discount", shared::validate_non_negative(line.discount))?;
    }
    Ok(())
}

fn order_total(lines: &[QuotationLine], given: Option<Decimal>) -> Decimal {
    given.unwrap_or_else(|| lines.iter().map(QuotationLine::amount).sum())
}

async fn status_counts(db: &PgPool, table: &'static str) -> AppResult<Vec<StatusCount>> {
    let sql = format!("SELECT status, COUNT(*) FROM {table} GROUP BY status ORDER BY status");
    let rows = sqlx::query_as::<_, (String, i64)>(&sql).fetch_all(db).await?;
    Ok(rows
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect())
}

impl SalesService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Leads ----

    pub async fn list_leads(&self, filter: StatusFilter) -> AppResult<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        );
        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(leads)
    }

    pub async fn get_lead(&self, id: Uuid) -> AppResult<Lead> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Lead".to_string()))
    }

    pub async fn create_lead(&self, user_id: Uuid, input: CreateLeadInput) -> AppResult<Lead> {
        check_field("customer_name", shared::validate_non_empty(&input.customer_name))?;
        if let Some(value) = input.estimated_value {
            check_field("estimated_value", shared::validate_non_negative(value))?;
        }

        let mut tx = self.db.begin().await?;
        let number = next_number(&mut tx, "leads", "lead_number", numbering::LEAD).await?;

        let sql = format!(
            r#"
            INSERT INTO leads (lead_number, customer_name, contact_person, phone, email, source,
                               requirement, estimated_value, assigned_to, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(&number)
            .bind(input.customer_name.trim())
            .bind(input.contact_person)
            .bind(input.phone)
            .bind(input.email)
            .bind(input.source)
            .bind(input.requirement)
            .bind(input.estimated_value)
            .bind(input.assigned_to)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(lead_number = %number, "Lead created");
        Ok(lead)
    }

    pub async fn update_lead(&self, id: Uuid, input: UpdateLeadInput) -> AppResult<Lead> {
        let mut tx = self.db.begin().await?;
        let current: LeadStatus = lock_status(&mut tx, "leads", id, "Lead").await?;
        if let Some(next) = input.status {
            if next != current {
                ensure_transition(current, next)?;
            }
        }

        let sql = format!(
            r#"
            UPDATE leads SET
                customer_name = COALESCE($2, customer_name),
                contact_person = COALESCE($3, contact_person),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                source = COALESCE($6, source),
                requirement = COALESCE($7, requirement),
                estimated_value = COALESCE($8, estimated_value),
                assigned_to = COALESCE($9, assigned_to),
                status = COALESCE($10, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(input.customer_name)
            .bind(input.contact_person)
            .bind(input.phone)
            .bind(input.email)
            .bind(input.source)
            .bind(input.requirement)
            .bind(input.estimated_value)
            .bind(input.assigned_to)
            .bind(input.status.map(|s| s.as_str()))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        if let Some(next) = input.status.filter(|s| *s != current) {
            tracing::info!(lead = %lead.lead_number, from = %current, to = %next, "Lead status changed");
        }
        Ok(lead)
    }

    pub async fn delete_lead(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "leads", id, "Lead").await
    }

    /// Link a lead to an existing party and mark it won
    pub async fn convert_lead(&self, id: Uuid, input: ConvertLeadInput) -> AppResult<Lead> {
        let mut tx = self.db.begin().await?;
        let current: LeadStatus = lock_status(&mut tx, "leads", id, "Lead").await?;
        ensure_transition(current, LeadStatus::Won)?;

        let party = sqlx::query_scalar::<_, Uuid>("SELECT id FROM parties WHERE id = $1")
            .bind(input.party_id)
            .fetch_optional(&mut *tx)
            .await?;
        if party.is_none() {
            return Err(AppError::NotFound("Party".to_string()));
        }

        let sql = format!(
            r#"
            UPDATE leads
            SET converted_to_party_id = $2, converted_at = NOW(), status = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(input.party_id)
            .bind(LeadStatus::Won.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(lead = %lead.lead_number, party_id = %input.party_id, "Lead converted");
        Ok(lead)
    }

    // ---- Site projects ----

    pub async fn list_projects(&self, party_id: Option<Uuid>) -> AppResult<Vec<SiteProject>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM site_projects WHERE ($1::uuid IS NULL OR party_id = $1) \
             ORDER BY created_at DESC"
        );
        let projects = sqlx::query_as::<_, SiteProject>(&sql)
            .bind(party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(projects)
    }

    pub async fn get_project(&self, id: Uuid) -> AppResult<SiteProject> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM site_projects WHERE id = $1");
        sqlx::query_as::<_, SiteProject>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Site project".to_string()))
    }

    pub async fn create_project(&self, user_id: Uuid, input: SiteProjectInput) -> AppResult<SiteProject> {
        check_field("project_name", shared::validate_non_empty(&input.project_name))?;

        let mut tx = self.db.begin().await?;
        party_name(&mut tx, input.party_id).await?;
        let code = next_number(&mut tx, "site_projects", "project_code", numbering::SITE_PROJECT).await?;

        let sql = format!(
            r#"
            INSERT INTO site_projects (project_code, party_id, project_name, site_address, city,
                                       expected_start_date, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'Active'), $8)
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let project = sqlx::query_as::<_, SiteProject>(&sql)
            .bind(&code)
            .bind(input.party_id)
            .bind(input.project_name.trim())
            .bind(input.site_address)
            .bind(input.city)
            .bind(input.expected_start_date)
            .bind(input.status)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(project)
    }

    pub async fn update_project(&self, id: Uuid, input: SiteProjectInput) -> AppResult<SiteProject> {
        let mut tx = self.db.begin().await?;
        party_name(&mut tx, input.party_id).await?;

        let sql = format!(
            r#"
            UPDATE site_projects SET
                party_id = $2, project_name = $3,
                site_address = COALESCE($4, site_address),
                city = COALESCE($5, city),
                expected_start_date = COALESCE($6, expected_start_date),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let project = sqlx::query_as::<_, SiteProject>(&sql)
            .bind(id)
            .bind(input.party_id)
            .bind(input.project_name.trim())
            .bind(input.site_address)
            .bind(input.city)
            .bind(input.expected_start_date)
            .bind(input.status)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Site project".to_string()))?;

        tx.commit().await?;
        Ok(project)
    }

    pub async fn delete_project(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "site_projects", id, "Site project").await
    }

    // ---- Quotations ----

    pub async fn list_quotations(&self, filter: StatusFilter) -> AppResult<Vec<Quotation>> {
        let sql = format!(
            "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        );
        let quotations = sqlx::query_as::<_, Quotation>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(quotations)
    }

    pub async fn get_quotation(&self, id: Uuid) -> AppResult<Quotation> {
        let sql = format!("SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = $1");
        sqlx::query_as::<_, Quotation>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Quotation".to_string()))
    }

    pub async fn create_quotation(
        &self,
        user_id: Uuid,
        input: CreateQuotationInput,
    ) -> AppResult<Quotation> {
        check_field("customer_name", shared::validate_non_empty(&input.customer_name))?;
        if input.items.is_empty() {
            return Err(AppError::validation("items", "At least one line item is required"));
        }
        check_lines(&input.items)?;
        if let Some(pct) = input.discount_percentage {
            check_field("discount_percentage", shared::validate_percentage(pct))?;
        }
        check_field("discount_amount", shared::validate_non_negative(input.discount_amount))?;

        let totals =
            compute_quotation_totals(&input.items, input.discount_amount, input.discount_percentage);

        let mut tx = self.db.begin().await?;
        if let Some(party_id) = input.party_id {
            party_name(&mut tx, party_id).await?;
        }
        let number = next_number(&mut tx, "quotations", "quotation_number", numbering::QUOTATION).await?;

        let sql = format!(
            r#"
            INSERT INTO quotations (
                quotation_number, lead_id, party_id, site_project_id, customer_name,
                quotation_date, valid_until, items, subtotal, discount_percentage,
                discount_amount, tax_amount, total_amount, terms, created_by
            )
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, CURRENT_DATE), $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {QUOTATION_COLUMNS}
            "#
        );
        let quotation = sqlx::query_as::<_, Quotation>(&sql)
            .bind(&number)
            .bind(input.lead_id)
            .bind(input.party_id)
            .bind(input.site_project_id)
            .bind(input.customer_name.trim())
            .bind(input.quotation_date)
            .bind(input.valid_until)
            .bind(Json(&input.items))
            .bind(totals.subtotal)
            .bind(input.discount_percentage)
            .bind(totals.discount_amount)
            .bind(totals.tax_amount)
            .bind(totals.total_amount)
            .bind(input.terms)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(quotation_number = %number, total = %totals.total_amount, "Quotation created");
        Ok(quotation)
    }

    /// Totals are recomputed whenever items or the discount change
    pub async fn update_quotation(&self, id: Uuid, input: UpdateQuotationInput) -> AppResult<Quotation> {
        let mut tx = self.db.begin().await?;
        let current: QuotationStatus = lock_status(&mut tx, "quotations", id, "Quotation").await?;
        if let Some(next) = input.status.filter(|s| *s != current) {
            ensure_transition(current, next)?;
        }

        let sql = format!("SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = $1");
        let existing = sqlx::query_as::<_, Quotation>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let items = input.items.unwrap_or(existing.items.0);
        check_lines(&items)?;
        let discount_percentage = input.discount_percentage.or(existing.discount_percentage);
        if let Some(pct) = discount_percentage {
            check_field("discount_percentage", shared::validate_percentage(pct))?;
        }
        let discount_amount = input.discount_amount.unwrap_or(existing.discount_amount);
        let totals = compute_quotation_totals(&items, discount_amount, discount_percentage);

        let sql = format!(
            r#"
            UPDATE quotations SET
                customer_name = COALESCE($2, customer_name),
                valid_until = COALESCE($3, valid_until),
                items = $4, subtotal = $5, discount_percentage = $6, discount_amount = $7,
                tax_amount = $8, total_amount = $9,
                terms = COALESCE($10, terms),
                status = COALESCE($11, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {QUOTATION_COLUMNS}
            "#
        );
        let quotation = sqlx::query_as::<_, Quotation>(&sql)
            .bind(id)
            .bind(input.customer_name)
            .bind(input.valid_until)
            .bind(Json(&items))
            .bind(totals.subtotal)
            .bind(discount_percentage)
            .bind(totals.discount_amount)
            .bind(totals.tax_amount)
            .bind(totals.total_amount)
            .bind(input.terms)
            .bind(input.status.map(|s| s.as_str()))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(quotation)
    }

    pub async fn delete_quotation(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "quotations", id, "Quotation").await
    }

    pub async fn approve_discount(&self, approver: Uuid, id: Uuid) -> AppResult<Quotation> {
        let quotation = self.get_quotation(id).await?;
        if quotation.discount_amount.is_zero() {
            return Err(AppError::BusinessRule(
                "Quotation has no discount to approve".to_string(),
            ));
        }

        let sql = format!(
            r#"
            UPDATE quotations
            SET discount_approved_by = $2, discount_approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {QUOTATION_COLUMNS}
            "#
        );
        let quotation = sqlx::query_as::<_, Quotation>(&sql)
            .bind(id)
            .bind(approver)
            .fetch_one(&self.db)
            .await?;

        tracing::info!(quotation = %quotation.quotation_number, %approver, "Quotation discount approved");
        Ok(quotation)
    }

    // ---- Sales orders ----

    pub async fn list_orders(&self, filter: StatusFilter) -> AppResult<Vec<SalesOrder>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM sales_orders WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        );
        let orders = sqlx::query_as::<_, SalesOrder>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(orders)
    }

    pub async fn get_order(&self, id: Uuid) -> AppResult<SalesOrder> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM sales_orders WHERE id = $1");
        sqlx::query_as::<_, SalesOrder>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Sales order".to_string()))
    }

    /// Confirm an order and raise its measurement request in one transaction
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateSalesOrderInput,
    ) -> AppResult<CreatedSalesOrder> {
        check_lines(&input.items)?;
        let total = order_total(&input.items, input.total_amount);
        check_field("total_amount", shared::validate_non_negative(total))?;

        let mut tx = self.db.begin().await?;
        let party_name = party_name(&mut tx, input.party_id).await?;
        if let Some(quotation_id) = input.quotation_id {
            let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM quotations WHERE id = $1")
                .bind(quotation_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(AppError::NotFound("Quotation".to_string()));
            }
        }

        let order_number = next_number(&mut tx, "sales_orders", "order_number", numbering::SALES_ORDER).await?;
        let sql = format!(
            r#"
            INSERT INTO sales_orders (
                order_number, quotation_id, party_id, party_name, site_project_id, order_date,
                expected_delivery_date, items, total_amount, site_address, measurement_requested,
                status, remarks, created_by
            )
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, CURRENT_DATE), $7, $8, $9, $10, TRUE, $11, $12, $13)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, SalesOrder>(&sql)
            .bind(&order_number)
            .bind(input.quotation_id)
            .bind(input.party_id)
            .bind(&party_name)
            .bind(input.site_project_id)
            .bind(input.order_date)
            .bind(input.expected_delivery_date)
            .bind(Json(&input.items))
            .bind(total)
            .bind(&input.site_address)
            .bind(SalesOrderStatus::Confirmed.as_str())
            .bind(&input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let request_number = next_number(
            &mut tx,
            "measurement_requests",
            "request_number",
            numbering::MEASUREMENT_REQUEST,
        )
        .await?;
        let sql = format!(
            r#"
            INSERT INTO measurement_requests (
                request_number, sales_order_id, party_id, party_name, site_address, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let measurement_request = sqlx::query_as::<_, MeasurementRequest>(&sql)
            .bind(&request_number)
            .bind(order.id)
            .bind(input.party_id)
            .bind(&party_name)
            .bind(&input.site_address)
            .bind(MeasurementRequestStatus::Pending.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            order_number = %order_number,
            request_number = %request_number,
            "Sales order confirmed with measurement request"
        );
        Ok(CreatedSalesOrder {
            order,
            measurement_request,
        })
    }

    /// Refused once production has started on the order
    pub async fn update_order(&self, id: Uuid, input: UpdateSalesOrderInput) -> AppResult<SalesOrder> {
        let mut tx = self.db.begin().await?;
        let current: SalesOrderStatus = lock_status(&mut tx, "sales_orders", id, "Sales order").await?;
        if current.is_locked_for_sales() {
            tracing::warn!(order_id = %id, status = %current, "Sales order edit refused");
            return Err(AppError::BusinessRule(format!(
                "Sales order cannot be edited once it is '{}'",
                current
            )));
        }

        if let Some(items) = &input.items {
            check_lines(items)?;
        }
        let total = match (&input.items, input.total_amount) {
            (_, Some(total)) => Some(total),
            (Some(items), None) => Some(order_total(items, None)),
            (None, None) => None,
        };

        let sql = format!(
            r#"
            UPDATE sales_orders SET
                expected_delivery_date = COALESCE($2, expected_delivery_date),
                items = COALESCE($3, items),
                total_amount = COALESCE($4, total_amount),
                site_address = COALESCE($5, site_address),
                remarks = COALESCE($6, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, SalesOrder>(&sql)
            .bind(id)
            .bind(input.expected_delivery_date)
            .bind(input.items.as_ref().map(Json))
            .bind(total)
            .bind(input.site_address)
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    pub async fn update_order_status(&self, id: Uuid, next: SalesOrderStatus) -> AppResult<SalesOrder> {
        let mut tx = self.db.begin().await?;
        let current: SalesOrderStatus = lock_status(&mut tx, "sales_orders", id, "Sales order").await?;
        ensure_transition(current, next)?;

        let sql = format!(
            "UPDATE sales_orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, SalesOrder>(&sql)
            .bind(id)
            .bind(next.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(order = %order.order_number, from = %current, to = %next, "Sales order status changed");
        Ok(order)
    }

    // ---- Measurement requests ----

    pub async fn list_measurement_requests(&self, filter: StatusFilter) -> AppResult<Vec<MeasurementRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM measurement_requests \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        let requests = sqlx::query_as::<_, MeasurementRequest>(&sql)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(requests)
    }

    pub async fn get_measurement_request(&self, id: Uuid) -> AppResult<MeasurementRequest> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM measurement_requests WHERE id = $1");
        sqlx::query_as::<_, MeasurementRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Measurement request".to_string()))
    }

    pub async fn update_measurement_request(
        &self,
        id: Uuid,
        input: UpdateMeasurementRequestInput,
    ) -> AppResult<MeasurementRequest> {
        let mut tx = self.db.begin().await?;
        let current: MeasurementRequestStatus =
            lock_status(&mut tx, "measurement_requests", id, "Measurement request").await?;
        let next = input.status.filter(|s| *s != current);
        if let Some(next) = next {
            ensure_transition(current, next)?;
        }
        let completed = next == Some(MeasurementRequestStatus::Completed);

        let sql = format!(
            r#"
            UPDATE measurement_requests SET
                assigned_to = COALESCE($2, assigned_to),
                scheduled_date = COALESCE($3, scheduled_date),
                measurement_id = COALESCE($4, measurement_id),
                remarks = COALESCE($5, remarks),
                status = COALESCE($6, status),
                completed_at = CASE WHEN $7 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let request = sqlx::query_as::<_, MeasurementRequest>(&sql)
            .bind(id)
            .bind(input.assigned_to)
            .bind(input.scheduled_date)
            .bind(input.measurement_id)
            .bind(input.remarks)
            .bind(next.map(|s| s.as_str()))
            .bind(completed)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        if let Some(next) = next {
            tracing::info!(
                request = %request.request_number,
                from = %current,
                to = %next,
                "Measurement request status changed"
            );
        }
        Ok(request)
    }

    // ---- Follow-ups ----

    pub async fn list_follow_ups(&self, filter: FollowUpFilter) -> AppResult<Vec<FollowUp>> {
        let sql = format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups \
             WHERE ($1::uuid IS NULL OR lead_id = $1) \
               AND ($2::uuid IS NULL OR sales_order_id = $2) \
               AND ($3::uuid IS NULL OR party_id = $3) \
               AND (NOT $4 OR NOT is_completed) \
             ORDER BY follow_up_date"
        );
        let follow_ups = sqlx::query_as::<_, FollowUp>(&sql)
            .bind(filter.lead_id)
            .bind(filter.sales_order_id)
            .bind(filter.party_id)
            .bind(filter.pending_only.unwrap_or(false))
            .fetch_all(&self.db)
            .await?;
        Ok(follow_ups)
    }

    pub async fn create_follow_up(&self, user_id: Uuid, input: CreateFollowUpInput) -> AppResult<FollowUp> {
        if input.lead_id.is_none() && input.sales_order_id.is_none() && input.party_id.is_none() {
            return Err(AppError::validation(
                "lead_id",
                "A follow-up must reference a lead, sales order or party",
            ));
        }

        let sql = format!(
            r#"
            INSERT INTO follow_ups (lead_id, sales_order_id, party_id, follow_up_date,
                                    follow_up_type, notes, next_follow_up_date, created_by)
            VALUES ($1, $2, $3, $4, COALESCE($5, 'Call'), $6, $7, $8)
            RETURNING {FOLLOW_UP_COLUMNS}
            "#
        );
        let follow_up = sqlx::query_as::<_, FollowUp>(&sql)
            .bind(input.lead_id)
            .bind(input.sales_order_id)
            .bind(input.party_id)
            .bind(input.follow_up_date)
            .bind(input.follow_up_type)
            .bind(input.notes)
            .bind(input.next_follow_up_date)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(follow_up)
    }

    pub async fn update_follow_up(&self, id: Uuid, input: UpdateFollowUpInput) -> AppResult<FollowUp> {
        let sql = format!(
            r#"
            UPDATE follow_ups SET
                follow_up_date = COALESCE($2, follow_up_date),
                follow_up_type = COALESCE($3, follow_up_type),
                notes = COALESCE($4, notes),
                outcome = COALESCE($5, outcome),
                next_follow_up_date = COALESCE($6, next_follow_up_date),
                is_completed = COALESCE($7, is_completed),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {FOLLOW_UP_COLUMNS}
            "#
        );
        sqlx::query_as::<_, FollowUp>(&sql)
            .bind(id)
            .bind(input.follow_up_date)
            .bind(input.follow_up_type)
            .bind(input.notes)
            .bind(input.outcome)
            .bind(input.next_follow_up_date)
            .bind(input.is_completed)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Follow-up".to_string()))
    }

    pub async fn delete_follow_up(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "follow_ups", id, "Follow-up").await
    }

    // ---- Dashboard ----

    pub async fn dashboard(&self) -> AppResult<SalesDashboard> {
        let leads_by_status = status_counts(&self.db, "leads").await?;
        let quotations_by_status = status_counts(&self.db, "quotations").await?;

        let total_leads: i64 = leads_by_status.iter().map(|s| s.count).sum();
        let won = leads_by_status
            .iter()
            .find(|s| s.status == LeadStatus::Won.as_str())
            .map(|s| s.count)
            .unwrap_or(0);

        let (confirmed_orders, total_order_value) = sqlx::query_as::<_, (i64, Decimal)>(
            "SELECT COUNT(*) FILTER (WHERE status = $1), COALESCE(SUM(total_amount), 0) FROM sales_orders",
        )
        .bind(SalesOrderStatus::Confirmed.as_str())
        .fetch_one(&self.db)
        .await?;

        let pending_measurement_requests: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM measurement_requests WHERE status = ANY($1)",
        )
        .bind(vec![
            MeasurementRequestStatus::Pending.as_str(),
            MeasurementRequestStatus::Assigned.as_str(),
            MeasurementRequestStatus::Scheduled.as_str(),
        ])
        .fetch_one(&self.db)
        .await?;

        Ok(SalesDashboard {
            total_leads,
            leads_by_status,
            quotations_by_status,
            confirmed_orders,
            total_order_value,
            pending_measurement_requests,
            conversion_rate: conversion_rate(won, total_leads),
        })
    }
}

/// Name of an existing party, `NotFound` otherwise
pub(crate) async fn party_name(conn: &mut sqlx::PgConnection, party_id: Uuid) -> AppResult<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM parties WHERE id = $1")
        .bind(party_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Party".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, rate: i64, discount: i64) -> QuotationLine {
        QuotationLine {
            description: "Main door".to_string(),
            quantity: Decimal::from(quantity),
            rate: Decimal::from(rate),
            discount: Decimal::from(discount),
            product_id: None,
        }
    }

    #[test]
    fn test_order_total_prefers_given_amount() {
        let items = vec![line(2, 1000, 100), line(1, 500, 0)];
        assert_eq!(order_total(&items, None), Decimal::from(2400));
        assert_eq!(order_total(&items, Some(Decimal::from(2000))), Decimal::from(2000));
    }

    #[test]
    fn test_line_checks() {
        assert!(check_lines(&[line(1, 100, 0)]).is_ok());
        assert!(check_lines(&[line(0, 100, 0)]).is_err());
        assert!(check_lines(&[line(1, -5, 0)]).is_err());
    }
}
