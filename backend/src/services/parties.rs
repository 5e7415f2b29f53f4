//! Parties (customers): registry, approval flow and credit-term history

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    ensure_transition, numbering, ContactPerson, CreditTerms, PartyApprovalStatus, Pagination,
    PaginatedResponse, SiteAddress,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{check_field, AppError, AppResult};
use crate::services::{numbering::next_number, status::lock_column_status};

#[derive(Clone)]
pub struct PartyService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Party {
    pub id: Uuid,
    pub name: String,
    pub party_type: String,
    pub display_name: Option<String>,
    pub customer_code: Option<String>,
    pub business_type: Option<String>,
    pub contact_persons: Json<Vec<ContactPerson>>,
    pub site_addresses: Json<Vec<SiteAddress>>,
    pub office_address: Option<String>,
    pub office_city: Option<String>,
    pub office_state: Option<String>,
    pub office_pin_code: Option<String>,
    pub gstin_number: Option<String>,
    pub pan_number: Option<String>,
    pub state_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub payment_terms: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub credit_days: Option<i32>,
    pub customer_status: String,
    pub approval_status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Party {
    fn credit_terms(&self) -> CreditTerms {
        CreditTerms {
            payment_terms: self.payment_terms.clone(),
            credit_limit: self.credit_limit,
            credit_days: self.credit_days,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub party_type: String,
    pub display_name: Option<String>,
    pub business_type: Option<String>,
    #[serde(default)]
    pub contact_persons: Vec<ContactPerson>,
    #[serde(default)]
    pub site_addresses: Vec<SiteAddress>,
    pub office_address: Option<String>,
    pub office_city: Option<String>,
    pub office_state: Option<String>,
    pub office_pin_code: Option<String>,
    pub gstin_number: Option<String>,
    pub pan_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub payment_terms: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub credit_days: Option<i32>,
    pub customer_status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePartyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub party_type: Option<String>,
    pub display_name: Option<String>,
    pub business_type: Option<String>,
    pub contact_persons: Option<Vec<ContactPerson>>,
    pub site_addresses: Option<Vec<SiteAddress>>,
    pub office_address: Option<String>,
    pub office_city: Option<String>,
    pub office_state: Option<String>,
    pub office_pin_code: Option<String>,
    pub gstin_number: Option<String>,
    pub pan_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub payment_terms: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub credit_days: Option<i32>,
    pub customer_status: Option<String>,
    /// Recorded against credit-term changes in the party history
    pub change_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartyFilter {
    pub search: Option<String>,
    pub approval_status: Option<PartyApprovalStatus>,
    pub party_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PartyHistory {
    pub id: Uuid,
    pub party_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: Option<String>,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}

const PARTY_COLUMNS: &str = "id, name, party_type, display_name, customer_code, business_type, \
     contact_persons, site_addresses, office_address, office_city, office_state, office_pin_code, \
     gstin_number, pan_number, state_code, email, phone, payment_terms, credit_limit, credit_days, \
     customer_status, approval_status, approved_by, approved_at, created_by, created_at, updated_at";

/// GSTIN/PAN are optional but must be well-formed when given
fn check_tax_ids(gstin: Option<&str>, pan: Option<&str>) -> AppResult<Option<String>> {
    if let Some(pan) = pan {
        check_field("pan_number", shared::validate_pan(pan))?;
    }
    match gstin {
        Some(gstin) => {
            check_field("gstin_number", shared::validate_gstin(gstin))?;
            Ok(shared::gstin_state_code(gstin).map(str::to_string))
        }
        None => Ok(None),
    }
}

fn check_credit_terms(credit_limit: Option<Decimal>, credit_days: Option<i32>) -> AppResult<()> {
    if let Some(limit) = credit_limit {
        check_field("credit_limit", shared::validate_non_negative(limit))?;
    }
    if matches!(credit_days, Some(days) if days < 0) {
        return Err(AppError::validation("credit_days", "Credit days cannot be negative"));
    }
    Ok(())
}

impl PartyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_parties(
        &self,
        filter: PartyFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Party>> {
        let search = filter.search.map(|s| format!("%{}%", s.trim()));
        let status = filter.approval_status.map(|s| s.as_str());
        let condition = "($1::text IS NULL OR name ILIKE $1 OR customer_code ILIKE $1) \
             AND ($2::text IS NULL OR approval_status = $2) \
             AND ($3::text IS NULL OR party_type = $3)";

        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties WHERE {condition} ORDER BY name LIMIT $4 OFFSET $5"
        );
        let parties = sqlx::query_as::<_, Party>(&sql)
            .bind(&search)
            .bind(status)
            .bind(&filter.party_type)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM parties WHERE {condition}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&search)
            .bind(status)
            .bind(&filter.party_type)
            .fetch_one(&self.db)
            .await?;

        Ok(PaginatedResponse::new(parties, pagination, total as u64))
    }

    pub async fn get_party(&self, id: Uuid) -> AppResult<Party> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = $1");
        sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Party".to_string()))
    }

    pub async fn create_party(&self, user_id: Uuid, input: CreatePartyInput) -> AppResult<Party> {
        input.validate()?;
        let state_code = check_tax_ids(input.gstin_number.as_deref(), input.pan_number.as_deref())?;
        check_credit_terms(input.credit_limit, input.credit_days)?;
        if let Some(phone) = input.phone.as_deref() {
            check_field("phone", shared::validate_indian_mobile(phone))?;
        }

        let mut tx = self.db.begin().await?;
        let customer_code =
            next_number(&mut tx, "parties", "customer_code", numbering::CUSTOMER).await?;

        let sql = format!(
            r#"
            INSERT INTO parties (
                name, party_type, display_name, customer_code, business_type,
                contact_persons, site_addresses, office_address, office_city, office_state,
                office_pin_code, gstin_number, pan_number, state_code, email, phone,
                payment_terms, credit_limit, credit_days, customer_status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, COALESCE($20, 'Prospect'), $21)
            RETURNING {PARTY_COLUMNS}
            "#
        );
        let party = sqlx::query_as::<_, Party>(&sql)
            .bind(input.name.trim())
            .bind(&input.party_type)
            .bind(&input.display_name)
            .bind(&customer_code)
            .bind(&input.business_type)
            .bind(Json(&input.contact_persons))
            .bind(Json(&input.site_addresses))
            .bind(&input.office_address)
            .bind(&input.office_city)
            .bind(&input.office_state)
            .bind(&input.office_pin_code)
            .bind(&input.gstin_number)
            .bind(&input.pan_number)
            .bind(&state_code)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.payment_terms)
            .bind(input.credit_limit)
            .bind(input.credit_days)
            .bind(&input.customer_status)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(party = %party.name, code = %customer_code, "Party created");
        Ok(party)
    }

    /// Update a party; credit-term changes are written to the history in the same transaction
    pub async fn update_party(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdatePartyInput,
    ) -> AppResult<Party> {
        input.validate()?;
        let state_code = check_tax_ids(input.gstin_number.as_deref(), input.pan_number.as_deref())?;
        check_credit_terms(input.credit_limit, input.credit_days)?;

        let mut tx = self.db.begin().await?;

        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = $1 FOR UPDATE");
        let existing = sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Party".to_string()))?;

        let next_terms = CreditTerms {
            payment_terms: input.payment_terms.clone().or(existing.payment_terms.clone()),
            credit_limit: input.credit_limit.or(existing.credit_limit),
            credit_days: input.credit_days.or(existing.credit_days),
        };
        let changes = existing.credit_terms().diff(&next_terms);

        let sql = format!(
            r#"
            UPDATE parties SET
                name = COALESCE($2, name),
                party_type = COALESCE($3, party_type),
                display_name = COALESCE($4, display_name),
                business_type = COALESCE($5, business_type),
                contact_persons = COALESCE($6, contact_persons),
                site_addresses = COALESCE($7, site_addresses),
                office_address = COALESCE($8, office_address),
                office_city = COALESCE($9, office_city),
                office_state = COALESCE($10, office_state),
                office_pin_code = COALESCE($11, office_pin_code),
                gstin_number = COALESCE($12, gstin_number),
                pan_number = COALESCE($13, pan_number),
                state_code = COALESCE($14, state_code),
                email = COALESCE($15, email),
                phone = COALESCE($16, phone),
                payment_terms = $17,
                credit_limit = $18,
                credit_days = $19,
                customer_status = COALESCE($20, customer_status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PARTY_COLUMNS}
            "#
        );
        let party = sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(&input.party_type)
            .bind(&input.display_name)
            .bind(&input.business_type)
            .bind(input.contact_persons.as_ref().map(Json))
            .bind(input.site_addresses.as_ref().map(Json))
            .bind(&input.office_address)
            .bind(&input.office_city)
            .bind(&input.office_state)
            .bind(&input.office_pin_code)
            .bind(&input.gstin_number)
            .bind(&input.pan_number)
            .bind(&state_code)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&next_terms.payment_terms)
            .bind(next_terms.credit_limit)
            .bind(next_terms.credit_days)
            .bind(&input.customer_status)
            .fetch_one(&mut *tx)
            .await?;

        for (field, old_value, new_value) in &changes {
            sqlx::query(
                r#"
                INSERT INTO party_history (party_id, field_name, old_value, new_value, reason, changed_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(*field)
            .bind(old_value)
            .bind(new_value)
            .bind(&input.change_reason)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        if !changes.is_empty() {
            tracing::info!(party_id = %id, changes = changes.len(), "Party credit terms changed");
        }
        Ok(party)
    }

    pub async fn delete_party(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM parties WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Party".to_string()));
        }
        Ok(())
    }

    /// Draft -> pending_approval
    pub async fn submit_for_approval(&self, id: Uuid) -> AppResult<Party> {
        self.move_approval(id, PartyApprovalStatus::PendingApproval, None).await
    }

    /// pending_approval -> approved
    pub async fn approve_party(&self, approver: Uuid, id: Uuid) -> AppResult<Party> {
        self.move_approval(id, PartyApprovalStatus::Approved, Some(approver)).await
    }

    async fn move_approval(
        &self,
        id: Uuid,
        next: PartyApprovalStatus,
        approver: Option<Uuid>,
    ) -> AppResult<Party> {
        let mut tx = self.db.begin().await?;
        let current: PartyApprovalStatus =
            lock_column_status(&mut tx, "parties", "approval_status", id, "Party").await?;
        ensure_transition(current, next)?;

        let sql = format!(
            r#"
            UPDATE parties
            SET approval_status = $2,
                approved_by = COALESCE($3, approved_by),
                approved_at = CASE WHEN $3::uuid IS NULL THEN approved_at ELSE NOW() END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PARTY_COLUMNS}
            "#
        );
        let party = sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(party_id = %id, from = %current, to = %next, "Party approval status changed");
        Ok(party)
    }

    pub async fn party_history(&self, id: Uuid) -> AppResult<Vec<PartyHistory>> {
        self.get_party(id).await?;
        let history = sqlx::query_as::<_, PartyHistory>(
            r#"
            SELECT id, party_id, field_name, old_value, new_value, reason, changed_by, changed_at
            FROM party_history
            WHERE party_id = $1
            ORDER BY changed_at DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(history)
    }
}
