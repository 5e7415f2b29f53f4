//! Measurements, measurement tasks, production papers and tracking stages

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    duration_hours, ensure_one_of, ensure_transition, numbering, ApprovalStatus,
    MeasurementItem, MeasurementTaskStatus, PaperStatus, QcStatus, Role, StageStatus,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::{next_number, next_with_prefix, preview_number};
use crate::services::status::{lock_column_status, lock_status};

#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
}

// ============================================================================
// Measurements
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Measurement {
    pub id: Uuid,
    pub measurement_number: String,
    pub measurement_type: String,
    pub party_id: Option<Uuid>,
    pub party_name: Option<String>,
    pub task_id: Option<Uuid>,
    pub thickness: Option<String>,
    pub measurement_date: Option<NaiveDate>,
    pub site_location: Option<String>,
    pub items: Json<Vec<MeasurementItem>>,
    pub notes: Option<String>,
    pub approval_status: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMeasurementInput {
    pub measurement_type: String,
    pub party_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub thickness: Option<String>,
    pub measurement_date: Option<NaiveDate>,
    pub site_location: Option<String>,
    #[serde(default)]
    pub items: Vec<MeasurementItem>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeasurementInput {
    pub measurement_type: Option<String>,
    pub thickness: Option<String>,
    pub measurement_date: Option<NaiveDate>,
    pub site_location: Option<String>,
    pub items: Option<Vec<MeasurementItem>>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MeasurementFilter {
    pub approval_status: Option<String>,
    pub party_id: Option<Uuid>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectInput {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SoftDeleteInput {
    pub reason: Option<String>,
}

const MEASUREMENT_COLUMNS: &str = "id, measurement_number, measurement_type, party_id, party_name, \
     task_id, thickness, measurement_date, site_location, items, notes, approval_status, status, \
     rejection_reason, approved_by, approved_at, is_deleted, deleted_at, deletion_reason, \
     created_by, created_at, updated_at";

// ============================================================================
// Measurement tasks
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeasurementTask {
    pub id: Uuid,
    pub task_number: String,
    pub measurement_request_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub party_name: Option<String>,
    pub site_location: Option<String>,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMeasurementTaskInput {
    pub measurement_request_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub site_location: Option<String>,
    pub assigned_to: Uuid,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementTaskStatusInput {
    pub status: MeasurementTaskStatus,
    pub notes: Option<String>,
}

const TASK_COLUMNS: &str = "id, task_number, measurement_request_id, party_id, party_name, \
     site_location, assigned_to, assigned_by, due_date, notes, status, completed_at, \
     created_at, updated_at";

// ============================================================================
// Production papers
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductionPaper {
    pub id: Uuid,
    pub paper_number: String,
    pub party_id: Uuid,
    pub party_name: String,
    pub measurement_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub project_site_name: Option<String>,
    pub order_type: String,
    pub product_category: String,
    pub product_type: Option<String>,
    pub product_sub_type: Option<String>,
    pub design: Option<String>,
    pub thickness: Option<String>,
    pub laminate: Option<String>,
    pub total_quantity: i32,
    pub expected_dispatch_date: Option<NaiveDate>,
    pub production_start_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub status: String,
    pub shutter_available: bool,
    pub laminate_available: bool,
    pub frame_material_available: bool,
    pub raw_material_checked_by: Option<Uuid>,
    pub raw_material_check_date: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaperInput {
    pub party_id: Uuid,
    pub measurement_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub project_site_name: Option<String>,
    pub order_type: Option<String>,
    pub product_category: String,
    pub product_type: Option<String>,
    pub product_sub_type: Option<String>,
    pub design: Option<String>,
    pub thickness: Option<String>,
    pub laminate: Option<String>,
    #[serde(default)]
    pub total_quantity: i32,
    pub expected_dispatch_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaperInput {
    pub measurement_id: Option<Uuid>,
    pub project_site_name: Option<String>,
    pub order_type: Option<String>,
    pub product_type: Option<String>,
    pub product_sub_type: Option<String>,
    pub design: Option<String>,
    pub thickness: Option<String>,
    pub laminate: Option<String>,
    pub total_quantity: Option<i32>,
    pub expected_dispatch_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaperFilter {
    pub status: Option<String>,
    pub party_id: Option<Uuid>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaperStatusInput {
    pub status: PaperStatus,
}

#[derive(Debug, Deserialize)]
pub struct RawMaterialCheckInput {
    pub shutter_available: bool,
    pub laminate_available: bool,
    pub frame_material_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct NextPaperNumberQuery {
    pub product_category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextNumber {
    pub next_number: String,
}

pub(crate) const PAPER_COLUMNS: &str = "id, paper_number, party_id, party_name, measurement_id, \
     sales_order_id, project_site_name, order_type, product_category, product_type, \
     product_sub_type, design, thickness, laminate, total_quantity, expected_dispatch_date, \
     production_start_date, remarks, status, shutter_available, laminate_available, \
     frame_material_available, raw_material_checked_by, raw_material_check_date, is_deleted, \
     deleted_at, deletion_reason, created_by, created_at, updated_at";

// ============================================================================
// Tracking stages
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrackingStage {
    pub id: Uuid,
    pub production_paper_id: Uuid,
    pub stage_name: String,
    pub stage_sequence: i32,
    pub status: String,
    pub start_date_time: Option<DateTime<Utc>>,
    pub end_date_time: Option<DateTime<Utc>>,
    pub actual_duration_hours: Option<Decimal>,
    pub remarks: Option<String>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStageInput {
    pub stage_name: String,
    pub stage_sequence: i32,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StageStatusInput {
    pub status: StageStatus,
    pub remarks: Option<String>,
}

const STAGE_COLUMNS: &str = "id, production_paper_id, stage_name, stage_sequence, status, \
     start_date_time, end_date_time, actual_duration_hours, remarks, updated_by, created_at, \
     updated_at";

/// Party name for a new document, `err` when the party does not exist
async fn require_party(
    conn: &mut PgConnection,
    party_id: Uuid,
    err: impl FnOnce() -> AppError,
) -> AppResult<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM parties WHERE id = $1")
        .bind(party_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(err)
}

/// Whether the paper has at least one approved quality check
pub(crate) async fn has_approved_qc(conn: &mut PgConnection, paper_id: Uuid) -> AppResult<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM quality_checks WHERE production_paper_id = $1 AND status = $2)",
    )
    .bind(paper_id)
    .bind(QcStatus::Approved.as_str())
    .fetch_one(conn)
    .await?;
    Ok(found)
}

/// Move a production paper along its workflow inside the caller's transaction
pub(crate) async fn move_paper(
    conn: &mut PgConnection,
    paper_id: Uuid,
    next: PaperStatus,
) -> AppResult<PaperStatus> {
    let current: PaperStatus =
        lock_status(&mut *conn, "production_papers", paper_id, "Production paper").await?;
    if current != next {
        ensure_transition(current, next)?;
        sqlx::query("UPDATE production_papers SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(paper_id)
            .bind(next.as_str())
            .execute(&mut *conn)
            .await?;
        tracing::info!(%paper_id, from = %current, to = %next, "Production paper status changed");
    }
    Ok(current)
}

impl ProductionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Measurements ----

    pub async fn list_measurements(&self, filter: MeasurementFilter) -> AppResult<Vec<Measurement>> {
        let sql = format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements \
             WHERE ($1 OR NOT is_deleted) \
               AND ($2::text IS NULL OR approval_status = $2) \
               AND ($3::uuid IS NULL OR party_id = $3) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, Measurement>(&sql)
            .bind(filter.include_deleted)
            .bind(filter.approval_status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get_measurement(&self, id: Uuid) -> AppResult<Measurement> {
        let sql = format!("SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE id = $1");
        sqlx::query_as::<_, Measurement>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Measurement".to_string()))
    }

    pub async fn next_measurement_number(&self) -> AppResult<NextNumber> {
        let next_number =
            preview_number(&self.db, "measurements", "measurement_number", numbering::MEASUREMENT).await?;
        Ok(NextNumber { next_number })
    }

    /// Captains' measurements start pending approval
    pub async fn create_measurement(
        &self,
        user_id: Uuid,
        role: Role,
        input: CreateMeasurementInput,
    ) -> AppResult<Measurement> {
        check_field("measurement_type", shared::validate_non_empty(&input.measurement_type))?;
        let approval = ApprovalStatus::initial_for(role == Role::MeasurementCaptain);

        let mut tx = self.db.begin().await?;
        let party_name = match input.party_id {
            Some(party_id) => Some(
                require_party(&mut tx, party_id, || AppError::NotFound("Party".to_string())).await?,
            ),
            None => None,
        };
        let number = next_number(&mut tx, "measurements", "measurement_number", numbering::MEASUREMENT).await?;

        let sql = format!(
            r#"
            INSERT INTO measurements (
                measurement_number, measurement_type, party_id, party_name, task_id, thickness,
                measurement_date, site_location, items, notes, approval_status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, CURRENT_DATE), $8, $9, $10, $11, $12)
            RETURNING {MEASUREMENT_COLUMNS}
            "#
        );
        let measurement = sqlx::query_as::<_, Measurement>(&sql)
            .bind(&number)
            .bind(input.measurement_type.trim())
            .bind(input.party_id)
            .bind(party_name)
            .bind(input.task_id)
            .bind(input.thickness)
            .bind(input.measurement_date)
            .bind(input.site_location)
            .bind(Json(&input.items))
            .bind(input.notes)
            .bind(approval.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(measurement_number = %number, approval = %approval, "Measurement recorded");
        Ok(measurement)
    }

    pub async fn update_measurement(
        &self,
        id: Uuid,
        input: UpdateMeasurementInput,
    ) -> AppResult<Measurement> {
        let sql = format!(
            r#"
            UPDATE measurements SET
                measurement_type = COALESCE($2, measurement_type),
                thickness = COALESCE($3, thickness),
                measurement_date = COALESCE($4, measurement_date),
                site_location = COALESCE($5, site_location),
                items = COALESCE($6, items),
                notes = COALESCE($7, notes),
                status = COALESCE($8, status),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {MEASUREMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Measurement>(&sql)
            .bind(id)
            .bind(input.measurement_type)
            .bind(input.thickness)
            .bind(input.measurement_date)
            .bind(input.site_location)
            .bind(input.items.as_ref().map(Json))
            .bind(input.notes)
            .bind(input.status)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Measurement".to_string()))
    }

    pub async fn approve_measurement(&self, approver: Uuid, id: Uuid) -> AppResult<Measurement> {
        self.decide_measurement(approver, id, ApprovalStatus::Approved, None)
            .await
    }

    pub async fn reject_measurement(
        &self,
        approver: Uuid,
        id: Uuid,
        input: RejectInput,
    ) -> AppResult<Measurement> {
        check_field("reason", shared::validate_non_empty(&input.reason))?;
        self.decide_measurement(approver, id, ApprovalStatus::Rejected, Some(input.reason))
            .await
    }

    async fn decide_measurement(
        &self,
        approver: Uuid,
        id: Uuid,
        decision: ApprovalStatus,
        reason: Option<String>,
    ) -> AppResult<Measurement> {
        let mut tx = self.db.begin().await?;
        let current: ApprovalStatus =
            lock_column_status(&mut tx, "measurements", "approval_status", id, "Measurement").await?;
        ensure_transition(current, decision)?;

        let sql = format!(
            r#"
            UPDATE measurements
            SET approval_status = $2, approved_by = $3, approved_at = NOW(),
                rejection_reason = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {MEASUREMENT_COLUMNS}
            "#
        );
        let measurement = sqlx::query_as::<_, Measurement>(&sql)
            .bind(id)
            .bind(decision.as_str())
            .bind(approver)
            .bind(reason)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            measurement = %measurement.measurement_number,
            decision = %decision,
            "Measurement reviewed"
        );
        Ok(measurement)
    }

    pub async fn delete_measurement(&self, id: Uuid, input: SoftDeleteInput) -> AppResult<Measurement> {
        self.set_deleted("measurements", id, true, input.reason).await?;
        self.get_measurement(id).await
    }

    pub async fn recover_measurement(&self, id: Uuid) -> AppResult<Measurement> {
        self.set_deleted("measurements", id, false, None).await?;
        self.get_measurement(id).await
    }

    async fn set_deleted(
        &self,
        table: &'static str,
        id: Uuid,
        deleted: bool,
        reason: Option<String>,
    ) -> AppResult<()> {
        let sql = format!(
            "UPDATE {table} SET is_deleted = $2, \
                 deleted_at = CASE WHEN $2 THEN NOW() ELSE NULL END, \
                 deletion_reason = CASE WHEN $2 THEN $3 ELSE NULL END, \
                 updated_at = NOW() \
             WHERE id = $1 AND is_deleted = NOT $2"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(deleted)
            .bind(reason)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            let state = if deleted { "active" } else { "deleted" };
            return Err(AppError::NotFound(format!("{} record", state)));
        }
        tracing::info!(table, %id, deleted, "Soft delete flag changed");
        Ok(())
    }

    // ---- Measurement tasks ----

    pub async fn list_measurement_tasks(
        &self,
        assigned_to: Option<Uuid>,
    ) -> AppResult<Vec<MeasurementTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM measurement_tasks \
             WHERE ($1::uuid IS NULL OR assigned_to = $1) ORDER BY created_at DESC"
        );
        let tasks = sqlx::query_as::<_, MeasurementTask>(&sql)
            .bind(assigned_to)
            .fetch_all(&self.db)
            .await?;
        Ok(tasks)
    }

    pub async fn create_measurement_task(
        &self,
        assigned_by: Uuid,
        input: CreateMeasurementTaskInput,
    ) -> AppResult<MeasurementTask> {
        let mut tx = self.db.begin().await?;

        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(input.assigned_to)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        if role != Role::MeasurementCaptain.as_str() {
            return Err(AppError::BusinessRule(
                "Measurement tasks can only be assigned to a measurement captain".to_string(),
            ));
        }
        let party_name = match input.party_id {
            Some(party_id) => Some(
                require_party(&mut tx, party_id, || AppError::NotFound("Party".to_string())).await?,
            ),
            None => None,
        };

        let prefix = numbering::measurement_task_prefix(Utc::now().date_naive());
        let number = next_with_prefix(&mut tx, "measurement_tasks", "task_number", &prefix, 3, None).await?;

        let sql = format!(
            r#"
            INSERT INTO measurement_tasks (
                task_number, measurement_request_id, party_id, party_name, site_location,
                assigned_to, assigned_by, due_date, notes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let task = sqlx::query_as::<_, MeasurementTask>(&sql)
            .bind(&number)
            .bind(input.measurement_request_id)
            .bind(input.party_id)
            .bind(party_name)
            .bind(input.site_location)
            .bind(input.assigned_to)
            .bind(assigned_by)
            .bind(input.due_date)
            .bind(input.notes)
            .bind(MeasurementTaskStatus::Assigned.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(task_number = %number, assigned_to = %input.assigned_to, "Measurement task assigned");
        Ok(task)
    }

    pub async fn update_measurement_task_status(
        &self,
        id: Uuid,
        input: MeasurementTaskStatusInput,
    ) -> AppResult<MeasurementTask> {
        let mut tx = self.db.begin().await?;
        let current: MeasurementTaskStatus =
            lock_status(&mut tx, "measurement_tasks", id, "Measurement task").await?;
        ensure_transition(current, input.status)?;

        let sql = format!(
            r#"
            UPDATE measurement_tasks SET
                status = $2,
                notes = COALESCE($3, notes),
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );
        let task = sqlx::query_as::<_, MeasurementTask>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.notes)
            .bind(input.status == MeasurementTaskStatus::Completed)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(task = %task.task_number, from = %current, to = %input.status, "Measurement task status changed");
        Ok(task)
    }

    // ---- Production papers ----

    pub async fn list_papers(&self, filter: PaperFilter) -> AppResult<Vec<ProductionPaper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM production_papers \
             WHERE ($1 OR NOT is_deleted) \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR party_id = $3) \
             ORDER BY created_at DESC"
        );
        let papers = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(filter.include_deleted)
            .bind(filter.status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(papers)
    }

    pub async fn get_paper(&self, id: Uuid) -> AppResult<ProductionPaper> {
        let sql = format!("SELECT {PAPER_COLUMNS} FROM production_papers WHERE id = $1");
        sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))
    }

    pub async fn next_paper_number(&self, query: NextPaperNumberQuery) -> AppResult<NextNumber> {
        let series =
            numbering::production_paper_series(query.product_category.as_deref().unwrap_or_default());
        let next_number = preview_number(&self.db, "production_papers", "paper_number", series).await?;
        Ok(NextNumber { next_number })
    }

    pub async fn create_paper(&self, user_id: Uuid, input: CreatePaperInput) -> AppResult<ProductionPaper> {
        check_field("product_category", shared::validate_non_empty(&input.product_category))?;
        if input.total_quantity < 0 {
            return Err(AppError::validation("total_quantity", "Quantity cannot be negative"));
        }

        let mut tx = self.db.begin().await?;
        let party_name = require_party(&mut tx, input.party_id, || {
            AppError::BusinessRule("Party does not exist".to_string())
        })
        .await?;
        let series = numbering::production_paper_series(&input.product_category);
        let number = next_number(&mut tx, "production_papers", "paper_number", series).await?;

        let sql = format!(
            r#"
            INSERT INTO production_papers (
                paper_number, party_id, party_name, measurement_id, sales_order_id,
                project_site_name, order_type, product_category, product_type, product_sub_type,
                design, thickness, laminate, total_quantity, expected_dispatch_date, remarks,
                status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'Regular'), $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18)
            RETURNING {PAPER_COLUMNS}
            "#
        );
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(&number)
            .bind(input.party_id)
            .bind(&party_name)
            .bind(input.measurement_id)
            .bind(input.sales_order_id)
            .bind(input.project_site_name)
            .bind(input.order_type)
            .bind(&input.product_category)
            .bind(input.product_type)
            .bind(input.product_sub_type)
            .bind(input.design)
            .bind(input.thickness)
            .bind(input.laminate)
            .bind(input.total_quantity)
            .bind(input.expected_dispatch_date)
            .bind(input.remarks)
            .bind(PaperStatus::Draft.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(paper_number = %number, party = %party_name, "Production paper created");
        Ok(paper)
    }

    pub async fn update_paper(&self, id: Uuid, input: UpdatePaperInput) -> AppResult<ProductionPaper> {
        if input.total_quantity.is_some_and(|q| q < 0) {
            return Err(AppError::validation("total_quantity", "Quantity cannot be negative"));
        }

        let sql = format!(
            r#"
            UPDATE production_papers SET
                measurement_id = COALESCE($2, measurement_id),
                project_site_name = COALESCE($3, project_site_name),
                order_type = COALESCE($4, order_type),
                product_type = COALESCE($5, product_type),
                product_sub_type = COALESCE($6, product_sub_type),
                design = COALESCE($7, design),
                thickness = COALESCE($8, thickness),
                laminate = COALESCE($9, laminate),
                total_quantity = COALESCE($10, total_quantity),
                expected_dispatch_date = COALESCE($11, expected_dispatch_date),
                remarks = COALESCE($12, remarks),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {PAPER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(id)
            .bind(input.measurement_id)
            .bind(input.project_site_name)
            .bind(input.order_type)
            .bind(input.product_type)
            .bind(input.product_sub_type)
            .bind(input.design)
            .bind(input.thickness)
            .bind(input.laminate)
            .bind(input.total_quantity)
            .bind(input.expected_dispatch_date)
            .bind(input.remarks)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))
    }

    pub async fn update_paper_status(&self, id: Uuid, next: PaperStatus) -> AppResult<ProductionPaper> {
        let mut tx = self.db.begin().await?;
        let current = move_paper(&mut tx, id, next).await?;
        if current == next {
            return Err(AppError::BusinessRule(format!(
                "Production paper is already '{}'",
                next
            )));
        }
        tx.commit().await?;
        self.get_paper(id).await
    }

    pub async fn delete_paper(&self, id: Uuid, input: SoftDeleteInput) -> AppResult<ProductionPaper> {
        self.set_deleted("production_papers", id, true, input.reason).await?;
        self.get_paper(id).await
    }

    pub async fn recover_paper(&self, id: Uuid) -> AppResult<ProductionPaper> {
        self.set_deleted("production_papers", id, false, None).await?;
        self.get_paper(id).await
    }

    pub async fn record_raw_material_check(
        &self,
        checker: Uuid,
        id: Uuid,
        input: RawMaterialCheckInput,
    ) -> AppResult<ProductionPaper> {
        let sql = format!(
            r#"
            UPDATE production_papers SET
                shutter_available = $2, laminate_available = $3, frame_material_available = $4,
                raw_material_checked_by = $5, raw_material_check_date = NOW(), updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {PAPER_COLUMNS}
            "#
        );
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(id)
            .bind(input.shutter_available)
            .bind(input.laminate_available)
            .bind(input.frame_material_available)
            .bind(checker)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))?;

        tracing::info!(
            paper = %paper.paper_number,
            shutter = input.shutter_available,
            laminate = input.laminate_available,
            frame = input.frame_material_available,
            "Raw material check recorded"
        );
        Ok(paper)
    }

    // ---- Tracking stages ----

    pub async fn list_stages(&self, paper_id: Uuid) -> AppResult<Vec<TrackingStage>> {
        let sql = format!(
            "SELECT {STAGE_COLUMNS} FROM production_tracking WHERE production_paper_id = $1 \
             ORDER BY stage_sequence"
        );
        let stages = sqlx::query_as::<_, TrackingStage>(&sql)
            .bind(paper_id)
            .fetch_all(&self.db)
            .await?;
        Ok(stages)
    }

    pub async fn add_stage(
        &self,
        user_id: Uuid,
        paper_id: Uuid,
        input: CreateStageInput,
    ) -> AppResult<TrackingStage> {
        check_field("stage_name", shared::validate_non_empty(&input.stage_name))?;
        if input.stage_sequence <= 0 {
            return Err(AppError::validation("stage_sequence", "Stage sequence must be positive"));
        }
        self.get_paper(paper_id).await?;

        let sql = format!(
            r#"
            INSERT INTO production_tracking (production_paper_id, stage_name, stage_sequence,
                                             status, remarks, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {STAGE_COLUMNS}
            "#
        );
        let stage = sqlx::query_as::<_, TrackingStage>(&sql)
            .bind(paper_id)
            .bind(input.stage_name.trim())
            .bind(input.stage_sequence)
            .bind(StageStatus::Pending.as_str())
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(stage)
    }

    /// Completing the final stage releases the paper for dispatch once QC has approved it
    pub async fn update_stage_status(
        &self,
        user_id: Uuid,
        stage_id: Uuid,
        input: StageStatusInput,
    ) -> AppResult<TrackingStage> {
        let mut tx = self.db.begin().await?;
        let current: StageStatus =
            lock_status(&mut tx, "production_tracking", stage_id, "Production stage").await?;
        ensure_transition(current, input.status)?;

        let sql = format!("SELECT {STAGE_COLUMNS} FROM production_tracking WHERE id = $1");
        let existing = sqlx::query_as::<_, TrackingStage>(&sql)
            .bind(stage_id)
            .fetch_one(&mut *tx)
            .await?;

        let now = Utc::now();
        let (start, end, hours) = match input.status {
            StageStatus::InProgress => (existing.start_date_time.or(Some(now)), None, None),
            StageStatus::Completed => {
                let start = existing.start_date_time.unwrap_or(now);
                (Some(start), Some(now), Some(duration_hours(start, now)))
            }
            _ => (existing.start_date_time, None, None),
        };

        let sql = format!(
            r#"
            UPDATE production_tracking SET
                status = $2, start_date_time = $3, end_date_time = $4, actual_duration_hours = $5,
                remarks = COALESCE($6, remarks), updated_by = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {STAGE_COLUMNS}
            "#
        );
        let stage = sqlx::query_as::<_, TrackingStage>(&sql)
            .bind(stage_id)
            .bind(input.status.as_str())
            .bind(start)
            .bind(end)
            .bind(hours)
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        if input.status == StageStatus::Completed {
            let last_sequence = sqlx::query_scalar::<_, Option<i32>>(
                "SELECT MAX(stage_sequence) FROM production_tracking WHERE production_paper_id = $1",
            )
            .bind(stage.production_paper_id)
            .fetch_one(&mut *tx)
            .await?;

            if last_sequence == Some(stage.stage_sequence) {
                if has_approved_qc(&mut tx, stage.production_paper_id).await? {
                    move_paper(&mut tx, stage.production_paper_id, PaperStatus::ReadyForDispatch)
                        .await?;
                } else {
                    tracing::info!(
                        paper_id = %stage.production_paper_id,
                        "Final stage completed; paper waits for quality approval"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(stage)
    }
}

/// Papers a new schedule may start from
pub(crate) fn ensure_schedulable(status: PaperStatus) -> AppResult<()> {
    ensure_one_of(
        status,
        &[PaperStatus::Draft, PaperStatus::Active, PaperStatus::InProduction],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedulable_papers() {
        assert!(ensure_schedulable(PaperStatus::Draft).is_ok());
        assert!(ensure_schedulable(PaperStatus::Active).is_ok());
        assert!(ensure_schedulable(PaperStatus::InProduction).is_ok());
        assert!(matches!(
            ensure_schedulable(PaperStatus::ReadyForDispatch),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn test_measurement_filter_defaults_hide_deleted() {
        let filter: MeasurementFilter = serde_json::from_str("{}").unwrap();
        assert!(!filter.include_deleted);
        assert!(filter.approval_status.is_none());
    }
}
