//! Production schedules
//!
//! A schedule stores planned dates per department. Creating one fans the
//! department slots out into shop-floor tasks for the supervisors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{ensure_transition, is_reschedule, parse_status, DepartmentSlot, PaperStatus, ScheduleStatus, TaskStatus};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::production::{ensure_schedulable, move_paper, ProductionPaper, PAPER_COLUMNS};
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct SchedulingService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductionSchedule {
    pub id: Uuid,
    pub production_paper_id: Uuid,
    pub production_start_date: NaiveDate,
    pub target_completion_date: NaiveDate,
    pub priority: String,
    pub department_schedule: Json<Vec<DepartmentSlot>>,
    pub primary_supervisor: Option<String>,
    pub backup_supervisor: Option<String>,
    pub status: String,
    pub measurement_received: bool,
    pub production_paper_approved: bool,
    pub shutter_available: bool,
    pub laminate_available: bool,
    pub frame_material_available: bool,
    pub reason_for_change: Option<String>,
    pub remarks: Option<String>,
    pub scheduled_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductionTask {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub department_id: Uuid,
    pub supervisor_id: Option<Uuid>,
    pub supervisor_type: Option<String>,
    pub production_paper_no: String,
    pub party_name: Option<String>,
    pub product_type: Option<String>,
    pub order_type: Option<String>,
    pub quantity: i32,
    pub planned_start_date: Option<NaiveDate>,
    pub planned_end_date: Option<NaiveDate>,
    pub status: String,
    pub quantity_completed: i32,
    pub balance_quantity: i32,
    pub rejection_reason: Option<String>,
    pub on_hold_reason: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleInput {
    pub production_paper_id: Uuid,
    pub production_start_date: NaiveDate,
    pub target_completion_date: NaiveDate,
    pub priority: Option<String>,
    #[serde(default)]
    pub department_schedule: Vec<DepartmentSlot>,
    pub primary_supervisor: Option<String>,
    pub backup_supervisor: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleInput {
    pub production_start_date: Option<NaiveDate>,
    pub target_completion_date: Option<NaiveDate>,
    pub priority: Option<String>,
    pub primary_supervisor: Option<String>,
    pub backup_supervisor: Option<String>,
    pub reason_for_change: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleStatusInput {
    pub status: ScheduleStatus,
}

/// Schedule together with the tasks created from its department slots
#[derive(Debug, Serialize)]
pub struct ScheduleWithTasks {
    #[serde(flatten)]
    pub schedule: ProductionSchedule,
    pub tasks: Vec<ProductionTask>,
}

const SCHEDULE_COLUMNS: &str = "id, production_paper_id, production_start_date, \
     target_completion_date, priority, department_schedule, primary_supervisor, backup_supervisor, \
     status, measurement_received, production_paper_approved, shutter_available, \
     laminate_available, frame_material_available, reason_for_change, remarks, scheduled_by, \
     created_at, updated_at";

pub(crate) const PRODUCTION_TASK_COLUMNS: &str = "id, schedule_id, department_id, supervisor_id, \
     supervisor_type, production_paper_no, party_name, product_type, order_type, quantity, \
     planned_start_date, planned_end_date, status, quantity_completed, balance_quantity, \
     rejection_reason, on_hold_reason, start_time, accepted_at, paused_at, resumed_at, \
     completed_at, created_at, updated_at";

fn check_dates(start: NaiveDate, end: NaiveDate) -> AppResult<()> {
    if end < start {
        return Err(AppError::validation(
            "target_completion_date",
            "Target completion cannot be before production start",
        ));
    }
    Ok(())
}

/// Active supervisor of a department, narrowed to a supervisor type when given
async fn find_supervisor(
    conn: &mut PgConnection,
    department_id: Uuid,
    supervisor_type: Option<&str>,
) -> AppResult<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM production_supervisors \
         WHERE department_id = $1 AND is_active AND ($2::text IS NULL OR supervisor_type = $2) \
         ORDER BY created_at LIMIT 1",
    )
    .bind(department_id)
    .bind(supervisor_type)
    .fetch_optional(conn)
    .await?;
    Ok(id)
}

impl SchedulingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_schedules(&self, status: Option<String>) -> AppResult<Vec<ProductionSchedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM production_schedules \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY production_start_date"
        );
        let schedules = sqlx::query_as::<_, ProductionSchedule>(&sql)
            .bind(status)
            .fetch_all(&self.db)
            .await?;
        Ok(schedules)
    }

    pub async fn get_schedule(&self, id: Uuid) -> AppResult<ScheduleWithTasks> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM production_schedules WHERE id = $1");
        let schedule = sqlx::query_as::<_, ProductionSchedule>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production schedule".to_string()))?;

        let sql = format!(
            "SELECT {PRODUCTION_TASK_COLUMNS} FROM production_tasks WHERE schedule_id = $1 \
             ORDER BY planned_start_date"
        );
        let tasks = sqlx::query_as::<_, ProductionTask>(&sql)
            .bind(id)
            .fetch_all(&self.db)
            .await?;

        Ok(ScheduleWithTasks { schedule, tasks })
    }

    pub async fn create_schedule(
        &self,
        user_id: Uuid,
        input: CreateScheduleInput,
    ) -> AppResult<ScheduleWithTasks> {
        check_dates(input.production_start_date, input.target_completion_date)?;
        for slot in &input.department_schedule {
            check_field("department_schedule", slot.validate())?;
        }

        let mut tx = self.db.begin().await?;
        let sql = format!("SELECT {PAPER_COLUMNS} FROM production_papers WHERE id = $1 AND NOT is_deleted FOR UPDATE");
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(input.production_paper_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))?;

        let already = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM production_schedules WHERE production_paper_id = $1",
        )
        .bind(paper.id)
        .fetch_optional(&mut *tx)
        .await?;
        if already.is_some() {
            return Err(AppError::BusinessRule(format!(
                "Production paper {} is already scheduled",
                paper.paper_number
            )));
        }

        let paper_status: PaperStatus = parse_status(&paper.status)?;
        ensure_schedulable(paper_status)?;

        let sql = format!(
            r#"
            INSERT INTO production_schedules (
                production_paper_id, production_start_date, target_completion_date, priority,
                department_schedule, primary_supervisor, backup_supervisor, status,
                measurement_received, production_paper_approved, shutter_available,
                laminate_available, frame_material_available, remarks, scheduled_by
            )
            VALUES ($1, $2, $3, COALESCE($4, 'Normal'), $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {SCHEDULE_COLUMNS}
            "#
        );
        let schedule = sqlx::query_as::<_, ProductionSchedule>(&sql)
            .bind(paper.id)
            .bind(input.production_start_date)
            .bind(input.target_completion_date)
            .bind(input.priority)
            .bind(Json(&input.department_schedule))
            .bind(input.primary_supervisor)
            .bind(input.backup_supervisor)
            .bind(ScheduleStatus::Scheduled.as_str())
            .bind(paper.measurement_id.is_some())
            .bind(paper_status != PaperStatus::Draft)
            .bind(paper.shutter_available)
            .bind(paper.laminate_available)
            .bind(paper.frame_material_available)
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        move_paper(&mut tx, paper.id, PaperStatus::InProduction).await?;
        sqlx::query(
            "UPDATE production_papers SET production_start_date = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(paper.id)
        .bind(input.production_start_date)
        .execute(&mut *tx)
        .await?;

        let mut tasks = Vec::with_capacity(input.department_schedule.len());
        let task_sql = format!(
            r#"
            INSERT INTO production_tasks (
                schedule_id, department_id, supervisor_id, supervisor_type, production_paper_no,
                party_name, product_type, order_type, quantity, planned_start_date,
                planned_end_date, status, balance_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $9)
            RETURNING {PRODUCTION_TASK_COLUMNS}
            "#
        );
        for slot in &input.department_schedule {
            let department = sqlx::query_scalar::<_, Uuid>("SELECT id FROM departments WHERE id = $1")
                .bind(slot.department_id)
                .fetch_optional(&mut *tx)
                .await?;
            if department.is_none() {
                return Err(AppError::NotFound("Department".to_string()));
            }
            let supervisor_id =
                find_supervisor(&mut tx, slot.department_id, slot.supervisor_type.as_deref()).await?;

            let task = sqlx::query_as::<_, ProductionTask>(&task_sql)
                .bind(schedule.id)
                .bind(slot.department_id)
                .bind(supervisor_id)
                .bind(&slot.supervisor_type)
                .bind(&paper.paper_number)
                .bind(&paper.party_name)
                .bind(&paper.product_type)
                .bind(&paper.order_type)
                .bind(slot.quantity)
                .bind(slot.planned_start)
                .bind(slot.planned_end)
                .bind(TaskStatus::Pending.as_str())
                .fetch_one(&mut *tx)
                .await?;
            tasks.push(task);
        }

        tx.commit().await?;
        tracing::info!(
            paper = %paper.paper_number,
            tasks = tasks.len(),
            "Production scheduled"
        );
        Ok(ScheduleWithTasks { schedule, tasks })
    }

    /// Date changes require a reason
    pub async fn update_schedule(
        &self,
        id: Uuid,
        input: UpdateScheduleInput,
    ) -> AppResult<ProductionSchedule> {
        let mut tx = self.db.begin().await?;
        let current = sqlx::query_as::<_, (NaiveDate, NaiveDate)>(
            "SELECT production_start_date, target_completion_date FROM production_schedules \
             WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Production schedule".to_string()))?;

        let rescheduled = is_reschedule(
            current,
            input.production_start_date,
            input.target_completion_date,
        );
        let has_reason = input
            .reason_for_change
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if rescheduled && !has_reason {
            return Err(AppError::validation(
                "reason_for_change",
                "A reason is required to reschedule",
            ));
        }
        check_dates(
            input.production_start_date.unwrap_or(current.0),
            input.target_completion_date.unwrap_or(current.1),
        )?;

        let sql = format!(
            r#"
            UPDATE production_schedules SET
                production_start_date = COALESCE($2, production_start_date),
                target_completion_date = COALESCE($3, target_completion_date),
                priority = COALESCE($4, priority),
                primary_supervisor = COALESCE($5, primary_supervisor),
                backup_supervisor = COALESCE($6, backup_supervisor),
                reason_for_change = COALESCE($7, reason_for_change),
                remarks = COALESCE($8, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SCHEDULE_COLUMNS}
            "#
        );
        let schedule = sqlx::query_as::<_, ProductionSchedule>(&sql)
            .bind(id)
            .bind(input.production_start_date)
            .bind(input.target_completion_date)
            .bind(input.priority)
            .bind(input.primary_supervisor)
            .bind(input.backup_supervisor)
            .bind(input.reason_for_change)
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        if rescheduled {
            tracing::info!(schedule_id = %id, "Production rescheduled");
        }
        Ok(schedule)
    }

    pub async fn update_schedule_status(
        &self,
        id: Uuid,
        next: ScheduleStatus,
    ) -> AppResult<ProductionSchedule> {
        let mut tx = self.db.begin().await?;
        let current: ScheduleStatus =
            lock_status(&mut tx, "production_schedules", id, "Production schedule").await?;
        ensure_transition(current, next)?;

        let sql = format!(
            "UPDATE production_schedules SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {SCHEDULE_COLUMNS}"
        );
        let schedule = sqlx::query_as::<_, ProductionSchedule>(&sql)
            .bind(id)
            .bind(next.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(schedule_id = %id, from = %current, to = %next, "Schedule status changed");
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_before_start_is_rejected() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(check_dates(start, end).is_err());
        assert!(check_dates(end, start).is_ok());
        assert!(check_dates(start, start).is_ok());
    }

    #[test]
    fn test_department_schedule_parses() {
        let body = r#"{
            "production_paper_id": "6f1c2d36-3a8a-4a4f-9a59-2f1e0c0b9d11",
            "production_start_date": "2024-03-01",
            "target_completion_date": "2024-03-15",
            "department_schedule": [{
                "department_id": "0b6f1e5c-4a4c-4d7b-8f0e-5e7a8a3b2c10",
                "supervisor_type": "Cutting",
                "planned_start": "2024-03-01",
                "planned_end": "2024-03-04",
                "quantity": 40
            }]
        }"#;
        let input: CreateScheduleInput = serde_json::from_str(body).unwrap();
        assert_eq!(input.department_schedule.len(), 1);
        assert!(input.department_schedule[0].validate().is_ok());
        assert!(input.priority.is_none());
    }
}
