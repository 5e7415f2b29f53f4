//! Shop-floor task handling for production supervisors
//!
//! Every operation first resolves the caller's supervisor profile; a task is
//! visible only when it belongs to that department and supervisor type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ensure_one_of, ensure_transition, task_balance, IssueStatus, StatusCount, TaskStatus};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::departments::{DepartmentService, Supervisor};
use crate::services::scheduling::{ProductionTask, PRODUCTION_TASK_COLUMNS};
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct SupervisorService {
    db: PgPool,
    departments: DepartmentService,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaskProgress {
    pub id: Uuid,
    pub task_id: Uuid,
    pub quantity_completed: i32,
    pub balance_quantity: i32,
    pub remarks: Option<String>,
    pub recorded_by: Uuid,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductionIssue {
    pub id: Uuid,
    pub task_id: Uuid,
    pub issue_type: String,
    pub severity: String,
    pub description: String,
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TaskFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonInput {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressInput {
    /// Cumulative quantity finished on the task
    pub quantity_completed: i32,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueInput {
    pub task_id: Uuid,
    pub issue_type: String,
    pub severity: Option<String>,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueInput {
    pub status: IssueStatus,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SupervisorDashboard {
    pub supervisor: Supervisor,
    pub tasks_by_status: Vec<StatusCount>,
    pub open_issues: i64,
}

const ISSUE_COLUMNS: &str = "id, task_id, issue_type, severity, description, status, \
     resolution_notes, resolved_at, reported_by, created_at, updated_at";

/// Status write for task transitions; each status stamps its own columns
const TRANSITION_SQL: &str = r#"
    UPDATE production_tasks SET
        status = $2,
        supervisor_id = CASE WHEN $2 = 'Accepted' THEN $3 ELSE supervisor_id END,
        accepted_at = CASE WHEN $2 = 'Accepted' THEN NOW() ELSE accepted_at END,
        rejection_reason = CASE WHEN $2 = 'Rejected' THEN $4 ELSE rejection_reason END,
        on_hold_reason = CASE WHEN $2 = 'On Hold' THEN $4 ELSE on_hold_reason END,
        paused_at = CASE WHEN $2 = 'On Hold' THEN NOW() ELSE paused_at END,
        resumed_at = CASE WHEN $2 = 'In Progress' THEN NOW() ELSE resumed_at END,
        completed_at = CASE WHEN $2 = 'Completed' THEN NOW() ELSE completed_at END,
        updated_at = NOW()
    WHERE id = $1
    RETURNING id, schedule_id, department_id, supervisor_id, supervisor_type, production_paper_no,
              party_name, product_type, order_type, quantity, planned_start_date, planned_end_date,
              status, quantity_completed, balance_quantity, rejection_reason, on_hold_reason,
              start_time, accepted_at, paused_at, resumed_at, completed_at, created_at, updated_at
"#;

const SCOPE: &str = "department_id = $2 AND (supervisor_type IS NULL OR supervisor_type = $3)";

impl SupervisorService {
    pub fn new(db: PgPool) -> Self {
        Self {
            departments: DepartmentService::new(db.clone()),
            db,
        }
    }

    async fn profile(&self, user_id: Uuid) -> AppResult<Supervisor> {
        self.departments.supervisor_for_user(user_id).await
    }

    pub async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> AppResult<Vec<ProductionTask>> {
        let supervisor = self.profile(user_id).await?;
        let sql = format!(
            "SELECT {PRODUCTION_TASK_COLUMNS} FROM production_tasks \
             WHERE ($1::text IS NULL OR status = $1) AND {SCOPE} \
             ORDER BY planned_start_date NULLS LAST, created_at"
        );
        let tasks = sqlx::query_as::<_, ProductionTask>(&sql)
            .bind(filter.status)
            .bind(supervisor.department_id)
            .bind(&supervisor.supervisor_type)
            .fetch_all(&self.db)
            .await?;
        Ok(tasks)
    }

    pub async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<ProductionTask> {
        let supervisor = self.profile(user_id).await?;
        let mut conn = self.db.acquire().await?;
        scoped_task(&mut conn, &supervisor, task_id, false).await
    }

    pub async fn accept_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<ProductionTask> {
        self.transition(user_id, task_id, TaskStatus::Accepted, None).await
    }

    pub async fn reject_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        input: ReasonInput,
    ) -> AppResult<ProductionTask> {
        check_field("reason", shared::validate_non_empty(&input.reason))?;
        self.transition(user_id, task_id, TaskStatus::Rejected, Some(input.reason))
            .await
    }

    pub async fn pause_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        input: ReasonInput,
    ) -> AppResult<ProductionTask> {
        check_field("reason", shared::validate_non_empty(&input.reason))?;
        self.transition(user_id, task_id, TaskStatus::OnHold, Some(input.reason))
            .await
    }

    pub async fn resume_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<ProductionTask> {
        self.transition(user_id, task_id, TaskStatus::InProgress, None).await
    }

    pub async fn complete_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<ProductionTask> {
        self.transition(user_id, task_id, TaskStatus::Completed, None).await
    }

    /// Lock a scoped task, check the edge and stamp the timestamp that belongs to `next`.
    ///
    /// `reason` is stored as the rejection or on-hold reason.
    async fn transition(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        next: TaskStatus,
        reason: Option<String>,
    ) -> AppResult<ProductionTask> {
        let supervisor = self.profile(user_id).await?;
        let mut tx = self.db.begin().await?;
        let task = scoped_task(&mut tx, &supervisor, task_id, true).await?;
        let current: TaskStatus = lock_status(&mut tx, "production_tasks", task_id, "Production task").await?;
        ensure_transition(current, next)?;

        let updated = sqlx::query_as::<_, ProductionTask>(TRANSITION_SQL)
            .bind(task_id)
            .bind(next.as_str())
            .bind(supervisor.id)
            .bind(reason)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            paper = %task.production_paper_no,
            supervisor = %supervisor.username,
            from = %current,
            to = %next,
            "Production task status changed"
        );
        Ok(updated)
    }

    /// The first report moves an accepted task into progress
    pub async fn record_progress(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        input: ProgressInput,
    ) -> AppResult<ProductionTask> {
        let supervisor = self.profile(user_id).await?;
        let mut tx = self.db.begin().await?;
        let task = scoped_task(&mut tx, &supervisor, task_id, true).await?;
        let current: TaskStatus = shared::parse_status(&task.status)?;
        ensure_one_of(current, TaskStatus::WORKABLE)?;

        let balance = task_balance(task.quantity, input.quantity_completed)
            .map_err(|msg| AppError::validation("quantity_completed", msg))?;
        let starting = current == TaskStatus::Accepted;

        let sql = format!(
            r#"
            UPDATE production_tasks SET
                quantity_completed = $2, balance_quantity = $3,
                status = CASE WHEN $4 THEN $5 ELSE status END,
                start_time = CASE WHEN $4 THEN NOW() ELSE start_time END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCTION_TASK_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, ProductionTask>(&sql)
            .bind(task_id)
            .bind(input.quantity_completed)
            .bind(balance)
            .bind(starting)
            .bind(TaskStatus::InProgress.as_str())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO task_progress (task_id, quantity_completed, balance_quantity, remarks, recorded_by) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(task_id)
        .bind(input.quantity_completed)
        .bind(balance)
        .bind(input.remarks)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            paper = %task.production_paper_no,
            completed = input.quantity_completed,
            balance,
            "Task progress recorded"
        );
        Ok(updated)
    }

    pub async fn task_progress(&self, user_id: Uuid, task_id: Uuid) -> AppResult<Vec<TaskProgress>> {
        self.get_task(user_id, task_id).await?;
        let progress = sqlx::query_as::<_, TaskProgress>(
            "SELECT id, task_id, quantity_completed, balance_quantity, remarks, recorded_by, recorded_at \
             FROM task_progress WHERE task_id = $1 ORDER BY recorded_at",
        )
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;
        Ok(progress)
    }

    // ---- Issues ----

    pub async fn list_issues(&self, user_id: Uuid) -> AppResult<Vec<ProductionIssue>> {
        let supervisor = self.profile(user_id).await?;
        let issues = sqlx::query_as::<_, ProductionIssue>(
            "SELECT i.id, i.task_id, i.issue_type, i.severity, i.description, i.status, \
                    i.resolution_notes, i.resolved_at, i.reported_by, i.created_at, i.updated_at \
             FROM production_issues i \
             JOIN production_tasks t ON t.id = i.task_id \
             WHERE t.department_id = $1 AND (t.supervisor_type IS NULL OR t.supervisor_type = $2) \
             ORDER BY i.created_at DESC",
        )
        .bind(supervisor.department_id)
        .bind(&supervisor.supervisor_type)
        .fetch_all(&self.db)
        .await?;
        Ok(issues)
    }

    pub async fn report_issue(&self, user_id: Uuid, input: CreateIssueInput) -> AppResult<ProductionIssue> {
        check_field("issue_type", shared::validate_non_empty(&input.issue_type))?;
        check_field("description", shared::validate_non_empty(&input.description))?;
        let task = self.get_task(user_id, input.task_id).await?;

        let sql = format!(
            r#"
            INSERT INTO production_issues (task_id, issue_type, severity, description, status, reported_by)
            VALUES ($1, $2, COALESCE($3, 'Medium'), $4, $5, $6)
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, ProductionIssue>(&sql)
            .bind(task.id)
            .bind(input.issue_type.trim())
            .bind(input.severity)
            .bind(input.description.trim())
            .bind(IssueStatus::Open.as_str())
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;

        tracing::warn!(paper = %task.production_paper_no, issue_type = %issue.issue_type, "Production issue reported");
        Ok(issue)
    }

    pub async fn update_issue(&self, id: Uuid, input: UpdateIssueInput) -> AppResult<ProductionIssue> {
        let mut tx = self.db.begin().await?;
        let current: IssueStatus = lock_status(&mut tx, "production_issues", id, "Production issue").await?;
        ensure_transition(current, input.status)?;

        let sql = format!(
            r#"
            UPDATE production_issues SET
                status = $2,
                resolution_notes = COALESCE($3, resolution_notes),
                resolved_at = CASE WHEN $4 THEN NOW() ELSE resolved_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, ProductionIssue>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.resolution_notes)
            .bind(input.status == IssueStatus::Resolved)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(issue)
    }

    pub async fn dashboard(&self, user_id: Uuid) -> AppResult<SupervisorDashboard> {
        let supervisor = self.profile(user_id).await?;
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM production_tasks \
             WHERE department_id = $1 AND (supervisor_type IS NULL OR supervisor_type = $2) \
             GROUP BY status ORDER BY status",
        )
        .bind(supervisor.department_id)
        .bind(&supervisor.supervisor_type)
        .fetch_all(&self.db)
        .await?;

        let open_issues: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM production_issues i JOIN production_tasks t ON t.id = i.task_id \
             WHERE t.department_id = $1 AND i.status = ANY($2)",
        )
        .bind(supervisor.department_id)
        .bind(vec![
            IssueStatus::Open.as_str(),
            IssueStatus::Assigned.as_str(),
            IssueStatus::InProgress.as_str(),
        ])
        .fetch_one(&self.db)
        .await?;

        Ok(SupervisorDashboard {
            supervisor,
            tasks_by_status: rows
                .into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect(),
            open_issues,
        })
    }
}

/// Load a task inside the supervisor's scope, `NotFound` otherwise
async fn scoped_task(
    conn: &mut PgConnection,
    supervisor: &Supervisor,
    task_id: Uuid,
    for_update: bool,
) -> AppResult<ProductionTask> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {PRODUCTION_TASK_COLUMNS} FROM production_tasks WHERE id = $1 AND {SCOPE}{lock}");
    sqlx::query_as::<_, ProductionTask>(&sql)
        .bind(task_id)
        .bind(supervisor.department_id)
        .bind(&supervisor.supervisor_type)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Production task".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_sql_matches_stored_statuses() {
        for status in [
            TaskStatus::Accepted,
            TaskStatus::Rejected,
            TaskStatus::OnHold,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ] {
            assert!(TRANSITION_SQL.contains(&format!("'{}'", status.as_str())));
        }
    }

    #[test]
    fn test_progress_input_is_cumulative() {
        let input: ProgressInput = serde_json::from_str(r#"{"quantity_completed": 12}"#).unwrap();
        assert_eq!(task_balance(40, input.quantity_completed), Ok(28));
        assert!(input.remarks.is_none());
    }
}
