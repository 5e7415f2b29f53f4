//! Departments and the production supervisors assigned to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::Role;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct DepartmentService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Supervisor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub supervisor_type: String,
    pub shift: Option<String>,
    pub is_active: bool,
    pub backup_supervisor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupervisorInput {
    pub user_id: Uuid,
    pub department_id: Uuid,
    pub supervisor_type: String,
    pub shift: Option<String>,
    pub backup_supervisor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupervisorInput {
    pub department_id: Option<Uuid>,
    pub supervisor_type: Option<String>,
    pub shift: Option<String>,
    pub is_active: Option<bool>,
    pub backup_supervisor_id: Option<Uuid>,
}

const SUPERVISOR_SELECT: &str = r#"
    SELECT s.id, s.user_id, u.username, s.department_id, d.name AS department_name,
           s.supervisor_type, s.shift, s.is_active, s.backup_supervisor_id,
           s.created_at, s.updated_at
    FROM production_supervisors s
    JOIN users u ON u.id = s.user_id
    JOIN departments d ON d.id = s.department_id
"#;

impl DepartmentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_departments(&self) -> AppResult<Vec<Department>> {
        let departments = sqlx::query_as::<_, Department>(
            "SELECT id, name, code, description, is_active, created_at, updated_at \
             FROM departments ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(departments)
    }

    pub async fn get_department(&self, id: Uuid) -> AppResult<Department> {
        sqlx::query_as::<_, Department>(
            "SELECT id, name, code, description, is_active, created_at, updated_at \
             FROM departments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Department".to_string()))
    }

    pub async fn create_department(&self, input: DepartmentInput) -> AppResult<Department> {
        crate::error::check_field("name", shared::validate_non_empty(&input.name))?;

        let department = sqlx::query_as::<_, Department>(
            r#"
            INSERT INTO departments (name, code, description, is_active)
            VALUES ($1, $2, $3, COALESCE($4, TRUE))
            RETURNING id, name, code, description, is_active, created_at, updated_at
            "#,
        )
        .bind(input.name.trim())
        .bind(input.code)
        .bind(input.description)
        .bind(input.is_active)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(department = %department.name, "Department created");
        Ok(department)
    }

    pub async fn update_department(&self, id: Uuid, input: DepartmentInput) -> AppResult<Department> {
        sqlx::query_as::<_, Department>(
            r#"
            UPDATE departments
            SET name = $2, code = COALESCE($3, code), description = COALESCE($4, description),
                is_active = COALESCE($5, is_active), updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, code, description, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.code)
        .bind(input.description)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Department".to_string()))
    }

    /// Refused while active supervisors still belong to the department
    pub async fn delete_department(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM departments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound("Department".to_string()));
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM production_supervisors WHERE department_id = $1 AND is_active",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            tracing::warn!(department_id = %id, active, "Department delete refused");
            return Err(AppError::BusinessRule(format!(
                "Cannot delete department with {} active supervisor(s)",
                active
            )));
        }

        sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_supervisors(&self, department_id: Option<Uuid>) -> AppResult<Vec<Supervisor>> {
        let sql = format!(
            "{SUPERVISOR_SELECT} WHERE ($1::uuid IS NULL OR s.department_id = $1) ORDER BY u.username"
        );
        let supervisors = sqlx::query_as::<_, Supervisor>(&sql)
            .bind(department_id)
            .fetch_all(&self.db)
            .await?;
        Ok(supervisors)
    }

    pub async fn get_supervisor(&self, id: Uuid) -> AppResult<Supervisor> {
        let sql = format!("{SUPERVISOR_SELECT} WHERE s.id = $1");
        sqlx::query_as::<_, Supervisor>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Production supervisor".to_string()))
    }

    /// Supervisor profile of a logged-in user
    pub async fn supervisor_for_user(&self, user_id: Uuid) -> AppResult<Supervisor> {
        let sql = format!("{SUPERVISOR_SELECT} WHERE s.user_id = $1");
        sqlx::query_as::<_, Supervisor>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Supervisor profile".to_string()))
    }

    pub async fn create_supervisor(&self, input: CreateSupervisorInput) -> AppResult<Supervisor> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(input.user_id)
            .fetch_optional(&self.db)
            .await?;
        match role.as_deref() {
            Some(r) if r == Role::ProductionSupervisor.as_str() => {}
            Some(_) => {
                return Err(AppError::BusinessRule(
                    "User must have the production_supervisor role".to_string(),
                ))
            }
            None => return Err(AppError::BusinessRule("User does not exist".to_string())),
        }
        self.get_department(input.department_id).await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO production_supervisors
                (user_id, department_id, supervisor_type, shift, backup_supervisor_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(input.user_id)
        .bind(input.department_id)
        .bind(&input.supervisor_type)
        .bind(input.shift)
        .bind(input.backup_supervisor_id)
        .fetch_one(&self.db)
        .await?;

        self.get_supervisor(id).await
    }

    pub async fn update_supervisor(&self, id: Uuid, input: UpdateSupervisorInput) -> AppResult<Supervisor> {
        if let Some(department_id) = input.department_id {
            self.get_department(department_id).await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE production_supervisors
            SET department_id = COALESCE($2, department_id),
                supervisor_type = COALESCE($3, supervisor_type),
                shift = COALESCE($4, shift),
                is_active = COALESCE($5, is_active),
                backup_supervisor_id = COALESCE($6, backup_supervisor_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.department_id)
        .bind(input.supervisor_type)
        .bind(input.shift)
        .bind(input.is_active)
        .bind(input.backup_supervisor_id)
        .execute(&self.db)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Production supervisor".to_string()));
        }

        self.get_supervisor(id).await
    }

    pub async fn delete_supervisor(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM production_supervisors WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Production supervisor".to_string()));
        }
        Ok(())
    }
}
