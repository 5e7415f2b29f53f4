//! User administration and per-user serial numbers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{numbering::next_serial_number, Pagination, PaginatedResponse, Role};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{check_field, AppError, AppResult};

#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

/// User as returned by the API; never carries the password hash
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub serial_number_prefix: Option<String>,
    pub serial_number_counter: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 3, max = 100))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub role: Role,
    #[validate(length(min = 1, max = 10))]
    pub serial_number_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    #[validate(length(min = 1, max = 10))]
    pub serial_number_prefix: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Serial number handed out for one measurement sheet row
#[derive(Debug, Serialize)]
pub struct SerialNumber {
    pub serial_number: String,
    pub counter: i32,
}

const USER_COLUMNS: &str = "id, username, email, role, is_active, serial_number_prefix, \
     serial_number_counter, last_login_at, created_at, updated_at";

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_users(
        &self,
        filter: UserFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<UserProfile>> {
        let role = filter.role.map(|r| r.as_str());
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR role = $1) AND ($2::bool IS NULL OR is_active = $2) \
             ORDER BY username LIMIT $3 OFFSET $4"
        );
        let users = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(role)
            .bind(filter.is_active)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE ($1::text IS NULL OR role = $1) AND ($2::bool IS NULL OR is_active = $2)",
        )
        .bind(role)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(users, pagination, total as u64))
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserProfile>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub async fn create_user(&self, input: CreateUserInput) -> AppResult<UserProfile> {
        input.validate()?;
        check_field("password", shared::validate_password(&input.password))?;
        let password_hash = hash_password(&input.password)?;

        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, serial_number_prefix) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(input.username.trim())
            .bind(input.email.trim().to_lowercase())
            .bind(password_hash)
            .bind(input.role.as_str())
            .bind(input.serial_number_prefix)
            .fetch_one(&self.db)
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User created by admin");
        Ok(user)
    }

    pub async fn update_user(&self, user_id: Uuid, input: UpdateUserInput) -> AppResult<UserProfile> {
        input.validate()?;
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                check_field("password", shared::validate_password(password))?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let sql = format!(
            "UPDATE users SET \
                email = COALESCE($2, email), \
                role = COALESCE($3, role), \
                is_active = COALESCE($4, is_active), \
                serial_number_prefix = COALESCE($5, serial_number_prefix), \
                password_hash = COALESCE($6, password_hash), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserProfile>(&sql)
            .bind(user_id)
            .bind(input.email.map(|e| e.trim().to_lowercase()))
            .bind(input.role.map(|r| r.as_str()))
            .bind(input.is_active)
            .bind(input.serial_number_prefix)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub async fn delete_user(&self, acting_user: Uuid, user_id: Uuid) -> AppResult<()> {
        if acting_user == user_id {
            return Err(AppError::BusinessRule(
                "You cannot delete your own account".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        tracing::info!(%user_id, "User deleted");
        Ok(())
    }

    /// Advance the caller's serial counter and return the new serial number
    pub async fn next_serial_number(&self, user_id: Uuid) -> AppResult<SerialNumber> {
        let mut tx = self.db.begin().await?;

        let (prefix, counter) = sqlx::query_as::<_, (Option<String>, i32)>(
            "SELECT serial_number_prefix, serial_number_counter FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let (serial_number, next) = next_serial_number(prefix.as_deref(), counter.max(0) as u64)
            .ok_or_else(|| {
                AppError::BusinessRule(
                    "No serial number prefix is assigned to this user".to_string(),
                )
            })?;
        let counter = next as i32;

        sqlx::query("UPDATE users SET serial_number_counter = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(counter)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SerialNumber {
            serial_number,
            counter,
        })
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}
