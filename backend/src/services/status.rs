//! Row-level helpers: locked status reads and deletes

use shared::{parse_status, UnknownVariant, Workflow};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Read the `status` column of a row `FOR UPDATE` and parse it
pub async fn lock_status<W>(
    conn: &mut PgConnection,
    table: &'static str,
    id: Uuid,
    entity: &str,
) -> AppResult<W>
where
    W: Workflow + std::str::FromStr<Err = UnknownVariant>,
{
    lock_column_status(conn, table, "status", id, entity).await
}

/// Read a named status column `FOR UPDATE` and parse it
pub async fn lock_column_status<W>(
    conn: &mut PgConnection,
    table: &'static str,
    column: &'static str,
    id: Uuid,
    entity: &str,
) -> AppResult<W>
where
    W: Workflow + std::str::FromStr<Err = UnknownVariant>,
{
    let sql = format!("SELECT {column} FROM {table} WHERE id = $1 FOR UPDATE");
    let raw = sqlx::query_scalar::<_, String>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(entity.to_string()))?;
    Ok(parse_status::<W>(&raw)?)
}

/// Delete a row by id, `NotFound` when nothing was deleted
pub async fn delete_row(db: &PgPool, table: &'static str, id: Uuid, entity: &str) -> AppResult<()> {
    let sql = format!("DELETE FROM {table} WHERE id = $1");
    let result = sqlx::query(&sql).bind(id).execute(db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(entity.to_string()));
    }
    Ok(())
}
