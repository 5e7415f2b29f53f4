//! Document number allocation
//!
//! The counter logic lives in `shared::numbering`. This module reads the
//! numbers already issued and serializes writers of the same table.

use shared::numbering::{next_document_number, DocumentSeries};
use sqlx::{PgConnection, PgPool};

use crate::error::AppResult;

async fn existing_numbers(
    conn: &mut PgConnection,
    table: &'static str,
    column: &'static str,
    prefix: &str,
) -> AppResult<Vec<String>> {
    let sql = format!("SELECT {column} FROM {table} WHERE {column} LIKE $1");
    let numbers = sqlx::query_scalar::<_, String>(&sql)
        .bind(format!("{}%", prefix))
        .fetch_all(conn)
        .await?;
    Ok(numbers)
}

/// Reserve the next number of `series` inside the caller's transaction.
///
/// Holds `pg_advisory_xact_lock` on the table until the transaction ends, so
/// two writers never read the same maximum.
pub async fn next_number(
    conn: &mut PgConnection,
    table: &'static str,
    column: &'static str,
    series: DocumentSeries,
) -> AppResult<String> {
    next_with_prefix(conn, table, column, series.prefix, series.width, series.wrap_at).await
}

/// Like [`next_number`] for series whose prefix is built at runtime
pub async fn next_with_prefix(
    conn: &mut PgConnection,
    table: &'static str,
    column: &'static str,
    prefix: &str,
    width: usize,
    wrap_at: Option<u64>,
) -> AppResult<String> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(table)
        .execute(&mut *conn)
        .await?;

    let existing = existing_numbers(conn, table, column, prefix).await?;
    Ok(next_document_number(
        prefix,
        width,
        wrap_at,
        existing.iter().map(String::as_str),
    ))
}

/// Number the next document would get, without reserving it
pub async fn preview_number(
    db: &PgPool,
    table: &'static str,
    column: &'static str,
    series: DocumentSeries,
) -> AppResult<String> {
    let mut conn = db.acquire().await?;
    let existing = existing_numbers(&mut conn, table, column, series.prefix).await?;
    Ok(series.next(existing.iter().map(String::as_str)))
}
