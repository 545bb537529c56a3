//! Session/History Log: append-only record of completed turns.
//!
//! Entries are written only after a generated query has passed validation and
//! executed. Normal operation never edits or removes an entry; the only
//! destructive operation is a whole-log truncation via [`clear_history`].

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Answer, HistoryEntry, QueryRequest};

/// Append one completed turn. Called by the mediator after a successful
/// execution; nothing else writes to this table.
pub async fn append_entry(
    pool: &SqlitePool,
    request: &QueryRequest,
    answer: &Answer,
) -> Result<HistoryEntry> {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        session_id: request.session_id.clone(),
        asked_at: request.asked_at.timestamp(),
        question: request.question.clone(),
        sql: answer.sql.clone(),
        row_count: answer.row_count as i64,
        duration_ms: answer.duration_ms as i64,
        answer: answer.text.clone(),
    };

    sqlx::query(
        r#"
        INSERT INTO query_history
            (id, session_id, asked_at, question, sql, row_count, duration_ms, answer)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.session_id)
    .bind(entry.asked_at)
    .bind(&entry.question)
    .bind(&entry.sql)
    .bind(entry.row_count)
    .bind(entry.duration_ms)
    .bind(&entry.answer)
    .execute(pool)
    .await?;

    Ok(entry)
}

/// List entries, newest first.
pub async fn list_entries(pool: &SqlitePool, limit: i64) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, asked_at, question, sql, row_count, duration_ms, answer
        FROM query_history
        ORDER BY asked_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| HistoryEntry {
            id: row.get("id"),
            session_id: row.get("session_id"),
            asked_at: row.get("asked_at"),
            question: row.get("question"),
            sql: row.get("sql"),
            row_count: row.get("row_count"),
            duration_ms: row.get("duration_ms"),
            answer: row.get("answer"),
        })
        .collect())
}

pub async fn count_entries(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_history")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Truncate the whole log. Selective deletion is deliberately unsupported.
pub async fn clear_history(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM query_history").execute(pool).await?;
    Ok(result.rows_affected())
}

/// CLI entry point: print recent history.
pub async fn run_history(config: &crate::config::Config, limit: i64) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let entries = list_entries(&pool, limit).await?;
    pool.close().await;

    if entries.is_empty() {
        println!("No history yet.");
        return Ok(());
    }

    for entry in &entries {
        let when = chrono::DateTime::from_timestamp(entry.asked_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.asked_at.to_string());
        println!("[{}] {}", when, entry.question);
        println!("    sql: {}", entry.sql);
        println!(
            "    rows: {}  duration: {}ms  session: {}",
            entry.row_count, entry.duration_ms, entry.session_id
        );
        println!();
    }

    Ok(())
}

/// CLI entry point: truncate the log.
pub async fn run_history_clear(config: &crate::config::Config) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let cleared = clear_history(&pool).await?;
    pool.close().await;
    println!("Cleared {} history entries.", cleared);
    Ok(())
}
