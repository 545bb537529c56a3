//! Core data models used throughout GPR Agent.
//!
//! These types represent the questions, generated queries, and result sets
//! that flow through the mediation pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One user turn: a natural-language question plus session bookkeeping.
///
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: String,
    pub asked_at: DateTime<Utc>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            asked_at: Utc::now(),
        }
    }
}

/// An executed query's result set.
///
/// Rows are kept as ordered `serde_json::Value` cells rather than a driver
/// cursor type so the formatter and chart payload stay storage-agnostic.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub duration_ms: u64,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Chart-ready tabular payload handed to front ends alongside the answer text.
#[derive(Debug, Clone, Serialize)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// The mediator's full response for one accepted request.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Natural-language answer text.
    pub text: String,
    /// The validated SQL that was actually executed.
    pub sql: String,
    /// Tabular payload for charting, absent when no rows matched.
    pub table: Option<TablePayload>,
    pub row_count: usize,
    pub duration_ms: u64,
}

/// One append-only record of a completed question/query/answer turn.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub session_id: String,
    /// Unix timestamp (seconds).
    pub asked_at: i64,
    pub question: String,
    pub sql: String,
    pub row_count: i64,
    pub duration_ms: i64,
    pub answer: String,
}

/// Structural metadata for one database table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Case-insensitive column lookup (SQLite identifier semantics).
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub decl_type: String,
    pub nullable: bool,
}

/// A foreign-key hint: `column` references `references_table(references_column)`.
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}
