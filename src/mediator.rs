//! Query Mediator: the single authority allowed to turn natural language into
//! a database query and execute it.
//!
//! The pipeline is prompt → model → [`crate::validate`] gate → bounded
//! execution → [`crate::format`] → history append. Safety policy is enforced
//! here and nowhere else; front ends only ever see the
//! [`Answer`](crate::models::Answer) or a [`MediatorError`].
//!
//! Each accepted request performs exactly one database read. The mediator
//! never writes to the surveyed tables; its only write is the history append
//! after a successful turn.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::format;
use crate::history;
use crate::model::{self, SqlGenerator};
use crate::models::{Answer, QueryRequest, QueryResult};
use crate::validate::{self, ValidatedQuery};

/// Terminal outcome classes for one request. None of these end the session.
///
/// The `Display` text is the plain-language message shown to users. Raw
/// model-service and database error text stays in the internal detail and is
/// only ever logged, never displayed.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// The remote model call failed or timed out. Transient; front ends may
    /// retry with backoff.
    #[error("The language model service is unavailable right now. Please try again shortly.")]
    ModelUnavailable { detail: String },

    /// The validation gate rejected the generated query. Permanent for this
    /// exact question text; the reason invites rephrasing.
    #[error("The generated query was rejected: {reason}. Try rephrasing the question.")]
    PolicyViolation { reason: String, sql: String },

    /// The database raised an error despite the query passing validation,
    /// or the execution timed out. Worth investigating for schema drift.
    #[error("The query could not be executed against the database.")]
    ExecutionError { detail: String },
}

impl MediatorError {
    /// Machine-readable reason code, also used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            MediatorError::ModelUnavailable { .. } => "model_unavailable",
            MediatorError::PolicyViolation { .. } => "policy_violation",
            MediatorError::ExecutionError { .. } => "execution_error",
        }
    }

    /// Internal detail for logs. Never shown to end users.
    pub fn detail(&self) -> &str {
        match self {
            MediatorError::ModelUnavailable { detail } => detail,
            MediatorError::PolicyViolation { sql, .. } => sql,
            MediatorError::ExecutionError { detail } => detail,
        }
    }
}

/// Answer a natural-language question end to end.
pub async fn answer_question(
    pool: &SqlitePool,
    catalog: &Catalog,
    generator: &dyn SqlGenerator,
    config: &Config,
    request: &QueryRequest,
) -> Result<Answer, MediatorError> {
    let schema_context = catalog.to_prompt();
    let model_timeout = Duration::from_secs(config.model.timeout_secs);

    let raw = match tokio::time::timeout(
        model_timeout,
        generator.generate_sql(&request.question, &schema_context),
    )
    .await
    {
        Err(_) => {
            return Err(MediatorError::ModelUnavailable {
                detail: format!(
                    "model call exceeded the {}s timeout",
                    config.model.timeout_secs
                ),
            })
        }
        Ok(Err(e)) => {
            return Err(MediatorError::ModelUnavailable {
                detail: e.to_string(),
            })
        }
        Ok(Ok(text)) => text,
    };

    let candidate = model::extract_sql(&raw);
    answer_with_sql(pool, catalog, config, request, &candidate).await
}

/// Validate, execute, format, and record one candidate SQL text.
///
/// This is the model-free half of [`answer_question`]; the `gpr sql` command
/// enters here directly with caller-provided SQL, which gets exactly the
/// same gate as model output.
pub async fn answer_with_sql(
    pool: &SqlitePool,
    catalog: &Catalog,
    config: &Config,
    request: &QueryRequest,
    candidate: &str,
) -> Result<Answer, MediatorError> {
    let validated = validate::validate(candidate, catalog, config.query.row_limit).map_err(
        |reason| MediatorError::PolicyViolation {
            reason,
            sql: candidate.to_string(),
        },
    )?;

    let result = execute_validated(pool, config, &validated).await?;

    let formatted = format::format_answer(&request.question, &result).map_err(|e| {
        MediatorError::ExecutionError {
            detail: e.to_string(),
        }
    })?;

    let answer = Answer {
        text: formatted.text,
        sql: validated.sql,
        table: formatted.table,
        row_count: result.row_count(),
        duration_ms: result.duration_ms,
    };

    history::append_entry(pool, request, &answer)
        .await
        .map_err(|e| MediatorError::ExecutionError {
            detail: format!("history append failed: {}", e),
        })?;

    Ok(answer)
}

/// Execute a validated query with a bounded timeout and capture rows/timing.
async fn execute_validated(
    pool: &SqlitePool,
    config: &Config,
    validated: &ValidatedQuery,
) -> Result<QueryResult, MediatorError> {
    let db_timeout = Duration::from_secs(config.db.query_timeout_secs);
    let started = Instant::now();

    let rows = match tokio::time::timeout(db_timeout, sqlx::query(&validated.sql).fetch_all(pool))
        .await
    {
        Err(_) => {
            return Err(MediatorError::ExecutionError {
                detail: format!(
                    "query exceeded the {}s execution timeout",
                    config.db.query_timeout_secs
                ),
            })
        }
        Ok(Err(e)) => {
            return Err(MediatorError::ExecutionError {
                detail: e.to_string(),
            })
        }
        Ok(Ok(rows)) => rows,
    };

    let duration_ms = started.elapsed().as_millis() as u64;

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        values.push(row_values(row).map_err(|e| MediatorError::ExecutionError {
            detail: e.to_string(),
        })?);
    }

    Ok(QueryResult {
        columns,
        rows: values,
        duration_ms,
    })
}

/// Decode one SQLite row into ordered JSON values by storage class.
fn row_values(row: &SqliteRow) -> Result<Vec<serde_json::Value>, sqlx::Error> {
    let mut out = Vec::with_capacity(row.columns().len());

    for i in 0..row.columns().len() {
        let (is_null, type_name) = {
            let raw = row.try_get_raw(i)?;
            (raw.is_null(), raw.type_info().name().to_uppercase())
        };

        let value = if is_null {
            serde_json::Value::Null
        } else if type_name.contains("INT") {
            row.try_get::<i64, _>(i)
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null)
        } else if type_name.contains("REAL")
            || type_name.contains("FLOA")
            || type_name.contains("DOUB")
        {
            row.try_get::<f64, _>(i)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)
        } else if type_name.contains("BOOL") {
            row.try_get::<bool, _>(i)
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null)
        } else if type_name.contains("BLOB") {
            row.try_get::<Vec<u8>, _>(i)
                .map(|b| serde_json::Value::String(format!("(blob, {} bytes)", b.len())))
                .unwrap_or(serde_json::Value::Null)
        } else {
            // TEXT plus date-ish declared types; fall back through the
            // storage classes rather than trusting the declaration.
            if let Ok(s) = row.try_get::<String, _>(i) {
                serde_json::Value::String(s)
            } else if let Ok(f) = row.try_get::<f64, _>(i) {
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            } else if let Ok(n) = row.try_get::<i64, _>(i) {
                serde_json::Value::from(n)
            } else {
                serde_json::Value::Null
            }
        };

        out.push(value);
    }

    Ok(out)
}

// ============ CLI entry points ============

/// `gpr ask` — one-shot natural-language question.
pub async fn run_ask(
    config: &Config,
    question: &str,
    session: Option<String>,
    show_sql: bool,
) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let catalog = Catalog::load(&pool).await?;
    if catalog.is_empty() {
        pool.close().await;
        anyhow::bail!("No tables found. Run `gpr init --seed` first.");
    }

    let generator = model::create_generator(&config.model)?;
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = QueryRequest::new(question, session_id);

    match answer_question(&pool, &catalog, generator.as_ref(), config, &request).await {
        Ok(answer) => {
            if show_sql {
                println!("sql: {}", answer.sql);
                println!();
            }
            println!("{}", answer.text);
            pool.close().await;
            Ok(())
        }
        Err(e) => {
            eprintln!("[{}] {}", e.code(), e);
            eprintln!("    detail: {}", e.detail());
            pool.close().await;
            std::process::exit(1);
        }
    }
}

/// `gpr sql` — run caller-provided SQL through the same gate and formatter.
pub async fn run_sql(config: &Config, sql: &str, session: Option<String>) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let catalog = Catalog::load(&pool).await?;
    if catalog.is_empty() {
        pool.close().await;
        anyhow::bail!("No tables found. Run `gpr init --seed` first.");
    }

    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = QueryRequest::new(sql, session_id);

    match answer_with_sql(&pool, &catalog, config, &request, sql).await {
        Ok(answer) => {
            println!("sql: {}", answer.sql);
            println!();
            println!("{}", answer.text);
            pool.close().await;
            Ok(())
        }
        Err(e) => {
            eprintln!("[{}] {}", e.code(), e);
            eprintln!("    detail: {}", e.detail());
            pool.close().await;
            std::process::exit(1);
        }
    }
}
