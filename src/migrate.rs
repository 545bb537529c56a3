use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_tables(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the GPR defect schema plus the agent's own history table.
///
/// Idempotent; safe to run on every `gpr init`.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    // GPR scan passes over a road section
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            scan_id INTEGER PRIMARY KEY AUTOINCREMENT,
            location TEXT NOT NULL,
            road_section TEXT,
            scan_date DATE,
            file_path TEXT,
            total_length_m REAL,
            scan_quality TEXT CHECK(scan_quality IN ('excellent', 'good', 'fair', 'poor'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Subsurface defects detected within a scan
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS defects (
            defect_id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id INTEGER,
            defect_type TEXT CHECK(defect_type IN ('cavity', 'crack', 'pipe', 'manhole', 'delamination')),
            depth_cm REAL,
            severity TEXT CHECK(severity IN ('low', 'medium', 'high', 'critical')),
            bbox_x INTEGER,
            bbox_y INTEGER,
            bbox_width INTEGER,
            bbox_height INTEGER,
            confidence REAL,
            FOREIGN KEY (scan_id) REFERENCES scans(scan_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            measurement_id INTEGER PRIMARY KEY AUTOINCREMENT,
            defect_id INTEGER,
            measurement_type TEXT CHECK(measurement_type IN ('length', 'width', 'area', 'volume')),
            value_cm REAL,
            calculation_method TEXT,
            measured_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (defect_id) REFERENCES defects(defect_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repair_history (
            repair_id INTEGER PRIMARY KEY AUTOINCREMENT,
            defect_id INTEGER,
            repair_date DATE,
            repair_type TEXT,
            cost_usd REAL,
            contractor TEXT,
            status TEXT CHECK(status IN ('planned', 'in_progress', 'completed', 'verified')),
            FOREIGN KEY (defect_id) REFERENCES defects(defect_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only question/query/answer log. Not part of the queryable
    // catalog; the mediator never lets generated SQL touch it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_history (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            asked_at INTEGER NOT NULL,
            question TEXT NOT NULL,
            sql TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            answer TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_defects_scan_id ON defects(scan_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_defects_severity ON defects(severity)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repairs_defect_id ON repair_history(defect_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_asked_at ON query_history(asked_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
