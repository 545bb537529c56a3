//! Dashboard summary statistics over the survey tables.
//!
//! These are fixed, hand-written aggregates (not mediated queries): the
//! dashboard landing view and `gpr stats` need the same handful of counts
//! regardless of what anyone asks the agent.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;

/// Headline counts plus two breakdown tables.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_scans: i64,
    pub total_defects: i64,
    pub critical_defects: i64,
    pub pending_repairs: i64,
    pub by_type: Vec<TypeBreakdown>,
    pub by_location: Vec<LocationBreakdown>,
}

/// Defect counts per (type, severity) pair, densest first.
#[derive(Debug, Clone, Serialize)]
pub struct TypeBreakdown {
    pub defect_type: String,
    pub severity: String,
    pub count: i64,
}

/// Per-road rollup of defect density and depth.
#[derive(Debug, Clone, Serialize)]
pub struct LocationBreakdown {
    pub location: String,
    pub defect_count: i64,
    pub avg_depth_cm: Option<f64>,
    pub critical_count: i64,
}

pub async fn load_stats(pool: &SqlitePool) -> Result<DashboardStats> {
    let total_scans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scans")
        .fetch_one(pool)
        .await?;
    let total_defects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM defects")
        .fetch_one(pool)
        .await?;
    let critical_defects: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM defects WHERE severity = 'critical'")
            .fetch_one(pool)
            .await?;
    let pending_repairs: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM repair_history WHERE status IN ('planned', 'in_progress')",
    )
    .fetch_one(pool)
    .await?;

    let by_type = sqlx::query(
        "SELECT defect_type, severity, COUNT(*) AS cnt \
         FROM defects GROUP BY defect_type, severity \
         ORDER BY cnt DESC, defect_type, severity",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| {
        Ok(TypeBreakdown {
            defect_type: row.try_get("defect_type")?,
            severity: row.try_get("severity")?,
            count: row.try_get("cnt")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let by_location = sqlx::query(
        "SELECT s.location, COUNT(d.defect_id) AS defect_count, \
                AVG(d.depth_cm) AS avg_depth_cm, \
                COALESCE(SUM(CASE WHEN d.severity = 'critical' THEN 1 ELSE 0 END), 0) AS critical_count \
         FROM scans s LEFT JOIN defects d ON d.scan_id = s.scan_id \
         GROUP BY s.location \
         ORDER BY defect_count DESC, s.location",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| {
        Ok(LocationBreakdown {
            location: row.try_get("location")?,
            defect_count: row.try_get("defect_count")?,
            avg_depth_cm: row.try_get("avg_depth_cm")?,
            critical_count: row.try_get("critical_count")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(DashboardStats {
        total_scans,
        total_defects,
        critical_defects,
        pending_repairs,
        by_type,
        by_location,
    })
}

/// `gpr stats` — print the dashboard numbers to the terminal.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let stats = load_stats(&pool).await?;

    println!("GPR survey overview");
    println!("  scans:            {}", stats.total_scans);
    println!("  defects:          {}", stats.total_defects);
    println!("  critical defects: {}", stats.critical_defects);
    println!("  pending repairs:  {}", stats.pending_repairs);

    if !stats.by_type.is_empty() {
        println!();
        println!("Defects by type and severity:");
        for b in &stats.by_type {
            println!("  {:<12} {:<10} {}", b.defect_type, b.severity, b.count);
        }
    }

    if !stats.by_location.is_empty() {
        println!();
        println!("Defects by location:");
        for b in &stats.by_location {
            let depth = b
                .avg_depth_cm
                .map(|d| format!("{:.1}cm", d))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<16} {:>3} defects  avg depth {}  critical {}",
                b.location, b.defect_count, depth, b.critical_count
            );
        }
    }

    pool.close().await;
    Ok(())
}
