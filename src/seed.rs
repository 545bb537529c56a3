//! Deterministic sample data for demos and tests.
//!
//! The fixture mirrors a small road-survey campaign: five scans, a dozen
//! defects across every defect type and severity, a handful of measurements,
//! and a repair ledger. Values are fixed (no randomness) so answer text and
//! aggregates are assertable: the average repair cost is exactly 1250.5 for
//! cavities and 500.0 for cracks.

use anyhow::Result;
use sqlx::SqlitePool;

/// Counts of rows written by [`load_sample_data`].
pub struct SeedReport {
    pub scans: usize,
    pub defects: usize,
    pub measurements: usize,
    pub repairs: usize,
}

pub async fn load_sample_data(pool: &SqlitePool) -> Result<SeedReport> {
    let scans: Vec<(i64, &str, &str, &str, f64, &str)> = vec![
        (1, "Gangnam-daero", "A-12", "2025-03-02", 250.0, "good"),
        (2, "Teheran-ro", "B-03", "2025-03-05", 180.0, "excellent"),
        (3, "Olympic-daero", "C-21", "2025-04-11", 320.0, "fair"),
        (4, "Sejong-daero", "D-07", "2025-04-19", 210.0, "good"),
        (5, "Banpo-daero", "E-02", "2025-05-08", 150.0, "poor"),
    ];

    for (id, location, section, date, length, quality) in &scans {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scans
                (scan_id, location, road_section, scan_date, file_path, total_length_m, scan_quality)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(location)
        .bind(section)
        .bind(date)
        .bind(format!("scans/{}_{}.gpr", date, section))
        .bind(length)
        .bind(quality)
        .execute(pool)
        .await?;
    }

    let defects: Vec<(i64, i64, &str, f64, &str, f64)> = vec![
        (1, 1, "cavity", 42.0, "critical", 0.95),
        (2, 1, "crack", 12.5, "medium", 0.88),
        (3, 1, "manhole", 30.0, "low", 0.99),
        (4, 2, "cavity", 38.5, "high", 0.91),
        (5, 2, "pipe", 55.0, "low", 0.86),
        (6, 3, "cavity", 47.0, "critical", 0.93),
        (7, 3, "delamination", 8.0, "medium", 0.77),
        (8, 3, "crack", 10.0, "high", 0.84),
        (9, 4, "crack", 15.5, "low", 0.81),
        (10, 4, "cavity", 33.0, "medium", 0.89),
        (11, 5, "delamination", 6.5, "critical", 0.72),
        (12, 5, "manhole", 28.0, "low", 0.97),
    ];

    for (id, scan_id, dtype, depth, severity, confidence) in &defects {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO defects
                (defect_id, scan_id, defect_type, depth_cm, severity,
                 bbox_x, bbox_y, bbox_width, bbox_height, confidence)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(scan_id)
        .bind(dtype)
        .bind(depth)
        .bind(severity)
        .bind(id * 40)
        .bind(id * 25)
        .bind(64)
        .bind(48)
        .bind(confidence)
        .execute(pool)
        .await?;
    }

    let measurements: Vec<(i64, i64, &str, f64, &str)> = vec![
        (1, 1, "length", 120.0, "manual"),
        (2, 1, "area", 900.0, "bbox-estimate"),
        (3, 6, "volume", 1500.0, "model"),
    ];

    for (id, defect_id, mtype, value, method) in &measurements {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO measurements
                (measurement_id, defect_id, measurement_type, value_cm, calculation_method)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(defect_id)
        .bind(mtype)
        .bind(value)
        .bind(method)
        .execute(pool)
        .await?;
    }

    // Cavity repairs average to 1250.5, crack repairs to 500.0.
    let repairs: Vec<(i64, i64, &str, &str, f64, &str, &str)> = vec![
        (1, 1, "2025-03-20", "grout-injection", 1200.0, "Hanil E&C", "planned"),
        (2, 4, "2025-03-28", "grout-injection", 1301.0, "Hanil E&C", "in_progress"),
        (3, 6, "2025-05-02", "excavate-and-fill", 1250.5, "Daelim Road", "completed"),
        (4, 2, "2025-04-01", "crack-sealing", 450.25, "Seoul Paving", "completed"),
        (5, 8, "2025-05-10", "crack-sealing", 549.75, "Seoul Paving", "verified"),
        (6, 11, "2025-06-01", "resurfacing", 800.0, "Daelim Road", "planned"),
    ];

    for (id, defect_id, date, rtype, cost, contractor, status) in &repairs {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO repair_history
                (repair_id, defect_id, repair_date, repair_type, cost_usd, contractor, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(defect_id)
        .bind(date)
        .bind(rtype)
        .bind(cost)
        .bind(contractor)
        .bind(status)
        .execute(pool)
        .await?;
    }

    Ok(SeedReport {
        scans: scans.len(),
        defects: defects.len(),
        measurements: measurements.len(),
        repairs: repairs.len(),
    })
}
