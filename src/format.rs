//! Response Formatter: turns an executed query's rows into a user-facing
//! answer and a chart-ready payload.
//!
//! Pure transformation: it never re-invokes the database or the model.

use anyhow::{bail, Result};

use crate::models::{QueryResult, TablePayload};

/// How many rows appear verbatim in the answer text before it switches to a
/// preview plus a row count.
const TEXT_PREVIEW_ROWS: usize = 20;

#[derive(Debug, Clone)]
pub struct FormattedAnswer {
    pub text: String,
    pub table: Option<TablePayload>,
}

/// Format one query result for the question that produced it.
///
/// Zero rows always produce an explicit no-match message rather than an
/// empty string. A row whose width differs from the declared column set is
/// malformed input and an error.
pub fn format_answer(question: &str, result: &QueryResult) -> Result<FormattedAnswer> {
    for (i, row) in result.rows.iter().enumerate() {
        if row.len() != result.columns.len() {
            bail!(
                "malformed result: row {} has {} values but {} columns were declared",
                i,
                row.len(),
                result.columns.len()
            );
        }
    }

    if result.rows.is_empty() {
        return Ok(FormattedAnswer {
            text: format!("No matching records found for \"{}\".", question.trim()),
            table: None,
        });
    }

    let mut text = String::new();

    if result.rows.len() == 1 && result.columns.len() == 1 {
        // Scalar answer (counts, averages): one direct sentence.
        text.push_str(&format!(
            "{} = {}",
            result.columns[0],
            render_value(&result.rows[0][0])
        ));
    } else {
        text.push_str(&format!(
            "{} row{} matched.\n",
            result.rows.len(),
            if result.rows.len() == 1 { "" } else { "s" }
        ));
        for row in result.rows.iter().take(TEXT_PREVIEW_ROWS) {
            let rendered: Vec<String> = result
                .columns
                .iter()
                .zip(row.iter())
                .map(|(col, val)| format!("{}={}", col, render_value(val)))
                .collect();
            text.push_str(&format!("  {}\n", rendered.join("  ")));
        }
        if result.rows.len() > TEXT_PREVIEW_ROWS {
            text.push_str(&format!(
                "  ... ({} more rows)\n",
                result.rows.len() - TEXT_PREVIEW_ROWS
            ));
        }
    }

    Ok(FormattedAnswer {
        text: text.trim_end().to_string(),
        table: Some(TablePayload {
            columns: result.columns.clone(),
            rows: result.rows.clone(),
        }),
    })
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            duration_ms: 1,
        }
    }

    #[test]
    fn empty_result_gets_explicit_message() {
        let r = result(&["defect_id"], vec![]);
        let a = format_answer("show defects in ZZZ-nonexistent-street", &r).unwrap();
        assert!(a.text.contains("No matching records"), "got: {}", a.text);
        assert!(a.table.is_none());
    }

    #[test]
    fn scalar_result_is_one_sentence() {
        let r = result(&["total"], vec![vec![json!(12)]]);
        let a = format_answer("how many defects?", &r).unwrap();
        assert_eq!(a.text, "total = 12");
        let table = a.table.unwrap();
        assert_eq!(table.columns, vec!["total"]);
    }

    #[test]
    fn multi_row_text_includes_values() {
        let r = result(
            &["defect_type", "average_cost"],
            vec![
                vec![json!("cavity"), json!(1250.5)],
                vec![json!("crack"), json!(500.0)],
            ],
        );
        let a = format_answer("average repair cost by defect type", &r).unwrap();
        assert!(a.text.contains("cavity"), "got: {}", a.text);
        assert!(a.text.contains("1250.5"), "got: {}", a.text);
        assert!(a.text.contains("500"), "got: {}", a.text);
        let table = a.table.unwrap();
        assert_eq!(table.columns, vec!["defect_type", "average_cost"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn long_results_are_previewed() {
        let rows: Vec<Vec<serde_json::Value>> =
            (0..50).map(|i| vec![json!(i)]).collect();
        let r = result(&["defect_id"], rows);
        let a = format_answer("list everything", &r).unwrap();
        assert!(a.text.starts_with("50 rows matched."));
        assert!(a.text.contains("more rows"), "got: {}", a.text);
    }

    #[test]
    fn null_values_render_as_null() {
        let r = result(
            &["location", "road_section"],
            vec![vec![json!("Gangnam-daero"), serde_json::Value::Null]],
        );
        let a = format_answer("where?", &r).unwrap();
        assert!(a.text.contains("road_section=NULL"), "got: {}", a.text);
    }

    #[test]
    fn malformed_row_width_is_an_error() {
        let r = result(&["a", "b"], vec![vec![json!(1)]]);
        assert!(format_answer("q", &r).is_err());
    }
}
