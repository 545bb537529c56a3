//! The validation gate: a pure function from (SQL text, schema) to a verdict.
//!
//! Every candidate query produced by the language model passes through here
//! before it can touch the database. The gate is deterministic, schema-driven,
//! and does no I/O, so it can be unit-tested exhaustively. It enforces:
//!
//! 1. exactly one statement (a `;`-separated second statement is rejected),
//! 2. the statement is a plain `SELECT` (no INSERT/UPDATE/DELETE/DDL/ATTACH/
//!    PRAGMA, no `SELECT ... INTO`),
//! 3. every referenced table exists in the schema catalog,
//! 4. every referenced column exists in a referenced table or is an alias
//!    the query itself declares,
//! 5. a row limit is present and does not exceed the configured ceiling.
//!
//! On success the caller gets back the re-rendered SQL with the enforced
//! LIMIT. The original model text is never executed directly.

use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, ObjectName, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins, Value as SqlValue,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::catalog::Catalog;

/// A query that passed the gate and may be executed.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    /// Re-rendered SQL with the enforced LIMIT.
    pub sql: String,
    /// Catalog tables the query reads, lowercased.
    pub tables: Vec<String>,
    /// The effective row ceiling applied to the query.
    pub row_limit: i64,
}

/// Validate one candidate SQL string against the catalog.
///
/// Returns the rejection reason on failure. The reason is safe to show to
/// the end user; it never echoes database error text.
pub fn validate(sql: &str, catalog: &Catalog, row_limit: i64) -> Result<ValidatedQuery, String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err("no SQL statement provided".to_string());
    }

    let dialect = SQLiteDialect {};
    let mut statements = Parser::parse_sql(&dialect, trimmed)
        .map_err(|e| format!("the generated SQL could not be parsed: {}", e))?;

    if statements.is_empty() {
        return Err("the generated SQL contained no statement".to_string());
    }
    if statements.len() > 1 {
        return Err(format!(
            "multiple SQL statements are not allowed (found {})",
            statements.len()
        ));
    }

    let statement = &mut statements[0];

    let query = match statement {
        Statement::Query(q) => q,
        _ => {
            let keyword = trimmed
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_uppercase();
            return Err(format!(
                "only read-only SELECT queries are allowed (got {})",
                keyword
            ));
        }
    };

    // Declared names: CTEs, table aliases, select-item aliases.
    let mut declared = DeclaredNames::default();
    collect_query(query, &mut declared)?;

    // Every relation the statement touches, including inside subqueries.
    let mut referenced_tables: Vec<String> = Vec::new();
    let _ = visit_relations(&statements[0], |name: &ObjectName| {
        referenced_tables.push(object_name_str(name));
        ControlFlow::<()>::Continue(())
    });

    let mut known_columns: HashSet<String> = declared.column_aliases.clone();
    let mut catalog_tables: Vec<String> = Vec::new();

    for table in &referenced_tables {
        let lowered = table.to_lowercase();
        if declared.cte_names.contains(&lowered) {
            continue;
        }
        match catalog.table(table) {
            Some(schema) => {
                for col in &schema.columns {
                    known_columns.insert(col.name.to_lowercase());
                }
                if !catalog_tables.contains(&lowered) {
                    catalog_tables.push(lowered);
                }
            }
            None => {
                return Err(format!(
                    "unknown table '{}' is not part of the database schema",
                    table
                ));
            }
        }
    }

    // Qualifiers may be table names, their aliases, or CTE names.
    let mut known_qualifiers: HashSet<String> = declared.table_aliases.clone();
    known_qualifiers.extend(declared.cte_names.iter().cloned());
    known_qualifiers.extend(catalog_tables.iter().cloned());

    let mut violation: Option<String> = None;
    let _ = visit_expressions(&statements[0], |expr: &Expr| {
        match expr {
            Expr::Identifier(ident) => {
                let name = ident.value.to_lowercase();
                if !known_columns.contains(&name) && !known_qualifiers.contains(&name) {
                    violation = Some(format!(
                        "unknown column '{}' is not part of the database schema",
                        ident.value
                    ));
                    return ControlFlow::Break(());
                }
            }
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let qualifier = parts[0].value.to_lowercase();
                let column = parts[parts.len() - 1].value.to_lowercase();
                if !known_qualifiers.contains(&qualifier) {
                    violation = Some(format!(
                        "unknown table or alias '{}' is not part of the query",
                        parts[0].value
                    ));
                    return ControlFlow::Break(());
                }
                if !known_columns.contains(&column) {
                    violation = Some(format!(
                        "unknown column '{}' is not part of the database schema",
                        parts[parts.len() - 1].value
                    ));
                    return ControlFlow::Break(());
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });

    if let Some(reason) = violation {
        return Err(reason);
    }

    // Enforce the row ceiling on the outermost query.
    if let Statement::Query(query) = &mut statements[0] {
        enforce_limit(query, row_limit);
    }

    Ok(ValidatedQuery {
        sql: statements[0].to_string(),
        tables: catalog_tables,
        row_limit,
    })
}

/// Inject a LIMIT if absent; clamp it if present and above the ceiling.
/// Non-numeric limit expressions are replaced with the ceiling outright.
fn enforce_limit(query: &mut Query, row_limit: i64) {
    let within_ceiling = match &query.limit {
        Some(Expr::Value(SqlValue::Number(n, _))) => n
            .parse::<i64>()
            .map(|v| v >= 0 && v <= row_limit)
            .unwrap_or(false),
        _ => false,
    };

    if !within_ceiling {
        query.limit = Some(Expr::Value(SqlValue::Number(row_limit.to_string(), false)));
    }
}

fn object_name_str(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Names a query declares itself: CTEs, table aliases, projection aliases.
/// All lowercased.
#[derive(Debug, Default)]
struct DeclaredNames {
    cte_names: HashSet<String>,
    table_aliases: HashSet<String>,
    column_aliases: HashSet<String>,
}

fn collect_query(query: &Query, declared: &mut DeclaredNames) -> Result<(), String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            declared.cte_names.insert(cte.alias.name.value.to_lowercase());
            for col in &cte.alias.columns {
                declared.column_aliases.insert(col.value.to_lowercase());
            }
            collect_query(&cte.query, declared)?;
        }
    }
    collect_set_expr(&query.body, declared)
}

fn collect_set_expr(body: &SetExpr, declared: &mut DeclaredNames) -> Result<(), String> {
    match body {
        SetExpr::Select(select) => collect_select(select, declared),
        SetExpr::Query(query) => collect_query(query, declared),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, declared)?;
            collect_set_expr(right, declared)
        }
        _ => Ok(()),
    }
}

fn collect_select(select: &Select, declared: &mut DeclaredNames) -> Result<(), String> {
    if select.into.is_some() {
        return Err("SELECT INTO is not allowed".to_string());
    }

    for item in &select.projection {
        match item {
            SelectItem::ExprWithAlias { expr, alias } => {
                declared.column_aliases.insert(alias.value.to_lowercase());
                collect_expr(expr, declared)?;
            }
            SelectItem::UnnamedExpr(expr) => collect_expr(expr, declared)?,
            _ => {}
        }
    }

    for twj in &select.from {
        collect_table_with_joins(twj, declared)?;
    }

    if let Some(selection) = &select.selection {
        collect_expr(selection, declared)?;
    }
    if let Some(having) = &select.having {
        collect_expr(having, declared)?;
    }

    Ok(())
}

fn collect_table_with_joins(twj: &TableWithJoins, declared: &mut DeclaredNames) -> Result<(), String> {
    collect_table_factor(&twj.relation, declared)?;
    for join in &twj.joins {
        collect_table_factor(&join.relation, declared)?;
    }
    Ok(())
}

fn collect_table_factor(factor: &TableFactor, declared: &mut DeclaredNames) -> Result<(), String> {
    match factor {
        TableFactor::Table { alias, .. } => {
            if let Some(alias) = alias {
                declared.table_aliases.insert(alias.name.value.to_lowercase());
            }
            Ok(())
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            if let Some(alias) = alias {
                declared.table_aliases.insert(alias.name.value.to_lowercase());
                for col in &alias.columns {
                    declared.column_aliases.insert(col.value.to_lowercase());
                }
            }
            collect_query(subquery, declared)
        }
        TableFactor::NestedJoin {
            table_with_joins,
            alias,
        } => {
            if let Some(alias) = alias {
                declared.table_aliases.insert(alias.name.value.to_lowercase());
            }
            collect_table_with_joins(table_with_joins, declared)
        }
        _ => Ok(()),
    }
}

/// Descend into expressions only far enough to find nested queries, whose
/// aliases and CTEs must be collected before reference checking.
fn collect_expr(expr: &Expr, declared: &mut DeclaredNames) -> Result<(), String> {
    match expr {
        Expr::Subquery(query) => collect_query(query, declared),
        Expr::Exists { subquery, .. } => collect_query(subquery, declared),
        Expr::InSubquery { expr, subquery, .. } => {
            collect_expr(expr, declared)?;
            collect_query(subquery, declared)
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_expr(left, declared)?;
            collect_expr(right, declared)
        }
        Expr::UnaryOp { expr, .. } => collect_expr(expr, declared),
        Expr::Nested(inner) => collect_expr(inner, declared),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => collect_expr(inner, declared),
        Expr::Cast { expr, .. } => collect_expr(expr, declared),
        Expr::InList { expr, list, .. } => {
            collect_expr(expr, declared)?;
            for item in list {
                collect_expr(item, declared)?;
            }
            Ok(())
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_expr(expr, declared)?;
            collect_expr(low, declared)?;
            collect_expr(high, declared)
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                collect_expr(operand, declared)?;
            }
            for c in conditions {
                collect_expr(c, declared)?;
            }
            for r in results {
                collect_expr(r, declared)?;
            }
            if let Some(else_result) = else_result {
                collect_expr(else_result, declared)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSchema, TableSchema};

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.to_string(),
                    decl_type: "TEXT".to_string(),
                    nullable: true,
                })
                .collect(),
            primary_key: vec![],
            foreign_keys: vec![],
        }
    }

    fn gpr_catalog() -> Catalog {
        Catalog::from_tables(vec![
            table(
                "scans",
                &["scan_id", "location", "road_section", "scan_date", "scan_quality"],
            ),
            table(
                "defects",
                &["defect_id", "scan_id", "defect_type", "depth_cm", "severity", "confidence"],
            ),
            table(
                "repair_history",
                &["repair_id", "defect_id", "repair_date", "cost_usd", "status"],
            ),
        ])
    }

    #[test]
    fn injects_limit_when_absent() {
        let v = validate("SELECT * FROM defects", &gpr_catalog(), 50).unwrap();
        assert!(v.sql.contains("LIMIT 50"), "got: {}", v.sql);
        assert_eq!(v.tables, vec!["defects"]);
    }

    #[test]
    fn clamps_oversized_limit() {
        let v = validate("SELECT * FROM defects LIMIT 100000", &gpr_catalog(), 50).unwrap();
        assert!(v.sql.contains("LIMIT 50"), "got: {}", v.sql);
        assert!(!v.sql.contains("100000"));
    }

    #[test]
    fn keeps_limit_within_ceiling() {
        let v = validate("SELECT * FROM defects LIMIT 10", &gpr_catalog(), 50).unwrap();
        assert!(v.sql.contains("LIMIT 10"), "got: {}", v.sql);
    }

    #[test]
    fn replaces_non_numeric_limit() {
        let v = validate(
            "SELECT * FROM defects LIMIT 10 + 10",
            &gpr_catalog(),
            50,
        )
        .unwrap();
        assert!(v.sql.contains("LIMIT 50"), "got: {}", v.sql);
    }

    #[test]
    fn rejects_mutating_statements() {
        let catalog = gpr_catalog();
        for sql in [
            "INSERT INTO defects (defect_type) VALUES ('cavity')",
            "UPDATE defects SET severity = 'low'",
            "DELETE FROM defects",
            "DROP TABLE defects",
            "CREATE TABLE t (x INTEGER)",
            "ALTER TABLE defects ADD COLUMN x INTEGER",
        ] {
            let err = validate(sql, &catalog, 50).unwrap_err();
            assert!(
                err.contains("only read-only SELECT"),
                "{} should be rejected as non-SELECT, got: {}",
                sql,
                err
            );
        }
    }

    #[test]
    fn rejects_pragma_and_attach() {
        // These may die at the parse stage or at the statement-type check
        // depending on how the parser handles them; either way they must
        // never pass the gate.
        let catalog = gpr_catalog();
        for sql in [
            "PRAGMA journal_mode = DELETE",
            "PRAGMA journal_mode",
            "ATTACH DATABASE 'other.db' AS other",
        ] {
            assert!(
                validate(sql, &catalog, 50).is_err(),
                "{} should be rejected",
                sql
            );
        }
    }

    #[test]
    fn rejects_multi_statement_injection() {
        let err = validate(
            "SELECT * FROM defects; DROP TABLE defects;",
            &gpr_catalog(),
            50,
        )
        .unwrap_err();
        assert!(err.contains("multiple SQL statements"), "got: {}", err);
    }

    #[test]
    fn rejects_unknown_table() {
        let err = validate("SELECT * FROM users", &gpr_catalog(), 50).unwrap_err();
        assert!(err.contains("unknown table 'users'"), "got: {}", err);
    }

    #[test]
    fn rejects_unknown_column() {
        let err = validate("SELECT shoe_size FROM defects", &gpr_catalog(), 50).unwrap_err();
        assert!(err.contains("unknown column 'shoe_size'"), "got: {}", err);
    }

    #[test]
    fn rejects_fuzzed_column_names() {
        let catalog = gpr_catalog();
        // Cheap deterministic fuzz: names that differ from real columns.
        let mut state: u64 = 0x9e3779b97f4a7c15;
        for _ in 0..64 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let fake = format!("col_{:x}", state >> 40);
            let sql = format!("SELECT {} FROM defects", fake);
            assert!(
                validate(&sql, &catalog, 50).is_err(),
                "fuzzed column {} should be rejected",
                fake
            );
        }
    }

    #[test]
    fn accepts_join_with_aliases() {
        let v = validate(
            "SELECT s.location, COUNT(*) AS defect_count \
             FROM defects d JOIN scans s ON d.scan_id = s.scan_id \
             GROUP BY s.location ORDER BY defect_count DESC",
            &gpr_catalog(),
            50,
        )
        .unwrap();
        assert!(v.tables.contains(&"defects".to_string()));
        assert!(v.tables.contains(&"scans".to_string()));
    }

    #[test]
    fn accepts_aggregate_alias_in_order_by() {
        let v = validate(
            "SELECT defect_type, AVG(depth_cm) AS avg_depth \
             FROM defects GROUP BY defect_type ORDER BY avg_depth DESC",
            &gpr_catalog(),
            50,
        );
        assert!(v.is_ok(), "got: {:?}", v.err());
    }

    #[test]
    fn accepts_cte() {
        let v = validate(
            "WITH worst AS (SELECT defect_id, depth_cm FROM defects WHERE severity = 'critical') \
             SELECT * FROM worst LIMIT 5",
            &gpr_catalog(),
            50,
        );
        assert!(v.is_ok(), "got: {:?}", v.err());
    }

    #[test]
    fn accepts_exists_subquery_alias() {
        let v = validate(
            "SELECT location FROM scans s WHERE EXISTS \
             (SELECT 1 FROM defects d WHERE d.scan_id = s.scan_id AND d.severity = 'critical')",
            &gpr_catalog(),
            50,
        );
        assert!(v.is_ok(), "got: {:?}", v.err());
    }

    #[test]
    fn rejects_unknown_qualifier() {
        let err = validate("SELECT x.depth_cm FROM defects d", &gpr_catalog(), 50).unwrap_err();
        assert!(err.contains("unknown table or alias 'x'"), "got: {}", err);
    }

    #[test]
    fn identifiers_match_case_insensitively() {
        let v = validate("SELECT Defect_Type FROM DEFECTS", &gpr_catalog(), 50);
        assert!(v.is_ok(), "got: {:?}", v.err());
    }

    #[test]
    fn rejects_unparseable_text() {
        let err = validate("here is the SQL you asked for!", &gpr_catalog(), 50).unwrap_err();
        assert!(err.contains("could not be parsed"), "got: {}", err);
    }

    #[test]
    fn rejects_empty_input_with_neutral_message() {
        // The gate also fronts caller-provided SQL, so the reason must not
        // presume the text came from a model.
        let err = validate("   ", &gpr_catalog(), 50).unwrap_err();
        assert!(err.contains("no SQL statement provided"), "got: {}", err);
        assert!(!err.contains("model"), "got: {}", err);
    }
}
