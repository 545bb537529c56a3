//! Schema Catalog: a read-only mirror of the database's structural metadata.
//!
//! The catalog is loaded once per session (or on explicit refresh) and then
//! treated as an immutable snapshot. It serves two masters: the prompt sent
//! to the language model, and the validation gate that checks every
//! model-generated identifier against it.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{ColumnSchema, ForeignKey, TableSchema};

/// Tables the agent keeps to itself. They never appear in the prompt or the
/// catalog, so generated SQL referencing them fails identifier validation.
const INTERNAL_TABLES: &[&str] = &["query_history"];

#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    /// Read table, column, and key metadata from `sqlite_master` and PRAGMAs.
    pub async fn load(pool: &SqlitePool) -> Result<Catalog> {
        let name_rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        let mut tables = Vec::new();

        for row in &name_rows {
            let name: String = row.get("name");
            if INTERNAL_TABLES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&name))
            {
                continue;
            }

            // Table names come from sqlite_master, not user input, so
            // interpolating the quoted name into a PRAGMA is fine.
            let col_rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", name))
                .fetch_all(pool)
                .await?;

            let mut columns = Vec::new();
            let mut primary_key = Vec::new();
            for col in &col_rows {
                let col_name: String = col.get("name");
                let decl_type: String = col.get("type");
                let notnull: i64 = col.get("notnull");
                let pk: i64 = col.get("pk");
                if pk > 0 {
                    primary_key.push(col_name.clone());
                }
                columns.push(ColumnSchema {
                    name: col_name,
                    decl_type,
                    nullable: notnull == 0 && pk == 0,
                });
            }

            let fk_rows = sqlx::query(&format!("PRAGMA foreign_key_list(\"{}\")", name))
                .fetch_all(pool)
                .await?;

            let foreign_keys = fk_rows
                .iter()
                .map(|fk| ForeignKey {
                    column: fk.get("from"),
                    references_table: fk.get("table"),
                    references_column: fk.get("to"),
                })
                .collect();

            tables.push(TableSchema {
                name,
                columns,
                primary_key,
                foreign_keys,
            });
        }

        Ok(Catalog { tables })
    }

    /// Build a catalog directly from descriptors. Used by the validation
    /// gate's unit tests, which must run without a live database.
    pub fn from_tables(tables: Vec<TableSchema>) -> Catalog {
        Catalog { tables }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Render the schema as `CREATE TABLE`-style text for the model prompt.
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("CREATE TABLE {} (\n", table.name));
            for (i, col) in table.columns.iter().enumerate() {
                let mut line = format!("    {} {}", col.name, col.decl_type);
                if table.primary_key.iter().any(|pk| pk == &col.name) {
                    line.push_str(" PRIMARY KEY");
                } else if !col.nullable {
                    line.push_str(" NOT NULL");
                }
                if i + 1 < table.columns.len() {
                    line.push(',');
                }
                line.push('\n');
                out.push_str(&line);
            }
            out.push_str(");\n");
            for fk in &table.foreign_keys {
                out.push_str(&format!(
                    "-- {}.{} references {}({})\n",
                    table.name, fk.column, fk.references_table, fk.references_column
                ));
            }
            out.push('\n');
        }
        out
    }
}

/// CLI entry point: print the catalog for the configured database.
pub async fn run_schema(config: &crate::config::Config) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let catalog = Catalog::load(&pool).await?;
    pool.close().await;

    if catalog.is_empty() {
        println!("No tables found. Run `gpr init --seed` first.");
        return Ok(());
    }

    print!("{}", catalog.to_prompt());
    Ok(())
}
