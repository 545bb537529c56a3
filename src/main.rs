//! # GPR Agent CLI (`gpr`)
//!
//! The `gpr` binary is the primary interface for the road-defect query
//! agent. It provides commands for database initialization, one-shot and
//! interactive questioning, gated raw SQL, schema and history inspection,
//! and starting the dashboard API server.
//!
//! ## Usage
//!
//! ```bash
//! gpr --config ./config/gpr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gpr init` | Create the SQLite database and run schema migrations |
//! | `gpr ask "<question>"` | Answer one natural-language question |
//! | `gpr sql "<select>"` | Run SQL through the same validation gate |
//! | `gpr schema` | Print the queryable schema catalog |
//! | `gpr history list` | Show recent question/answer log entries |
//! | `gpr history clear` | Truncate the history log |
//! | `gpr stats` | Print dashboard summary statistics |
//! | `gpr chat` | Interactive question loop |
//! | `gpr serve` | Start the dashboard JSON API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database with sample survey data
//! gpr init --seed --config ./config/gpr.toml
//!
//! # One-shot question
//! gpr ask "How many critical defects are there?" --show-sql
//!
//! # Raw SQL still goes through the read-only gate
//! gpr sql "SELECT defect_type, COUNT(*) FROM defects GROUP BY defect_type"
//!
//! # Start the dashboard API
//! gpr serve --config ./config/gpr.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gpr_agent::{catalog, chat, config, history, mediator, migrate, seed, server, stats};

/// GPR Agent — a natural-language query agent for ground-penetrating radar
/// road survey data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gpr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gpr",
    about = "GPR Agent — ask plain-language questions about road-defect survey data",
    version,
    long_about = "GPR Agent turns natural-language questions into validated, read-only SQL \
    over a SQLite database of ground-penetrating radar scans, detected subsurface defects, \
    measurements, and repair history. Every query — model-generated or hand-written — passes \
    a deterministic safety gate before execution."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/gpr.toml`. Database, model, query, and server
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/gpr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (scans,
    /// defects, measurements, repair_history, query_history). This command
    /// is idempotent — running it multiple times is safe.
    Init {
        /// Also load the deterministic sample survey dataset.
        #[arg(long)]
        seed: bool,
    },

    /// Answer one natural-language question and exit.
    ///
    /// Sends the question to the configured model provider, validates the
    /// generated SQL, executes it read-only, and prints the answer.
    Ask {
        /// The question, in plain language.
        question: String,

        /// Session id to group this question with others in the history log.
        #[arg(long)]
        session: Option<String>,

        /// Print the executed SQL before the answer.
        #[arg(long)]
        show_sql: bool,
    },

    /// Run SQL through the validation gate and formatter.
    ///
    /// The statement gets exactly the same treatment as model output:
    /// single read-only SELECT, known identifiers only, bounded row limit.
    Sql {
        /// The SQL statement to run.
        statement: String,

        /// Session id for the history log entry.
        #[arg(long)]
        session: Option<String>,
    },

    /// Print the queryable schema catalog.
    ///
    /// Shows the tables, columns, and relationships the agent is allowed
    /// to query — the same text given to the model as context.
    Schema,

    /// Inspect or clear the question/answer history log.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Print dashboard summary statistics.
    Stats,

    /// Interactive question loop.
    ///
    /// Reads questions from stdin until `quit` or end-of-input. Also
    /// accepts `schema` and `history` as inline commands.
    Chat,

    /// Start the dashboard JSON API server.
    ///
    /// Binds to the address configured in `[server].bind` and exposes the
    /// ask/sql/schema/history/stats endpoints.
    Serve,
}

/// History log subcommands.
#[derive(Subcommand)]
enum HistoryAction {
    /// Show recent entries, newest first.
    List {
        /// Maximum number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Remove every entry. The log is append-only otherwise; this is the
    /// only supported mutation.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { seed } => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            if seed {
                let pool = gpr_agent::db::connect(&cfg).await?;
                let report = seed::load_sample_data(&pool).await?;
                pool.close().await;
                println!(
                    "Loaded sample data: {} scans, {} defects, {} measurements, {} repairs.",
                    report.scans, report.defects, report.measurements, report.repairs
                );
            }
        }
        Commands::Ask {
            question,
            session,
            show_sql,
        } => {
            mediator::run_ask(&cfg, &question, session, show_sql).await?;
        }
        Commands::Sql { statement, session } => {
            mediator::run_sql(&cfg, &statement, session).await?;
        }
        Commands::Schema => {
            catalog::run_schema(&cfg).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::List { limit } => {
                history::run_history(&cfg, limit).await?;
            }
            HistoryAction::Clear => {
                history::run_history_clear(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
