//! Interactive terminal session against the agent.
//!
//! One process-lifetime session id groups every question in the history log.
//! Failed turns print their reason and the loop continues; only `quit` or
//! end-of-input ends the session.

use anyhow::Result;
use std::io::{self, BufRead, Write};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::history;
use crate::mediator;
use crate::model;
use crate::models::QueryRequest;

const EXAMPLE_QUESTIONS: &[&str] = &[
    "How many critical defects are there?",
    "What is the average repair cost per defect type?",
    "Which locations have the most cavities?",
    "List scans with poor scan quality.",
];

/// `gpr chat` — line-oriented question loop.
pub async fn run_chat(config: &Config) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let catalog = Catalog::load(&pool).await?;
    if catalog.is_empty() {
        pool.close().await;
        anyhow::bail!("No tables found. Run `gpr init --seed` first.");
    }

    let generator = model::create_generator(&config.model)?;
    let session_id = Uuid::new_v4().to_string();

    println!("GPR road-defect agent (model: {})", generator.name());
    println!("Ask a question in plain language, for example:");
    for q in EXAMPLE_QUESTIONS {
        println!("  - {}", q);
    }
    println!("Commands: schema, history, quit");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let input = line.trim();

        match input {
            "" => continue,
            "quit" | "exit" => break,
            "schema" => {
                println!("{}", catalog.to_prompt());
            }
            "history" => {
                let entries = history::list_entries(&pool, 10).await?;
                if entries.is_empty() {
                    println!("No questions recorded yet.");
                }
                for entry in entries.iter().rev() {
                    println!("[{}] {}", entry.id, entry.question);
                    println!("    {}", entry.sql);
                }
            }
            question => {
                let request = QueryRequest::new(question, session_id.clone());
                match mediator::answer_question(
                    &pool,
                    &catalog,
                    generator.as_ref(),
                    config,
                    &request,
                )
                .await
                {
                    Ok(answer) => {
                        println!("sql: {}", answer.sql);
                        println!("{}", answer.text);
                    }
                    Err(e) => {
                        eprintln!("[{}] {}", e.code(), e);
                    }
                }
            }
        }
        println!();
    }

    pool.close().await;
    Ok(())
}
