//! Text-to-SQL provider abstraction and implementations.
//!
//! Defines the [`SqlGenerator`] trait and concrete implementations:
//! - **[`DisabledGenerator`]** — returns errors; used when no provider is configured.
//! - **[`AnthropicGenerator`]** — calls the Claude Messages API with retry and backoff.
//!
//! The trait is the seam the mediator depends on, so tests can swap in a
//! deterministic stub instead of a vendor call. The model's output is treated
//! as untrusted text either way; nothing here bypasses the validation gate.
//!
//! # Retry Strategy
//!
//! The Anthropic provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Trait for text-to-SQL generators.
///
/// Implementations receive the user's question and a rendered schema context
/// and return candidate SQL text. The returned text is untrusted; the
/// mediator validates it before execution.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Returns the provider identifier (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    /// Generate candidate SQL for a natural-language question.
    async fn generate_sql(&self, question: &str, schema_context: &str) -> Result<String>;
}

/// Create the appropriate [`SqlGenerator`] based on configuration.
pub fn create_generator(config: &ModelConfig) -> Result<Box<dyn SqlGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "anthropic" => Ok(Box::new(AnthropicGenerator::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op generator that always returns errors.
///
/// Used when `model.provider = "disabled"` in the configuration.
pub struct DisabledGenerator;

#[async_trait]
impl SqlGenerator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate_sql(&self, _question: &str, _schema_context: &str) -> Result<String> {
        bail!("Model provider is disabled. Set [model] provider in config.")
    }
}

// ============ Anthropic Provider ============

/// Text-to-SQL generator backed by the Claude Messages API.
///
/// Requires the `ANTHROPIC_API_KEY` environment variable. The key is checked
/// at construction so a missing credential fails fast at startup, not on the
/// first question.
pub struct AnthropicGenerator {
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
    max_retries: u32,
    api_key: String,
}

impl AnthropicGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for Anthropic provider"))?;

        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", API_KEY_ENV))?;

        Ok(Self {
            model,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            api_key,
        })
    }
}

#[async_trait]
impl SqlGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate_sql(&self, question: &str, schema_context: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": build_system_prompt(schema_context),
            "messages": [
                { "role": "user", "content": question }
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_messages_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Anthropic API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Model call failed after retries")))
    }
}

/// System prompt embedding the schema. Asks for bare SQL; the fence stripper
/// and the validation gate handle anything else the model decides to say.
fn build_system_prompt(schema_context: &str) -> String {
    format!(
        "You translate questions about a road-defect survey database into SQLite SQL.\n\
         Respond with exactly one read-only SELECT statement and nothing else: \
         no commentary, no markdown fences, no INSERT/UPDATE/DELETE/DDL.\n\
         Only reference tables and columns from this schema:\n\n{}",
        schema_context
    )
}

/// Extract the first text block from a Messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Anthropic response: missing content array"))?;

    let text = content
        .iter()
        .find_map(|block| block.get("text").and_then(|t| t.as_str()))
        .ok_or_else(|| anyhow::anyhow!("Invalid Anthropic response: no text block"))?;

    Ok(text.to_string())
}

/// Recover bare SQL from model output.
///
/// Strips a markdown code fence if present, then drops any leading prose
/// before the first `SELECT` or `WITH` keyword.
pub fn extract_sql(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("sql").or_else(|| after.strip_prefix("SQL")).unwrap_or(after);
        text = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        text = text.trim();
    }

    match find_sql_start(text) {
        Some(pos) if pos > 0 => text[pos..].trim().to_string(),
        _ => text.to_string(),
    }
}

/// Byte offset of the earliest `SELECT` or `WITH`, matched ASCII
/// case-insensitively on the original text. Only char boundaries are
/// considered, so the offset is always safe to slice at even when the
/// surrounding prose is non-ASCII.
fn find_sql_start(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    text.char_indices().map(|(i, _)| i).find(|&i| {
        ["SELECT", "WITH"].iter().any(|kw| {
            bytes.len() - i >= kw.len()
                && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw.as_bytes())
        })
    })
}
