//! Conversation session: system-instruction assembly and model calls.
//!
//! The system instruction is a fixed behavioral prompt plus the ledger's
//! accumulated document context, rebuilt before every completion request so
//! newly ingested documents take effect on the next turn. The completion
//! call itself goes through the [`CompletionProvider`] trait; tests
//! substitute a canned provider.
//!
//! # Retry Strategy
//!
//! The Gemini provider retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::ledger::ContextLedger;
use crate::models::{ChatRole, ChatTurn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The fixed behavioral prompt. Documents arrive separately, appended by
/// [`system_instruction`].
const BEHAVIOR_PROMPT: &str = "\
You are a document assistant. Follow these rules:

1. Answer strictly from the supplied documents when they cover the question. \
Cite the document name (the header of each block) for every claim you take \
from one.
2. When the documents do not cover the question, say so before answering \
from general knowledge.
3. When asked to summarize, produce a short overview first, then key points \
per document.
4. When asked to compare documents, organize the answer by topic, naming \
each document's position.
5. When asked to draft or rewrite text, keep the tone of the source \
documents unless told otherwise.
6. Keep answers in the language the user writes in.";

/// Assembles the full system instruction for the next completion request.
pub fn system_instruction(ledger: &ContextLedger) -> String {
    let context = ledger.render_context();
    if context.is_empty() {
        BEHAVIOR_PROMPT.to_string()
    } else {
        format!(
            "{}\n\nSupplied documents:\n\n{}",
            BEHAVIOR_PROMPT, context
        )
    }
}

/// The "generate completion" capability the session consumes.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the assistant's next turn from the full history and the
    /// current system instruction.
    async fn complete(&self, system: &str, history: &[ChatTurn]) -> Result<String>;
}

// ============ Gemini provider ============

/// [`CompletionProvider`] against the Gemini `generateContent` endpoint.
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, system: &str, history: &[ChatTurn]) -> Result<String> {
        let body = request_body(system, history);
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Gemini API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Builds the `generateContent` request: full history as `contents`, the
/// system instruction in `system_instruction.parts`.
fn request_body(system: &str, history: &[ChatTurn]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = history
        .iter()
        .map(|turn| {
            serde_json::json!({
                "role": match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                },
                "parts": [{ "text": turn.content }],
            })
        })
        .collect();

    serde_json::json!({
        "system_instruction": { "parts": [{ "text": system }] },
        "contents": contents,
    })
}

/// Joins the text parts of the first candidate.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        bail!("Gemini response contained no text");
    }
    Ok(text)
}
