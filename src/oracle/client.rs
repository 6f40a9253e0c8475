//! Chat-completions HTTP client.

use crate::config::Config;
use crate::util::truncate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Completion budget for a full-file replacement response.
const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_SECS: u64 = 2;
const BACKOFF_MULTIPLIER: u64 = 2;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

/// Client for an OpenAI-style chat-completions endpoint.
pub struct OracleClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OracleClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("API_KEY is not set")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            http,
            model: config.model.clone(),
            api_key,
            base_url,
        })
    }

    /// Send one system+user exchange and return the assistant's content.
    ///
    /// Retries with exponential backoff when the endpoint rate limits.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: 0.0,
            stream: false,
        };

        let mut retry_count = 0;

        loop {
            let response = self
                .http
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
                .context("oracle request failed")?;

            let status = response.status();
            let text = response.text().await.context("oracle response unreadable")?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!(
                        "failed to parse oracle response: {}\n{}",
                        e,
                        truncate(&text, 200)
                    )
                })?;

                let content = parsed
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default();
                return Ok(content);
            }

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let wait = INITIAL_BACKOFF_SECS * BACKOFF_MULTIPLIER.pow(retry_count - 1);
                eprintln!(
                    "  Warning: oracle rate limited, retrying in {}s (attempt {}/{})",
                    wait, retry_count, MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let message = match status.as_u16() {
                401 => "invalid API key".to_string(),
                429 => format!("rate limited after {} retries", retry_count),
                500..=599 => format!("oracle server error ({})", status),
                _ => format!("oracle error {}: {}", status, truncate(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", message));
        }
    }
}
