//! Language-model oracle: HTTP client, response parsing, and prompts.
//!
//! The oracle is untrusted and fallible; everything it returns goes through
//! the parsing helpers in [`parse`] before anything acts on it.

pub mod client;
pub mod parse;
pub mod prompts;

pub use client::OracleClient;

use async_trait::async_trait;

/// Seam over the language-model backend.
///
/// Detection and remediation only see this trait, so both can be exercised
/// with canned responses in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl ChatBackend for OracleClient {
    async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String> {
        self.complete(system, user).await
    }
}
