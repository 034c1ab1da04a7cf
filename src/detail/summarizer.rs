use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Instruction sent ahead of every decoded payload
pub const PROMPT_PREAMBLE: &str = "Your answer is shown to the user as-is, so add nothing else. \
Describe the purpose of the following packet payload in one line, ignoring any parts that look \
encrypted. If you cannot tell, say that you cannot understand the payload. The payload is: ";

/// Language model failures
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("language model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned an empty reply")]
    EmptyReply,
}

/// Produces a short natural-language description of a payload
pub trait Summarizer: Send + Sync {
    fn summarize(&self, payload_text: &str) -> Result<String, SummarizeError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Summarizer backed by an Ollama server's `/api/generate`
pub struct OllamaSummarizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, SummarizeError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(OllamaSummarizer {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Summarizer for OllamaSummarizer {
    fn summarize(&self, payload_text: &str) -> Result<String, SummarizeError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: format!("{}{}", PROMPT_PREAMBLE, payload_text),
            stream: false,
        };

        debug!("Asking {} ({}) about {} chars", self.endpoint, self.model, payload_text.len());
        let response = self.client.post(&self.endpoint).json(&request).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: GenerateResponse = response.json()?;
        let text = reply.response.trim();
        if text.is_empty() {
            return Err(SummarizeError::EmptyReply);
        }
        Ok(text.to_string())
    }
}
