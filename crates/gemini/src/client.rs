use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use peptalk_core::config::GeminiConfig;
use peptalk_core::errors::GenerateError;
use peptalk_core::pipeline::QuoteGenerator;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed instruction sent on every run. Asks for the bare quote so the
/// response needs no conversational-filler stripping.
const QUOTE_PROMPT: &str =
    "Create one short, punchy motivational quote for a programmer. Just the quote, no intro text.";

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 256;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build gemini http client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl QuoteGenerator for GeminiClient {
    async fn generate(&self) -> Result<String, GenerateError> {
        let request = GenerateContentRequest {
            contents: vec![Content { parts: vec![Part { text: QUOTE_PROMPT.to_string() }] }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        debug!(model = %self.model, "calling gemini generateContent");

        // The key travels in a header, not the query string, so request
        // URLs surfaced in errors or logs never carry it.
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: GenerateContentResponse =
            response.json().await.map_err(|_| GenerateError::Empty)?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .unwrap_or_default();

        let quote = trim_quote(&text);
        if quote.is_empty() {
            return Err(GenerateError::Empty);
        }

        Ok(quote)
    }
}

fn classify_transport_error(error: reqwest::Error) -> GenerateError {
    if error.is_timeout() {
        GenerateError::Unavailable("request timed out".to_string())
    } else if error.is_connect() {
        GenerateError::Unavailable("connection failed".to_string())
    } else {
        GenerateError::Unavailable(format!("transport error: {}", error.without_url()))
    }
}

fn classify_status(status: StatusCode) -> GenerateError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerateError::Auth(format!("provider rejected the api key (status {status})"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            GenerateError::Unavailable("rate limited (status 429)".to_string())
        }
        other => GenerateError::Unavailable(format!("provider returned status {other}")),
    }
}

/// Strip whitespace and surrounding quotation marks. Models often wrap
/// the requested quote in `"…"` or typographic quotes; inner punctuation
/// must survive untouched.
fn trim_quote(raw: &str) -> String {
    const QUOTE_MARKS: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

    let mut text = raw.trim();
    loop {
        let stripped = text.trim_matches(QUOTE_MARKS).trim();
        if stripped == text {
            return text.to_string();
        }
        text = stripped;
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
