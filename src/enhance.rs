//! Text enhancement module
//!
//! Optional post-OCR cleanup through an OpenAI-compatible chat completions
//! endpoint (Groq by default). The model may fix spacing, broken words and
//! obvious character misreads; the prompt forbids adding content.
//!
//! Enhancement is best-effort. Every failure, including a suspicious change in
//! length, is reported as an [`EnhanceError`] and the caller keeps the raw text.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================
// Constants
// ============================================================

/// Text longer than this is sent in several requests
pub const MAX_CHUNK_CHARS: usize = 8000;

/// Enhanced/raw length ratio accepted as a faithful rewrite
pub const MIN_LENGTH_RATIO: f64 = 0.5;
pub const MAX_LENGTH_RATIO: f64 = 2.0;

/// Default endpoint (Groq's OpenAI-compatible API)
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "You clean up text produced by OCR of identity documents.
Rules:
- Do not add any information that is not present in the input.
- Do not change names, numbers, dates or identifiers unless a single character is an obvious OCR misread.
- Do not summarize, explain or reorder content.
- Only fix spacing, line breaks, words broken across lines and obvious character misreads.
Return only the cleaned text.";

// ============================================================
// Error Types
// ============================================================

/// Enhancement error types
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Enhanced text length ratio {ratio:.2} outside accepted range")]
    LengthGuard { ratio: f64 },
}

pub type Result<T> = std::result::Result<T, EnhanceError>;

impl From<reqwest::Error> for EnhanceError {
    fn from(e: reqwest::Error) -> Self {
        EnhanceError::Http(e.to_string())
    }
}

// ============================================================
// Trait
// ============================================================

/// Context passed alongside the text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceContext {
    pub document_title: Option<String>,
    pub source_type: Option<String>,
}

impl EnhanceContext {
    pub fn for_image(title: impl Into<String>) -> Self {
        Self {
            document_title: Some(title.into()),
            source_type: Some("image_ocr".to_string()),
        }
    }

    fn header(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.document_title {
            lines.push(format!("Document: {}", title));
        }
        if let Some(source) = &self.source_type {
            lines.push(format!("Source type: {}", source));
        }
        if lines.is_empty() {
            "OCR-extracted text".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Post-OCR text enhancer
pub trait TextEnhancer: Send + Sync {
    fn name(&self) -> &str;

    fn enhance(&self, raw: &str, context: &EnhanceContext) -> Result<String>;
}

// ============================================================
// Options
// ============================================================

/// Chat completions enhancer options
#[derive(Debug, Clone)]
pub struct EnhancerOptions {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_chunk_chars: usize,
}

impl Default for EnhancerOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(60),
            max_chunk_chars: MAX_CHUNK_CHARS,
        }
    }
}

impl EnhancerOptions {
    pub fn builder() -> EnhancerOptionsBuilder {
        EnhancerOptionsBuilder::default()
    }
}

/// Builder for EnhancerOptions
#[derive(Debug, Default)]
pub struct EnhancerOptionsBuilder {
    options: EnhancerOptions,
}

impl EnhancerOptionsBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = url.into();
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.options.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_chunk_chars(mut self, chars: usize) -> Self {
        self.options.max_chunk_chars = chars.max(1);
        self
    }

    #[must_use]
    pub fn build(self) -> EnhancerOptions {
        self.options
    }
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ============================================================
// Chat completions enhancer
// ============================================================

/// Enhancer speaking the OpenAI-compatible `/chat/completions` protocol
pub struct ChatCompletionEnhancer {
    options: EnhancerOptions,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl ChatCompletionEnhancer {
    /// Create an enhancer; fails without an API key
    pub fn new(options: EnhancerOptions) -> Result<Self> {
        let api_key = options
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(EnhanceError::MissingApiKey)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .build()?;
        Ok(Self {
            options,
            api_key,
            client,
        })
    }

    pub fn options(&self) -> &EnhancerOptions {
        &self.options
    }

    fn build_request(&self, chunk: &str, context: &EnhanceContext, max_tokens: usize) -> ChatRequest {
        ChatRequest {
            model: self.options.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "{}\n\nClean the following OCR text:\n{}",
                        context.header(),
                        chunk
                    ),
                },
            ],
            temperature: self.options.temperature,
            max_tokens,
        }
    }

    fn complete(&self, chunk: &str, context: &EnhanceContext, max_tokens: usize) -> Result<String> {
        let request = self.build_request(chunk, context, max_tokens);
        let url = format!("{}/chat/completions", self.options.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(EnhanceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

impl TextEnhancer for ChatCompletionEnhancer {
    fn name(&self) -> &str {
        &self.options.model
    }

    fn enhance(&self, raw: &str, context: &EnhanceContext) -> Result<String> {
        let raw_chars = raw.chars().count();
        info!(chars = raw_chars, model = %self.options.model, "enhancing OCR text");

        let single = raw_chars <= self.options.max_chunk_chars;
        let cap = if single { 16000 } else { 8000 };
        enhance_in_chunks(raw, self.options.max_chunk_chars, |chunk| {
            let max_tokens = (chunk.chars().count() * 2).clamp(16, cap);
            self.complete(chunk, context, max_tokens)
        })
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| EnhanceError::Http(format!("bad response: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(EnhanceError::EmptyResponse)
}

// ============================================================
// Chunking and safety checks
// ============================================================

/// Split text into pieces of at most `max_chars` characters
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Reject rewrites whose length drifted too far from the input
pub fn check_length_ratio(raw: &str, enhanced: &str) -> Result<f64> {
    let raw_len = raw.chars().count();
    let ratio = if raw_len == 0 {
        1.0
    } else {
        enhanced.chars().count() as f64 / raw_len as f64
    };
    if !(MIN_LENGTH_RATIO..=MAX_LENGTH_RATIO).contains(&ratio) {
        return Err(EnhanceError::LengthGuard { ratio });
    }
    Ok(ratio)
}

/// Run `complete` over each chunk, join with blank lines, then apply the length guard
pub fn enhance_in_chunks<F>(raw: &str, max_chunk_chars: usize, mut complete: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    if raw.trim().is_empty() {
        return Ok(raw.to_string());
    }

    let chunks = split_chunks(raw, max_chunk_chars);
    if chunks.len() > 1 {
        debug!(chunks = chunks.len(), "enhancing in chunks");
    }

    let mut enhanced = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        enhanced.push(complete(chunk)?);
    }
    let enhanced = enhanced.join("\n\n");

    match check_length_ratio(raw, &enhanced) {
        Ok(ratio) => {
            debug!(ratio, "enhanced text accepted");
            Ok(enhanced)
        }
        Err(e) => {
            warn!(error = %e, "enhanced text rejected");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = EnhancerOptions::default();
        assert_eq!(opts.base_url, DEFAULT_BASE_URL);
        assert_eq!(opts.model, "llama-3.1-8b-instant");
        assert_eq!(opts.temperature, 0.1);
        assert_eq!(opts.max_chunk_chars, 8000);
        assert!(opts.api_key.is_none());
    }

    #[test]
    fn test_builder() {
        let opts = EnhancerOptions::builder()
            .base_url("http://localhost:9999/v1")
            .api_key("k")
            .model("m")
            .temperature(5.0)
            .max_chunk_chars(0)
            .build();
        assert_eq!(opts.base_url, "http://localhost:9999/v1");
        assert_eq!(opts.api_key.as_deref(), Some("k"));
        assert_eq!(opts.temperature, 2.0);
        assert_eq!(opts.max_chunk_chars, 1);
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            ChatCompletionEnhancer::new(EnhancerOptions::default()),
            Err(EnhanceError::MissingApiKey)
        ));
        let blank = EnhancerOptions::builder().api_key("  ").build();
        assert!(matches!(
            ChatCompletionEnhancer::new(blank),
            Err(EnhanceError::MissingApiKey)
        ));
    }

    #[test]
    fn test_split_chunks() {
        let text = "a".repeat(20001);
        let chunks = split_chunks(&text, 8000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 8000);
        assert_eq!(chunks[2].len(), 4001);
        assert!(split_chunks("", 10).is_empty());
    }

    #[test]
    fn test_split_chunks_multibyte() {
        let text = "äöü".repeat(3);
        let chunks = split_chunks(&text, 4);
        assert_eq!(chunks, vec!["äöüä", "öüäö", "ü"]);
    }

    #[test]
    fn test_length_ratio_bounds() {
        assert_eq!(check_length_ratio("abcd", "ab").unwrap(), 0.5);
        assert_eq!(check_length_ratio("ab", "abcd").unwrap(), 2.0);
        assert!(matches!(
            check_length_ratio("abcde", "ab"),
            Err(EnhanceError::LengthGuard { .. })
        ));
        assert!(matches!(
            check_length_ratio("ab", "abcde"),
            Err(EnhanceError::LengthGuard { .. })
        ));
        assert_eq!(check_length_ratio("", "").unwrap(), 1.0);
    }

    #[test]
    fn test_enhance_in_chunks_joins() {
        let raw = format!("{}{}", "x".repeat(10), "y".repeat(10));
        let mut calls = 0;
        let out = enhance_in_chunks(&raw, 10, |chunk| {
            calls += 1;
            Ok(chunk.to_uppercase())
        })
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(out, format!("{}\n\n{}", "X".repeat(10), "Y".repeat(10)));
    }

    #[test]
    fn test_enhance_in_chunks_guard() {
        let result = enhance_in_chunks("NAME JOHN DOE DOB 01/02/1990", 8000, |_| {
            Ok("The holder of this licence is John Doe, who was born on the first of February 1990 and lives at an address not shown.".to_string())
        });
        assert!(matches!(result, Err(EnhanceError::LengthGuard { .. })));
    }

    #[test]
    fn test_enhance_in_chunks_propagates_error() {
        let result = enhance_in_chunks("some text", 8000, |_| Err(EnhanceError::EmptyResponse));
        assert!(matches!(result, Err(EnhanceError::EmptyResponse)));
    }

    #[test]
    fn test_enhance_in_chunks_skips_blank() {
        let result = enhance_in_chunks("  \n", 8000, |_| panic!("should not be called"));
        assert_eq!(result.unwrap(), "  \n");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  NAME: JOHN  "}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "NAME: JOHN");

        let empty = r#"{"choices":[]}"#;
        assert!(matches!(parse_response(empty), Err(EnhanceError::EmptyResponse)));

        let null = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(parse_response(null), Err(EnhanceError::EmptyResponse)));

        assert!(matches!(parse_response("not json"), Err(EnhanceError::Http(_))));
    }

    #[test]
    fn test_build_request() {
        let enhancer = ChatCompletionEnhancer::new(
            EnhancerOptions::builder().api_key("secret").model("test-model").build(),
        )
        .unwrap();
        let req = enhancer.build_request("DL NO 123", &EnhanceContext::for_image("card.jpg"), 32);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["max_tokens"], 32);
        assert_eq!(json["messages"][0]["role"], "system");
        let user = json["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("Document: card.jpg"));
        assert!(user.contains("Source type: image_ocr"));
        assert!(user.ends_with("DL NO 123"));
    }

    #[test]
    fn test_context_header_default() {
        assert_eq!(EnhanceContext::default().header(), "OCR-extracted text");
    }
}
