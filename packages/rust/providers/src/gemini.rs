//! Gemini `generateContent` client.
//!
//! Produces topic theory (Markdown) and course outlines (JSON) from the
//! Gemini REST API. The key is sent in the `x-goog-api-key` header.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use coursemind_shared::{CourseMindError, CourseOutline, GeminiConfig, Result};

use crate::{
    OutlineGenerator, OutlineRequest, TextGenerator, TheoryRequest, build_client, endpoint,
    error_for_status, prompts,
};

const SERVICE: &str = "gemini";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Text generation backed by Gemini.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// Send one prompt and return the concatenated text of the first candidate.
    async fn generate(&self, prompt: String, json_output: bool) -> Result<String> {
        let url = endpoint(
            &self.config.base_url,
            &format!("v1beta/models/{}:generateContent", self.config.model),
        );

        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part { text: Some(prompt) }],
            }],
            generation_config: json_output.then_some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, e.to_string()))?;

        let response = error_for_status(SERVICE, response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, format!("invalid response: {e}")))?;

        extract_text(parsed)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip_all, fields(topic = %request.title, language = %request.language))]
    async fn generate_theory(&self, request: &TheoryRequest) -> Result<String> {
        let text = self.generate(prompts::theory_prompt(request), false).await?;
        debug!(len = text.len(), "theory generated");
        Ok(text)
    }
}

#[async_trait]
impl OutlineGenerator for GeminiClient {
    #[instrument(skip_all, fields(subject = %request.subject, chapters = request.chapter_count))]
    async fn generate_outline(&self, request: &OutlineRequest) -> Result<CourseOutline> {
        let text = self.generate(prompts::outline_prompt(request), true).await?;
        parse_outline(&text)
    }
}

/// Pull the answer text out of a `generateContent` response.
fn extract_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(CourseMindError::upstream(SERVICE, format!("prompt blocked: {reason}")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CourseMindError::upstream(SERVICE, "response has no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(CourseMindError::upstream(
            SERVICE,
            format!("empty answer (finish reason: {reason})"),
        ));
    }

    Ok(text)
}

/// Parse the model's JSON outline, tolerating a surrounding code fence.
fn parse_outline(text: &str) -> Result<CourseOutline> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A\s*```(?:json)?\s*(.*?)\s*```\s*\z").expect("valid regex")
    });

    let json = FENCE_RE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| text.trim().to_string());

    let outline: CourseOutline = serde_json::from_str(&json)
        .map_err(|e| CourseMindError::upstream(SERVICE, format!("outline is not valid JSON: {e}")))?;

    outline.validate().map_err(|e| {
        CourseMindError::upstream(SERVICE, format!("outline rejected: {e}"))
    })?;

    Ok(outline)
}
