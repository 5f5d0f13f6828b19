//! Third-party collaborators consumed by content generation.
//!
//! This crate provides:
//! - The collaborator traits ([`TextGenerator`], [`OutlineGenerator`],
//!   [`VideoSearch`], [`ImageSearch`])
//! - [`GeminiClient`]: theory and outline generation via the Gemini API
//! - [`YouTubeClient`]: video search via the YouTube Data API
//! - [`UnsplashClient`]: image search via Unsplash, with placeholder fallback

pub mod gemini;
mod prompts;
pub mod unsplash;
pub mod youtube;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use coursemind_shared::{CourseMindError, CourseOutline, ImageRef, Result};

pub use gemini::GeminiClient;
pub use unsplash::UnsplashClient;
pub use youtube::YouTubeClient;

/// User-Agent string for outbound API requests.
const USER_AGENT: &str = concat!("CourseMind/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Everything the text generator needs to write one topic's theory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TheoryRequest {
    pub title: String,
    /// Empty when the topic has no description.
    pub description: String,
    pub chapter_title: String,
    pub language: String,
}

/// Ask for a course skeleton on a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineRequest {
    pub subject: String,
    pub chapter_count: u32,
    pub language: String,
}

/// One video search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoHit {
    /// Provider video identifier (e.g. a YouTube video id).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One image search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Outcome of an image search. Image search never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSearchOutcome {
    /// Real results, never empty.
    Found(Vec<ImageHit>),
    /// The search was unconfigured, errored, or came back empty.
    Fallback(ImageHit),
}

impl ImageSearchOutcome {
    /// Wrap search results, degrading to `placeholder` when there are none.
    pub fn from_hits(hits: Vec<ImageHit>, placeholder: &str) -> Self {
        if hits.is_empty() {
            Self::placeholder(placeholder)
        } else {
            Self::Found(hits)
        }
    }

    pub fn placeholder(url: &str) -> Self {
        Self::Fallback(ImageHit {
            url: url.to_string(),
            alt: None,
            author: None,
        })
    }

    /// The image to attach to a topic: the first hit, or the placeholder.
    pub fn into_image_ref(self) -> ImageRef {
        match self {
            Self::Found(hits) => match hits.into_iter().next() {
                Some(hit) => ImageRef::Found(hit.url),
                None => ImageRef::Fallback(String::new()),
            },
            Self::Fallback(hit) => ImageRef::Fallback(hit.url),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Writes a topic's theory as Markdown.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_theory(&self, request: &TheoryRequest) -> Result<String>;
}

/// Drafts a course's chapter/topic skeleton.
#[async_trait]
pub trait OutlineGenerator: Send + Sync {
    async fn generate_outline(&self, request: &OutlineRequest) -> Result<CourseOutline>;
}

/// Searches videos. No results is an empty vec, not an error.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search_videos(&self, query: &str, count: u32) -> Result<Vec<VideoHit>>;
}

/// Searches images; degrades to a placeholder instead of failing.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search_images(&self, query: &str, count: u32) -> ImageSearchOutcome;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the shared user agent and a request timeout.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| CourseMindError::config(format!("failed to build HTTP client: {e}")))
}

/// Join a path onto a configured base URL, tolerating a trailing slash.
fn endpoint(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success response into an upstream error carrying a body excerpt.
async fn error_for_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(CourseMindError::upstream(service, format!("HTTP {status}: {excerpt}")))
}
