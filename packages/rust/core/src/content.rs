//! Topic content generation: theory text plus one accompanying media item.
//!
//! Every invocation issues exactly two calls concurrently: theory generation
//! and either video search (`VIDEO_TEXT`) or image search (`TEXT_IMAGE`).
//! Each call runs under its own deadline. A failing or timed-out text or
//! video call fails the whole generation and cancels its sibling; image
//! search degrades to the placeholder instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use coursemind_providers::{
    ImageSearch, ImageSearchOutcome, TextGenerator, TheoryRequest, VideoSearch,
};
use coursemind_shared::{AppConfig, ContentMode, CourseMindError, ImageRef, Result};

/// Runtime settings for content generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Deadline applied to each external call.
    pub request_timeout: Duration,
    /// Upper bound on topics generated at once by course-wide runs.
    pub max_concurrent_topics: usize,
    /// Image used when image search times out.
    pub placeholder_url: String,
}

impl GeneratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            request_timeout: config.generation.request_timeout(),
            max_concurrent_topics: config.generation.max_concurrent_topics.max(1) as usize,
            placeholder_url: config.unsplash.placeholder_url.clone(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// Everything needed to generate one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicContext {
    pub title: String,
    pub description: Option<String>,
    pub chapter_title: String,
    pub language: String,
    pub mode: ContentMode,
}

impl TopicContext {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CourseMindError::validation("topic title must not be empty"));
        }
        if self.chapter_title.trim().is_empty() {
            return Err(CourseMindError::validation("chapter title must not be empty"));
        }
        if self.language.trim().is_empty() {
            return Err(CourseMindError::validation("language must not be empty"));
        }
        Ok(())
    }

    fn theory_request(&self) -> TheoryRequest {
        TheoryRequest {
            title: self.title.clone(),
            description: self.description.clone().unwrap_or_default(),
            chapter_title: self.chapter_title.clone(),
            language: self.language.clone(),
        }
    }

    fn media_query(&self) -> String {
        let suffix = match self.mode {
            ContentMode::VideoText => "tutorial",
            ContentMode::TextImage => "example",
        };
        format!("{} {} {suffix}", self.title, self.chapter_title)
    }
}

/// Ready-to-store content for one topic.
///
/// Exactly one of `video_id` / `image` can be set, matching the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub theory_html: String,
    pub video_id: Option<String>,
    pub image: Option<ImageRef>,
}

/// Composes text generation, media search and Markdown rendering.
#[derive(Clone)]
pub struct TopicContentGenerator {
    text: Arc<dyn TextGenerator>,
    videos: Arc<dyn VideoSearch>,
    images: Arc<dyn ImageSearch>,
    config: GeneratorConfig,
}

impl TopicContentGenerator {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        videos: Arc<dyn VideoSearch>,
        images: Arc<dyn ImageSearch>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            text,
            videos,
            images,
            config,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate theory and media for one topic.
    #[instrument(skip_all, fields(topic = %context.title, mode = %context.mode))]
    pub async fn generate(&self, context: &TopicContext) -> Result<GeneratedContent> {
        context.validate()?;

        let request = context.theory_request();
        let query = context.media_query();

        match context.mode {
            ContentMode::VideoText => {
                let (markdown, video_id) =
                    tokio::try_join!(self.theory(&request), self.first_video(&query))?;
                debug!(has_video = video_id.is_some(), "topic generated");
                Ok(GeneratedContent {
                    theory_html: coursemind_markdown::to_html(&markdown),
                    video_id,
                    image: None,
                })
            }
            ContentMode::TextImage => {
                let (markdown, image) = tokio::try_join!(self.theory(&request), async {
                    Ok::<_, CourseMindError>(self.first_image(&query).await)
                })?;
                debug!(fallback = image.is_fallback(), "topic generated");
                Ok(GeneratedContent {
                    theory_html: coursemind_markdown::to_html(&markdown),
                    video_id: None,
                    image: Some(image),
                })
            }
        }
    }

    async fn theory(&self, request: &TheoryRequest) -> Result<String> {
        with_deadline(
            "text generation",
            self.config.request_timeout,
            self.text.generate_theory(request),
        )
        .await
    }

    async fn first_video(&self, query: &str) -> Result<Option<String>> {
        let hits = with_deadline(
            "video search",
            self.config.request_timeout,
            self.videos.search_videos(query, 1),
        )
        .await?;
        Ok(hits.into_iter().next().map(|hit| hit.id))
    }

    async fn first_image(&self, query: &str) -> ImageRef {
        match tokio::time::timeout(self.config.request_timeout, self.images.search_images(query, 1))
            .await
        {
            Ok(outcome) => {
                let image = outcome.into_image_ref();
                if image.url().trim().is_empty() {
                    warn!(query, "image search returned no usable url, using placeholder");
                    ImageSearchOutcome::placeholder(&self.config.placeholder_url).into_image_ref()
                } else {
                    image
                }
            }
            Err(_) => {
                warn!(query, "image search timed out, using placeholder");
                ImageSearchOutcome::placeholder(&self.config.placeholder_url).into_image_ref()
            }
        }
    }
}

/// Run `call` under `deadline`, turning expiry into an upstream failure.
async fn with_deadline<T>(
    service: &'static str,
    deadline: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(CourseMindError::upstream(
            service,
            format!("timed out after {}ms", deadline.as_millis()),
        )),
    }
}
