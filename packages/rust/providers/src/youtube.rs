//! YouTube Data API v3 video search.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use coursemind_shared::{CourseMindError, Result, YouTubeConfig};

use crate::{VideoHit, VideoSearch, build_client, endpoint, error_for_status};

const SERVICE: &str = "youtube";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<ItemId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: Option<String>,
}

/// Video search backed by `GET /youtube/v3/search`.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    config: YouTubeConfig,
    client: Client,
}

impl YouTubeClient {
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl VideoSearch for YouTubeClient {
    #[instrument(skip_all, fields(query = %query, count))]
    async fn search_videos(&self, query: &str, count: u32) -> Result<Vec<VideoHit>> {
        let url = endpoint(&self.config.base_url, "youtube/v3/search");
        let max_results = count.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, e.to_string()))?;

        let response = error_for_status(SERVICE, response).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, format!("invalid response: {e}")))?;

        let hits: Vec<VideoHit> = parsed
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id?.video_id?;
                Some(VideoHit {
                    id,
                    title: item.snippet.and_then(|s| s.title),
                })
            })
            .collect();

        debug!(hits = hits.len(), "video search complete");
        Ok(hits)
    }
}
