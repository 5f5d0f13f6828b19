//! Unsplash photo search.
//!
//! Image search is best-effort: without an access key, on any failure, or
//! when nothing matches, the configured placeholder is returned.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use coursemind_shared::{CourseMindError, Result, UnsplashConfig};

use crate::{ImageHit, ImageSearch, ImageSearchOutcome, build_client, endpoint, error_for_status};

const SERVICE: &str = "unsplash";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    user: Option<PhotoUser>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoUser {
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UnsplashClient {
    config: UnsplashConfig,
    client: Client,
}

impl UnsplashClient {
    pub fn new(config: UnsplashConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    async fn search(&self, access_key: &str, query: &str, count: u32) -> Result<Vec<ImageHit>> {
        let url = endpoint(&self.config.base_url, "search/photos");
        let per_page = count.to_string();

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Client-ID {access_key}"))
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, e.to_string()))?;

        let response = error_for_status(SERVICE, response).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CourseMindError::upstream(SERVICE, format!("invalid response: {e}")))?;

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|photo| {
                Some(ImageHit {
                    url: photo.urls.regular?,
                    alt: photo.alt_description,
                    author: photo.user.and_then(|u| u.name),
                })
            })
            .collect())
    }
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    #[instrument(skip_all, fields(query = %query, count))]
    async fn search_images(&self, query: &str, count: u32) -> ImageSearchOutcome {
        let Some(access_key) = self.config.access_key.as_deref() else {
            debug!("no access key configured, using placeholder");
            return ImageSearchOutcome::placeholder(&self.config.placeholder_url);
        };

        match self.search(access_key, query, count).await {
            Ok(hits) => {
                if hits.is_empty() {
                    debug!("no images found, using placeholder");
                }
                ImageSearchOutcome::from_hits(hits, &self.config.placeholder_url)
            }
            Err(e) => {
                warn!(error = %e, "image search failed, using placeholder");
                ImageSearchOutcome::placeholder(&self.config.placeholder_url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PLACEHOLDER: &str = "https://placehold.co/test";

    fn client_for(server: &MockServer, key: Option<&str>) -> UnsplashClient {
        UnsplashClient::new(UnsplashConfig {
            access_key: key.map(String::from),
            base_url: url::Url::parse(&server.uri()).unwrap(),
            placeholder_url: PLACEHOLDER.into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_regular_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .and(header("Authorization", "Client-ID us-key"))
            .and(query_param("query", "Binary Search Algorithms example"))
            .and(query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 1,
                "results": [{
                    "urls": {"regular": "https://images.unsplash.com/photo-1", "small": "x"},
                    "alt_description": "a sorted shelf",
                    "user": {"name": "Ada"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server, Some("us-key"))
            .search_images("Binary Search Algorithms example", 1)
            .await;
        assert_eq!(
            outcome,
            ImageSearchOutcome::Found(vec![ImageHit {
                url: "https://images.unsplash.com/photo-1".into(),
                alt: Some("a sorted shelf".into()),
                author: Some("Ada".into()),
            }])
        );
    }

    #[tokio::test]
    async fn empty_results_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server, Some("us-key")).search_images("x", 1).await;
        assert_eq!(outcome, ImageSearchOutcome::placeholder(PLACEHOLDER));
    }

    #[tokio::test]
    async fn server_error_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = client_for(&server, Some("us-key")).search_images("x", 1).await;
        assert_eq!(outcome, ImageSearchOutcome::placeholder(PLACEHOLDER));
    }

    #[tokio::test]
    async fn missing_key_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client_for(&server, None).search_images("x", 1).await;
        assert_eq!(outcome, ImageSearchOutcome::placeholder(PLACEHOLDER));
    }
}
