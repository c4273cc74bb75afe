//! Where rule feeds come from: inline page data or an HTTP endpoint.

use async_trait::async_trait;
use novasound_shared::{FeedError, SoundFeeds};
use reqwest::Client;

/// A source of rule feeds, consulted at startup and on every reload.
#[async_trait(?Send)]
pub trait FeedSource {
    async fn fetch(&self) -> Result<SoundFeeds, FeedError>;
}

/// Feeds known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    feeds: SoundFeeds,
}

impl StaticFeed {
    pub fn new(feeds: SoundFeeds) -> Self {
        Self { feeds }
    }

    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        Ok(Self::new(SoundFeeds::from_json(json)?))
    }
}

#[async_trait(?Send)]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<SoundFeeds, FeedError> {
        Ok(self.feeds.clone())
    }
}

/// Feeds served as JSON by the site.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: Client,
    url: String,
}

impl HttpFeed {
    /// `url` may be relative; it is resolved against `base` (the page location).
    pub fn new(url: &str, base: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            url: resolve(url, base),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn resolve(url: &str, base: Option<&str>) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    base.and_then(|base| url::Url::parse(base).ok())
        .and_then(|base| base.join(url).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| url.to_string())
}

#[async_trait(?Send)]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<SoundFeeds, FeedError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| FeedError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(FeedError::Http { status });
        }
        SoundFeeds::from_json(&text)
    }
}
