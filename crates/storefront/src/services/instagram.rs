//! Instagram Graph API client for the home-page feed.
//!
//! One read operation: recent media, filtered to exclude video content and,
//! when an allow-list is configured, to the curated post ids. Feed failures
//! degrade to an empty strip; they never fail a page render.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::InstagramConfig;

/// Instagram Graph API base URL.
const BASE_URL: &str = "https://graph.instagram.com";

/// Media fields requested from the API.
const MEDIA_FIELDS: &str = "id,media_type,media_url,permalink,caption,timestamp";

/// Errors that can occur when interacting with the Instagram API.
#[derive(Debug, Error)]
pub enum InstagramError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A feed media item.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub media_type: String,
    pub media_url: String,
    pub permalink: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    data: Vec<MediaItem>,
}

/// Instagram Graph API client.
#[derive(Clone)]
pub struct InstagramClient {
    client: reqwest::Client,
    access_token: String,
    allowed_posts: Vec<String>,
}

impl InstagramClient {
    /// Create a new Instagram API client.
    #[must_use]
    pub fn new(config: &InstagramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: config.access_token.expose_secret().to_string(),
            allowed_posts: config.allowed_posts.clone(),
        }
    }

    /// Fetch recent media, excluding videos and honoring the allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response cannot be
    /// parsed.
    #[instrument(skip(self))]
    pub async fn recent_media(&self, limit: usize) -> Result<Vec<MediaItem>, InstagramError> {
        let url = format!(
            "{BASE_URL}/me/media?fields={MEDIA_FIELDS}&access_token={}",
            urlencoding::encode(&self.access_token)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InstagramError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let media: MediaResponse = response
            .json()
            .await
            .map_err(|e| InstagramError::Parse(e.to_string()))?;

        Ok(filter_media(media.data, &self.allowed_posts, limit))
    }
}

/// Apply the feed policy: no videos, allow-listed ids only (when configured),
/// newest first, capped at `limit`.
fn filter_media(items: Vec<MediaItem>, allowed: &[String], limit: usize) -> Vec<MediaItem> {
    let mut items: Vec<MediaItem> = items
        .into_iter()
        .filter(|item| item.media_type != "VIDEO")
        .filter(|item| allowed.is_empty() || allowed.contains(&item.id))
        .collect();
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    items.truncate(limit);
    items
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn media(id: &str, media_type: &str, timestamp: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            media_type: media_type.to_string(),
            media_url: format!("https://cdn.example/{id}.jpg"),
            permalink: format!("https://instagram.com/p/{id}"),
            caption: None,
            timestamp: timestamp.parse().unwrap(),
        }
    }

    #[test]
    fn videos_are_excluded() {
        let items = vec![
            media("a", "IMAGE", "2026-07-01T10:00:00Z"),
            media("b", "VIDEO", "2026-07-02T10:00:00Z"),
            media("c", "CAROUSEL_ALBUM", "2026-07-03T10:00:00Z"),
        ];

        let filtered = filter_media(items, &[], 10);
        let ids: Vec<&str> = filtered.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn allow_list_restricts_ids_when_configured() {
        let items = vec![
            media("a", "IMAGE", "2026-07-01T10:00:00Z"),
            media("b", "IMAGE", "2026-07-02T10:00:00Z"),
        ];
        let allowed = vec!["b".to_string()];

        let filtered = filter_media(items, &allowed, 10);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.first().unwrap().id, "b");
    }

    #[test]
    fn results_are_newest_first_and_capped() {
        let items = vec![
            media("old", "IMAGE", "2026-01-01T00:00:00Z"),
            media("new", "IMAGE", "2026-07-01T00:00:00Z"),
            media("mid", "IMAGE", "2026-04-01T00:00:00Z"),
        ];

        let filtered = filter_media(items, &[], 2);
        let ids: Vec<&str> = filtered.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }
}
