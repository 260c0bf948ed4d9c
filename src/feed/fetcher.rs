use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::NewItem;

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch and decode the feed into a batch of item records. Non-2xx
    /// responses are transport failures; undecodable payloads are parse
    /// failures, so the caller can decide whether to trust an empty batch.
    pub async fn fetch(&self, url: &str) -> Result<Vec<NewItem>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "failed to fetch feed: HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        Ok(items_from_feed(feed))
    }
}

/// Map decoded entries onto item records. Entries without a stable id are
/// dropped: nothing without an id can be tracked across runs.
fn items_from_feed(feed: feed_rs::model::Feed) -> Vec<NewItem> {
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            if entry.id.is_empty() {
                tracing::debug!("skipping feed entry without id");
                return None;
            }

            // Try content first, then fall back to summary
            let content = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

            let thumbnail = entry
                .media
                .first()
                .and_then(|m| m.thumbnails.first())
                .map(|t| t.image.uri.clone());

            Some(NewItem {
                id: entry.id,
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Untitled".to_string()),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                author: entry.authors.first().map(|a| a.name.clone()),
                published: entry.published.or(entry.updated),
                thumbnail,
                content,
            })
        })
        .collect()
}
