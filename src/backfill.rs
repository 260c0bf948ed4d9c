use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use url::Url;

use crate::db::Repository;
use crate::error::Result;
use crate::models::Item;

/// Fixed-interval gate with uniform jitter, kept out of the store layer so
/// waiting never holds a database lock.
pub struct RateGate {
    min_ms: u64,
    max_ms: u64,
}

impl RateGate {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_ms: min_secs * 1000,
            max_ms: max_secs.max(min_secs) * 1000,
        }
    }

    fn jitter(&self) -> Duration {
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    pub async fn wait(&self) {
        tokio::time::sleep(self.jitter()).await;
    }
}

/// Best-effort enrichment of newly discovered items with the full text
/// behind their link. Runs strictly after reconciliation has committed;
/// nothing here can roll a run back.
pub struct BackfillWorker {
    client: Client,
    repo: Repository,
    gate: RateGate,
}

impl BackfillWorker {
    pub fn new(repo: Repository, user_agent: &str, timeout: Duration, gate: RateGate) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, repo, gate }
    }

    /// Process items sequentially with a jittered pause between them. Each
    /// item fails independently: a dead link or an unreadable page is
    /// logged and skipped, and the item keeps its pending content. Returns
    /// the ids that were filled.
    pub async fn enrich(&self, items: &[Item]) -> Vec<String> {
        let mut filled = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.gate.wait().await;
            }

            let content = match self.fetch_detail(&item.link).await {
                Ok(Some(text)) => text,
                Ok(None) => {
                    tracing::debug!("no usable content at {}", item.link);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("backfill failed for {}: {}", item.id, e);
                    continue;
                }
            };

            match self.repo.update_content(&item.id, &content).await {
                Ok(()) => filled.push(item.id.clone()),
                Err(e) => tracing::warn!("could not persist content for {}: {}", item.id, e),
            }
        }

        filled
    }

    async fn fetch_detail(&self, link: &str) -> Result<Option<String>> {
        if Url::parse(link).is_err() {
            return Ok(None);
        }

        let response = self.client.get(link).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", link, response.status());
            return Ok(None);
        }

        let html = response.text().await?;
        Ok(extract_content(&html))
    }
}

/// Extract readable content from HTML using html2text
fn extract_content(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    // Clean up the text - remove excessive whitespace
    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.len() > 80 {
        Some(cleaned)
    } else {
        tracing::debug!("Extracted content too short ({} chars)", cleaned.len());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::db::queries;
    use crate::models::NewItem;

    fn record(id: &str, link: &str) -> NewItem {
        NewItem {
            id: id.to_string(),
            title: id.to_string(),
            link: link.to_string(),
            author: None,
            published: None,
            thumbnail: None,
            content: None,
        }
    }

    /// Serve one HTTP response with a long enough article body, then hang up.
    async fn spawn_article_server() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let body = format!(
                "<html><body><p>{}</p></body></html>",
                "This deal is still live and ships free. ".repeat(10)
            );
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        addr
    }

    #[tokio::test]
    async fn one_failed_item_does_not_block_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();

        let addr = spawn_article_server().await;
        // Nothing listens on port 1, so the first fetch fails fast.
        let dead = record("dead", "http://127.0.0.1:1/");
        let good = record("good", &format!("http://{addr}/post"));
        let now = chrono::Utc::now();
        let (dead_row, good_row) = (dead.clone(), good.clone());
        repo.transaction(move |tx| {
            queries::insert_item(tx, &dead_row, now)?;
            queries::insert_item(tx, &good_row, now)?;
            Ok(())
        })
        .await
        .unwrap();

        let items = vec![
            repo.get_item("dead").await.unwrap().unwrap(),
            repo.get_item("good").await.unwrap().unwrap(),
        ];
        let worker = BackfillWorker::new(
            repo.clone(),
            "test-agent",
            Duration::from_secs(2),
            RateGate::new(0, 0),
        );

        let filled = worker.enrich(&items).await;
        assert_eq!(filled, vec!["good".to_string()]);

        let good_stored = repo.get_item("good").await.unwrap().unwrap();
        assert!(good_stored.content.unwrap().contains("still live"));
        let dead_stored = repo.get_item("dead").await.unwrap().unwrap();
        assert!(dead_stored.content.is_none());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let gate = RateGate::new(3, 5);
        for _ in 0..100 {
            let delay = gate.jitter();
            assert!(delay >= Duration::from_secs(3));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn degenerate_range_is_tolerated() {
        let gate = RateGate::new(5, 3);
        assert_eq!(gate.jitter(), Duration::from_secs(5));
    }

    #[test]
    fn extracts_text_from_article_html() {
        let html = format!(
            "<html><body><article><p>{}</p><p>{}</p></article></body></html>",
            "This deal is still live and ships free over fifty dollars.",
            "Use the code in the thread for an extra ten percent off."
        );
        let content = extract_content(&html).unwrap();
        assert!(content.contains("still live"));
        assert!(content.contains("ten percent"));
    }

    #[test]
    fn short_pages_yield_no_content() {
        assert!(extract_content("<html><body>hi</body></html>").is_none());
    }
}
