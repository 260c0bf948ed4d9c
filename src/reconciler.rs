use std::collections::HashMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rusqlite::Transaction;

use crate::db::{queries, Repository};
use crate::error::Result;
use crate::models::{Item, NewItem, Reconciliation};

/// Compares a freshly fetched batch against durable history and classifies
/// every tracked item as new, updated or removed. Sole writer of the
/// `items` and `runs` tables.
pub struct Reconciler {
    repo: Repository,
}

impl Reconciler {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Classify one fetched batch in a single transaction. Either the
    /// item writes and the new run row all commit together, or none do.
    pub async fn reconcile(&self, fetched: Vec<NewItem>) -> Result<Reconciliation> {
        self.repo
            .transaction(move |tx| reconcile_batch(tx, fetched))
            .await
    }
}

fn reconcile_batch(
    tx: &Transaction<'_>,
    fetched: Vec<NewItem>,
) -> rusqlite::Result<Reconciliation> {
    let previous = queries::latest_run(tx)?;
    let now = effective_now(previous.as_ref().map(|r| r.run_time));

    // Duplicate ids within one batch collapse, last record wins.
    let mut by_id: HashMap<String, NewItem> = HashMap::new();
    for record in fetched {
        by_id.insert(record.id.clone(), record);
    }

    let mut new_items = Vec::new();
    let mut updated = Vec::new();

    for record in by_id.into_values() {
        match queries::get_item(tx, &record.id)? {
            None => {
                queries::insert_item(tx, &record, now)?;
                new_items.push(first_sighting(record, now));
            }
            Some(existing) => {
                queries::touch_item(tx, &record, now)?;
                // An item absent from the previous run reappearing now is a
                // rediscovery: reported as new again, but it keeps its
                // original first_seen.
                let rediscovered = previous
                    .as_ref()
                    .is_some_and(|run| existing.last_seen < run.run_time);
                let merged = merge_sighting(existing, record, now);
                if rediscovered {
                    new_items.push(merged);
                } else {
                    updated.push(merged);
                }
            }
        }
    }

    queries::append_run(tx, now)?;

    // Items stamped with exactly the previous run's time were present last
    // run but not this one. Anything that vanished earlier already aged
    // out of this comparison window and is not reported again.
    let removed = match previous {
        Some(run) => queries::items_with_last_seen(tx, run.run_time)?,
        None => Vec::new(),
    };

    Ok(Reconciliation {
        new: new_items,
        updated,
        removed,
    })
}

/// Wall clock truncated to stored precision, clamped strictly above the
/// latest recorded run so `run_time` stays increasing even if the host
/// clock regresses between executions.
fn effective_now(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let wall = Utc::now();
    let wall = wall
        .duration_trunc(TimeDelta::microseconds(1))
        .unwrap_or(wall);
    match latest {
        Some(prev) if wall <= prev => prev + TimeDelta::microseconds(1),
        _ => wall,
    }
}

fn first_sighting(record: NewItem, now: DateTime<Utc>) -> Item {
    Item {
        id: record.id,
        title: record.title,
        link: record.link,
        author: record.author,
        published: record.published,
        thumbnail: record.thumbnail,
        content: record.content,
        first_seen: now,
        last_seen: now,
    }
}

/// In-memory mirror of `queries::touch_item`: fields the batch omitted
/// keep their stored value.
fn merge_sighting(existing: Item, record: NewItem, now: DateTime<Utc>) -> Item {
    Item {
        id: existing.id,
        title: record.title,
        link: record.link,
        author: record.author.or(existing.author),
        published: record.published.or(existing.published),
        thumbnail: record.thumbnail.or(existing.thumbnail),
        content: record.content.or(existing.content),
        first_seen: existing.first_seen,
        last_seen: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Reconciler, Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (Reconciler::new(repo.clone()), repo, dir)
    }

    fn record(id: &str, title: &str) -> NewItem {
        NewItem {
            id: id.to_string(),
            title: title.to_string(),
            link: format!("https://example.com/{id}"),
            author: None,
            published: None,
            thumbnail: None,
            content: None,
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        let mut ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn first_run_has_no_removed() {
        let (reconciler, _repo, _dir) = setup().await;
        let outcome = reconciler
            .reconcile(vec![record("a", "A"), record("b", "B")])
            .await
            .unwrap();
        assert_eq!(ids(&outcome.new), vec!["a", "b"]);
        assert!(outcome.updated.is_empty());
        assert!(outcome.removed.is_empty());
    }

    #[tokio::test]
    async fn identical_batch_twice_is_idempotent() {
        let (reconciler, _repo, _dir) = setup().await;
        let batch = vec![record("a", "A"), record("b", "B")];
        reconciler.reconcile(batch.clone()).await.unwrap();
        let second = reconciler.reconcile(batch).await.unwrap();
        assert!(second.new.is_empty());
        assert_eq!(ids(&second.updated), vec!["a", "b"]);
        assert!(second.removed.is_empty());
    }

    #[tokio::test]
    async fn vanished_item_is_reported_removed_exactly_once() {
        let (reconciler, _repo, _dir) = setup().await;
        reconciler
            .reconcile(vec![record("a", "A"), record("b", "B")])
            .await
            .unwrap();

        let second = reconciler.reconcile(vec![record("a", "A")]).await.unwrap();
        assert!(second.new.is_empty());
        assert_eq!(ids(&second.updated), vec!["a"]);
        assert_eq!(ids(&second.removed), vec!["b"]);

        // One run later the comparison window has moved on; b is silent.
        let third = reconciler.reconcile(vec![record("a", "A")]).await.unwrap();
        assert!(third.removed.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_on_empty_store_still_logs_a_run() {
        let (reconciler, repo, _dir) = setup().await;
        let outcome = reconciler.reconcile(Vec::new()).await.unwrap();
        assert!(outcome.is_quiet());
        assert_eq!(repo.run_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_batch_marks_everything_tracked_as_removed() {
        let (reconciler, _repo, _dir) = setup().await;
        reconciler
            .reconcile(vec![record("a", "A"), record("b", "B")])
            .await
            .unwrap();
        let outcome = reconciler.reconcile(Vec::new()).await.unwrap();
        assert_eq!(ids(&outcome.removed), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn first_seen_is_set_once_and_immutable() {
        let (reconciler, repo, _dir) = setup().await;
        reconciler.reconcile(vec![record("a", "A")]).await.unwrap();
        let original = repo.get_item("a").await.unwrap().unwrap();

        reconciler.reconcile(vec![record("a", "A2")]).await.unwrap();
        reconciler.reconcile(vec![record("a", "A3")]).await.unwrap();

        let latest = repo.get_item("a").await.unwrap().unwrap();
        assert_eq!(latest.first_seen, original.first_seen);
        assert_eq!(latest.title, "A3");
        assert!(latest.first_seen <= latest.last_seen);
        assert!(latest.last_seen > original.last_seen);
    }

    #[tokio::test]
    async fn duplicate_ids_collapse_to_last_record() {
        let (reconciler, repo, _dir) = setup().await;
        let outcome = reconciler
            .reconcile(vec![record("a", "first"), record("a", "second")])
            .await
            .unwrap();
        // Classified once, persisted once, last record wins.
        assert_eq!(outcome.new.len(), 1);
        assert!(outcome.updated.is_empty());
        let stored = repo.get_item("a").await.unwrap().unwrap();
        assert_eq!(stored.title, "second");
    }

    #[tokio::test]
    async fn rediscovered_item_is_new_again_with_history_intact() {
        let (reconciler, repo, _dir) = setup().await;
        reconciler.reconcile(vec![record("p1", "A")]).await.unwrap();
        let original = repo.get_item("p1").await.unwrap().unwrap();

        let gone = reconciler.reconcile(Vec::new()).await.unwrap();
        assert_eq!(ids(&gone.removed), vec!["p1"]);

        let back = reconciler.reconcile(vec![record("p1", "A")]).await.unwrap();
        assert_eq!(ids(&back.new), vec!["p1"]);
        assert!(back.updated.is_empty());
        assert!(back.removed.is_empty());

        let stored = repo.get_item("p1").await.unwrap().unwrap();
        assert_eq!(stored.first_seen, original.first_seen);
    }

    #[tokio::test]
    async fn later_sighting_keeps_backfilled_content() {
        let (reconciler, repo, _dir) = setup().await;
        reconciler.reconcile(vec![record("a", "A")]).await.unwrap();
        repo.update_content("a", "full article text").await.unwrap();

        // The feed batch carries no content of its own.
        reconciler.reconcile(vec![record("a", "A")]).await.unwrap();

        let stored = repo.get_item("a").await.unwrap().unwrap();
        assert_eq!(stored.content.as_deref(), Some("full article text"));
    }

    #[tokio::test]
    async fn classified_ids_match_batch_ids_exactly() {
        let (reconciler, _repo, _dir) = setup().await;
        reconciler
            .reconcile(vec![record("a", "A"), record("b", "B")])
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(vec![record("b", "B"), record("c", "C")])
            .await
            .unwrap();

        let mut classified: Vec<&str> = outcome
            .new
            .iter()
            .chain(outcome.updated.iter())
            .map(|i| i.id.as_str())
            .collect();
        classified.sort();
        assert_eq!(classified, vec!["b", "c"]);
    }

    #[test]
    fn effective_now_clamps_a_regressed_clock() {
        let future = Utc::now() + TimeDelta::days(1);
        let clamped = effective_now(Some(future));
        assert_eq!(clamped, future + TimeDelta::microseconds(1));
    }
}
