use std::time::Duration;

use crate::backfill::{BackfillWorker, RateGate};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedFetcher;
use crate::models::{Item, Reconciliation};
use crate::notify::{Dispatcher, JsonLinesNotifier, LogNotifier, Notifier};
use crate::reconciler::Reconciler;

/// Wires the poll cycle together: fetch, reconcile, backfill, notify.
pub struct App {
    config: Config,
    repo: Repository,
    fetcher: FeedFetcher,
    reconciler: Reconciler,
    backfill: BackfillWorker,
    dispatcher: Dispatcher,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repo = Repository::new(&config.db_path).await?;
        let timeout = Duration::from_secs(config.http_timeout_secs);

        let fetcher = FeedFetcher::new(&config.user_agent, timeout);
        let reconciler = Reconciler::new(repo.clone());
        let backfill = BackfillWorker::new(
            repo.clone(),
            &config.user_agent,
            timeout,
            RateGate::new(
                config.backfill_min_delay_secs,
                config.backfill_max_delay_secs,
            ),
        );

        let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
        if !config.notify_file.is_empty() {
            notifiers.push(Box::new(JsonLinesNotifier::new(&config.notify_file)));
        }
        let dispatcher = Dispatcher::new(notifiers);

        Ok(Self {
            config: config.clone(),
            repo,
            fetcher,
            reconciler,
            backfill,
            dispatcher,
        })
    }

    /// One full poll cycle. A transport failure skips the run with no
    /// state mutated; a parse failure does the same unless the config opts
    /// into treating it as an empty batch.
    pub async fn poll_once(&self, backfill_enabled: bool) -> Result<Reconciliation> {
        let batch = match self.fetcher.fetch(&self.config.feed_url).await {
            Ok(batch) => batch,
            Err(err @ AppError::Parse(_)) if !self.config.treat_parse_failure_as_empty => {
                return Err(err);
            }
            Err(AppError::Parse(e)) => {
                tracing::warn!(
                    "feed payload unreadable, reconciling an empty batch: {}",
                    e
                );
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        tracing::debug!("fetched {} entries", batch.len());
        let outcome = self.reconciler.reconcile(batch).await?;
        tracing::info!(
            new = outcome.new.len(),
            updated = outcome.updated.len(),
            removed = outcome.removed.len(),
            "reconcile complete"
        );

        let new_items = if backfill_enabled && !outcome.new.is_empty() {
            let filled = self.backfill.enrich(&outcome.new).await;
            tracing::info!("backfilled {}/{} new items", filled.len(), outcome.new.len());
            self.reload(&outcome.new).await?
        } else {
            outcome.new.clone()
        };

        self.dispatcher.dispatch(&new_items, &outcome.removed);

        Ok(outcome)
    }

    /// Re-read the new set so notifications carry backfilled content.
    async fn reload(&self, items: &[Item]) -> Result<Vec<Item>> {
        let mut fresh = Vec::with_capacity(items.len());
        for item in items {
            match self.repo.get_item(&item.id).await? {
                Some(row) => fresh.push(row),
                None => fresh.push(item.clone()),
            }
        }
        Ok(fresh)
    }
}
