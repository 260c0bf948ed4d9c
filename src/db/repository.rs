use rusqlite::params;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::Item;

use super::queries;
use super::schema::SCHEMA;

/// Handle to the on-disk store. Opened once at process start; the schema
/// is ensured idempotently on every open so independently scheduled
/// executions can share one database file.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Run `f` inside one transaction on the connection's worker thread.
    /// Any error aborts the whole transaction; no partial writes persist.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let value = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let id = id.to_string();
        let item = self
            .conn
            .call(move |conn| Ok(queries::get_item(conn, &id)?))
            .await?;
        Ok(item)
    }

    /// Single-statement write used by the backfill worker after the
    /// reconcile transaction has already committed. Atomic on its own, so
    /// interrupting the backfill phase between items leaves no partial
    /// per-item state.
    pub async fn update_content(&self, id: &str, content: &str) -> Result<()> {
        let id = id.to_string();
        let content = content.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE items SET content = ?1 WHERE id = ?2",
                    params![content, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn run_count(&self) -> Result<i64> {
        let count = self.conn.call(|conn| Ok(queries::run_count(conn)?)).await?;
        Ok(count)
    }
}
