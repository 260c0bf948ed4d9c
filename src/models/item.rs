use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tracked feed entry as persisted in the store.
///
/// `first_seen` is written once when the item is first sighted and never
/// changes afterwards; `last_seen` is restamped on every run the item
/// appears in. Rows are never deleted because an item dropped out of the
/// feed — "removed" is derived from run history, not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub content: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A feed entry as it arrives from the fetcher, before it has any
/// sighting history attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub content: Option<String>,
}
