pub const SCHEMA: &str = r#"
-- items table: current known state per feed entry, keyed by the feed's
-- own stable id
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    author TEXT,
    published TEXT,
    thumbnail TEXT,
    content TEXT,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_last_seen ON items(last_seen);

-- runs table: append-only log of poll executions, never truncated
CREATE TABLE IF NOT EXISTS runs (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_time TEXT NOT NULL
);
"#;
