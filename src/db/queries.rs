//! Per-statement operations over a raw connection. These are plain
//! functions so the reconciler can compose them inside one transaction
//! (`rusqlite::Transaction` derefs to `Connection`).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Item, NewItem, Run};

/// Canonical timestamp format for the `first_seen`/`last_seen`/`run_time`
/// columns. Removal detection compares these as TEXT, so every writer
/// must go through this helper.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

pub fn get_item(conn: &Connection, id: &str) -> rusqlite::Result<Option<Item>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, link, author, published, thumbnail, content, first_seen, last_seen
         FROM items WHERE id = ?1",
    )?;
    stmt.query_row(params![id], |row| Ok(item_from_row(row)))
        .optional()
}

pub fn insert_item(conn: &Connection, record: &NewItem, now: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO items (id, title, link, author, published, thumbnail, content, first_seen, last_seen)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
        params![
            record.id,
            record.title,
            record.link,
            record.author,
            record.published.map(|dt| dt.to_rfc3339()),
            record.thumbnail,
            record.content,
            format_ts(now),
        ],
    )?;
    Ok(())
}

/// Restamp `last_seen` and overwrite the fields the batch supplied.
/// Optional fields the batch omitted keep their stored value, so a
/// backfilled `content` survives later sightings. `first_seen` is never
/// touched.
pub fn touch_item(conn: &Connection, record: &NewItem, now: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        r#"UPDATE items SET
               title = ?2,
               link = ?3,
               author = COALESCE(?4, author),
               published = COALESCE(?5, published),
               thumbnail = COALESCE(?6, thumbnail),
               content = COALESCE(?7, content),
               last_seen = ?8
           WHERE id = ?1"#,
        params![
            record.id,
            record.title,
            record.link,
            record.author,
            record.published.map(|dt| dt.to_rfc3339()),
            record.thumbnail,
            record.content,
            format_ts(now),
        ],
    )?;
    Ok(())
}

pub fn append_run(conn: &Connection, at: DateTime<Utc>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO runs (run_time) VALUES (?1)",
        params![format_ts(at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_run(conn: &Connection) -> rusqlite::Result<Option<Run>> {
    let mut stmt =
        conn.prepare("SELECT run_id, run_time FROM runs ORDER BY run_id DESC LIMIT 1")?;
    stmt.query_row([], |row| Ok(run_from_row(row))).optional()
}

pub fn run_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))
}

/// Items stamped with exactly this timestamp. Used with the previous
/// run's `run_time` to find items that were present last run but not
/// this one.
pub fn items_with_last_seen(conn: &Connection, at: DateTime<Utc>) -> rusqlite::Result<Vec<Item>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, link, author, published, thumbnail, content, first_seen, last_seen
         FROM items WHERE last_seen = ?1 ORDER BY id",
    )?;
    let items = stmt
        .query_map(params![format_ts(at)], |row| Ok(item_from_row(row)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

fn item_from_row(row: &Row) -> Item {
    Item {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        link: row.get(2).unwrap(),
        author: row.get(3).unwrap(),
        published: row
            .get::<_, Option<String>>(4)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        thumbnail: row.get(5).unwrap(),
        content: row.get(6).unwrap(),
        first_seen: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        last_seen: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn run_from_row(row: &Row) -> Run {
    Run {
        run_id: row.get(0).unwrap(),
        run_time: row
            .get::<_, String>(1)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_roundtrips_exactly() {
        let now = Utc::now();
        let text = format_ts(now);
        let parsed = parse_datetime(&text).unwrap();
        // Stored precision is microseconds; a second trip must be stable.
        assert_eq!(format_ts(parsed), text);
    }

    #[test]
    fn parses_sqlite_datetime_format() {
        let parsed = parse_datetime("2026-01-11 12:34:56").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-11T12:34:56+00:00");
    }
}
