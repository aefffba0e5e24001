use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{MaintenanceMark, MediaKind, Record};

use super::schema::SCHEMA;

const RECORD_COLUMNS: &str =
    "date, title, explanation, url, hd_url, media_type, copyright, thumbnail_url, fetched_at";

/// Durable date-keyed store of records plus a small metadata table.
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

    // Record operations

    pub async fn get(&self, date: NaiveDate) -> Result<Option<Record>> {
        let record = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM apod WHERE date = ?1",
                    RECORD_COLUMNS
                ))?;
                let record = stmt
                    .query_row(params![date_key(date)], record_from_row)
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    /// Upsert by date.
    pub async fn save(&self, record: Record) -> Result<Record> {
        let saved = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO apod (date, title, explanation, url, hd_url, media_type, copyright, thumbnail_url, fetched_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                       ON CONFLICT(date) DO UPDATE SET
                           title = excluded.title,
                           explanation = excluded.explanation,
                           url = excluded.url,
                           hd_url = excluded.hd_url,
                           media_type = excluded.media_type,
                           copyright = excluded.copyright,
                           thumbnail_url = excluded.thumbnail_url,
                           fetched_at = excluded.fetched_at"#,
                    params![
                        date_key(record.date),
                        record.title,
                        record.body,
                        record.primary_url,
                        record.hd_url,
                        record.media_kind.as_str(),
                        record.attribution,
                        record.thumbnail_url,
                        record.fetched_at.to_rfc3339(),
                    ],
                )?;
                Ok(record)
            })
            .await?;
        Ok(saved)
    }

    pub async fn get_random_image(&self) -> Result<Option<Record>> {
        let record = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM apod WHERE media_type = 'image' ORDER BY RANDOM() LIMIT 1",
                    RECORD_COLUMNS
                ))?;
                let record = stmt.query_row([], record_from_row).optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    /// A slice of the cache ordered most recent first, plus the total row count.
    pub async fn get_page(&self, offset: u64, limit: u32) -> Result<(Vec<Record>, u64)> {
        let page = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row("SELECT COUNT(*) FROM apod", [], |row| row.get(0))?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM apod ORDER BY date DESC LIMIT ?1 OFFSET ?2",
                    RECORD_COLUMNS
                ))?;
                let records = stmt
                    .query_map(params![i64::from(limit), clamp_i64(offset)], record_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((records, total.max(0) as u64))
            })
            .await?;
        Ok(page)
    }

    /// Removes every record dated strictly before `date`.
    pub async fn delete_older_than(&self, date: NaiveDate) -> Result<usize> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM apod WHERE date < ?1", params![date_key(date)])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    /// Inclusive on both ends.
    pub async fn count_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM apod WHERE date >= ?1 AND date <= ?2",
                    params![date_key(start), date_key(end)],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn count_all(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM apod", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    // Metadata

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO cache_metadata (key, value, updated_at)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = excluded.updated_at"#,
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<MaintenanceMark>> {
        let key = key.to_string();
        let mark = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT key, value, updated_at FROM cache_metadata WHERE key = ?1")?;
                let mark = stmt.query_row(params![key], mark_from_row).optional()?;
                Ok(mark)
            })
            .await?;
        Ok(mark)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 is what we write; SQLite's datetime('now') is the column default
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn record_from_row(row: &Row) -> rusqlite::Result<Record> {
    let date: String = row.get(0)?;
    let date =
        NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(0, e))?;
    let media_kind: String = row.get(5)?;
    let media_kind = media_kind
        .parse::<MediaKind>()
        .map_err(|e| conversion_error(5, e))?;

    Ok(Record {
        date,
        title: row.get(1)?,
        body: row.get(2)?,
        primary_url: row.get(3)?,
        hd_url: row.get(4)?,
        media_kind,
        attribution: row.get(6)?,
        thumbnail_url: row.get(7)?,
        fetched_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn mark_from_row(row: &Row) -> rusqlite::Result<MaintenanceMark> {
    Ok(MaintenanceMark {
        key: row.get(0)?,
        value: row.get(1)?,
        updated_at: row
            .get::<_, String>(2)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}
