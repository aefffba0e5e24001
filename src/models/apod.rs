use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, InvalidDate};

/// The first day the upstream ever published a picture.
pub const FIRST_RECORD_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1995, 6, 16) {
    Some(date) => date,
    None => panic!("invalid first record date"),
};

pub const FALLBACK_TITLE_PREFIX: &str = "[FALLBACK] ";
pub const FALLBACK_NOTE: &str =
    "Upstream rate limit reached. Showing yesterday's picture as a fallback.\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(AppError::UpstreamMalformed(format!(
                "unsupported media type '{}'",
                other
            ))),
        }
    }
}

/// One calendar date's published picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub date: NaiveDate,
    pub title: String,
    pub body: String,
    pub primary_url: String,
    pub hd_url: Option<String>,
    pub media_kind: MediaKind,
    pub attribution: Option<String>,
    pub thumbnail_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Record {
    /// Re-label a cached record as the stand-in for a day we could not fetch.
    pub fn into_fallback(self) -> Self {
        Self {
            title: format!("{}{}", FALLBACK_TITLE_PREFIX, self.title),
            body: format!("{}{}", FALLBACK_NOTE, self.body),
            ..self
        }
    }
}

/// One page of records, most recent first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_items: u64) -> Self {
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages: total_pages(total_items, page_size),
        }
    }
}

/// An empty cache still reports a single (empty) page.
pub fn total_pages(total_items: u64, page_size: u32) -> u64 {
    if total_items == 0 {
        1
    } else {
        total_items.div_ceil(u64::from(page_size))
    }
}

/// Last successful maintenance pass, kept for observability only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceMark {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn validate_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, InvalidDate> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| InvalidDate::Malformed(raw.to_string()))?;

    if date > today {
        return Err(InvalidDate::InFuture(date));
    }
    if date < FIRST_RECORD_DATE {
        return Err(InvalidDate::BeforeFirstRecord(date));
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn validate_date_accepts_range_bounds() {
        let today = d("2024-03-10");
        assert_eq!(validate_date("1995-06-16", today), Ok(FIRST_RECORD_DATE));
        assert_eq!(validate_date("2024-03-10", today), Ok(today));
    }

    #[test]
    fn validate_date_reasons_are_distinct() {
        let today = d("2024-03-10");
        assert_eq!(
            validate_date("03/10/2024", today),
            Err(InvalidDate::Malformed("03/10/2024".to_string()))
        );
        assert_eq!(
            validate_date("2024-03-11", today),
            Err(InvalidDate::InFuture(d("2024-03-11")))
        );
        assert_eq!(
            validate_date("1995-06-15", today),
            Err(InvalidDate::BeforeFirstRecord(d("1995-06-15")))
        );
    }

    #[test]
    fn total_pages_rounds_up_and_never_hits_zero() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(30, 10), 3);
        assert_eq!(total_pages(1, 100), 1);
    }

    #[test]
    fn fallback_prefixes_title_and_body() {
        let record = Record {
            date: d("2024-03-09"),
            title: "Orion".to_string(),
            body: "A nebula.".to_string(),
            primary_url: "https://example.com/orion.jpg".to_string(),
            hd_url: None,
            media_kind: MediaKind::Image,
            attribution: None,
            thumbnail_url: None,
            fetched_at: Utc::now(),
        };

        let fallback = record.into_fallback();
        assert_eq!(fallback.title, "[FALLBACK] Orion");
        assert!(fallback.body.starts_with(FALLBACK_NOTE));
        assert!(fallback.body.ends_with("A nebula."));
        assert_eq!(fallback.date, d("2024-03-09"));
    }

    #[test]
    fn media_kind_rejects_unknown_values() {
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("other".parse::<MediaKind>().is_err());
    }
}
