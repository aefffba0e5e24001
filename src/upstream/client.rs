use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::models::{today, Record};

use super::rate_limiter::RateLimiter;
use super::transport::{ApodQuery, ApodTransport, RawResponse};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const MAX_RANDOM_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ApodPayload {
    date: NaiveDate,
    title: String,
    explanation: String,
    url: Option<String>,
    hdurl: Option<String>,
    media_type: String,
    copyright: Option<String>,
    thumbnail_url: Option<String>,
}

impl ApodPayload {
    fn into_record(self) -> Result<Record> {
        let media_kind = self.media_type.parse()?;
        let primary_url = self.url.ok_or_else(|| {
            AppError::UpstreamMalformed(format!("record for {} has no url", self.date))
        })?;

        Ok(Record {
            date: self.date,
            title: self.title,
            body: self.explanation,
            primary_url,
            hd_url: self.hdurl,
            media_kind,
            attribution: self.copyright.map(|c| c.trim().to_string()),
            thumbnail_url: self.thumbnail_url,
            fetched_at: Utc::now(),
        })
    }
}

/// How an upstream reply should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    RateLimited(Duration),
    Failed(u16),
}

fn classify(response: &RawResponse) -> Verdict {
    match response.status {
        200..=299 => Verdict::Success,
        429 => Verdict::RateLimited(retry_after(response.retry_after.as_deref())),
        status => Verdict::Failed(status),
    }
}

/// Seconds from a `Retry-After` header, 60 when missing or unparseable.
fn retry_after(header: Option<&str>) -> Duration {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Rate-limited access to the upstream picture API.
pub struct ApodClient {
    transport: Arc<dyn ApodTransport>,
    limiter: RateLimiter,
}

impl ApodClient {
    pub fn new(transport: Arc<dyn ApodTransport>, limiter: RateLimiter) -> Self {
        Self { transport, limiter }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn fetch_by_date(&self, date: NaiveDate) -> Result<Record> {
        info!("Fetching picture for {} from upstream", date);
        let body = match self.exchange(ApodQuery::Date(date)).await {
            Err(AppError::UpstreamStatus { status: 404 }) => {
                return Err(AppError::NotFound(format!("no picture published for {}", date)));
            }
            other => other?,
        };
        let payload: ApodPayload = serde_json::from_slice(&body)
            .map_err(|e| AppError::UpstreamMalformed(e.to_string()))?;
        let record = payload.into_record()?;
        if record.date != date {
            return Err(AppError::UpstreamMalformed(format!(
                "asked for {} but received the record for {}",
                date, record.date
            )));
        }
        Ok(record)
    }

    pub async fn fetch_today(&self) -> Result<Record> {
        self.fetch_by_date(today()).await
    }

    pub async fn fetch_random(&self, count: u32) -> Result<Vec<Record>> {
        let count = u8::try_from(count)
            .ok()
            .filter(|c| (1..=MAX_RANDOM_COUNT).contains(&u32::from(*c)))
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "Count must be between 1 and {}, got {}",
                    MAX_RANDOM_COUNT, count
                ))
            })?;

        info!("Fetching {} random pictures from upstream", count);
        let body = self.exchange(ApodQuery::Random(count)).await?;
        let payloads: Vec<ApodPayload> = serde_json::from_slice(&body)
            .map_err(|e| AppError::UpstreamMalformed(e.to_string()))?;
        payloads.into_iter().map(ApodPayload::into_record).collect()
    }

    /// One gated round trip. The permit is held through any Retry-After wait.
    async fn exchange(&self, query: ApodQuery) -> Result<Vec<u8>> {
        let _permit = self.limiter.acquire().await;
        let response = self.transport.get(query).await?;

        match classify(&response) {
            Verdict::Success => Ok(response.body),
            Verdict::RateLimited(wait) => {
                warn!("Upstream rate limit exceeded, waiting {:?} before giving up", wait);
                sleep(wait).await;
                Err(AppError::RateLimited)
            }
            Verdict::Failed(status) => {
                error!("Upstream returned HTTP {} for {:?}", status, query);
                Err(AppError::UpstreamStatus { status })
            }
        }
    }
}
