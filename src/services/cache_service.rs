use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::PacingConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{today, validate_date, MaintenanceMark, Page, Record, FIRST_RECORD_DATE};
use crate::upstream::ApodClient;

pub const MAINTENANCE_MARK_KEY: &str = "daily_maintenance_last_run";

const MAX_PAGE_SIZE: u32 = 100;
const FIRST_RUN_BACKFILL_DAYS: u32 = 30;
const MIN_TOTAL_ROWS: u64 = 50;
const RECENT_WINDOW_DAYS: u64 = 30;
const MIN_RECENT_ROWS: u64 = 25;

/// What one maintenance pass managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub today_cached: bool,
    pub evicted: usize,
    pub added: usize,
    pub completed: bool,
}

/// Serves records from the cache and falls back to the upstream on a miss.
pub struct CacheService {
    repository: Repository,
    client: ApodClient,
    retention_days: u32,
    pacing: PacingConfig,
}

impl CacheService {
    pub fn new(
        repository: Repository,
        client: ApodClient,
        retention_days: u32,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            repository,
            client,
            retention_days,
            pacing,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn client(&self) -> &ApodClient {
        &self.client
    }

    pub async fn get_today(&self) -> Result<Record> {
        let today = today();
        if let Some(record) = self.repository.get(today).await? {
            info!("Returning today's picture from cache");
            return Ok(record);
        }

        match self.fetch_and_store(today).await {
            Err(AppError::RateLimited) => {
                warn!("Rate limit hit when fetching today's picture, trying yesterday's as fallback");
                let yesterday = days_before(today, 1);
                match self.repository.get(yesterday).await? {
                    Some(record) => Ok(record.into_fallback()),
                    None => Err(AppError::RateLimited),
                }
            }
            other => other,
        }
    }

    pub async fn get_by_date(&self, raw: &str) -> Result<Record> {
        let date = validate_date(raw, today())?;

        if let Some(record) = self.repository.get(date).await? {
            info!("Returning picture for {} from cache", date);
            return Ok(record);
        }
        self.fetch_and_store(date).await
    }

    pub async fn get_random(&self) -> Result<Record> {
        if let Some(record) = self.repository.get_random_image().await? {
            info!("Returning random picture from cache");
            return Ok(record);
        }

        info!("Cache is empty, fetching a random picture from upstream");
        let mut records = self.client.fetch_random(1).await?;
        let mut record = records
            .pop()
            .ok_or_else(|| AppError::UpstreamMalformed("empty random sample".to_string()))?;
        record.fetched_at = Utc::now();
        self.repository.save(record).await
    }

    pub async fn get_history(&self, page: u32, page_size: u32) -> Result<Page<Record>> {
        if page == 0 {
            return Err(AppError::InvalidArgument(
                "Page must be greater than 0".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::InvalidArgument(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let offset = u64::from(page - 1) * u64::from(page_size);
        let (items, total) = self.repository.get_page(offset, page_size).await?;
        if total > 0 {
            return Ok(Page::new(items, page, page_size, total));
        }

        let today = today();
        let days = FIRST_RUN_BACKFILL_DAYS.min(self.retention_days);
        info!("Cache is empty, backfilling the last {} days before serving history", days);
        self.fill_range(days_before(today, u64::from(days)), today)
            .await?;

        let (items, total) = self.repository.get_page(offset, page_size).await?;
        Ok(Page::new(items, page, page_size, total))
    }

    /// Fetch every missing day in `[start, end]`, oldest first. A failing day
    /// is logged and skipped; a rate-limited day pauses the run before moving on.
    /// The range is clamped to the published archive, first record through today.
    pub async fn fill_range(&self, start: NaiveDate, end: NaiveDate) -> Result<usize> {
        if start > end {
            return Err(AppError::InvalidArgument(format!(
                "Start date {} cannot be after end date {}",
                start, end
            )));
        }

        let (start, end) = (start.max(FIRST_RECORD_DATE), end.min(today()));
        if start > end {
            info!("Requested range lies outside the published archive, nothing to fill");
            return Ok(0);
        }

        info!("Filling cache from {} to {}", start, end);
        let mut added = 0;

        for date in start.iter_days().take_while(|d| *d <= end) {
            match self.repository.get(date).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    error!("Cache lookup failed for {}: {}", date, e);
                    continue;
                }
            }

            match self.fetch_and_store(date).await {
                Ok(_) => {
                    added += 1;
                    sleep(self.pacing.fill_delay()).await;
                }
                Err(AppError::RateLimited) => {
                    let pause = self.pacing.rate_limited_pause();
                    warn!("Rate limit hit while filling cache at {}, pausing for {:?}", date, pause);
                    sleep(pause).await;
                }
                Err(e) => {
                    error!("Failed to fill picture for {}: {}", date, e);
                }
            }
        }

        info!("Added {} new entries to cache", added);
        Ok(added)
    }

    /// Never fails: each step logs its own error and the mark is only
    /// written when every step succeeded.
    pub async fn run_daily_maintenance(&self) -> MaintenanceReport {
        info!("Running daily cache maintenance");
        let mut report = MaintenanceReport::default();
        let mut clean = true;

        let today = today();
        match self.get_today().await {
            Ok(record) if record.date == today => report.today_cached = true,
            Ok(_) => {
                warn!("Maintenance served a fallback, today's picture is still missing");
                clean = false;
            }
            Err(e) => {
                error!("Maintenance could not cache today's picture: {}", e);
                clean = false;
            }
        }

        let cutoff = days_before(today, u64::from(self.retention_days));

        match self.repository.delete_older_than(cutoff).await {
            Ok(evicted) => {
                info!("Removed {} entries older than {}", evicted, cutoff);
                report.evicted = evicted;
            }
            Err(e) => {
                error!("Maintenance eviction failed: {}", e);
                clean = false;
            }
        }

        match self.fill_range(cutoff, today).await {
            Ok(added) => report.added = added,
            Err(e) => {
                error!("Maintenance gap fill failed: {}", e);
                clean = false;
            }
        }

        if clean {
            let stamp = Utc::now().timestamp_millis().to_string();
            match self.repository.set_metadata(MAINTENANCE_MARK_KEY, &stamp).await {
                Ok(()) => report.completed = true,
                Err(e) => error!("Failed to record maintenance run: {}", e),
            }
        }

        info!(
            today_cached = report.today_cached,
            evicted = report.evicted,
            added = report.added,
            completed = report.completed,
            "Daily cache maintenance finished"
        );
        report
    }

    pub async fn last_maintenance(&self) -> Result<Option<MaintenanceMark>> {
        self.repository.get_metadata(MAINTENANCE_MARK_KEY).await
    }

    /// True when the cache is too sparse overall or in the recent window.
    pub async fn needs_historical_fetch(&self) -> bool {
        match self.cache_population().await {
            Ok((total, _)) if total < MIN_TOTAL_ROWS => {
                info!("Cache has only {} entries, historical fetch needed", total);
                true
            }
            Ok((_, recent)) if recent < MIN_RECENT_ROWS => {
                info!("Cache has only {} recent entries, historical fetch needed", recent);
                true
            }
            Ok((total, recent)) => {
                info!("Cache appears populated ({} total, {} recent)", total, recent);
                false
            }
            Err(e) => {
                error!("Error checking cache population: {}", e);
                true
            }
        }
    }

    async fn cache_population(&self) -> Result<(u64, u64)> {
        let total = self.repository.count_all().await?;
        let today = today();
        let recent = self
            .repository
            .count_in_range(days_before(today, RECENT_WINDOW_DAYS), today)
            .await?;
        Ok((total, recent))
    }

    async fn fetch_and_store(&self, date: NaiveDate) -> Result<Record> {
        let mut record = self.client.fetch_by_date(date).await?;
        record.fetched_at = Utc::now();
        self.repository.save(record).await
    }
}

pub(crate) fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}
