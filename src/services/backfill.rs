//! Bulk historical ingestion, paced in day-granularity batches.
//!
//! An initial batch ending today is filled right away; follow-up batches walk
//! backwards from there, one per interval, until the first published day.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::BackfillPlan;
use crate::models::{today, FIRST_RECORD_DATE};

use super::cache_service::{days_before, CacheService};

const TOP_UP_DAYS: u64 = 7;

/// Moving lower bound of the range still to be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillCursor {
    working_start: NaiveDate,
    first_record_date: NaiveDate,
}

impl BackfillCursor {
    pub fn new(working_start: NaiveDate, first_record_date: NaiveDate) -> Self {
        Self {
            working_start: working_start.max(first_record_date),
            first_record_date,
        }
    }

    pub fn working_start(&self) -> NaiveDate {
        self.working_start
    }

    pub fn is_exhausted(&self) -> bool {
        self.working_start <= self.first_record_date
    }

    /// The batch just below the cursor, clamped to the first record date.
    pub fn next_batch(&self, batch_days: u32) -> Option<(NaiveDate, NaiveDate)> {
        if self.is_exhausted() {
            return None;
        }
        let end = days_before(self.working_start, 1);
        let start = days_before(self.working_start, u64::from(batch_days)).max(self.first_record_date);
        Some((start, end))
    }

    /// Only ever moves towards the first record date.
    pub fn advance_to(&mut self, start: NaiveDate) {
        if start < self.working_start {
            self.working_start = start.max(self.first_record_date);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    AlreadyRunning,
    TopUp { added: usize },
    Completed { batches: usize, added: usize },
}

pub struct BackfillScheduler {
    service: Arc<CacheService>,
    plan: BackfillPlan,
    floor: NaiveDate,
    running: AtomicBool,
}

/// Clears the running flag however the run ends, including cancellation.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BackfillScheduler {
    pub fn new(service: Arc<CacheService>, plan: BackfillPlan) -> Self {
        Self {
            service,
            plan,
            floor: FIRST_RECORD_DATE,
            running: AtomicBool::new(false),
        }
    }

    /// Stop at `floor` instead of the first published day.
    pub fn with_floor(mut self, floor: NaiveDate) -> Self {
        self.floor = floor;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn run(&self) -> BackfillOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Backfill already in progress, skipping");
            return BackfillOutcome::AlreadyRunning;
        }
        let _guard = RunGuard(&self.running);

        let today = today();
        if !self.service.needs_historical_fetch().await {
            info!("Historical data appears complete, topping up the last {} days", TOP_UP_DAYS);
            let added = match self
                .service
                .fill_range(days_before(today, TOP_UP_DAYS), today)
                .await
            {
                Ok(added) => added,
                Err(e) => {
                    error!("Top-up fill failed: {}", e);
                    0
                }
            };
            return BackfillOutcome::TopUp { added };
        }

        let initial_start =
            days_before(today, u64::from(self.plan.initial_batch_days)).max(self.floor);
        info!(
            tier = ?self.plan.tier,
            initial = self.plan.initial_batch_days,
            followup = self.plan.followup_batch_days,
            "Fetching initial batch from {} to {}",
            initial_start,
            today
        );

        let mut added = match self.service.fill_range(initial_start, today).await {
            Ok(count) => {
                info!("Initial batch completed: {} new entries", count);
                count
            }
            Err(e) => {
                error!("Initial batch failed: {}", e);
                0
            }
        };

        let mut cursor = BackfillCursor::new(initial_start, self.floor);
        let mut batches = 0;

        while let Some((start, end)) = cursor.next_batch(self.plan.followup_batch_days) {
            info!("Waiting {:?} before next batch", self.plan.interval);
            sleep(self.plan.interval).await;

            info!("Fetching follow-up batch from {} to {}", start, end);
            match self.service.fill_range(start, end).await {
                Ok(count) => {
                    info!("Follow-up batch completed: {} new entries", count);
                    added += count;
                    batches += 1;
                    cursor.advance_to(start);
                }
                Err(e) => error!("Follow-up batch {} to {} failed: {}", start, end, e),
            }
        }

        info!(
            "Historical backfill complete, everything from {} to {} has been processed",
            self.floor, today
        );
        BackfillOutcome::Completed { batches, added }
    }
}

/// Cache today's picture, then run the backfill to completion.
pub fn spawn_startup_backfill(scheduler: Arc<BackfillScheduler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting initialization sequence");
        if let Err(e) = scheduler.service.get_today().await {
            error!("Could not fetch today's picture at startup: {}", e);
        }
        let outcome = scheduler.run().await;
        info!(?outcome, "Startup backfill finished");
    })
}
