use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

use super::cache_service::CacheService;

/// The next `hour:00` strictly after `now`, local wall-clock time.
pub fn next_maintenance_run(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDateTime::MAX)
    }
}

fn until(now: NaiveDateTime, next: NaiveDateTime) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Run daily maintenance at `hour` every day until the task is aborted.
pub fn spawn_maintenance_timer(service: Arc<CacheService>, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now().naive_local();
            let next = next_maintenance_run(now, hour);
            let wait = until(now, next);
            info!("Next cache maintenance scheduled for {} (in {:?})", next, wait);
            sleep(wait).await;

            let report = service.run_daily_maintenance().await;
            if !report.completed {
                info!("Maintenance left work undone, it will be retried at the next run");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use tempfile::TempDir;
    use tokio::time::Instant;

    use crate::config::PacingConfig;
    use crate::db::Repository;
    use crate::upstream::testing::FakeTransport;
    use crate::upstream::{ApodClient, RateLimiter, RateLimits};

    async fn service() -> (Arc<CacheService>, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("apod.db");
        let repository = Repository::new(path.to_str().unwrap()).await.unwrap();
        let limiter = RateLimiter::new(RateLimits {
            hourly: 10_000,
            daily: 10_000,
            min_interval: Duration::ZERO,
        });
        let client = ApodClient::new(Arc::new(FakeTransport::serving_all_dates()), limiter);
        let service = CacheService::new(repository, client, 5, PacingConfig::immediate());
        (Arc::new(service), dir)
    }

    #[tokio::test(start_paused = true)]
    async fn timer_runs_maintenance_once_the_hour_arrives() {
        let (service, _dir) = service().await;
        // The current hour has already started, so the next run is tomorrow.
        let hour = Local::now().hour();
        let now = Local::now().naive_local();
        let expected_wait = until(now, next_maintenance_run(now, hour));

        let start = Instant::now();
        let handle = spawn_maintenance_timer(service.clone(), hour);

        let mut mark = None;
        for _ in 0..26 * 60 {
            mark = service.last_maintenance().await.unwrap();
            if mark.is_some() {
                break;
            }
            sleep(Duration::from_secs(60)).await;
        }
        handle.abort();

        assert!(mark.is_some(), "maintenance never ran");
        assert!(start.elapsed() + Duration::from_secs(60) >= expected_wait);
        assert!(service.repository().get(crate::models::today()).await.unwrap().is_some());
    }

    fn at(date: &str, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn runs_later_today_when_hour_not_reached() {
        assert_eq!(
            next_maintenance_run(at("2024-03-10", 1, 30), 3),
            at("2024-03-10", 3, 0)
        );
    }

    #[test]
    fn runs_tomorrow_once_hour_has_passed() {
        assert_eq!(
            next_maintenance_run(at("2024-03-10", 14, 0), 3),
            at("2024-03-11", 3, 0)
        );
    }

    #[test]
    fn exactly_on_the_hour_schedules_tomorrow() {
        assert_eq!(
            next_maintenance_run(at("2024-12-31", 3, 0), 3),
            at("2025-01-01", 3, 0)
        );
    }

    #[test]
    fn wait_is_never_negative() {
        let now = at("2024-03-10", 5, 0);
        assert_eq!(until(now, at("2024-03-10", 4, 0)), Duration::ZERO);
        assert_eq!(until(now, at("2024-03-10", 6, 0)), Duration::from_secs(3600));
    }
}
