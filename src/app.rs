use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::server::AppState;
use crate::services::{
    spawn_maintenance_timer, spawn_startup_backfill, BackfillScheduler, CacheService,
};
use crate::upstream::{ApodClient, HttpTransport, RateLimiter, RateLimits};

/// Everything the server and the background jobs share.
pub struct App {
    pub service: Arc<CacheService>,
    pub scheduler: Arc<BackfillScheduler>,
    maintenance_hour: u32,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let transport = HttpTransport::new(&config.api_base_url, config.api_key.clone())?;
        let limiter = RateLimiter::new(RateLimits::from(&config.rate_limit));
        let client = ApodClient::new(Arc::new(transport), limiter);

        let service = Arc::new(CacheService::new(
            repository,
            client,
            config.retention_days,
            config.pacing.clone(),
        ));
        let scheduler = Arc::new(BackfillScheduler::new(
            service.clone(),
            config.backfill_plan(),
        ));

        Ok(Self {
            service,
            scheduler,
            maintenance_hour: config.maintenance_hour,
        })
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.service.clone())
    }

    /// Startup backfill plus the daily maintenance timer.
    pub fn spawn_background_jobs(&self) -> Vec<JoinHandle<()>> {
        vec![
            spawn_startup_backfill(self.scheduler.clone()),
            spawn_maintenance_timer(self.service.clone(), self.maintenance_hour),
        ]
    }
}
