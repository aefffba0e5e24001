mod backfill;
mod cache_service;
mod maintenance;

pub use backfill::{spawn_startup_backfill, BackfillCursor, BackfillOutcome, BackfillScheduler};
pub use cache_service::{CacheService, MaintenanceReport, MAINTENANCE_MARK_KEY};
pub use maintenance::{next_maintenance_run, spawn_maintenance_timer};
