use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEMO_API_KEY: &str = "DEMO_KEY";
pub const DEFAULT_API_BASE_URL: &str = "https://api.nasa.gov/planetary/apod";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_maintenance_hour")]
    pub maintenance_hour: u32,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub pacing: PacingConfig,
}

/// Batch sizes and follow-up intervals for each backfill tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub initial_size: u32,
    pub followup_size: u32,
    pub interval_hours: u32,
    pub demo_initial_size: u32,
    pub demo_followup_size: u32,
    pub demo_interval_hours: u32,
    pub debug_initial_size: u32,
    pub debug_followup_size: u32,
    pub debug_interval_minutes: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_size: 500,
            followup_size: 100,
            interval_hours: 4,
            demo_initial_size: 30,
            demo_followup_size: 20,
            demo_interval_hours: 6,
            debug_initial_size: 10,
            debug_followup_size: 5,
            debug_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 30,
            daily_limit: 50,
            min_interval_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Delays used while filling ranges of days.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub fill_delay_ms: u64,
    pub rate_limited_pause_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            fill_delay_ms: 1500,
            rate_limited_pause_secs: 300,
        }
    }
}

impl PacingConfig {
    pub fn fill_delay(&self) -> Duration {
        Duration::from_millis(self.fill_delay_ms)
    }

    pub fn rate_limited_pause(&self) -> Duration {
        Duration::from_secs(self.rate_limited_pause_secs)
    }

    /// No waiting at all, for tests and one-off local runs.
    pub fn immediate() -> Self {
        Self {
            fill_delay_ms: 0,
            rate_limited_pause_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTier {
    Production,
    Demo,
    Debug,
}

/// Effective backfill pacing for the selected tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPlan {
    pub tier: BatchTier,
    pub initial_batch_days: u32,
    pub followup_batch_days: u32,
    pub interval: Duration,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apod-cache");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("apod.db").to_string_lossy().to_string()
}

fn default_api_key() -> String {
    DEMO_API_KEY.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_retention_days() -> u32 {
    90
}

fn default_maintenance_hour() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_key: default_api_key(),
            api_base_url: default_api_base_url(),
            bind_addr: default_bind_addr(),
            retention_days: default_retention_days(),
            maintenance_hour: default_maintenance_hour(),
            debug_mode: false,
            batch: BatchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apod-cache")
            .join("config.toml")
    }

    /// Environment variables win over the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NASA_API_KEY") {
            self.api_key = key;
        }
        if let Some(path) = lookup("APOD_DB_PATH") {
            self.db_path = path;
        }
        if let Some(addr) = lookup("APOD_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(days) = lookup("CACHE_DAYS") {
            self.retention_days = parse_env("CACHE_DAYS", &days)?;
        }
        if let Some(hour) = lookup("MAINTENANCE_HOUR") {
            self.maintenance_hour = parse_env("MAINTENANCE_HOUR", &hour)?;
        }
        if let Some(debug) = lookup("DEBUG_MODE") {
            self.debug_mode = parse_env("DEBUG_MODE", &debug)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.maintenance_hour > 23 {
            return Err(AppError::Config(format!(
                "maintenance_hour must be 0-23, got {}",
                self.maintenance_hour
            )));
        }
        if self.retention_days == 0 {
            return Err(AppError::Config("retention_days must be positive".to_string()));
        }
        if self.rate_limit.hourly_limit == 0 || self.rate_limit.daily_limit == 0 {
            return Err(AppError::Config("rate limits must be positive".to_string()));
        }
        let plan = self.backfill_plan();
        if plan.initial_batch_days == 0 || plan.followup_batch_days == 0 {
            return Err(AppError::Config(format!(
                "batch sizes for the {:?} tier must be positive",
                plan.tier
            )));
        }
        Ok(())
    }

    pub fn tier(&self) -> BatchTier {
        if self.debug_mode {
            BatchTier::Debug
        } else if self.api_key == DEMO_API_KEY {
            BatchTier::Demo
        } else {
            BatchTier::Production
        }
    }

    pub fn backfill_plan(&self) -> BackfillPlan {
        let b = &self.batch;
        let tier = self.tier();
        let (initial, followup, interval) = match tier {
            BatchTier::Debug => (
                b.debug_initial_size,
                b.debug_followup_size,
                Duration::from_secs(u64::from(b.debug_interval_minutes) * 60),
            ),
            BatchTier::Demo => (
                b.demo_initial_size,
                b.demo_followup_size,
                Duration::from_secs(u64::from(b.demo_interval_hours) * 3600),
            ),
            BatchTier::Production => (
                b.initial_size,
                b.followup_size,
                Duration::from_secs(u64::from(b.interval_hours) * 3600),
            ),
        };

        BackfillPlan {
            tier,
            initial_batch_days: initial,
            followup_batch_days: followup,
            interval,
        }
    }

    pub fn masked_api_key(&self) -> String {
        if self.api_key == DEMO_API_KEY {
            return DEMO_API_KEY.to_string();
        }
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }

    pub fn log_summary(&self) {
        let plan = self.backfill_plan();
        tracing::info!(
            api_key = %self.masked_api_key(),
            tier = ?plan.tier,
            initial_batch = plan.initial_batch_days,
            followup_batch = plan.followup_batch_days,
            interval_minutes = plan.interval.as_secs() / 60,
            maintenance_hour = self.maintenance_hour,
            retention_days = self.retention_days,
            "Loaded configuration"
        );
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw)))
}
