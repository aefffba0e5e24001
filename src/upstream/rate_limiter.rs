//! Process-wide admission gate for upstream requests.
//!
//! Counts requests in a fixed hourly and a fixed daily window, enforces a
//! minimum spacing between requests, slows down as a window's budget runs
//! low, and blocks outright once a window is exhausted. Every caller goes
//! through one mutex, and the returned permit keeps it held, so at most one
//! upstream request is in flight at a time.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const RESET_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub hourly: u32,
    pub daily: u32,
    pub min_interval: Duration,
}

impl From<&RateLimitConfig> for RateLimits {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            hourly: config.hourly_limit,
            daily: config.daily_limit,
            min_interval: config.min_interval(),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Hourly,
    Daily,
}

impl Window {
    const ALL: [Window; 2] = [Window::Hourly, Window::Daily];

    fn period(self) -> Duration {
        match self {
            Window::Hourly => HOUR,
            Window::Daily => DAY,
        }
    }

    fn limit(self, limits: &RateLimits) -> u32 {
        match self {
            Window::Hourly => limits.hourly,
            Window::Daily => limits.daily,
        }
    }
}

#[derive(Debug)]
struct WindowState {
    hourly_count: u32,
    daily_count: u32,
    hourly_start: Instant,
    daily_start: Instant,
    last_request: Option<Instant>,
}

impl WindowState {
    fn new(now: Instant) -> Self {
        Self {
            hourly_count: 0,
            daily_count: 0,
            hourly_start: now,
            daily_start: now,
            last_request: None,
        }
    }

    fn count(&self, window: Window) -> u32 {
        match window {
            Window::Hourly => self.hourly_count,
            Window::Daily => self.daily_count,
        }
    }

    fn start(&self, window: Window) -> Instant {
        match window {
            Window::Hourly => self.hourly_start,
            Window::Daily => self.daily_start,
        }
    }

    fn reset(&mut self, window: Window, now: Instant) {
        match window {
            Window::Hourly => {
                self.hourly_count = 0;
                self.hourly_start = now;
            }
            Window::Daily => {
                self.daily_count = 0;
                self.daily_start = now;
            }
        }
    }

    fn roll(&mut self, now: Instant) {
        for window in Window::ALL {
            if now.saturating_duration_since(self.start(window)) > window.period() {
                self.reset(window, now);
            }
        }
    }

    fn remaining(&self, window: Window, now: Instant) -> Duration {
        window
            .period()
            .saturating_sub(now.saturating_duration_since(self.start(window)))
    }

    fn spacing_wait(&self, now: Instant, min_interval: Duration) -> Option<Duration> {
        let last = self.last_request?;
        let since = now.saturating_duration_since(last);
        (since < min_interval).then(|| min_interval - since)
    }

    /// Past 90% of a window's budget, spread the rest of it over the time left.
    fn soft_throttle_wait(&self, window: Window, now: Instant, limits: &RateLimits) -> Option<Duration> {
        let count = self.count(window);
        let limit = window.limit(limits);
        if count >= limit || u64::from(count) * 10 < u64::from(limit) * 9 {
            return None;
        }
        let left = limit - count + 1;
        Some(self.remaining(window, now) / left)
    }

    fn hard_stop_wait(&self, window: Window, now: Instant, limits: &RateLimits) -> Option<Duration> {
        (self.count(window) >= window.limit(limits))
            .then(|| self.remaining(window, now) + RESET_MARGIN)
    }

    fn record(&mut self, now: Instant) {
        self.hourly_count += 1;
        self.daily_count += 1;
        self.last_request = Some(now);
    }
}

/// Held for the duration of one upstream exchange.
pub struct RatePermit {
    _state: OwnedMutexGuard<WindowState>,
}

/// Point-in-time view of the limiter for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    pub hourly_count: u32,
    pub hourly_limit: u32,
    pub hourly_resets_in_secs: u64,
    pub daily_count: u32,
    pub daily_limit: u32,
    pub daily_resets_in_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: RateLimits,
    state: Arc<Mutex<WindowState>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            state: Arc::new(Mutex::new(WindowState::new(Instant::now()))),
        }
    }

    /// Wait until one more request is allowed, record it, and return the
    /// permit that keeps every other caller out until it is dropped.
    pub async fn acquire(&self) -> RatePermit {
        let mut state = self.state.clone().lock_owned().await;
        let limits = self.limits;

        state.roll(Instant::now());

        if let Some(wait) = state.spacing_wait(Instant::now(), limits.min_interval) {
            debug!("Rate limiting: waiting {:?} between requests", wait);
            sleep(wait).await;
        }

        for window in Window::ALL {
            if let Some(wait) = state.soft_throttle_wait(window, Instant::now(), &limits) {
                warn!(
                    "Approaching {:?} rate limit ({}/{}), slowing down for {:?}",
                    window,
                    state.count(window),
                    window.limit(&limits),
                    wait
                );
                sleep(wait).await;
                state.roll(Instant::now());
            }
        }

        for window in Window::ALL {
            if let Some(wait) = state.hard_stop_wait(window, Instant::now(), &limits) {
                warn!(
                    "{:?} rate limit reached ({}/{}), waiting {:?} for reset",
                    window,
                    state.count(window),
                    window.limit(&limits),
                    wait
                );
                sleep(wait).await;
                state.reset(window, Instant::now());
            }
        }

        let now = Instant::now();
        state.roll(now);
        state.record(now);

        RatePermit { _state: state }
    }

    /// None while a request holds the gate.
    pub fn snapshot(&self) -> Option<RateSnapshot> {
        let state = self.state.try_lock().ok()?;
        let now = Instant::now();
        Some(RateSnapshot {
            hourly_count: state.hourly_count,
            hourly_limit: self.limits.hourly,
            hourly_resets_in_secs: state.remaining(Window::Hourly, now).as_secs(),
            daily_count: state.daily_count,
            daily_limit: self.limits.daily,
            daily_resets_in_secs: state.remaining(Window::Daily, now).as_secs(),
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}
