//! Time sources.
//!
//! Everything that reads "now" goes through a [`Clock`] so that tests can
//! pin time with [`ManualClock`]. [`TimeSource`] layers the cluster's
//! stable-time watermark and TTL arithmetic on top of a clock.

use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clock plus the stable-time skew shared by every query path.
#[derive(Clone)]
pub struct TimeSource {
    clock: Arc<dyn Clock>,
    stable_skew: Duration,
}

impl TimeSource {
    pub fn new(clock: Arc<dyn Clock>, stable_skew: Duration) -> Self {
        Self { clock, stable_skew }
    }

    pub fn system(stable_skew: Duration) -> Self {
        Self::new(Arc::new(SystemClock), stable_skew)
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Watermark below which all cluster writes are assumed visible.
    pub fn stable(&self) -> OffsetDateTime {
        self.now() - self.stable_skew
    }

    /// Upper bound for "latest" lookups. Non-stable reads look one minute
    /// ahead so a fresh write on a slightly faster clock is not excluded.
    pub fn latest_limit(&self, stable: bool) -> OffsetDateTime {
        if stable {
            self.stable()
        } else {
            self.now() + Duration::minutes(1)
        }
    }

    /// Oldest time still inside a channel's retention. A TTL of zero
    /// keeps everything.
    pub fn earliest_time(&self, ttl_days: u32) -> OffsetDateTime {
        if ttl_days == 0 {
            return OffsetDateTime::UNIX_EPOCH;
        }
        self.now() - Duration::days(i64::from(ttl_days))
    }
}

impl std::fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSource")
            .field("now", &self.now())
            .field("stable_skew", &self.stable_skew)
            .finish()
    }
}
