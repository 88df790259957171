//! Timestamps, ordering keys and expiry horizons.
//!
//! All absolute times are microseconds since the Unix epoch. Clients see
//! message ordering keys as fractional seconds; [`CreatedAt`] converts between
//! the two representations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DURATION_MINUTE: Duration = Duration::from_secs(60);
pub const DURATION_HOUR: Duration = Duration::from_secs(60 * 60);
pub const DURATION_DAY: Duration = Duration::from_secs(24 * 60 * 60);
/// Thirty and a half days.
pub const DURATION_MONTH: Duration = Duration::from_secs(24 * 60 * 60 * 61 / 2);

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(Timestamp::since_epoch)
            .unwrap_or(Timestamp(0))
    }

    /// `elapsed` after the Unix epoch, saturating at the largest timestamp.
    pub fn since_epoch(elapsed: Duration) -> Self {
        Timestamp(0).after(elapsed)
    }

    /// Absolute time `ttl` after `self`.
    pub fn after(self, ttl: Duration) -> Self {
        let micros = i64::try_from(ttl.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }

    /// True once `now` has reached this expiry horizon.
    pub fn has_passed(self, now: Timestamp) -> bool {
        self <= now
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Per-topic ordering key of a published message.
///
/// Stored as microseconds; exposed to clients as seconds with a fractional
/// part, which is also the format of the replay cursor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CreatedAt(pub i64);

impl CreatedAt {
    pub const MIN: CreatedAt = CreatedAt(i64::MIN);

    /// Parse a client cursor, rounding to the nearest microsecond.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        let micros = (secs * MICROS_PER_SEC).round();
        if micros >= i64::MAX as f64 {
            Some(CreatedAt(i64::MAX))
        } else if micros <= i64::MIN as f64 {
            Some(CreatedAt::MIN)
        } else {
            Some(CreatedAt(micros as i64))
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SEC
    }

    /// Smallest key strictly after this one.
    pub fn next(self) -> Self {
        CreatedAt(self.0.saturating_add(1))
    }
}

impl From<Timestamp> for CreatedAt {
    fn from(ts: Timestamp) -> Self {
        CreatedAt(ts.0)
    }
}

impl fmt::Debug for CreatedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreatedAt({})", self.0)
    }
}

impl fmt::Display for CreatedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}

/// Source of "now" for expiry and ordering keys.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicI64::new(start.0),
        }
    }

    pub fn set(&self, to: Timestamp) {
        self.micros.store(to.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now().after(by);
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.micros.load(Ordering::SeqCst))
    }
}
