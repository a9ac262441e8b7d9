//! Request Admission
//!
//! Per-identity rate governor. Each identity key (an endpoint group,
//! optionally suffixed with the caller's login) remembers when it was last
//! admitted; a request is admitted only once `1 / max_per_second` has passed
//! since then.
//!
//! Denied requests leave the timestamp untouched, so a burst of rejected
//! calls never pushes the next allowed slot further out.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed; the key's timestamp was advanced.
    Allowed,
    /// Request arrived too soon after the last admitted one.
    Denied,
}

impl Admission {
    /// Whether the request was admitted.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Tracks the last admitted request per identity key.
///
/// Keys are created lazily and never evicted; the map grows with the number
/// of distinct identities seen.
#[derive(Debug, Default)]
pub struct RateGovernor {
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl RateGovernor {
    /// Create an empty governor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or deny a request for `key` arriving now.
    ///
    /// A non-positive or non-finite rate denies every request.
    pub fn check_and_update(&self, key: &str, max_per_second: f64) -> Admission {
        self.check_and_update_at(key, max_per_second, Instant::now())
    }

    /// Admit or deny a request for `key` arriving at `now`.
    pub fn check_and_update_at(&self, key: &str, max_per_second: f64, now: Instant) -> Admission {
        let Some(min_interval) = min_interval(max_per_second) else {
            return Admission::Denied;
        };

        {
            let mut last_admitted = self.last_admitted.lock();
            if let Some(last) = last_admitted.get_mut(key) {
                return admit(last, now, min_interval);
            }
        }

        // First sighting: build the owned key outside the critical section.
        let owned = key.to_owned();
        let mut last_admitted = self.last_admitted.lock();
        match last_admitted.entry(owned) {
            Entry::Occupied(mut entry) => admit(entry.get_mut(), now, min_interval),
            Entry::Vacant(entry) => {
                entry.insert(now);
                Admission::Allowed
            }
        }
    }

    /// Number of identity keys seen so far.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.last_admitted.lock().len()
    }
}

fn admit(last: &mut Instant, now: Instant, min_interval: Duration) -> Admission {
    if now.saturating_duration_since(*last) >= min_interval {
        *last = now;
        Admission::Allowed
    } else {
        Admission::Denied
    }
}

fn min_interval(max_per_second: f64) -> Option<Duration> {
    if !max_per_second.is_finite() || max_per_second <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(max_per_second.recip()).ok()
}

// =============================================================================
// Tests
// =============================================================================
