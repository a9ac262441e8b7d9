//! Bounded random walk for a single asset.
//!
//! A walk moves in legs. Each leg picks a target within `±max_swing` of the
//! start price and a change interval, then moves linearly from the value the
//! leg started at toward the target so that a full interval lands on it
//! exactly. Steps are clamped to the remaining distance, so the value never
//! leaves the band around the start price.
//!
//! Time and randomness are passed in by the caller; the walk itself never
//! reads a clock or owns an RNG.

use std::time::{Duration, Instant};

use rand::Rng;
use rust_decimal::Decimal;

/// Target swings are drawn at basis-point resolution.
const SWING_RESOLUTION: i64 = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables shared by every walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkConfig {
    /// Shortest change interval a leg may draw.
    pub min_change_interval: Duration,
    /// Longest change interval a leg may draw.
    pub max_change_interval: Duration,
    /// Largest distance of a target from the start price, as a fraction.
    pub max_swing: Decimal,
    /// Lower bound on the time between two cycles.
    pub min_cycle: Duration,
    /// Number of cycles a change interval is divided into.
    pub cycles_per_interval: u32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            min_change_interval: Duration::from_secs(1),
            max_change_interval: Duration::from_secs(10),
            max_swing: Decimal::new(5, 2),
            min_cycle: Duration::from_millis(200),
            cycles_per_interval: 100,
        }
    }
}

impl WalkConfig {
    /// Check the configuration describes a walk that can make progress.
    ///
    /// # Errors
    ///
    /// Returns `PriceWalkError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), PriceWalkError> {
        if self.min_change_interval < Duration::from_millis(1) {
            return Err(PriceWalkError::InvalidConfig(
                "min_change_interval must be at least 1ms".to_string(),
            ));
        }
        if self.max_change_interval < self.min_change_interval {
            return Err(PriceWalkError::InvalidConfig(
                "max_change_interval must not be shorter than min_change_interval".to_string(),
            ));
        }
        if self.max_swing.is_sign_negative() || self.max_swing >= Decimal::ONE {
            return Err(PriceWalkError::InvalidConfig(
                "max_swing must be in [0, 1)".to_string(),
            ));
        }
        if self.cycles_per_interval == 0 {
            return Err(PriceWalkError::InvalidConfig(
                "cycles_per_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised when constructing a walk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceWalkError {
    /// Start price is zero or negative.
    #[error("start price for {asset} must be positive, got {price}")]
    NonPositiveStartPrice {
        /// Asset name.
        asset: String,
        /// Rejected price.
        price: Decimal,
    },

    /// Forced target lies outside the allowed band.
    #[error("target {target} for {asset} is outside [{low}, {high}]")]
    TargetOutOfBand {
        /// Asset name.
        asset: String,
        /// Rejected target.
        target: Decimal,
        /// Lowest allowed value.
        low: Decimal,
        /// Highest allowed value.
        high: Decimal,
    },

    /// Forced change interval is zero.
    #[error("change interval must be positive")]
    ZeroChangeInterval,

    /// Walk configuration cannot make progress.
    #[error("invalid walk configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Walk
// =============================================================================

/// Result of one call to [`PriceWalk::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    /// Value after the cycle.
    pub value: Decimal,
    /// Whether this cycle drew a new target instead of moving.
    pub rerolled: bool,
}

/// Random-walk state for one asset.
#[derive(Debug, Clone)]
pub struct PriceWalk {
    asset: String,
    config: WalkConfig,
    start: Decimal,
    current: Decimal,
    leg_origin: Decimal,
    target: Decimal,
    change_interval: Duration,
    last_change: Instant,
}

impl PriceWalk {
    /// Start a walk at `start` with a freshly drawn target.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is not positive or `config` is invalid.
    pub fn new<R: Rng + ?Sized>(
        asset: impl Into<String>,
        start: Decimal,
        config: WalkConfig,
        now: Instant,
        rng: &mut R,
    ) -> Result<Self, PriceWalkError> {
        let mut walk = Self::unrolled(asset.into(), start, config, now)?;
        walk.reroll(now, rng);
        Ok(walk)
    }

    /// Start a walk with a fixed first target and change interval.
    ///
    /// Later legs are still drawn at random by [`advance`](Self::advance).
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is not positive, the interval is zero,
    /// or `target` lies outside the band allowed by `config.max_swing`.
    pub fn with_target(
        asset: impl Into<String>,
        start: Decimal,
        target: Decimal,
        change_interval: Duration,
        config: WalkConfig,
        now: Instant,
    ) -> Result<Self, PriceWalkError> {
        if change_interval.is_zero() {
            return Err(PriceWalkError::ZeroChangeInterval);
        }

        let mut walk = Self::unrolled(asset.into(), start, config, now)?;
        let (low, high) = walk.band();
        if target < low || target > high {
            return Err(PriceWalkError::TargetOutOfBand {
                asset: walk.asset,
                target,
                low,
                high,
            });
        }

        walk.target = target;
        walk.change_interval = change_interval;
        Ok(walk)
    }

    fn unrolled(
        asset: String,
        start: Decimal,
        config: WalkConfig,
        now: Instant,
    ) -> Result<Self, PriceWalkError> {
        config.validate()?;
        if start <= Decimal::ZERO {
            return Err(PriceWalkError::NonPositiveStartPrice {
                asset,
                price: start,
            });
        }

        Ok(Self {
            asset,
            config,
            start,
            current: start,
            leg_origin: start,
            target: start,
            change_interval: config.min_change_interval,
            last_change: now,
        })
    }

    /// Run one cycle at `now`.
    ///
    /// Draws a new leg when the remaining distance is already within this
    /// cycle's step, otherwise steps toward the target.
    pub fn advance<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> WalkStep {
        let remaining = self.remaining();
        if remaining.is_zero() || remaining < self.step_size(now) {
            self.reroll(now, rng);
            return WalkStep {
                value: self.current,
                rerolled: true,
            };
        }

        WalkStep {
            value: self.step(now),
            rerolled: false,
        }
    }

    /// Move toward the target by the share of the leg elapsed since the
    /// last change, never past it.
    pub fn step(&mut self, now: Instant) -> Decimal {
        let delta = self.step_size(now).min(self.remaining());
        if self.target >= self.current {
            self.current += delta;
        } else {
            self.current -= delta;
        }
        self.last_change = now;
        self.current
    }

    fn step_size(&self, now: Instant) -> Decimal {
        let elapsed = now.saturating_duration_since(self.last_change);
        (self.target - self.leg_origin).abs() * elapsed_fraction(elapsed, self.change_interval)
    }

    fn remaining(&self) -> Decimal {
        (self.target - self.current).abs()
    }

    fn reroll<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        let swing = Decimal::new(rng.random_range(-SWING_RESOLUTION..=SWING_RESOLUTION), 4)
            * self.config.max_swing;
        self.target = self.start + self.start * swing;

        let min_ms = whole_millis(self.config.min_change_interval);
        let max_ms = whole_millis(self.config.max_change_interval);
        self.change_interval = Duration::from_millis(rng.random_range(min_ms..=max_ms));

        self.leg_origin = self.current;
        self.last_change = now;
    }

    /// Time to sleep between cycles.
    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        (self.change_interval / self.config.cycles_per_interval).max(self.config.min_cycle)
    }

    /// Lowest and highest value this walk can ever reach.
    #[must_use]
    pub fn band(&self) -> (Decimal, Decimal) {
        let swing = self.start * self.config.max_swing;
        (self.start - swing, self.start + swing)
    }

    /// Asset name.
    #[must_use]
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Current value.
    #[must_use]
    pub const fn current(&self) -> Decimal {
        self.current
    }

    /// Price the walk started from.
    #[must_use]
    pub const fn start(&self) -> Decimal {
        self.start
    }

    /// Target of the current leg.
    #[must_use]
    pub const fn target(&self) -> Decimal {
        self.target
    }

    /// Change interval of the current leg.
    #[must_use]
    pub const fn change_interval(&self) -> Duration {
        self.change_interval
    }
}

fn elapsed_fraction(elapsed: Duration, interval: Duration) -> Decimal {
    let interval = whole_nanos(interval);
    if interval.is_zero() {
        return Decimal::ONE;
    }
    whole_nanos(elapsed) / interval
}

fn whole_nanos(duration: Duration) -> Decimal {
    Decimal::from(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
