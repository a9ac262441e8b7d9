//! Asset Pricing Types
//!
//! Price values, the change events published for them, and the random-walk
//! state machine that drifts one asset's price toward randomly chosen targets.
//!
//! # Precision
//!
//! All price arithmetic uses [`Decimal`]. Values are only narrowed to `f64`
//! at the storage and wire boundaries, where the loss is accepted: streamed
//! prices are advisory and settlement re-reads the stored price.

mod walk;

pub use walk::{PriceWalk, PriceWalkError, WalkConfig, WalkStep};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Types
// =============================================================================

/// Latest known price of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPrice {
    /// Unique asset name.
    pub name: String,
    /// Current value.
    pub value: Decimal,
    /// When the value was last written.
    pub observed_at: DateTime<Utc>,
}

impl AssetPrice {
    /// Create a price observed now.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Decimal) -> Self {
        Self {
            name: name.into(),
            value,
            observed_at: Utc::now(),
        }
    }
}

/// Event emitted by a price maker once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceChanged {
    /// Asset whose price moved.
    pub asset: String,
    /// New value.
    pub value: Decimal,
    /// When the value was produced.
    pub timestamp: DateTime<Utc>,
}

impl PriceChanged {
    /// Create a change event stamped with the current time.
    #[must_use]
    pub fn now(asset: impl Into<String>, value: Decimal) -> Self {
        Self {
            asset: asset.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

impl From<AssetPrice> for PriceChanged {
    fn from(price: AssetPrice) -> Self {
        Self {
            asset: price.name,
            value: price.value,
            timestamp: price.observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_price_converts_to_event() {
        let price = AssetPrice::new("white_wool", Decimal::new(45, 0));
        let observed_at = price.observed_at;

        let event = PriceChanged::from(price);

        assert_eq!(event.asset, "white_wool");
        assert_eq!(event.value, Decimal::new(45, 0));
        assert_eq!(event.timestamp, observed_at);
    }
}
