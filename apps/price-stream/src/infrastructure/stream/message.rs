//! Wire format for streamed prices.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::pricing::{AssetPrice, PriceChanged};

/// One price update as sent to clients.
///
/// `price` is narrowed from `Decimal` to `f64`; streamed values are
/// advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateMessage {
    /// Asset name.
    pub asset_name: String,
    /// Price as a JSON number.
    pub price: f64,
    /// When the price was produced (RFC 3339).
    pub timestamp: DateTime<Utc>,
}

impl PriceUpdateMessage {
    /// Encode as a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is not a finite number.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

impl From<&PriceChanged> for PriceUpdateMessage {
    fn from(event: &PriceChanged) -> Self {
        Self {
            asset_name: event.asset.clone(),
            price: event.value.to_f64().unwrap_or_default(),
            timestamp: event.timestamp,
        }
    }
}

impl From<&AssetPrice> for PriceUpdateMessage {
    fn from(price: &AssetPrice) -> Self {
        Self {
            asset_name: price.name.clone(),
            price: price.value.to_f64().unwrap_or_default(),
            timestamp: price.observed_at,
        }
    }
}
