//! In-memory price store.
//!
//! Prices are kept as `f64` next to their write time, the same shape a
//! relational `asset(name, price, updated_at)` row would have. Conversion
//! to and from [`Decimal`] happens at this boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::application::ports::{PriceStore, StoreError};
use crate::domain::pricing::AssetPrice;

#[derive(Debug, Clone, Copy)]
struct StoredPrice {
    price: f64,
    updated_at: DateTime<Utc>,
}

/// In-memory implementation of `PriceStore`.
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    prices: RwLock<HashMap<String, StoredPrice>>,
}

impl InMemoryPriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `(asset, price)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unrepresentable` if a price does not fit in `f64`.
    pub fn with_assets<I, S>(assets: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut prices = store.prices.write();
            for (asset, price) in assets {
                let asset = asset.into();
                let stored = to_stored(&asset, price)?;
                prices.insert(asset, stored);
            }
        }
        Ok(store)
    }

    /// Number of known assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether the store holds no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

fn to_stored(asset: &str, price: Decimal) -> Result<StoredPrice, StoreError> {
    price
        .to_f64()
        .filter(|p| p.is_finite())
        .map(|price| StoredPrice {
            price,
            updated_at: Utc::now(),
        })
        .ok_or_else(|| StoreError::Unrepresentable {
            asset: asset.to_string(),
            price,
        })
}

fn to_decimal(asset: &str, price: f64) -> Result<Decimal, StoreError> {
    Decimal::try_from(price).map_err(|e| StoreError::Unavailable {
        message: format!("stored price for {asset} is corrupt: {e}"),
    })
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn get_price(&self, asset: &str) -> Result<Decimal, StoreError> {
        let stored = self
            .prices
            .read()
            .get(asset)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                asset: asset.to_string(),
            })?;
        to_decimal(asset, stored.price)
    }

    async fn set_price(&self, asset: &str, price: Decimal) -> Result<(), StoreError> {
        let stored = to_stored(asset, price)?;
        match self.prices.write().get_mut(asset) {
            Some(slot) => {
                *slot = stored;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                asset: asset.to_string(),
            }),
        }
    }

    async fn list_prices(&self) -> Result<Vec<AssetPrice>, StoreError> {
        let snapshot: Vec<(String, StoredPrice)> = self
            .prices
            .read()
            .iter()
            .map(|(name, stored)| (name.clone(), *stored))
            .collect();

        let mut prices = snapshot
            .into_iter()
            .map(|(name, stored)| {
                Ok(AssetPrice {
                    value: to_decimal(&name, stored.price)?,
                    observed_at: stored.updated_at,
                    name,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        prices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(prices)
    }
}
