//! Price Store Port (Driven Port)
//!
//! Storage for the authoritative price of each asset. Price makers write
//! through it every cycle; trade settlement and the `/rates` endpoint read
//! from it.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::pricing::AssetPrice;

/// Price store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Asset is not known to the store.
    #[error("asset not found: {asset}")]
    NotFound {
        /// The unknown asset.
        asset: String,
    },

    /// Value cannot be represented by the storage format.
    #[error("price {price} for {asset} cannot be stored")]
    Unrepresentable {
        /// Asset name.
        asset: String,
        /// Rejected value.
        price: Decimal,
    },

    /// Backend failure.
    #[error("price store unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

/// Port for reading and writing asset prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Get the stored price of an asset.
    async fn get_price(&self, asset: &str) -> Result<Decimal, StoreError>;

    /// Overwrite the stored price of an asset.
    async fn set_price(&self, asset: &str, price: Decimal) -> Result<(), StoreError>;

    /// List every known asset with its stored price.
    async fn list_prices(&self) -> Result<Vec<AssetPrice>, StoreError>;
}
