//! Application Services
//!
//! - `PriceMaker`: drives one asset's price walk, persisting and publishing
//!   every cycle

mod price_maker;

pub use price_maker::{PriceMaker, PriceMakerError, start_price_makers};
