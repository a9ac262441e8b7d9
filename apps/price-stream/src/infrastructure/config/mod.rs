//! Configuration Module
//!
//! Environment-driven configuration for the price stream.

mod settings;

pub use settings::{
    ApiTokens, BroadcastSettings, ConfigError, RateLimitSettings, SeedAsset, ServerSettings,
    ServiceConfig, StreamSettings, default_assets,
};
