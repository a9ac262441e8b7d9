#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Price Stream - Simulated Asset Prices over WebSocket
//!
//! Each tradable asset gets a price maker that drifts its price along a
//! bounded random walk. Every step is persisted and pushed through a single
//! broadcast hub to all connected WebSocket subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure pricing and admission logic
//!   - `pricing`: Price values, change events, the random walk
//!   - `admission`: Per-key request rate governor
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Price store and authenticator interfaces
//!   - `services`: Price makers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broadcast`: Hub control loop and subscriber queues
//!   - `stream`: WebSocket subscriber connections
//!   - `http`: Rates API and stream upgrade
//!   - `persistence`, `auth`: Port implementations
//!   - `config`, `health`, `metrics`, `telemetry`: Ambient services
//!
//! # Data Flow
//!
//! ```text
//! PriceMaker (white_wool) ──┐
//!                           │     ┌─────────────┐     ┌────────────┐
//!                           ├────►│  Broadcast  │────►│ Subscriber │──► Client 1
//! PriceMaker (black_wool) ──┤     │     Hub     │────►│   Queues   │──► Client 2
//!                           │     └─────────────┘     └────────────┘──► Client N
//! PriceMaker (...)  ────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pricing and admission logic with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::admission::{Admission, RateGovernor};
pub use domain::pricing::{AssetPrice, PriceChanged, PriceWalk, PriceWalkError, WalkConfig};

// Application services
pub use application::services::{PriceMaker, PriceMakerError};

// Infrastructure config
pub use infrastructure::config::{
    ApiTokens, BroadcastSettings, ConfigError, RateLimitSettings, SeedAsset, ServerSettings,
    ServiceConfig, StreamSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// API server
pub use infrastructure::http::{ApiError, ApiServer, ApiServerError, ApiState};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, HubError, HubHandle, OutboundQueue,
    RemovalReason, SubscriberId,
};

// Streaming
pub use infrastructure::stream::{PriceUpdateMessage, SubscriberConnection};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
