//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the broadcast machinery that
//! carries price changes to subscribers.

/// Bearer token authentication.
pub mod auth;

/// Single-owner broadcast hub and subscriber queues.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Rates API and WebSocket upgrade.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Price store implementations.
pub mod persistence;

/// Per-subscriber WebSocket connections.
pub mod stream;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
