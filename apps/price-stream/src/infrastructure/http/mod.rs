//! HTTP/WebSocket API adapter.
//!
//! Inbound adapter serving the price snapshot and the live price stream.

mod controller;
mod response;
mod server;

pub use controller::{ApiState, RATES_GROUP, STREAM_GROUP, router};
pub use response::{ApiError, ErrorResponse};
pub use server::{ApiServer, ApiServerError};
