//! Subscriber Streams
//!
//! Adapts the hub's push model to a WebSocket (or any `Sink`/`Stream`
//! pair carrying WebSocket messages).

mod connection;
mod message;

pub use connection::{ConnectionPhase, ConnectionSettings, ConnectionSummary, SubscriberConnection};
pub use message::PriceUpdateMessage;
