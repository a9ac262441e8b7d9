//! Port Interfaces
//!
//! Contracts between the price core and its external collaborators.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceStore`: Authoritative price storage written by price makers
//!
//! ## Driver Ports (Inbound)
//!
//! - `Authenticator`: Verifies a caller before a stream is opened

mod authenticator_port;
mod price_store_port;

pub use authenticator_port::{AuthError, Authenticator, Identity};
pub use price_store_port::{PriceStore, StoreError};

#[cfg(test)]
pub use price_store_port::MockPriceStore;
