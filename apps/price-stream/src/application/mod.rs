//! Application Layer - Use cases and port definitions.
//!
//! Ports describe the storage and authentication collaborators; services
//! drive the domain walk against them.

/// Port interfaces for external collaborators (price storage, authentication).
pub mod ports;

/// Application services (price makers).
pub mod services;
