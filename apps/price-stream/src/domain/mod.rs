//! Domain Layer - Pricing and admission logic.
//!
//! Pure types and state machines with no I/O. Time and randomness are
//! supplied by callers so everything here is deterministic under test.

/// Asset prices, change events, and the random-walk state machine.
pub mod pricing;

/// Per-identity request rate governor.
pub mod admission;
