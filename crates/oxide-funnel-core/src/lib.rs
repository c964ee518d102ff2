#![deny(missing_docs)]
//! Oxide Funnel core library.
//!
//! Platform-independent logic of the delayed outbound funnel: scheduling,
//! dispatch guard, stage machine and resilient delivery.

/// Configuration management.
pub mod config;
/// Delivery layer with fallback chains.
pub mod delivery;
/// Error types and classification.
pub mod error;
/// Funnel engine and stages.
pub mod funnel;
/// Messaging gateway abstraction.
pub mod gateway;
/// Named job scheduler.
pub mod scheduler;

#[cfg(test)]
pub mod testing;
