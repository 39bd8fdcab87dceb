//! Light-node wallet automator
//!
//! Registers wallets under a referral code, activates their light nodes on a
//! 24h cooldown and claims the daily points, each wallet through its own
//! proxy with retry and proxy failover.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod proxy;
pub mod retry;
pub mod store;
pub mod tasks;
pub mod wallet;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
