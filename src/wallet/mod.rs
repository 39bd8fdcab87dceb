//! Wallet identities and request signing
//!
//! Wallets are loaded from wallets.json once per run. Each carries the
//! secret used to sign service messages and an optional proxy assignment.

pub mod signer;
pub mod types;

pub use signer::WalletSigner;
pub use types::Wallet;
