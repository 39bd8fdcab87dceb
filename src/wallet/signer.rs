//! EIP-191 message signing for wallet requests

use alloy::hex;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::error::{Error, Result};

use super::types::Wallet;

/// Signer bound to a wallet whose address has been checked against its key
pub struct WalletSigner {
    signer: PrivateKeySigner,
    address: String,
}

impl WalletSigner {
    /// Build a signer from a wallet entry.
    ///
    /// Fails with [`Error::AddressMismatch`] when the listed address is not
    /// the one the key derives.
    pub fn for_wallet(wallet: &Wallet) -> Result<Self> {
        let signer: PrivateKeySigner = wallet
            .private_key
            .trim()
            .parse()
            .map_err(|e| Error::InvalidKey(format!("wallet #{}: {}", wallet.id, e)))?;

        let derived = signer.address().to_checksum(None);
        if !derived.eq_ignore_ascii_case(wallet.address.trim()) {
            return Err(Error::AddressMismatch {
                expected: wallet.address.clone(),
                derived,
            });
        }

        Ok(Self {
            signer,
            address: derived,
        })
    }

    /// Checksummed address of the key
    pub fn address(&self) -> &str {
        &self.address
    }

    /// personal_sign over the UTF-8 message; 0x-prefixed 65-byte hex
    pub fn sign(&self, message: &str) -> Result<String> {
        let signature = self
            .signer
            .sign_message_sync(message.as_bytes())
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }
}
