//! Persisted per-address records

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Activation cooldown window
pub const ACTIVATION_COOLDOWN_MS: i64 = 86_400_000;

/// Longest proof text the service accepts
pub const MAX_PROOF_CHARS: usize = 280;

/// Records looked up by wallet address
pub trait Keyed {
    fn address(&self) -> &str;

    /// Addresses compare case-insensitively
    fn matches(&self, address: &str) -> bool {
        self.address().eq_ignore_ascii_case(address)
    }
}

/// Outcome of the last registration attempt for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub address: String,
    /// Proxy the attempt went through
    #[serde(default)]
    pub proxy: Option<String>,
    pub is_registered: bool,
}

impl Keyed for RegistrationRecord {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Time of the last successful node activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub address: String,
    /// Epoch milliseconds
    pub last_activation: i64,
}

impl ActivationRecord {
    /// Whether activation may run at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms - self.last_activation >= ACTIVATION_COOLDOWN_MS
    }

    /// Milliseconds until the cooldown ends (0 when due)
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.last_activation + ACTIVATION_COOLDOWN_MS - now_ms).max(0)
    }
}

impl Keyed for ActivationRecord {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Proof text and its submission state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub address: String,
    pub proof: String,
    /// One-way: the service rejects resubmission
    pub is_submitted: bool,
    pub is_verified: bool,
}

impl ProofRecord {
    /// New unsubmitted record; proof text is limited to 280 characters
    pub fn new(address: impl Into<String>, proof: impl Into<String>) -> Result<Self> {
        let proof = proof.into();
        validate_proof_text(&proof)?;
        Ok(Self {
            address: address.into(),
            proof,
            is_submitted: false,
            is_verified: false,
        })
    }

    pub fn mark_submitted(&mut self) {
        self.is_submitted = true;
    }

    /// Verification only counts once the proof is submitted
    pub fn mark_verified(&mut self) {
        if self.is_submitted {
            self.is_verified = true;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.is_submitted && self.is_verified
    }
}

impl Keyed for ProofRecord {
    fn address(&self) -> &str {
        &self.address
    }
}

pub fn validate_proof_text(text: &str) -> Result<()> {
    let chars = text.chars().count();
    if text.trim().is_empty() {
        return Err(Error::InvalidProof("proof text is empty".to_string()));
    }
    if chars > MAX_PROOF_CHARS {
        return Err(Error::InvalidProof(format!(
            "proof text is {} characters, at most {} allowed",
            chars, MAX_PROOF_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_boundaries() {
        let t = 1_700_000_000_000;
        let record = ActivationRecord {
            address: "0xabc".into(),
            last_activation: t,
        };
        assert!(!record.is_due(t + 86_399_999));
        assert!(record.is_due(t + 86_400_001));
        assert_eq!(record.remaining_ms(t + 86_399_000), 1_000);
        assert_eq!(record.remaining_ms(t + 90_000_000), 0);
    }

    #[test]
    fn test_proof_text_limit() {
        assert!(ProofRecord::new("0xabc", "a".repeat(280)).is_ok());
        assert!(matches!(
            ProofRecord::new("0xabc", "a".repeat(281)),
            Err(Error::InvalidProof(_))
        ));
        assert!(ProofRecord::new("0xabc", "   ").is_err());
        // counted in characters, not bytes
        assert!(ProofRecord::new("0xabc", "é".repeat(280)).is_ok());
    }

    #[test]
    fn test_verified_requires_submitted() {
        let mut record = ProofRecord::new("0xabc", "proof").unwrap();
        record.mark_verified();
        assert!(!record.is_verified);
        record.mark_submitted();
        record.mark_verified();
        assert!(record.is_complete());
    }

    #[test]
    fn test_keyed_case_insensitive() {
        let record = RegistrationRecord {
            address: "0xABCdef".into(),
            proxy: None,
            is_registered: true,
        };
        assert!(record.matches("0xabcDEF"));
        assert!(!record.matches("0xabcdee"));
    }
}
