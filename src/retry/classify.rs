//! Error classification for the retry engine
//!
//! Maps errors to retry behaviour and, per task, decides which failures
//! mean "the remote already holds the desired state".

use serde::Deserialize;

use crate::error::Error;

/// How the retry engine treats a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Propagate at once, no further attempts, no rotation
    NonRetryable,
    /// Consume one attempt and try again
    Transient,
}

/// Task whose benign codes apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Registration,
    Activation,
    Claim,
    Verification,
    Proof,
}

/// Per-task status codes treated as benign-already-done
#[derive(Debug, Clone, Deserialize)]
pub struct BenignCodes {
    #[serde(default = "default_registration_benign")]
    pub registration: Vec<u16>,
    #[serde(default = "default_activation_benign")]
    pub activation: Vec<u16>,
    /// Service versions disagree between 400 and 409 here
    #[serde(default = "default_claim_benign")]
    pub claim: Vec<u16>,
    #[serde(default = "default_verification_benign")]
    pub verification: Vec<u16>,
    /// Proof resubmission is answered with 429
    #[serde(default = "default_proof_benign")]
    pub proof: Vec<u16>,
}

/// Status-code classification table
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_non_retryable")]
    pub non_retryable: Vec<u16>,
    #[serde(default = "default_transient")]
    pub transient: Vec<u16>,
    #[serde(default)]
    pub benign: BenignCodes,
}

fn default_non_retryable() -> Vec<u16> {
    vec![400, 401, 403, 404, 405, 409, 410, 429]
}

fn default_transient() -> Vec<u16> {
    vec![502, 504]
}

fn default_registration_benign() -> Vec<u16> {
    vec![409]
}

fn default_activation_benign() -> Vec<u16> {
    vec![409, 410]
}

fn default_claim_benign() -> Vec<u16> {
    vec![400]
}

fn default_verification_benign() -> Vec<u16> {
    vec![409]
}

fn default_proof_benign() -> Vec<u16> {
    vec![429]
}

impl Default for BenignCodes {
    fn default() -> Self {
        Self {
            registration: default_registration_benign(),
            activation: default_activation_benign(),
            claim: default_claim_benign(),
            verification: default_verification_benign(),
            proof: default_proof_benign(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            non_retryable: default_non_retryable(),
            transient: default_transient(),
            benign: BenignCodes::default(),
        }
    }
}

impl ClassificationConfig {
    /// Reject tables that put one status in both buckets
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(code) = self
            .non_retryable
            .iter()
            .find(|code| self.transient.contains(code))
        {
            anyhow::bail!(
                "HTTP {} is listed as both non_retryable and transient",
                code
            );
        }
        Ok(())
    }

    /// Classify one failed attempt
    pub fn classify(&self, error: &Error) -> ErrorClass {
        match error {
            Error::Http { status, .. } if self.non_retryable.contains(status) => {
                ErrorClass::NonRetryable
            }
            Error::Http { status, .. } if self.transient.contains(status) => ErrorClass::Transient,
            Error::AlreadyDone(_) => ErrorClass::NonRetryable,
            // already wrapped by an inner policy run
            Error::ExhaustedRetries { .. } => ErrorClass::NonRetryable,
            e if e.is_local() => ErrorClass::NonRetryable,
            // transport failures, truncated bodies and anything unclassified
            _ => ErrorClass::Transient,
        }
    }

    fn benign_codes(&self, task: TaskKind) -> &[u16] {
        match task {
            TaskKind::Registration => &self.benign.registration,
            TaskKind::Activation => &self.benign.activation,
            TaskKind::Claim => &self.benign.claim,
            TaskKind::Verification => &self.benign.verification,
            TaskKind::Proof => &self.benign.proof,
        }
    }

    /// Check whether an error means the task's effect already holds
    pub fn is_benign(&self, task: TaskKind, error: &Error) -> bool {
        match error {
            Error::AlreadyDone(_) => true,
            Error::Http { status, .. } => self.benign_codes(task).contains(status),
            _ => false,
        }
    }
}
