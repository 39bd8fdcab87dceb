//! Remote light-node service client
//!
//! Every operation is one request/response routed through the given proxy.
//! The client never retries; [`crate::retry::RetryPolicy`] is layered on top.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::Result;

pub use http::HttpService;

/// Success messages the service answers with
pub const MSG_REGISTERED: &str = "registered wallet address successfully";
pub const MSG_NODE_STARTED: &str = "node action executed successfully";
pub const MSG_POINTS_CLAIMED: &str = "node points claimed successfully";

/// Successful (2xx) service response
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    pub status: u16,
    /// `message` field of the body, empty when absent
    pub message: String,
    pub body: Value,
}

impl ServiceReply {
    pub fn new(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            message,
            body,
        }
    }

    pub fn is_message(&self, expected: &str) -> bool {
        self.message.trim().eq_ignore_ascii_case(expected)
    }
}

/// Verification endpoints sharing the `{sign, timestamp, walletAddress}` shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTask {
    /// Tier 2 pledge pass
    PremiumPass,
    /// Tier 1 pledge pass
    BasicPass,
    ProofSubmission,
    NodeRun,
}

impl fmt::Display for VerificationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationTask::PremiumPass => write!(f, "premium pass"),
            VerificationTask::BasicPass => write!(f, "basic pass"),
            VerificationTask::ProofSubmission => write!(f, "proof submission"),
            VerificationTask::NodeRun => write!(f, "node run"),
        }
    }
}

/// Operations offered by the remote service
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn verify_referral_code(&self, code: &str, proxy: Option<&str>) -> Result<ServiceReply>;

    async fn register(&self, address: &str, proxy: Option<&str>) -> Result<ServiceReply>;

    async fn activate(
        &self,
        address: &str,
        signature: &str,
        timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply>;

    async fn claim_points(
        &self,
        address: &str,
        signature: &str,
        timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply>;

    async fn verify(
        &self,
        task: VerificationTask,
        signature: &str,
        timestamp: i64,
        address: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply>;

    async fn submit_proof(
        &self,
        address: &str,
        message: &str,
        proof: &str,
        signature: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply>;
}
