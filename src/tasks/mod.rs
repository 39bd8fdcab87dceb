//! Wallet task orchestrator
//!
//! Drives wallets one at a time, in list order, through registration,
//! activation, point claiming and the verification tasks. Persisted state
//! gates work that is already done or still cooling down, and every
//! per-wallet failure stays inside that wallet's iteration.
//!
//! # Architecture
//!
//! ```text
//! StateStore ─→ Orchestrator ─→ RetryPolicy ─→ RemoteService
//!                   │                │
//!                   └─ IpProbe       └─ ProxyList (rotation)
//! ```

pub mod activation;
pub mod claim;
pub mod registration;
pub mod scheduler;
pub mod verification;

use chrono::{SecondsFormat, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::client::RemoteService;
use crate::config::Config;
use crate::error::Result;
use crate::proxy::{proxy_label, IpProbe, ProxyList};
use crate::retry::RetryPolicy;
use crate::store::StateStore;
use crate::wallet::{Wallet, WalletSigner};

pub use scheduler::{CycleReport, Scheduler};
pub use verification::{FixedProof, ProofTextSource};

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Result of one wallet's task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// The service says the effect already holds
    AlreadyDone,
    /// Gated by persisted state; no remote call
    Skipped,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::AlreadyDone)
    }
}

/// Per-batch tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub succeeded: usize,
    pub already_done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TaskReport {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::AlreadyDone => self.already_done += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.already_done + self.skipped + self.failed
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} already done, {} skipped, {} failed",
            self.succeeded, self.already_done, self.skipped, self.failed
        )
    }
}

/// Fixed pauses between steps
#[derive(Debug, Clone)]
pub struct TaskTiming {
    pub settle_delay: Duration,
    pub proof_verify_delay: Duration,
}

impl Default for TaskTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            proof_verify_delay: Duration::from_secs(3),
        }
    }
}

// Messages the service expects signed

pub fn activation_message(address: &str, timestamp: i64) -> String {
    format!("Node activation request for {} at {}", address, timestamp)
}

pub fn claim_message(address: &str, timestamp: i64) -> String {
    format!("I am claiming my daily node point for {} at {}", address, timestamp)
}

pub fn pass_verification_message(address: &str, timestamp: i64) -> String {
    format!(
        "I am claiming my SBT verification points for {} at {}",
        address, timestamp
    )
}

pub fn proof_submission_message(timestamp: i64) -> String {
    let iso = Utc
        .timestamp_millis_opt(timestamp)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("I am submitting a proof for LayerEdge at {}", iso)
}

pub fn proof_verification_message(address: &str, timestamp: i64) -> String {
    format!(
        "I am claiming my proof submission node points for {} at {}",
        address, timestamp
    )
}

pub fn node_run_message(address: &str, timestamp: i64) -> String {
    format!(
        "I am claiming my light node run task node points for {} at {}",
        address, timestamp
    )
}

/// Sequential per-wallet task runner
pub struct Orchestrator {
    service: Arc<dyn RemoteService>,
    probe: Arc<dyn IpProbe>,
    clock: Arc<dyn Clock>,
    state: StateStore,
    proxies: ProxyList,
    policy: RetryPolicy,
    timing: TaskTiming,
    referral_code: Option<String>,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn RemoteService>,
        probe: Arc<dyn IpProbe>,
        state: StateStore,
        proxies: ProxyList,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            probe,
            clock: Arc::new(SystemClock),
            state,
            proxies,
            policy,
            timing: TaskTiming::default(),
            referral_code: None,
        }
    }

    /// Wire the orchestrator from configuration
    pub fn from_config(
        config: &Config,
        service: Arc<dyn RemoteService>,
        probe: Arc<dyn IpProbe>,
        state: StateStore,
        proxies: ProxyList,
    ) -> Self {
        Self::new(
            service,
            probe,
            state,
            proxies,
            RetryPolicy::from_config(&config.retry, &config.classification),
        )
        .with_timing(TaskTiming {
            settle_delay: config.schedule.settle_delay(),
            proof_verify_delay: config.schedule.proof_verify_delay(),
        })
        .with_referral_code(config.service.referral_code.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timing(mut self, timing: TaskTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_referral_code(mut self, code: String) -> Self {
        self.referral_code = Some(code);
        self
    }

    /// Pause between wallets
    async fn settle(&self) {
        if !self.timing.settle_delay.is_zero() {
            tokio::time::sleep(self.timing.settle_delay).await;
        }
    }

    /// Give the wallet its default proxy if it has none
    fn ensure_proxy(&self, wallet: &mut Wallet) {
        if self.proxies.assign(wallet) {
            info!(
                "Wallet #{} assigned proxy [{}]",
                wallet.id,
                proxy_label(wallet.proxy.as_deref().unwrap_or_default())
            );
        } else if wallet.proxy.is_none() {
            warn!("Wallet #{} has no proxy; connecting directly", wallet.id);
        }
    }

    /// Best-effort public IP lookup through the wallet's proxy
    async fn announce_proxy(&self, wallet: &Wallet) {
        let label = wallet
            .proxy
            .as_deref()
            .map(proxy_label)
            .unwrap_or_else(|| "direct".to_string());
        match self.probe.public_ip(wallet.proxy.as_deref()).await {
            Ok(ip) => info!("Using proxy [{}] - public IP [{}]", label, ip),
            Err(e) => warn!("Using proxy [{}] - IP probe failed: {}", label, e),
        }
    }

    /// Write back the wallet list when a proxy assignment changed
    fn persist_wallets_if_changed(
        &self,
        wallets: &[Wallet],
        index: usize,
        before: &Option<String>,
    ) -> Result<()> {
        if wallets[index].proxy != *before {
            self.state.wallets.save(wallets)?;
        }
        Ok(())
    }

    /// Sign `message` for the wallet, reporting failures as the wallet's outcome
    fn sign(&self, wallet: &Wallet, message: &str) -> std::result::Result<String, Outcome> {
        WalletSigner::for_wallet(wallet)
            .and_then(|signer| signer.sign(message))
            .map_err(|e| {
                error!("Wallet #{} cannot sign: {}", wallet.id, e);
                Outcome::Failed(e.to_string())
            })
    }
}
