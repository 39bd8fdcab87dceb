//! Scripted service, probe and clock doubles for orchestrator tests

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{
    RemoteService, ServiceReply, VerificationTask, MSG_NODE_STARTED, MSG_POINTS_CLAIMED,
    MSG_REGISTERED,
};
use crate::config::ClassificationConfig;
use crate::error::{Error, Result};
use crate::proxy::{IpProbe, ProxyList};
use crate::retry::RetryPolicy;
use crate::store::StateStore;
use crate::tasks::{Clock, Orchestrator, TaskTiming};
use crate::wallet::Wallet;

/// Hardhat development accounts
pub(crate) const ACCOUNTS: [(&str, &str); 3] = [
    (
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    ),
    (
        "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    ),
    (
        "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
        "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    ),
];

pub(crate) const T0: i64 = 1_700_000_000_000;

/// Wallet `id` backed by a real key (ids 1..=3)
pub(crate) fn wallet(id: u32, proxy: Option<&str>) -> Wallet {
    let (address, key) = ACCOUNTS[(id as usize - 1) % ACCOUNTS.len()];
    Wallet {
        id,
        address: address.to_string(),
        private_key: key.to_string(),
        proxy: proxy.map(str::to_string),
    }
}

/// One scripted answer
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Message(&'static str),
    Body(serde_json::Value),
    Status(u16),
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub address: String,
    pub proxy: Option<String>,
}

/// Records calls and answers from per-operation queues. An empty queue
/// answers with the operation's success message.
#[derive(Default)]
pub(crate) struct MockService {
    script: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, op: &'static str, replies: impl IntoIterator<Item = Reply>) {
        self.script
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self, op: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn respond(&self, op: &'static str, address: &str, proxy: Option<&str>) -> Result<ServiceReply> {
        self.calls.lock().unwrap().push(Call {
            op,
            address: address.to_string(),
            proxy: proxy.map(str::to_string),
        });

        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Reply::Message(message)) => Ok(ServiceReply::new(200, json!({ "message": message }))),
            Some(Reply::Body(body)) => Ok(ServiceReply::new(200, body)),
            Some(Reply::Status(status)) => Err(Error::Http {
                status,
                message: format!("scripted {}", status),
            }),
            Some(Reply::Transport) => Err(Error::Transport("socket hang up".to_string())),
            None => {
                let message = match op {
                    "register" => MSG_REGISTERED,
                    "activate" => MSG_NODE_STARTED,
                    "claim" => MSG_POINTS_CLAIMED,
                    _ => "ok",
                };
                Ok(ServiceReply::new(200, json!({ "message": message })))
            }
        }
    }
}

#[async_trait]
impl RemoteService for MockService {
    async fn verify_referral_code(&self, code: &str, proxy: Option<&str>) -> Result<ServiceReply> {
        self.respond("referral", code, proxy)
    }

    async fn register(&self, address: &str, proxy: Option<&str>) -> Result<ServiceReply> {
        self.respond("register", address, proxy)
    }

    async fn activate(
        &self,
        address: &str,
        _signature: &str,
        _timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        self.respond("activate", address, proxy)
    }

    async fn claim_points(
        &self,
        address: &str,
        _signature: &str,
        _timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        self.respond("claim", address, proxy)
    }

    async fn verify(
        &self,
        task: VerificationTask,
        _signature: &str,
        _timestamp: i64,
        address: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        let op = match task {
            VerificationTask::PremiumPass => "premium_pass",
            VerificationTask::BasicPass => "basic_pass",
            VerificationTask::ProofSubmission => "verify_proof",
            VerificationTask::NodeRun => "node_run",
        };
        self.respond(op, address, proxy)
    }

    async fn submit_proof(
        &self,
        address: &str,
        _message: &str,
        _proof: &str,
        _signature: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        self.respond("submit_proof", address, proxy)
    }
}

/// Probe with a fixed answer, or a failure
pub(crate) struct StaticProbe(pub Option<&'static str>);

#[async_trait]
impl IpProbe for StaticProbe {
    async fn public_ip(&self, _proxy: Option<&str>) -> Result<String> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| Error::Probe("timed out".to_string()))
    }
}

/// Settable clock
pub(crate) struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(millis)))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrator over in-memory state with no pauses
pub(crate) struct Harness {
    pub service: Arc<MockService>,
    pub clock: Arc<FixedClock>,
    pub state: StateStore,
    pub orchestrator: Orchestrator,
}

pub(crate) fn harness(wallets: Vec<Wallet>, proxies: &[&str], attempts: u32) -> Harness {
    harness_with_probe(wallets, proxies, attempts, Arc::new(StaticProbe(Some("203.0.113.7"))))
}

pub(crate) fn harness_with_probe(
    wallets: Vec<Wallet>,
    proxies: &[&str],
    attempts: u32,
    probe: Arc<dyn IpProbe>,
) -> Harness {
    let service = MockService::new();
    let clock = FixedClock::at(T0);
    let state = StateStore::in_memory();
    state.wallets.save(&wallets).unwrap();

    let proxies = ProxyList::new(proxies.iter().map(|p| p.to_string()).collect());
    let policy = RetryPolicy::new(attempts, Duration::ZERO, ClassificationConfig::default());
    let orchestrator = Orchestrator::new(service.clone(), probe, state.clone(), proxies, policy)
        .with_clock(clock.clone())
        .with_timing(TaskTiming {
            settle_delay: Duration::ZERO,
            proof_verify_delay: Duration::ZERO,
        });

    Harness {
        service,
        clock,
        state,
        orchestrator,
    }
}
