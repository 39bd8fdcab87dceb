//! Retry/failover policy engine
//!
//! Wraps a remote operation in up to two phases of constant-delay retries.
//! Phase one uses the wallet's current proxy; when a wallet and proxy list
//! are supplied, phase two rotates the wallet to the next proxy and tries
//! again before giving up with [`Error::ExhaustedRetries`]. An empty proxy
//! list has nothing to rotate to, so the wallet keeps its proxy and only
//! one phase runs.

pub mod classify;

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ClassificationConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::proxy::{proxy_label, ProxyList};
use crate::wallet::Wallet;

pub use classify::{ErrorClass, TaskKind};

/// Constant delay, bounded number of attempts, no jitter.
#[derive(Debug, Clone)]
pub struct PhaseBackoff {
    delay: Duration,
    max_attempts: u32,
    retries_left: u32,
}

impl PhaseBackoff {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        let max_attempts = max_attempts.max(1);
        Self {
            delay,
            max_attempts,
            retries_left: max_attempts - 1,
        }
    }
}

impl Backoff for PhaseBackoff {
    fn reset(&mut self) {
        self.retries_left = self.max_attempts - 1;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self.delay)
    }
}

/// Outcome of one phase
enum PhaseResult<T> {
    Done(T),
    Fatal(Error),
    Exhausted(Error),
}

/// Classification-driven retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts_per_phase: u32,
    base_delay: Duration,
    classification: ClassificationConfig,
}

impl RetryPolicy {
    pub fn new(
        max_attempts_per_phase: u32,
        base_delay: Duration,
        classification: ClassificationConfig,
    ) -> Self {
        Self {
            max_attempts_per_phase: max_attempts_per_phase.max(1),
            base_delay,
            classification,
        }
    }

    pub fn from_config(retry: &RetryConfig, classification: &ClassificationConfig) -> Self {
        Self::new(
            retry.max_attempts_per_phase,
            retry.base_delay(),
            classification.clone(),
        )
    }

    pub fn classification(&self) -> &ClassificationConfig {
        &self.classification
    }

    /// Run `operation` for a single phase on a fixed proxy.
    pub async fn execute<T, F, Fut>(&self, mut operation: F, proxy: Option<String>) -> Result<T>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (result, attempts) = self.run_phase(&mut operation, proxy).await;
        match result {
            PhaseResult::Done(value) => Ok(value),
            PhaseResult::Fatal(e) => Err(e),
            PhaseResult::Exhausted(last) => Err(Error::ExhaustedRetries {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Run `operation` for up to two phases, rotating the wallet's proxy
    /// between them. The wallet's in-memory assignment is left on the proxy
    /// used last; persisting it is up to the caller.
    pub async fn execute_with_rotation<T, F, Fut>(
        &self,
        mut operation: F,
        wallet: &mut Wallet,
        proxies: &ProxyList,
    ) -> Result<T>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (first, first_attempts) = self.run_phase(&mut operation, wallet.proxy.clone()).await;
        let first_error = match first {
            PhaseResult::Done(value) => return Ok(value),
            PhaseResult::Fatal(e) => return Err(e),
            PhaseResult::Exhausted(e) => e,
        };

        let previous = wallet.proxy.clone();
        let Some(next) = proxies.next_after(previous.as_deref()) else {
            warn!(
                "Wallet #{} exhausted {} attempts on proxy [{}] ({}), no proxy to rotate to",
                wallet.id,
                first_attempts,
                proxy_label(previous.as_deref().unwrap_or_default()),
                first_error,
            );
            return Err(Error::ExhaustedRetries {
                attempts: first_attempts,
                last: Box::new(first_error),
            });
        };
        wallet.proxy = Some(next);
        warn!(
            "Wallet #{} exhausted {} attempts on proxy [{}] ({}), rotating to [{}]",
            wallet.id,
            first_attempts,
            proxy_label(previous.as_deref().unwrap_or_default()),
            first_error,
            proxy_label(wallet.proxy.as_deref().unwrap_or_default()),
        );

        let (second, second_attempts) = self.run_phase(&mut operation, wallet.proxy.clone()).await;
        match second {
            PhaseResult::Done(value) => Ok(value),
            PhaseResult::Fatal(e) => Err(e),
            PhaseResult::Exhausted(last) => Err(Error::ExhaustedRetries {
                attempts: first_attempts + second_attempts,
                last: Box::new(last),
            }),
        }
    }

    async fn run_phase<T, F, Fut>(
        &self,
        operation: &mut F,
        proxy: Option<String>,
    ) -> (PhaseResult<T>, u32)
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        let backoff = PhaseBackoff::new(self.max_attempts_per_phase, self.base_delay);
        let classification = &self.classification;
        let max = self.max_attempts_per_phase;

        let result = backoff::future::retry_notify(
            backoff,
            || {
                attempts += 1;
                debug!("Attempt {}/{}", attempts, max);
                let call = operation(proxy.clone());
                async move {
                    call.await.map_err(|e| match classification.classify(&e) {
                        ErrorClass::NonRetryable => backoff::Error::permanent(e),
                        ErrorClass::Transient => backoff::Error::transient(e),
                    })
                }
            },
            |e: Error, wait: Duration| {
                warn!("Transient error ({}), retrying in {}ms", e, wait.as_millis());
            },
        )
        .await;

        let outcome = match result {
            Ok(value) => PhaseResult::Done(value),
            Err(e) => match classification.classify(&e) {
                ErrorClass::NonRetryable => PhaseResult::Fatal(e),
                ErrorClass::Transient => PhaseResult::Exhausted(e),
            },
        };
        (outcome, attempts)
    }
}
