//! Recurring activate-then-claim cycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::Result;

use super::{Orchestrator, TaskReport};

/// Reports of one daily cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub activation: TaskReport,
    pub claim: TaskReport,
}

impl Orchestrator {
    /// Activation for all wallets, then claims for all wallets
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let activation = self.activate_all().await?;
        let claim = self.claim_all().await?;
        Ok(CycleReport { activation, claim })
    }
}

/// Clears the running flag however the cycle ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs the daily cycle on a fixed period, never two at once
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    period: Duration,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, period: Duration) -> Self {
        Self {
            orchestrator,
            period,
            running: AtomicBool::new(false),
        }
    }

    /// Run one cycle unless another is still in flight (`None`)
    pub async fn tick(&self) -> Result<Option<CycleReport>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Previous cycle still running, skipping this one");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);
        self.orchestrator.run_cycle().await.map(Some)
    }

    /// Run a cycle now and then once per period. Stops after `max_cycles`
    /// when given, otherwise runs until the task is dropped.
    ///
    /// Returns the number of cycles started.
    pub async fn run(&self, max_cycles: Option<u32>) -> Result<u32> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cycles = 0u32;
        loop {
            interval.tick().await;
            cycles += 1;
            info!("Starting cycle {}", cycles);

            if let Some(report) = self.tick().await? {
                info!(
                    "Cycle {} done. Activation: {}. Claim: {}",
                    cycles, report.activation, report.claim
                );
            }

            if max_cycles.map_or(false, |max| cycles >= max) {
                return Ok(cycles);
            }
            info!(
                "Next cycle in {}h {}m",
                self.period.as_secs() / 3600,
                (self.period.as_secs() % 3600) / 60
            );
        }
    }
}
