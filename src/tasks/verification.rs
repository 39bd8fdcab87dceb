//! Point verification tasks: pledge passes, proof submission, node run

use tracing::{error, info, warn};

use crate::client::VerificationTask;
use crate::error::{Error, Result};
use crate::retry::TaskKind;
use crate::store::{Ledger, ProofRecord};
use crate::wallet::{Wallet, WalletSigner};

use super::{
    node_run_message, pass_verification_message, proof_submission_message,
    proof_verification_message, Orchestrator, Outcome, TaskReport,
};

/// Offset between the premium and basic pass timestamps
const BASIC_PASS_OFFSET_MS: i64 = 200;

/// Supplies proof text for wallets without a stored proof
pub trait ProofTextSource: Send + Sync {
    /// `None` skips the wallet
    fn proof_text(&self, wallet: &Wallet) -> Result<Option<String>>;
}

/// Same text for every wallet
pub struct FixedProof(pub String);

impl ProofTextSource for FixedProof {
    fn proof_text(&self, _wallet: &Wallet) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

impl Orchestrator {
    /// One signed verification call on the wallet's current proxy
    async fn verify_once(
        &self,
        wallet: &Wallet,
        task: VerificationTask,
        message: String,
        timestamp: i64,
    ) -> std::result::Result<(), Outcome> {
        let signature = self.sign(wallet, &message)?;
        let (addr, sig) = (wallet.address.as_str(), signature.as_str());
        let service = self.service.as_ref();
        self.policy
            .execute(
                |proxy| async move {
                    service
                        .verify(task, sig, timestamp, addr, proxy.as_deref())
                        .await
                },
                wallet.proxy.clone(),
            )
            .await
            .map(|_| ())
            .map_err(|e| self.verification_failure(wallet, task, e))
    }

    fn verification_failure(&self, wallet: &Wallet, task: VerificationTask, e: Error) -> Outcome {
        let is_pass = matches!(
            task,
            VerificationTask::PremiumPass | VerificationTask::BasicPass
        );
        if is_pass && e.status() == Some(404) {
            warn!("Wallet #{} does not own the {}; mint it first", wallet.id, task);
            return Outcome::Failed(format!("{} not owned", task));
        }
        if self
            .policy
            .classification()
            .is_benign(TaskKind::Verification, &e)
        {
            info!("Wallet #{} {} already verified", wallet.id, task);
            return Outcome::AlreadyDone;
        }
        error!("Wallet #{} {} failed: {}", wallet.id, task, e);
        Outcome::Failed(e.to_string())
    }

    /// Claim the verification points of both pledge passes.
    ///
    /// Each pass counts as its own entry in the report.
    pub async fn verify_passes_all(&self) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut report = TaskReport::default();

        for index in 0..wallets.len() {
            let before = wallets[index].proxy.clone();
            self.ensure_proxy(&mut wallets[index]);
            self.persist_wallets_if_changed(&wallets, index, &before)?;
            let wallet = &wallets[index];
            self.announce_proxy(wallet).await;

            let timestamp = self.clock.now_millis();
            let passes = [
                (VerificationTask::PremiumPass, timestamp),
                (VerificationTask::BasicPass, timestamp + BASIC_PASS_OFFSET_MS),
            ];
            for (task, ts) in passes {
                let message = pass_verification_message(&wallet.address, ts);
                let outcome = match self.verify_once(wallet, task, message, ts).await {
                    Ok(()) => {
                        info!("Wallet #{} {} verified", wallet.id, task);
                        Outcome::Succeeded
                    }
                    Err(outcome) => outcome,
                };
                report.record(&outcome);
            }
            self.settle().await;
        }

        info!("Pass verification finished: {}", report);
        Ok(report)
    }

    /// Submit each wallet's proof once, then claim its verification points.
    ///
    /// A proof already submitted is never sent again; only its
    /// verification is retried.
    pub async fn submit_proofs_all(&self, source: &dyn ProofTextSource) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut ledger = Ledger::load(&self.state.proofs)?;
        let mut report = TaskReport::default();

        for index in 0..wallets.len() {
            let existing = ledger.get(&wallets[index].address).cloned();
            if existing.as_ref().map_or(false, ProofRecord::is_complete) {
                info!("Wallet #{} proof already verified", wallets[index].id);
                report.record(&Outcome::Skipped);
                continue;
            }

            let mut record = match existing {
                Some(record) => record,
                None => match source.proof_text(&wallets[index])? {
                    Some(text) => match ProofRecord::new(wallets[index].address.clone(), text) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!("Wallet #{} proof rejected: {}", wallets[index].id, e);
                            report.record(&Outcome::Failed(e.to_string()));
                            continue;
                        }
                    },
                    None => {
                        report.record(&Outcome::Skipped);
                        continue;
                    }
                },
            };

            let before = wallets[index].proxy.clone();
            self.ensure_proxy(&mut wallets[index]);
            self.persist_wallets_if_changed(&wallets, index, &before)?;

            let outcome = self.run_proof(&wallets[index], &mut record).await;
            ledger.upsert(record);
            ledger.save()?;
            report.record(&outcome);
            self.settle().await;
        }

        info!("Proof task finished: {}", report);
        Ok(report)
    }

    async fn run_proof(&self, wallet: &Wallet, record: &mut ProofRecord) -> Outcome {
        if record.is_submitted {
            info!("Wallet #{} proof already submitted, verifying", wallet.id);
        } else {
            match self.submit_proof(wallet, record).await {
                Ok(()) => {
                    record.mark_submitted();
                    info!("Wallet #{} proof submitted", wallet.id);
                }
                Err(e) if self.policy.classification().is_benign(TaskKind::Proof, &e) => {
                    warn!("Wallet #{} proof was already submitted; it is accepted only once", wallet.id);
                    record.mark_submitted();
                }
                Err(e) if e.status() == Some(404) => {
                    warn!("Wallet #{} does not own the premium pass; mint it first", wallet.id);
                    return Outcome::Failed("premium pass not owned".to_string());
                }
                Err(e) => {
                    error!("Wallet #{} proof submission failed: {}", wallet.id, e);
                    return Outcome::Failed(e.to_string());
                }
            }
        }

        if !self.timing.proof_verify_delay.is_zero() {
            tokio::time::sleep(self.timing.proof_verify_delay).await;
        }

        let timestamp = self.clock.now_millis();
        let message = proof_verification_message(&wallet.address, timestamp);
        match self
            .verify_once(wallet, VerificationTask::ProofSubmission, message, timestamp)
            .await
        {
            Ok(()) | Err(Outcome::AlreadyDone) => {
                record.mark_verified();
                info!("Wallet #{} proof verified", wallet.id);
                Outcome::Succeeded
            }
            Err(outcome) => outcome,
        }
    }

    async fn submit_proof(&self, wallet: &Wallet, record: &ProofRecord) -> Result<()> {
        let message = proof_submission_message(self.clock.now_millis());
        let signature = WalletSigner::for_wallet(wallet)?.sign(&message)?;
        let (addr, msg, proof, sig) = (
            wallet.address.as_str(),
            message.as_str(),
            record.proof.as_str(),
            signature.as_str(),
        );
        let service = self.service.as_ref();
        self.policy
            .execute(
                |proxy| async move {
                    service
                        .submit_proof(addr, msg, proof, sig, proxy.as_deref())
                        .await
                },
                wallet.proxy.clone(),
            )
            .await
            .map(|_| ())
    }

    /// Claim the light-node run points for every wallet
    pub async fn verify_node_run_all(&self) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut report = TaskReport::default();

        for index in 0..wallets.len() {
            let before = wallets[index].proxy.clone();
            self.ensure_proxy(&mut wallets[index]);
            self.persist_wallets_if_changed(&wallets, index, &before)?;
            let wallet = &wallets[index];

            let timestamp = self.clock.now_millis();
            let message = node_run_message(&wallet.address, timestamp);
            let outcome = match self
                .verify_once(wallet, VerificationTask::NodeRun, message, timestamp)
                .await
            {
                Ok(()) => {
                    info!("Wallet #{} node run points claimed", wallet.id);
                    Outcome::Succeeded
                }
                Err(outcome) => outcome,
            };
            report.record(&outcome);
            self.settle().await;
        }

        info!("Node run task finished: {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, wallet, Reply};

    struct NoProof;

    impl ProofTextSource for NoProof {
        fn proof_text(&self, _wallet: &Wallet) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_pass_outcomes() {
        let h = harness(vec![wallet(1, None)], &["P0"], 2);
        h.service.script("premium_pass", [Reply::Status(404)]);
        h.service.script("basic_pass", [Reply::Status(409)]);

        let report = h.orchestrator.verify_passes_all().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.already_done, 1);
        assert_eq!(h.service.calls("premium_pass").len(), 1);
        assert_eq!(h.service.calls("basic_pass").len(), 1);
    }

    #[tokio::test]
    async fn test_new_proof_is_submitted_then_verified() {
        let h = harness(vec![wallet(1, None)], &["P0"], 2);

        let report = h
            .orchestrator
            .submit_proofs_all(&FixedProof("running a light node".into()))
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);

        let records = h.state.proofs.load().unwrap();
        assert_eq!(records[0].proof, "running a light node");
        assert!(records[0].is_complete());
        assert_eq!(h.service.calls("verify_proof").len(), 1);

        // complete records are left alone
        let report = h.orchestrator.submit_proofs_all(&NoProof).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.service.calls("submit_proof").len(), 1);
    }

    #[tokio::test]
    async fn test_submitted_proof_is_not_resent() {
        let h = harness(vec![wallet(1, None)], &["P0"], 2);
        let mut record = ProofRecord::new(wallet(1, None).address, "earlier proof").unwrap();
        record.mark_submitted();
        h.state.proofs.save(&[record]).unwrap();

        let report = h.orchestrator.submit_proofs_all(&NoProof).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(h.service.calls("submit_proof").is_empty());
        assert_eq!(h.service.calls("verify_proof").len(), 1);
        assert!(h.state.proofs.load().unwrap()[0].is_verified);
    }

    #[tokio::test]
    async fn test_rate_limited_submission_latches_submitted() {
        let h = harness(vec![wallet(1, None)], &["P0"], 2);
        h.service.script("submit_proof", [Reply::Status(429)]);
        h.service.script("verify_proof", [Reply::Status(401)]);

        let report = h
            .orchestrator
            .submit_proofs_all(&FixedProof("proof".into()))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.service.calls("submit_proof").len(), 1);

        let record = &h.state.proofs.load().unwrap()[0];
        assert!(record.is_submitted);
        assert!(!record.is_verified);
    }

    #[tokio::test]
    async fn test_overlong_proof_is_rejected_locally() {
        let h = harness(vec![wallet(1, None)], &["P0"], 2);
        let report = h
            .orchestrator
            .submit_proofs_all(&FixedProof("x".repeat(281)))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.service.total_calls(), 0);
        assert!(h.state.proofs.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_run_conflict_is_already_done() {
        let h = harness(vec![wallet(1, None), wallet(2, None)], &["P0"], 2);
        h.service.script("node_run", [Reply::Status(409)]);

        let report = h.orchestrator.verify_node_run_all().await.unwrap();
        assert_eq!(report.already_done, 1);
        assert_eq!(report.succeeded, 1);
    }
}
