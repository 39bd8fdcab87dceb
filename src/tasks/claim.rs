//! Daily point claim

use tracing::{error, info, warn};

use crate::client::MSG_POINTS_CLAIMED;
use crate::error::Result;
use crate::retry::TaskKind;
use crate::wallet::Wallet;

use super::{claim_message, Orchestrator, Outcome, TaskReport};

impl Orchestrator {
    /// Claim daily points for every wallet. Nothing is persisted apart from
    /// proxy assignments; the service rejects repeat claims itself.
    pub async fn claim_all(&self) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut report = TaskReport::default();

        for index in 0..wallets.len() {
            let before = wallets[index].proxy.clone();
            let outcome = self.claim_wallet(&mut wallets[index]).await;
            self.persist_wallets_if_changed(&wallets, index, &before)?;
            report.record(&outcome);
            self.settle().await;
        }

        info!("Claim finished: {}", report);
        Ok(report)
    }

    async fn claim_wallet(&self, wallet: &mut Wallet) -> Outcome {
        self.ensure_proxy(wallet);

        let timestamp = self.clock.now_millis();
        let signature = match self.sign(wallet, &claim_message(&wallet.address, timestamp)) {
            Ok(signature) => signature,
            Err(outcome) => return outcome,
        };
        info!("Claiming points for wallet #{}", wallet.id);

        let address = wallet.address.clone();
        let (addr, sig) = (address.as_str(), signature.as_str());
        let service = self.service.as_ref();
        let result = self
            .policy
            .execute_with_rotation(
                |proxy| async move {
                    service
                        .claim_points(addr, sig, timestamp, proxy.as_deref())
                        .await
                },
                wallet,
                &self.proxies,
            )
            .await;

        match result {
            Ok(reply) if reply.is_message(MSG_POINTS_CLAIMED) => {
                info!("Wallet #{} claimed points", wallet.id);
                Outcome::Succeeded
            }
            Ok(reply) => {
                warn!(
                    "Wallet #{} claim answered unexpectedly: {}",
                    wallet.id, reply.body
                );
                Outcome::Failed(format!("unexpected reply: {}", reply.message))
            }
            Err(e) if self.policy.classification().is_benign(TaskKind::Claim, &e) => {
                info!("Wallet #{} already claimed today ({})", wallet.id, e);
                Outcome::AlreadyDone
            }
            Err(e) => {
                error!("Wallet #{} claim failed: {}", wallet.id, e);
                Outcome::Failed(e.to_string())
            }
        }
    }
}
