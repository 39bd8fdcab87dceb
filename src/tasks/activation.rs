//! Node activation, gated by a 24h cooldown per address

use tracing::{error, info, warn};

use crate::client::MSG_NODE_STARTED;
use crate::error::Result;
use crate::retry::TaskKind;
use crate::store::{ActivationRecord, Ledger};
use crate::wallet::Wallet;

use super::{activation_message, Orchestrator, Outcome, TaskReport};

impl Orchestrator {
    /// Activate the light node of every wallet whose cooldown has elapsed
    pub async fn activate_all(&self) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut ledger = Ledger::load(&self.state.activations)?;
        let mut report = TaskReport::default();

        for index in 0..wallets.len() {
            let now = self.clock.now_millis();
            if let Some(record) = ledger.get(&wallets[index].address) {
                if !record.is_due(now) {
                    let remaining = record.remaining_ms(now) / 1000;
                    info!(
                        "Wallet #{} activated recently, next activation in {}h {}m",
                        wallets[index].id,
                        remaining / 3600,
                        (remaining % 3600) / 60
                    );
                    report.record(&Outcome::Skipped);
                    continue;
                }
            }

            let before = wallets[index].proxy.clone();
            let outcome = self.activate_wallet(&mut wallets[index], &mut ledger).await?;
            self.persist_wallets_if_changed(&wallets, index, &before)?;
            report.record(&outcome);
            self.settle().await;
        }

        info!("Activation finished: {}", report);
        Ok(report)
    }

    async fn activate_wallet(
        &self,
        wallet: &mut Wallet,
        ledger: &mut Ledger<ActivationRecord>,
    ) -> Result<Outcome> {
        self.ensure_proxy(wallet);
        self.announce_proxy(wallet).await;

        let timestamp = self.clock.now_millis();
        let signature = match self.sign(wallet, &activation_message(&wallet.address, timestamp)) {
            Ok(signature) => signature,
            Err(outcome) => return Ok(outcome),
        };
        info!("Activating node for wallet #{}", wallet.id);

        let address = wallet.address.clone();
        let (addr, sig) = (address.as_str(), signature.as_str());
        let service = self.service.as_ref();
        let result = self
            .policy
            .execute_with_rotation(
                |proxy| async move {
                    service
                        .activate(addr, sig, timestamp, proxy.as_deref())
                        .await
                },
                wallet,
                &self.proxies,
            )
            .await;

        let outcome = match result {
            Ok(reply) if reply.is_message(MSG_NODE_STARTED) => {
                info!("Wallet #{} node activated", wallet.id);
                Outcome::Succeeded
            }
            Ok(reply) => {
                warn!(
                    "Wallet #{} activation answered unexpectedly: {}",
                    wallet.id, reply.body
                );
                return Ok(Outcome::Failed(format!("unexpected reply: {}", reply.message)));
            }
            Err(e) if self.policy.classification().is_benign(TaskKind::Activation, &e) => {
                info!("Wallet #{} node already active ({})", wallet.id, e);
                Outcome::AlreadyDone
            }
            Err(e) => {
                error!("Wallet #{} activation failed: {}", wallet.id, e);
                return Ok(Outcome::Failed(e.to_string()));
            }
        };

        ledger.upsert(ActivationRecord {
            address,
            last_activation: timestamp,
        });
        ledger.save()?;
        Ok(outcome)
    }
}
