//! Wallet registration under the referral code

use serde_json::Value;
use tracing::{error, info, warn};

use crate::client::MSG_REGISTERED;
use crate::error::{Error, Result};
use crate::retry::TaskKind;
use crate::store::{Ledger, RegistrationRecord};
use crate::wallet::Wallet;

use super::{Orchestrator, Outcome, TaskReport};

impl Orchestrator {
    /// Register every wallet not yet recorded as registered.
    ///
    /// The registration record is rewritten after each wallet, so an
    /// interrupted batch resumes where it stopped.
    pub async fn register_all(&self) -> Result<TaskReport> {
        let mut wallets = self.state.load_wallets()?;
        let mut ledger = Ledger::load(&self.state.registrations)?;
        let mut report = TaskReport::default();

        let pending = wallets
            .iter()
            .filter(|w| !ledger.get(&w.address).map_or(false, |r| r.is_registered))
            .count();
        info!(
            "Registration: {} wallets, {} pending",
            wallets.len(),
            pending
        );
        if pending > 0 {
            self.check_referral_code().await?;
        }

        for index in 0..wallets.len() {
            let wallet = &wallets[index];
            if ledger.get(&wallet.address).map_or(false, |r| r.is_registered) {
                info!("Wallet #{} already registered, skipping", wallet.id);
                report.record(&Outcome::Skipped);
                continue;
            }

            let before = wallets[index].proxy.clone();
            let outcome = self.register_wallet(&mut wallets[index], &mut ledger).await?;
            self.persist_wallets_if_changed(&wallets, index, &before)?;
            report.record(&outcome);
            self.settle().await;
        }

        info!("Registration finished: {}", report);
        Ok(report)
    }

    async fn register_wallet(
        &self,
        wallet: &mut Wallet,
        ledger: &mut Ledger<RegistrationRecord>,
    ) -> Result<Outcome> {
        self.ensure_proxy(wallet);
        self.announce_proxy(wallet).await;
        info!("Registering wallet #{} [{}]", wallet.id, wallet.address);

        let address = wallet.address.clone();
        let addr = address.as_str();
        let service = self.service.as_ref();
        let result = self
            .policy
            .execute_with_rotation(
                |proxy| async move { service.register(addr, proxy.as_deref()).await },
                wallet,
                &self.proxies,
            )
            .await;

        let outcome = match result {
            Ok(reply) if reply.is_message(MSG_REGISTERED) => {
                info!("Wallet #{} registered", wallet.id);
                Outcome::Succeeded
            }
            Ok(reply) => {
                warn!(
                    "Wallet #{} registration answered unexpectedly: {}",
                    wallet.id, reply.body
                );
                Outcome::Failed(format!("unexpected reply: {}", reply.message))
            }
            Err(e) if self.policy.classification().is_benign(TaskKind::Registration, &e) => {
                info!("Wallet #{} was already registered ({})", wallet.id, e);
                Outcome::AlreadyDone
            }
            Err(e) => {
                error!("Wallet #{} registration failed: {}", wallet.id, e);
                Outcome::Failed(e.to_string())
            }
        };

        ledger.upsert(RegistrationRecord {
            address,
            proxy: wallet.proxy.clone(),
            is_registered: outcome.is_success(),
        });
        ledger.save()?;
        Ok(outcome)
    }

    /// Ask the service whether the referral code is valid.
    ///
    /// Only an explicit `valid: false` stops the batch; an unreachable
    /// service is logged and registration proceeds.
    async fn check_referral_code(&self) -> Result<()> {
        let Some(code) = self.referral_code.as_deref() else {
            return Ok(());
        };

        let proxy = self.proxies.endpoints().first().cloned();
        let service = self.service.as_ref();
        let result = self
            .policy
            .execute(
                |proxy| async move { service.verify_referral_code(code, proxy.as_deref()).await },
                proxy,
            )
            .await;

        match result {
            Ok(reply) => {
                let valid = reply
                    .body
                    .pointer("/data/valid")
                    .and_then(Value::as_bool);
                if valid == Some(false) {
                    return Err(Error::Config(format!(
                        "referral code {} was rejected by the service",
                        code
                    )));
                }
                info!("Referral code {} accepted", code);
            }
            Err(e) => warn!("Could not verify referral code {}: {}", code, e),
        }
        Ok(())
    }
}
