//! CLI command implementations

use anyhow::Result;
use chrono::{TimeZone, Utc};
use dialoguer::{Confirm, Input, Select};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::HttpService;
use crate::config::Config;
use crate::error::Error;
use crate::proxy::{mask_proxy, proxy_label, DisabledProbe, HttpIpProbe, IpProbe, ProxyList};
use crate::store::{validate_proof_text, Ledger, StateStore, MAX_PROOF_CHARS};
use crate::tasks::{Orchestrator, ProofTextSource, Scheduler, TaskReport};
use crate::wallet::Wallet;

/// Verification task selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TaskChoice {
    /// Pledge pass (premium and basic) verification points
    Nft,
    /// Proof submission and its verification points
    Proof,
    /// Light-node run points
    Node,
}

fn probe_for(config: &Config) -> Arc<dyn IpProbe> {
    if config.probe.enabled {
        Arc::new(HttpIpProbe::new(&config.probe, &config.service.user_agent))
    } else {
        Arc::new(DisabledProbe)
    }
}

/// Wire an orchestrator over the configured files and service
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let state = StateStore::from_files(&config.files);
    let proxies = ProxyList::load(&config.files.proxies)?;
    let service = Arc::new(HttpService::new(config.service.clone()));

    let wallets = state.load_wallets()?;
    if wallets.is_empty() {
        warn!(
            "No wallets found in {}; add entries before running tasks",
            config.files.wallets.display()
        );
    }
    info!("Loaded {} wallets, {} proxies", wallets.len(), proxies.len());

    Ok(Orchestrator::from_config(
        config,
        service,
        probe_for(config),
        state,
        proxies,
    ))
}

/// Interactive menu, the default when no subcommand is given
pub async fn menu(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let items = [
        "Register wallets",
        "Activate nodes and claim points",
        "Claim daily points",
        "Verify pledge passes",
        "Submit proof",
        "Claim node run points",
        "Show status",
        "Exit",
    ];

    loop {
        let choice = Select::new()
            .with_prompt("Select an action")
            .items(&items)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => orchestrator.register_all().await.map(|r| print_report("Registration", &r)),
            1 => {
                let daily = Confirm::new()
                    .with_prompt("Repeat every 24 hours?")
                    .default(false)
                    .interact()?;
                return run_activation(config, orchestrator, daily).await;
            }
            2 => orchestrator.claim_all().await.map(|r| print_report("Claim", &r)),
            3 => orchestrator
                .verify_passes_all()
                .await
                .map(|r| print_report("Pass verification", &r)),
            4 => orchestrator
                .submit_proofs_all(&PromptedProof)
                .await
                .map(|r| print_report("Proof", &r)),
            5 => orchestrator
                .verify_node_run_all()
                .await
                .map(|r| print_report("Node run", &r)),
            6 => {
                status(config).await?;
                Ok(())
            }
            _ => return Ok(()),
        };
        result?;
    }
}

/// Activate nodes then claim points, once or every cycle period
pub async fn activate(config: &Config, daily: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    run_activation(config, orchestrator, daily).await
}

async fn run_activation(config: &Config, orchestrator: Orchestrator, daily: bool) -> Result<()> {
    if !daily {
        let report = orchestrator.run_cycle().await?;
        print_report("Activation", &report.activation);
        print_report("Claim", &report.claim);
        return Ok(());
    }

    let period = config.schedule.cycle_period();
    info!(
        "Scheduling activation and claim every {}h",
        config.schedule.cycle_hours
    );
    let scheduler = Scheduler::new(Arc::new(orchestrator), period);
    tokio::select! {
        result = scheduler.run(None) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping scheduler");
        }
    }
    Ok(())
}

pub async fn claim(config: &Config) -> Result<()> {
    let report = build_orchestrator(config)?.claim_all().await?;
    print_report("Claim", &report);
    Ok(())
}

pub async fn register(config: &Config) -> Result<()> {
    let report = build_orchestrator(config)?.register_all().await?;
    print_report("Registration", &report);
    Ok(())
}

pub async fn tasks(config: &Config, task: TaskChoice, proof: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let report = match task {
        TaskChoice::Nft => orchestrator.verify_passes_all().await?,
        TaskChoice::Node => orchestrator.verify_node_run_all().await?,
        TaskChoice::Proof => match proof {
            Some(text) => {
                validate_proof_text(&text)?;
                orchestrator
                    .submit_proofs_all(&crate::tasks::FixedProof(text))
                    .await?
            }
            None => orchestrator.submit_proofs_all(&PromptedProof).await?,
        },
    };
    print_report("Task", &report);
    Ok(())
}

/// Show the public IP each wallet's proxy exits from
pub async fn probe(config: &Config) -> Result<()> {
    let state = StateStore::from_files(&config.files);
    let proxies = ProxyList::load(&config.files.proxies)?;
    let probe = probe_for(config);

    println!("\n=== PROXY PROBE ===\n");
    for mut wallet in state.load_wallets()? {
        proxies.assign(&mut wallet);
        let label = wallet
            .proxy
            .as_deref()
            .map(proxy_label)
            .unwrap_or_else(|| "direct".to_string());
        print!("Wallet #{} [{}] via [{}]... ", wallet.id, wallet.short_address(), label);
        match probe.public_ip(wallet.proxy.as_deref()).await {
            Ok(ip) => println!("{}", ip),
            Err(e) => println!("FAILED: {}", e),
        }
    }
    println!();
    Ok(())
}

/// Per-wallet view of the persisted state
pub async fn status(config: &Config) -> Result<()> {
    let state = StateStore::from_files(&config.files);
    let wallets = state.load_wallets()?;
    let registrations = Ledger::load(&state.registrations)?;
    let activations = Ledger::load(&state.activations)?;
    let proofs = Ledger::load(&state.proofs)?;
    let now = Utc::now().timestamp_millis();

    println!("\n=== WALLET STATUS ===\n");
    if wallets.is_empty() {
        println!("No wallets configured.");
    }
    for wallet in &wallets {
        println!("Wallet #{} {}", wallet.id, wallet.address);
        println!("  Proxy: {}", describe_proxy(wallet));

        let registered = registrations
            .get(&wallet.address)
            .map_or(false, |r| r.is_registered);
        println!("  Registered: {}", if registered { "yes" } else { "no" });

        match activations.get(&wallet.address) {
            Some(record) => {
                let when = Utc
                    .timestamp_millis_opt(record.last_activation)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| record.last_activation.to_string());
                let remaining = record.remaining_ms(now) / 60_000;
                if remaining > 0 {
                    println!(
                        "  Last activation: {} (next in {}h {}m)",
                        when,
                        remaining / 60,
                        remaining % 60
                    );
                } else {
                    println!("  Last activation: {} (due)", when);
                }
            }
            None => println!("  Last activation: never"),
        }

        let proof = match proofs.get(&wallet.address) {
            Some(p) if p.is_complete() => "verified",
            Some(p) if p.is_submitted => "submitted, unverified",
            Some(_) => "pending submission",
            None => "none",
        };
        println!("  Proof: {}", proof);
        println!();
    }
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn describe_proxy(wallet: &Wallet) -> String {
    match wallet.proxy.as_deref() {
        Some(proxy) => format!("{} [{}]", mask_proxy(proxy), proxy_label(proxy)),
        None => "unassigned".to_string(),
    }
}

fn print_report(task: &str, report: &TaskReport) {
    println!("\n{} finished: {}\n", task, report);
}

/// Asks on the terminal for each wallet's proof text
struct PromptedProof;

impl ProofTextSource for PromptedProof {
    fn proof_text(&self, wallet: &Wallet) -> crate::error::Result<Option<String>> {
        let text: String = Input::new()
            .with_prompt(format!(
                "Proof text for wallet #{} (max {} chars, empty to skip)",
                wallet.id, MAX_PROOF_CHARS
            ))
            .allow_empty(true)
            .validate_with(|input: &String| -> std::result::Result<(), String> {
                if input.trim().is_empty() {
                    return Ok(());
                }
                validate_proof_text(input).map_err(|e| e.to_string())
            })
            .interact_text()
            .map_err(|e| Error::Internal(format!("proof prompt failed: {}", e)))?;

        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_ip_check_skips_network() {
        let mut config = Config::default();
        config.probe.enabled = false;
        config.probe.ip_echo_url = "http://127.0.0.1:9/unreachable".into();

        let ip = probe_for(&config).public_ip(Some("socks5://h:1")).await.unwrap();
        assert_eq!(ip, "probe disabled");
    }
}
