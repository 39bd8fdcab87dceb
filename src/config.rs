//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::retry::classify::{BenignCodes, ClassificationConfig};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

/// Remote light-node service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_dashboard_base_url")]
    pub dashboard_base_url: String,
    #[serde(default = "default_referral_code")]
    pub referral_code: String,
    #[serde(default = "default_dashboard_base_url")]
    pub origin: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

/// Endpoint paths, relative to the API or dashboard base URL.
///
/// `{code}` and `{address}` are substituted per request.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_verify_referral_path")]
    pub verify_referral: String,
    #[serde(default = "default_register_path")]
    pub register: String,
    #[serde(default = "default_activate_path")]
    pub activate: String,
    #[serde(default = "default_claim_path")]
    pub claim_points: String,
    #[serde(default = "default_premium_pass_path")]
    pub premium_pass: String,
    #[serde(default = "default_basic_pass_path")]
    pub basic_pass: String,
    #[serde(default = "default_proof_verify_path")]
    pub proof_submission: String,
    #[serde(default = "default_node_task_path")]
    pub node_run: String,
    /// Served from the dashboard host, not the API host
    #[serde(default = "default_submit_proof_path")]
    pub submit_proof: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ip_echo_url")]
    pub ip_echo_url: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

/// Locations of the persisted state files
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_wallets_path")]
    pub wallets: PathBuf,
    #[serde(default = "default_proxies_path")]
    pub proxies: PathBuf,
    #[serde(default = "default_registered_path")]
    pub registered: PathBuf,
    #[serde(default = "default_activations_path")]
    pub activations: PathBuf,
    #[serde(default = "default_proofs_path")]
    pub proofs: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_phase: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Pause between consecutive wallets
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_cycle_hours")]
    pub cycle_hours: u64,
    /// Pause between proof submission and its verification
    #[serde(default = "default_proof_verify_delay_ms")]
    pub proof_verify_delay_ms: u64,
}

impl ScheduleConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_hours * 60 * 60)
    }

    pub fn proof_verify_delay(&self) -> Duration {
        Duration::from_millis(self.proof_verify_delay_ms)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_api_base_url() -> String {
    "https://referralapi.layeredge.io/api".to_string()
}

fn default_dashboard_base_url() -> String {
    "https://dashboard.layeredge.io".to_string()
}

fn default_referral_code() -> String {
    "4mCxH9Tf".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_verify_referral_path() -> String {
    "/referral/verify-referral-code".to_string()
}

fn default_register_path() -> String {
    "/referral/register-wallet/{code}".to_string()
}

fn default_activate_path() -> String {
    "/light-node/node-action/{address}/start".to_string()
}

fn default_claim_path() -> String {
    "/light-node/claim-node-points".to_string()
}

fn default_premium_pass_path() -> String {
    "/task/nft-verification/2".to_string()
}

fn default_basic_pass_path() -> String {
    "/task/nft-verification/1".to_string()
}

fn default_proof_verify_path() -> String {
    "/task/proof-submission".to_string()
}

fn default_node_task_path() -> String {
    "/task/node-points".to_string()
}

fn default_submit_proof_path() -> String {
    "/api/send-proof".to_string()
}

fn default_ip_echo_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_wallets_path() -> PathBuf {
    PathBuf::from("wallets.json")
}

fn default_proxies_path() -> PathBuf {
    PathBuf::from("proxies.txt")
}

fn default_registered_path() -> PathBuf {
    PathBuf::from("registered.json")
}

fn default_activations_path() -> PathBuf {
    PathBuf::from("data/activations.json")
}

fn default_proofs_path() -> PathBuf {
    PathBuf::from("data/proofs.json")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    5_000
}

fn default_cycle_hours() -> u64 {
    24
}

fn default_proof_verify_delay_ms() -> u64 {
    3_000
}

fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            dashboard_base_url: default_dashboard_base_url(),
            referral_code: default_referral_code(),
            origin: default_dashboard_base_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            verify_referral: default_verify_referral_path(),
            register: default_register_path(),
            activate: default_activate_path(),
            claim_points: default_claim_path(),
            premium_pass: default_premium_pass_path(),
            basic_pass: default_basic_pass_path(),
            proof_submission: default_proof_verify_path(),
            node_run: default_node_task_path(),
            submit_proof: default_submit_proof_path(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_echo_url: default_ip_echo_url(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            wallets: default_wallets_path(),
            proxies: default_proxies_path(),
            registered: default_registered_path(),
            activations: default_activations_path(),
            proofs: default_proofs_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_phase: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            cycle_hours: default_cycle_hours(),
            proof_verify_delay_ms: default_proof_verify_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            probe: ProbeConfig::default(),
            files: FilesConfig::default(),
            retry: RetryConfig::default(),
            schedule: ScheduleConfig::default(),
            classification: ClassificationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("service.api_base_url", default_api_base_url())?
            .set_default("service.timeout_ms", default_timeout_ms() as i64)?
            .set_default("retry.max_attempts_per_phase", default_max_attempts() as i64)?
            .set_default("retry.base_delay_ms", default_base_delay_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix LIGHTNODE_)
            .add_source(
                config::Environment::with_prefix("LIGHTNODE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts_per_phase == 0 {
            anyhow::bail!("retry.max_attempts_per_phase must be at least 1");
        }

        if self.schedule.cycle_hours == 0 {
            anyhow::bail!("schedule.cycle_hours must be positive");
        }

        for base in [&self.service.api_base_url, &self.service.dashboard_base_url] {
            url::Url::parse(base).with_context(|| format!("Invalid service base URL: {}", base))?;
        }

        url::Url::parse(&self.probe.ip_echo_url)
            .with_context(|| format!("Invalid ip_echo_url: {}", self.probe.ip_echo_url))?;

        if self.service.referral_code.trim().is_empty() {
            anyhow::bail!("service.referral_code cannot be empty");
        }

        self.classification.validate()?;

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Service:
    api: {}
    dashboard: {}
    referral_code: {}
    timeout: {}ms
  Probe:
    enabled: {}
    ip_echo_url: {}
  Files:
    wallets: {}
    proxies: {}
    registered: {}
    activations: {}
    proofs: {}
  Retry:
    max_attempts_per_phase: {}
    base_delay: {}ms
  Schedule:
    settle_delay: {}ms
    cycle: {}h
  Classification:
    non_retryable: {:?}
    transient: {:?}
    benign: registration={:?} activation={:?} claim={:?} verification={:?} proof={:?}
"#,
            self.service.api_base_url,
            self.service.dashboard_base_url,
            mask_secret(&self.service.referral_code),
            self.service.timeout_ms,
            self.probe.enabled,
            self.probe.ip_echo_url,
            self.files.wallets.display(),
            self.files.proxies.display(),
            self.files.registered.display(),
            self.files.activations.display(),
            self.files.proofs.display(),
            self.retry.max_attempts_per_phase,
            self.retry.base_delay_ms,
            self.schedule.settle_delay_ms,
            self.schedule.cycle_hours,
            self.classification.non_retryable,
            self.classification.transient,
            self.classification.benign.registration,
            self.classification.benign.activation,
            self.classification.benign.claim,
            self.classification.benign.verification,
            self.classification.benign.proof,
        )
    }
}

/// Keep the first two characters of a secret
fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 2 {
        return "***".to_string();
    }
    let head: String = secret.chars().take(2).collect();
    format!("{}***", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts_per_phase, 3);
        assert_eq!(config.schedule.settle_delay(), Duration::from_secs(5));
        assert_eq!(config.schedule.cycle_period(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.service.referral_code, "4mCxH9Tf");
        assert_eq!(config.classification.benign.claim, vec![400]);
    }

    #[test]
    fn test_load_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[retry]
max_attempts_per_phase = 5
base_delay_ms = 250

[classification.benign]
claim = [400, 409]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retry.max_attempts_per_phase, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(config.classification.benign.claim, vec![400, 409]);
        // untouched sections keep their defaults
        assert_eq!(config.classification.benign.activation, vec![409, 410]);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts_per_phase = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("4mCxH9Tf"), "4m***");
        assert_eq!(mask_secret("ab"), "***");
    }
}
