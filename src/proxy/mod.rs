//! Proxy router
//!
//! Maps wallets onto the proxy list and builds proxied HTTP clients.

pub mod probe;

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::wallet::Wallet;

pub use probe::{DisabledProbe, HttpIpProbe, IpProbe};

lazy_static! {
    static ref SESSION_ID: Regex =
        Regex::new(r"zone-custom-session-(.+?)-sessTime").expect("valid session regex");
}

/// Ordered proxy endpoints, fixed for the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyList {
    endpoints: Vec<String>,
}

impl ProxyList {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    /// Parse line-delimited text; blank lines are dropped
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Load from file. A missing file gives an empty list.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "No proxy file at {}; wallets without a proxy connect directly",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let list = Self::parse(&text);
        info!("Loaded {} proxies from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Default proxy for a wallet id: `(id - 1) mod len`
    pub fn default_for(&self, id: u32) -> Option<&str> {
        if self.endpoints.is_empty() || id == 0 {
            return None;
        }
        let index = (id as usize - 1) % self.endpoints.len();
        Some(&self.endpoints[index])
    }

    /// Entry after `current` (cyclic); the first entry when `current` is
    /// absent or not in the list; `None` for an empty list
    pub fn next_after(&self, current: Option<&str>) -> Option<String> {
        if self.endpoints.is_empty() {
            return None;
        }
        let next = current
            .and_then(|c| self.endpoints.iter().position(|p| p == c))
            .map(|i| (i + 1) % self.endpoints.len())
            .unwrap_or(0);
        Some(self.endpoints[next].clone())
    }

    /// Give the wallet its default proxy unless one is already set.
    ///
    /// Returns true when the assignment changed.
    pub fn assign(&self, wallet: &mut Wallet) -> bool {
        if wallet.proxy.is_some() {
            return false;
        }
        match self.default_for(wallet.id) {
            Some(proxy) => {
                wallet.proxy = Some(proxy.to_string());
                true
            }
            None => false,
        }
    }
}

/// Session id embedded in a proxy URI, or "unknown"
pub fn proxy_label(proxy: &str) -> String {
    SESSION_ID
        .captures(proxy)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Proxy URI with the password replaced, for logs
pub fn mask_proxy(proxy: &str) -> String {
    match url::Url::parse(proxy) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "(unparseable proxy)".to_string(),
    }
}

/// HTTP client routed through `proxy`, or direct when `None`
pub fn build_client(
    proxy: Option<&str>,
    timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.to_string());

    if let Some(endpoint) = proxy {
        let proxy = reqwest::Proxy::all(endpoint)
            .map_err(|e| Error::InvalidProxy(format!("{}: {}", mask_proxy(endpoint), e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
}
