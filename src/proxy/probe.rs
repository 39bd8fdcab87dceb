//! Public IP probe through a proxy

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::error::{Error, Result};

use super::build_client;

/// Resolves the public IP a proxy exits from
#[async_trait]
pub trait IpProbe: Send + Sync {
    async fn public_ip(&self, proxy: Option<&str>) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    ip: String,
}

/// Probe against an IP-echo service (`{"ip": "..."}`)
pub struct HttpIpProbe {
    echo_url: String,
    timeout: Duration,
    user_agent: String,
}

impl HttpIpProbe {
    pub fn new(config: &ProbeConfig, user_agent: &str) -> Self {
        Self {
            echo_url: config.ip_echo_url.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            user_agent: user_agent.to_string(),
        }
    }
}

#[async_trait]
impl IpProbe for HttpIpProbe {
    async fn public_ip(&self, proxy: Option<&str>) -> Result<String> {
        let client = build_client(proxy, self.timeout, &self.user_agent)?;

        let response = client
            .get(&self.echo_url)
            .send()
            .await
            .map_err(|e| Error::Probe(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Probe(format!(
                "echo service returned {}",
                response.status()
            )));
        }

        let echo: EchoResponse = response
            .json()
            .await
            .map_err(|e| Error::Probe(format!("unexpected echo body: {}", e)))?;

        debug!("Probe resolved {}", echo.ip);
        Ok(echo.ip)
    }
}

/// Probe that answers without touching the network
pub struct DisabledProbe;

#[async_trait]
impl IpProbe for DisabledProbe {
    async fn public_ip(&self, _proxy: Option<&str>) -> Result<String> {
        Ok("probe disabled".to_string())
    }
}
