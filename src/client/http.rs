//! reqwest implementation of [`RemoteService`]

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::proxy::{build_client, proxy_label};

use super::{RemoteService, ServiceReply, VerificationTask};

/// Which host an endpoint lives on
#[derive(Debug, Clone, Copy)]
enum Host {
    Api,
    Dashboard,
}

/// `{sign, timestamp, walletAddress}` body shared by claim and verify calls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedRequest<'a> {
    sign: &'a str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    wallet_address: Option<&'a str>,
}

/// HTTP client for the light-node service
pub struct HttpService {
    config: ServiceConfig,
    timeout: Duration,
    /// One client per proxy endpoint ("" for direct)
    clients: DashMap<String, reqwest::Client>,
}

impl HttpService {
    pub fn new(config: ServiceConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        Self {
            config,
            timeout,
            clients: DashMap::new(),
        }
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client> {
        let key = proxy.unwrap_or_default().to_string();
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(proxy, self.timeout, &self.config.user_agent)?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    fn url(&self, host: Host, path: &str) -> String {
        let base = match host {
            Host::Api => &self.config.api_base_url,
            Host::Dashboard => &self.config.dashboard_base_url,
        };
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    fn verification_path(&self, task: VerificationTask) -> &str {
        let endpoints = &self.config.endpoints;
        match task {
            VerificationTask::PremiumPass => &endpoints.premium_pass,
            VerificationTask::BasicPass => &endpoints.basic_pass,
            VerificationTask::ProofSubmission => &endpoints.proof_submission,
            VerificationTask::NodeRun => &endpoints.node_run,
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        debug!(
            "POST {} via proxy [{}]",
            url,
            proxy.map(proxy_label).unwrap_or_else(|| "direct".to_string())
        );

        let origin = self.config.origin.trim_end_matches('/');
        let response = self
            .client(proxy)?
            .post(url)
            .header("origin", origin)
            .header("referer", format!("{}/", origin))
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        // a body cut off mid-response surfaces here as a transient error
        let text = response.text().await?;
        interpret(status, &text)
    }
}

/// Map a raw response to a reply or a classified error
fn interpret(status: u16, text: &str) -> Result<ServiceReply> {
    let body: Value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));

    if !(200..300).contains(&status) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.trim().to_string());
        return Err(Error::Http { status, message });
    }

    let reply = ServiceReply::new(status, body);
    if reply.message.to_ascii_lowercase().contains("already") {
        return Err(Error::AlreadyDone(reply.message));
    }
    Ok(reply)
}

#[async_trait]
impl RemoteService for HttpService {
    async fn verify_referral_code(&self, code: &str, proxy: Option<&str>) -> Result<ServiceReply> {
        let url = self.url(Host::Api, &self.config.endpoints.verify_referral);
        self.post(&url, &json!({ "invite_code": code }), proxy).await
    }

    async fn register(&self, address: &str, proxy: Option<&str>) -> Result<ServiceReply> {
        let path = self
            .config
            .endpoints
            .register
            .replace("{code}", &self.config.referral_code);
        let url = self.url(Host::Api, &path);
        self.post(&url, &json!({ "walletAddress": address }), proxy)
            .await
    }

    async fn activate(
        &self,
        address: &str,
        signature: &str,
        timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        let path = self.config.endpoints.activate.replace("{address}", address);
        let url = self.url(Host::Api, &path);
        let body = SignedRequest {
            sign: signature,
            timestamp,
            wallet_address: None,
        };
        self.post(&url, &body, proxy).await
    }

    async fn claim_points(
        &self,
        address: &str,
        signature: &str,
        timestamp: i64,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        let url = self.url(Host::Api, &self.config.endpoints.claim_points);
        let body = SignedRequest {
            sign: signature,
            timestamp,
            wallet_address: Some(address),
        };
        self.post(&url, &body, proxy).await
    }

    async fn verify(
        &self,
        task: VerificationTask,
        signature: &str,
        timestamp: i64,
        address: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        let url = self.url(Host::Api, self.verification_path(task));
        let body = SignedRequest {
            sign: signature,
            timestamp,
            wallet_address: Some(address),
        };
        self.post(&url, &body, proxy).await
    }

    async fn submit_proof(
        &self,
        address: &str,
        message: &str,
        proof: &str,
        signature: &str,
        proxy: Option<&str>,
    ) -> Result<ServiceReply> {
        let url = self.url(Host::Dashboard, &self.config.endpoints.submit_proof);
        let body = json!({
            "address": address,
            "message": message,
            "proof": proof,
            "signature": signature,
        });
        self.post(&url, &body, proxy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_success() {
        let reply = interpret(200, r#"{"message":"node points claimed successfully"}"#).unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.message, "node points claimed successfully");
    }

    #[test]
    fn test_interpret_error_status() {
        let err = interpret(409, r#"{"message":"wallet address already registered"}"#).unwrap_err();
        match err {
            Error::Http { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "wallet address already registered");
            }
            other => panic!("unexpected {:?}", other),
        }

        // non-JSON gateway page
        let err = interpret(502, "<html>Bad Gateway</html>").unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn test_interpret_already_done_on_success_status() {
        let err = interpret(200, r#"{"message":"node already active"}"#).unwrap_err();
        assert!(matches!(err, Error::AlreadyDone(_)));
    }

    #[test]
    fn test_signed_request_shape() {
        let body = SignedRequest {
            sign: "0xsig",
            timestamp: 42,
            wallet_address: Some("0xabc"),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"sign": "0xsig", "timestamp": 42, "walletAddress": "0xabc"})
        );

        let start = SignedRequest {
            sign: "0xsig",
            timestamp: 42,
            wallet_address: None,
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"sign": "0xsig", "timestamp": 42})
        );
    }

    #[test]
    fn test_url_building() {
        let service = HttpService::new(ServiceConfig::default());
        assert_eq!(
            service.url(Host::Api, "/light-node/claim-node-points"),
            "https://referralapi.layeredge.io/api/light-node/claim-node-points"
        );
        assert_eq!(
            service.url(Host::Dashboard, "/api/send-proof"),
            "https://dashboard.layeredge.io/api/send-proof"
        );
    }

    #[test]
    fn test_client_cache_per_proxy() {
        let service = HttpService::new(ServiceConfig::default());
        service.client(None).unwrap();
        service.client(Some("socks5://127.0.0.1:1080")).unwrap();
        service.client(Some("socks5://127.0.0.1:1080")).unwrap();
        assert_eq!(service.clients.len(), 2);
    }
}
