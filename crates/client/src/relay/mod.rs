//! CORS relay gateway.
//!
//! Lets a browser page reach an endpoint that does not send CORS headers
//! (the form-automation webhook). The page posts `{url, method, headers, body}`;
//! the gateway checks the page origin and the target host against allow-lists,
//! forwards the request and returns the upstream status and body with CORS
//! headers rewritten for the calling origin.
//!
//! Every outcome is a [`RelayResponse`]; failures are JSON `{"error": ...}`
//! bodies with status 400, 403 or 502.

pub mod origin;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use larder_core::{AppConfig, Error};

pub use origin::OriginPolicy;

/// Upstream headers that no longer describe the body we return.
const DROPPED_UPSTREAM_HEADERS: &[&str] = &["content-length", "content-encoding", "transfer-encoding", "connection"];

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub allowed_origins: Vec<String>,
    /// Empty allows any target host.
    pub allowed_hosts: Vec<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_hosts: Vec::new(),
            user_agent: "larder/0.1".to_string(),
            timeout: Duration::from_millis(20000),
        }
    }
}

impl From<&AppConfig> for RelayConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            allowed_origins: config.relay_allowed_origins.clone(),
            allowed_hosts: config.relay_allowed_hosts.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        }
    }
}

/// JSON body posted by the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayPayload {
    #[serde(default)]
    pub url: Option<String>,
    /// Upstream method, POST when absent.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Serialized as the upstream JSON body, `{}` when absent. Not sent for GET.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// One request arriving at the gateway.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    /// Method of the incoming request itself (`OPTIONS` for preflight).
    pub method: String,
    pub origin: Option<String>,
    pub payload: RelayPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResponse {
    pub status: u16,
    /// Lowercase header names.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RelayResponse {
    fn error(status: u16, origin: &str, message: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        apply_cors(&mut headers, origin);
        let body = serde_json::json!({ "error": message }).to_string();
        Self { status, headers, body }
    }
}

fn apply_cors(headers: &mut BTreeMap<String, String>, origin: &str) {
    headers.insert("access-control-allow-origin".into(), origin.to_string());
    headers.insert("vary".into(), "Origin".into());
    headers.insert("access-control-allow-credentials".into(), "false".into());
    headers.insert("access-control-allow-methods".into(), "GET,POST,OPTIONS".into());
    headers.insert("access-control-allow-headers".into(), "Content-Type,Authorization".into());
}

pub struct RelayGateway {
    http: Client,
    config: RelayConfig,
    origins: OriginPolicy,
}

impl RelayGateway {
    pub fn new(config: RelayConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Relay(format!("failed to build HTTP client: {}", e)))?;
        let origins = OriginPolicy::new(&config.allowed_origins);

        Ok(Self { http, config, origins })
    }

    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        let origin = request.origin.as_deref();
        let cors_origin = origin.unwrap_or("*");

        if request.method.eq_ignore_ascii_case("OPTIONS") {
            let mut headers = BTreeMap::new();
            apply_cors(&mut headers, cors_origin);
            return RelayResponse { status: 204, headers, body: String::new() };
        }

        if !self.origins.allows(origin) {
            tracing::debug!(origin = ?origin, "relay origin rejected");
            return RelayResponse::error(403, cors_origin, "Origin not allowed");
        }

        let RelayPayload { url, method, headers, body } = request.payload;

        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            return RelayResponse::error(400, cors_origin, "Missing url");
        };

        let target = match url::Url::parse(url.trim()) {
            Ok(target) if matches!(target.scheme(), "http" | "https") => target,
            Ok(target) => {
                return RelayResponse::error(400, cors_origin, &format!("Unsupported scheme: {}", target.scheme()));
            }
            Err(e) => return RelayResponse::error(400, cors_origin, &format!("Invalid url: {e}")),
        };

        if !self.host_allowed(&target) {
            tracing::debug!(host = ?target.host_str(), "relay host rejected");
            return RelayResponse::error(403, cors_origin, "Host not allowed");
        }

        let method = method.as_deref().unwrap_or("POST").trim().to_ascii_uppercase();

        match self.forward(&method, target, headers, body).await {
            Ok(mut response) => {
                apply_cors(&mut response.headers, cors_origin);
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay upstream failed");
                RelayResponse::error(502, cors_origin, &e.to_string())
            }
        }
    }

    fn host_allowed(&self, target: &url::Url) -> bool {
        if self.config.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = target.host_str() else {
            return false;
        };
        self.config.allowed_hosts.iter().any(|allowed| allowed.trim().eq_ignore_ascii_case(host))
    }

    async fn forward(
        &self, method: &str, target: url::Url, headers: BTreeMap<String, String>, body: Option<serde_json::Value>,
    ) -> Result<RelayResponse, Error> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| Error::Relay(format!("invalid method: {method}")))?;
        let is_get = method == Method::GET;

        let mut builder = self.http.request(method, target.clone());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !is_get {
            let body = body.unwrap_or_else(|| serde_json::json!({}));
            builder = builder.body(serde_json::to_string(&body).map_err(|e| Error::Relay(e.to_string()))?);
        }

        let response = builder.send().await.map_err(|e| Error::Relay(e.to_string()))?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter(|(name, _)| !DROPPED_UPSTREAM_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| Error::Relay(e.to_string()))?;

        tracing::debug!(upstream = %target, status, "relayed");
        Ok(RelayResponse { status, headers, body })
    }
}
