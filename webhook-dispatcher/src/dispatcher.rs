use crate::activity_log::ActivityLog;
use crate::config::{ConfigError, DispatcherConfig};
use crate::signing::{self, SIGNATURE_HEADER};
use crate::transport::{OutboundRequest, ReqwestTransport, Transport, TransportError, TransportResponse};
use crate::types::{
    DispatchResult, EndpointConfig, EndpointSummary, ErrorKind, Headers, HttpMethod, LogEntry,
    Overrides, Payload, Target,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const USER_AGENT: &str = concat!("nexus-webhook-dispatcher/", env!("CARGO_PKG_VERSION"));
pub const API_KEY_HEADER: &str = "x-n8n-api-key";
pub const CORRELATION_HEADER: &str = "x-n8n-execution-id";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const EXECUTION_STATUS_ENDPOINT: &str = "n8n_execution_status";

/// Why a dispatch did not succeed. Never leaves `dispatch`; it is folded
/// into a `DispatchResult::Failure`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown endpoint '{0}' and no url provided")]
    UnknownEndpoint(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{url} responded with HTTP {status}")]
    HttpStatus {
        status: u16,
        url: String,
        correlation_id: Option<String>,
    },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownEndpoint(_) => ErrorKind::UnknownEndpoint,
            Self::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            Self::Transport(TransportError::Timeout(_)) => ErrorKind::Timeout,
            Self::Transport(TransportError::Network(_)) => ErrorKind::NetworkError,
            Self::HttpStatus { .. } => ErrorKind::HttpStatusError,
        }
    }

    pub fn into_result(self) -> DispatchResult {
        let error_kind = self.kind();
        let error_message = self.to_string();
        let correlation_id = match self {
            Self::HttpStatus { correlation_id, .. } => correlation_id,
            _ => None,
        };
        DispatchResult::Failure {
            error_kind,
            error_message,
            correlation_id,
        }
    }
}

/// Result of a reachability check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub url: Option<String>,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Append-only; entries are never edited once registered.
#[derive(Default)]
struct Registry {
    endpoints: Vec<EndpointConfig>,
    index: HashMap<String, usize>,
}

impl Registry {
    fn insert(&mut self, endpoint: EndpointConfig) -> Result<(), ConfigError> {
        if endpoint.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl(endpoint.name));
        }
        if self.index.contains_key(&endpoint.name) {
            return Err(ConfigError::DuplicateEndpoint(endpoint.name));
        }
        self.index.insert(endpoint.name.clone(), self.endpoints.len());
        self.endpoints.push(endpoint);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&EndpointConfig> {
        self.index.get(name).map(|&i| &self.endpoints[i])
    }
}

pub struct WebhookDispatcher {
    registry: RwLock<Registry>,
    log: Mutex<ActivityLog>,
    transport: Arc<dyn Transport>,
    api_key: Option<String>,
    default_timeout_secs: u64,
    log_capacity: usize,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(
        config: DispatcherConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Registry::default();
        for endpoint in config.resolve_endpoints()? {
            registry.insert(endpoint)?;
        }
        info!(
            endpoints = registry.endpoints.len(),
            base_url = %config.base_url(),
            "webhook dispatcher ready"
        );

        Ok(Self {
            registry: RwLock::new(registry),
            log: Mutex::new(ActivityLog::with_capacity(config.log_capacity)),
            transport,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            default_timeout_secs: config.timeout_seconds,
            log_capacity: config.log_capacity.max(1),
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    /// Add an endpoint. Existing names are never replaced.
    pub async fn register(&self, endpoint: EndpointConfig) -> Result<(), ConfigError> {
        let name = endpoint.name.clone();
        self.registry.write().await.insert(endpoint)?;
        debug!(endpoint = %name, "registered endpoint");
        Ok(())
    }

    pub async fn endpoint(&self, name: &str) -> Option<EndpointConfig> {
        self.registry.read().await.get(name).cloned()
    }

    /// Every registered endpoint, in registration order.
    pub async fn list_endpoints(&self) -> Vec<EndpointSummary> {
        self.registry
            .read()
            .await
            .endpoints
            .iter()
            .map(EndpointConfig::summary)
            .collect()
    }

    /// The last `min(limit, len)` log entries, oldest first.
    pub async fn get_recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.log.lock().await.recent(limit)
    }

    pub async fn log_len(&self) -> usize {
        self.log.lock().await.len()
    }

    async fn resolve(&self, target: &Target) -> Result<EndpointConfig, DispatchError> {
        match target {
            Target::Named { name, fallback_url } => {
                if let Some(endpoint) = self.registry.read().await.get(name) {
                    return Ok(endpoint.clone());
                }
                match fallback_url {
                    Some(url) if !url.trim().is_empty() => Ok(EndpointConfig::new(
                        name.clone(),
                        url.clone(),
                        "POST",
                    )
                    .with_timeout_secs(self.default_timeout_secs)),
                    _ => Err(DispatchError::UnknownEndpoint(name.clone())),
                }
            }
            Target::Inline { url, method } => {
                if url.trim().is_empty() {
                    return Err(DispatchError::UnknownEndpoint(Target::INLINE_NAME.into()));
                }
                Ok(EndpointConfig::new(Target::INLINE_NAME, url.clone(), method.clone())
                    .with_timeout_secs(self.default_timeout_secs))
            }
        }
    }

    /// Send `payload` to the endpoint `target` resolves to. Every outcome is
    /// reported through the returned result; a log entry is written for each
    /// call that reached the transport.
    pub async fn dispatch(
        &self,
        target: Target,
        payload: Payload,
        overrides: Overrides,
    ) -> DispatchResult {
        let endpoint = match self.resolve(&target).await {
            Ok(e) => e,
            Err(err) => {
                warn!(endpoint = %target.name(), "dispatch rejected: {err}");
                return err.into_result();
            }
        };

        let raw_method = overrides.method.as_deref().unwrap_or(&endpoint.method);
        let method = match HttpMethod::parse(raw_method) {
            Some(m) => m,
            None => {
                let err = DispatchError::UnsupportedMethod(raw_method.to_string());
                warn!(endpoint = %endpoint.name, "dispatch rejected: {err}");
                return err.into_result();
            }
        };

        let headers = build_headers(&endpoint, self.api_key.as_deref(), &overrides.headers, &payload);
        let request = OutboundRequest {
            method,
            url: endpoint.url.clone(),
            headers,
            payload: payload.clone(),
            timeout: Duration::from_secs(endpoint.timeout_seconds.max(1)),
        };

        debug!(endpoint = %endpoint.name, %method, url = %request.url, "dispatching webhook");
        let result = self.send(request).await;

        match &result {
            DispatchResult::Success { status_code, .. } => {
                info!(endpoint = %endpoint.name, status = status_code, "webhook delivered");
            }
            DispatchResult::Failure {
                error_kind,
                error_message,
                ..
            } => {
                warn!(endpoint = %endpoint.name, kind = %error_kind, "webhook failed: {error_message}");
            }
        }

        self.log
            .lock()
            .await
            .record(LogEntry::outgoing(endpoint.name, payload, result.clone()));
        result
    }

    async fn send(&self, request: OutboundRequest) -> DispatchResult {
        let url = request.url.clone();
        match exchange(self.transport.as_ref(), request).await {
            Ok(resp) => normalize_response(resp, &url),
            Err(err) => DispatchError::Transport(err).into_result(),
        }
    }

    /// Reachability check: a GET with `{"test": "connection"}` bounded by
    /// [`PROBE_TIMEOUT`]. Any HTTP answer counts as reachable. Not logged.
    pub async fn probe(&self, target: Target) -> ProbeResult {
        let endpoint = match self.resolve(&target).await {
            Ok(e) => e,
            Err(err) => {
                return ProbeResult {
                    url: None,
                    reachable: false,
                    status_code: None,
                    error_kind: Some(err.kind()),
                    error_message: Some(err.to_string()),
                }
            }
        };

        let mut payload = Payload::new();
        payload.insert("test".into(), Value::String("connection".into()));
        let headers = build_headers(&endpoint, self.api_key.as_deref(), &Headers::new(), &payload);
        let request = OutboundRequest {
            method: HttpMethod::Get,
            url: endpoint.url.clone(),
            headers,
            payload,
            timeout: PROBE_TIMEOUT,
        };

        match exchange(self.transport.as_ref(), request).await {
            Ok(resp) => {
                debug!(url = %endpoint.url, status = resp.status, "probe answered");
                ProbeResult {
                    url: Some(endpoint.url),
                    reachable: true,
                    status_code: Some(resp.status),
                    error_kind: None,
                    error_message: None,
                }
            }
            Err(err) => {
                let err = DispatchError::Transport(err);
                warn!(url = %endpoint.url, "probe failed: {err}");
                ProbeResult {
                    url: Some(endpoint.url),
                    reachable: false,
                    status_code: None,
                    error_kind: Some(err.kind()),
                    error_message: Some(err.to_string()),
                }
            }
        }
    }

    /// Ask the automation server's API about a workflow execution.
    pub async fn execution_status(&self, execution_id: &str) -> DispatchResult {
        let url = self.config.execution_status_url(execution_id.trim());
        self.dispatch(
            Target::named_or_url(EXECUTION_STATUS_ENDPOINT, url),
            Payload::new(),
            Overrides::method("GET"),
        )
        .await
    }
}

/// Run one transport call under a hard deadline, whatever the transport
/// does with its own timeout.
async fn exchange(
    transport: &dyn Transport,
    request: OutboundRequest,
) -> Result<TransportResponse, TransportError> {
    let timeout = request.timeout;
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

fn set_header(headers: &mut Headers, name: &str, value: &str) {
    headers.insert(name.to_ascii_lowercase(), value.to_string());
}

/// Defaults, then endpoint headers, then the API key, then caller overrides.
/// The signature goes on last and covers the payload only.
pub fn build_headers(
    endpoint: &EndpointConfig,
    api_key: Option<&str>,
    overrides: &Headers,
    payload: &Payload,
) -> Headers {
    let mut headers = Headers::new();
    set_header(&mut headers, "Content-Type", "application/json");
    set_header(&mut headers, "User-Agent", USER_AGENT);
    for (name, value) in &endpoint.headers {
        set_header(&mut headers, name, value);
    }
    if let Some(key) = api_key {
        set_header(&mut headers, API_KEY_HEADER, key);
    }
    for (name, value) in overrides {
        set_header(&mut headers, name, value);
    }
    if let Some(secret) = endpoint.secret.as_deref() {
        set_header(&mut headers, SIGNATURE_HEADER, &signing::sign_payload(secret, payload));
    }
    headers
}

/// JSON when the body parses, `{"text": raw}` otherwise.
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({ "text": body }))
}

fn normalize_response(resp: TransportResponse, url: &str) -> DispatchResult {
    let correlation_id = resp.header(CORRELATION_HEADER).map(str::to_string);
    if !(200..400).contains(&resp.status) {
        return DispatchError::HttpStatus {
            status: resp.status,
            url: url.to_string(),
            correlation_id,
        }
        .into_result();
    }
    DispatchResult::Success {
        status_code: resp.status,
        response_body: parse_body(&resp.body),
        correlation_id,
    }
}
