use crate::activity_log::DEFAULT_LOG_CAPACITY;
use crate::types::{EndpointConfig, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5678";

/// Workflow webhooks every automation server in this setup exposes.
/// (registry name, display name, path, method)
pub const PRESET_ENDPOINTS: &[(&str, &str, &str, &str)] = &[
    ("n8n_content_gen", "Content Generation", "/webhook/content-generation", "POST"),
    ("n8n_social_post", "Social Media Post", "/webhook/social-post", "POST"),
    ("n8n_analytics", "Fetch Analytics", "/webhook/analytics", "GET"),
    ("n8n_media_process", "Media Processing", "/webhook/media-process", "POST"),
    ("n8n_campaign", "Campaign Workflow", "/webhook/campaign", "POST"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidParams(#[from] serde_json::Error),
    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),
    #[error("endpoint {0} has an empty url")]
    EmptyUrl(String),
}

/// Everything a dispatcher is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    pub base_url: String,
    /// Sent as `X-N8N-API-KEY` on every call when set.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub log_capacity: usize,
    /// Register the preset workflow endpoints under `base_url`.
    pub presets: bool,
    /// Signing secrets keyed by endpoint name.
    pub secrets: BTreeMap<String, String>,
    /// Extra endpoints. One sharing a preset's name replaces it.
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            presets: true,
            secrets: BTreeMap::new(),
            endpoints: Vec::new(),
        }
    }
}

/// Shape of `initialize` params. Absent fields keep the current value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigParams {
    base_url: Option<String>,
    #[serde(alias = "n8n_base_url")]
    n8n_url: Option<String>,
    #[serde(alias = "n8n_api_key")]
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
    log_capacity: Option<usize>,
    presets: Option<bool>,
    secrets: BTreeMap<String, String>,
    endpoints: Vec<EndpointConfig>,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("N8N_BASE_URL") {
            if !value.trim().is_empty() {
                config.base_url = value;
            }
        }
        if let Ok(value) = std::env::var("N8N_API_KEY") {
            if !value.trim().is_empty() {
                config.api_key = Some(value);
            }
        }
        if let Ok(value) = std::env::var("WEBHOOK_DISPATCHER_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.timeout_seconds = parsed.max(1);
            }
        }
        if let Ok(value) = std::env::var("WEBHOOK_DISPATCHER_LOG_CAPACITY") {
            if let Ok(parsed) = value.parse::<usize>() {
                config.log_capacity = parsed.max(1);
            }
        }

        config
    }

    /// Overlay host-supplied params. `null` leaves the config untouched.
    pub fn with_params(mut self, params: &Value) -> Result<Self, ConfigError> {
        if params.is_null() {
            return Ok(self);
        }
        let p: ConfigParams = serde_json::from_value(params.clone())?;

        if let Some(url) = p.base_url.or(p.n8n_url) {
            self.base_url = url;
        }
        if let Some(key) = p.api_key {
            self.api_key = if key.is_empty() { None } else { Some(key) };
        }
        if let Some(secs) = p.timeout_seconds {
            self.timeout_seconds = secs.max(1);
        }
        if let Some(cap) = p.log_capacity {
            self.log_capacity = cap.max(1);
        }
        if let Some(presets) = p.presets {
            self.presets = presets;
        }
        self.secrets.extend(p.secrets);
        self.endpoints.extend(p.endpoints);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn execution_status_url(&self, execution_id: &str) -> String {
        format!("{}/api/v1/executions/{execution_id}", self.base_url())
    }

    /// The registry contents, in registration order.
    pub fn resolve_endpoints(&self) -> Result<Vec<EndpointConfig>, ConfigError> {
        let mut out: Vec<EndpointConfig> = Vec::new();

        if self.presets {
            for (name, display, path, method) in PRESET_ENDPOINTS {
                out.push(
                    EndpointConfig::new(*name, format!("{}{path}", self.base_url()), *method)
                        .with_display_name(*display)
                        .with_timeout_secs(self.timeout_seconds),
                );
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for custom in &self.endpoints {
            if custom.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl(custom.name.clone()));
            }
            if seen.contains(&custom.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(custom.name.clone()));
            }
            seen.push(&custom.name);

            match out.iter_mut().find(|e| e.name == custom.name) {
                Some(slot) => *slot = custom.clone(),
                None => out.push(custom.clone()),
            }
        }

        for endpoint in &mut out {
            if endpoint.secret.is_none() {
                endpoint.secret = self.secrets.get(&endpoint.name).cloned();
            }
        }

        Ok(out)
    }
}
