use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Body of an outbound call. `serde_json::Map` keeps keys sorted, which is
/// what makes the signed serialization canonical.
pub type Payload = Map<String, Value>;

/// Header name to value. Names are stored lowercased once merged.
pub type Headers = BTreeMap<String, String>;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_method() -> String {
    "POST".into()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A named remote target and how to call it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub url: String,
    #[serde(default = "default_method", alias = "http_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            url: url.into(),
            method: method.into(),
            headers: Headers::new(),
            secret: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn summary(&self) -> EndpointSummary {
        EndpointSummary {
            name: self.name.clone(),
            display_name: self.display_name().to_string(),
            url: self.url.clone(),
            method: self.method.to_ascii_uppercase(),
        }
    }
}

/// What `list_endpoints` hands out: no headers, no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub name: String,
    pub display_name: String,
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    /// Case-insensitive; anything outside GET/POST/PUT is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// GET carries the payload as query parameters, the others as a JSON body.
    pub fn sends_body(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a dispatch goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A registered endpoint. `fallback_url` is used for an ad-hoc call when
    /// the name is not registered.
    Named {
        name: String,
        fallback_url: Option<String>,
    },
    Inline {
        url: String,
        method: String,
    },
}

impl Target {
    pub const INLINE_NAME: &'static str = "custom";

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            fallback_url: None,
        }
    }

    pub fn named_or_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            fallback_url: Some(url.into()),
        }
    }

    pub fn inline(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Inline {
            url: url.into(),
            method: method.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::Inline { .. } => Self::INLINE_NAME,
        }
    }
}

/// Per-call adjustments layered over the resolved endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub method: Option<String>,
}

impl Overrides {
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownEndpoint,
    UnsupportedMethod,
    NetworkError,
    Timeout,
    HttpStatusError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownEndpoint => "UnknownEndpoint",
            Self::UnsupportedMethod => "UnsupportedMethod",
            Self::NetworkError => "NetworkError",
            Self::Timeout => "Timeout",
            Self::HttpStatusError => "HttpStatusError",
        }
    }

    /// Resolution failures are rejected before any request goes out.
    pub fn reached_network(&self) -> bool {
        !matches!(self, Self::UnknownEndpoint | Self::UnsupportedMethod)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    Success {
        status_code: u16,
        response_body: Value,
        correlation_id: Option<String>,
    },
    Failure {
        error_kind: ErrorKind,
        error_message: String,
        correlation_id: Option<String>,
    },
}

impl DispatchResult {
    pub fn failure(error_kind: ErrorKind, error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_kind,
            error_message: error_message.into(),
            correlation_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. } => Some(*status_code),
            Self::Failure { .. } => None,
        }
    }

    pub fn response_body(&self) -> Option<&Value> {
        match self {
            Self::Success { response_body, .. } => Some(response_body),
            Self::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_kind, .. } => Some(*error_kind),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_message, .. } => Some(error_message),
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Success { correlation_id, .. } | Self::Failure { correlation_id, .. } => {
                correlation_id.as_deref()
            }
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("DispatchResult always serializes to a JSON object")
    }
}

#[derive(Serialize)]
struct DispatchResultWire<'a> {
    succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_body: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
}

// Flat on the wire so the host sees one shape for both outcomes.
impl Serialize for DispatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DispatchResultWire {
            succeeded: self.is_success(),
            status_code: self.status_code(),
            response_body: self.response_body(),
            error_kind: self.error_kind(),
            error_message: self.error_message(),
            correlation_id: self.correlation_id(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// One record in the activity log, written once per attempted call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub endpoint_name: String,
    pub direction: Direction,
    pub outcome: Outcome,
    pub payload: Payload,
    pub result: DispatchResult,
}

impl LogEntry {
    pub fn outgoing(endpoint_name: impl Into<String>, payload: Payload, result: DispatchResult) -> Self {
        let outcome = if result.is_success() {
            Outcome::Success
        } else {
            Outcome::Error
        };
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            endpoint_name: endpoint_name.into(),
            direction: Direction::Outgoing,
            outcome,
            payload,
            result,
        }
    }
}
