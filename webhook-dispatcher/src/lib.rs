//! Outbound webhook dispatch for the chat host: endpoint registry, request
//! signing, a bounded activity log and the workflow tools built on top.

pub mod activity_log;
pub mod config;
pub mod dispatcher;
pub mod signing;
pub mod tools;
pub mod transport;
pub mod types;

pub use activity_log::ActivityLog;
pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::{DispatchError, ProbeResult, WebhookDispatcher};
pub use transport::{OutboundRequest, ReqwestTransport, Transport, TransportError, TransportResponse};
pub use types::{
    DispatchResult, EndpointConfig, EndpointSummary, ErrorKind, Headers, HttpMethod, LogEntry,
    Overrides, Payload, Target,
};
