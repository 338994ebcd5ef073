#![allow(dead_code)]

use async_trait::async_trait;
use nexus_webhook_dispatcher::{
    DispatcherConfig, Headers, OutboundRequest, Payload, Transport, TransportError,
    TransportResponse, WebhookDispatcher,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock does with the next request.
#[derive(Clone)]
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: String,
    },
    Fail(TransportError),
    /// Never answers on its own; only the dispatcher's deadline ends it.
    Hang,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Respond {
            status,
            headers: vec![("content-type", "application/json")],
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        if let Self::Respond { headers, .. } = &mut self {
            headers.push((name, value));
        }
        self
    }
}

/// Scripted transport that records every request it sees. Once the script
/// runs out it keeps repeating the fallback reply.
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl MockTransport {
    pub fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn scripted(replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Respond {
                status,
                headers,
                body,
            } => Ok(TransportResponse {
                status,
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Headers>(),
                body,
            }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(TransportError::Network("mock hang ended".into()))
            }
        }
    }
}

/// A config with no preset endpoints.
pub fn bare_config() -> DispatcherConfig {
    DispatcherConfig {
        presets: false,
        ..DispatcherConfig::default()
    }
}

pub fn dispatcher_with(config: DispatcherConfig, transport: Arc<MockTransport>) -> WebhookDispatcher {
    WebhookDispatcher::with_transport(config, transport).unwrap()
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}
