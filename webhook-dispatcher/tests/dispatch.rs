mod common;

use common::{bare_config, dispatcher_with, payload, MockTransport, Reply};
use nexus_webhook_dispatcher::signing::{self, SIGNATURE_HEADER};
use nexus_webhook_dispatcher::types::Outcome;
use nexus_webhook_dispatcher::{
    DispatchResult, DispatcherConfig, EndpointConfig, ErrorKind, HttpMethod, Overrides, Target,
    TransportError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn get_endpoint_success_is_logged_with_payload() {
    let transport = MockTransport::always(Reply::json(200, json!({"ok": true})));
    let dispatcher = dispatcher_with(bare_config(), transport.clone());
    dispatcher
        .register(EndpointConfig::new("ping", "http://example.test/hook", "GET"))
        .await
        .unwrap();

    let result = dispatcher
        .dispatch(Target::named("ping"), payload(json!({"x": 1})), Overrides::default())
        .await;

    assert_eq!(
        result,
        DispatchResult::Success {
            status_code: 200,
            response_body: json!({"ok": true}),
            correlation_id: None,
        }
    );

    let logs = dispatcher.get_recent_logs(10).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].outcome, Outcome::Success);
    assert_eq!(logs[0].endpoint_name, "ping");
    assert_eq!(logs[0].payload, payload(json!({"x": 1})));
    assert_eq!(logs[0].result, result);

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, HttpMethod::Get);
    assert_eq!(sent[0].url, "http://example.test/hook");
    assert_eq!(sent[0].timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn unknown_endpoint_sends_nothing_and_logs_nothing() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let dispatcher = dispatcher_with(bare_config(), transport.clone());

    let result = dispatcher
        .dispatch(Target::named("missing"), payload(json!({"x": 1})), Overrides::default())
        .await;

    assert!(!result.is_success());
    assert_eq!(result.error_kind(), Some(ErrorKind::UnknownEndpoint));
    assert_eq!(dispatcher.log_len().await, 0);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn unsupported_methods_are_rejected_before_io() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let dispatcher = dispatcher_with(bare_config(), transport.clone());
    dispatcher
        .register(EndpointConfig::new("ping", "http://example.test/hook", "POST"))
        .await
        .unwrap();
    dispatcher
        .register(EndpointConfig::new("legacy", "http://example.test/old", "DELETE"))
        .await
        .unwrap();

    let overridden = dispatcher
        .dispatch(Target::named("ping"), payload(json!({})), Overrides::method("DELETE"))
        .await;
    let configured = dispatcher
        .dispatch(Target::named("legacy"), payload(json!({})), Overrides::default())
        .await;
    let inline = dispatcher
        .dispatch(
            Target::inline("http://example.test/any", "PATCH"),
            payload(json!({})),
            Overrides::default(),
        )
        .await;

    for result in [overridden, configured, inline] {
        assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedMethod));
    }
    assert_eq!(dispatcher.log_len().await, 0);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_transport_times_out_at_the_configured_bound() {
    let transport = MockTransport::always(Reply::Hang);
    let dispatcher = dispatcher_with(bare_config(), transport.clone());
    dispatcher
        .register(EndpointConfig::new("slow", "http://example.test/slow", "POST").with_timeout_secs(5))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let result = dispatcher
        .dispatch(Target::named("slow"), payload(json!({"x": 1})), Overrides::default())
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));

    let logs = dispatcher.get_recent_logs(10).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].outcome, Outcome::Error);
}

#[tokio::test]
async fn transport_failures_are_classified_and_logged() {
    let transport = MockTransport::scripted(
        vec![
            Reply::Fail(TransportError::Timeout(Duration::from_secs(30))),
            Reply::Fail(TransportError::Network("connection refused".into())),
            Reply::text(503, "busy").with_header("x-n8n-execution-id", "exec-5"),
        ],
        Reply::json(200, json!({})),
    );
    let dispatcher = dispatcher_with(bare_config(), transport);
    dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/hook", "POST"))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let result = dispatcher
            .dispatch(Target::named("hook"), payload(json!({})), Overrides::default())
            .await;
        assert!(!result.is_success());
        assert!(result.status_code().is_none());
        assert!(result.error_message().is_some());
        kinds.push(result.error_kind().unwrap());
    }
    assert_eq!(
        kinds,
        vec![ErrorKind::Timeout, ErrorKind::NetworkError, ErrorKind::HttpStatusError]
    );

    let logs = dispatcher.get_recent_logs(10).await;
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|e| e.outcome == Outcome::Error));
    assert_eq!(logs[1].result.error_message(), Some("connection refused"));
    assert_eq!(logs[2].result.correlation_id(), Some("exec-5"));
}

#[tokio::test]
async fn log_keeps_only_the_last_n_dispatches() {
    let transport = MockTransport::always(Reply::json(200, json!({"ok": true})));
    let config = DispatcherConfig {
        log_capacity: 3,
        ..bare_config()
    };
    let dispatcher = dispatcher_with(config, transport);
    dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/hook", "POST"))
        .await
        .unwrap();

    for n in 0..5 {
        dispatcher
            .dispatch(Target::named("hook"), payload(json!({"n": n})), Overrides::default())
            .await;
        assert!(dispatcher.log_len().await <= 3);
    }

    let kept: Vec<i64> = dispatcher
        .get_recent_logs(100)
        .await
        .iter()
        .map(|e| e.payload["n"].as_i64().unwrap())
        .collect();
    assert_eq!(kept, vec![2, 3, 4]);
}

#[tokio::test]
async fn recent_logs_with_fewer_entries_than_requested() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let dispatcher = dispatcher_with(bare_config(), transport);
    dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/hook", "POST"))
        .await
        .unwrap();
    for n in 0..3 {
        dispatcher
            .dispatch(Target::named("hook"), payload(json!({"n": n})), Overrides::default())
            .await;
    }

    let mut logs = dispatcher.get_recent_logs(5).await;
    let ns: Vec<i64> = logs.iter().map(|e| e.payload["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![0, 1, 2]);

    logs.clear();
    assert_eq!(dispatcher.get_recent_logs(5).await.len(), 3);
}

#[tokio::test]
async fn concurrent_dispatches_never_lose_entries() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let config = DispatcherConfig {
        log_capacity: 20,
        ..bare_config()
    };
    let dispatcher = Arc::new(dispatcher_with(config, transport.clone()));
    dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/hook", "POST"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..50 {
        let d = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            d.dispatch(Target::named("hook"), payload(json!({"n": n})), Overrides::default())
                .await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_success());
    }

    assert_eq!(transport.request_count(), 50);
    assert_eq!(dispatcher.log_len().await, 20);
}

#[tokio::test]
async fn list_endpoints_is_ordered_and_stable() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let dispatcher = dispatcher_with(DispatcherConfig::default(), transport);
    dispatcher
        .register(EndpointConfig::new("zeta", "http://example.test/z", "put"))
        .await
        .unwrap();
    dispatcher
        .register(EndpointConfig::new("alpha", "http://example.test/a", "GET"))
        .await
        .unwrap();

    let first = dispatcher.list_endpoints().await;
    let second = dispatcher.list_endpoints().await;
    assert_eq!(first, second);

    let names: Vec<&str> = first.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "n8n_content_gen",
            "n8n_social_post",
            "n8n_analytics",
            "n8n_media_process",
            "n8n_campaign",
            "zeta",
            "alpha",
        ]
    );
    assert_eq!(first[5].method, "PUT");
    assert_eq!(first[0].display_name, "Content Generation");
}

#[tokio::test]
async fn registered_endpoints_cannot_be_replaced() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let dispatcher = dispatcher_with(bare_config(), transport);
    dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/one", "POST"))
        .await
        .unwrap();

    let err = dispatcher
        .register(EndpointConfig::new("hook", "http://example.test/two", "POST"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "endpoint already registered: hook");
    assert_eq!(
        dispatcher.endpoint("hook").await.unwrap().url,
        "http://example.test/one"
    );
}

#[tokio::test]
async fn signed_request_carries_verifiable_signature_and_api_key() {
    let transport = MockTransport::always(Reply::json(200, json!({})));
    let config = DispatcherConfig {
        api_key: Some("n8n-key".into()),
        ..bare_config()
    };
    let dispatcher = dispatcher_with(config, transport.clone());
    dispatcher
        .register(
            EndpointConfig::new("signed", "http://example.test/signed", "POST")
                .with_secret("shh")
                .with_header("X-Source", "endpoint"),
        )
        .await
        .unwrap();

    let body = payload(json!({"b": 2, "a": 1}));
    let mut overrides = Overrides::default();
    overrides.headers.insert("X-Source".into(), "caller".into());
    dispatcher
        .dispatch(Target::named("signed"), body.clone(), overrides)
        .await;
    dispatcher
        .dispatch(Target::named("signed"), body.clone(), Overrides::default())
        .await;

    let sent = transport.requests();
    let headers = &sent[0].headers;
    assert_eq!(headers["x-n8n-api-key"], "n8n-key");
    assert_eq!(headers["x-source"], "caller");
    assert_eq!(sent[1].headers["x-source"], "endpoint");

    let signature = &headers[SIGNATURE_HEADER];
    assert_eq!(signature, &sent[1].headers[SIGNATURE_HEADER]);
    assert!(signing::verify_signature(
        "shh",
        signing::canonical_json(&body).as_bytes(),
        signature
    ));
    assert_eq!(sent[0].payload, body);
}

#[tokio::test]
async fn unregistered_name_with_url_goes_ad_hoc() {
    let transport = MockTransport::always(Reply::text(200, "Workflow was started"));
    let dispatcher = dispatcher_with(bare_config(), transport.clone());

    let result = dispatcher
        .dispatch(
            Target::named_or_url("one_off", "http://example.test/once"),
            payload(json!({"k": "v"})),
            Overrides::default(),
        )
        .await;

    assert_eq!(result.response_body(), Some(&json!({"text": "Workflow was started"})));
    let sent = transport.requests();
    assert_eq!(sent[0].method, HttpMethod::Post);
    assert_eq!(sent[0].url, "http://example.test/once");
    assert_eq!(dispatcher.get_recent_logs(1).await[0].endpoint_name, "one_off");
    assert!(dispatcher.endpoint("one_off").await.is_none());
}

#[tokio::test]
async fn probe_reports_reachability_without_logging() {
    let transport = MockTransport::scripted(
        vec![
            Reply::text(404, "not registered"),
            Reply::Fail(TransportError::Network("dns error".into())),
        ],
        Reply::json(200, json!({})),
    );
    let dispatcher = dispatcher_with(bare_config(), transport.clone());

    let reachable = dispatcher
        .probe(Target::inline("http://example.test/hook", "POST"))
        .await;
    assert!(reachable.reachable);
    assert_eq!(reachable.status_code, Some(404));

    let unreachable = dispatcher
        .probe(Target::inline("http://example.test/hook", "POST"))
        .await;
    assert!(!unreachable.reachable);
    assert_eq!(unreachable.error_kind, Some(ErrorKind::NetworkError));

    let unknown = dispatcher.probe(Target::named("nope")).await;
    assert_eq!(unknown.error_kind, Some(ErrorKind::UnknownEndpoint));

    let sent = transport.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].method, HttpMethod::Get);
    assert_eq!(sent[0].timeout, Duration::from_secs(10));
    assert_eq!(sent[0].payload, payload(json!({"test": "connection"})));
    assert_eq!(dispatcher.log_len().await, 0);
}

#[tokio::test]
async fn execution_status_queries_the_api() {
    let transport = MockTransport::always(Reply::json(200, json!({"status": "success"})));
    let config = DispatcherConfig {
        base_url: "http://n8n.test/".into(),
        ..bare_config()
    };
    let dispatcher = dispatcher_with(config, transport.clone());

    let result = dispatcher.execution_status("981").await;
    assert_eq!(result.response_body(), Some(&json!({"status": "success"})));

    let sent = transport.requests();
    assert_eq!(sent[0].method, HttpMethod::Get);
    assert_eq!(sent[0].url, "http://n8n.test/api/v1/executions/981");
    assert_eq!(
        dispatcher.get_recent_logs(1).await[0].endpoint_name,
        "n8n_execution_status"
    );
}
