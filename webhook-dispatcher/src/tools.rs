//! Chat-facing operations. Each one turns host input into a payload for a
//! preset workflow endpoint and renders the outcome as a short text block.

use crate::dispatcher::WebhookDispatcher;
use crate::types::{DispatchResult, EndpointConfig, Headers, Overrides, Payload, Target};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

type Result = std::result::Result<Value, String>;

const ANONYMOUS: &str = "Anonymous";
const NOT_AVAILABLE: &str = "N/A";

/// Route an `execute` call to its operation.
pub async fn execute(operation: &str, input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    match operation {
        "dispatch" => op_dispatch(input, dispatcher).await,
        "get_recent_logs" => op_get_recent_logs(input, dispatcher).await,
        "list_endpoints" => op_list_endpoints(dispatcher).await,
        "register_endpoint" => op_register_endpoint(input, dispatcher).await,
        "trigger_content_generation" => op_trigger_content_generation(input, dispatcher).await,
        "schedule_social_media_post" => op_schedule_social_media_post(input, dispatcher).await,
        "fetch_analytics_report" => op_fetch_analytics_report(input, dispatcher).await,
        "process_media_file" => op_process_media_file(input, dispatcher).await,
        "trigger_campaign_workflow" => op_trigger_campaign_workflow(input, dispatcher).await,
        "send_custom_webhook" => op_send_custom_webhook(input, dispatcher).await,
        "list_available_webhooks" => op_list_available_webhooks(dispatcher).await,
        "get_webhook_logs" => op_get_webhook_logs(input, dispatcher).await,
        "check_status" => op_check_status(input, dispatcher).await,
        "get_execution_status" => op_get_execution_status(input, dispatcher).await,
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn parse_input<T: DeserializeOwned>(input: &Value) -> std::result::Result<T, String> {
    let input = if input.is_null() { json!({}) } else { input.clone() };
    serde_json::from_value(input).map_err(|e| format!("invalid input: {e}"))
}

/// Split a comma-separated field, trimming and dropping empty items.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn stamp(payload: &mut Payload, by_key: &str, user: Option<&str>) {
    payload.insert(by_key.into(), json!(user.unwrap_or(ANONYMOUS)));
    payload.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
}

fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn execution_id(result: &DispatchResult) -> &str {
    result.correlation_id().unwrap_or(NOT_AVAILABLE)
}

fn error_text(result: &DispatchResult) -> &str {
    result.error_message().unwrap_or("unknown error")
}

fn reply(message: String, result: &DispatchResult) -> Value {
    json!({ "message": message, "result": result })
}

/// "last_7_days" -> "Last 7 Days"
pub fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<String>>()
        .join(" ")
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect::<String>(),
        None => String::new(),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn default_limit() -> usize {
    10
}

// ---------------------------------------------------------------------------
// raw dispatcher operations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DispatchInput {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    headers: Headers,
}

pub async fn op_dispatch(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: DispatchInput = parse_input(input)?;
    let payload = match input.payload {
        None | Some(Value::Null) => Payload::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err("payload must be a JSON object".into()),
    };

    let (target, method) = match (input.endpoint, input.url) {
        (Some(name), Some(url)) => (Target::named_or_url(name, url), input.method),
        (Some(name), None) => (Target::named(name), input.method),
        (None, Some(url)) => {
            let method = input.method.unwrap_or_else(|| "POST".into());
            (Target::inline(url, method), None)
        }
        (None, None) => (Target::named(""), input.method),
    };
    let overrides = Overrides {
        headers: input.headers,
        method,
    };

    let result = dispatcher.dispatch(target, payload, overrides).await;
    Ok(result.to_json())
}

#[derive(Deserialize)]
struct LogsInput {
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn op_get_recent_logs(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: LogsInput = parse_input(input)?;
    let entries = dispatcher.get_recent_logs(input.limit).await;
    Ok(json!({ "count": entries.len(), "entries": entries }))
}

pub async fn op_list_endpoints(dispatcher: &WebhookDispatcher) -> Result {
    let endpoints = dispatcher.list_endpoints().await;
    Ok(json!({ "count": endpoints.len(), "endpoints": endpoints }))
}

pub async fn op_register_endpoint(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let endpoint: EndpointConfig = parse_input(input)?;
    let summary = endpoint.summary();
    dispatcher
        .register(endpoint)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "registered": summary }))
}

// ---------------------------------------------------------------------------
// workflow tools
// ---------------------------------------------------------------------------

fn default_content_type() -> String {
    "blog".into()
}
fn default_audience() -> String {
    "general".into()
}
fn default_tone() -> String {
    "professional".into()
}
fn default_word_count() -> u32 {
    1000
}

#[derive(Deserialize)]
struct ContentInput {
    topic: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    #[serde(default = "default_audience")]
    target_audience: String,
    #[serde(default = "default_tone")]
    tone: String,
    #[serde(default = "default_word_count")]
    word_count: u32,
    #[serde(default)]
    seo_keywords: Option<String>,
    #[serde(default)]
    additional_context: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

pub async fn op_trigger_content_generation(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: ContentInput = parse_input(input)?;
    let mut payload = into_payload(json!({
        "topic": input.topic,
        "content_type": input.content_type,
        "target_audience": input.target_audience,
        "tone": input.tone,
        "word_count": input.word_count,
        "seo_keywords": split_list(input.seo_keywords.as_deref()),
        "additional_context": input.additional_context,
    }));
    stamp(&mut payload, "requested_by", input.requested_by.as_deref());

    let result = dispatcher
        .dispatch(Target::named("n8n_content_gen"), payload, Overrides::default())
        .await;

    let message = match &result {
        DispatchResult::Success { status_code, .. } => format!(
            "✅ Content generation workflow started!\n\n\
             📝 Topic: {}\n\
             📋 Type: {}\n\
             🎯 Audience: {}\n\
             📊 Status: {status_code}\n\
             🆔 Execution ID: {}\n\n\
             The workflow is processing your request.",
            input.topic,
            input.content_type,
            input.target_audience,
            execution_id(&result),
        ),
        DispatchResult::Failure { .. } => format!(
            "❌ Failed to trigger content generation\n\n\
             Error: {}\n\n\
             Please check that n8n is running and the webhook is configured.",
            error_text(&result),
        ),
    };
    Ok(reply(message, &result))
}

fn default_schedule() -> String {
    "now".into()
}

#[derive(Deserialize)]
struct SocialInput {
    platform: String,
    content: String,
    #[serde(default = "default_schedule")]
    schedule_time: String,
    #[serde(default)]
    media_urls: Option<String>,
    #[serde(default)]
    hashtags: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

pub async fn op_schedule_social_media_post(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: SocialInput = parse_input(input)?;
    let media = split_list(input.media_urls.as_deref());
    let hashtags = split_list(input.hashtags.as_deref());
    let schedule_time = if input.schedule_time.trim().is_empty() {
        default_schedule()
    } else {
        input.schedule_time.clone()
    };

    let mut payload = into_payload(json!({
        "platform": input.platform.to_lowercase(),
        "content": input.content,
        "schedule_time": schedule_time,
        "media_urls": media,
        "hashtags": hashtags,
        "caption": input.caption,
    }));
    stamp(&mut payload, "scheduled_by", input.requested_by.as_deref());

    let result = dispatcher
        .dispatch(Target::named("n8n_social_post"), payload, Overrides::default())
        .await;

    let message = if result.is_success() {
        let when = if schedule_time == "now" {
            "immediately"
        } else {
            schedule_time.as_str()
        };
        format!(
            "✅ Social media post scheduled!\n\n\
             📱 Platform: {}\n\
             ⏰ Scheduled: {when}\n\
             📝 Content: {}\n\
             🖼️ Media: {} file(s)\n\
             #️⃣ Hashtags: {}\n\
             🆔 Execution ID: {}",
            capitalize(&input.platform),
            preview(&input.content, 100),
            media.len(),
            hashtags.len(),
            execution_id(&result),
        )
    } else {
        format!("❌ Failed to schedule post\n\nError: {}", error_text(&result))
    };
    Ok(reply(message, &result))
}

fn default_date_range() -> String {
    "last_7_days".into()
}
fn default_metrics() -> Option<String> {
    Some("views,engagement,reach".into())
}
fn default_platforms() -> Option<String> {
    Some("all".into())
}
fn default_report_format() -> String {
    "summary".into()
}

#[derive(Deserialize)]
struct AnalyticsInput {
    #[serde(default = "default_date_range")]
    date_range: String,
    #[serde(default = "default_metrics")]
    metrics: Option<String>,
    #[serde(default = "default_platforms")]
    platforms: Option<String>,
    #[serde(default = "default_report_format")]
    report_format: String,
    #[serde(default)]
    requested_by: Option<String>,
}

pub async fn op_fetch_analytics_report(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: AnalyticsInput = parse_input(input)?;
    let mut metrics = split_list(input.metrics.as_deref());
    if metrics.is_empty() {
        metrics = vec!["views".into(), "engagement".into()];
    }
    let mut platforms = split_list(input.platforms.as_deref());
    if platforms.is_empty() {
        platforms = vec!["all".into()];
    }

    let mut payload = into_payload(json!({
        "date_range": input.date_range,
        "metrics": metrics,
        "platforms": platforms,
        "report_format": input.report_format,
    }));
    stamp(&mut payload, "requested_by", input.requested_by.as_deref());

    let result = dispatcher
        .dispatch(Target::named("n8n_analytics"), payload, Overrides::default())
        .await;

    let message = match result.response_body() {
        Some(body) => {
            let report = match body {
                Value::Null => "Report is being generated...".to_string(),
                Value::Object(map) if map.is_empty() => "Report is being generated...".to_string(),
                other => pretty(other),
            };
            format!(
                "📊 Analytics Report Generated\n\n\
                 📅 Period: {}\n\
                 📈 Metrics: {}\n\
                 🌐 Platforms: {}\n\
                 🆔 Execution ID: {}\n\n\
                 {report}",
                title_case(&input.date_range),
                metrics.join(", "),
                platforms.join(", "),
                execution_id(&result),
            )
        }
        None => format!("❌ Failed to fetch analytics\n\nError: {}", error_text(&result)),
    };
    Ok(reply(message, &result))
}

fn default_quality() -> String {
    "high".into()
}

#[derive(Deserialize)]
struct MediaInput {
    media_url: String,
    operations: String,
    #[serde(default)]
    output_format: Option<String>,
    #[serde(default = "default_quality")]
    quality: String,
    #[serde(default)]
    requested_by: Option<String>,
}

pub async fn op_process_media_file(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: MediaInput = parse_input(input)?;
    let operations = split_list(Some(&input.operations));

    let mut payload = into_payload(json!({
        "media_url": input.media_url,
        "operations": operations,
        "output_format": input.output_format,
        "quality": input.quality,
    }));
    stamp(&mut payload, "processed_by", input.requested_by.as_deref());

    let result = dispatcher
        .dispatch(Target::named("n8n_media_process"), payload, Overrides::default())
        .await;

    let message = if result.is_success() {
        format!(
            "✅ Media processing started!\n\n\
             🖼️ Source: {}\n\
             ⚙️ Operations: {}\n\
             📦 Output: {}\n\
             ⭐ Quality: {}\n\
             🆔 Execution ID: {}",
            input.media_url,
            operations.join(", "),
            input.output_format.as_deref().unwrap_or("same as source"),
            input.quality,
            execution_id(&result),
        )
    } else {
        format!("❌ Failed to process media\n\nError: {}", error_text(&result))
    };
    Ok(reply(message, &result))
}

fn default_duration_days() -> u32 {
    7
}

#[derive(Deserialize)]
struct CampaignInput {
    campaign_name: String,
    campaign_type: String,
    channels: String,
    target_audience_json: String,
    #[serde(default)]
    budget: Option<f64>,
    #[serde(default = "default_schedule")]
    start_date: String,
    #[serde(default = "default_duration_days")]
    duration_days: u32,
    #[serde(default)]
    requested_by: Option<String>,
}

/// Audience arrives as JSON text; anything that is not JSON is kept as a
/// plain description.
pub fn parse_audience(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "audience": raw }))
}

pub async fn op_trigger_campaign_workflow(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: CampaignInput = parse_input(input)?;
    let channels = split_list(Some(&input.channels));

    let mut payload = into_payload(json!({
        "campaign_name": input.campaign_name,
        "campaign_type": input.campaign_type,
        "channels": channels,
        "target_audience": parse_audience(&input.target_audience_json),
        "budget": input.budget,
        "start_date": input.start_date,
        "duration_days": input.duration_days,
    }));
    stamp(&mut payload, "created_by", input.requested_by.as_deref());

    let result = dispatcher
        .dispatch(Target::named("n8n_campaign"), payload, Overrides::default())
        .await;

    let message = if result.is_success() {
        let budget = match input.budget {
            Some(b) => format!("${b}"),
            None => "Not specified".into(),
        };
        format!(
            "🚀 Campaign workflow initiated!\n\n\
             📢 Campaign: {}\n\
             🎯 Type: {}\n\
             📱 Channels: {}\n\
             💰 Budget: {budget}\n\
             📅 Start: {}\n\
             ⏱️ Duration: {} days\n\
             🆔 Execution ID: {}",
            input.campaign_name,
            input.campaign_type,
            channels.join(", "),
            input.start_date,
            input.duration_days,
            execution_id(&result),
        )
    } else {
        format!("❌ Failed to trigger campaign\n\nError: {}", error_text(&result))
    };
    Ok(reply(message, &result))
}

fn default_method() -> String {
    "POST".into()
}

#[derive(Deserialize)]
struct CustomInput {
    url: String,
    payload_json: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers_json: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

pub async fn op_send_custom_webhook(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: CustomInput = parse_input(input)?;

    let mut payload = match serde_json::from_str::<Value>(&input.payload_json) {
        Ok(Value::Object(map)) => map,
        _ => return Ok(json!({ "message": "❌ Invalid JSON in payload" })),
    };
    let headers = match input.headers_json.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(raw) => match serde_json::from_str::<Headers>(raw) {
            Ok(h) => h,
            Err(_) => return Ok(json!({ "message": "❌ Invalid JSON in headers" })),
        },
        None => Headers::new(),
    };

    payload.insert(
        "_triggered_by".into(),
        json!(input.requested_by.as_deref().unwrap_or(ANONYMOUS)),
    );
    payload.insert("_timestamp".into(), json!(Utc::now().to_rfc3339()));

    let overrides = Overrides {
        headers,
        method: None,
    };
    let result = dispatcher
        .dispatch(Target::inline(&input.url, &input.method), payload, overrides)
        .await;

    let message = match &result {
        DispatchResult::Success {
            status_code,
            response_body,
            ..
        } => format!(
            "✅ Custom webhook sent!\n\n\
             🔗 URL: {}\n\
             📤 Method: {}\n\
             📦 Status: {status_code}\n\n\
             Response: {}",
            input.url,
            input.method.to_uppercase(),
            pretty(response_body),
        ),
        DispatchResult::Failure { .. } => {
            format!("❌ Custom webhook failed\n\nError: {}", error_text(&result))
        }
    };
    Ok(reply(message, &result))
}

pub async fn op_list_available_webhooks(dispatcher: &WebhookDispatcher) -> Result {
    let endpoints = dispatcher.list_endpoints().await;
    if endpoints.is_empty() {
        return Ok(json!({ "message": "No webhooks configured." }));
    }

    let lines: Vec<String> = endpoints
        .iter()
        .map(|e| format!("• {} ({})\n  {} {}", e.display_name, e.name, e.method, e.url))
        .collect();
    let message = format!("🔗 Available Webhooks\n\n{}", lines.join("\n"));
    Ok(json!({ "message": message, "endpoints": endpoints }))
}

pub async fn op_get_webhook_logs(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: LogsInput = parse_input(input)?;
    let limit = input.limit.min(dispatcher.log_capacity());
    let entries = dispatcher.get_recent_logs(limit).await;
    if entries.is_empty() {
        return Ok(json!({ "message": "📝 No webhook activity yet.", "entries": [] }));
    }

    let lines: Vec<String> = entries
        .iter()
        .map(|e| {
            let mark = if e.result.is_success() { "✅" } else { "❌" };
            let status = if e.result.is_success() { "success" } else { "error" };
            format!(
                "{mark} 📤 {}\n  Time: {}\n  Status: {status}",
                e.endpoint_name,
                e.timestamp.to_rfc3339()
            )
        })
        .collect();
    let message = format!(
        "📊 Recent Webhook Activity (Last {})\n\n{}",
        entries.len(),
        lines.join("\n")
    );
    Ok(json!({ "message": message, "entries": entries }))
}

#[derive(Deserialize)]
struct StatusInput {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub async fn op_check_status(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: StatusInput = parse_input(input)?;
    let target = match (input.endpoint, input.url) {
        (_, Some(url)) => Target::inline(url, "GET"),
        (Some(name), None) => Target::named(name),
        (None, None) => return Err("missing required field: endpoint or url".into()),
    };

    let probe = dispatcher.probe(target).await;
    let url = probe.url.as_deref().unwrap_or(NOT_AVAILABLE);
    let message = match probe.status_code {
        Some(status) if probe.reachable => format!(
            "✅ Webhook is reachable!\n\n🔗 URL: {url}\n📊 Status Code: {status}"
        ),
        _ => format!(
            "⚠️ Webhook check failed\n\n\
             🔗 URL: {url}\n\
             ❌ Error: {}\n\n\
             Possible issues:\n\
             1. The workflow is not active\n\
             2. The webhook URL is incorrect\n\
             3. Network connectivity issues",
            probe.error_message.as_deref().unwrap_or("unknown error"),
        ),
    };
    Ok(json!({ "message": message, "probe": probe }))
}

#[derive(Deserialize)]
struct ExecutionInput {
    execution_id: String,
}

pub async fn op_get_execution_status(input: &Value, dispatcher: &WebhookDispatcher) -> Result {
    let input: ExecutionInput = parse_input(input)?;
    if input.execution_id.trim().is_empty() {
        return Err("missing required field: execution_id".into());
    }

    let result = dispatcher.execution_status(&input.execution_id).await;
    let message = match result.response_body() {
        Some(body) => format!("📋 Execution {}\n\n{}", input.execution_id.trim(), pretty(body)),
        None => format!(
            "❌ Failed to fetch execution {}\n\nError: {}",
            input.execution_id.trim(),
            error_text(&result)
        ),
    };
    Ok(reply(message, &result))
}
