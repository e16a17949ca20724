//! `POST /v1/messages` — validation, the per-account dispatch/retry loop
//! (spec.md §4.8), and folding the upstream event-stream into either a
//! streamed SSE response or a single aggregated JSON body.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONNECTION, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use kiro_accounts::Outcome as HealthOutcome;
use kiro_claude::content::ContentBlock;
use kiro_claude::request::{MessageRequest, Role, SystemPrompt, ThinkingConfig};
use kiro_claude::response::MessageResponse;
use kiro_claude::sse::{ClaudeSseEvent, ErrorPayload};
use kiro_claude::tokens::{estimate_input_tokens, CONTEXT_WINDOW_TOKENS, MAX_OUTPUT_TOKENS};
use kiro_core::error::GatewayError;
use kiro_core::types::Account;
use kiro_eventstream::{FrameDecoder, UpstreamChunk};
use kiro_upstream::{classify, Aggregator, Converter, UpstreamOutcome};

use crate::app::AppState;

pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !check_auth(&state, &headers) {
        return error_response(&GatewayError::Authentication(
            "missing or invalid API key".to_string(),
        ));
    }

    let request: MessageRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(&GatewayError::InvalidRequest(format!(
                "invalid JSON body: {e}"
            )))
        }
    };

    if let Err(e) = validate_request(&request) {
        return error_response(&e);
    }

    let input_tokens_estimate = estimate_request_input_tokens(&request);
    if input_tokens_estimate > CONTEXT_WINDOW_TOKENS {
        return error_response(&GatewayError::RequestTooLarge(format!(
            "estimated input tokens ({input_tokens_estimate}) exceed the context window ({CONTEXT_WINDOW_TOKENS})"
        )));
    }

    let (account, resp) = match dispatch_with_retries(&state, &request).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let message_id = format!("msg_{}", Uuid::new_v4().simple());

    if request.stream {
        build_streaming_response(state, account, resp, request.model, input_tokens_estimate, message_id)
    } else {
        match aggregate_response(&state, &account, resp, &request.model, input_tokens_estimate, message_id).await {
            Ok(message_response) => Json(message_response).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.api_key {
        None => true,
        Some(expected) => extract_api_key(headers).map(|k| k == expected).unwrap_or(false),
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error_response(error: &GatewayError) -> Response {
    let status = StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.to_string(),
        }
    });
    (status, Json(body)).into_response()
}

fn validate_request(request: &MessageRequest) -> Result<(), GatewayError> {
    if request.model.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("model must not be empty".to_string()));
    }
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest("messages must not be empty".to_string()));
    }
    if request.messages[0].role != Role::User {
        return Err(GatewayError::InvalidRequest(
            "the first message must have role \"user\"".to_string(),
        ));
    }
    for pair in request.messages.windows(2) {
        if pair[0].role == pair[1].role {
            return Err(GatewayError::InvalidRequest(
                "messages must alternate between \"user\" and \"assistant\" roles".to_string(),
            ));
        }
    }
    if request.max_tokens == 0 || request.max_tokens > MAX_OUTPUT_TOKENS {
        return Err(GatewayError::InvalidRequest(format!(
            "max_tokens must be in (0, {MAX_OUTPUT_TOKENS}]"
        )));
    }
    if let Some(temperature) = request.temperature {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(GatewayError::InvalidRequest(
                "temperature must be within [0, 1]".to_string(),
            ));
        }
    }
    if let Some(top_p) = request.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(GatewayError::InvalidRequest("top_p must be within [0, 1]".to_string()));
        }
    }
    Ok(())
}

fn estimate_request_input_tokens(request: &MessageRequest) -> u64 {
    let system_text = request.system.as_ref().map(SystemPrompt::as_text).unwrap_or_default();
    let messages_text = request_messages_text(request);
    let thinking_enabled = request.thinking.as_ref().map(ThinkingConfig::is_enabled).unwrap_or(false);
    estimate_input_tokens(&system_text, &messages_text, thinking_enabled)
}

fn request_messages_text(request: &MessageRequest) -> String {
    let mut text = String::new();
    for message in &request.messages {
        for block in message.content.clone().into_blocks() {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { input, .. } => text.push_str(&input.to_string()),
                ContentBlock::ToolResult { content, .. } => text.push_str(&content.as_text()),
                ContentBlock::Thinking { thinking, .. } => text.push_str(&thinking),
                ContentBlock::Image { .. } => {}
            }
        }
    }
    text
}

enum FailureAction {
    /// Fatal — surface to the client immediately, no further retry.
    Terminal(GatewayError),
    /// Exclude the account and try the next one.
    Retry(GatewayError),
    /// "Improperly formed request" — retry once against the same account
    /// and token with synthetic tool definitions injected (spec.md §4.5
    /// step 7), handled inline by the caller since it needs the token.
    RetryWithInjectedTools,
}

async fn handle_upstream_failure(
    state: &AppState,
    account: &Account,
    status: u16,
    body: &str,
) -> FailureAction {
    match classify(status, body) {
        UpstreamOutcome::Success => unreachable!("classify never returns Success for a >=400 status"),
        UpstreamOutcome::QuotaExhausted => {
            let _ = kiro_accounts::apply_outcome(&state.store, &account.uuid, HealthOutcome::QuotaExhausted).await;
            FailureAction::Retry(GatewayError::Api {
                status,
                body: body.to_string(),
            })
        }
        UpstreamOutcome::RateLimitedOrForbidden => {
            let _ = kiro_accounts::apply_outcome(&state.store, &account.uuid, HealthOutcome::RateLimitedOrForbidden)
                .await;
            FailureAction::Retry(GatewayError::Api {
                status,
                body: body.to_string(),
            })
        }
        UpstreamOutcome::RequestTooLarge => FailureAction::Terminal(GatewayError::RequestTooLarge(body.to_string())),
        UpstreamOutcome::ImproperlyFormed => FailureAction::RetryWithInjectedTools,
        UpstreamOutcome::UnsupportedModel => {
            let _ = kiro_accounts::apply_outcome(&state.store, &account.uuid, HealthOutcome::UnsupportedModel).await;
            FailureAction::Retry(GatewayError::Api {
                status,
                body: body.to_string(),
            })
        }
        UpstreamOutcome::Other { status, body } => FailureAction::Retry(GatewayError::Api { status, body }),
    }
}

/// The dispatch/retry loop, spec.md §4.8 steps 1-6. Returns the chosen
/// account and the successful upstream response, still unread.
async fn dispatch_with_retries(
    state: &AppState,
    request: &MessageRequest,
) -> Result<(Account, reqwest::Response), GatewayError> {
    let mut excluded: HashSet<String> = HashSet::new();
    let mut tried: Vec<String> = Vec::new();
    let mut last_error: Option<GatewayError> = None;

    for _ in 0..state.config.max_retries {
        let account = match state.selector.select(&excluded).await {
            Ok(a) => a,
            Err(e) => {
                if tried.is_empty() {
                    return Err(e);
                }
                return Err(finalize_error(last_error, &tried));
            }
        };
        tried.push(account.uuid.clone());

        let token = match state.token_manager.get_valid_token(&account).await {
            Ok(t) => t,
            Err(e) => {
                warn!(account_uuid = %account.uuid, error = %e, "token acquisition failed, excluding account");
                excluded.insert(account.uuid.clone());
                last_error = Some(e);
                continue;
            }
        };

        let envelope = kiro_translate::translate(request, &account)?;

        let body_len = serde_json::to_vec(&envelope)?.len();
        if body_len > state.config.max_request_body {
            return Err(GatewayError::RequestTooLarge(format!(
                "translated request body ({body_len} bytes) exceeds the configured max ({} bytes)",
                state.config.max_request_body
            )));
        }

        let resp = match state.upstream.dispatch(&account, &token.access_token, &envelope).await {
            Ok(r) => r,
            Err(e) => {
                warn!(account_uuid = %account.uuid, error = %e, "upstream dispatch transport error, excluding account");
                excluded.insert(account.uuid.clone());
                last_error = Some(GatewayError::Upstream(e.to_string()));
                continue;
            }
        };

        let status = resp.status().as_u16();
        if status < 400 {
            let _ = state.store.record_success_atomic(&account.uuid).await;
            return Ok((account, resp));
        }

        let body_text = resp.text().await.unwrap_or_default();
        match handle_upstream_failure(state, &account, status, &body_text).await {
            FailureAction::Terminal(e) => return Err(e),
            FailureAction::Retry(e) => {
                excluded.insert(account.uuid.clone());
                last_error = Some(e);
            }
            FailureAction::RetryWithInjectedTools => {
                let mut retried = envelope.clone();
                kiro_translate::inject_tools_from_history(&mut retried);
                match state.upstream.dispatch(&account, &token.access_token, &retried).await {
                    Ok(r2) => {
                        let status2 = r2.status().as_u16();
                        if status2 < 400 {
                            let _ = state.store.record_success_atomic(&account.uuid).await;
                            return Ok((account, r2));
                        }
                        let body2 = r2.text().await.unwrap_or_default();
                        warn!(
                            account_uuid = %account.uuid,
                            status = status2,
                            "tools-injection retry also failed, excluding account"
                        );
                        let _ = kiro_accounts::apply_outcome(
                            &state.store,
                            &account.uuid,
                            HealthOutcome::UnsupportedModel,
                        )
                        .await;
                        excluded.insert(account.uuid.clone());
                        last_error = Some(GatewayError::Api {
                            status: status2,
                            body: body2,
                        });
                    }
                    Err(e) => {
                        warn!(account_uuid = %account.uuid, error = %e, "tools-injection retry transport error");
                        excluded.insert(account.uuid.clone());
                        last_error = Some(GatewayError::Upstream(e.to_string()));
                    }
                }
            }
        }
    }

    Err(finalize_error(last_error, &tried))
}

/// Build the final client-facing error once the retry budget is exhausted,
/// reporting the last upstream error verbatim with the tried-account list
/// (spec.md §4.8's "On exhausting retries") and reclassifying it against the
/// error taxonomy in spec.md §7.
fn finalize_error(last_error: Option<GatewayError>, tried: &[String]) -> GatewayError {
    let tried_note = if tried.is_empty() {
        String::new()
    } else {
        format!(" (tried accounts: {})", tried.join(", "))
    };
    match last_error {
        None => GatewayError::Overloaded,
        Some(GatewayError::Api { status, body }) => {
            let message = format!("{body}{tried_note}");
            match status {
                429 => GatewayError::RateLimit(message),
                529 => GatewayError::Overloaded,
                _ => GatewayError::Api { status, body: message },
            }
        }
        Some(other) => other,
    }
}

async fn aggregate_response(
    state: &AppState,
    account: &Account,
    resp: reqwest::Response,
    model: &str,
    input_tokens_estimate: u64,
    message_id: String,
) -> Result<MessageResponse, GatewayError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {e}")))?;

    let mut decoder = FrameDecoder::new();
    let frames = decoder
        .feed(&bytes)
        .map_err(|e| GatewayError::Upstream(format!("event-stream decode error: {e}")))?;

    let mut aggregator = Aggregator::new(message_id, model.to_string(), input_tokens_estimate);
    let mut saw_exception = false;
    for frame in frames {
        if frame.is_exception() {
            saw_exception = true;
            continue;
        }
        if frame.message_type() != Some("event") {
            continue;
        }
        match UpstreamChunk::parse(&frame.payload) {
            Ok(chunk) => aggregator.handle_chunk(&chunk),
            Err(e) => warn!(error = %e, "failed to parse upstream chunk"),
        }
    }

    let content_delivered = aggregator.content_delivered();
    if saw_exception && !content_delivered {
        warn!(account_uuid = %account.uuid, "upstream terminated before producing any content");
        let _ = state.store.mark_unhealthy(&account.uuid).await;
        return Err(GatewayError::Api {
            status: 500,
            body: "upstream terminated before producing any content".to_string(),
        });
    }

    Ok(aggregator.finish())
}

struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn build_streaming_response(
    state: Arc<AppState>,
    account: Account,
    resp: reqwest::Response,
    model: String,
    input_tokens_estimate: u64,
    message_id: String,
) -> Response {
    let (tx, mut rx) = mpsc::channel::<ClaudeSseEvent>(64);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        run_streaming_dispatch(
            state,
            account,
            resp,
            input_tokens_estimate,
            message_id,
            model,
            tx,
            task_cancel,
        )
        .await;
    });

    let stream = async_stream::stream! {
        let _guard = CancelOnDrop(cancel);
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<_, Infallible>(Event::default().event(event.event_name()).data(data));
        }
    };

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Drive the upstream body to completion, folding decoded chunks through
/// `Converter` and forwarding emitted events to the client over `tx`.
/// Cancelled via `cancel` when the client disconnects (dropping the
/// receiving stream cancels the token through [`CancelOnDrop`]).
async fn run_streaming_dispatch(
    state: Arc<AppState>,
    account: Account,
    resp: reqwest::Response,
    input_tokens_estimate: u64,
    message_id: String,
    model: String,
    tx: mpsc::Sender<ClaudeSseEvent>,
    cancel: CancellationToken,
) {
    let mut decoder = FrameDecoder::new();
    let mut converter = Converter::new(message_id, model, input_tokens_estimate);
    let mut body = resp.bytes_stream();
    let mut saw_exception = false;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            chunk = body.next() => chunk,
        };
        let Some(chunk) = next else { break };

        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                warn!(account_uuid = %account.uuid, error = %e, "upstream body read error, aborting stream");
                break;
            }
        };

        let frames = match decoder.feed(&bytes) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(account_uuid = %account.uuid, error = %e, "event-stream decode error, aborting stream");
                break;
            }
        };

        for frame in frames {
            if frame.is_exception() {
                saw_exception = true;
                continue;
            }
            if frame.message_type() != Some("event") {
                continue;
            }
            match UpstreamChunk::parse(&frame.payload) {
                Ok(chunk) => {
                    for event in converter.handle_chunk(&chunk) {
                        if tx.send(event).await.is_err() {
                            cancel.cancel();
                        }
                    }
                }
                Err(e) => warn!(error = %e, "failed to parse upstream chunk"),
            }
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    let content_delivered = converter.content_delivered();
    let events = if saw_exception && !content_delivered {
        vec![ClaudeSseEvent::Error {
            error: ErrorPayload {
                kind: "api_error".to_string(),
                message: "upstream terminated before producing any content".to_string(),
            },
        }]
    } else {
        converter.finish()
    };

    for event in events {
        let _ = tx.send(event).await;
    }

    if saw_exception && !content_delivered {
        warn!(account_uuid = %account.uuid, "marking account unhealthy after content-less exception");
        let _ = state.store.mark_unhealthy(&account.uuid).await;
    }
}
