//! Request handlers: the thin glue between the public dialects and the
//! core components.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use relay_core::convert_google_to_anthropic;
use relay_core::fetch::{FetchRequest, FetchResponse};
use relay_core::fingerprint;
use relay_core::signature::content_key;
use relay_types::error::UpstreamError;
use relay_types::models::Account;
use relay_types::protocol::claude::ContentBlock;

use crate::state::AppState;

/// 503 body for pool exhaustion.
fn no_account_response() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "no-account-available"})))
        .into_response()
}

fn passthrough(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, body).into_response()
}

fn bad_gateway(message: String) -> Response {
    (StatusCode::BAD_GATEWAY, Json(json!({"error": message}))).into_response()
}

/// POST /v1/messages — Anthropic dialect.
pub async fn handle_messages(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(model) = body.get("model").and_then(Value::as_str).map(str::to_string) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing model"}))).into_response();
    };

    state.inner.usage.track(&model);
    let request = anthropic_to_google_request(&body);

    match relay_request(&state, &model, request).await {
        Ok(raw) => {
            let message = convert_google_to_anthropic(&raw, &model);
            cache_thinking_signatures(&state, &message.content);
            Json(message).into_response()
        },
        Err(response) => response,
    }
}

/// POST /v1beta/models/{model}:generateContent — Gemini dialect.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(model_action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let model = model_action.split(':').next().unwrap_or(&model_action).to_string();

    state.inner.usage.track(&model);

    match relay_request(&state, &model, body).await {
        Ok(raw) => {
            // Gemini clients expect the bare response shape.
            let unwrapped = raw.get("response").cloned().unwrap_or(raw);
            Json(unwrapped).into_response()
        },
        Err(response) => response,
    }
}

/// GET /api/status — safe pool view plus component counters.
pub async fn handle_status(State(state): State<AppState>) -> Response {
    let inner = &state.inner;
    Json(json!({
        "pool": inner.pool.stats().await,
        "accounts": inner.pool.status_views().await,
        "shaper": inner.shaper.status(),
        "usage": inner.usage.current_bucket(),
        "telemetryActive": inner.telemetry.activity().last().is_some(),
        "config": inner.config,
    }))
    .into_response()
}

/// Forward one chat request through the full pipeline: account selection,
/// token, fingerprint headers, shaper, throttled fetch, signal recording.
async fn relay_request(state: &AppState, model: &str, request: Value) -> Result<Value, Response> {
    let inner = &state.inner;

    let account = match inner.pool.select_account(model).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!("Account selection failed: {e}");
            return Err(no_account_response());
        },
    };

    let token = match inner.pool.get_token_for_account(&account.email).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Token for {} unavailable: {e}", account.email);
            return Err(bad_gateway(format!("token refresh failed: {e}")));
        },
    };

    let project = ensure_project_id(state, &account, &token).await;

    let mut headers = fingerprint::build_headers(account.fingerprint.as_ref());
    headers.insert("Authorization".to_string(), format!("Bearer {token}"));

    let mut body = json!({
        "model": model,
        "request": request,
    });
    if let Some(project) = project {
        body["project"] = Value::String(project);
    }

    let response =
        match execute_with_fallback(state, "generateContent", headers, body).await {
            Ok(response) => response,
            Err(message) => {
                inner.pool.record_server_error(&account.email).await;
                return Err(bad_gateway(message));
            },
        };

    match UpstreamError::from_status(response.status, response.body.clone(), Some(model)) {
        None => {
            inner.pool.record_success(&account.email).await;
            response.json().map_err(|e| bad_gateway(e.to_string()))
        },
        Some(error) => {
            match &error {
                UpstreamError::RateLimited { .. } => {
                    inner.pool.record_rate_limited(&account.email, model).await;
                },
                UpstreamError::Unauthorized => {
                    inner.pool.record_unauthorized(&account.email).await;
                },
                UpstreamError::RetriableServer { .. } => {
                    inner.pool.record_server_error(&account.email).await;
                },
                _ => {},
            }
            tracing::warn!("Upstream rejected request for {}: {error}", account.email);
            Err(passthrough(response.status, response.body))
        },
    }
}

/// Run one upstream call through the shaper, trying each base URL in
/// order on transport-level failure.
async fn execute_with_fallback(
    state: &AppState,
    method: &str,
    headers: std::collections::HashMap<String, String>,
    body: Value,
) -> Result<FetchResponse, String> {
    let inner = &state.inner;
    let mut last_error = String::new();

    for (index, base_url) in inner.upstream_urls.iter().enumerate() {
        let url = format!("{base_url}/v1internal:{method}");
        let request = FetchRequest::post(url, body.clone()).with_headers(headers.clone());
        let transport = Arc::clone(&inner.transport);

        let result = inner
            .shaper
            .enqueue(move || async move { transport.execute(request).await })
            .await
            .map_err(|e| e.to_string())?;

        match result {
            Ok(response) => {
                if index > 0 {
                    tracing::info!("Upstream fallback succeeded via {base_url}");
                }
                return Ok(response);
            },
            Err(e) => {
                tracing::warn!("Upstream {base_url} failed: {e}");
                last_error = e.to_string();
            },
        }
    }

    Err(last_error)
}

/// Resolve the account's upstream tenant, discovering and persisting it
/// on first use. Discovery failures are non-fatal.
async fn ensure_project_id(state: &AppState, account: &Account, token: &str) -> Option<String> {
    if let Some(project) = account.effective_project_id() {
        return Some(project.to_string());
    }

    let inner = &state.inner;
    let mut headers = fingerprint::build_headers(account.fingerprint.as_ref());
    headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    let body = json!({"metadata": {"pluginType": "CLOUD_CODE"}});

    let response = execute_with_fallback(state, "loadCodeAssist", headers, body).await.ok()?;
    if !response.is_success() {
        tracing::debug!("loadCodeAssist returned {} for {}", response.status, account.email);
        return None;
    }

    let project = response
        .json()
        .ok()?
        .get("cloudaicompanionProject")
        .and_then(Value::as_str)
        .map(str::to_string)?;

    tracing::info!("Discovered project {} for {}", project, account.email);
    if let Err(e) = inner.pool.set_project_id(&account.email, &project).await {
        tracing::warn!("Failed to persist project id for {}: {e}", account.email);
    }
    Some(project)
}

/// Stash thinking signatures so follow-up turns can replay them.
fn cache_thinking_signatures(state: &AppState, content: &[ContentBlock]) {
    for block in content {
        if let ContentBlock::Thinking { thinking, signature: Some(signature) } = block {
            if !thinking.is_empty() {
                state.inner.signatures.insert(content_key(thinking), signature.clone());
            }
        }
    }
}

/// Minimal Anthropic → Google request mapping: roles, text content,
/// system instruction, and generation knobs. Tool declarations and
/// multimodal inputs ride through untouched on the Gemini dialect.
fn anthropic_to_google_request(body: &Value) -> Value {
    let mut contents = Vec::new();

    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            let role = match message.get("role").and_then(Value::as_str) {
                Some("assistant") => "model",
                _ => "user",
            };

            let mut parts = Vec::new();
            match message.get("content") {
                Some(Value::String(text)) => parts.push(json!({"text": text})),
                Some(Value::Array(blocks)) => {
                    for block in blocks {
                        if block.get("type").and_then(Value::as_str) == Some("text") {
                            if let Some(text) = block.get("text") {
                                parts.push(json!({"text": text}));
                            }
                        }
                    }
                },
                _ => {},
            }

            contents.push(json!({"role": role, "parts": parts}));
        }
    }

    let mut request = json!({"contents": contents});

    if let Some(system) = body.get("system") {
        let text = match system {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        request["systemInstruction"] = json!({"parts": [{"text": text}]});
    }

    let mut generation_config = serde_json::Map::new();
    if let Some(max_tokens) = body.get("max_tokens") {
        generation_config.insert("maxOutputTokens".to_string(), max_tokens.clone());
    }
    if let Some(temperature) = body.get("temperature") {
        generation_config.insert("temperature".to_string(), temperature.clone());
    }
    if let Some(top_p) = body.get("top_p") {
        generation_config.insert("topP".to_string(), top_p.clone());
    }
    if !generation_config.is_empty() {
        request["generationConfig"] = Value::Object(generation_config);
    }

    request
}
