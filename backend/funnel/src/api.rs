//! Axum handlers carrying the shell ↔ core contract.
//!
//! Every handler resolves the caller's form session first; a newly issued
//! session id is returned in the `x-funnel-session` header and as the
//! `funnel_session` cookie.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::events::{ClientContext, UserContext};
use crate::fields::FieldKey;
use crate::orchestrator::{FormSnapshot, SubmitOutcome};
use crate::pixel::PixelCall;
use crate::sessions::{Resolved, SessionRegistry, SESSION_COOKIE, SESSION_HEADER};
use crate::tracking::TrackOutcome;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionRegistry>,
    pub site_url: String,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FieldChange {
    pub value: String,
}

#[derive(Serialize)]
pub struct EmailResponse {
    pub outcome: SubmitOutcome,
    pub snapshot: FormSnapshot,
}

#[derive(Serialize)]
pub struct HandoffResponse {
    /// Deep link to open in a new tab; absent when the form is incomplete.
    pub url: Option<String>,
    pub tracking: Option<TrackOutcome>,
    /// Pixel calls for the shell to run with `fbq('track', …)`.
    pub pixel_calls: Vec<PixelCall>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Attach the session id to `response` when it was just issued.
fn with_session(resolved: &Resolved, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if !resolved.issued {
        return response;
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&resolved.id) {
        headers.insert(SESSION_HEADER, value);
    }
    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
        resolved.id
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    response
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /lead`
pub async fn get_lead(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    let snapshot = resolved.session.orchestrator.snapshot();
    with_session(&resolved, Json(snapshot))
}

/// `PUT /lead/fields/:key`
///
/// Formats and stores one field; returns the updated form.
pub async fn put_field(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(change): Json<FieldChange>,
) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    let response = match key.parse::<FieldKey>() {
        Ok(key) => {
            let snapshot = resolved
                .session
                .orchestrator
                .on_field_change(key, &change.value);
            (StatusCode::OK, Json(serde_json::json!(snapshot))).into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!(ErrorResponse { error: e })),
        )
            .into_response(),
    };
    with_session(&resolved, response)
}

/// `POST /lead/email`
pub async fn submit_email(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    let client = client_context(&headers, &state.site_url);
    let orchestrator = Arc::clone(&resolved.session.orchestrator);

    // Run detached so a dropped connection cannot abandon the submission.
    let outcome = match tokio::spawn(async move { orchestrator.submit_email(&client).await }).await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Email submission task failed: {e}");
            let response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!(ErrorResponse {
                    error: "submission failed".to_string()
                })),
            );
            return with_session(&resolved, response);
        }
    };

    let response = (
        StatusCode::OK,
        Json(serde_json::json!(EmailResponse {
            outcome,
            snapshot: resolved.session.orchestrator.snapshot(),
        })),
    );
    with_session(&resolved, response)
}

/// `POST /lead/whatsapp`
///
/// Tracks the checkout conversion, then returns the deep link together with
/// any pixel calls queued for the shell.
pub async fn submit_whatsapp(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    let client = client_context(&headers, &state.site_url);
    let handoff = resolved.session.orchestrator.submit_messaging(&client).await;

    let (url, tracking) = match handoff {
        Some(h) => (Some(h.url), Some(h.tracking)),
        None => (None, None),
    };

    let response = Json(HandoffResponse {
        url,
        tracking,
        pixel_calls: resolved.session.pixel.drain(),
    });
    with_session(&resolved, response)
}

/// `POST /pixel/ready`
///
/// The shell reports that `fbq` has loaded.
pub async fn pixel_ready(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    resolved.session.pixel.mark_loaded();
    with_session(&resolved, StatusCode::NO_CONTENT)
}

/// `POST /pixel/outbox`
///
/// Hands over pixel calls queued since the last handoff, e.g. the `Lead`
/// event tracked after an email submission.
pub async fn take_pixel_calls(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let resolved = state.sessions.resolve(&headers).await;
    let calls = resolved.session.pixel.drain();
    with_session(&resolved, Json(calls))
}

// ─────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────

/// Browser context of the request: user agent, Meta cookies, client IP and
/// the page the action came from.
pub fn client_context(headers: &HeaderMap, site_url: &str) -> ClientContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let cookies = header_str(header::COOKIE.as_str()).unwrap_or_default();

    ClientContext {
        user: UserContext {
            client_user_agent: header_str(header::USER_AGENT.as_str()),
            client_ip_address: header_str("x-forwarded-for")
                .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
                .filter(|ip| !ip.is_empty()),
            fbp: cookie_value(&cookies, "_fbp"),
            fbc: cookie_value(&cookies, "_fbc"),
        },
        source_url: header_str(header::REFERER.as_str()).or_else(|| Some(site_url.to_string())),
    }
}

/// Value of cookie `name` in a `Cookie` header, if present and non-empty.
/// When the name repeats, the first pair wins: browsers list the cookie with
/// the most specific path first.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
