//! HTTP directory API.
//!
//! - `GET /status` liveness
//! - `GET /users` directory snapshot with base64 public keys
//! - `POST /v1/prekey/{username}` store an opaque JSON prekey bundle
//! - `GET /v1/prekey/{username}` fetch it back
//!
//! Request bodies are capped at [`BODY_LIMIT`] bytes. Each client IP gets a
//! [`RateLimit`] quota, answered with 429 once spent. Every response carries
//! the [`security_headers`]. CORS is restricted to a single origin when one
//! is configured.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Instant,
};

use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use sealroom_proto::{Identity, UserRecord};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::{
    error::ServerError,
    hub::SharedHub,
    ratelimit::{RateLimit, RateLimiter},
};

/// Maximum request body size.
pub const BODY_LIMIT: usize = 50 * 1024;

/// One directory entry as served over HTTP.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    username: String,
    /// Base64; empty when no key has been registered
    public_key: String,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            username: record.identity.as_str().to_string(),
            public_key: record
                .public_key
                .map(|key| STANDARD.encode(key.as_bytes()))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UsersResponse {
    users: Vec<UserView>,
}

/// Hardening headers set on every response unless a handler set them.
pub fn security_headers() -> [(HeaderName, HeaderValue); 10] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains"),
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'self'"),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ),
        (HeaderName::from_static("origin-agent-cluster"), HeaderValue::from_static("?1")),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
    ]
}

/// Build the API router.
///
/// Per-IP limiting needs the server to be run with
/// `into_make_service_with_connect_info::<SocketAddr>()`; without it every
/// request shares one quota.
///
/// # Errors
///
/// Returns [`ServerError::Config`] if `allowed_origin` is not a valid header
/// value.
pub fn router(
    hub: SharedHub,
    allowed_origin: Option<&str>,
    rate_limit: RateLimit,
) -> Result<Router, ServerError> {
    let cors = match allowed_origin {
        Some(origin) => {
            let origin = HeaderValue::from_str(origin)
                .map_err(|e| ServerError::Config(format!("invalid allowed origin {origin}: {e}")))?;
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        },
        None => CorsLayer::permissive(),
    };

    let mut router = Router::new()
        .route("/status", get(status))
        .route("/users", get(users))
        .route("/v1/prekey/{username}", get(get_prekey).post(put_prekey))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn_with_state(RateLimiter::new(rate_limit), limit_requests));

    for (name, value) in security_headers() {
        router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }

    Ok(router.layer(cors).layer(TraceLayer::new_for_http()).with_state(hub))
}

async fn limit_requests(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());

    if !limiter.check(ip, Instant::now()) {
        tracing::debug!(%ip, "http rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "too many requests" })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn users(State(hub): State<SharedHub>) -> Json<UsersResponse> {
    let hub = hub.lock().await;
    let users = hub.relay().directory().list_all().into_iter().map(UserView::from).collect();

    Json(UsersResponse { users })
}

async fn put_prekey(
    State(hub): State<SharedHub>,
    Path(username): Path<String>,
    Json(bundle): Json<serde_json::Value>,
) -> Response {
    let bytes = match serde_json::to_vec(&bundle) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to re-encode prekey bundle");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };

    tracing::debug!(username = %username, size = bytes.len(), "prekey bundle stored");
    hub.lock().await.relay_mut().prekeys_mut().put(Identity::new(username), bytes);

    Json(serde_json::json!({ "ok": true })).into_response()
}

async fn get_prekey(State(hub): State<SharedHub>, Path(username): Path<String>) -> Response {
    let hub = hub.lock().await;
    match hub.relay().prekeys().get(&username) {
        Some(bundle) => {
            ([(header::CONTENT_TYPE, "application/json")], bundle.to_vec()).into_response()
        },
        None => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))
                .into_response()
        },
    }
}
