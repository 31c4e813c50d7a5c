//! HTTP middleware mapping throttle decisions onto axum responses.
//!
//! Admitted requests are forwarded with quota headers attached; denied
//! requests get `429 Too Many Requests` with a `Retry-After` derived from the
//! window's reset time.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::throttle::{Decision, ThrottleStore};

/// Middleware state: the shared store plus the route name used for policy
/// lookup and key namespacing.
///
/// Attach with [`axum::middleware::from_fn_with_state`]:
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{middleware, routing::post, Router};
/// use floodgate::http::{throttle, RouteThrottle};
/// use floodgate::throttle::ThrottleStore;
///
/// let store = Arc::new(ThrottleStore::new());
/// let app: Router = Router::new()
///     .route("/api/upload", post(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(
///         RouteThrottle::new(store, "upload"),
///         throttle,
///     ));
/// ```
#[derive(Clone)]
pub struct RouteThrottle {
    store: Arc<ThrottleStore>,
    route: String,
}

impl RouteThrottle {
    /// Create middleware state for one route.
    pub fn new(store: Arc<ThrottleStore>, route: impl Into<String>) -> Self {
        Self {
            store,
            route: route.into(),
        }
    }
}

/// Throttle middleware entry point.
pub async fn throttle(
    State(state): State<RouteThrottle>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req);

    let decision = match state.store.check_route(&state.route, &key) {
        Ok(decision) => decision,
        Err(e) => {
            // A misconfigured policy should not take the route down.
            warn!(error = %e, route = %state.route, "Throttle check failed, admitting request");
            return next.run(req).await;
        }
    };

    if !decision.allowed {
        return deny(&state, &decision);
    }

    let mut response = next.run(req).await;
    set_quota_headers(response.headers_mut(), &decision);
    response
}

/// Derive the throttle key for a request.
///
/// Prefers the first `X-Forwarded-For` hop, then the peer address from
/// [`ConnectInfo`], then a shared `"unknown"` bucket.
fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return format!("ip:{}", first);
                }
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

fn deny(state: &RouteThrottle, decision: &Decision) -> Response {
    let now = state.store.now_millis();
    let retry_after_secs = decision
        .reset_at
        .saturating_sub(now)
        .div_ceil(1_000)
        .max(1);

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Too many requests" })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    set_quota_headers(headers, decision);
    response
}

fn set_quota_headers(headers: &mut axum::http::HeaderMap, decision: &Decision) {
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at));
}
