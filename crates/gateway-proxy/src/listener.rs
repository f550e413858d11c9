use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource, PolicyDecisionRecord};
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use credential_resolver::ActiveCredential;
use http::header::{self, HeaderMap};
use http::{Method, StatusCode};
use http_body_util::LengthLimitError;
use policy_engine::{matcher, OriginDecision, OriginPolicyEngine, TransportDecision};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::forwarder::{ForwardedRequest, Forwarder};
use crate::origin::{apply_cors_headers, preflight_response};
use crate::phase::RequestPhase;
use crate::route::RouteTable;

const COMPONENT: &str = "gateway-proxy";

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything a request handler needs. Read-only once built.
pub struct GatewayState {
    pub policy: OriginPolicyEngine,
    pub routes: RouteTable,
    pub forwarder: Forwarder,
    /// `None` when no operator credential could be resolved.
    pub credential: Option<Arc<ActiveCredential>>,
    pub audit: AuditSink,
    pub max_body_bytes: usize,
}

/// The HTTP surface of the gateway.
///
/// Request order: transport check (plaintext redirect), health paths,
/// preflight, route lookup, origin policy, forward.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(state: GatewayState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new();
        let mut seen = HashSet::new();
        for path in &self.state.policy.policy().health_paths {
            if seen.insert(path.as_str()) {
                router = router.route(path, get(health));
            }
        }

        router
            .fallback(gateway_handler)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                transport_guard,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight
    /// requests.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, routes = self.state.routes.len(), "gateway listening");
        }
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Redirect plaintext requests before anything else looks at them.
async fn transport_guard(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let forwarded_proto = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok());
    let plaintext = matcher::is_plaintext(forwarded_proto, state.policy.trust_forwarded_proto());
    let path = request.uri().path();

    if state.policy.transport_decision(path, plaintext) == TransportDecision::Proceed {
        return next.run(request).await;
    }

    let Some(host) = request_host(&request) else {
        return GatewayError::MalformedRequest("missing or invalid host").into_response();
    };
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = matcher::https_location(host, path_and_query);
    let path = path.to_string();
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!(%path, "redirecting plaintext request to https");
    state
        .audit
        .log(AuditEntry::new(
            AuditEventType::TlsRedirected,
            AuditSource::new(COMPONENT).with_origin(origin.as_deref()),
            serde_json::json!({ "path": path }),
        ))
        .await;

    (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)]).into_response()
}

/// Host to redirect to. Anything that is not a plain hostname, IP literal
/// or port is refused so the redirect cannot be pointed elsewhere.
fn request_host(request: &Request) -> Option<&str> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))?;
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    valid.then_some(host)
}

/// Value of the `Origin` header. A header that is not valid text counts as
/// present but empty, which production denies.
fn origin_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .map(|v| v.to_str().map(str::to_string).unwrap_or_default())
}

async fn gateway_handler(
    State(state): State<Arc<GatewayState>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let request_id = Uuid::new_v4();
    let remote_addr = remote.map(|ConnectInfo(addr)| addr);
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let origin = origin_header(&parts.headers);
    let mut phase = RequestPhase::Received;

    if parts.method == Method::OPTIONS
        && parts
            .headers
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    {
        return preflight(&state, &path, origin.as_deref(), request_id, remote_addr).await;
    }

    phase.advance(RequestPhase::PolicyCheck);
    let matched = match state.routes.lookup(&parts.method, &path) {
        Ok(matched) => matched,
        Err(err) => {
            debug!(%request_id, %path, method = %parts.method, %err, "no route");
            return err.into_response();
        }
    };

    let decision = state
        .policy
        .decide(origin.as_deref(), matched.rule.allow_no_origin);
    if !decision.is_allowed() {
        phase.advance(RequestPhase::Denied);
        audit_rejection(
            &state,
            decision,
            &path,
            &parts.method,
            origin.as_deref(),
            request_id,
            remote_addr,
            phase,
        )
        .await;
        return GatewayError::PolicyDenied.into_response();
    }

    phase.advance(RequestPhase::Forwarding);
    let mut response = match to_bytes(body, state.max_body_bytes).await {
        Err(err) => body_error(&err).into_response(),
        Ok(body) => {
            let forwarded = ForwardedRequest {
                request_id,
                method: parts.method,
                sub_path: matched.sub_path,
                query: parts.uri.query().map(str::to_string),
                headers: parts.headers,
                body,
                origin: origin.clone(),
            };
            match state
                .forwarder
                .forward(forwarded, &matched.rule, state.credential.as_deref())
                .await
            {
                Ok(upstream) => {
                    phase.advance(RequestPhase::UpstreamOk);
                    upstream.into_response()
                }
                Err(err) => {
                    phase.advance(RequestPhase::UpstreamFailure);
                    err.into_response()
                }
            }
        }
    };

    if let Some(origin) = origin.as_deref().filter(|o| !o.is_empty()) {
        apply_cors_headers(response.headers_mut(), origin);
    }
    debug!(
        %request_id,
        route = %matched.rule.name,
        %phase,
        status = response.status().as_u16(),
        "request finished"
    );
    response
}

/// Only the size limit is a `413`; a body that breaks off or is badly
/// framed is the client's malformed request.
fn body_error(err: &axum::Error) -> GatewayError {
    let mut source: Option<&(dyn std::error::Error + 'static)> =
        Some(err as &(dyn std::error::Error + 'static));
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return GatewayError::PayloadTooLarge;
        }
        source = current.source();
    }
    debug!(error = %err, "failed to read request body");
    GatewayError::MalformedRequest("unreadable request body")
}

async fn preflight(
    state: &GatewayState,
    path: &str,
    origin: Option<&str>,
    request_id: Uuid,
    remote_addr: Option<SocketAddr>,
) -> Response {
    let rules: Vec<_> = state.routes.rules_for_path(path).collect();
    if rules.is_empty() {
        return GatewayError::RouteNotFound.into_response();
    }

    let decision = state.policy.decide(origin, false);
    if !decision.is_allowed() {
        audit_rejection(
            state,
            decision,
            path,
            &Method::OPTIONS,
            origin,
            request_id,
            remote_addr,
            RequestPhase::Denied,
        )
        .await;
        return GatewayError::PolicyDenied.into_response();
    }

    let Some(origin) = origin.filter(|o| !o.is_empty()) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let mut methods: Vec<Method> = Vec::new();
    if rules.iter().all(|r| !r.methods.is_empty()) {
        for method in rules.iter().flat_map(|r| r.methods.iter()) {
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }
    }
    preflight_response(origin, &methods)
}

#[allow(clippy::too_many_arguments)]
async fn audit_rejection(
    state: &GatewayState,
    decision: OriginDecision,
    path: &str,
    method: &Method,
    origin: Option<&str>,
    request_id: Uuid,
    remote_addr: Option<SocketAddr>,
    phase: RequestPhase,
) {
    state
        .audit
        .log(
            AuditEntry::new(
                AuditEventType::OriginRejected,
                AuditSource::new(COMPONENT)
                    .with_origin(origin)
                    .with_request_id(request_id)
                    .with_remote_addr(remote_addr),
                serde_json::json!({
                    "path": path,
                    "method": method.as_str(),
                    "phase": phase.as_str(),
                }),
            )
            .with_policy_decision(PolicyDecisionRecord {
                decision: "deny".to_string(),
                reason: decision.reason().to_string(),
            }),
        )
        .await;
}
