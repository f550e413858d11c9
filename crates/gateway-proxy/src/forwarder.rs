use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use body_sanitizer::{BodySanitizer, SanitizeMode, ScannerError};
use credential_resolver::ActiveCredential;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use settings_store::SettingsStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::route::{InjectedSecret, RouteRule, RouteTable, SessionLogin, SettingsSpec};

const COMPONENT: &str = "gateway-proxy";

/// Request headers never forwarded upstream. Client credentials are dropped
/// so the only credential an upstream sees is the one the gateway injects.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "proxy-authorization",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
    "content-length",
];

/// Upstream response headers relayed to the client. Everything else stays
/// behind the gateway.
const RELAYED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "cache-control",
    "etag",
    "last-modified",
    "content-disposition",
    "content-language",
    "expires",
];

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An inbound call after routing, ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub request_id: Uuid,
    pub method: Method,
    /// Remainder of the path below the matched route.
    pub sub_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub origin: Option<String>,
}

/// Upstream answer, already filtered and sanitized.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub default_timeout: Duration,
    /// Treatment of upstream error bodies.
    pub error_body_mode: SanitizeMode,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            error_body_mode: SanitizeMode::Redact,
        }
    }
}

/// Sends routed requests upstream with server-held secrets attached.
///
/// Makes exactly one upstream attempt per call. The only mutable state is
/// the per-route panel session cache.
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
    error_sanitizer: BodySanitizer,
    success_sanitizer: BodySanitizer,
    store: Option<Arc<dyn SettingsStore>>,
    sessions: Mutex<HashMap<String, String>>,
    audit: AuditSink,
}

impl Forwarder {
    /// `client` should not follow redirects; a redirect's target is upstream
    /// detail and is relayed as a bare status.
    pub fn new(
        client: reqwest::Client,
        routes: &RouteTable,
        config: ForwarderConfig,
        store: Option<Arc<dyn SettingsStore>>,
        audit: AuditSink,
    ) -> Result<Self, ScannerError> {
        let secrets = routes.literal_secrets();
        Ok(Self {
            client,
            error_sanitizer: BodySanitizer::new(config.error_body_mode, secrets.iter().cloned())?,
            success_sanitizer: BodySanitizer::literals_only(secrets),
            config,
            store,
            sessions: Mutex::new(HashMap::new()),
            audit,
        })
    }

    pub fn has_settings_store(&self) -> bool {
        self.store.is_some()
    }

    /// Forward `req` to the upstream of `rule`.
    ///
    /// `credential` gates dynamic settings lookups; without one the caller's
    /// inline settings are used as sent.
    pub async fn forward(
        &self,
        req: ForwardedRequest,
        rule: &RouteRule,
        credential: Option<&ActiveCredential>,
    ) -> Result<ForwardedResponse, GatewayError> {
        let source = AuditSource::new(COMPONENT)
            .with_origin(req.origin.as_deref())
            .with_request_id(req.request_id);

        let url = rule.target_url(&req.sub_path, req.query.as_deref())?;
        let mut headers = outbound_headers(&req.headers, rule);
        if let Ok(value) = HeaderValue::from_str(&req.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        let body = match &rule.settings {
            Some(descriptor) => {
                let merged = self
                    .merge_settings(descriptor, rule, &req.body, credential, &source)
                    .await?;
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                merged
            }
            None => req.body,
        };

        let timeout = rule.timeout.unwrap_or(self.config.default_timeout);
        let started = Instant::now();

        if let Some(secret) = &rule.secret {
            // Panel login is an upstream call too.
            match self.inject_secret(secret, rule, &mut headers, timeout).await {
                Ok(()) => {}
                Err(
                    err @ (GatewayError::UpstreamUnreachable(_) | GatewayError::UpstreamTimeout),
                ) => return Err(self.upstream_failed(rule, &source, err, started).await),
                Err(err) => return Err(err),
            }
        }

        let request = self
            .client
            .request(req.method.clone(), url)
            .headers(headers)
            .body(body);

        // Status, headers and the full body all sit inside the bound.
        let outcome = tokio::time::timeout(timeout, async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        })
        .await;

        let (status, upstream_headers, upstream_body) = match outcome {
            Ok(Ok(parts)) => parts,
            Ok(Err(err)) => {
                let error = if err.is_timeout() {
                    GatewayError::UpstreamTimeout
                } else {
                    GatewayError::UpstreamUnreachable(err.without_url().to_string())
                };
                return Err(self.upstream_failed(rule, &source, error, started).await);
            }
            Err(_elapsed) => {
                return Err(self
                    .upstream_failed(rule, &source, GatewayError::UpstreamTimeout, started)
                    .await);
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut relayed_headers = relayed_headers(&upstream_headers);

        if status.is_client_error() || status.is_server_error() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                && matches!(rule.secret, Some(InjectedSecret::SessionLogin(_)))
            {
                self.sessions.lock().await.remove(&rule.name);
                debug!(route = %rule.name, "panel session invalidated");
            }

            let result = std::str::from_utf8(&upstream_body)
                .ok()
                .map(|text| self.error_sanitizer.sanitize(text));
            let redactions = result.as_ref().map_or(0, |r| r.findings.len());
            let body = match result.and_then(|r| r.modified_text) {
                Some(text) => {
                    if self.error_sanitizer.mode() == SanitizeMode::Replace {
                        relayed_headers.insert(
                            header::CONTENT_TYPE,
                            HeaderValue::from_static("application/json"),
                        );
                    }
                    Bytes::from(text)
                }
                None => upstream_body,
            };

            warn!(
                request_id = %req.request_id,
                route = %rule.name,
                upstream = rule.upstream_host(),
                status = status.as_u16(),
                redactions,
                elapsed_ms,
                "upstream rejected request"
            );
            self.audit
                .log(AuditEntry::new(
                    AuditEventType::UpstreamRejected,
                    source,
                    serde_json::json!({
                        "route": rule.name,
                        "status": status.as_u16(),
                        "redactions": redactions,
                        "elapsed_ms": elapsed_ms,
                    }),
                ))
                .await;

            return Ok(ForwardedResponse {
                status,
                headers: relayed_headers,
                body,
            });
        }

        let body = self
            .success_sanitizer
            .sanitize_bytes(&upstream_body)
            .map(Bytes::from)
            .unwrap_or(upstream_body);

        info!(
            request_id = %req.request_id,
            route = %rule.name,
            method = %req.method,
            upstream = rule.upstream_host(),
            status = status.as_u16(),
            elapsed_ms,
            "request forwarded"
        );
        self.audit
            .log(AuditEntry::new(
                AuditEventType::RequestForwarded,
                source,
                serde_json::json!({
                    "route": rule.name,
                    "method": req.method.as_str(),
                    "status": status.as_u16(),
                    "elapsed_ms": elapsed_ms,
                }),
            ))
            .await;

        Ok(ForwardedResponse {
            status,
            headers: relayed_headers,
            body,
        })
    }

    async fn upstream_failed(
        &self,
        rule: &RouteRule,
        source: &AuditSource,
        error: GatewayError,
        started: Instant,
    ) -> GatewayError {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        warn!(
            route = %rule.name,
            upstream = rule.upstream_host(),
            elapsed_ms,
            %error,
            "upstream call failed"
        );
        self.audit
            .log(AuditEntry::new(
                AuditEventType::UpstreamFailed,
                source.clone(),
                serde_json::json!({
                    "route": rule.name,
                    "status": error.status().as_u16(),
                    "elapsed_ms": elapsed_ms,
                }),
            ))
            .await;
        error
    }

    async fn inject_secret(
        &self,
        secret: &InjectedSecret,
        rule: &RouteRule,
        headers: &mut HeaderMap,
        timeout: Duration,
    ) -> Result<(), GatewayError> {
        let (name, value) = match secret {
            InjectedSecret::Header { name, value } => (name.clone(), value.expose().to_string()),
            InjectedSecret::Bearer(token) => {
                (header::AUTHORIZATION, format!("Bearer {}", token.expose()))
            }
            InjectedSecret::Cookie(cookie) => (header::COOKIE, cookie.expose().to_string()),
            InjectedSecret::SessionLogin(login) => (
                header::COOKIE,
                self.session_cookie(rule, login, timeout).await?,
            ),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| GatewayError::Internal(format!("route '{}': secret is not a valid header value", rule.name)))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(())
    }

    /// Cached panel session for `rule`, logging in when there is none.
    ///
    /// The cache lock is held across the login so concurrent requests share
    /// one login.
    async fn session_cookie(
        &self,
        rule: &RouteRule,
        login: &SessionLogin,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(cookie) = sessions.get(&rule.name) {
            return Ok(cookie.clone());
        }

        let mut url = rule.base_url.clone();
        url.set_path(&login.login_path);
        url.set_query(None);

        info!(route = %rule.name, upstream = rule.upstream_host(), "logging in to panel");
        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(url)
                .form(&[
                    ("username", login.username.as_str()),
                    ("password", login.password.expose()),
                ])
                .send(),
        )
        .await
        .map_err(|_| GatewayError::UpstreamTimeout)?
        .map_err(|err| {
            if err.is_timeout() {
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::UpstreamUnreachable(err.without_url().to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamUnreachable(format!(
                "panel login answered {}",
                response.status().as_u16()
            )));
        }

        let cookie = session_cookie_from(response.headers());
        if cookie.is_empty() {
            return Err(GatewayError::UpstreamUnreachable(
                "panel login set no session cookie".into(),
            ));
        }
        sessions.insert(rule.name.clone(), cookie.clone());
        Ok(cookie)
    }

    /// Put the stored settings document into the body under
    /// `descriptor.body_field`, or keep the caller's inline value when the store
    /// cannot be used.
    async fn merge_settings(
        &self,
        descriptor: &SettingsSpec,
        rule: &RouteRule,
        body: &Bytes,
        credential: Option<&ActiveCredential>,
        source: &AuditSource,
    ) -> Result<Bytes, GatewayError> {
        let mut object = if body.is_empty() {
            Map::new()
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(object)) => object,
                _ => {
                    return Err(GatewayError::MalformedRequest(
                        "settings route requires a JSON object body",
                    ))
                }
            }
        };

        let degraded = match (credential, &self.store) {
            (None, _) => Some("credential_unavailable"),
            (Some(_), None) => Some("settings_store_disabled"),
            (Some(_), Some(store)) => {
                match store.get_document(&descriptor.collection, &descriptor.document).await {
                    Ok(Some(document)) => {
                        object.insert(descriptor.body_field.clone(), document);
                        None
                    }
                    Ok(None) => Some("settings_document_missing"),
                    Err(err) => {
                        warn!(route = %rule.name, error = %err, "settings lookup failed");
                        Some("settings_store_error")
                    }
                }
            }
        };

        if let Some(reason) = degraded {
            let inline_present = object.contains_key(&descriptor.body_field);
            warn!(
                route = %rule.name,
                reason,
                inline_present,
                "using caller-supplied settings"
            );
            self.audit
                .log(AuditEntry::new(
                    AuditEventType::SettingsDegraded,
                    source.clone(),
                    serde_json::json!({
                        "route": rule.name,
                        "reason": reason,
                        "inline_present": inline_present,
                    }),
                ))
                .await;
        }

        serde_json::to_vec(&Value::Object(object))
            .map(Bytes::from)
            .map_err(|err| GatewayError::Internal(err.to_string()))
    }
}

/// Copy the client's headers minus credentials, hop-by-hop headers and the
/// route's secret header.
fn outbound_headers(inbound: &HeaderMap, rule: &RouteRule) -> HeaderMap {
    let secret_header = rule.secret.as_ref().and_then(InjectedSecret::header_name);
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) || Some(name) == secret_header {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &name in RELAYED_RESPONSE_HEADERS {
        for value in upstream.get_all(name) {
            headers.append(HeaderName::from_static(name), value.clone());
        }
    }
    headers
}

/// `name=value` pairs of every `Set-Cookie`, joined for a `Cookie` header.
fn session_cookie_from(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{MatchKind, SecretValue};
    use url::Url;

    fn rule_with_secret(secret: Option<InjectedSecret>) -> RouteRule {
        RouteRule {
            name: "hook".into(),
            methods: vec![],
            path: "/hook".into(),
            match_kind: MatchKind::Exact,
            base_url: Url::parse("https://n8n.example/webhook/x").unwrap(),
            allow_no_origin: false,
            secret,
            settings: None,
            timeout: None,
        }
    }

    #[test]
    fn client_credentials_and_secret_header_are_stripped() {
        let rule = rule_with_secret(Some(InjectedSecret::Header {
            name: HeaderName::from_static("x-n8n-api-key"),
            value: SecretValue::new("server-key-123"),
        }));
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("Bearer client"));
        inbound.insert("cookie", HeaderValue::from_static("sid=abc"));
        inbound.insert("x-n8n-api-key", HeaderValue::from_static("client-forged"));
        inbound.insert("host", HeaderValue::from_static("gw.example"));
        inbound.insert("content-type", HeaderValue::from_static("application/json"));
        inbound.insert("accept-language", HeaderValue::from_static("ru"));

        let out = outbound_headers(&inbound, &rule);
        assert!(out.get("authorization").is_none());
        assert!(out.get("cookie").is_none());
        assert!(out.get("x-n8n-api-key").is_none());
        assert!(out.get("host").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get("accept-language").unwrap(), "ru");
    }

    #[test]
    fn only_allow_listed_response_headers_are_relayed() {
        let mut upstream = HeaderMap::new();
        upstream.insert("content-type", HeaderValue::from_static("application/json"));
        upstream.insert("etag", HeaderValue::from_static("\"v1\""));
        upstream.insert("server", HeaderValue::from_static("nginx/1.25 (internal-03)"));
        upstream.insert("set-cookie", HeaderValue::from_static("panel=secret"));
        upstream.insert("x-powered-by", HeaderValue::from_static("Express"));
        upstream.insert("location", HeaderValue::from_static("http://10.0.0.4/"));

        let out = relayed_headers(&upstream);
        assert_eq!(out.len(), 2);
        assert!(out.get("content-type").is_some());
        assert!(out.get("etag").is_some());
    }

    #[test]
    fn session_cookie_keeps_only_name_value_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("session=abc123; Path=/; HttpOnly"),
        );
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("lang=en; Max-Age=3600"),
        );
        assert_eq!(session_cookie_from(&headers), "session=abc123; lang=en");
        assert_eq!(session_cookie_from(&HeaderMap::new()), "");
    }
}
