#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use audit_log::AuditSink;
use axum::body::{Body, Bytes};
use axum::Router;
use credential_resolver::{ActiveCredential, CredentialSource};
use gateway_proxy::{
    Forwarder, ForwarderConfig, Gateway, GatewayState, MatchKind, RouteRule, RouteTable,
    DEFAULT_MAX_BODY_BYTES,
};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use policy_engine::{Environment, OriginPolicy, OriginPolicyEngine};
use settings_store::SettingsStore;
use tower::ServiceExt;
use url::Url;

pub const SHOP_ORIGIN: &str = "https://shop.example.com";
pub const EVIL_ORIGIN: &str = "https://evil.example.net";

pub fn production_policy() -> OriginPolicy {
    OriginPolicy {
        environment: Environment::Production,
        allowed_origins: vec![SHOP_ORIGIN.to_string()],
        frontend_url: Some("https://app.example.com/".to_string()),
        ..OriginPolicy::default()
    }
}

pub fn development_policy() -> OriginPolicy {
    OriginPolicy::default()
}

pub fn route(name: &str, path: &str, base_url: &str) -> RouteRule {
    RouteRule {
        name: name.to_string(),
        methods: vec![Method::POST],
        path: path.to_string(),
        match_kind: MatchKind::Exact,
        base_url: Url::parse(base_url).unwrap(),
        allow_no_origin: false,
        secret: None,
        settings: None,
        timeout: None,
    }
}

pub fn ambient_credential() -> Arc<ActiveCredential> {
    Arc::new(ActiveCredential::new(CredentialSource::AmbientDefault, "vpn-shop").unwrap())
}

pub struct GatewayBuilder {
    policy: OriginPolicy,
    routes: Vec<RouteRule>,
    credential: Option<Arc<ActiveCredential>>,
    store: Option<Arc<dyn SettingsStore>>,
    audit: AuditSink,
    default_timeout: Duration,
}

impl GatewayBuilder {
    pub fn new(policy: OriginPolicy) -> Self {
        Self {
            policy,
            routes: Vec::new(),
            credential: None,
            store: None,
            audit: AuditSink::disabled(),
            default_timeout: Duration::from_secs(5),
        }
    }

    pub fn route(mut self, rule: RouteRule) -> Self {
        self.routes.push(rule);
        self
    }

    pub fn credential(mut self, credential: Arc<ActiveCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit(mut self, audit: AuditSink) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> Router {
        let routes = RouteTable::new(self.routes).unwrap();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let forwarder = Forwarder::new(
            client,
            &routes,
            ForwarderConfig {
                default_timeout: self.default_timeout,
                ..ForwarderConfig::default()
            },
            self.store,
            self.audit.clone(),
        )
        .unwrap();

        Gateway::new(GatewayState {
            policy: OriginPolicyEngine::new(self.policy).unwrap(),
            routes,
            forwarder,
            credential: self.credential,
            audit: self.audit,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
        .router()
    }
}

/// A browser-like request that arrived over TLS at the load balancer.
pub fn browser_request(method: Method, uri: &str, origin: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "gw.example.com")
        .header("x-forwarded-proto", "https")
        .header("content-type", "application/json");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
