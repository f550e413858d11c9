use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, Method};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::error::GatewayError;

/// A server-held secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Credentials for a panel that issues a session cookie on login.
#[derive(Debug, Clone)]
pub struct SessionLogin {
    /// Path of the login endpoint, relative to the route's base URL origin.
    pub login_path: String,
    pub username: String,
    pub password: SecretValue,
}

/// How the server-held secret is attached to the upstream call.
#[derive(Debug, Clone)]
pub enum InjectedSecret {
    /// A named header carrying an API key.
    Header { name: HeaderName, value: SecretValue },
    /// `Authorization: Bearer <token>`.
    Bearer(SecretValue),
    /// A fixed `Cookie` header value.
    Cookie(SecretValue),
    /// Log in first and reuse the session cookie.
    SessionLogin(SessionLogin),
}

impl InjectedSecret {
    /// Custom header the secret travels in, which clients may not set.
    pub fn header_name(&self) -> Option<&HeaderName> {
        match self {
            InjectedSecret::Header { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Values that must never appear in a relayed body.
    pub fn literals(&self) -> Vec<String> {
        match self {
            InjectedSecret::Header { value, .. }
            | InjectedSecret::Bearer(value)
            | InjectedSecret::Cookie(value) => vec![value.expose().to_string()],
            InjectedSecret::SessionLogin(login) => vec![login.password.expose().to_string()],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InjectedSecret::Header { .. } => "header",
            InjectedSecret::Bearer(_) => "bearer",
            InjectedSecret::Cookie(_) => "cookie",
            InjectedSecret::SessionLogin(_) => "session_login",
        }
    }
}

/// Where a route's dynamic settings live and where they go in the body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SettingsSpec {
    pub collection: String,
    pub document: String,
    /// Top-level JSON field of the outbound body that receives the settings.
    pub body_field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    /// The rule path and anything below it. The remainder is appended to
    /// the base URL.
    Prefix,
}

/// Static mapping from an inbound path to an upstream target.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    /// Accepted methods; empty accepts any.
    pub methods: Vec<Method>,
    pub path: String,
    pub match_kind: MatchKind,
    pub base_url: Url,
    /// Accept requests without an `Origin` header in production.
    pub allow_no_origin: bool,
    pub secret: Option<InjectedSecret>,
    pub settings: Option<SettingsSpec>,
    /// Overrides the forwarder's default upstream timeout.
    pub timeout: Option<Duration>,
}

impl RouteRule {
    pub fn requires_injected_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// The part of `path` below this rule, or `None` if the rule does not
    /// cover `path`. Exact rules only yield `""`.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        match self.match_kind {
            MatchKind::Exact => (path == self.path).then_some(""),
            MatchKind::Prefix => {
                let base = self.path.trim_end_matches('/');
                let rest = path.strip_prefix(base)?;
                if rest.is_empty() || (base.is_empty() && rest == "/") {
                    Some("")
                } else if rest.starts_with('/') {
                    Some(rest)
                } else {
                    None
                }
            }
        }
    }

    /// Build the upstream URL from configuration plus a validated sub-path.
    ///
    /// Nothing from the client besides checked path segments and the raw
    /// query string reaches the URL.
    pub fn target_url(&self, sub_path: &str, query: Option<&str>) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();

        if !sub_path.is_empty() {
            let segments: Vec<&str> = sub_path
                .strip_prefix('/')
                .unwrap_or(sub_path)
                .split('/')
                .collect();
            for segment in &segments {
                validate_segment(segment)?;
            }
            let mut path = url
                .path_segments_mut()
                .map_err(|_| GatewayError::Internal("base url cannot carry a path".into()))?;
            path.pop_if_empty();
            path.extend(segments);
        }

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query.to_string(),
            };
            url.set_query(Some(&merged));
        }

        Ok(url)
    }

    /// Host of the upstream, for logs.
    pub fn upstream_host(&self) -> &str {
        self.base_url.host_str().unwrap_or("-")
    }
}

fn validate_segment(segment: &str) -> Result<(), GatewayError> {
    if segment.is_empty() {
        return Err(GatewayError::MalformedRequest("empty path segment"));
    }
    if segment == "." || segment == ".." {
        return Err(GatewayError::MalformedRequest("relative path segment"));
    }
    if segment
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '@' | ':' | '%') || c.is_control())
    {
        return Err(GatewayError::MalformedRequest("forbidden character in path"));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route name must not be empty")]
    EmptyName,
    #[error("duplicate route name: '{0}'")]
    DuplicateName(String),
    #[error("route '{0}': path must start with '/'")]
    InvalidPath(String),
    #[error("route '{0}': base url must be absolute http(s)")]
    InvalidBaseUrl(String),
}

/// Result of looking up an inbound request.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub rule: Arc<RouteRule>,
    pub sub_path: String,
}

/// Immutable route table, most specific path first.
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Vec<Arc<RouteRule>>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, RouteTableError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.name.is_empty() {
                return Err(RouteTableError::EmptyName);
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(RouteTableError::DuplicateName(rule.name.clone()));
            }
            if !rule.path.starts_with('/') {
                return Err(RouteTableError::InvalidPath(rule.name.clone()));
            }
            if !matches!(rule.base_url.scheme(), "http" | "https")
                || rule.base_url.cannot_be_a_base()
            {
                return Err(RouteTableError::InvalidBaseUrl(rule.name.clone()));
            }
        }

        let mut rules: Vec<Arc<RouteRule>> = rules.into_iter().map(Arc::new).collect();
        // Stable: equal lengths keep configuration order.
        rules.sort_by_key(|r| std::cmp::Reverse(r.path.len()));
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// First rule covering `path` that accepts `method`.
    ///
    /// A path known under other methods only is `MethodNotAllowed`.
    pub fn lookup(&self, method: &Method, path: &str) -> Result<RouteMatch, GatewayError> {
        let mut path_known = false;
        for rule in &self.rules {
            let Some(sub_path) = rule.match_path(path) else {
                continue;
            };
            path_known = true;
            if rule.allows_method(method) {
                return Ok(RouteMatch {
                    rule: Arc::clone(rule),
                    sub_path: sub_path.to_string(),
                });
            }
        }
        if path_known {
            Err(GatewayError::MethodNotAllowed)
        } else {
            Err(GatewayError::RouteNotFound)
        }
    }

    /// Rules covering `path` regardless of method, for preflight answers.
    pub fn rules_for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a RouteRule> {
        self.rules
            .iter()
            .filter(move |r| r.match_path(path).is_some())
            .map(|r| r.as_ref())
    }

    /// Every secret value configured on any route.
    pub fn literal_secrets(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|r| r.secret.as_ref())
            .flat_map(InjectedSecret::literals)
            .collect()
    }
}
