use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use body_sanitizer::SanitizeMode;
use gateway_proxy::{
    InjectedSecret, MatchKind, RouteRule, SecretValue, SessionLogin, SettingsSpec,
    DEFAULT_MAX_BODY_BYTES,
};
use http::{HeaderName, Method};
use policy_engine::{Environment, OriginPolicy};
use serde::Deserialize;
use settings_store::DEFAULT_FIRESTORE_URL;
use tracing::warn;
use url::Url;

pub const ENVIRONMENT_VAR: &str = "GATEWAY_ENV";
pub const NODE_ENVIRONMENT_VAR: &str = "NODE_ENV";
pub const ALLOWED_ORIGINS_VAR: &str = "ALLOWED_ORIGINS";
pub const FRONTEND_URL_VAR: &str = "FRONTEND_URL";
pub const PORT_VAR: &str = "PORT";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Separate policy file; replaces the inline `policy` section when set.
    #[serde(default)]
    pub policy_file: Option<PathBuf>,
    #[serde(default)]
    pub policy: OriginPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub settings_store: SettingsStoreConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            upstream_timeout_secs: default_upstream_timeout(),
            max_body_bytes: default_max_body_bytes(),
            policy_file: None,
            policy: OriginPolicy::default(),
            logging: LoggingConfig::default(),
            sanitizer: SanitizerConfig::default(),
            settings_store: SettingsStoreConfig::default(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_audit_path")]
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: default_audit_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SanitizerConfig {
    /// Treatment of upstream error bodies.
    #[serde(default)]
    pub error_body_mode: SanitizeMode,
}

#[derive(Debug, Deserialize)]
pub struct SettingsStoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_store_url")]
    pub base_url: String,
}

impl Default for SettingsStoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_store_url(),
        }
    }
}

/// One route as written in the file. Secrets are named by environment
/// variable, never inlined.
#[derive(Debug, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
    pub upstream: String,
    #[serde(default)]
    pub allow_no_origin: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub secret: Option<SecretConfig>,
    #[serde(default)]
    pub settings: Option<SettingsSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretConfig {
    Header { header: String, value_env: String },
    Bearer { token_env: String },
    Cookie { value_env: String },
    SessionLogin {
        login_path: String,
        username_env: String,
        password_env: String,
    },
}

/// A configured route left out of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledRoute {
    pub name: String,
    /// Environment variable that was missing or empty.
    pub missing_var: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

fn default_true() -> bool {
    true
}

fn default_store_url() -> String {
    DEFAULT_FIRESTORE_URL.to_string()
}

/// Load configuration from a YAML file.
///
/// `Ok(None)` when the file does not exist; the caller falls back to
/// defaults once logging is up.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut config: Config = serde_yml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    if let Some(policy_file) = &config.policy_file {
        let policy_path = match path.parent() {
            Some(dir) if policy_file.is_relative() => dir.join(policy_file),
            _ => policy_file.clone(),
        };
        config.policy = policy_engine::loader::load_policy(&policy_path)?;
    }

    Ok(Some(config))
}

fn non_empty<'a>(env: &'a HashMap<String, String>, var: &str) -> Option<&'a str> {
    env.get(var).map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Config {
    /// Apply `GATEWAY_ENV`/`NODE_ENV`, `ALLOWED_ORIGINS`, `FRONTEND_URL` and
    /// `PORT` on top of the file values.
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(value) =
            non_empty(env, ENVIRONMENT_VAR).or_else(|| non_empty(env, NODE_ENVIRONMENT_VAR))
        {
            self.policy.environment = value.parse().unwrap_or_default();
        }

        if let Some(value) = non_empty(env, ALLOWED_ORIGINS_VAR) {
            self.policy.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = non_empty(env, FRONTEND_URL_VAR) {
            self.policy.frontend_url = Some(value.to_string());
        }

        if let Some(value) = non_empty(env, PORT_VAR) {
            let port: u16 = value
                .parse()
                .with_context(|| format!("{PORT_VAR} is not a valid port: '{value}'"))?;
            let mut addr: SocketAddr = self
                .listen_addr
                .parse()
                .with_context(|| format!("invalid listen address '{}'", self.listen_addr))?;
            addr.set_port(port);
            self.listen_addr = addr.to_string();
        }

        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, listen: Option<&str>, environment: Option<Environment>) {
        if let Some(listen) = listen {
            self.listen_addr = listen.to_string();
        }
        if let Some(environment) = environment {
            self.policy.environment = environment;
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Turn the configured routes into rules, reading secrets from `env`.
    ///
    /// A route whose secret variable is unset is returned in the disabled
    /// list instead of failing startup. Malformed route definitions are
    /// errors.
    pub fn resolve_routes(
        &self,
        env: &HashMap<String, String>,
    ) -> anyhow::Result<(Vec<RouteRule>, Vec<DisabledRoute>)> {
        let mut rules = Vec::with_capacity(self.routes.len());
        let mut disabled = Vec::new();

        for route in &self.routes {
            let secret = match &route.secret {
                None => None,
                Some(config) => match resolve_secret(config, env)
                    .with_context(|| format!("route '{}'", route.name))?
                {
                    Ok(secret) => Some(secret),
                    Err(missing_var) => {
                        warn!(
                            route = %route.name,
                            variable = %missing_var,
                            "route secret not set; route disabled"
                        );
                        disabled.push(DisabledRoute {
                            name: route.name.clone(),
                            missing_var,
                        });
                        continue;
                    }
                },
            };
            rules.push(route.to_rule(secret)?);
        }

        Ok((rules, disabled))
    }
}

impl RouteConfig {
    fn to_rule(&self, secret: Option<InjectedSecret>) -> anyhow::Result<RouteRule> {
        let base_url = Url::parse(&self.upstream)
            .with_context(|| format!("route '{}': invalid upstream url", self.name))?;
        let methods = self
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .with_context(|| format!("route '{}': invalid method '{m}'", self.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(RouteRule {
            name: self.name.clone(),
            methods,
            path: self.path.clone(),
            match_kind: self.match_kind,
            base_url,
            allow_no_origin: self.allow_no_origin,
            secret,
            settings: self.settings.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Outer error: the definition itself is broken. Inner error: the named
/// variable is missing.
fn resolve_secret(
    config: &SecretConfig,
    env: &HashMap<String, String>,
) -> anyhow::Result<Result<InjectedSecret, String>> {
    let lookup = |var: &str| {
        env.get(var)
            .filter(|v| !v.is_empty())
            .map(SecretValue::new)
            .ok_or_else(|| var.to_string())
    };

    let secret = match config {
        SecretConfig::Header { header, value_env } => {
            let name = HeaderName::from_bytes(header.as_bytes())
                .with_context(|| format!("invalid secret header name '{header}'"))?;
            lookup(value_env).map(|value| InjectedSecret::Header { name, value })
        }
        SecretConfig::Bearer { token_env } => lookup(token_env).map(InjectedSecret::Bearer),
        SecretConfig::Cookie { value_env } => lookup(value_env).map(InjectedSecret::Cookie),
        SecretConfig::SessionLogin {
            login_path,
            username_env,
            password_env,
        } => {
            if !login_path.starts_with('/') {
                bail!("login path must start with '/'");
            }
            lookup(username_env).and_then(|username| {
                lookup(password_env).map(|password| {
                    InjectedSecret::SessionLogin(SessionLogin {
                        login_path: login_path.clone(),
                        username: username.expose().to_string(),
                        password,
                    })
                })
            })
        }
    };
    Ok(secret)
}
