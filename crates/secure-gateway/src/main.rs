mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use credential_resolver::{process_env, ActiveCredential, CredentialSlot, TokenProvider};
use gateway_proxy::{Forwarder, ForwarderConfig, Gateway, GatewayState, RouteTable};
use policy_engine::OriginPolicyEngine;
use settings_store::{FirestoreSettingsStore, SettingsStore};

use crate::cli::Cli;
use crate::config::Config;

const COMPONENT: &str = "secure-gateway";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args, load config, then environment and CLI overrides.
    let cli = Cli::parse();
    let env = process_env();

    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();
    cfg.apply_env_overrides(&env)?;
    cfg.apply_cli_overrides(cli.listen.as_deref(), cli.environment);

    // 2. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }
    info!(
        config_file = %cli.config.display(),
        listen = %cfg.listen_addr,
        environment = %cfg.policy.environment,
        routes = cfg.routes.len(),
        "secure-gateway starting"
    );

    // 3. Start audit logger.
    let (audit, audit_handle) = AuditSink::start(&cfg.logging.audit_log_path)
        .await
        .context("failed to start audit logger")?;

    audit
        .log(AuditEntry::new(
            AuditEventType::ProcessStarted,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
                "environment": cfg.policy.environment.to_string(),
            }),
        ))
        .await;

    // 4. Origin policy.
    let policy = OriginPolicyEngine::new(cfg.policy.clone()).context("invalid origin policy")?;

    // 5. Operator credential, resolved once and carried in the gateway state.
    let credentials = CredentialSlot::new();
    let credential = credentials.get_or_resolve(&env);
    audit_credential(&audit, credential.as_deref()).await;

    // 6. Upstream client and optional settings store.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to build upstream http client")?;
    let store = build_settings_store(&cfg, credential.clone(), &client, &audit).await;

    // 7. Route table and forwarder.
    let (rules, disabled) = cfg.resolve_routes(&env)?;
    for route in &disabled {
        audit
            .log(AuditEntry::new(
                AuditEventType::RouteDisabled,
                AuditSource::new(COMPONENT),
                serde_json::json!({
                    "route": route.name,
                    "missing_variable": route.missing_var,
                }),
            ))
            .await;
    }
    let routes = RouteTable::new(rules).context("invalid route table")?;

    let forwarder = Forwarder::new(
        client,
        &routes,
        ForwarderConfig {
            default_timeout: cfg.upstream_timeout(),
            error_body_mode: cfg.sanitizer.error_body_mode,
        },
        store,
        audit.clone(),
    )
    .context("failed to build body sanitizer")?;

    info!(
        active = routes.len(),
        disabled = disabled.len(),
        settings_store = forwarder.has_settings_store(),
        "routes loaded"
    );

    let gateway = Gateway::new(GatewayState {
        policy,
        routes,
        forwarder,
        credential,
        audit: audit.clone(),
        max_body_bytes: cfg.max_body_bytes,
    });

    // 8. Bind and serve until SIGINT/SIGTERM.
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", cfg.listen_addr))?;

    let serve_result = gateway.serve(listener, shutdown_signal()).await;

    // 9. Log shutdown.
    info!("secure-gateway shutting down");

    audit
        .log(AuditEntry::new(
            AuditEventType::ProcessStopped,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "result": match &serve_result {
                    Ok(()) => "ok".to_string(),
                    Err(err) => err.to_string(),
                },
            }),
        ))
        .await;

    // Last sender gone: the writer drains and flushes.
    drop(audit);
    if let Err(err) = audit_handle.await {
        warn!(error = %err, "audit writer task failed");
    }

    serve_result.context("gateway server failed")
}

async fn audit_credential(audit: &AuditSink, credential: Option<&ActiveCredential>) {
    let entry = match credential {
        Some(credential) => {
            info!(
                source = credential.source().kind(),
                project_id = credential.project_id(),
                "operator credential resolved"
            );
            AuditEntry::new(
                AuditEventType::CredentialResolved,
                AuditSource::new(COMPONENT),
                serde_json::json!({
                    "source": credential.source().kind(),
                    "project_id": credential.project_id(),
                }),
            )
        }
        None => {
            warn!("no operator credential available; settings lookups disabled");
            AuditEntry::new(
                AuditEventType::CredentialUnavailable,
                AuditSource::new(COMPONENT),
                serde_json::json!({}),
            )
        }
    };
    audit.log(entry).await;
}

/// The document store is only reachable with an operator credential. Any
/// failure here degrades settings routes to inline values.
async fn build_settings_store(
    cfg: &Config,
    credential: Option<Arc<ActiveCredential>>,
    client: &reqwest::Client,
    audit: &AuditSink,
) -> Option<Arc<dyn SettingsStore>> {
    if !cfg.settings_store.enabled {
        info!("settings store disabled by configuration");
        return None;
    }
    let credential = credential?;

    let tokens = Arc::new(TokenProvider::new(credential, client.clone()));
    match FirestoreSettingsStore::with_base_url(tokens, client.clone(), &cfg.settings_store.base_url)
    {
        Ok(store) => {
            info!(base_url = %cfg.settings_store.base_url, "settings store configured");
            Some(Arc::new(store))
        }
        Err(err) => {
            warn!(error = %err, "settings store unavailable");
            audit
                .log(AuditEntry::new(
                    AuditEventType::SettingsDegraded,
                    AuditSource::new(COMPONENT),
                    serde_json::json!({ "reason": "settings_store_invalid" }),
                ))
                .await;
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
        _ = terminate => info!("received SIGTERM"),
    }
}
