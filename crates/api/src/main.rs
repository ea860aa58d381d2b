use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use drtrigger_api::app::{build_app, AppState};
use drtrigger_infra::config::{AppConfig, TriggerMode};
use drtrigger_infra::jobs::{recover_orphaned_jobs, Dispatcher, DispatcherConfig, JobStore, RedisJobStore};
use drtrigger_infra::secrets::{SecretResolver, VaultSecretResolver};
use drtrigger_infra::trigger::{build_http_client, JenkinsDirectTrigger, PipelineTrigger, WebhookTrigger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    drtrigger_observability::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(?config, "configuration loaded");

    if config.tls_insecure {
        tracing::warn!("TLS certificate validation is disabled for outbound Vault/Jenkins calls (TLS_INSECURE=true)");
    }
    if config.vault_token.is_empty() {
        tracing::warn!("VAULT_TOKEN not set; secret lookups will be rejected");
    }

    let store = RedisJobStore::connect(&config.redis_url(), config.store_keys())
        .await
        .with_context(|| format!("failed to connect to Redis at {}:{}", config.redis_host, config.redis_port))?;
    tracing::info!(host = %config.redis_host, port = config.redis_port, "connected to Redis");
    let store: Arc<dyn JobStore> = Arc::new(store);

    if config.recover_processing_on_start {
        recover_orphaned_jobs(store.as_ref())
            .await
            .context("failed to recover orphaned jobs")?;
    }

    let client = build_http_client(config.webhook_timeout(), config.tls_insecure)
        .context("failed to build HTTP client")?;
    let secrets: Arc<dyn SecretResolver> = Arc::new(VaultSecretResolver::new(
        client.clone(),
        config.vault_addr.clone(),
        config.vault_token.clone(),
        config.vault_mount.clone(),
    ));
    let trigger: Arc<dyn PipelineTrigger> = match config.trigger_mode {
        TriggerMode::Webhook => Arc::new(WebhookTrigger::new(client, secrets, config.pipeline_name.clone())),
        TriggerMode::Direct => Arc::new(JenkinsDirectTrigger::new(
            client,
            secrets,
            config.jenkins_url.clone(),
            config.pipeline_name.clone(),
            config.branch_name.clone(),
        )),
    };

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(store.clone(), trigger).spawn(DispatcherConfig::default(), cancel.clone());

    let app = build_app(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;

    tracing::info!(addr = %listener.local_addr()?, pipeline = %config.pipeline_name, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("server error")?;

    dispatcher.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels background work.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
