//! `field-vault`: service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP export).
//! 3. Build the audit logger and, if configured, its webhook forwarder.
//! 4. Build the key service backend (AWS KMS or local) behind a [`KmsClient`].
//! 5. Assemble the envelope cipher, field encryptor and status snapshot.
//! 6. Build the Axum router and serve until SIGINT/SIGTERM.

mod config;
mod server;
mod status;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use envelope::audit::WebhookForwarder;
use envelope::kms::{AwsKeyService, LocalKeyService};
use envelope::{AuditLogger, EnvelopeCipher, FieldEncryptor, KeyService, KmsClient};
use tracing::{info, warn};

use config::{Config, KeyServiceKind};
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otlp_endpoint(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        key_service = cfg.key_service.as_str(),
        "field-vault starting"
    );

    // -----------------------------------------------------------------------
    // 3. Audit
    // -----------------------------------------------------------------------
    let mut audit = AuditLogger::new();
    if let Some(url) = cfg.audit_webhook_url() {
        let forwarder = WebhookForwarder::new(
            url,
            cfg.audit_webhook_secret().map(str::to_owned),
            cfg.audit_webhook_timeout(),
        )
        .context("failed to build audit webhook client")?;
        info!(url = forwarder.url(), signed = cfg.audit_webhook_secret().is_some(), "audit forwarding enabled");
        audit = audit.with_forwarder(forwarder);
    }

    // -----------------------------------------------------------------------
    // 4. Key service
    // -----------------------------------------------------------------------
    let (service, master_key_id) = build_key_service(&cfg)?;
    let kms = KmsClient::new(service, audit.clone()).with_timeout(cfg.kms_timeout());

    // -----------------------------------------------------------------------
    // 5. Field encryption
    // -----------------------------------------------------------------------
    let fields = FieldEncryptor::new(EnvelopeCipher::new(kms));
    let status = status::snapshot(&cfg, &master_key_id, audit.is_forwarding());
    if !status.kms_configured && cfg.key_service == KeyServiceKind::Aws {
        info!("no static AWS credentials configured; using the default credential chain");
    }

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(fields, cfg.rotation_policy(), status);
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("field-vault stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

fn build_key_service(cfg: &Config) -> Result<(Arc<dyn KeyService>, String)> {
    match cfg.key_service {
        KeyServiceKind::Aws => {
            let settings = cfg.kms_settings();
            let key_id = settings.key_id.clone();
            Ok((Arc::new(AwsKeyService::new(settings)), key_id))
        }
        KeyServiceKind::Local => {
            let local = match cfg.local_master_key()? {
                Some(master) => LocalKeyService::with_master_key("local/configured", &master)
                    .context("invalid LOCAL_MASTER_KEY")?,
                None => {
                    warn!("LOCAL_MASTER_KEY not set; envelopes will not survive a restart");
                    LocalKeyService::new()
                }
            };
            let key_id = local.key_id().to_owned();
            Ok((Arc::new(local), key_id))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
