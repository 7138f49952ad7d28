use payment_failure_alerts::config::AppConfig;
use payment_failure_alerts::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::from_env();
    let state = AppState::from_config(&cfg);

    if !cfg.stripe_connected() {
        warn!("STRIPE_SECRET_KEY not set, customer lookups will fail");
    }
    if cfg.stripe_webhook_secret.is_none() {
        warn!("STRIPE_WEBHOOK_SECRET not set, every webhook will be rejected");
    }
    if !cfg.gmail_connected() {
        warn!("Gmail credentials incomplete, alert emails will fail");
    }

    state.log.info(format!(
        "Payment failure alert service starting, alerts go to {}",
        cfg.alert_email
    ));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr()).await?;
    info!("Listening on {}", cfg.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
