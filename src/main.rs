use std::sync::Arc;

use anyhow::Context;
use lead_relay::config::RelayConfig;
use lead_relay::server::{AppState, build_router};
use lead_relay::LeadRelay;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_relay=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    let relay = Arc::new(
        LeadRelay::open(&config)
            .with_context(|| format!("opening state in {}", config.state_dir.display()))?,
    );

    let logger = relay.spawn_event_logger();
    relay.spawn_drain();

    let app = build_router(AppState::new(Arc::clone(&relay)));
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!("listening on {}", config.listen);

    let shutdown = relay.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    relay.shutdown();
    logger.await.context("event logger panicked")?;
    Ok(())
}
