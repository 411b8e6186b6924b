use axum::{
    response::Html,
    routing::{any, get},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ws_relay::{hub::InMemoryHub, relay_websocket, RelayState, ServerConfig};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg = ServerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cfg.log_filter)?)
        .init();
    info!(version = env!("CARGO_PKG_VERSION"), "starting ws-relay");

    let state = RelayState::new(InMemoryHub::new(), cfg.ws);

    let app = axum::Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/ws", any(relay_websocket))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining connection tasks");
    if tokio::time::timeout(std::time::Duration::from_secs(5), state.shutdown())
        .await
        .is_err()
    {
        warn!("timed out waiting for connection tasks");
    }

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../web/index.html"))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
