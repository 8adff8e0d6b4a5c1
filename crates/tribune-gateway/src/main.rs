//! Tribune relay gateway.
//!
//! - WebSocket endpoint: /v1/ws?token=...
//! - Internal publish hook: POST /v1/internal/conversations/:id/publish
//! - Ops: /healthz, /readyz, /metrics
//! - Typing sweeper on a fixed interval
//! - Graceful drain on SIGINT/SIGTERM

use std::net::SocketAddr;

use tokio::time::{sleep, Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

use tribune_core::error::{Result, RelayError};
use tribune_core::protocol::close::GOING_AWAY;
use tribune_gateway::{app_state::AppState, config, router};

/// Upper bound on waiting for sessions to flush their close frames.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::load_from_env()?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| RelayError::BadRequest(format!("gateway.listen must be a SocketAddr: {e}")))?;

    let state = AppState::new(cfg)?;
    let sweeper = state
        .relay()
        .spawn_typing_sweeper(state.cfg().relay.sweep_interval());
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "tribune-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RelayError::Internal(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|e| RelayError::Internal(format!("server failed: {e}")))?;

    sweeper.abort();
    tracing::info!("tribune-gateway stopped");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
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

    tracing::info!("signal received, draining");
    state.metrics().set_draining();

    // Upgraded sockets outlive the HTTP server's own shutdown; tell every
    // session to go away so clients reconnect elsewhere.
    let registry = state.registry();
    registry.close_all(GOING_AWAY);
    let deadline = Instant::now() + DRAIN_GRACE;
    while registry.connection_count() > 0 && Instant::now() < deadline {
        sleep(Duration::from_millis(50)).await;
    }
}
