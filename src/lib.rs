//! vallum — egress-security layer for a security-assessment platform.
//!
//! Every outbound network call the platform makes is mediated here:
//! secret references are resolved without leaking, targets pass an SSRF
//! guard and proxy routing, callers are rate limited, five AI-provider
//! streaming wire formats are normalized into one canonical SSE shape,
//! and audit events are rendered into four SIEM transport formats with
//! pluggable authentication.
//!
//! Module map, leaves first: [`secrets`], [`egress`] (proxy routing +
//! cached transport), [`validation`] (URL/SSRF), [`ratelimit`],
//! [`observability`] (redacting logger + SIEM), [`streaming`],
//! [`providers`] (AI gateway), then the HTTP boundary in [`routes`],
//! [`middleware`], and [`auth`].

pub mod auth;
pub mod config;
pub mod egress;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod providers;
pub mod ratelimit;
pub mod routes;
pub mod secrets;
pub mod state;
pub mod streaming;
pub mod validation;

pub use config::VallumConfig;
pub use routes::build_router;
pub use state::AppState;

/// Load configuration, initialize logging, and serve until shutdown.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = VallumConfig::from_env()?;
    observability::init_tracing(config.log_format)?;

    let state = AppState::build(config).await?;
    let addr = state.config.server.bind_addr;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "vallum listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
