use anyhow::Result;
use blogcrew_api::config::AppConfig;
use blogcrew_api::routes::build_router;
use blogcrew_api::state::AppState;
use blogcrew_core::{TelemetryOptions, init_telemetry};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_telemetry(TelemetryOptions::default())?;

    let config = AppConfig::from_env()?;
    let state = AppState::try_from_config(&config.crew)?;
    let app = build_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(address = %config.listen_addr, "blogcrew-api listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
