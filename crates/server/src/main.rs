use std::time::Duration;

use tracing::info;

use relay_server::{cli, router, startup};

/// Grace period for in-flight agent tasks at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Initialize shared state, spawn background tasks, and start the HTTP
/// server.
async fn serve(config: relay_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let port = config.server.port;
    let state = startup::build_app_state(config)?;
    let app = router::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{port}");

    startup::spawn_background_tasks(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight agent tasks up to the grace period; abandoned tasks
    // keep everything they persisted before the cutoff.
    info!("shutting down, draining running agents");
    state.registry.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    relay_core::config::load_dotenv();
    let config = relay_core::Config::from_env();
    let args: Vec<String> = std::env::args().collect();

    // Dispatch non-serve subcommands; returns false for `serve`.
    if !cli::dispatch(&config, &args).await? {
        serve(config).await?;
    }
    Ok(())
}
