use lavanode::{
    common::{logger, types::AnyResult},
    configs::Config,
    server::AppState,
    transport,
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(config.logging.as_ref());

    info!(
        "Starting lavanode {} ({}@{}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_BRANCH"),
        env!("GIT_COMMIT"),
        env!("BUILD_TIME")
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(config);
    info!(
        "Sources: {:?}, route planner: {}",
        state.sources.source_names(),
        if state.routeplanner.is_some() { "enabled" } else { "disabled" }
    );

    let registry = state.registry.clone();
    let app = transport::router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("Lavanode listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    registry.shutdown_all();
    Ok(())
}
