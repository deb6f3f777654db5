use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnledger::{routes::create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,turnledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting turn ledger service (turnledger)");

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Loaded configuration - Server: {}:{}, products: {}",
        config.server.host,
        config.server.port,
        config.catalog.products.len()
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    tracing::info!("Initialized application state");

    // Periodically expire checkouts that were never paid
    let checkout_service = state.checkout_service.clone();
    let sweep_interval = Duration::from_secs(config.checkout.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = checkout_service
                .expire_stale(time::OffsetDateTime::now_utc())
                .await
            {
                tracing::error!("Checkout expiry sweep failed: {:?}", e);
            }
        }
    });

    // Create router
    let app = create_router(state);

    // Create server address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
