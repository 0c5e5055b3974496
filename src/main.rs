use dotenvy::dotenv;
use star_events::config::{self, database};
use star_events::errors::Result;
use star_events::web::{AppState, create_routes};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = config::load_app_configuration()?;

    // 4. Connect and make sure the schema exists
    let db = database::create_connection(&app_config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Serve the API
    let bind_addr = app_config.bind_addr.clone();
    let state = AppState::new(db, app_config)?;
    let app = create_routes(state);

    let listener = TcpListener::bind(bind_addr.as_str())
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", bind_addr, e))?;
    info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
