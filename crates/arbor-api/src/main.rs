use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arbor_api::{
    build_router,
    collab::HttpCollaborator,
    config::Config,
    state::AppState,
};
use arbor_gen::GenClient;
use arbor_persist::MongoStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting arbor API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    tracing::info!("Connecting to MongoDB");
    let store = Arc::new(MongoStore::connect(&config.mongodb_uri, &config.mongodb.database).await?);
    tracing::info!("MongoDB connected");

    tracing::info!("Dialing generation service at {}", config.upstream.endpoint);
    let generator = Arc::new(
        GenClient::connect(
            &config.upstream.endpoint,
            Duration::from_millis(config.upstream.connect_timeout_ms),
        )
        .await?,
    );

    let collaborator = Arc::new(HttpCollaborator::new(
        config.collaborator.base_url.clone(),
        Duration::from_millis(config.collaborator.timeout_ms),
    )?);

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        generator,
        collaborator.clone(),
        collaborator,
    ));

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API docs: http://{}/api/docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
