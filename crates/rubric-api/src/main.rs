use anyhow::Result;
use rubric_core::config::{load_config, TrackerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rubric_api=debug,rubric_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        PathBuf::from(std::env::var("RUBRIC_CONFIG").unwrap_or_else(|_| "rubric.yaml".into()));
    let mut config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        TrackerConfig::default()
    };

    if let Ok(db) = std::env::var("DATABASE_PATH") {
        config.db = PathBuf::from(db);
    }
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port.parse().unwrap_or(config.server.port);
    }

    rubric_api::serve(config).await
}
