//! Tweet City Classifier: Binary Entrypoint
//! Loads the classifier config and message seed file, builds the first
//! snapshot, and serves the JSON API plus `/metrics`.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tweet_city_classifier::config::{messages_path, ClassifierConfig};
use tweet_city_classifier::ingest::store::JsonFileStore;
use tweet_city_classifier::metrics::Metrics;
use tweet_city_classifier::{bootstrap, create_router, AppState};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - CLASSIFIER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("CLASSIFIER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,engine=info,cache=info,api=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = ClassifierConfig::load_default()?;
    let metrics = Metrics::init(&config)?;

    let store = JsonFileStore::new(messages_path());
    let engine = bootstrap(config, &store).await?;

    let router = create_router(AppState { engine }).merge(metrics.router());

    Ok(router.into())
}
