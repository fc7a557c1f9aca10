// src/lib.rs
// Public library surface for the server binary, the warm-up CLI and integration tests.

pub mod api;
pub mod bayes;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod features;
pub mod geo;
pub mod ingest;
pub mod metrics;
pub mod tokenize;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::bayes::{CityScore, NaiveBayesModel, PriorPolicy};
pub use crate::cache::{CacheLookup, CacheStore, DerivedCache};
pub use crate::config::ClassifierConfig;
pub use crate::engine::{Classification, CitySummary, Engine, Snapshot};
pub use crate::error::{CacheError, InputError};
pub use crate::features::{FeatureRanker, MiScore};
pub use crate::geo::{CityList, GeoAssigner, ReferenceCity};
pub use crate::ingest::types::{GeoTaggedMessage, MessageStore};
pub use crate::tokenize::{tokenize, StopWords};

/// Build an engine from `config` and load its first snapshot from `store`.
///
/// Example:
/// ```ignore
/// let cfg = tweet_city_classifier::ClassifierConfig::load_default()?;
/// let store = tweet_city_classifier::ingest::store::JsonFileStore::new("data/tweets.json");
/// let engine = tweet_city_classifier::bootstrap(cfg, &store).await?;
/// ```
pub async fn bootstrap(
    config: ClassifierConfig,
    store: &dyn MessageStore,
) -> anyhow::Result<Arc<Engine>> {
    let cache = Arc::new(config.cache.build()?);
    let engine = Arc::new(Engine::new(config, cache).context("invalid classifier config")?);
    let snap = engine
        .refresh(store)
        .await
        .with_context(|| format!("loading messages from {} store", store.name()))?;
    info!(
        target: "engine",
        snapshot = %snap.key,
        assigned = snap.assigned,
        cache = engine.cache().store_name(),
        "engine ready"
    );
    Ok(engine)
}
