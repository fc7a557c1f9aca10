//! Builds the snapshot for the current message file through the file-backed
//! cache and precomputes every city's feature ranking, so the server starts
//! warm. Prints one line per city.

use tweet_city_classifier::config::{messages_path, CacheBackend, ClassifierConfig};
use tweet_city_classifier::ingest::store::JsonFileStore;
use tweet_city_classifier::bootstrap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).compact().init();

    let mut config = ClassifierConfig::load_default()?;
    // Only a file cache outlives this process.
    config.cache.backend = CacheBackend::File;
    let cache_dir = config.cache.dir.clone();

    let store = JsonFileStore::new(messages_path());
    let engine = bootstrap(config, &store).await?;
    let snap = engine.snapshot();

    println!(
        "snapshot {} | kept {} | assigned {} | retweets {} | out of bounds {} | invalid {}",
        snap.key,
        snap.filter.kept,
        snap.assigned,
        snap.filter.retweets,
        snap.filter.out_of_bounds,
        snap.filter.invalid
    );

    for city in engine.cities().iter() {
        let s = engine.city_summary(&city.name)?;
        let preview: Vec<&str> = s.features.iter().take(5).map(String::as_str).collect();
        println!(
            "{:<15} messages {:>6}  vocab {:>6}  prior {:.4}  top: {}",
            s.name,
            s.message_count,
            s.vocabulary_size,
            s.prior,
            preview.join(", ")
        );
    }

    println!("warm-cache done ({})", cache_dir.display());
    Ok(())
}
