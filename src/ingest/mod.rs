// src/ingest/mod.rs
pub mod store;
pub mod types;

use crate::geo::BoundingBox;
use crate::ingest::types::{GeoTaggedMessage, MessageStore};
use metrics::{counter, describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_messages_total",
            "Messages returned by the message store."
        );
        describe_counter!(
            "ingest_kept_total",
            "Messages kept after retweet/bounding-box filtering."
        );
        describe_counter!("ingest_retweets_total", "Retweets excluded.");
        describe_counter!(
            "ingest_out_of_bounds_total",
            "Messages outside the bounding box."
        );
        describe_counter!(
            "ingest_invalid_total",
            "Messages with non-finite or out-of-range coordinates."
        );
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when messages were last fetched."
        );
    });
}

/// Per-reason drop counts of one filtering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FilterStats {
    pub kept: usize,
    pub retweets: usize,
    pub out_of_bounds: usize,
    pub invalid: usize,
}

/// Keep non-retweets with valid coordinates strictly inside `bbox`.
/// Input order is preserved.
pub fn filter_messages(
    raw: Vec<GeoTaggedMessage>,
    bbox: &BoundingBox,
) -> (Vec<GeoTaggedMessage>, FilterStats) {
    let mut stats = FilterStats::default();
    let mut kept = Vec::with_capacity(raw.len());

    for m in raw {
        if m.is_retweet() {
            stats.retweets += 1;
            continue;
        }
        match m.point() {
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "rejected message");
                stats.invalid += 1;
            }
            Ok(p) if !bbox.contains(p) => stats.out_of_bounds += 1,
            Ok(_) => kept.push(m),
        }
    }
    stats.kept = kept.len();
    (kept, stats)
}

/// Fetch the population once and filter it.
pub async fn run_once(
    store: &dyn MessageStore,
    bbox: &BoundingBox,
) -> anyhow::Result<(Vec<GeoTaggedMessage>, FilterStats)> {
    ensure_metrics_described();

    let raw = store.fetch_messages(bbox).await.map_err(|e| {
        tracing::warn!(target: "ingest", error = ?e, store = store.name(), "store error");
        e
    })?;
    let fetched = raw.len();
    let (kept, stats) = filter_messages(raw, bbox);

    counter!("ingest_messages_total").increment(fetched as u64);
    counter!("ingest_kept_total").increment(stats.kept as u64);
    counter!("ingest_retweets_total").increment(stats.retweets as u64);
    counter!("ingest_out_of_bounds_total").increment(stats.out_of_bounds as u64);
    counter!("ingest_invalid_total").increment(stats.invalid as u64);
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    metrics::gauge!("ingest_last_run_ts").set(now as f64);

    tracing::info!(
        target: "ingest",
        store = store.name(),
        fetched,
        kept = stats.kept,
        retweets = stats.retweets,
        out_of_bounds = stats.out_of_bounds,
        invalid = stats.invalid,
        "messages fetched"
    );

    Ok((kept, stats))
}
