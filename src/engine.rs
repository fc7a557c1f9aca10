//! # Classification Engine
//! Owns the current derived snapshot (corpora + probability table) and
//! answers the three presentation contracts against it:
//! `rank_cities`, `rank_features`, `top_words_in_text`.
//!
//! A snapshot is rebuilt once per message batch and swapped in whole;
//! requests already holding the previous `Arc<Snapshot>` finish on it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::bayes::{CityScore, NaiveBayesModel, PriorPolicy};
use crate::cache::{anon_hash, derived_key, snapshot_key, DerivedCache};
use crate::config::ClassifierConfig;
use crate::corpus::CorpusSet;
use crate::error::InputError;
use crate::features::{included_features, FeatureRanker, IncludedFeature};
use crate::geo::{CityList, GeoAssigner, ReferenceCity};
use crate::ingest::types::{GeoTaggedMessage, MessageStore};
use crate::ingest::{self, filter_messages, FilterStats};
use crate::tokenize::StopWords;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_histogram!(
            "snapshot_build_ms",
            "Time to rebuild the derived snapshot (ms)."
        );
        describe_gauge!(
            "snapshot_messages",
            "Messages assigned to a city in the current snapshot."
        );
        describe_counter!("classify_requests_total", "Texts classified.");
    });
}

/// Derived state for one message batch.
#[derive(Debug)]
pub struct Snapshot {
    /// Content hash of messages, cities and threshold.
    pub key: String,
    pub built_at: DateTime<Utc>,
    pub filter: FilterStats,
    /// Messages that landed within range of some city.
    pub assigned: u64,
    pub corpora: Arc<CorpusSet>,
    pub model: Arc<NaiveBayesModel>,
}

/// `rank_cities` plus the explanation for the winning city.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub ranking: Vec<CityScore>,
    pub best_city: String,
    pub top_words: Vec<String>,
    pub included_features: Vec<IncludedFeature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitySummary {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub message_count: u64,
    pub vocabulary_size: usize,
    pub prior: f64,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub key: String,
    pub built_at: DateTime<Utc>,
    pub filter: FilterStats,
    pub assigned: u64,
    pub prior_policy: PriorPolicy,
    pub cache: &'static str,
}

pub struct Engine {
    config: ClassifierConfig,
    assigner: GeoAssigner,
    classifier_stopwords: StopWords,
    feature_stopwords: StopWords,
    /// Distinguishes rankings produced under different top-k / stop-word settings.
    features_tag: String,
    cache: Arc<DerivedCache>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cities", &self.cities().names())
            .field("max_distance_km", &self.config.max_distance_km)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Engine {
    /// Validates `config` and starts from an empty snapshot.
    pub fn new(config: ClassifierConfig, cache: Arc<DerivedCache>) -> Result<Self, InputError> {
        config.validate()?;
        let cities = Arc::new(config.city_list()?);
        let assigner = GeoAssigner::new(cities, config.max_distance_km)?;
        let feature_stopwords = config.feature_stopwords();
        let features_tag = anon_hash(&format!(
            "k={};sw={}",
            config.top_k_features,
            feature_stopwords.sorted().join(",")
        ));

        let empty = Arc::new(Self::build_snapshot(
            &assigner,
            &cache,
            Vec::new(),
            FilterStats::default(),
        )?);
        Ok(Self {
            classifier_stopwords: config.classifier_stopwords(),
            feature_stopwords,
            features_tag,
            assigner,
            cache,
            snapshot: RwLock::new(empty),
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn cities(&self) -> &CityList {
        self.assigner.cities()
    }

    pub fn cache(&self) -> &DerivedCache {
        &self.cache
    }

    /// Current snapshot; stays valid across later rebuilds.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    pub fn snapshot_info(&self) -> SnapshotInfo {
        let s = self.snapshot();
        SnapshotInfo {
            key: s.key.clone(),
            built_at: s.built_at,
            filter: s.filter,
            assigned: s.assigned,
            prior_policy: s.model.prior_policy(),
            cache: self.cache.store_name(),
        }
    }

    /// Rebuild the snapshot from a raw batch and swap it in.
    /// CPU-bound; call from a blocking context in async code.
    pub fn rebuild(&self, raw: Vec<GeoTaggedMessage>) -> Result<Arc<Snapshot>, InputError> {
        let (kept, filter) = filter_messages(raw, &self.config.bounding_box);
        self.rebuild_filtered(kept, filter)
    }

    /// Like [`rebuild`](Self::rebuild) for a batch that already went through
    /// [`filter_messages`]; `filter` is recorded on the snapshot as is.
    pub fn rebuild_filtered(
        &self,
        kept: Vec<GeoTaggedMessage>,
        filter: FilterStats,
    ) -> Result<Arc<Snapshot>, InputError> {
        let snap = Arc::new(Self::build_snapshot(
            &self.assigner,
            &self.cache,
            kept,
            filter,
        )?);
        *self.snapshot.write() = snap.clone();
        Ok(snap)
    }

    /// Fetch a batch from `store` and rebuild on the blocking pool.
    pub async fn refresh(
        self: &Arc<Self>,
        store: &dyn MessageStore,
    ) -> anyhow::Result<Arc<Snapshot>> {
        let (kept, filter) = ingest::run_once(store, &self.config.bounding_box).await?;
        let engine = Arc::clone(self);
        let snap =
            tokio::task::spawn_blocking(move || engine.rebuild_filtered(kept, filter)).await??;
        Ok(snap)
    }

    fn build_snapshot(
        assigner: &GeoAssigner,
        cache: &DerivedCache,
        kept: Vec<GeoTaggedMessage>,
        filter: FilterStats,
    ) -> Result<Snapshot, InputError> {
        ensure_metrics_described();
        let started = Instant::now();

        let key = snapshot_key(&kept, assigner.cities(), assigner.max_distance_km());
        let groups = assigner.group_by_city(&kept)?;
        let assigned: u64 = groups.values().map(|v| v.len() as u64).sum();

        let corpora: CorpusSet = cache.get_or_compute(&derived_key("corpus", &key, None), || {
            CorpusSet::build(assigner.cities(), &groups)
        });
        let model: NaiveBayesModel = cache.get_or_compute(&derived_key("model", &key, None), || {
            NaiveBayesModel::train(&corpora)
        });

        let ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("snapshot_build_ms").record(ms);
        gauge!("snapshot_messages").set(assigned as f64);
        info!(
            target: "engine",
            snapshot = %key,
            kept = filter.kept,
            assigned,
            prior_policy = ?model.prior_policy(),
            build_ms = ms,
            "snapshot built"
        );

        Ok(Snapshot {
            key,
            built_at: Utc::now(),
            filter,
            assigned,
            corpora: Arc::new(corpora),
            model: Arc::new(model),
        })
    }

    fn require_city(&self, name: &str) -> Result<&ReferenceCity, InputError> {
        self.cities().require(name)
    }

    fn require_text(text: &str) -> Result<(), InputError> {
        if text.trim().is_empty() {
            Err(InputError::EmptyText)
        } else {
            Ok(())
        }
    }

    fn ranker<'a>(&'a self, corpora: &'a CorpusSet) -> FeatureRanker<'a> {
        FeatureRanker::new(corpora, &self.feature_stopwords)
            .with_top_k(self.config.top_k_features)
            .with_explain_k(self.config.explain_top_k)
    }

    /// Every city with its relative log score, best first.
    pub fn rank_cities(&self, text: &str) -> Result<Vec<CityScore>, InputError> {
        Self::require_text(text)?;
        let snap = self.snapshot();
        let sw = self
            .config
            .use_stopwords
            .then_some(&self.classifier_stopwords);
        Ok(snap.model.rank(text, sw))
    }

    /// Most characteristic words of `city` (cached per snapshot).
    pub fn rank_features(&self, city: &str) -> Result<Vec<String>, InputError> {
        let city = self.require_city(city)?;
        let snap = self.snapshot();
        Ok(self.features_for(&snap, &city.name))
    }

    fn features_for(&self, snap: &Snapshot, city: &str) -> Vec<String> {
        let part = format!("{city}/{}", self.features_tag);
        self.cache
            .get_or_compute(&derived_key("features", &snap.key, Some(&part)), || {
                self.ranker(&snap.corpora).rank_features(city)
            })
    }

    /// Words of `text` that best tie it to `city`.
    pub fn top_words_in_text(&self, city: &str, text: &str) -> Result<Vec<String>, InputError> {
        let city = self.require_city(city)?;
        Self::require_text(text)?;
        let snap = self.snapshot();
        Ok(self.ranker(&snap.corpora).top_words_in_text(&city.name, text))
    }

    /// Ranking, top words and ranked features for the winning city.
    pub fn classify(&self, text: &str) -> Result<Classification, InputError> {
        Self::require_text(text)?;
        counter!("classify_requests_total").increment(1);

        let snap = self.snapshot();
        let sw = self
            .config
            .use_stopwords
            .then_some(&self.classifier_stopwords);
        let ranking = snap.model.rank(text, sw);
        let best_city = ranking
            .first()
            .map(|c| c.city.clone())
            .ok_or_else(|| InputError::InvalidCityList("no cities configured".into()))?;

        let top_words = self.ranker(&snap.corpora).top_words_in_text(&best_city, text);
        let features = self.features_for(&snap, &best_city);
        let included = included_features(&features, text);

        debug!(
            target: "engine",
            text_id = %anon_hash(text),
            best = %best_city,
            top_words = top_words.len(),
            included = included.len(),
            "classified"
        );

        Ok(Classification {
            ranking,
            best_city,
            top_words,
            included_features: included,
        })
    }

    pub fn city_summary(&self, city: &str) -> Result<CitySummary, InputError> {
        let city = self.require_city(city)?;
        let snap = self.snapshot();
        let (message_count, vocabulary_size) = snap
            .corpora
            .get(&city.name)
            .map(|c| (c.message_count, c.vocabulary_size()))
            .unwrap_or((0, 0));
        Ok(CitySummary {
            name: city.name.clone(),
            latitude: city.latitude,
            longitude: city.longitude,
            message_count,
            vocabulary_size,
            prior: snap.model.prior(&city.name).unwrap_or(0.0),
            features: self.features_for(&snap, &city.name),
        })
    }
}
