// src/config/classifier.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{DerivedCache, FileBlobStore};
use crate::error::InputError;
use crate::features::{DEFAULT_EXPLAIN_K, DEFAULT_TOP_K};
use crate::geo::{BoundingBox, CityList, ReferenceCity, DEFAULT_MAX_DISTANCE_KM};
use crate::tokenize::StopWords;

pub const ENV_CLASSIFIER_CONFIG_PATH: &str = "CLASSIFIER_CONFIG_PATH";
pub const ENV_MAX_DISTANCE_KM: &str = "CLASSIFIER_MAX_DISTANCE_KM";
pub const ENV_MESSAGES_PATH: &str = "MESSAGES_PATH";

pub const DEFAULT_TOML_PATH: &str = "config/classifier.toml";
pub const DEFAULT_JSON_PATH: &str = "config/classifier.json";
pub const DEFAULT_MESSAGES_PATH: &str = "data/tweets.json";
pub const DEFAULT_CACHE_DIR: &str = "cache/derived";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl CacheConfig {
    pub fn build(&self) -> Result<DerivedCache> {
        Ok(match self.backend {
            CacheBackend::Memory => DerivedCache::in_memory(),
            CacheBackend::None => DerivedCache::disabled(),
            CacheBackend::File => {
                let store = FileBlobStore::new(&self.dir)
                    .with_context(|| format!("opening cache dir {}", self.dir.display()))?;
                DerivedCache::new(Arc::new(store))
            }
        })
    }
}

/// Tunables of the classification core. Every field has a default, so a
/// config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub max_distance_km: f64,
    pub top_k_features: usize,
    pub explain_top_k: usize,
    /// Skip classifier stop-words when scoring text.
    pub use_stopwords: bool,
    pub bounding_box: BoundingBox,
    pub cities: Vec<ReferenceCity>,
    /// `None` = built-in list.
    pub classifier_stopwords: Option<Vec<String>>,
    pub feature_stopwords: Option<Vec<String>>,
    pub cache: CacheConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            top_k_features: DEFAULT_TOP_K,
            explain_top_k: DEFAULT_EXPLAIN_K,
            use_stopwords: true,
            bounding_box: BoundingBox::CONTINENTAL_US,
            cities: CityList::us_default().as_slice().to_vec(),
            classifier_stopwords: None,
            feature_stopwords: None,
            cache: CacheConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Load from an explicit path; format by extension, TOML then JSON
    /// otherwise.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading classifier config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)
            .with_context(|| format!("parsing classifier config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve config with env + fallbacks:
    /// 1) $CLASSIFIER_CONFIG_PATH
    /// 2) config/classifier.toml
    /// 3) config/classifier.json
    /// 4) defaults
    ///
    /// `$CLASSIFIER_MAX_DISTANCE_KM` then overrides the threshold.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CLASSIFIER_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CLASSIFIER_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_TOML_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_TOML_PATH))?
        } else if Path::new(DEFAULT_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_JSON_PATH))?
        } else {
            Self::default()
        };

        if let Some(km) = parse_distance_env(std::env::var(ENV_MAX_DISTANCE_KM).ok()) {
            cfg.max_distance_km = km;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err(InputError::InvalidConfig(format!(
                "max_distance_km must be a positive number, got {}",
                self.max_distance_km
            )));
        }
        if self.top_k_features == 0 {
            return Err(InputError::InvalidConfig(
                "top_k_features must be at least 1".into(),
            ));
        }
        let b = &self.bounding_box;
        if !(b.lon_min < b.lon_max && b.lat_min < b.lat_max) {
            return Err(InputError::InvalidConfig(format!(
                "bounding_box is empty: {b:?}"
            )));
        }
        self.city_list().map(|_| ())
    }

    pub fn city_list(&self) -> Result<CityList, InputError> {
        CityList::new(self.cities.clone())
    }

    pub fn classifier_stopwords(&self) -> StopWords {
        match &self.classifier_stopwords {
            Some(words) => StopWords::from_words(words),
            None => StopWords::classifier_default(),
        }
    }

    pub fn feature_stopwords(&self) -> StopWords {
        match &self.feature_stopwords {
            Some(words) => StopWords::from_words(words),
            None => StopWords::feature_default(),
        }
    }
}

/// Location of the message seed file.
pub fn messages_path() -> PathBuf {
    std::env::var(ENV_MESSAGES_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_MESSAGES_PATH))
}

// positive finite km, anything else ignored
fn parse_distance_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<ClassifierConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => toml::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| serde_json::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported classifier config format")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = parse_config(
            r#"
            max_distance_km = 100.0
            top_k_features = 10

            [cache]
            backend = "none"
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.max_distance_km, 100.0);
        assert_eq!(cfg.top_k_features, 10);
        assert_eq!(cfg.explain_top_k, 5);
        assert_eq!(cfg.cache.backend, CacheBackend::None);
        assert_eq!(cfg.cities.len(), 9);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn custom_stopwords_are_normalized() {
        let cfg = parse_config(r#"{"feature_stopwords": ["The", "LOL!"]}"#, "json").unwrap();
        let sw = cfg.feature_stopwords();
        assert!(sw.contains("the"));
        assert!(sw.contains("lol"));
        assert!(!sw.contains("especially"));
        assert!(cfg.classifier_stopwords().contains("because"));
    }

    #[test]
    fn distance_env_parsing() {
        assert_eq!(parse_distance_env(Some(" 120.5 ".into())), Some(120.5));
        assert_eq!(parse_distance_env(Some("-3".into())), None);
        assert_eq!(parse_distance_env(Some("abc".into())), None);
        assert_eq!(parse_distance_env(None), None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = ClassifierConfig::default();
        cfg.top_k_features = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClassifierConfig::default();
        cfg.cities.push(ReferenceCity::new("boston", -71.0, 42.0));
        assert!(matches!(
            cfg.validate(),
            Err(InputError::InvalidCityList(_))
        ));
    }
}
