// src/ingest/store.rs
//! Message store adapters: an in-memory vector and a JSON seed file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::InputError;
use crate::geo::BoundingBox;
use crate::ingest::types::{GeoTaggedMessage, MessageStore};

const SEED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Holds messages in memory; `fetch_messages` applies the bounding box.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    messages: Vec<GeoTaggedMessage>,
}

impl MemoryStore {
    pub fn new(messages: Vec<GeoTaggedMessage>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    async fn fetch_messages(&self, bbox: &BoundingBox) -> Result<Vec<GeoTaggedMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.point().map(|p| bbox.contains(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Reads a JSON array of messages from disk on every fetch.
///
/// Two shapes are accepted: the native `GeoTaggedMessage` array, or the
/// tweet seed format
/// `{id?, screen_name, text, created_at?, coordinates: {coordinates: [lon, lat]}}`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl MessageStore for JsonFileStore {
    async fn fetch_messages(&self, bbox: &BoundingBox) -> Result<Vec<GeoTaggedMessage>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading messages from {}", self.path.display()))?;
        let all = parse_messages(&content)
            .with_context(|| format!("parsing messages in {}", self.path.display()))?;
        Ok(all
            .into_iter()
            .filter(|m| m.point().map(|p| bbox.contains(p)).unwrap_or(true))
            .collect())
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

#[derive(Deserialize)]
struct SeedRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    screen_name: Option<String>,
    text: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    coordinates: Option<SeedCoordinates>,
}

#[derive(Deserialize)]
struct SeedCoordinates {
    coordinates: Vec<f64>,
}

/// Parse either accepted JSON shape.
pub fn parse_messages(s: &str) -> Result<Vec<GeoTaggedMessage>> {
    if let Ok(v) = serde_json::from_str::<Vec<GeoTaggedMessage>>(s) {
        return Ok(v);
    }
    let records: Vec<SeedRecord> =
        serde_json::from_str(s).map_err(|e| anyhow!("unsupported message format: {e}"))?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| seed_to_message(i, r))
        .collect()
}

fn seed_to_message(index: usize, r: SeedRecord) -> Result<GeoTaggedMessage> {
    let id = match r.id {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => index.to_string(),
    };
    let (longitude, latitude) = match r.coordinates.as_ref().map(|c| c.coordinates.as_slice()) {
        Some([lon, lat, ..]) => (*lon, *lat),
        _ => return Err(InputError::MissingCoordinates { id }.into()),
    };
    let created_at = match r.created_at.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            let naive = NaiveDateTime::parse_from_str(raw, SEED_TIME_FORMAT)
                .with_context(|| format!("record {index}: bad created_at `{raw}`"))?;
            Some(Utc.from_utc_datetime(&naive))
        }
    };
    Ok(GeoTaggedMessage {
        id,
        author: r.screen_name.unwrap_or_default(),
        text: r.text,
        longitude,
        latitude,
        created_at,
    })
}
