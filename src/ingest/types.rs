// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::InputError;
use crate::geo::{BoundingBox, GeoPoint};

/// Retweets start with this marker and are excluded from every aggregate.
pub const RETWEET_MARKER: &str = "RT";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct GeoTaggedMessage {
    pub id: String,
    #[serde(default)]
    pub author: String,
    pub text: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl GeoTaggedMessage {
    /// Minimal constructor (no author/timestamp), handy for fixtures.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        longitude: f64,
        latitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            author: String::new(),
            text: text.into(),
            longitude,
            latitude,
            created_at: None,
        }
    }

    /// Validated coordinates of this message.
    pub fn point(&self) -> Result<GeoPoint, InputError> {
        let p = GeoPoint::new(self.longitude, self.latitude);
        if p.is_valid() {
            Ok(p)
        } else {
            Err(InputError::CoordinateOutOfRange {
                id: self.id.clone(),
                longitude: self.longitude,
                latitude: self.latitude,
            })
        }
    }

    pub fn is_retweet(&self) -> bool {
        self.text.starts_with(RETWEET_MARKER)
    }
}

/// Source of the raw message population. Implementations may pre-filter by
/// `bbox`, but the core re-applies the box and the retweet rule itself.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn fetch_messages(&self, bbox: &BoundingBox) -> Result<Vec<GeoTaggedMessage>>;
    fn name(&self) -> &'static str;
}
