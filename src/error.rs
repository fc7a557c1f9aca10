//! Error types shared by the classification core.
//!
//! `InputError` is the only error the core raises to callers: everything else
//! (unassigned tweets, empty vocabularies, zero contingency cells, cache
//! outages) is absorbed into well-defined outputs.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("message {id} has no coordinates")]
    MissingCoordinates { id: String },

    #[error("message {id} has out-of-range coordinates (lon {longitude}, lat {latitude})")]
    CoordinateOutOfRange {
        id: String,
        longitude: f64,
        latitude: f64,
    },

    #[error("text is empty")]
    EmptyText,

    #[error("unknown city: {0}")]
    UnknownCity(String),

    #[error("invalid city list: {0}")]
    InvalidCityList(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl InputError {
    /// Short machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            InputError::MissingCoordinates { .. } => "missing_coordinates",
            InputError::CoordinateOutOfRange { .. } => "coordinate_out_of_range",
            InputError::EmptyText => "empty_text",
            InputError::UnknownCity(_) => "unknown_city",
            InputError::InvalidCityList(_) => "invalid_city_list",
            InputError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Failure inside a derived-data store. Never fatal: callers recompute.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache blob (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
