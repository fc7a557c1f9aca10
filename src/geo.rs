//! # Geo-Assignment
//! Maps each geotagged tweet to its nearest reference city, provided that city
//! lies within `max_distance_km` (great-circle distance).
//!
//! Distances are haversine over (longitude, latitude) in degrees with a mean
//! earth radius of 6371 km. Never compare raw degrees: a degree of longitude
//! is much shorter than a degree of latitude at US latitudes.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::error::InputError;
use crate::ingest::types::GeoTaggedMessage;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// 150 miles.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 240.0;

/// A (longitude, latitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Finite and inside [-180, 180] x [-90, 90].
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Axis-aligned box with exclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    pub const CONTINENTAL_US: BoundingBox = BoundingBox {
        lon_min: -125.0,
        lon_max: -65.0,
        lat_min: 25.0,
        lat_max: 50.0,
    };

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.longitude > self.lon_min
            && p.longitude < self.lon_max
            && p.latitude > self.lat_min
            && p.latitude < self.lat_max
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::CONTINENTAL_US
    }
}

/// Immutable reference city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCity {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReferenceCity {
    pub fn new(name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

/// Validated, ordered list of reference cities. Order is canonical: it breaks
/// distance ties and score ties everywhere downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityList {
    cities: Vec<ReferenceCity>,
}

impl CityList {
    /// Rejects an empty list, blank or duplicate names (case-insensitive) and
    /// non-finite coordinates.
    pub fn new(cities: Vec<ReferenceCity>) -> Result<Self, InputError> {
        if cities.is_empty() {
            return Err(InputError::InvalidCityList("no cities configured".into()));
        }
        let mut seen = HashSet::new();
        for c in &cities {
            let key = c.name.trim().to_lowercase();
            if key.is_empty() {
                return Err(InputError::InvalidCityList("blank city name".into()));
            }
            if !seen.insert(key) {
                return Err(InputError::InvalidCityList(format!(
                    "duplicate city name `{}`",
                    c.name
                )));
            }
            if !c.longitude.is_finite() || !c.latitude.is_finite() {
                return Err(InputError::InvalidCityList(format!(
                    "city `{}` has non-finite coordinates",
                    c.name
                )));
            }
        }
        Ok(Self { cities })
    }

    /// Nine major US metros.
    pub fn us_default() -> Self {
        let cities = [
            ("Los Angeles", -118.2436, 34.0522),
            ("San Francisco", -122.4194, 37.7749),
            ("Houston", -95.3698, 29.7604),
            ("Miami", -80.2264, 25.7889),
            ("Atlanta", -84.3879, 33.7490),
            ("New York", -74.0060, 40.7128),
            ("Chicago", -87.6298, 41.8781),
            ("Seattle", -122.3321, 47.6062),
            ("Boston", -71.0589, 42.3601),
        ]
        .into_iter()
        .map(|(name, lon, lat)| ReferenceCity::new(name, lon, lat))
        .collect();
        Self { cities }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceCity> {
        self.cities.iter()
    }

    pub fn as_slice(&self) -> &[ReferenceCity] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cities.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case-insensitive lookup, also accepting `_` for spaces ("new_york").
    pub fn resolve(&self, name: &str) -> Option<&ReferenceCity> {
        let wanted = name.trim().replace('_', " ");
        self.cities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&wanted))
    }

    /// Like [`resolve`](Self::resolve) but yields `UnknownCity` on a miss.
    pub fn require(&self, name: &str) -> Result<&ReferenceCity, InputError> {
        self.resolve(name)
            .ok_or_else(|| InputError::UnknownCity(name.to_string()))
    }

    /// Closest configured name by normalized Levenshtein similarity.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let q = name.trim().to_lowercase();
        self.cities
            .iter()
            .map(|c| (c, normalized_levenshtein(&q, &c.name.to_lowercase())))
            .filter(|(_, sim)| *sim >= 0.5)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c.name.as_str())
    }
}

/// Tweets grouped by assigned city, input order preserved within each city.
/// Cities without any assigned tweet are absent.
pub type CityGroups<'m> = BTreeMap<String, Vec<&'m GeoTaggedMessage>>;

/// Nearest-city assignment with a distance cutoff.
#[derive(Debug, Clone)]
pub struct GeoAssigner {
    cities: Arc<CityList>,
    max_distance_km: f64,
}

impl GeoAssigner {
    pub fn new(cities: Arc<CityList>, max_distance_km: f64) -> Result<Self, InputError> {
        if !max_distance_km.is_finite() || max_distance_km <= 0.0 {
            return Err(InputError::InvalidConfig(format!(
                "max_distance_km must be positive, got {max_distance_km}"
            )));
        }
        Ok(Self {
            cities,
            max_distance_km,
        })
    }

    pub fn cities(&self) -> &CityList {
        &self.cities
    }

    pub fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }

    /// Nearest city index and its distance. First city wins exact ties.
    fn nearest(&self, p: GeoPoint) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, city) in self.cities.iter().enumerate() {
            let d = haversine_km(city.point(), p);
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((i, d)),
            }
        }
        best
    }

    fn assign_index(&self, p: GeoPoint) -> Option<usize> {
        self.nearest(p)
            .filter(|(_, d)| *d <= self.max_distance_km)
            .map(|(i, _)| i)
    }

    /// Assign a validated point.
    pub fn assign_point(&self, p: GeoPoint) -> Option<&ReferenceCity> {
        self.assign_index(p).and_then(|i| self.cities.cities.get(i))
    }

    /// Nearest city within the cutoff, `Ok(None)` when every city is too far.
    pub fn assign_city(
        &self,
        message: &GeoTaggedMessage,
    ) -> Result<Option<&ReferenceCity>, InputError> {
        let p = message.point()?;
        Ok(self.assign_point(p))
    }

    /// Assign every message and group by city name; unassigned messages are
    /// dropped. Fails on the first message with invalid coordinates.
    pub fn group_by_city<'m>(
        &self,
        messages: &'m [GeoTaggedMessage],
    ) -> Result<CityGroups<'m>, InputError> {
        let assigned: Vec<Option<usize>> = messages
            .par_iter()
            .map(|m| m.point().map(|p| self.assign_index(p)))
            .collect::<Result<_, _>>()?;

        let mut groups: CityGroups<'m> = BTreeMap::new();
        for (msg, idx) in messages.iter().zip(assigned) {
            if let Some(city) = idx.and_then(|i| self.cities.cities.get(i)) {
                groups.entry(city.name.clone()).or_default().push(msg);
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, lon: f64, lat: f64) -> GeoTaggedMessage {
        GeoTaggedMessage::new(id, "hello", lon, lat)
    }

    #[test]
    fn haversine_known_distance() {
        // LA -> NYC is roughly 3936 km.
        let la = GeoPoint::new(-118.2436, 34.0522);
        let ny = GeoPoint::new(-74.0060, 40.7128);
        let d = haversine_km(la, ny);
        assert!((d - 3936.0).abs() < 15.0, "got {d}");
        assert_eq!(haversine_km(la, la), 0.0);
    }

    #[test]
    fn ties_go_to_first_city() {
        let cities = CityList::new(vec![
            ReferenceCity::new("West", -1.0, 0.0),
            ReferenceCity::new("East", 1.0, 0.0),
        ])
        .unwrap();
        let a = GeoAssigner::new(Arc::new(cities), 500.0).unwrap();
        let c = a.assign_city(&msg("1", 0.0, 0.0)).unwrap().unwrap();
        assert_eq!(c.name, "West");
    }

    #[test]
    fn rejects_bad_city_lists() {
        assert!(CityList::new(vec![]).is_err());
        let dup = vec![
            ReferenceCity::new("Miami", 0.0, 0.0),
            ReferenceCity::new("miami", 1.0, 1.0),
        ];
        assert!(matches!(
            CityList::new(dup),
            Err(InputError::InvalidCityList(_))
        ));
        let nan = vec![ReferenceCity::new("X", f64::NAN, 0.0)];
        assert!(CityList::new(nan).is_err());
    }

    #[test]
    fn resolve_and_suggest() {
        let cl = CityList::us_default();
        assert_eq!(cl.resolve("new_york").unwrap().name, "New York");
        assert_eq!(cl.resolve("BOSTON").unwrap().name, "Boston");
        assert!(cl.resolve("Denver").is_none());
        assert_eq!(cl.suggest("Bostn"), Some("Boston"));
        assert_eq!(cl.suggest("zzzzzzzzzzzz"), None);
    }

    #[test]
    fn invalid_coordinates_are_rejected_not_coerced() {
        let a = GeoAssigner::new(Arc::new(CityList::us_default()), 240.0).unwrap();
        let bad = msg("7", f64::NAN, 40.0);
        assert!(matches!(
            a.assign_city(&bad),
            Err(InputError::CoordinateOutOfRange { .. })
        ));
        let msgs = vec![msg("1", -74.0, 40.7), bad];
        assert!(a.group_by_city(&msgs).is_err());
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let cl = Arc::new(CityList::us_default());
        assert!(GeoAssigner::new(cl.clone(), 0.0).is_err());
        assert!(GeoAssigner::new(cl, f64::INFINITY).is_err());
    }
}
