// tests/ingest_filter.rs
//
// Store adapters + the core's own retweet / bounding-box filtering.

use std::fs;

use tweet_city_classifier::geo::BoundingBox;
use tweet_city_classifier::ingest::store::{JsonFileStore, MemoryStore};
use tweet_city_classifier::ingest::{filter_messages, run_once, FilterStats};
use tweet_city_classifier::{GeoTaggedMessage, InputError, MessageStore};

const SEED: &str = r#"[
  {"screen_name": "sunny", "text": "Beach all day", "created_at": "2013-07-04T15:00:00",
   "coordinates": {"type": "Point", "coordinates": [-80.19, 25.77]}},
  {"screen_name": "bot", "text": "RT @sunny: Beach all day",
   "coordinates": {"type": "Point", "coordinates": [-80.19, 25.77]}},
  {"screen_name": "abroad", "text": "Guten Tag",
   "coordinates": {"type": "Point", "coordinates": [13.40, 52.52]}},
  {"id": 99, "screen_name": "chilly", "text": "snow again",
   "coordinates": {"type": "Point", "coordinates": [-71.06, 42.36]}}
]"#;

#[tokio::test]
async fn json_file_store_reads_seed_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tweets.json");
    fs::write(&path, SEED).unwrap();

    let store = JsonFileStore::new(&path);
    let msgs = store
        .fetch_messages(&BoundingBox::CONTINENTAL_US)
        .await
        .unwrap();
    // Berlin is outside the box; the retweet is left for the core filter.
    let ids: Vec<&str> = msgs.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "99"]);
    assert_eq!(msgs[0].author, "sunny");
    assert!(msgs[1].is_retweet());
}

#[tokio::test]
async fn run_once_applies_core_filters_even_after_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tweets.json");
    fs::write(&path, SEED).unwrap();

    let store = JsonFileStore::new(&path);
    let (kept, stats) = run_once(&store, &BoundingBox::CONTINENTAL_US).await.unwrap();
    let texts: Vec<&str> = kept.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["Beach all day", "snow again"]);
    assert_eq!(
        stats,
        FilterStats {
            kept: 2,
            retweets: 1,
            out_of_bounds: 0,
            invalid: 0
        }
    );
}

#[tokio::test]
async fn missing_file_is_an_error() {
    let store = JsonFileStore::new("definitely/not/here.json");
    let err = run_once(&store, &BoundingBox::CONTINENTAL_US).await.unwrap_err();
    assert!(format!("{err:#}").contains("definitely/not/here.json"));
}

#[tokio::test]
async fn record_without_coordinates_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"[{"screen_name": "x", "text": "where am i"}]"#).unwrap();

    let err = JsonFileStore::new(&path)
        .fetch_messages(&BoundingBox::CONTINENTAL_US)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InputError>(),
        Some(InputError::MissingCoordinates { .. })
    ));
}

#[tokio::test]
async fn memory_store_passes_invalid_points_to_the_core() {
    let store = MemoryStore::new(vec![
        GeoTaggedMessage::new("ok", "pizza", -87.6, 41.9),
        GeoTaggedMessage::new("nan", "broken", f64::NAN, 41.9),
        GeoTaggedMessage::new("far", "hello", 151.2, -33.9),
    ]);
    let (kept, stats) = run_once(&store, &BoundingBox::CONTINENTAL_US).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(stats.invalid, 1);
    assert_eq!(stats.out_of_bounds, 0);
}

#[test]
fn custom_bounding_box_is_respected() {
    let bbox = BoundingBox {
        lon_min: -90.0,
        lon_max: -70.0,
        lat_min: 35.0,
        lat_max: 45.0,
    };
    let (kept, stats) = filter_messages(
        vec![
            GeoTaggedMessage::new("chi", "x", -87.6, 41.9),
            GeoTaggedMessage::new("la", "x", -118.2, 34.0),
            GeoTaggedMessage::new("edge", "x", -70.0, 40.0),
        ],
        &bbox,
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, "chi");
    assert_eq!(stats.out_of_bounds, 2);
}
