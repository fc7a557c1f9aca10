// tests/feature_ranking.rs
//
// Mutual-information ranking over small hand-built populations.

use tweet_city_classifier::corpus::{CityCorpus, CorpusSet};
use tweet_city_classifier::features::{
    included_features, mutual_information, Contingency, FeatureRanker, IncludedFeature, MiScore,
};
use tweet_city_classifier::StopWords;

fn corpus(city: &str, messages: &[&str]) -> CityCorpus {
    let mut c = CityCorpus::new(city);
    for m in messages {
        c.add_message(m);
    }
    c
}

fn population() -> CorpusSet {
    CorpusSet::from(vec![
        corpus(
            "Miami",
            &[
                "lol beach day with the crew",
                "lol beach and sun all day",
                "lol sun is out, heat is on",
                "lol cuban coffee then beach",
            ],
        ),
        corpus(
            "Boston",
            &[
                "lol snow again on the pike",
                "lol chowder and snow",
                "lol wicked cold day",
            ],
        ),
        corpus(
            "Seattle",
            &["lol rain rain rain", "lol coffee in the rain", "lol ferry day"],
        ),
    ])
}

#[test]
fn contingency_cells_sum_to_population() {
    let set = population();
    for city in ["Miami", "Boston", "Seattle"] {
        for word in ["lol", "beach", "day", "coffee", "rain", "nope"] {
            let c = Contingency::for_word(&set, city, word);
            assert_eq!(c.total(), set.total_messages(), "{city}/{word}");
        }
    }
    let c = Contingency::for_word(&set, "Miami", "coffee");
    assert_eq!(
        c,
        Contingency {
            n11: 1,
            n10: 1,
            n01: 3,
            n00: 5
        }
    );
}

#[test]
fn ubiquitous_word_has_zero_mi_and_is_never_a_feature() {
    let set = population();
    let sw = StopWords::none();
    let ranker = FeatureRanker::new(&set, &sw);
    for city in ["Miami", "Boston", "Seattle"] {
        assert_eq!(ranker.score(city, "lol"), MiScore::Defined(0.0));
        assert!(!ranker.rank_features(city).contains(&"lol".to_string()));
    }
}

#[test]
fn word_absent_from_city_scores_negative_infinity() {
    let set = population();
    let sw = StopWords::none();
    let ranker = FeatureRanker::new(&set, &sw);
    assert_eq!(ranker.score("Boston", "beach"), MiScore::NegativeInfinity);
    assert_eq!(
        mutual_information(&Contingency::for_word(&set, "Seattle", "snow")),
        MiScore::NegativeInfinity
    );
}

#[test]
fn ranking_is_bounded_ordered_and_stopword_free() {
    let set = population();
    let sw = StopWords::feature_default();
    let ranker = FeatureRanker::new(&set, &sw).with_top_k(4);

    let miami = ranker.rank_features("Miami");
    assert!(miami.len() <= 4);
    assert_eq!(miami[0], "beach");
    for w in &miami {
        assert!(!sw.contains(w), "stop-word {w} in ranking");
    }
    let scores: Vec<f64> = miami.iter().map(|w| ranker.score("Miami", w).value()).collect();
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1], "{scores:?}");
    }

    // "the" appears in every city and is a stop-word either way.
    let full = FeatureRanker::new(&set, &sw).rank_features("Boston");
    assert!(!full.contains(&"the".to_string()));
    assert!(full.contains(&"snow".to_string()));
}

#[test]
fn equal_scores_are_ordered_alphabetically() {
    // chowder, cold, pike, wicked each occur in exactly one Boston message
    // and nowhere else, so they tie.
    let set = population();
    let sw = StopWords::feature_default();
    let ranked = FeatureRanker::new(&set, &sw).rank_features("Boston");
    let singles: Vec<&str> = ranked
        .iter()
        .map(String::as_str)
        .filter(|w| ["chowder", "cold", "pike", "wicked"].contains(w))
        .collect();
    assert_eq!(singles, vec!["chowder", "cold", "pike", "wicked"]);
}

#[test]
fn top_words_explain_only_with_city_vocabulary() {
    let set = population();
    let sw = StopWords::feature_default();
    let ranker = FeatureRanker::new(&set, &sw).with_explain_k(2);

    let words = ranker.top_words_in_text("Miami", "Beach beach SUN snow lol the");
    assert_eq!(words, vec!["beach", "sun"]);

    let all = FeatureRanker::new(&set, &sw).top_words_in_text("Miami", "snow chowder pike");
    assert!(all.is_empty());
}

#[test]
fn included_features_use_one_based_positions() {
    let set = population();
    let sw = StopWords::feature_default();
    let ranking = FeatureRanker::new(&set, &sw).rank_features("Seattle");
    assert_eq!(ranking[0], "rain");

    let included = included_features(&ranking, "more RAIN today");
    assert_eq!(
        included,
        vec![IncludedFeature {
            word: "rain".into(),
            rank: 1
        }]
    );
}
