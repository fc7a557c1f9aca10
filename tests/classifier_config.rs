// tests/classifier_config.rs
//
// Config resolution order (env path, config/*.toml, config/*.json, defaults),
// env overrides and validation. Tests touch process env and CWD, so they
// run serially.

use std::{env, fs, path::PathBuf};

use serial_test::serial;
use tweet_city_classifier::config::classifier::{
    ENV_CLASSIFIER_CONFIG_PATH, ENV_MAX_DISTANCE_KM, ENV_MESSAGES_PATH,
};
use tweet_city_classifier::config::{messages_path, CacheBackend, ClassifierConfig};

/// Runs `f` inside a fresh temp CWD with the classifier env vars cleared.
fn in_temp_cwd<F: FnOnce(&std::path::Path)>(f: F) {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CLASSIFIER_CONFIG_PATH);
    env::remove_var(ENV_MAX_DISTANCE_KM);
    env::remove_var(ENV_MESSAGES_PATH);

    f(tmp.path());

    env::remove_var(ENV_CLASSIFIER_CONFIG_PATH);
    env::remove_var(ENV_MAX_DISTANCE_KM);
    env::remove_var(ENV_MESSAGES_PATH);
    env::set_current_dir(&old).unwrap();
}

#[serial]
#[test]
fn defaults_when_nothing_is_configured() {
    in_temp_cwd(|_| {
        let cfg = ClassifierConfig::load_default().unwrap();
        assert_eq!(cfg, ClassifierConfig::default());
        assert_eq!(cfg.max_distance_km, 240.0);
        assert_eq!(cfg.top_k_features, 30);
        assert_eq!(cfg.explain_top_k, 5);
        assert!(cfg.use_stopwords);
        assert_eq!(cfg.cache.backend, CacheBackend::Memory);
        assert_eq!(messages_path(), PathBuf::from("data/tweets.json"));
    });
}

#[serial]
#[test]
fn toml_file_wins_over_json_file() {
    in_temp_cwd(|root| {
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(
            root.join("config/classifier.toml"),
            r#"
top_k_features = 12
use_stopwords = false

[[cities]]
name = "Portland"
longitude = -122.68
latitude = 45.52

[[cities]]
name = "Denver"
longitude = -104.99
latitude = 39.74
"#,
        )
        .unwrap();
        fs::write(root.join("config/classifier.json"), r#"{"top_k_features": 3}"#).unwrap();

        let cfg = ClassifierConfig::load_default().unwrap();
        assert_eq!(cfg.top_k_features, 12);
        assert!(!cfg.use_stopwords);
        assert_eq!(cfg.city_list().unwrap().names(), vec!["Portland", "Denver"]);

        fs::remove_file(root.join("config/classifier.toml")).unwrap();
        let cfg = ClassifierConfig::load_default().unwrap();
        assert_eq!(cfg.top_k_features, 3);
    });
}

#[serial]
#[test]
fn env_path_takes_precedence_and_must_exist() {
    in_temp_cwd(|root| {
        let p = root.join("custom.json");
        fs::write(
            &p,
            r#"{"explain_top_k": 2, "cache": {"backend": "file", "dir": "tmp/cache"}}"#,
        )
        .unwrap();
        env::set_var(ENV_CLASSIFIER_CONFIG_PATH, p.display().to_string());
        let cfg = ClassifierConfig::load_default().unwrap();
        assert_eq!(cfg.explain_top_k, 2);
        assert_eq!(cfg.cache.backend, CacheBackend::File);
        assert_eq!(cfg.cache.dir, PathBuf::from("tmp/cache"));

        env::set_var(ENV_CLASSIFIER_CONFIG_PATH, root.join("missing.toml").display().to_string());
        assert!(ClassifierConfig::load_default().is_err());
    });
}

#[serial]
#[test]
fn distance_env_overrides_file_value() {
    in_temp_cwd(|root| {
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/classifier.toml"), "max_distance_km = 100.0\n").unwrap();

        let cfg = ClassifierConfig::load_default().unwrap();
        assert_eq!(cfg.max_distance_km, 100.0);

        env::set_var(ENV_MAX_DISTANCE_KM, "160.9");
        assert_eq!(ClassifierConfig::load_default().unwrap().max_distance_km, 160.9);

        // Nonsense is ignored rather than coerced.
        env::set_var(ENV_MAX_DISTANCE_KM, "-5");
        assert_eq!(ClassifierConfig::load_default().unwrap().max_distance_km, 100.0);
    });
}

#[serial]
#[test]
fn invalid_file_is_an_error() {
    in_temp_cwd(|root| {
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/classifier.toml"), "max_distance_km = 0.0\n").unwrap();
        assert!(ClassifierConfig::load_default().is_err());

        fs::write(
            root.join("config/classifier.toml"),
            r#"
[[cities]]
name = "A"
longitude = 0.0
latitude = 0.0

[[cities]]
name = " a "
longitude = 1.0
latitude = 1.0
"#,
        )
        .unwrap();
        assert!(ClassifierConfig::load_default().is_err());

        fs::write(root.join("config/classifier.toml"), "top_k_features = \"many\"\n").unwrap();
        assert!(ClassifierConfig::load_default().is_err());
    });
}

#[serial]
#[test]
fn cache_backend_builds() {
    in_temp_cwd(|root| {
        let mut cfg = ClassifierConfig::default();
        cfg.cache.backend = CacheBackend::File;
        cfg.cache.dir = root.join("derived");
        let cache = cfg.cache.build().unwrap();
        assert_eq!(cache.store_name(), "file");
        assert!(root.join("derived").is_dir());

        cfg.cache.backend = CacheBackend::None;
        assert!(!cfg.cache.build().unwrap().is_enabled());

        env::set_var(ENV_MESSAGES_PATH, "fixtures/seed.json");
        assert_eq!(messages_path(), PathBuf::from("fixtures/seed.json"));
    });
}
