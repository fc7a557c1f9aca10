pub mod classifier;

pub use classifier::{messages_path, CacheBackend, CacheConfig, ClassifierConfig};
