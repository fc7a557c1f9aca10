//! # Naive-Bayes city classifier
//!
//! score(city, text) = ln P(city) + Σ ln P(word | city) over the text's tokens
//! (stop-words optionally skipped).
//!
//! - P(word | city) = (count(word, city) + 1) / (total_tokens(city) + vocab(city))
//!   Add-one smoothing over the *city's own* vocabulary size, not the global one.
//! - Words absent from a city's corpus get the same formula with count 0, so
//!   unseen vocabulary never zeroes a score.
//! - Scores are relative log-likelihoods, not normalized probabilities.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::corpus::{CityCorpus, CorpusSet};
use crate::tokenize::{tokenize, StopWords};

/// How the city priors were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorPolicy {
    /// n_city / N; used when every city has at least one message.
    Observed,
    /// (n_city + 1) / (N + K); used when some city has no messages, which
    /// floors it at 1 / (N + K) and keeps the priors summing to 1.
    AddOne,
}

/// Prior and smoothed word likelihoods of one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityLikelihood {
    pub city: String,
    pub prior: f64,
    /// Likelihood of any word missing from `word_probs`.
    pub unseen: f64,
    pub word_probs: HashMap<String, f64>,
}

impl CityLikelihood {
    #[inline]
    pub fn likelihood(&self, word: &str) -> f64 {
        self.word_probs.get(word).copied().unwrap_or(self.unseen)
    }
}

/// A city and its relative log score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityScore {
    pub city: String,
    pub score: f64,
}

/// Trained word-city probability table, one entry per configured city in
/// canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    cities: Vec<CityLikelihood>,
    prior_policy: PriorPolicy,
}

fn smoothing_denominator(c: &CityCorpus) -> u64 {
    c.total_tokens + c.vocabulary_size() as u64
}

impl NaiveBayesModel {
    pub fn train(corpora: &CorpusSet) -> Self {
        let k = corpora.len() as f64;
        let n = corpora.total_messages() as f64;

        let prior_policy = if corpora.iter().all(|c| c.message_count > 0) {
            PriorPolicy::Observed
        } else {
            PriorPolicy::AddOne
        };

        // Cities with an empty vocabulary fall back to the smallest
        // unseen-word likelihood among populated cities.
        let empty_floor = corpora
            .iter()
            .map(smoothing_denominator)
            .filter(|d| *d > 0)
            .map(|d| 1.0 / d as f64)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
            .unwrap_or(1.0);

        let cities = corpora
            .iter()
            .map(|c| {
                let prior = match prior_policy {
                    PriorPolicy::Observed => c.message_count as f64 / n,
                    PriorPolicy::AddOne => (c.message_count as f64 + 1.0) / (n + k),
                };
                let denom = smoothing_denominator(c);
                let (unseen, word_probs) = if denom == 0 {
                    (empty_floor, HashMap::new())
                } else {
                    let d = denom as f64;
                    let probs = c
                        .word_counts
                        .iter()
                        .map(|(w, cnt)| (w.clone(), (*cnt as f64 + 1.0) / d))
                        .collect();
                    (1.0 / d, probs)
                };
                CityLikelihood {
                    city: c.city.clone(),
                    prior,
                    unseen,
                    word_probs,
                }
            })
            .collect();

        Self {
            cities,
            prior_policy,
        }
    }

    pub fn prior_policy(&self) -> PriorPolicy {
        self.prior_policy
    }

    pub fn cities(&self) -> &[CityLikelihood] {
        &self.cities
    }

    pub fn city(&self, name: &str) -> Option<&CityLikelihood> {
        self.cities.iter().find(|c| c.city == name)
    }

    /// P(city).
    pub fn prior(&self, city: &str) -> Option<f64> {
        self.city(city).map(|c| c.prior)
    }

    /// P(word | city), smoothed.
    pub fn likelihood(&self, city: &str, word: &str) -> Option<f64> {
        self.city(city).map(|c| c.likelihood(word))
    }

    fn score_tokens(
        city: &CityLikelihood,
        tokens: &[String],
        stopwords: Option<&StopWords>,
    ) -> f64 {
        tokens
            .iter()
            .filter(|t| stopwords.map_or(true, |sw| !sw.contains(t)))
            .fold(city.prior.ln(), |acc, t| acc + city.likelihood(t).ln())
    }

    /// Relative log score of `text` for one city.
    pub fn score(&self, city: &str, text: &str, stopwords: Option<&StopWords>) -> Option<f64> {
        let tokens = tokenize(text);
        self.city(city)
            .map(|c| Self::score_tokens(c, &tokens, stopwords))
    }

    /// All cities by descending score. Equal scores keep canonical city order.
    pub fn rank(&self, text: &str, stopwords: Option<&StopWords>) -> Vec<CityScore> {
        let tokens = tokenize(text);
        let mut out: Vec<CityScore> = self
            .cities
            .iter()
            .map(|c| CityScore {
                city: c.city.clone(),
                score: Self::score_tokens(c, &tokens, stopwords),
            })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out
    }
}
