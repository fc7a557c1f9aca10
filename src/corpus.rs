//! # Corpus Builder
//! Per-city token statistics derived from assigned tweets:
//! - `word_counts`: every token occurrence (raw corpus)
//! - `doc_counts`: number of tweets containing the token at least once
//!
//! Cities are independent shards, so the batch build fans out over cities
//! with rayon and merges by key. Everything here is a pure function of the
//! city assignment and can be cached by the snapshot key.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geo::{CityGroups, CityList};
use crate::ingest::types::GeoTaggedMessage;
use crate::tokenize::tokenize;

pub type TokenCounts = HashMap<String, u64>;

/// Token statistics for one city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityCorpus {
    pub city: String,
    pub message_count: u64,
    pub total_tokens: u64,
    pub word_counts: TokenCounts,
    pub doc_counts: TokenCounts,
}

impl CityCorpus {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            ..Self::default()
        }
    }

    /// Tokenize and add one message.
    pub fn add_message(&mut self, text: &str) {
        self.add_tokens(&tokenize(text));
    }

    /// Add one already-tokenized message.
    pub fn add_tokens(&mut self, tokens: &[String]) {
        self.message_count += 1;
        let mut seen: HashSet<&str> = HashSet::with_capacity(tokens.len());
        for t in tokens {
            *self.word_counts.entry(t.clone()).or_insert(0) += 1;
            self.total_tokens += 1;
            if seen.insert(t.as_str()) {
                *self.doc_counts.entry(t.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Element-wise sum with a corpus built from a disjoint message set.
    pub fn merge(&mut self, other: &CityCorpus) {
        self.message_count += other.message_count;
        self.total_tokens += other.total_tokens;
        for (w, c) in &other.word_counts {
            *self.word_counts.entry(w.clone()).or_insert(0) += c;
        }
        for (w, c) in &other.doc_counts {
            *self.doc_counts.entry(w.clone()).or_insert(0) += c;
        }
    }

    pub fn word_count(&self, word: &str) -> u64 {
        self.word_counts.get(word).copied().unwrap_or(0)
    }

    pub fn doc_count(&self, word: &str) -> u64 {
        self.doc_counts.get(word).copied().unwrap_or(0)
    }

    /// Number of distinct tokens.
    pub fn vocabulary_size(&self) -> usize {
        self.word_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_counts.is_empty()
    }
}

fn city_corpus(city: &str, messages: &[&GeoTaggedMessage]) -> CityCorpus {
    let mut corpus = CityCorpus::new(city);
    for m in messages {
        corpus.add_message(&m.text);
    }
    corpus
}

fn build_all(groups: &CityGroups<'_>) -> Vec<CityCorpus> {
    groups
        .par_iter()
        .map(|(city, msgs)| city_corpus(city, msgs))
        .collect()
}

/// City -> token -> occurrence count.
pub fn build_corpus(groups: &CityGroups<'_>) -> HashMap<String, TokenCounts> {
    build_all(groups)
        .into_iter()
        .map(|c| (c.city, c.word_counts))
        .collect()
}

/// City -> token -> number of messages containing the token.
pub fn build_doc_corpus(groups: &CityGroups<'_>) -> HashMap<String, TokenCounts> {
    build_all(groups)
        .into_iter()
        .map(|c| (c.city, c.doc_counts))
        .collect()
}

/// One corpus per configured city, in canonical city order, plus the
/// cross-city aggregates MI needs.
///
/// Serialized as the plain corpus array; aggregates are rebuilt on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CityCorpus>", into = "Vec<CityCorpus>")]
pub struct CorpusSet {
    corpora: Vec<CityCorpus>,
    total_messages: u64,
    /// token -> messages containing it, over all cities (N1.)
    messages_with_word: TokenCounts,
}

impl From<Vec<CityCorpus>> for CorpusSet {
    fn from(corpora: Vec<CityCorpus>) -> Self {
        let total_messages = corpora.iter().map(|c| c.message_count).sum();
        let mut messages_with_word = TokenCounts::new();
        for c in &corpora {
            for (w, n) in &c.doc_counts {
                *messages_with_word.entry(w.clone()).or_insert(0) += n;
            }
        }
        Self {
            corpora,
            total_messages,
            messages_with_word,
        }
    }
}

impl From<CorpusSet> for Vec<CityCorpus> {
    fn from(set: CorpusSet) -> Self {
        set.corpora
    }
}

impl CorpusSet {
    /// Build from grouped messages. Every configured city gets a corpus,
    /// empty when nothing was assigned to it.
    pub fn build(cities: &CityList, groups: &CityGroups<'_>) -> Self {
        let corpora: Vec<CityCorpus> = cities
            .as_slice()
            .par_iter()
            .map(|city| match groups.get(&city.name) {
                Some(msgs) => city_corpus(&city.name, msgs),
                None => CityCorpus::new(city.name.clone()),
            })
            .collect();
        Self::from(corpora)
    }

    pub fn get(&self, city: &str) -> Option<&CityCorpus> {
        self.corpora.iter().find(|c| c.city == city)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CityCorpus> {
        self.corpora.iter()
    }

    pub fn len(&self) -> usize {
        self.corpora.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpora.is_empty()
    }

    /// N: all assigned messages.
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    /// Messages (any city) containing `word`.
    pub fn messages_with_word(&self, word: &str) -> u64 {
        self.messages_with_word.get(word).copied().unwrap_or(0)
    }

    /// Size of the union vocabulary.
    pub fn global_vocabulary_size(&self) -> usize {
        self.messages_with_word.len()
    }
}
