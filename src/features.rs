//! # Feature Ranker
//! Mutual information between "tweet contains word" and "tweet belongs to
//! city", computed from a 2x2 contingency table over all assigned tweets:
//!
//! |               | in city | not in city |
//! |---------------|---------|-------------|
//! | has word      | N11     | N10         |
//! | lacks word    | N01     | N00         |
//!
//! A cell equal to zero contributes 0 to the sum (the 0·log 0 limit). A word
//! never seen in the city (N11 = 0) scores negative infinity.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::corpus::CorpusSet;
use crate::tokenize::{distinct_tokens, StopWords};

pub const DEFAULT_TOP_K: usize = 30;
pub const DEFAULT_EXPLAIN_K: usize = 5;

/// Message counts for one (word, city) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingency {
    pub n11: u64,
    pub n10: u64,
    pub n01: u64,
    pub n00: u64,
}

impl Contingency {
    pub fn total(&self) -> u64 {
        self.n11 + self.n10 + self.n01 + self.n00
    }

    /// Counts for `word` vs `city`. The city must exist in `corpora`;
    /// an unknown city behaves like an empty one.
    pub fn for_word(corpora: &CorpusSet, city: &str, word: &str) -> Self {
        let (in_city, n11) = corpora
            .get(city)
            .map(|c| (c.message_count, c.doc_count(word)))
            .unwrap_or((0, 0));
        let n = corpora.total_messages();
        let with_word = corpora.messages_with_word(word);
        let n10 = with_word - n11;
        let n01 = in_city - n11;
        let n00 = n - in_city - n10;
        Self { n11, n10, n01, n00 }
    }
}

/// MI value; `NegativeInfinity` marks a word absent from the city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MiScore {
    Defined(f64),
    NegativeInfinity,
}

impl MiScore {
    pub fn value(&self) -> f64 {
        match self {
            MiScore::Defined(v) => *v,
            MiScore::NegativeInfinity => f64::NEG_INFINITY,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MiScore::Defined(_))
    }

    /// Strictly positive: the word tells something about the city.
    pub fn is_informative(&self) -> bool {
        matches!(self, MiScore::Defined(v) if *v > 0.0)
    }
}

impl PartialOrd for MiScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.value().total_cmp(&other.value()))
    }
}

/// (nij / N) * log2(N * nij / (row * col)), or 0 when nij == 0.
fn mi_term(nij: f64, n: f64, row: f64, col: f64) -> f64 {
    if nij == 0.0 {
        0.0
    } else {
        (nij / n) * ((n * nij) / (row * col)).log2()
    }
}

pub fn mutual_information(c: &Contingency) -> MiScore {
    if c.n11 == 0 {
        return MiScore::NegativeInfinity;
    }
    let (n11, n10, n01, n00) = (c.n11 as f64, c.n10 as f64, c.n01 as f64, c.n00 as f64);
    let n = n11 + n10 + n01 + n00;
    let has_word = n11 + n10;
    let lacks_word = n01 + n00;
    let in_city = n11 + n01;
    let not_in_city = n10 + n00;

    MiScore::Defined(
        mi_term(n11, n, has_word, in_city)
            + mi_term(n01, n, lacks_word, in_city)
            + mi_term(n10, n, has_word, not_in_city)
            + mi_term(n00, n, lacks_word, not_in_city),
    )
}

/// A word and its MI score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredWord {
    pub word: String,
    pub score: MiScore,
}

/// Sort by descending score; equal scores in lexicographic order.
fn sort_scored(words: &mut [ScoredWord]) {
    words.sort_by(|a, b| {
        b.score
            .value()
            .total_cmp(&a.score.value())
            .then_with(|| a.word.cmp(&b.word))
    });
}

/// Ranks city vocabularies by MI.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRanker<'a> {
    corpora: &'a CorpusSet,
    stopwords: &'a StopWords,
    top_k: usize,
    explain_k: usize,
}

impl<'a> FeatureRanker<'a> {
    pub fn new(corpora: &'a CorpusSet, stopwords: &'a StopWords) -> Self {
        Self {
            corpora,
            stopwords,
            top_k: DEFAULT_TOP_K,
            explain_k: DEFAULT_EXPLAIN_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_explain_k(mut self, explain_k: usize) -> Self {
        self.explain_k = explain_k;
        self
    }

    pub fn score(&self, city: &str, word: &str) -> MiScore {
        mutual_information(&Contingency::for_word(self.corpora, city, word))
    }

    /// Every token of the city's corpus with its MI, best first, stop-words
    /// included. Empty for an unknown city.
    pub fn scored_vocabulary(&self, city: &str) -> Vec<ScoredWord> {
        let Some(corpus) = self.corpora.get(city) else {
            return Vec::new();
        };
        let mut scored: Vec<ScoredWord> = corpus
            .word_counts
            .keys()
            .map(|w| ScoredWord {
                word: w.clone(),
                score: self.score(city, w),
            })
            .collect();
        sort_scored(&mut scored);
        scored
    }

    /// Up to `top_k` most characteristic non-stop-words of `city`. Words
    /// with zero MI (independent of the city) are never features.
    pub fn rank_features(&self, city: &str) -> Vec<String> {
        self.scored_vocabulary(city)
            .into_iter()
            .filter(|s| s.score.is_informative() && !self.stopwords.contains(&s.word))
            .take(self.top_k)
            .map(|s| s.word)
            .collect()
    }

    /// Up to `explain_k` distinct words of `text` that best tie it to `city`.
    /// Stop-words, words never seen in the city and zero-MI words are left out.
    pub fn top_words_in_text(&self, city: &str, text: &str) -> Vec<String> {
        let mut scored: Vec<ScoredWord> = distinct_tokens(text)
            .into_iter()
            .filter(|w| !self.stopwords.contains(w))
            .map(|w| {
                let score = self.score(city, &w);
                ScoredWord { word: w, score }
            })
            .filter(|s| s.score.is_informative())
            .collect();
        sort_scored(&mut scored);
        scored
            .into_iter()
            .take(self.explain_k)
            .map(|s| s.word)
            .collect()
    }
}

/// A text token that appears in a city's ranked feature list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedFeature {
    pub word: String,
    /// 1-based position in the ranked list.
    pub rank: usize,
}

impl std::fmt::Display for IncludedFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\" is ranked number {}", self.word, self.rank)
    }
}

/// Features of `ranking` present in `text`, in ranking order.
pub fn included_features(ranking: &[String], text: &str) -> Vec<IncludedFeature> {
    let words = distinct_tokens(text);
    ranking
        .iter()
        .enumerate()
        .filter(|(_, f)| words.iter().any(|w| w == *f))
        .map(|(i, f)| IncludedFeature {
            word: f.clone(),
            rank: i + 1,
        })
        .collect()
}
