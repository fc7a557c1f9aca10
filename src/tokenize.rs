//! # Tokenizer
//! The single normalization rule every corpus, probability, and MI score
//! depends on: lower-case, drop ASCII punctuation, split on whitespace.
//!
//! Punctuation is removed *before* splitting, so `"don't"` becomes `"dont"`
//! and `"@home"` becomes `"home"`.
//!
//! The rule is byte-oriented: only ASCII letters are lower-cased and only
//! ASCII whitespace separates tokens. `"CAFÉ"` becomes `"cafÉ"`, and a
//! non-breaking space stays inside its token.

use std::collections::HashSet;

/// Space, `\t`, `\n`, `\x0b`, `\x0c`, `\r`.
#[inline]
fn is_separator(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\x0b'
}

/// Tokenize raw text into normalized tokens (duplicates kept, input order).
pub fn tokenize(text: &str) -> Vec<String> {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    stripped
        .split(is_separator)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct tokens of `text`, keeping first-occurrence order.
pub fn distinct_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Function words used when scoring text against city likelihoods.
const CLASSIFIER_STOPWORDS: &[&str] = &[
    "could", "would", "will", "at", "should", "can", "we", "us", "as", "him", "to", "sometimes",
    "you", "were", "i", "my", "her", "he", "me", "this", "was", "all", "the", "but", "or", "and",
    "there", "it", "is", "then", "a", "an", "be", "for", "of", "what", "when", "why", "where",
    "are", "am", "because", "they", "she",
];

/// Wider list used when ranking city features.
const FEATURE_STOPWORDS: &[&str] = &[
    "every", "got", "through", "our", "especially", "about", "before", "between", "by", "during",
    "except", "for", "with", "without", "in", "how", "his", "took", "could", "would", "will",
    "at", "should", "can", "we", "us", "as", "him", "to", "sometimes", "you", "were", "i", "my",
    "her", "he", "me", "this", "was", "had", "all", "the", "but", "or", "and", "there", "it",
    "is", "then", "a", "an", "be", "of", "what", "when", "why", "where", "are", "am", "because",
    "they",
];

/// A set of normalized tokens excluded from scoring or ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    /// Build from arbitrary words; each entry goes through [`tokenize`] so
    /// configured lists match the tokens they are compared against.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .flat_map(|w| tokenize(w.as_ref()))
            .collect();
        Self { words }
    }

    pub fn classifier_default() -> Self {
        Self::from_words(CLASSIFIER_STOPWORDS)
    }

    pub fn feature_default() -> Self {
        Self::from_words(FEATURE_STOPWORDS)
    }

    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.words.contains(token)
    }

    /// Members in lexicographic order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.words.iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
