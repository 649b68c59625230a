// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Ingredient-name tokenization and TF-IDF vectorization
//!
//! Ingredient lists are comma separated; each comma-delimited entry is one
//! token, so multi-word names like "sodium laureth sulfate" stay whole.

use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Split an ingredient string on commas, dropping whitespace that follows
/// each comma. Order is preserved; no stemming or case folding.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(',')
        .enumerate()
        .map(|(i, part)| if i == 0 { part } else { part.trim_start() })
        .collect()
}

/// Sparse weighted vector over a vocabulary.
///
/// Indices are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Build from unordered (index, value) pairs; duplicate indices are summed
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for (idx, value) in pairs {
            *merged.entry(idx).or_insert(0.0) += value;
        }
        let (indices, values) = merged.into_iter().filter(|(_, v)| *v != 0.0).unzip();
        Self { indices, values }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    /// Value at `index` (zero when absent)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Squared Euclidean distance between two sparse vectors
    pub fn squared_distance(&self, other: &FeatureVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Equal => {
                    let d = self.values[i] - other.values[j];
                    sum += d * d;
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => {
                    sum += self.values[i] * self.values[i];
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    sum += other.values[j] * other.values[j];
                    j += 1;
                }
            }
        }
        sum += self.values[i..].iter().map(|v| v * v).sum::<f64>();
        sum += other.values[j..].iter().map(|v| v * v).sum::<f64>();
        sum
    }

    /// `self + gap * (other - self)`
    pub fn interpolate(&self, other: &FeatureVector, gap: f64) -> FeatureVector {
        let pairs = self
            .iter()
            .map(|(idx, v)| (idx, v * (1.0 - gap)))
            .chain(other.iter().map(|(idx, v)| (idx, v * gap)));
        FeatureVector::from_pairs(pairs)
    }
}

/// TF-IDF vectorizer over comma-delimited ingredient tokens.
///
/// Uses raw term counts, smoothed IDF `ln((1 + n) / (1 + df)) + 1` and L2
/// row normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    /// Terms in index order
    terms: Vec<String>,
    /// Inverse document frequency for each term
    idf: Vec<f64>,
    /// Lower-case documents before tokenizing
    lowercase: bool,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfIdfVectorizer {
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            idf: Vec::new(),
            lowercase: true,
            index: HashMap::new(),
        }
    }

    /// Keep the original casing of documents
    pub fn case_sensitive(mut self) -> Self {
        self.lowercase = false;
        self
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase { text.to_lowercase() } else { text.to_string() };
        tokenize(&text)
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Build the vocabulary and IDF weights from a training corpus
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<()> {
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in corpus {
            let unique: HashSet<String> = self.analyze(doc.as_ref()).into_iter().collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        if df.is_empty() {
            return Err(HazardError::Vectorization(
                "training corpus contains no tokens".to_string(),
            ));
        }

        let n_docs = corpus.len() as f64;
        self.terms = df.keys().cloned().collect();
        self.idf = df
            .values()
            .map(|&count| ((1.0 + n_docs) / (1.0 + count as f64)).ln() + 1.0)
            .collect();
        self.rebuild_index();

        tracing::info!("Vectorizer fitted: {} documents, {} terms", corpus.len(), self.terms.len());
        Ok(())
    }

    /// Vectorize one document; unknown tokens contribute nothing
    pub fn transform(&self, text: &str) -> Result<FeatureVector> {
        if !self.is_fitted() {
            return Err(HazardError::Vectorization("vectorizer has not been fitted".to_string()));
        }

        let counts = self
            .analyze(text)
            .into_iter()
            .filter_map(|term| self.index.get(&term).map(|&idx| (idx, 1.0)));
        let mut vector = FeatureVector::from_pairs(counts);

        for (idx, value) in vector.indices.iter().zip(vector.values.iter_mut()) {
            *value *= self.idf[*idx];
        }

        let norm = vector.values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut vector.values {
                *value /= norm;
            }
        }

        Ok(vector)
    }

    pub fn transform_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<FeatureVector>> {
        texts.iter().map(|t| self.transform(t.as_ref())).collect()
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<Vec<FeatureVector>> {
        self.fit(corpus)?;
        self.transform_batch(corpus)
    }

    pub fn is_fitted(&self) -> bool {
        !self.terms.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    /// Whether a token is part of the vocabulary
    pub fn contains(&self, term: &str) -> bool {
        let term = if self.lowercase { term.to_lowercase() } else { term.to_string() };
        self.index.contains_key(&term)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Restore the term lookup table after deserialization
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
    }

    pub(crate) fn check_consistency(&self) -> Result<()> {
        if self.terms.len() != self.idf.len() {
            return Err(HazardError::VersionMismatch(format!(
                "vectorizer has {} terms but {} idf weights",
                self.terms.len(),
                self.idf.len()
            )));
        }
        Ok(())
    }
}
