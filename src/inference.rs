// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Per-ingredient classification and the product verdict
//!
//! A request goes through four steps:
//! 1. Tokenize the normalized text into ingredient names
//! 2. Classify each ingredient with the shared model
//! 3. Aggregate per-class counts and percentages
//! 4. Decide the verdict

use crate::error::{HazardError, Result};
use crate::labels::{HazardClass, NUM_CLASSES};
use crate::model::TrainedModel;
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Minimum share of LOW ingredients for a recommendation, in percent
pub const RECOMMEND_MIN_LOW_PERCENT: usize = 80;
/// Maximum share of MEDIUM ingredients for a recommendation, in percent
pub const RECOMMEND_MAX_MEDIUM_PERCENT: usize = 15;

/// Final purchase recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Recommended,
    NotRecommendedHazard,
    NotRecommendedBorderline,
}

impl Verdict {
    /// Rules apply in order: any HIGH ingredient, then the LOW/MEDIUM
    /// thresholds, otherwise borderline.
    pub fn decide(counts: &ClassCounts) -> Self {
        if counts.high > 0 {
            return Verdict::NotRecommendedHazard;
        }
        // Compared in integers so 15 of 100 is exactly 15%
        let total = counts.total();
        if counts.low * 100 >= RECOMMEND_MIN_LOW_PERCENT * total
            && counts.medium * 100 <= RECOMMEND_MAX_MEDIUM_PERCENT * total
        {
            Verdict::Recommended
        } else {
            Verdict::NotRecommendedBorderline
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Verdict::Recommended => "✅ The product is safe and RECOMMENDED for purchase.",
            Verdict::NotRecommendedHazard => {
                "❌ The product contains hazardous ingredients and is NOT recommended for purchase."
            }
            Verdict::NotRecommendedBorderline => {
                "⚠️ The product does not meet the safety requirements and is NOT recommended for purchase."
            }
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Recommended => "RECOMMENDED",
            Verdict::NotRecommendedHazard => "NOT_RECOMMENDED_HAZARD",
            Verdict::NotRecommendedBorderline => "NOT_RECOMMENDED_BORDERLINE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl ClassCounts {
    pub fn record(&mut self, class: HazardClass) {
        match class {
            HazardClass::Low => self.low += 1,
            HazardClass::Medium => self.medium += 1,
            HazardClass::High => self.high += 1,
        }
    }

    pub fn get(&self, class: HazardClass) -> usize {
        match class {
            HazardClass::Low => self.low,
            HazardClass::Medium => self.medium,
            HazardClass::High => self.high,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }

    /// LOW, MEDIUM, HIGH shares in percent; all zero for an empty count
    pub fn percentages(&self) -> [f64; NUM_CLASSES] {
        let total = self.total();
        if total == 0 {
            return [0.0; NUM_CLASSES];
        }
        HazardClass::ALL.map(|class| self.get(class) as f64 * 100.0 / total as f64)
    }
}

impl FromIterator<HazardClass> for ClassCounts {
    fn from_iter<I: IntoIterator<Item = HazardClass>>(iter: I) -> Self {
        let mut counts = ClassCounts::default();
        for class in iter {
            counts.record(class);
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientAssessment {
    pub token: String,
    pub class: HazardClass,
    /// Share of the forest's vote for `class`
    pub confidence: f64,
    /// Whether the token is a known vocabulary term
    pub in_vocabulary: bool,
}

impl IngredientAssessment {
    pub fn marker(&self) -> &'static str {
        match self.class {
            HazardClass::Low => "✅",
            HazardClass::Medium => "🟡",
            HazardClass::High => "⚠️",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub ingredients: Vec<IngredientAssessment>,
    pub counts: ClassCounts,
    pub verdict: Verdict,
}

impl InferenceResult {
    /// Percent of ingredients in each class, LOW first
    pub fn percentages(&self) -> [f64; NUM_CLASSES] {
        self.counts.percentages()
    }

    /// Human-readable analysis: one line per ingredient, then the verdict
    pub fn render_report(&self) -> String {
        let mut report = String::from("Product analysis results:\n");
        for item in &self.ingredients {
            report.push_str(&format!("{} {}\n", item.marker(), item.token));
        }

        report.push('\n');
        report.push_str(self.verdict.message());
        report.push('\n');

        let [low, medium, high] = self.percentages();
        report.push_str(&format!(
            "\nLOW (0-2): {:.1}% | MEDIUM (3-6): {:.1}% | HIGH (7-10): {:.1}% of {} ingredients",
            low,
            medium,
            high,
            self.counts.total()
        ));
        report
    }
}

/// Split normalized text into trimmed, non-empty ingredient tokens
pub fn ingredient_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Classifies ingredient lists with a shared, read-only model.
///
/// Cloning is cheap; every clone serves requests against the same model.
#[derive(Debug, Clone)]
pub struct HazardClassifier {
    model: Arc<TrainedModel>,
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<HazardClassifier>();
};

impl HazardClassifier {
    pub fn new(model: Arc<TrainedModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Classify a raw OCR ingredient string
    pub fn classify(&self, raw_text: &str) -> Result<InferenceResult> {
        let normalized = normalize(raw_text);
        let tokens = ingredient_tokens(&normalized);
        if tokens.is_empty() {
            return Err(HazardError::EmptyInput);
        }

        let mut ingredients = Vec::with_capacity(tokens.len());
        for token in tokens {
            let prediction = self.model.predict_text(token)?;
            ingredients.push(IngredientAssessment {
                token: token.to_string(),
                class: prediction.class,
                confidence: prediction.confidence(),
                in_vocabulary: self.model.vectorizer().contains(token),
            });
        }

        let counts: ClassCounts = ingredients.iter().map(|item| item.class).collect();
        let verdict = Verdict::decide(&counts);

        tracing::debug!(
            "Classified {} ingredients (low={}, medium={}, high={}): {}",
            counts.total(),
            counts.low,
            counts.medium,
            counts.high,
            verdict
        );

        Ok(InferenceResult {
            ingredients,
            counts,
            verdict,
        })
    }
}
