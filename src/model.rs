// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! The trained classifier bundle: a fitted vectorizer and the forest that
//! consumes its output.

use crate::balance::{class_counts, SmoteBalancer};
use crate::error::{HazardError, Result};
use crate::features::{FeatureVector, TfIdfVectorizer};
use crate::forest::{ForestConfig, Prediction, RandomForest};
use crate::labels::{HazardClass, LabeledIngredient};

/// Vectorizer plus forest. The forest's input dimension always equals the
/// vocabulary size.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    vectorizer: TfIdfVectorizer,
    forest: RandomForest,
}

impl TrainedModel {
    /// Pair a vectorizer with a forest, rejecting mismatched dimensions
    pub fn new(vectorizer: TfIdfVectorizer, forest: RandomForest) -> Result<Self> {
        if forest.n_features() != vectorizer.vocabulary_size() {
            return Err(HazardError::VersionMismatch(format!(
                "classifier expects {} features but vocabulary has {} terms",
                forest.n_features(),
                vectorizer.vocabulary_size()
            )));
        }
        Ok(Self { vectorizer, forest })
    }

    /// Fit the vectorizer on `training`, oversample, then grow the forest.
    ///
    /// Only pass the training split here; the balancer must never see
    /// evaluation rows.
    pub fn train(
        training: &[LabeledIngredient],
        balancer: &SmoteBalancer,
        config: &ForestConfig,
    ) -> Result<Self> {
        if training.is_empty() {
            return Err(HazardError::MissingData("no labeled ingredients to train on".to_string()));
        }

        let names: Vec<&str> = training.iter().map(|item| item.name.as_str()).collect();
        let labels: Vec<HazardClass> = training.iter().map(|item| item.class).collect();

        let mut vectorizer = TfIdfVectorizer::new();
        let features = vectorizer.fit_transform(&names)?;

        let (features, labels) = balancer.balance(&features, &labels)?;
        tracing::info!("Balanced training set: {:?}", class_counts(&labels));

        let forest = RandomForest::fit(&features, &labels, vectorizer.vocabulary_size(), config)?;
        Self::new(vectorizer, forest)
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn vectorize(&self, text: &str) -> Result<FeatureVector> {
        self.vectorizer.transform(text)
    }

    /// Vectorize and classify a single ingredient token
    pub fn predict_text(&self, text: &str) -> Result<Prediction> {
        Ok(self.forest.predict(&self.vectorize(text)?))
    }

    /// Vocabulary terms ranked by forest importance, highest first
    pub fn top_features(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .vectorizer
            .terms()
            .iter()
            .cloned()
            .zip(self.forest.feature_importances())
            .filter(|(_, importance)| *importance > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::forest::MaxFeatures;

    pub(crate) fn labeled(pairs: &[(&str, HazardClass)]) -> Vec<LabeledIngredient> {
        pairs
            .iter()
            .map(|(name, class)| LabeledIngredient {
                name: name.to_string(),
                class: *class,
            })
            .collect()
    }

    /// Small model over the round-trip training set (5 LOW, 5 MEDIUM, 1 HIGH)
    pub(crate) fn round_trip_model() -> TrainedModel {
        use HazardClass::{High, Low, Medium};
        let data = labeled(&[
            ("water", Low),
            ("glycerin", Low),
            ("aloe vera", Low),
            ("tocopherol", Low),
            ("panthenol", Low),
            ("phenoxyethanol", Medium),
            ("cetearyl alcohol", Medium),
            ("sodium laureth sulfate", Medium),
            ("dimethicone", Medium),
            ("limonene", Medium),
            ("fragrance", High),
        ]);
        let config = ForestConfig {
            max_features: MaxFeatures::All,
            ..ForestConfig::default()
        };
        TrainedModel::train(&data, &SmoteBalancer::new(0, 7), &config).unwrap()
    }

    #[test]
    fn test_round_trip_fits_training_set() {
        let model = round_trip_model();

        for (name, expected) in [
            ("water", HazardClass::Low),
            ("dimethicone", HazardClass::Medium),
            ("fragrance", HazardClass::High),
        ] {
            assert_eq!(model.predict_text(name).unwrap().class, expected, "{}", name);
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let model = round_trip_model();
        let mut other = TfIdfVectorizer::new();
        other.fit(&["water"]).unwrap();

        let result = TrainedModel::new(other, model.forest().clone());
        assert!(matches!(result, Err(HazardError::VersionMismatch(_))));
    }

    #[test]
    fn test_top_features_are_vocabulary_terms() {
        let model = round_trip_model();
        let top = model.top_features(3);

        assert!(!top.is_empty());
        assert!(top.len() <= 3);
        for (term, _) in &top {
            assert!(model.vectorizer().contains(term));
        }
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_train_rejects_empty_set() {
        let result = TrainedModel::train(&[], &SmoteBalancer::default(), &ForestConfig::default());
        assert!(matches!(result, Err(HazardError::MissingData(_))));
    }
}
