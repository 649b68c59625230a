// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for the three-class hazard classifier
//!
//! Implements standard ML metrics:
//! - Confusion Matrix
//! - Accuracy
//! - Per-class Precision, Recall, F1-Score
//! - Macro and support-weighted averages
//!
//! Any ratio with a zero denominator evaluates to 0.

use crate::error::{HazardError, Result};
use crate::features::FeatureVector;
use crate::forest::RandomForest;
use crate::labels::{HazardClass, NUM_CLASSES};
use serde::{Deserialize, Serialize};

/// Confusion matrix indexed as `counts[actual][predicted]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    /// Create from predictions and ground truth labels
    pub fn from_predictions(predictions: &[HazardClass], ground_truth: &[HazardClass]) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            return Err(HazardError::Vectorization(format!(
                "{} predictions but {} labels",
                predictions.len(),
                ground_truth.len()
            )));
        }

        let mut matrix = Self::default();
        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            matrix.counts[truth.index()][pred.index()] += 1;
        }
        Ok(matrix)
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: HazardClass) -> usize {
        self.counts[class.index()][class.index()]
    }

    /// Number of samples whose true label is `class`
    pub fn support(&self, class: HazardClass) -> usize {
        self.counts[class.index()].iter().sum()
    }

    /// Number of samples predicted as `class`
    pub fn predicted(&self, class: HazardClass) -> usize {
        self.counts.iter().map(|row| row[class.index()]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = HazardClass::ALL.iter().map(|&c| self.true_positives(c)).sum();
        ratio(correct, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self, class: HazardClass) -> f64 {
        ratio(self.true_positives(class), self.predicted(class))
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self, class: HazardClass) -> f64 {
        ratio(self.true_positives(class), self.support(class))
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self, class: HazardClass) -> f64 {
        let precision = self.precision(class);
        let recall = self.recall(class);
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: HazardClass,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Full classification report with all metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    /// Support-weighted averages
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    pub support: usize,
}

impl EvaluationMetrics {
    /// Generate report from predictions and ground truth
    pub fn from_predictions(predictions: &[HazardClass], ground_truth: &[HazardClass]) -> Result<Self> {
        let cm = ConfusionMatrix::from_predictions(predictions, ground_truth)?;
        Ok(Self::from_confusion_matrix(cm))
    }

    /// Generate full report from confusion matrix
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        let per_class: Vec<ClassMetrics> = HazardClass::ALL
            .iter()
            .map(|&class| ClassMetrics {
                class,
                precision: cm.precision(class),
                recall: cm.recall(class),
                f1_score: cm.f1_score(class),
                support: cm.support(class),
            })
            .collect();

        let total = cm.total();
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                return 0.0;
            }
            per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        };
        let mean = |f: fn(&ClassMetrics) -> f64| per_class.iter().map(f).sum::<f64>() / NUM_CLASSES as f64;

        Self {
            accuracy: cm.accuracy(),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            macro_precision: mean(|m| m.precision),
            macro_recall: mean(|m| m.recall),
            macro_f1: mean(|m| m.f1_score),
            support: total,
            per_class,
            confusion_matrix: cm,
        }
    }

    /// Predict every row with `model` and score against `labels`
    pub fn evaluate(model: &RandomForest, features: &[FeatureVector], labels: &[HazardClass]) -> Result<Self> {
        let predictions: Vec<HazardClass> = model.predict_batch(features).into_iter().map(|p| p.class).collect();
        Self::from_predictions(&predictions, labels)
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = String::from("Classification Report\n=====================\n");
        output.push_str(&format!(
            "{:<14} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        for m in &self.per_class {
            output.push_str(&format!(
                "{:<14} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
                m.class.as_str(),
                m.precision,
                m.recall,
                m.f1_score,
                m.support
            ));
        }
        output.push('\n');
        output.push_str(&format!(
            "{:<14} {:>9} {:>9} {:>9.4} {:>9}\n",
            "accuracy", "", "", self.accuracy, self.support
        ));
        output.push_str(&format!(
            "{:<14} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.support
        ));
        output.push_str(&format!(
            "{:<14} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
            "weighted avg", self.precision, self.recall, self.f1_score, self.support
        ));

        output.push_str("\nConfusion Matrix (rows = actual, columns = predicted):\n");
        output.push_str(&format!("{:<10}", ""));
        for class in HazardClass::ALL {
            output.push_str(&format!("{:>8}", class.as_str()));
        }
        output.push('\n');
        for class in HazardClass::ALL {
            output.push_str(&format!("{:<10}", class.as_str()));
            for count in self.confusion_matrix.counts[class.index()] {
                output.push_str(&format!("{:>8}", count));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HazardClass::{High, Low, Medium};

    #[test]
    fn test_perfect_predictions() {
        let truth = vec![Low, Low, Medium, High];
        let metrics = EvaluationMetrics::from_predictions(&truth, &truth).unwrap();

        assert!((metrics.accuracy - 1.0).abs() < 1e-9);
        assert!((metrics.precision - 1.0).abs() < 1e-9);
        assert!((metrics.recall - 1.0).abs() < 1e-9);
        assert!((metrics.f1_score - 1.0).abs() < 1e-9);
        assert_eq!(metrics.support, 4);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let predictions = vec![Low, Medium, Medium, High];
        let truth = vec![Low, Low, Medium, Medium];
        let cm = ConfusionMatrix::from_predictions(&predictions, &truth).unwrap();

        assert_eq!(cm.counts[Low.index()][Medium.index()], 1);
        assert_eq!(cm.counts[Medium.index()][High.index()], 1);
        assert_eq!(cm.support(Low), 2);
        assert_eq!(cm.predicted(Medium), 2);
        assert!((cm.accuracy() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_division_yields_zero() {
        // HIGH never predicted and never present
        let predictions = vec![Low, Low];
        let truth = vec![Low, Medium];
        let metrics = EvaluationMetrics::from_predictions(&predictions, &truth).unwrap();

        let high = &metrics.per_class[High.index()];
        assert_eq!(high.precision, 0.0);
        assert_eq!(high.recall, 0.0);
        assert_eq!(high.f1_score, 0.0);

        let medium = &metrics.per_class[Medium.index()];
        assert_eq!(medium.precision, 0.0);
        assert_eq!(medium.recall, 0.0);
    }

    #[test]
    fn test_weighted_by_support() {
        // LOW: P=2/3 R=1; MEDIUM: P=0 R=0 (support 1)
        let predictions = vec![Low, Low, Low];
        let truth = vec![Low, Low, Medium];
        let metrics = EvaluationMetrics::from_predictions(&predictions, &truth).unwrap();

        let expected_precision = (2.0 / 3.0) * (2.0 / 3.0);
        assert!((metrics.precision - expected_precision).abs() < 1e-9);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.accuracy - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_predictions() {
        let metrics = EvaluationMetrics::from_predictions(&[], &[]).unwrap();
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.support, 0);
    }

    #[test]
    fn test_report_format() {
        let predictions = vec![Low, Medium, High, High];
        let truth = vec![Low, Medium, Medium, High];
        let formatted = EvaluationMetrics::from_predictions(&predictions, &truth).unwrap().format();

        assert!(formatted.contains("Classification Report"));
        assert!(formatted.contains("weighted avg"));
        assert!(formatted.contains("Confusion Matrix"));
        assert!(formatted.contains("MEDIUM"));
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let result = EvaluationMetrics::from_predictions(&[Low, Medium], &[Low]);
        assert!(matches!(result, Err(HazardError::Vectorization(_))));
        assert!(ConfusionMatrix::from_predictions(&[], &[High]).is_err());
    }
}
