// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Model card for a trained hazard classifier
//!
//! Follows the structure of Mitchell et al. (2019) "Model Cards for Model
//! Reporting", reduced to the sections that apply to an ingredient-level
//! classifier:
//! - Model details and intended use
//! - Training data and preprocessing
//! - Headline evaluation results
//! - Decision thresholds of the product verdict
//! - Caveats and recommendations

use crate::inference::{RECOMMEND_MAX_MEDIUM_PERCENT, RECOMMEND_MIN_LOW_PERCENT};
use crate::labels::HazardClass;
use crate::metrics::EvaluationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub model_details: ModelDetails,
    pub intended_use: IntendedUse,
    pub metrics: MetricsSection,
    pub data: DataSection,
    pub caveats_and_recommendations: CaveatsAndRecommendations,
    pub card_metadata: CardMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetails {
    pub name: String,
    pub version: String,
    pub model_type: String,
    pub description: String,
    pub organization: String,
    pub license: String,
    pub date: DateTime<Utc>,
    pub framework: String,
    /// Hyperparameters and other free-form facts
    pub additional_info: BTreeMap<String, String>,
}

impl Default for ModelDetails {
    fn default() -> Self {
        Self {
            name: "Ingredient Hazard Classifier".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_type: "TF-IDF + Random Forest".to_string(),
            description: String::new(),
            organization: String::new(),
            license: "AGPL-3.0-or-later".to_string(),
            date: Utc::now(),
            framework: "Rust".to_string(),
            additional_info: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntendedUse {
    pub primary_uses: Vec<String>,
    pub primary_users: Vec<String>,
    /// What the model should NOT be used for
    pub out_of_scope_uses: Vec<String>,
}

impl Default for IntendedUse {
    fn default() -> Self {
        Self {
            primary_uses: vec![
                "Flagging cosmetic ingredients with high published hazard ratings".to_string(),
                "Giving shoppers a quick first opinion on an ingredient list".to_string(),
            ],
            primary_users: vec!["Consumers comparing cosmetic products".to_string()],
            out_of_scope_uses: vec![
                "Medical or dermatological advice".to_string(),
                "Regulatory compliance decisions".to_string(),
                "Assessing allergies or individual sensitivities".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    pub performance: PerformanceMetrics,
    pub thresholds: Vec<ThresholdInfo>,
}

/// Support-weighted scores on the held-out split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub macro_f1: f64,
    pub support: usize,
}

impl From<&EvaluationMetrics> for PerformanceMetrics {
    fn from(metrics: &EvaluationMetrics) -> Self {
        Self {
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            macro_f1: metrics.macro_f1,
            support: metrics.support,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdInfo {
    pub name: String,
    pub value: f64,
    pub description: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            performance: PerformanceMetrics::default(),
            thresholds: vec![
                ThresholdInfo {
                    name: "Hazard".to_string(),
                    value: 1.0,
                    description: "A single HIGH ingredient makes the product not recommended".to_string(),
                },
                ThresholdInfo {
                    name: "Minimum LOW share".to_string(),
                    value: RECOMMEND_MIN_LOW_PERCENT as f64,
                    description: "Percent of LOW ingredients required for a recommendation".to_string(),
                },
                ThresholdInfo {
                    name: "Maximum MEDIUM share".to_string(),
                    value: RECOMMEND_MAX_MEDIUM_PERCENT as f64,
                    description: "Percent of MEDIUM ingredients tolerated in a recommendation".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    pub datasets: Vec<String>,
    pub training_size: Option<usize>,
    pub evaluation_size: Option<usize>,
    pub preprocessing: Vec<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            datasets: Vec::new(),
            training_size: None,
            evaluation_size: None,
            preprocessing: vec![
                "Rows without a name or a numeric EWG rating are dropped".to_string(),
                format!(
                    "EWG ratings binned into {} ({}), {} ({}), {} ({})",
                    HazardClass::Low,
                    HazardClass::Low.rating_range(),
                    HazardClass::Medium,
                    HazardClass::Medium.rating_range(),
                    HazardClass::High,
                    HazardClass::High.rating_range()
                ),
                "Comma-delimited TF-IDF over lower-cased ingredient names".to_string(),
                "SMOTE oversampling of the training split".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaveatsAndRecommendations {
    pub caveats: Vec<String>,
    pub recommendations: Vec<String>,
    pub failure_modes: Vec<String>,
}

impl Default for CaveatsAndRecommendations {
    fn default() -> Self {
        Self {
            caveats: vec![
                "Labels come from a single third-party rating source".to_string(),
                "Ingredients outside the training vocabulary are classified from an empty feature vector".to_string(),
                "Only ASCII ingredient names are supported".to_string(),
            ],
            recommendations: vec![
                "Treat the verdict as a screening aid, not a safety certification".to_string(),
                "Retrain when the rating source is refreshed".to_string(),
            ],
            failure_modes: vec![
                "OCR errors split or merge ingredient names".to_string(),
                "Synonyms (e.g. INCI vs. common names) map to different features".to_string(),
                "Lists that do not start with water or aqua keep any leading label text".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardMetadata {
    pub schema_version: String,
    pub created: DateTime<Utc>,
}

impl Default for CardMetadata {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created: Utc::now(),
        }
    }
}

impl ModelCard {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            model_details: ModelDetails {
                name: name.to_string(),
                version: version.to_string(),
                ..Default::default()
            },
            intended_use: IntendedUse::default(),
            metrics: MetricsSection::default(),
            data: DataSection::default(),
            caveats_and_recommendations: CaveatsAndRecommendations::default(),
            card_metadata: CardMetadata::default(),
        }
    }

    /// Set performance metrics from evaluation results
    pub fn set_metrics(&mut self, metrics: &EvaluationMetrics) {
        self.metrics.performance = PerformanceMetrics::from(metrics);
    }

    /// Generate markdown representation
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Model Card: {}\n\n", self.model_details.name));

        md.push_str("## Model Details\n\n");
        md.push_str(&format!("- **Version:** {}\n", self.model_details.version));
        md.push_str(&format!("- **Type:** {}\n", self.model_details.model_type));
        md.push_str(&format!("- **Framework:** {}\n", self.model_details.framework));
        md.push_str(&format!("- **License:** {}\n", self.model_details.license));
        md.push_str(&format!("- **Date:** {}\n", self.model_details.date.format("%Y-%m-%d")));
        for (key, value) in &self.model_details.additional_info {
            md.push_str(&format!("- **{}:** {}\n", key, value));
        }
        if !self.model_details.description.is_empty() {
            md.push_str(&format!("\n{}\n", self.model_details.description));
        }
        md.push('\n');

        md.push_str("## Intended Use\n\n");
        md.push_str("### Primary Uses\n\n");
        for use_case in &self.intended_use.primary_uses {
            md.push_str(&format!("- {}\n", use_case));
        }
        md.push_str("\n### Primary Users\n\n");
        for user in &self.intended_use.primary_users {
            md.push_str(&format!("- {}\n", user));
        }
        md.push_str("\n### Out-of-Scope Uses\n\n");
        md.push_str("⚠️ **The following uses are explicitly out of scope:**\n\n");
        for oos in &self.intended_use.out_of_scope_uses {
            md.push_str(&format!("- {}\n", oos));
        }
        md.push('\n');

        let perf = &self.metrics.performance;
        md.push_str("## Performance Metrics\n\n");
        md.push_str(&format!("Held-out evaluation on {} ingredients.\n\n", perf.support));
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Accuracy | {:.4} |\n", perf.accuracy));
        md.push_str(&format!("| Precision (weighted) | {:.4} |\n", perf.precision));
        md.push_str(&format!("| Recall (weighted) | {:.4} |\n", perf.recall));
        md.push_str(&format!("| F1 Score (weighted) | {:.4} |\n", perf.f1_score));
        md.push_str(&format!("| F1 Score (macro) | {:.4} |\n", perf.macro_f1));
        md.push('\n');

        md.push_str("### Verdict Thresholds\n\n");
        for t in &self.metrics.thresholds {
            md.push_str(&format!("- **{}** ({}): {}\n", t.name, t.value, t.description));
        }
        md.push('\n');

        md.push_str("## Training Data\n\n");
        if !self.data.datasets.is_empty() {
            md.push_str("**Datasets:**\n");
            for ds in &self.data.datasets {
                md.push_str(&format!("- {}\n", ds));
            }
        }
        if let Some(size) = self.data.training_size {
            md.push_str(&format!("\n**Training size:** {} ingredients\n", size));
        }
        if let Some(size) = self.data.evaluation_size {
            md.push_str(&format!("**Evaluation size:** {} ingredients\n", size));
        }
        md.push_str("\n**Preprocessing:**\n");
        for step in &self.data.preprocessing {
            md.push_str(&format!("- {}\n", step));
        }
        md.push('\n');

        md.push_str("## Caveats and Recommendations\n\n");
        md.push_str("### Known Limitations\n\n");
        for caveat in &self.caveats_and_recommendations.caveats {
            md.push_str(&format!("- {}\n", caveat));
        }
        md.push_str("\n### Recommendations\n\n");
        for rec in &self.caveats_and_recommendations.recommendations {
            md.push_str(&format!("- {}\n", rec));
        }
        md.push_str("\n### Known Failure Modes\n\n");
        for fm in &self.caveats_and_recommendations.failure_modes {
            md.push_str(&format!("- {}\n", fm));
        }
        md.push('\n');

        md.push_str("---\n\n");
        md.push_str(&format!(
            "*Model Card generated on {} (schema v{})*\n",
            self.card_metadata.created.format("%Y-%m-%d"),
            self.card_metadata.schema_version
        ));

        md
    }

    /// Save model card to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_markdown())?;
        Ok(())
    }

    pub fn save_json(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Builder for creating model cards
pub struct ModelCardBuilder {
    card: ModelCard,
}

impl ModelCardBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            card: ModelCard::new(name, version),
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.card.model_details.description = desc.to_string();
        self
    }

    pub fn organization(mut self, org: &str) -> Self {
        self.card.model_details.organization = org.to_string();
        self
    }

    pub fn info(mut self, key: &str, value: impl ToString) -> Self {
        self.card.model_details.additional_info.insert(key.to_string(), value.to_string());
        self
    }

    pub fn metrics(mut self, metrics: &EvaluationMetrics) -> Self {
        self.card.set_metrics(metrics);
        self
    }

    pub fn training_datasets(mut self, datasets: Vec<String>) -> Self {
        self.card.data.datasets = datasets;
        self
    }

    pub fn training_size(mut self, size: usize) -> Self {
        self.card.data.training_size = Some(size);
        self
    }

    pub fn evaluation_size(mut self, size: usize) -> Self {
        self.card.data.evaluation_size = Some(size);
        self
    }

    pub fn build(self) -> ModelCard {
        self.card
    }
}
