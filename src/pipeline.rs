// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible training pipeline for the ingredient hazard classifier
//!
//! Orchestrates:
//! - Dataset loading and cleaning
//! - Rating binning
//! - Train/test split
//! - Vectorizing, oversampling and forest training (training split only)
//! - Evaluation on the held-out split
//! - Artifact, results and model card serialization

use crate::balance::SmoteBalancer;
use crate::datasets::{stratified_split, train_test_split, CleaningReport, Dataset, RawDataset};
use crate::forest::ForestConfig;
use crate::labels::{label_records, HazardClass, LabeledIngredient, LabelingReport};
use crate::metrics::EvaluationMetrics;
use crate::model::TrainedModel;
use crate::model_card::{ModelCard, ModelCardBuilder};
use crate::model_store::{ArtifactManifest, ModelStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Dataset CSV; the built-in synthetic dataset is used when absent
    pub dataset_path: Option<String>,
    /// Fraction of labeled ingredients held out for evaluation
    pub test_size: f64,
    /// Hold out the same fraction of every class
    pub stratify: bool,
    pub n_trees: usize,
    pub k_neighbors: usize,
    /// Output directory for the artifact and reports
    pub output_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            dataset_path: None,
            test_size: 0.2,
            stratify: true,
            n_trees: crate::forest::DEFAULT_N_TREES,
            k_neighbors: crate::balance::DEFAULT_K_NEIGHBORS,
            output_dir: "model".to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            seed: self.seed,
            ..ForestConfig::default()
        }
    }

    pub fn balancer(&self) -> SmoteBalancer {
        SmoteBalancer::new(self.k_neighbors, self.seed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub source: String,
    pub total_rows: usize,
    pub cleaned_rows: usize,
    pub labeled_rows: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    /// Labels of the training split before oversampling
    pub label_distribution: BTreeMap<String, usize>,
}

/// Everything recorded about one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResults {
    pub config: TrainingConfig,
    pub dataset_info: DatasetInfo,
    pub cleaning: CleaningReport,
    pub labeling: LabelingReport,
    pub metrics: EvaluationMetrics,
    pub vocabulary_size: usize,
    pub top_features: Vec<(String, f64)>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// A trained model together with its run record
pub struct TrainingRun {
    pub model: TrainedModel,
    pub results: TrainingResults,
}

pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Load and clean the configured dataset
    pub fn load_dataset(&self) -> Result<(Dataset, CleaningReport)> {
        match &self.config.dataset_path {
            Some(path) => {
                tracing::info!("Loading dataset from {}", path);
                let raw = RawDataset::load(Path::new(path))
                    .with_context(|| format!("Failed to load dataset {}", path))?;
                Ok(raw.clean())
            }
            None => {
                tracing::warn!("No dataset path provided, using synthetic dataset");
                let dataset = Dataset::synthetic();
                let report = CleaningReport {
                    total_rows: dataset.len(),
                    kept: dataset.len(),
                    dropped: Vec::new(),
                };
                Ok((dataset, report))
            }
        }
    }

    fn split(&self, labeled: &[LabeledIngredient]) -> (Vec<LabeledIngredient>, Vec<LabeledIngredient>) {
        if self.config.stratify {
            stratified_split(labeled, self.config.test_size, self.config.seed)
        } else {
            train_test_split(labeled, self.config.test_size, self.config.seed)
        }
    }

    /// Run the full training pipeline
    pub fn run(&self) -> Result<TrainingRun> {
        let (dataset, cleaning) = self.load_dataset()?;
        let (labeled, labeling) = label_records(&dataset.records);
        if labeled.is_empty() {
            anyhow::bail!("Dataset {} has no classifiable rows", dataset.source);
        }

        let (train, test) = self.split(&labeled);
        tracing::info!(
            "Dataset {}: {} rows, {} labeled (train={}, test={})",
            dataset.source,
            cleaning.total_rows,
            labeled.len(),
            train.len(),
            test.len()
        );

        let model = TrainedModel::train(&train, &self.config.balancer(), &self.config.forest_config())
            .context("Training failed")?;

        let test_names: Vec<&str> = test.iter().map(|item| item.name.as_str()).collect();
        let test_labels: Vec<HazardClass> = test.iter().map(|item| item.class).collect();
        let test_features = model.vectorizer().transform_batch(&test_names)?;
        let metrics = EvaluationMetrics::evaluate(model.forest(), &test_features, &test_labels)?;

        tracing::info!(
            "Held-out evaluation - Accuracy: {:.4}, Precision: {:.4}, Recall: {:.4}, F1: {:.4}",
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score
        );

        let dataset_info = DatasetInfo {
            source: dataset.source.clone(),
            total_rows: cleaning.total_rows,
            cleaned_rows: dataset.len(),
            labeled_rows: labeled.len(),
            train_samples: train.len(),
            test_samples: test.len(),
            label_distribution: Dataset::label_distribution(&train)
                .into_iter()
                .map(|(class, count)| (class.to_string(), count))
                .collect(),
        };

        let results = TrainingResults {
            config: self.config.clone(),
            dataset_info,
            cleaning,
            labeling,
            metrics,
            vocabulary_size: model.vectorizer().vocabulary_size(),
            top_features: model.top_features(15),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Ok(TrainingRun { model, results })
    }

    /// Persist the model artifact under `<output_dir>/artifact`
    pub fn save_model(model: &TrainedModel, output_dir: &Path) -> Result<(PathBuf, ArtifactManifest)> {
        let dir = output_dir.join("artifact");
        let manifest = ModelStore::save(model, &dir)
            .with_context(|| format!("Failed to save model to {}", dir.display()))?;
        Ok((dir, manifest))
    }

    /// Save results to JSON file
    pub fn save_results(results: &TrainingResults, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &TrainingResults) -> String {
        let mut report = String::new();

        report.push_str("# Ingredient Hazard Classifier Training Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));

        let info = &results.dataset_info;
        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **Source:** {}\n", info.source));
        report.push_str(&format!("- **Rows read:** {}\n", info.total_rows));
        report.push_str(&format!(
            "- **Dropped while cleaning:** {} ({} missing name, {} missing rating, {} unparsable rating)\n",
            results.cleaning.dropped_count(),
            results.cleaning.count(crate::datasets::DropReason::MissingName),
            results.cleaning.count(crate::datasets::DropReason::MissingRating),
            results.cleaning.count(crate::datasets::DropReason::UnparsableRating)
        ));
        report.push_str(&format!("- **Rating out of range:** {}\n", results.labeling.out_of_range));
        report.push_str(&format!(
            "- **Split Sizes:** Train={}, Test={}\n",
            info.train_samples, info.test_samples
        ));
        report.push_str(&format!("- **Vocabulary:** {} terms\n\n", results.vocabulary_size));

        report.push_str("### Training Label Distribution\n\n");
        report.push_str("| Class | Ratings | Count |\n");
        report.push_str("|-------|---------|-------|\n");
        for class in HazardClass::ALL {
            let count = info.label_distribution.get(class.as_str()).copied().unwrap_or(0);
            report.push_str(&format!("| {} | {} | {} |\n", class, class.rating_range(), count));
        }

        report.push_str("\n## Evaluation\n\n");
        report.push_str(&format!("```\n{}\n```\n\n", results.metrics.format()));

        if !results.top_features.is_empty() {
            report.push_str("## Most Informative Ingredients\n\n");
            for (term, importance) in &results.top_features {
                report.push_str(&format!("- {}: {:.4}\n", term, importance));
            }
            report.push('\n');
        }

        report.push_str("## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&results.config).unwrap_or_default()
        ));

        report
    }

    /// Build the model card describing a training run
    pub fn generate_model_card(results: &TrainingResults) -> ModelCard {
        let config = &results.config;
        ModelCardBuilder::new("Ingredient Hazard Classifier", &results.version)
            .description(
                "Random forest over comma-delimited TF-IDF features that assigns each cosmetic \
                 ingredient a LOW, MEDIUM or HIGH hazard class.",
            )
            .organization("Hyperpolymath")
            .info("Trees", config.n_trees)
            .info("SMOTE neighbours", config.k_neighbors)
            .info("Seed", config.seed)
            .info("Vocabulary size", results.vocabulary_size)
            .metrics(&results.metrics)
            .training_datasets(vec![results.dataset_info.source.clone()])
            .training_size(results.dataset_info.train_samples)
            .evaluation_size(results.dataset_info.test_samples)
            .build()
    }

    /// Generate and save the model card as markdown and JSON
    pub fn save_model_card(results: &TrainingResults, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;
        let card = Self::generate_model_card(results);

        let md_path = output_dir.join("model_card.md");
        card.save(&md_path)?;
        let json_path = output_dir.join("model_card.json");
        card.save_json(&json_path)?;

        tracing::info!("Model card saved to {}", md_path.display());
        Ok(vec![md_path, json_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HazardError;
    use std::io::Write;

    const ROUND_TRIP_CSV: &str = "\
Ingredient,EWG Rating
Water,1
Glycerin,1
Aloe Vera,1
Tocopherol,2
Panthenol,1
Phenoxyethanol,4
Cetearyl Alcohol,3
Sodium Laureth Sulfate,4
Dimethicone,3
Limonene,5
Fragrance,8
";

    fn write_csv(dir: &Path, contents: &str) -> String {
        let path = dir.join("ingredients.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    fn synthetic_config() -> TrainingConfig {
        TrainingConfig {
            n_trees: 60,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_pipeline_synthetic() {
        let run = TrainingPipeline::new(synthetic_config()).run().expect("Pipeline should succeed");
        let results = &run.results;

        assert_eq!(results.dataset_info.labeled_rows, 28);
        assert_eq!(results.dataset_info.test_samples, 7);
        assert_eq!(results.metrics.support, 7);
        assert!(results.metrics.f1_score >= 0.0 && results.metrics.f1_score <= 1.0);
        assert_eq!(run.model.forest().n_features(), run.model.vectorizer().vocabulary_size());
    }

    #[test]
    fn test_training_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            dataset_path: Some(write_csv(dir.path(), ROUND_TRIP_CSV)),
            test_size: 0.0,
            k_neighbors: 0,
            ..TrainingConfig::default()
        };

        let run = TrainingPipeline::new(config.clone()).run().unwrap();
        assert_eq!(run.results.dataset_info.train_samples, 11);

        // Oversampling evens out the classes
        let (dataset, _) = TrainingPipeline::new(config).load_dataset().unwrap();
        let (labeled, _) = label_records(&dataset.records);
        let names: Vec<&str> = labeled.iter().map(|i| i.name.as_str()).collect();
        let labels: Vec<HazardClass> = labeled.iter().map(|i| i.class).collect();
        let features = run.model.vectorizer().transform_batch(&names).unwrap();
        let (_, balanced) = SmoteBalancer::new(0, 42).balance(&features, &labels).unwrap();
        let counts = crate::balance::class_counts(&balanced);
        assert!(counts.values().all(|&c| c == 5));

        // Every training ingredient comes back with its own class
        let metrics = EvaluationMetrics::evaluate(run.model.forest(), &features, &labels).unwrap();
        assert!((metrics.accuracy - 1.0).abs() < 1e-9, "{}", metrics.format());
    }

    #[test]
    fn test_small_class_fails_oversampling() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            dataset_path: Some(write_csv(dir.path(), ROUND_TRIP_CSV)),
            test_size: 0.0,
            n_trees: 10,
            ..TrainingConfig::default()
        };

        // k = 5 needs six samples in every class
        let err = TrainingPipeline::new(config).run().err().expect("classes are too small");
        assert!(matches!(
            err.downcast_ref::<HazardError>(),
            Some(HazardError::InsufficientSamples { required: 6, .. })
        ));
    }

    #[test]
    fn test_missing_dataset_file() {
        let config = TrainingConfig {
            dataset_path: Some("/nonexistent/ingredients.csv".to_string()),
            ..TrainingConfig::default()
        };
        assert!(TrainingPipeline::new(config).run().is_err());
    }

    #[test]
    fn test_generate_report() {
        let run = TrainingPipeline::new(synthetic_config()).run().unwrap();
        let report = TrainingPipeline::generate_report(&run.results);

        assert!(report.contains("Ingredient Hazard Classifier Training Report"));
        assert!(report.contains("Training Label Distribution"));
        assert!(report.contains("weighted avg"));
    }

    #[test]
    fn test_save_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let run = TrainingPipeline::new(synthetic_config()).run().unwrap();

        let (artifact_dir, manifest) = TrainingPipeline::save_model(&run.model, dir.path()).unwrap();
        assert_eq!(manifest.n_trees, 60);
        let loaded = ModelStore::load(&artifact_dir).unwrap();
        assert_eq!(loaded.vectorizer().terms(), run.model.vectorizer().terms());

        let results_path = dir.path().join("results.json");
        TrainingPipeline::save_results(&run.results, &results_path).unwrap();
        assert!(results_path.exists());

        let cards = TrainingPipeline::save_model_card(&run.results, dir.path()).unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|p| p.exists()));
    }
}
