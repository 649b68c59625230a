// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Cosmetic ingredient hazard classifier
//!
//! This crate provides:
//! - Dataset loading and cleaning for (ingredient, rating) tables
//! - Rating binning into LOW / MEDIUM / HIGH hazard classes
//! - Comma-delimited TF-IDF features and SMOTE class balancing
//! - A seeded random forest trainer and evaluation metrics
//! - A versioned, checksummed model artifact
//! - OCR text normalization, per-ingredient classification and verdicts
//! - A transport-independent request handler and model cards

pub mod balance;
pub mod datasets;
pub mod error;
pub mod features;
pub mod forest;
pub mod inference;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod model_card;
pub mod model_store;
pub mod normalize;
pub mod pipeline;
pub mod service;

pub use balance::SmoteBalancer;
pub use datasets::{CleaningReport, Dataset, IngredientRecord, RawDataset};
pub use error::HazardError;
pub use features::{FeatureVector, TfIdfVectorizer};
pub use forest::{ForestConfig, RandomForest};
pub use inference::{ClassCounts, HazardClassifier, InferenceResult, IngredientAssessment, Verdict};
pub use labels::{HazardClass, LabeledIngredient};
pub use metrics::{ConfusionMatrix, EvaluationMetrics};
pub use model::TrainedModel;
pub use model_card::{ModelCard, ModelCardBuilder};
pub use model_store::ModelStore;
pub use normalize::normalize;
pub use pipeline::{TrainingConfig, TrainingPipeline, TrainingResults};
pub use service::{BotEvent, OcrEngine, OutgoingMessage, RequestHandler, Utf8TextOcr};
