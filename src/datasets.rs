// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Ingredient dataset loading and cleaning
//!
//! The dataset is a CSV file with one ingredient per row:
//!
//! ```text
//! Ingredient,EWG Rating,CMG Rating
//! Glycerin,1,0
//! Fragrance,8,N/A
//! ```
//!
//! Loading keeps every cell as raw text. Cleaning trims names, coerces the
//! EWG rating to a number and drops (with a count) every row that is left
//! without a usable name or rating.

use crate::error::{HazardError, Result};
use crate::labels::{HazardClass, LabeledIngredient};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

pub const NAME_COLUMN: &str = "Ingredient";
pub const EWG_COLUMN: &str = "EWG Rating";
pub const CMG_COLUMN: &str = "CMG Rating";

static SINGLE_RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:EWG\s*)?(\d+(?:\.\d+)?)$").unwrap());
static RATING_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:EWG\s*)?(\d+)\s*-\s*(\d+)$").unwrap());

/// A row exactly as read from the source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub name: Option<String>,
    pub ewg_rating: Option<String>,
    pub cmg_rating: Option<String>,
}

/// A cleaned ingredient entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecord {
    /// Ingredient name, trimmed and never empty
    pub name: String,
    /// Primary hazard rating used as the training label
    pub ewg_rating: Option<f64>,
    /// Secondary rating, carried along but ignored by the classifier
    pub cmg_rating: Option<f64>,
}

/// Dataset as loaded from disk, before any cleaning
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub source: String,
    pub records: Vec<RawRecord>,
}

/// A cleaned, immutable record collection
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: String,
    pub records: Vec<IngredientRecord>,
}

/// Why a row did not survive cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    MissingName,
    MissingRating,
    UnparsableRating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedRecord {
    pub row: usize,
    pub name: Option<String>,
    pub reason: DropReason,
}

/// Accounting of every row removed by [`RawDataset::clean`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub total_rows: usize,
    pub kept: usize,
    pub dropped: Vec<DroppedRecord>,
}

impl CleaningReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }
}

impl RawDataset {
    /// Load a dataset CSV from disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            HazardError::Format(format!("Failed to open dataset file {}: {}", path.display(), e))
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Parse a dataset CSV from any reader
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| HazardError::Format(format!("Failed to read header of {}: {}", source, e)))?
            .clone();

        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(wanted))
        };

        let name_idx = find(NAME_COLUMN)
            .ok_or_else(|| HazardError::Format(format!("{} has no '{}' column", source, NAME_COLUMN)))?;
        let ewg_idx = find(EWG_COLUMN)
            .ok_or_else(|| HazardError::Format(format!("{} has no '{}' column", source, EWG_COLUMN)))?;
        let cmg_idx = find(CMG_COLUMN);

        let mut records = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let row = idx + 1;
            let record = result
                .map_err(|e| HazardError::Format(format!("Failed to read row {} in {}: {}", row, source, e)))?;

            let cell = |i: usize| record.get(i).map(str::to_string);
            records.push(RawRecord {
                row,
                name: cell(name_idx),
                ewg_rating: cell(ewg_idx),
                cmg_rating: cmg_idx.and_then(cell),
            });
        }

        tracing::info!("Loaded {} rows from {}", records.len(), source);

        Ok(Self {
            source: source.to_string(),
            records,
        })
    }

    /// Drop unusable rows and coerce ratings to numbers.
    ///
    /// A row is kept only if its name is non-empty after trimming and its
    /// EWG rating coerces to a finite number. The rating check runs after
    /// coercion so unparsable ratings never reach training as unlabeled rows.
    pub fn clean(&self) -> (Dataset, CleaningReport) {
        let mut report = CleaningReport {
            total_rows: self.records.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(self.records.len());

        for raw in &self.records {
            let name = raw.name.as_deref().map(str::trim).unwrap_or("");
            if name.is_empty() {
                report.dropped.push(DroppedRecord {
                    row: raw.row,
                    name: None,
                    reason: DropReason::MissingName,
                });
                tracing::debug!("Row {}: dropped, missing ingredient name", raw.row);
                continue;
            }

            let rating_text = raw.ewg_rating.as_deref().map(str::trim).unwrap_or("");
            if rating_text.is_empty() {
                report.dropped.push(DroppedRecord {
                    row: raw.row,
                    name: Some(name.to_string()),
                    reason: DropReason::MissingRating,
                });
                tracing::debug!("Row {}: dropped '{}', missing rating", raw.row, name);
                continue;
            }

            let Some(ewg_rating) = parse_rating(rating_text) else {
                report.dropped.push(DroppedRecord {
                    row: raw.row,
                    name: Some(name.to_string()),
                    reason: DropReason::UnparsableRating,
                });
                tracing::debug!("Row {}: dropped '{}', rating '{}' is not numeric", raw.row, name, rating_text);
                continue;
            };

            records.push(IngredientRecord {
                name: name.to_string(),
                ewg_rating: Some(ewg_rating),
                cmg_rating: raw.cmg_rating.as_deref().and_then(parse_rating),
            });
        }

        report.kept = records.len();
        if report.dropped_count() > 0 {
            tracing::warn!(
                "Cleaning dropped {} of {} rows (missing name: {}, missing rating: {}, unparsable rating: {})",
                report.dropped_count(),
                report.total_rows,
                report.count(DropReason::MissingName),
                report.count(DropReason::MissingRating),
                report.count(DropReason::UnparsableRating),
            );
        }

        (
            Dataset {
                source: self.source.clone(),
                records,
            },
            report,
        )
    }
}

/// Coerce a rating cell to a number.
///
/// Plain numbers parse directly. The catalog forms `"EWG 7"` and `"EWG 1-3"`
/// are accepted, a range reducing to its midpoint. Anything else (`"N/A"`,
/// `"5/10"`, free text around a number) yields `None`.
pub fn parse_rating(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    if let Some(caps) = SINGLE_RATING.captures(text) {
        return caps[1].parse::<f64>().ok();
    }

    let caps = RATING_RANGE.captures(text)?;
    let low = caps[1].parse::<f64>().ok()?;
    let high = caps[2].parse::<f64>().ok()?;
    Some((low + high) / 2.0)
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Built-in dataset of common cosmetic ingredients for demos and tests
    pub fn synthetic() -> Self {
        const ROWS: &[(&str, f64)] = &[
            ("Water", 1.0),
            ("Aqua", 1.0),
            ("Glycerin", 1.0),
            ("Aloe Barbadensis Leaf Juice", 1.0),
            ("Tocopherol", 1.0),
            ("Squalane", 1.0),
            ("Panthenol", 1.0),
            ("Allantoin", 1.0),
            ("Xanthan Gum", 1.0),
            ("Sodium Hyaluronate", 1.0),
            ("Caprylic-Capric Triglyceride", 1.0),
            ("Cetearyl Alcohol", 1.5),
            ("Phenoxyethanol", 4.0),
            ("Sodium Laureth Sulfate", 3.5),
            ("Cocamidopropyl Betaine", 4.0),
            ("Sodium Benzoate", 3.0),
            ("Dimethicone", 3.0),
            ("Propylene Glycol", 3.0),
            ("Polysorbate 20", 3.0),
            ("Triethanolamine", 5.0),
            ("Fragrance", 8.0),
            ("Parfum", 8.0),
            ("Oxybenzone", 8.0),
            ("Butylparaben", 7.0),
            ("Triclosan", 7.0),
            ("Retinyl Palmitate", 9.0),
            ("Hydroquinone", 9.0),
            ("Methylisothiazolinone", 7.0),
        ];

        Self {
            source: "synthetic".to_string(),
            records: ROWS
                .iter()
                .map(|(name, rating)| IngredientRecord {
                    name: name.to_string(),
                    ewg_rating: Some(*rating),
                    cmg_rating: None,
                })
                .collect(),
        }
    }

    /// Get label distribution for a labeled collection
    pub fn label_distribution(labeled: &[LabeledIngredient]) -> HashMap<HazardClass, usize> {
        let mut dist = HashMap::new();
        for item in labeled {
            *dist.entry(item.class).or_insert(0) += 1;
        }
        dist
    }
}

/// Deterministic shuffled train/test split.
///
/// `test_fraction` is clamped to [0, 1]; the test split receives
/// `ceil(n * test_fraction)` items.
pub fn train_test_split<T: Clone>(items: &[T], test_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled: Vec<T> = items.to_vec();
    shuffled.shuffle(&mut rng);

    let fraction = test_fraction.clamp(0.0, 1.0);
    let n_test = (shuffled.len() as f64 * fraction).ceil() as usize;
    let train = shuffled.split_off(n_test.min(shuffled.len()));
    (train, shuffled)
}

/// Train/test split that holds out the same fraction of every class.
///
/// Each class is split with [`train_test_split`]; both halves are then
/// shuffled so classes are interleaved.
pub fn stratified_split(
    items: &[LabeledIngredient],
    test_fraction: f64,
    seed: u64,
) -> (Vec<LabeledIngredient>, Vec<LabeledIngredient>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in HazardClass::ALL {
        let members: Vec<LabeledIngredient> = items.iter().filter(|i| i.class == class).cloned().collect();
        let (class_train, class_test) = train_test_split(&members, test_fraction, seed.wrapping_add(class.index() as u64));
        train.extend(class_train);
        test.extend(class_test);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Ingredient,EWG Rating,CMG Rating
Glycerin,1,0
  Fragrance  ,8,N/A
,3,1
Mystery Extract,N/A,2
Phenoxyethanol,EWG 3-5,
Empty Rating,,
";

    #[test]
    fn test_load_reads_all_rows() {
        let raw = RawDataset::from_reader(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        assert_eq!(raw.records.len(), 6);
        assert_eq!(raw.records[0].name.as_deref(), Some("Glycerin"));
        assert_eq!(raw.records[3].ewg_rating.as_deref(), Some("N/A"));
        assert_eq!(raw.records[0].row, 1);
    }

    #[test]
    fn test_load_missing_rating_column() {
        let csv = "Ingredient,CMG Rating\nGlycerin,1\n";
        let err = RawDataset::from_reader(csv.as_bytes(), "bad").unwrap_err();
        assert!(matches!(err, HazardError::Format(msg) if msg.contains("EWG Rating")));
    }

    #[test]
    fn test_load_missing_name_column() {
        let csv = "Name,EWG Rating\nGlycerin,1\n";
        let err = RawDataset::from_reader(csv.as_bytes(), "bad").unwrap_err();
        assert!(matches!(err, HazardError::Format(_)));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let csv = "ingredient , ewg rating\nGlycerin,1\n";
        let raw = RawDataset::from_reader(csv.as_bytes(), "lower").unwrap();
        assert_eq!(raw.records.len(), 1);
        assert_eq!(raw.records[0].cmg_rating, None);
    }

    #[test]
    fn test_clean_drops_and_counts() {
        let raw = RawDataset::from_reader(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        let (dataset, report) = raw.clean();

        assert_eq!(report.total_rows, 6);
        assert_eq!(report.kept, 3);
        assert_eq!(report.dropped_count(), 3);
        assert_eq!(report.count(DropReason::MissingName), 1);
        assert_eq!(report.count(DropReason::UnparsableRating), 1);
        assert_eq!(report.count(DropReason::MissingRating), 1);

        let names: Vec<_> = dataset.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Glycerin", "Fragrance", "Phenoxyethanol"]);
        assert_eq!(dataset.records[1].cmg_rating, None);
        assert_eq!(dataset.records[2].ewg_rating, Some(4.0));

        let noisy = "Ingredient,EWG Rating\nFoo,5/10\nBar,unknown (v2)\nBaz,Rating: -0.5\nWater,1\n";
        let (dataset, report) = RawDataset::from_reader(noisy.as_bytes(), "noisy").unwrap().clean();
        assert_eq!(report.kept, 1);
        assert_eq!(report.count(DropReason::UnparsableRating), 3);
        assert_eq!(dataset.records[0].name, "Water");
    }

    #[test]
    fn test_clean_never_keeps_unlabeled_rows() {
        let raw = RawDataset::from_reader(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        let (dataset, _) = raw.clean();
        assert!(dataset.records.iter().all(|r| r.ewg_rating.is_some()));
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("3"), Some(3.0));
        assert_eq!(parse_rating(" 2.5 "), Some(2.5));
        assert_eq!(parse_rating("-0.5"), Some(-0.5));
        assert_eq!(parse_rating("EWG 1-3"), Some(2.0));
        assert_eq!(parse_rating("EWG 7"), Some(7.0));
        assert_eq!(parse_rating("N/A"), None);
        assert_eq!(parse_rating("abc"), None);
        assert_eq!(parse_rating("NaN"), None);
        assert_eq!(parse_rating("inf"), None);
        assert_eq!(parse_rating("EWG 2.5"), Some(2.5));
        assert_eq!(parse_rating("1 - 3"), Some(2.0));
        assert_eq!(parse_rating("5/10"), None);
        assert_eq!(parse_rating("unknown (v2)"), None);
        assert_eq!(parse_rating("Rating: -0.5"), None);
        assert_eq!(parse_rating("3 (estimated, see note 9)"), None);
    }

    #[test]
    fn test_split_is_deterministic() {
        let items: Vec<usize> = (0..100).collect();
        let (train_a, test_a) = train_test_split(&items, 0.2, 42);
        let (train_b, test_b) = train_test_split(&items, 0.2, 42);

        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 80);
        assert_eq!(test_a.len(), 20);

        let (_, test_c) = train_test_split(&items, 0.2, 7);
        assert_ne!(test_a, test_c);
    }

    #[test]
    fn test_split_with_zero_fraction_keeps_everything() {
        let items = vec!["a", "b", "c"];
        let (train, test) = train_test_split(&items, 0.0, 1);
        assert_eq!(train.len(), 3);
        assert!(test.is_empty());
    }

    #[test]
    fn test_stratified_split_keeps_class_shares() {
        let (labeled, _) = crate::labels::label_records(&Dataset::synthetic().records);
        let (train, test) = stratified_split(&labeled, 0.2, 42);

        assert_eq!(train.len() + test.len(), labeled.len());
        let train_dist = Dataset::label_distribution(&train);
        let test_dist = Dataset::label_distribution(&test);
        assert_eq!(test_dist[&HazardClass::Low], 3);
        assert_eq!(test_dist[&HazardClass::Medium], 2);
        assert_eq!(test_dist[&HazardClass::High], 2);
        assert_eq!(train_dist[&HazardClass::High], 6);
    }

    #[test]
    fn test_synthetic_dataset_covers_all_classes() {
        let dataset = Dataset::synthetic();
        let (labeled, report) = crate::labels::label_records(&dataset.records);
        assert_eq!(report.out_of_range, 0);

        let dist = Dataset::label_distribution(&labeled);
        assert_eq!(dist.len(), 3);
        assert!(dist.values().all(|&n| n >= 6));
    }
}
