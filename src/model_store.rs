// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Versioned on-disk model artifact
//!
//! An artifact is a directory holding three JSON files:
//! - `vectorizer.json`: vocabulary and IDF weights
//! - `classifier.json`: the random forest
//! - `manifest.json`: format version, dimensions and a SHA-256 per part
//!
//! Loading refuses any artifact whose parts do not belong together.

use crate::error::{HazardError, Result};
use crate::features::TfIdfVectorizer;
use crate::forest::RandomForest;
use crate::labels::HazardClass;
use crate::model::TrainedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Bumped whenever the serialized layout of either part changes
pub const FORMAT_VERSION: u32 = 1;

pub const VECTORIZER_FILE: &str = "vectorizer.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    /// Crate version that wrote the artifact
    pub crate_version: String,
    pub created_at: DateTime<Utc>,
    pub vocabulary_size: usize,
    pub classifier_features: usize,
    pub n_trees: usize,
    pub labels: Vec<HazardClass>,
    pub seed: u64,
    pub vectorizer_sha256: String,
    pub classifier_sha256: String,
}

/// Reads and writes model artifacts
pub struct ModelStore;

impl ModelStore {
    /// Write `model` into `dir`, creating the directory if needed
    pub fn save(model: &TrainedModel, dir: &Path) -> Result<ArtifactManifest> {
        fs::create_dir_all(dir)?;

        let vectorizer_bytes = serde_json::to_vec(model.vectorizer())?;
        let classifier_bytes = serde_json::to_vec(model.forest())?;

        fs::write(dir.join(VECTORIZER_FILE), &vectorizer_bytes)?;
        fs::write(dir.join(CLASSIFIER_FILE), &classifier_bytes)?;

        let manifest = ArtifactManifest {
            format_version: FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            vocabulary_size: model.vectorizer().vocabulary_size(),
            classifier_features: model.forest().n_features(),
            n_trees: model.forest().n_trees(),
            labels: HazardClass::ALL.to_vec(),
            seed: model.forest().config().seed,
            vectorizer_sha256: sha256_hex(&vectorizer_bytes),
            classifier_sha256: sha256_hex(&classifier_bytes),
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

        tracing::info!(
            "Model artifact saved to {} ({} terms, {} trees)",
            dir.display(),
            manifest.vocabulary_size,
            manifest.n_trees
        );
        Ok(manifest)
    }

    /// Load and validate the artifact in `dir`
    pub fn load(dir: &Path) -> Result<TrainedModel> {
        let manifest = Self::read_manifest(dir)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(HazardError::VersionMismatch(format!(
                "artifact format {} is not supported (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        if manifest.labels != HazardClass::ALL {
            return Err(HazardError::VersionMismatch(format!(
                "artifact labels {:?} do not match {:?}",
                manifest.labels,
                HazardClass::ALL
            )));
        }

        let vectorizer_bytes = read_part(dir, VECTORIZER_FILE, &manifest.vectorizer_sha256)?;
        let classifier_bytes = read_part(dir, CLASSIFIER_FILE, &manifest.classifier_sha256)?;

        let mut vectorizer: TfIdfVectorizer = serde_json::from_slice(&vectorizer_bytes)?;
        vectorizer.check_consistency()?;
        vectorizer.rebuild_index();
        let forest: RandomForest = serde_json::from_slice(&classifier_bytes)?;
        forest.validate()?;

        if vectorizer.vocabulary_size() != manifest.vocabulary_size
            || forest.n_features() != manifest.classifier_features
        {
            return Err(HazardError::VersionMismatch(format!(
                "manifest records {} terms / {} features, parts have {} / {}",
                manifest.vocabulary_size,
                manifest.classifier_features,
                vectorizer.vocabulary_size(),
                forest.n_features()
            )));
        }

        let model = TrainedModel::new(vectorizer, forest)?;
        tracing::info!(
            "Loaded model artifact from {} (created {}, crate {})",
            dir.display(),
            manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            manifest.crate_version
        );
        Ok(model)
    }

    pub fn read_manifest(dir: &Path) -> Result<ArtifactManifest> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(HazardError::VersionMismatch(format!(
                "no manifest found at {}",
                path.display()
            )));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

fn read_part(dir: &Path, name: &str, expected: &str) -> Result<Vec<u8>> {
    let bytes = fs::read(dir.join(name))?;
    let actual = sha256_hex(&bytes);
    if actual != expected {
        tracing::warn!("Checksum mismatch for {}: expected {}, got {}", name, expected, actual);
        return Err(HazardError::VersionMismatch(format!(
            "{} does not belong to this artifact (checksum mismatch)",
            name
        )));
    }
    Ok(bytes)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::round_trip_model;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = round_trip_model();

        let manifest = ModelStore::save(&model, dir.path()).unwrap();
        assert_eq!(manifest.vocabulary_size, 11);
        assert_eq!(manifest.classifier_features, 11);

        let loaded = ModelStore::load(dir.path()).unwrap();
        for name in ["water", "glycerin", "fragrance"] {
            let before = model.predict_text(name).unwrap();
            let after = loaded.predict_text(name).unwrap();
            assert_eq!(before.class, after.class);
            for (a, b) in before.probabilities.iter().zip(after.probabilities.iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_swapped_part_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        ModelStore::save(&round_trip_model(), dir.path()).unwrap();

        let mut other_vectorizer = TfIdfVectorizer::new();
        other_vectorizer.fit(&["water", "glycerin"]).unwrap();
        fs::write(
            dir.path().join(VECTORIZER_FILE),
            serde_json::to_vec(&other_vectorizer).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ModelStore::load(dir.path()),
            Err(HazardError::VersionMismatch(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = round_trip_model();
        ModelStore::save(&model, dir.path()).unwrap();

        // A consistent-looking manifest over a vectorizer of the wrong size
        let mut small = TfIdfVectorizer::new();
        small.fit(&["water", "glycerin"]).unwrap();
        let bytes = serde_json::to_vec(&small).unwrap();
        fs::write(dir.path().join(VECTORIZER_FILE), &bytes).unwrap();

        let mut manifest = ModelStore::read_manifest(dir.path()).unwrap();
        manifest.vectorizer_sha256 = sha256_hex(&bytes);
        manifest.vocabulary_size = small.vocabulary_size();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ModelStore::load(dir.path()),
            Err(HazardError::VersionMismatch(_))
        ));
    }

    #[test]
    fn test_dangling_tree_node_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        ModelStore::save(&round_trip_model(), dir.path()).unwrap();

        // Re-checksummed classifier whose first split points past the node list
        let path = dir.path().join(CLASSIFIER_FILE);
        let mut forest: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let split = forest["trees"]
            .as_array_mut()
            .unwrap()
            .iter_mut()
            .flat_map(|tree| tree["nodes"].as_array_mut().unwrap().iter_mut())
            .find_map(|node| node.get_mut("Split"))
            .unwrap();
        split["right"] = serde_json::json!(100_000);
        let bytes = serde_json::to_vec(&forest).unwrap();
        fs::write(&path, &bytes).unwrap();

        let mut manifest = ModelStore::read_manifest(dir.path()).unwrap();
        manifest.classifier_sha256 = sha256_hex(&bytes);
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ModelStore::load(dir.path()),
            Err(HazardError::VersionMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        ModelStore::save(&round_trip_model(), dir.path()).unwrap();

        let mut manifest = ModelStore::read_manifest(dir.path()).unwrap();
        manifest.format_version = FORMAT_VERSION + 1;
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ModelStore::load(dir.path()),
            Err(HazardError::VersionMismatch(_))
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelStore::load(dir.path()),
            Err(HazardError::VersionMismatch(_))
        ));
    }
}
