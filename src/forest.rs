// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Random forest over sparse TF-IDF features
//!
//! Implements:
//! - CART decision trees with weighted Gini impurity
//! - Bootstrap aggregation with seeded per-tree randomness
//! - Per-node random feature subsets (`sqrt(n_features)` by default)
//! - `balanced` class weights, layered on top of any resampling
//!
//! Prediction averages the leaf class distributions of all trees.

use crate::error::{HazardError, Result};
use crate::features::FeatureVector;
use crate::labels::{HazardClass, NUM_CLASSES};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_N_TREES: usize = 300;

/// How class frequencies are compensated during tree growth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    Uniform,
    /// `n_samples / (n_classes * n_samples_in_class)`
    Balanced,
}

/// Number of features examined when splitting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    All,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(n) => (*n).min(n_features),
        };
        n.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub seed: u64,
    pub class_weight: ClassWeight,
    pub max_features: MaxFeatures,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_N_TREES,
            seed: 42,
            class_weight: ClassWeight::Balanced,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
        }
    }
}

/// Class prediction with the averaged vote distribution
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: HazardClass,
    pub probabilities: [f64; NUM_CLASSES],
}

impl Prediction {
    /// Probability assigned to the predicted class
    pub fn confidence(&self) -> f64 {
        self.probabilities[self.class.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: [f64; NUM_CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        /// Weighted impurity decrease achieved by this split
        gain: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_proba(&self, row: &FeatureVector) -> [f64; NUM_CLASSES] {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Leaf { distribution } => return *distribution,
                Node::Split { feature, threshold, left, right, .. } => {
                    current = if row.get(*feature) <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Check that every node is reachable without cycles and every split
    /// reads a feature inside `n_features`.
    fn validate(&self, tree: usize, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(HazardError::VersionMismatch(format!("tree {} has no nodes", tree)));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split { feature, left, right, .. } = node {
                if *feature >= n_features {
                    return Err(HazardError::VersionMismatch(format!(
                        "tree {} node {} splits on feature {} of a {}-dimensional space",
                        tree, idx, feature, n_features
                    )));
                }
                // Children are always stored after their parent
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(HazardError::VersionMismatch(format!(
                            "tree {} node {} points to child {} of {} nodes",
                            tree,
                            idx,
                            child,
                            self.nodes.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[node] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    fn accumulate_importances(&self, out: &mut [f64]) {
        let mut local = vec![0.0; out.len()];
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                local[*feature] += gain.max(0.0);
            }
        }
        let total: f64 = local.iter().sum();
        if total > 0.0 {
            for (acc, value) in out.iter_mut().zip(local) {
                *acc += value / total;
            }
        }
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    config: ForestConfig,
    class_weights: [f64; NUM_CLASSES],
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on `n_features`-dimensional sparse rows.
    ///
    /// Deterministic for a fixed `config.seed` and identical inputs.
    pub fn fit(
        features: &[FeatureVector],
        labels: &[HazardClass],
        n_features: usize,
        config: &ForestConfig,
    ) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(HazardError::Vectorization(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if features.is_empty() {
            return Err(HazardError::MissingData("training set is empty".to_string()));
        }
        if n_features == 0 {
            return Err(HazardError::Vectorization("feature space is empty".to_string()));
        }
        if let Some(bad) = features.iter().flat_map(|f| f.indices.iter()).find(|&&i| i >= n_features) {
            return Err(HazardError::Vectorization(format!(
                "feature index {} outside a {}-dimensional space",
                bad, n_features
            )));
        }
        if config.n_trees == 0 {
            return Err(HazardError::MissingData("forest needs at least one tree".to_string()));
        }

        let class_weights = compute_class_weights(labels, config.class_weight);
        let max_features = config.max_features.resolve(n_features);
        let mut master = ChaCha8Rng::seed_from_u64(config.seed);

        tracing::info!(
            "Training random forest: {} trees, {} samples, {} features ({} per split)",
            config.n_trees,
            features.len(),
            n_features,
            max_features
        );

        let mut trees = Vec::with_capacity(config.n_trees);
        for tree_idx in 0..config.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(master.gen());
            let n = features.len();

            let mut counts = vec![0usize; n];
            if config.bootstrap {
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1;
                }
            } else {
                counts.iter_mut().for_each(|c| *c = 1);
            }

            let weights: Vec<f64> = counts
                .iter()
                .zip(labels)
                .map(|(&c, label)| c as f64 * class_weights[label.index()])
                .collect();
            let samples: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let builder = TreeBuilder {
                features,
                labels,
                weights,
                max_features,
                max_depth: config.max_depth,
                min_samples_split: config.min_samples_split.max(2),
                rng,
                nodes: Vec::new(),
            };
            let tree = builder.build(samples);

            if (tree_idx + 1) % 50 == 0 {
                tracing::debug!("Fitted {}/{} trees", tree_idx + 1, config.n_trees);
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features,
            config: config.clone(),
            class_weights,
            trees,
        })
    }

    /// Structural check for forests read back from disk
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(HazardError::VersionMismatch("forest has no trees".to_string()));
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(idx, tree)| tree.validate(idx, self.n_features))
    }

    /// Averaged class distribution over all trees
    pub fn predict_proba(&self, row: &FeatureVector) -> [f64; NUM_CLASSES] {
        let mut sum = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            for (acc, p) in sum.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        sum.map(|s| s / n)
    }

    pub fn predict(&self, row: &FeatureVector) -> Prediction {
        let probabilities = self.predict_proba(row);
        let mut best = 0;
        for (idx, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[best] {
                best = idx;
            }
        }
        Prediction {
            class: HazardClass::from_index(best).unwrap_or(HazardClass::Low),
            probabilities,
        }
    }

    pub fn predict_batch(&self, rows: &[FeatureVector]) -> Vec<Prediction> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Input dimensionality the forest was trained for
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn class_weights(&self) -> [f64; NUM_CLASSES] {
        self.class_weights
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean decrease in impurity per feature, normalized to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.accumulate_importances(&mut importances);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        importances
    }
}

fn compute_class_weights(labels: &[HazardClass], mode: ClassWeight) -> [f64; NUM_CLASSES] {
    match mode {
        ClassWeight::Uniform => [1.0; NUM_CLASSES],
        ClassWeight::Balanced => {
            let mut counts = [0usize; NUM_CLASSES];
            for label in labels {
                counts[label.index()] += 1;
            }
            let present = counts.iter().filter(|&&c| c > 0).count() as f64;
            let n = labels.len() as f64;
            counts.map(|c| if c == 0 { 1.0 } else { n / (present * c as f64) })
        }
    }
}

/// `W * gini` for a node with class weight totals `totals` summing to `total`
fn weighted_gini(totals: &[f64; NUM_CLASSES], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    total - totals.iter().map(|w| w * w).sum::<f64>() / total
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    features: &'a [FeatureVector],
    labels: &'a [HazardClass],
    weights: Vec<f64>,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(mut self, samples: Vec<usize>) -> DecisionTree {
        self.nodes.push(Node::Leaf { distribution: [0.0; NUM_CLASSES] });
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((node_id, samples, depth)) = stack.pop() {
            let totals = self.class_totals(&samples);
            let pure = totals.iter().filter(|&&w| w > 0.0).count() <= 1;
            let depth_ok = self.max_depth.map_or(true, |max| depth < max);

            let split = if !pure && depth_ok && samples.len() >= self.min_samples_split {
                self.best_split(&samples, &totals)
            } else {
                None
            };

            match split {
                Some(best) => {
                    let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                        .iter()
                        .partition(|&&i| self.features[i].get(best.feature) <= best.threshold);

                    let left = self.nodes.len();
                    let right = left + 1;
                    self.nodes.push(Node::Leaf { distribution: [0.0; NUM_CLASSES] });
                    self.nodes.push(Node::Leaf { distribution: [0.0; NUM_CLASSES] });
                    self.nodes[node_id] = Node::Split {
                        feature: best.feature,
                        threshold: best.threshold,
                        gain: best.gain,
                        left,
                        right,
                    };

                    stack.push((right, right_samples, depth + 1));
                    stack.push((left, left_samples, depth + 1));
                }
                None => {
                    let total: f64 = totals.iter().sum();
                    let distribution = if total > 0.0 {
                        totals.map(|w| w / total)
                    } else {
                        [1.0 / NUM_CLASSES as f64; NUM_CLASSES]
                    };
                    self.nodes[node_id] = Node::Leaf { distribution };
                }
            }
        }

        DecisionTree { nodes: self.nodes }
    }

    fn class_totals(&self, samples: &[usize]) -> [f64; NUM_CLASSES] {
        let mut totals = [0.0; NUM_CLASSES];
        for &i in samples {
            totals[self.labels[i].index()] += self.weights[i];
        }
        totals
    }

    /// Best threshold over a random subset of the features that vary in
    /// this node. Keeps drawing past `max_features` until one valid split
    /// has been found.
    fn best_split(&mut self, samples: &[usize], totals: &[f64; NUM_CLASSES]) -> Option<SplitCandidate> {
        let mut candidates: Vec<usize> = samples
            .iter()
            .flat_map(|&i| self.features[i].indices.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        candidates.shuffle(&mut self.rng);

        let parent_total: f64 = totals.iter().sum();
        let parent_impurity = weighted_gini(totals, parent_total);
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature in candidates {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            let mut column: Vec<(f64, usize)> = samples
                .iter()
                .map(|&i| (self.features[i].get(feature), i))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let (first, last) = (column[0].0, column[column.len() - 1].0);
            if first == last {
                continue;
            }
            visited += 1;

            let mut left = [0.0; NUM_CLASSES];
            let mut right = *totals;
            for pos in 0..column.len() - 1 {
                let (value, idx) = column[pos];
                let class = self.labels[idx].index();
                left[class] += self.weights[idx];
                right[class] -= self.weights[idx];

                let next = column[pos + 1].0;
                if next <= value {
                    continue;
                }

                let left_total: f64 = left.iter().sum();
                let right_total = parent_total - left_total;
                let impurity = weighted_gini(&left, left_total) + weighted_gini(&right, right_total);

                if best.as_ref().map_or(true, |b| impurity < b.impurity - 1e-12) {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                        gain: parent_impurity - impurity,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(idx: usize) -> FeatureVector {
        FeatureVector::from_pairs(vec![(idx, 1.0)])
    }

    fn separable() -> (Vec<FeatureVector>, Vec<HazardClass>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (offset, class) in [(0, HazardClass::Low), (4, HazardClass::Medium), (8, HazardClass::High)] {
            for i in 0..4 {
                features.push(one_hot(offset + i));
                labels.push(class);
            }
        }
        (features, labels)
    }

    fn small_config(seed: u64) -> ForestConfig {
        ForestConfig {
            n_trees: 100,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn test_fits_training_data() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, 12, &small_config(42)).unwrap();

        let correct = forest
            .predict_batch(&features)
            .iter()
            .zip(&labels)
            .filter(|(p, l)| p.class == **l)
            .count();
        assert_eq!(correct, labels.len());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, 12, &small_config(1)).unwrap();

        let probs = forest.predict_proba(&FeatureVector::default());
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let (features, labels) = separable();
        let a = RandomForest::fit(&features, &labels, 12, &small_config(7)).unwrap();
        let b = RandomForest::fit(&features, &labels, 12, &small_config(7)).unwrap();
        assert_eq!(a, b);

        let zero = FeatureVector::default();
        assert_eq!(a.predict(&zero), b.predict(&zero));
    }

    #[test]
    fn test_balanced_class_weights() {
        let labels = vec![HazardClass::Low, HazardClass::Low, HazardClass::Low, HazardClass::High];
        let weights = compute_class_weights(&labels, ClassWeight::Balanced);

        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[2] - 2.0).abs() < 1e-12);
        assert_eq!(weights[1], 1.0);
        assert_eq!(compute_class_weights(&labels, ClassWeight::Uniform), [1.0; NUM_CLASSES]);
    }

    #[test]
    fn test_rejects_out_of_range_features() {
        let features = vec![one_hot(5)];
        let labels = vec![HazardClass::Low];
        let err = RandomForest::fit(&features, &labels, 3, &small_config(1)).unwrap_err();
        assert!(matches!(err, HazardError::Vectorization(_)));
    }

    #[test]
    fn test_rejects_empty_training_set() {
        let err = RandomForest::fit(&[], &[], 3, &small_config(1)).unwrap_err();
        assert!(matches!(err, HazardError::MissingData(_)));
    }

    #[test]
    fn test_max_depth_limits_trees() {
        let (features, labels) = separable();
        let config = ForestConfig {
            max_depth: Some(1),
            ..small_config(3)
        };
        let forest = RandomForest::fit(&features, &labels, 12, &config).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_feature_importances_normalized() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, 12, &small_config(5)).unwrap();

        let importances = forest.feature_importances();
        assert_eq!(importances.len(), 12);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(100), 10);
        assert_eq!(MaxFeatures::Sqrt.resolve(0), 1);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Count(50).resolve(7), 7);
    }

    #[test]
    fn test_validate_rejects_corrupt_structure() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, 12, &small_config(9)).unwrap();
        assert!(forest.validate().is_ok());

        let mut dangling = forest.clone();
        let node = dangling.trees[0]
            .nodes
            .iter_mut()
            .find(|n| matches!(n, Node::Split { .. }))
            .unwrap();
        if let Node::Split { left, .. } = node {
            *left = 999;
        }
        assert!(matches!(dangling.validate(), Err(HazardError::VersionMismatch(_))));

        let mut wide = forest.clone();
        wide.n_features = 2;
        assert!(matches!(wide.validate(), Err(HazardError::VersionMismatch(_))));

        let mut empty = forest;
        empty.trees.clear();
        assert!(matches!(empty.validate(), Err(HazardError::VersionMismatch(_))));
    }
}
