// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Class balancing by nearest-neighbour oversampling (SMOTE)
//!
//! Minority classes are grown to the majority count by interpolating between
//! a sample and one of its `k` nearest same-class neighbours. Only ever
//! applied to the training split.

use crate::error::{HazardError, Result};
use crate::features::FeatureVector;
use crate::labels::HazardClass;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

pub const DEFAULT_K_NEIGHBORS: usize = 5;

#[derive(Debug, Clone)]
pub struct SmoteBalancer {
    k_neighbors: usize,
    seed: u64,
}

impl SmoteBalancer {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Oversample every minority class up to the majority class count.
    ///
    /// Original samples come first in their input order, followed by the
    /// synthetic ones grouped by class. With `k_neighbors == 0` the
    /// neighbourhood of a sample is the sample itself, so synthetic samples
    /// are duplicates.
    pub fn balance(
        &self,
        features: &[FeatureVector],
        labels: &[HazardClass],
    ) -> Result<(Vec<FeatureVector>, Vec<HazardClass>)> {
        if features.len() != labels.len() {
            return Err(HazardError::Vectorization(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }

        let by_class = group_by_class(labels);
        let required = self.k_neighbors + 1;
        for (&class, members) in &by_class {
            if members.len() < required {
                return Err(HazardError::InsufficientSamples {
                    class,
                    found: members.len(),
                    required,
                });
            }
        }

        let majority = by_class.values().map(Vec::len).max().unwrap_or(0);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut out_features = features.to_vec();
        let mut out_labels = labels.to_vec();

        for (&class, members) in &by_class {
            let missing = majority - members.len();
            if missing == 0 {
                continue;
            }

            let neighbours = self.nearest_neighbours(features, members);
            for _ in 0..missing {
                let pick = rng.gen_range(0..members.len());
                let candidates = &neighbours[pick];
                let neighbour = candidates[rng.gen_range(0..candidates.len())];
                let gap: f64 = rng.gen();

                let origin = &features[members[pick]];
                let synthetic = if neighbour == members[pick] {
                    origin.clone()
                } else {
                    origin.interpolate(&features[neighbour], gap)
                };
                out_features.push(synthetic);
                out_labels.push(class);
            }

            tracing::debug!("Synthesized {} samples for class {}", missing, class);
        }

        tracing::info!(
            "Balanced training split: {} -> {} samples ({} per class)",
            features.len(),
            out_features.len(),
            majority
        );

        Ok((out_features, out_labels))
    }

    /// For each member, the indices (into `features`) of its k nearest
    /// same-class neighbours. Ties break on the lower index.
    fn nearest_neighbours(&self, features: &[FeatureVector], members: &[usize]) -> Vec<Vec<usize>> {
        members
            .iter()
            .map(|&i| {
                if self.k_neighbors == 0 {
                    return vec![i];
                }
                let mut distances: Vec<(f64, usize)> = members
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| (features[i].squared_distance(&features[j]), j))
                    .collect();
                distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                distances.into_iter().take(self.k_neighbors).map(|(_, j)| j).collect()
            })
            .collect()
    }
}

impl Default for SmoteBalancer {
    fn default() -> Self {
        Self::new(DEFAULT_K_NEIGHBORS, 42)
    }
}

fn group_by_class(labels: &[HazardClass]) -> BTreeMap<HazardClass, Vec<usize>> {
    let mut groups: BTreeMap<HazardClass, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(idx);
    }
    groups
}

/// Per-class sample counts
pub fn class_counts(labels: &[HazardClass]) -> BTreeMap<HazardClass, usize> {
    group_by_class(labels).into_iter().map(|(class, members)| (class, members.len())).collect()
}
