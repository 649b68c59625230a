// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Hazard classes and the rating binner
//!
//! EWG ratings are continuous in (-1, 10]. They are discretized into three
//! closed-ended bins:
//! - (-1, 2]  → LOW
//! - (2, 6]   → MEDIUM
//! - (6, 10]  → HIGH

use crate::datasets::IngredientRecord;
use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hazard classes
pub const NUM_CLASSES: usize = 3;

/// Lower (exclusive) bound of the classifiable rating interval
pub const RATING_MIN_EXCLUSIVE: f64 = -1.0;
/// Upper (inclusive) bound of the classifiable rating interval
pub const RATING_MAX: f64 = 10.0;

const LOW_UPPER: f64 = 2.0;
const MEDIUM_UPPER: f64 = 6.0;

/// Discretized hazard label of an ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HazardClass {
    Low,
    Medium,
    High,
}

impl HazardClass {
    pub const ALL: [HazardClass; NUM_CLASSES] = [HazardClass::Low, HazardClass::Medium, HazardClass::High];

    /// Bin a continuous rating. Boundary values belong to the lower class.
    pub fn from_rating(rating: f64) -> Result<Self> {
        if !rating.is_finite() || rating <= RATING_MIN_EXCLUSIVE || rating > RATING_MAX {
            return Err(HazardError::LabelOutOfRange(rating));
        }
        Ok(if rating <= LOW_UPPER {
            HazardClass::Low
        } else if rating <= MEDIUM_UPPER {
            HazardClass::Medium
        } else {
            HazardClass::High
        })
    }

    /// Stable numeric id (0 = LOW, 1 = MEDIUM, 2 = HIGH)
    pub fn index(&self) -> usize {
        match self {
            HazardClass::Low => 0,
            HazardClass::Medium => 1,
            HazardClass::High => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardClass::Low => "LOW",
            HazardClass::Medium => "MEDIUM",
            HazardClass::High => "HIGH",
        }
    }

    /// Human-readable rating range of the bin
    pub fn rating_range(&self) -> &'static str {
        match self {
            HazardClass::Low => "0-2",
            HazardClass::Medium => "3-6",
            HazardClass::High => "7-10",
        }
    }
}

impl fmt::Display for HazardClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingredient name paired with its binned label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledIngredient {
    pub name: String,
    pub class: HazardClass,
}

/// Outcome of binning a cleaned record collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelingReport {
    pub labeled: usize,
    pub out_of_range: usize,
}

/// Bin every record with a rating, dropping the unclassifiable ones.
///
/// Records are expected to come out of `Dataset::clean`, so a missing rating
/// is counted as out of range rather than imputed.
pub fn label_records(records: &[IngredientRecord]) -> (Vec<LabeledIngredient>, LabelingReport) {
    let mut report = LabelingReport::default();
    let mut labeled = Vec::with_capacity(records.len());

    for record in records {
        let class = match record.ewg_rating.map(HazardClass::from_rating) {
            Some(Ok(class)) => class,
            Some(Err(e)) => {
                tracing::debug!("Dropping '{}' from training: {}", record.name, e);
                report.out_of_range += 1;
                continue;
            }
            None => {
                tracing::debug!("Dropping '{}' from training: no rating", record.name);
                report.out_of_range += 1;
                continue;
            }
        };
        labeled.push(LabeledIngredient {
            name: record.name.clone(),
            class,
        });
    }

    report.labeled = labeled.len();
    if report.out_of_range > 0 {
        tracing::warn!(
            "{} record(s) had ratings outside (-1, 10] and were dropped",
            report.out_of_range
        );
    }

    (labeled, report)
}
