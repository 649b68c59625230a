// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy shared by the training and inference halves

use crate::labels::HazardClass;
use thiserror::Error;

/// Errors raised by the hazard classification library.
///
/// Training-time variants abort the batch job; inference-time variants are
/// scoped to a single request and carry a user-facing explanation through
/// [`HazardError::user_message`].
#[derive(Error, Debug)]
pub enum HazardError {
    /// The dataset source is malformed (missing columns, unreadable rows)
    #[error("Malformed dataset: {0}")]
    Format(String),

    /// A required field is missing from a record
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Rating falls outside the classifiable interval (-1, 10]
    #[error("Rating {0} is outside the classifiable interval (-1, 10]")]
    LabelOutOfRange(f64),

    /// A class is too small for nearest-neighbour oversampling
    #[error("Class {class} has {found} samples, oversampling needs at least {required}")]
    InsufficientSamples {
        class: HazardClass,
        found: usize,
        required: usize,
    },

    /// Model artifact parts are incompatible with each other or with this build
    #[error("Model artifact mismatch: {0}")]
    VersionMismatch(String),

    /// Feature extraction could not be performed
    #[error("Vectorization failed: {0}")]
    Vectorization(String),

    /// No ingredient tokens survived normalization
    #[error("No ingredients found in the input text")]
    EmptyInput,

    /// The OCR collaborator produced no usable text
    #[error("OCR failed: {0}")]
    OcrFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HazardError {
    /// Explanation suitable for showing to the person who sent the photo.
    pub fn user_message(&self) -> String {
        match self {
            HazardError::EmptyInput => {
                "No ingredient list could be recognized. Please send a sharper photo of the ingredients section."
                    .to_string()
            }
            HazardError::OcrFailure(_) => {
                "The text on the photo could not be read. Please try again with better lighting."
                    .to_string()
            }
            other => format!("The product could not be analyzed: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HazardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_samples_message() {
        let err = HazardError::InsufficientSamples {
            class: HazardClass::High,
            found: 2,
            required: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("HIGH"));
        assert!(msg.contains('2'));
        assert!(msg.contains('6'));
    }

    #[test]
    fn test_user_message_for_empty_input() {
        let msg = HazardError::EmptyInput.user_message();
        assert!(msg.contains("No ingredient list"));
    }

    #[test]
    fn test_user_message_wraps_other_errors() {
        let msg = HazardError::Vectorization("not fitted".into()).user_message();
        assert!(msg.contains("not fitted"));
    }
}
