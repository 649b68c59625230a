// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Cleanup of raw OCR text before tokenization

use regex::Regex;
use std::sync::LazyLock;

/// Ingredient lists conventionally open with the diluent. `aqua` must be a
/// whole word, `water` may appear inside a longer word.
static LIST_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\baqua\b|water").unwrap());

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9,\s\-]").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize raw OCR output into a comma-separated ingredient string.
///
/// Lower-cases, drops everything before the first `aqua`/`water` (text
/// without either is kept whole), removes characters other than ASCII
/// letters, digits, commas, hyphens and whitespace, then collapses and trims
/// whitespace.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();

    let start = LIST_START.find(&lowered).map_or(0, |m| m.start());
    let stripped = DISALLOWED.replace_all(&lowered[start..], "");

    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_already_starting_with_aqua() {
        assert_eq!(
            normalize("AQUA, Glycerin, Phenoxyethanol, UnknownExoticCompoundXYZ"),
            "aqua, glycerin, phenoxyethanol, unknownexoticcompoundxyz"
        );
    }

    #[test]
    fn test_drops_text_before_list() {
        assert_eq!(
            normalize("Net wt 50ml\nINGREDIENTS: Water, Glycerin"),
            "water, glycerin"
        );
        assert_eq!(normalize("Ingredients: Aqua (Water), Parfum"), "aqua water, parfum");
    }

    #[test]
    fn test_aqua_must_be_whole_word() {
        // "aquatic" does not start the list, the "water" inside "rosewater" does
        assert_eq!(normalize("Aquatic extract, Rosewater, Glycerin"), "water, glycerin");
        assert_eq!(normalize("Aquatic extract, Aqua, Glycerin"), "aqua, glycerin");
    }

    #[test]
    fn test_water_matches_inside_words() {
        assert_eq!(normalize("Brand: Saltwater Co, Limonene"), "water co, limonene");
    }

    #[test]
    fn test_passthrough_without_marker() {
        assert_eq!(normalize("Glycerin,   Parfum!!  "), "glycerin, parfum");
    }

    #[test]
    fn test_keeps_hyphens_and_digits() {
        assert_eq!(normalize("water, PEG-40, CI 77891*"), "water, peg-40, ci 77891");
    }

    #[test]
    fn test_fully_stripped_input() {
        assert_eq!(normalize("  ***  !!  "), "");
        assert_eq!(normalize(""), "");
    }
}
