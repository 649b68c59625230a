// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classify an ingredient list with a trained model artifact
//!
//! Usage:
//!   hazard-classify --model ./model/artifact --text "Aqua, Glycerin, Parfum"
//!   tesseract label.png - | hazard-classify --model ./model/artifact

use anyhow::{Context, Result};
use clap::Parser;
use ingredient_hazard::inference::HazardClassifier;
use ingredient_hazard::model_store::ModelStore;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hazard-classify")]
#[command(about = "Classify a cosmetic ingredient list")]
#[command(version)]
struct Args {
    /// Model artifact directory written by hazard-train
    #[arg(short, long, default_value = "model/artifact")]
    model: PathBuf,

    /// Ingredient text to classify
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,

    /// Read the ingredient text from a file (stdin when neither is given)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let model = ModelStore::load(&args.model)
        .with_context(|| format!("Failed to load model from {}", args.model.display()))?;
    let classifier = HazardClassifier::new(Arc::new(model));

    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let result = match classifier.classify(&text) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.render_report());
        let unknown = result.ingredients.iter().filter(|i| !i.in_vocabulary).count();
        if unknown > 0 {
            println!("\n{} ingredient(s) were not seen during training.", unknown);
        }
    }

    Ok(())
}
