// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training CLI for the ingredient hazard classifier
//!
//! Usage:
//!   hazard-train --data ./ingredients.csv --seed 42
//!   hazard-train --trees 100 --k-neighbors 3 --output ./model

use anyhow::Result;
use clap::{Parser, ValueEnum};
use ingredient_hazard::labels::HazardClass;
use ingredient_hazard::pipeline::{TrainingConfig, TrainingPipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
    Both,
}

#[derive(Parser, Debug)]
#[command(name = "hazard-train")]
#[command(about = "Train the cosmetic ingredient hazard classifier")]
#[command(version)]
struct Args {
    /// Dataset CSV with `Ingredient` and `EWG Rating` columns (synthetic when omitted)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Fraction of ingredients held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Split without preserving class proportions
    #[arg(long)]
    no_stratify: bool,

    /// Number of trees in the forest
    #[arg(short, long, default_value_t = 300)]
    trees: usize,

    /// Neighbours used by SMOTE oversampling
    #[arg(short, long, default_value_t = 5)]
    k_neighbors: usize,

    /// Output directory for the model artifact and reports
    #[arg(short, long, default_value = "model")]
    output: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,

    /// Generate a model card
    #[arg(long, default_value_t = true)]
    model_card: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Ingredient Hazard Classifier Training");
    tracing::info!("=====================================");
    tracing::info!("Seed: {}", args.seed);
    tracing::info!("Trees: {}, SMOTE k: {}", args.trees, args.k_neighbors);

    let config = TrainingConfig {
        seed: args.seed,
        dataset_path: args.data.map(|p| p.to_string_lossy().to_string()),
        test_size: args.test_size,
        stratify: !args.no_stratify,
        n_trees: args.trees,
        k_neighbors: args.k_neighbors,
        output_dir: args.output.to_string_lossy().to_string(),
    };

    let run = TrainingPipeline::new(config).run()?;
    let results = &run.results;

    println!("\n{}", "=".repeat(60));
    println!("TRAINING SUMMARY");
    println!("{}", "=".repeat(60));
    println!("\nDataset: {}", results.dataset_info.source);
    println!(
        "  Rows: {} read, {} dropped, {} out of range",
        results.dataset_info.total_rows,
        results.cleaning.dropped_count(),
        results.labeling.out_of_range
    );
    println!(
        "  Split: {} train / {} test",
        results.dataset_info.train_samples, results.dataset_info.test_samples
    );
    println!("  Vocabulary: {} terms", results.vocabulary_size);

    println!("\nTraining distribution:");
    for class in HazardClass::ALL {
        let count = results.dataset_info.label_distribution.get(class.as_str()).copied().unwrap_or(0);
        println!("  {:<7} ({:>4}): {}", class, class.rating_range(), count);
    }

    println!("\n{}", results.metrics.format());

    std::fs::create_dir_all(&args.output)?;

    let (artifact_dir, _) = TrainingPipeline::save_model(&run.model, &args.output)?;
    println!("Model artifact saved to: {}", artifact_dir.display());

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    if matches!(args.format, OutputFormat::Json | OutputFormat::Both) {
        let json_path = args.output.join(format!("training_{}.json", timestamp));
        TrainingPipeline::save_results(results, &json_path)?;
        println!("JSON results saved to: {}", json_path.display());
    }

    if matches!(args.format, OutputFormat::Markdown | OutputFormat::Both) {
        let report = TrainingPipeline::generate_report(results);
        let md_path = args.output.join(format!("training_{}.md", timestamp));
        std::fs::write(&md_path, report)?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    if args.model_card {
        let cards = TrainingPipeline::save_model_card(results, &args.output)?;
        println!("Model card saved to: {} ({} files)", args.output.display(), cards.len());
    }

    println!("\nTraining complete!");

    Ok(())
}
