pub mod loggers;

use crate::loggers::init_logger;
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;

use sectionizer::aggregator::StructureReport;
use sectionizer::config::{ClassifyOptions, ReportConfig};
use sectionizer::error::FieldError;
use sectionizer::models::FieldRecord;
use sectionizer::pipeline::{records_from_json, FieldRow, Sectionizer};
use sectionizer::registry::RuleCatalog;
use sectionizer::report::Summary;

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
struct Args {
    /// Field dump to classify: a JSON file or a glob pattern such as `dumps/*.json`.
    #[arg(short, long)]
    input: String,

    #[arg(short, long)]
    out: Option<String>,

    /// Results below this confidence are reported as unclassified.
    #[arg(long, default_value_t = 0.0)]
    min_confidence: f32,

    /// Sections with a lower mean confidence are recommended for review.
    #[arg(long, default_value_t = 0.7)]
    review_threshold: f32,

    /// Relative deviation from the expected field count tolerated per section.
    #[arg(long, default_value_t = 0.5)]
    anomaly_tolerance: f32,

    /// JSON rule catalog replacing the built-in one.
    #[arg(short, long)]
    rules: Option<String>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
struct Output {
    generated_at: String,
    inputs: Vec<String>,
    summary: Summary,
    structure: StructureReport,
    fields: Vec<FieldRow>,
}

fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("Invalid input pattern: {}", pattern))? {
        paths.push(entry?);
    }
    paths.sort();
    return Ok(paths);
}

async fn build_sectionizer(args: &Args) -> Result<Sectionizer> {
    let sectionizer = match &args.rules {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read rule catalog {}", path))?;
            let catalog = RuleCatalog::from_json(&json)?;
            Sectionizer::from_catalog(&catalog)?
        }
        None => Sectionizer::new()?,
    };
    let options = ClassifyOptions::new()
        .with_verbose(args.verbose)
        .with_min_confidence(args.min_confidence);
    let report_config = ReportConfig::new()
        .with_review_threshold(args.review_threshold)
        .with_anomaly_tolerance(args.anomaly_tolerance);
    return Ok(sectionizer.with_options(options).with_report_config(report_config));
}

async fn read_records(paths: &[PathBuf], verbose: bool) -> Result<Vec<Result<FieldRecord, FieldError>>> {
    let pb: Option<ProgressBar> = if verbose {
        let pb = ProgressBar::new(paths.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg}")?
                .progress_chars("█▓▒░"),
        );
        pb.set_message("Reading field dumps...");
        Some(pb)
    } else {
        None
    };

    let reads = paths.iter().map(|path| {
        let pb = pb.clone();
        async move {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let records = records_from_json(&text).with_context(|| format!("Invalid field dump {}", path.display()))?;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            Ok::<Vec<Result<FieldRecord, FieldError>>, anyhow::Error>(records)
        }
    });
    let batches = try_join_all(reads).await?;

    if let Some(pb) = &pb {
        pb.finish_with_message("Done");
    }
    return Ok(batches.into_iter().flatten().collect());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose).context("Failed to initialize logger")?;

    let outfile = args.out.clone().unwrap_or("sectionizer_report.json".to_string());
    if !outfile.ends_with(".json") {
        bail!("Output file must be a JSON file: {}", outfile);
    }

    for (flag, value) in [
        ("--min-confidence", args.min_confidence),
        ("--review-threshold", args.review_threshold),
        ("--anomaly-tolerance", args.anomaly_tolerance),
    ] {
        if value.is_nan() {
            bail!("{} must be a number", flag);
        }
    }

    let paths = expand_inputs(&args.input)?;
    if paths.is_empty() {
        bail!("No input files match {}", args.input);
    }

    let sectionizer = build_sectionizer(&args).await?;
    let records = read_records(&paths, args.verbose).await?;
    tracing::info!("Loaded {} fields from {} files", records.len(), paths.len());

    let run = tokio::task::spawn_blocking(move || sectionizer.run_parsed(&records)).await?;

    let output = Output {
        generated_at: chrono::Local::now().to_rfc3339(),
        inputs: paths.iter().map(|p| p.display().to_string()).collect(),
        fields: run.outcomes.iter().map(FieldRow::from).collect(),
        summary: run.summary,
        structure: run.structure,
    };
    let json = serde_json::to_string_pretty(&output)?;
    tokio::fs::write(&outfile, json)
        .await
        .with_context(|| format!("Failed to write {}", outfile))?;

    println!("{}", output.summary.render_text());
    tracing::info!("Report written to {}", outfile);
    Ok(())
}
