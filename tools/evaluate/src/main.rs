//! Evaluation CLI Tool
//!
//! Loads a gated network from a TOML configuration and checkpoint, then
//! reports top-1 / top-5 accuracy, gate density and per-layer MACs on a
//! validation image folder.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::backend::NdArray;
use clap::Parser;
use colored::Colorize;
use gatenet_core::{setup_cli_logging, Config, Percent};
use gatenet_dataset::{Feeder, FeederConfig, ImageFolder, ImagePreprocessor, PreprocessConfig};
use gatenet_training::{CheckpointHandler, EvaluationResult, Evaluator, GatedNet};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

type InferenceBackend = NdArray;

/// Gated Network Evaluation Tool
#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate gated convolution networks",
    long_about = "Evaluate a gated convolution network on a validation image folder and \
                  report top-1 / top-5 accuracy, gate density and per-layer MACs."
)]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Checkpoint to load, overriding the configuration
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<PathBuf>,

    /// Batch size, overriding the configuration
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Number of validation examples, overriding the configuration
    #[arg(short, long)]
    num_examples: Option<usize>,

    /// Write the evaluation summary as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    info!("Gated Network - Evaluation Tool");
    info!("===============================");

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    apply_overrides(&mut config, &args)?;

    let folder = ImageFolder::scan(&config.eval.dataset_dir)
        .context("Failed to scan validation dataset")?;
    if folder.num_classes() != config.network.num_classes {
        warn!(
            "Dataset has {} classes but the network predicts {}",
            folder.num_classes(),
            config.network.num_classes
        );
    }
    let num_examples = config.eval.num_examples.unwrap_or(folder.len());
    if num_examples > folder.len() {
        warn!(
            "Evaluating {} examples but only {} images exist, some are scored twice",
            num_examples,
            folder.len()
        );
    }
    let dataset = folder
        .root_dir()
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let device = Default::default();
    let model = GatedNet::<InferenceBackend>::new(&config.network, &device)
        .context("Failed to build network")?;
    let handler = CheckpointHandler::new(&config.name, &dataset, &config.eval.checkpoint);
    let (model, checkpoint) = handler
        .load::<InferenceBackend, _>(model, &device)
        .context("Failed to load checkpoint")?;
    if let Some(checkpoint) = &checkpoint {
        info!(
            "Model: {} (epoch {}, saved {})",
            checkpoint.name, checkpoint.epoch, checkpoint.timestamp
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&stop))?;
    let preprocessor = ImagePreprocessor::new(PreprocessConfig::with_image_size(
        config.network.image_size as u32,
    ));
    let feeder = Feeder::spawn(
        folder.samples().to_vec(),
        preprocessor,
        FeederConfig::from(&config.eval),
        Arc::clone(&stop),
    )
    .context("Failed to start data feeding")?;

    let num_iterations = num_examples.div_ceil(config.eval.batch_size);
    let progress = ProgressBar::new(num_iterations as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut evaluator = Evaluator::new(model, device, &config.eval).with_stop_flag(stop);
    let result = evaluator
        .evaluate(feeder, num_examples, |update| {
            progress.set_position(update.step as u64);
            progress.set_message(format!(
                "top1: {}, top5: {}",
                Percent(update.top1),
                Percent(update.top5)
            ));
        })
        .context("Evaluation failed")?;
    progress.finish_and_clear();

    print_results(&result);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Summary exported to: {}", path.display());
    }

    Ok(())
}

/// Ctrl-C stops feeding and ends the evaluation loop with a summary
fn install_interrupt_handler(stop: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if !stop.swap(true, Ordering::Relaxed) {
            warn!("Interrupted, stopping evaluation");
        }
    })
    .context("Failed to install interrupt handler")
}

fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(checkpoint) = &args.checkpoint {
        config.eval.checkpoint.load = Some(checkpoint.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.eval.batch_size = batch_size;
    }
    if let Some(num_examples) = args.num_examples {
        config.eval.num_examples = Some(num_examples);
    }
    config.eval.validate()?;
    Ok(())
}

fn print_results(result: &EvaluationResult) {
    println!();
    if result.aborted {
        println!("{}", "Evaluation aborted".yellow().bold());
    } else {
        println!("{}", "Evaluation complete".green().bold());
    }
    println!(
        "  top1: {}, top5: {} [{} images, {:.1}s]",
        Percent(result.top1).to_string().cyan(),
        Percent(result.top5).to_string().cyan(),
        result.total,
        result.elapsed_secs
    );
    if !result.gate_summary.is_empty() {
        println!("  {}", result.gate_summary);
    }

    println!();
    println!("{}", "Layers:".cyan().bold());
    let mut total_macs = 0;
    for layer in &result.layers {
        total_macs += layer.info.macs;
        println!(
            "  {:<16} macs: {:>12}  density: {:>8}  overhead: {:>10}",
            layer.name,
            layer.info.macs,
            Percent(layer.info.density).to_string(),
            layer.info.overhead
        );
    }
    println!("  {:<16} macs: {:>12}", "total", total_macs);
}
