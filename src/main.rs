//! Command-line front end: evaluate the FGSM attack, import IDX test sets,
//! and create randomly initialized checkpoints.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferrite_fgsm::model::ArchitectureSpec;
use ferrite_fgsm::plot::{render_accuracy_curve, render_example_grid};
use ferrite_fgsm::{
    run_experiment, AttackContext, AttackLoss, Checkpoint, Dataset, ExperimentConfig, OutputSelect,
};

#[derive(Parser)]
#[command(name = "ferrite-fgsm")]
#[command(about = "FGSM adversarial evaluation of a pretrained discriminator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the attack over a list of epsilons
    Run {
        /// JSON experiment config; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Test set (dataset JSON)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Pretrained checkpoint (JSON)
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Output path for the zero-epsilon perturbed set
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Directory for the accuracy curve and example grid
        #[arg(long)]
        plots_dir: Option<PathBuf>,

        /// Skip rendering plots
        #[arg(long)]
        no_plots: bool,

        /// Comma-separated perturbation strengths
        #[arg(short, long, value_delimiter = ',')]
        epsilons: Option<Vec<f64>>,

        /// Weight of the gradient-penalty term
        #[arg(long)]
        penalty_weight: Option<f64>,

        /// Discriminator output the loss is computed on
        #[arg(long)]
        output: Option<OutputSelect>,

        /// Examples kept per epsilon
        #[arg(long)]
        examples: Option<usize>,

        /// RNG seed for generator latents and penalty interpolation
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Convert MNIST-style IDX files into a dataset JSON
    ImportIdx {
        /// IDX3 image file
        #[arg(long)]
        images: PathBuf,

        /// IDX1 label file
        #[arg(long)]
        labels: PathBuf,

        /// Keep only samples of this digit
        #[arg(long)]
        digit: Option<u8>,

        /// Replace the label of every kept sample
        #[arg(long)]
        relabel: Option<usize>,

        /// Output dataset JSON
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Write a randomly initialized checkpoint from an architecture JSON
    Init {
        /// Architecture spec JSON
        #[arg(short, long)]
        arch: PathBuf,

        /// Output checkpoint JSON
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            weights,
            out,
            plots_dir,
            no_plots,
            epsilons,
            penalty_weight,
            output,
            examples,
            seed,
        } => {
            let mut cfg = match config {
                Some(path) => ExperimentConfig::load_json(&path)
                    .with_context(|| format!("Failed to load config '{}'", path.display()))?,
                None => ExperimentConfig::default(),
            };
            if let Some(v) = data { cfg.data_path = v; }
            if let Some(v) = weights { cfg.weights_path = v; }
            if let Some(v) = out { cfg.perturbed_path = v; }
            if let Some(v) = plots_dir { cfg.plots_dir = Some(v); }
            if no_plots { cfg.plots_dir = None; }
            if let Some(v) = epsilons { cfg.epsilons = v; }
            if let Some(v) = penalty_weight { cfg.penalty_weight = v; }
            if let Some(v) = output { cfg.output = v; }
            if let Some(v) = examples { cfg.examples_per_epsilon = v; }
            if let Some(v) = seed { cfg.seed = v; }
            cfg.validate().context("Invalid experiment configuration")?;
            run(&cfg)
        }
        Commands::ImportIdx { images, labels, digit, relabel, out } => {
            let image_bytes = fs::read(&images)
                .with_context(|| format!("Cannot open image file '{}'", images.display()))?;
            let label_bytes = fs::read(&labels)
                .with_context(|| format!("Cannot open label file '{}'", labels.display()))?;
            let dataset = Dataset::from_idx(&image_bytes, &label_bytes, digit, relabel)?;
            ensure_parent(&out)?;
            dataset.save_json(&out)?;
            info!(samples = dataset.len(), path = %out.display(), "dataset written");
            Ok(())
        }
        Commands::Init { arch, out, seed } => {
            let spec = ArchitectureSpec::load_json(&arch)
                .with_context(|| format!("Failed to load architecture '{}'", arch.display()))?;
            let checkpoint = spec.build(&mut StdRng::seed_from_u64(seed))?;
            ensure_parent(&out)?;
            checkpoint.save_json(&out)?;
            info!(name = %checkpoint.metadata.name, path = %out.display(), "checkpoint written");
            Ok(())
        }
    }
}

fn run(cfg: &ExperimentConfig) -> Result<()> {
    let checkpoint = Checkpoint::load_json(&cfg.weights_path)
        .with_context(|| format!("Failed to load weights '{}'", cfg.weights_path.display()))?;
    let dataset = Dataset::load_json(&cfg.data_path)
        .with_context(|| format!("Failed to load test set '{}'", cfg.data_path.display()))?;
    info!(
        model = %checkpoint.metadata.name,
        samples = dataset.len(),
        epsilons = cfg.epsilons.len(),
        output = %cfg.output,
        "starting attack evaluation"
    );

    let ctx = AttackContext {
        model: &checkpoint.discriminator,
        generator: &checkpoint.generator,
        loss: AttackLoss::new(cfg.output, cfg.penalty_weight),
    };
    let result = run_experiment(&ctx, &dataset, cfg)?;

    match &result.zero_epsilon {
        Some(set) => {
            ensure_parent(&cfg.perturbed_path)?;
            set.save_json(&cfg.perturbed_path)?;
            info!(images = set.len(), path = %cfg.perturbed_path.display(), "zero-epsilon set written");
        }
        None => warn!("epsilon 0 not in the sweep; no perturbed set written"),
    }

    if let Some(dir) = &cfg.plots_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create plot directory '{}'", dir.display()))?;
        render_accuracy_curve(&result.reports, dir.join("accuracy.png"))?;
        if result.reports.iter().any(|r| !r.examples.is_empty()) {
            render_example_grid(&result.reports, |c| checkpoint.label_name(c), dir.join("examples.png"))?;
        } else {
            warn!("no examples collected; skipping example grid");
        }
        info!(dir = %dir.display(), "plots written");
    }

    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}
