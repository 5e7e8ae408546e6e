//! frame-window - inspect windowed frame datasets and check MLP input gradients
//!
//! ```bash
//! # Gradient check on the default 100-513-50-50-50-10 network
//! cargo run --release -- gradcheck --seed 7
//!
//! # Iterate the training split in shuffled batches of 32
//! cargo run --release -- inspect --config gtzan.json --which-set train \
//!   --mode shuffled_sequential --batch-size 32 --standardize
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use frame_window::{
    check_gradient, BackwardMode, BatchOutput, DataSpecs, DatasetConfig, GradCheckReport,
    IterationMode, IteratorRequest, LayerKind, Mlp, MlpBuilder, Source, Space, Standardizer,
    WhichSet, WindowedDataset,
};

#[derive(Parser)]
#[command(name = "frame-window", version, about = "Windowed frame datasets and MLP gradient checks")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare the hand-written input gradient with finite differences
    Gradcheck(GradcheckArgs),
    /// Iterate a dataset split and print batch shapes
    Inspect(InspectArgs),
}

#[derive(Args)]
struct GradcheckArgs {
    /// Model JSON to check instead of a freshly initialized network
    #[arg(long)]
    model: Option<PathBuf>,

    /// Seed for the network weights, the input and the label
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Input width of the default network
    #[arg(long, default_value_t = 100)]
    nvis: usize,

    /// Finite-difference step
    #[arg(long, default_value_t = 0.1)]
    eps: f32,

    /// Largest accepted per-coordinate difference
    #[arg(long, default_value_t = 1e-2)]
    tol: f32,

    /// Label to differentiate; drawn at random when omitted
    #[arg(long)]
    label: Option<usize>,
}

#[derive(Args)]
struct InspectArgs {
    /// Dataset configuration JSON
    #[arg(short, long)]
    config: PathBuf,

    /// train, test or valid
    #[arg(long, default_value = "train")]
    which_set: WhichSet,

    /// Iteration mode, e.g. sequential or shuffled_sequential
    #[arg(long, default_value = "sequential")]
    mode: IterationMode,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_batches: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Standardize features with the config's mean/std
    #[arg(long)]
    standardize: bool,

    /// Emit features as (batch, 1, frames, bins) instead of flat rows
    #[arg(long)]
    topo: bool,

    /// Print at most this many batch lines
    #[arg(long, default_value_t = 5)]
    show: usize,
}

fn default_network(nvis: usize, seed: u64) -> frame_window::Result<Mlp> {
    MlpBuilder::new(nvis)?
        .irange(0.1)?
        .add_layer(513, LayerKind::Linear)?
        .add_layer(50, LayerKind::RectifiedLinear)?
        .add_layer(50, LayerKind::RectifiedLinear)?
        .add_layer(50, LayerKind::RectifiedLinear)?
        .add_layer(10, LayerKind::Softmax)?
        .build_with_seed(seed)
}

fn print_report(report: &GradCheckReport) {
    println!("mode: {:?}", report.mode);
    println!(
        "  analytic entries: {}  numeric entries: {}",
        report.analytic.len(),
        report.numeric.len()
    );
    println!("  max |analytic - numeric|: {:e}", report.max_abs_diff);
    println!(
        "  uniform: analytic sum {:e}  numeric {:e}",
        report.uniform_analytic, report.uniform_numeric
    );
    println!(
        "  {} (tol {:e})",
        if report.passed { "PASS" } else { "FAIL" },
        report.tolerance
    );
}

fn run_gradcheck(args: GradcheckArgs) -> Result<()> {
    let model = match &args.model {
        Some(path) => Mlp::load_json(path)
            .with_context(|| format!("failed to load model {}", path.display()))?,
        None => default_network(args.nvis, args.seed).context("failed to build network")?,
    };

    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let input: Vec<f32> = (0..model.input_dim())
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let label = match args.label {
        Some(label) => label,
        None => rng.gen_range(0..model.output_dim()),
    };
    log::info!(
        "checking {} -> {} network, label {label}",
        model.input_dim(),
        model.output_dim()
    );

    let mut corrected_passed = false;
    for mode in [BackwardMode::Corrected, BackwardMode::Literal] {
        let report = check_gradient(&model, &input, label, args.eps, args.tol, mode)
            .with_context(|| format!("gradient check failed to run in {mode:?} mode"))?;
        print_report(&report);
        if mode == BackwardMode::Corrected {
            corrected_passed = report.passed;
        }
    }

    if !corrected_passed {
        bail!("analytic gradient does not match finite differences");
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = DatasetConfig::load_json(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    let dataset = WindowedDataset::open(&config, args.which_set)
        .with_context(|| format!("failed to open {}", config.h5_file_name.display()))?;

    println!(
        "{}: {} samples, {} frames x {} bins, label width {}",
        dataset.which_set(),
        dataset.len(),
        dataset.window().n_frames_per_sample,
        dataset.bin_count(),
        dataset.target_dim()
    );

    let features = if args.topo {
        dataset.topological_space()
    } else {
        Space::Vector {
            dim: dataset.sample_dim(),
        }
    };
    let specs = DataSpecs::single(features, Source::Features).with(
        Space::Vector {
            dim: dataset.target_dim(),
        },
        Source::Targets,
    );

    let mut request = IteratorRequest {
        mode: Some(args.mode),
        batch_size: args.batch_size,
        num_batches: args.num_batches,
        seed: args.seed,
        ..IteratorRequest::default()
    }
    .with_specs(specs);
    if args.standardize {
        let standardizer =
            Standardizer::from_config(&config).context("config cannot standardize")?;
        request = request.with_transform(Arc::new(standardizer));
    }

    let iter = dataset.iterator(request)?;
    println!(
        "{} batches of up to {} examples ({} examples, stochastic: {})",
        iter.num_batches(),
        iter.batch_size(),
        iter.num_examples(),
        iter.is_stochastic()
    );

    let mut seen = 0;
    for (i, batch) in iter.enumerate() {
        let batch = batch.with_context(|| format!("failed to read batch {i}"))?;
        seen += batch.rows();
        if i < args.show {
            let shapes: Vec<String> = match batch {
                BatchOutput::Single(b) => vec![format!("{:?}", b.shape())],
                BatchOutput::Tuple(bs) => bs.iter().map(|b| format!("{:?}", b.shape())).collect(),
            };
            println!("batch {i}: {}", shapes.join(" "));
        }
    }
    println!("{seen} examples served");

    dataset.close();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level),
    )
    .init();

    match cli.command {
        Command::Gradcheck(args) => run_gradcheck(args),
        Command::Inspect(args) => run_inspect(args),
    }
}
