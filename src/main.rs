use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pid_map::io::{
    ensure_outdir, read_candidates, write_candidates, write_manifest_json, Manifest,
    OUTPUT_SCHEMA_VERSION,
};
use pid_map::{ExpressionCompiler, IdentificationStage, StageConfig, TabulatedClusterYield};

#[derive(Debug, Parser)]
#[command(name = "pid-map")]
#[command(about = "Cluster-counting PID and probabilistic relabeling of simulated tracks")]
struct Cli {
    /// Stage configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input candidates (CSV)
    #[arg(long)]
    input: PathBuf,

    #[arg(long, default_value = "output-pid-map")]
    outdir: PathBuf,

    #[arg(long)]
    seed: Option<u64>,

    /// Candidates per parallel chunk; 0 runs sequentially
    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let mut cfg = match &cli.config {
        Some(path) => StageConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => StageConfig::default(),
    };
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if let Some(chunk_size) = cli.chunk_size {
        cfg.chunk_size = chunk_size;
    }

    let stage = IdentificationStage::from_config(
        &cfg,
        Arc::new(TabulatedClusterYield::new()),
        &ExpressionCompiler,
    )
    .context("failed to build identification stage")?;

    let mut candidates = read_candidates(&cli.input)
        .with_context(|| format!("failed to read candidates: {}", cli.input.display()))?;
    if candidates.is_empty() {
        bail!("no candidates in {}", cli.input.display());
    }
    tracing::info!(
        candidates = candidates.len(),
        buckets = stage.sampler().table().bucket_count(),
        seed = cfg.seed,
        "starting identification"
    );

    let batch = if cfg.chunk_size == 0 {
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        stage.process(&mut candidates, &mut rng)
    } else {
        stage.process_parallel(&mut candidates, cfg.seed, cfg.chunk_size)
    };

    ensure_outdir(&cli.outdir)?;
    let output_path = cli.outdir.join("candidates.csv");
    write_candidates(&output_path, &batch.output)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    let manifest_path = write_manifest_json(
        &cli.outdir,
        &Manifest {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            seed: cfg.seed,
            chunk_size: cfg.chunk_size,
            input: cli.input.display().to_string(),
            summary: batch.summary,
        },
    )?;

    let s = batch.summary;
    tracing::info!(
        processed = s.processed,
        retained = s.retained,
        relabeled = s.relabeled,
        dropped = s.dropped,
        identified = s.identified,
        drop_rate = s.drop_rate(),
        "identification finished"
    );
    println!("wrote outputs to {}", manifest_path.display());
    Ok(())
}
