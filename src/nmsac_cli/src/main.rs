//! Command line front end for NMSAC registration.
//!
//! Reads two JSON point lists (`[[x, y, z], ...]`), registers the source
//! onto the target and prints the result as JSON on stdout. Logging goes to
//! stderr and is controlled with `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use nalgebra::Matrix3;
use nmsac::{Nmsac, NmsacConfig, RegistrationResult};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "nmsac",
    version,
    about = "Register two 3-D point sets without an initial guess",
    long_about = None
)]
struct Args {
    /// Source points, a JSON array of [x, y, z]
    #[arg(short, long)]
    source: PathBuf,

    /// Target points, a JSON array of [x, y, z]
    #[arg(short, long)]
    target: PathBuf,

    /// Registration settings (JSON); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write per-trial debug records to this file
    #[arg(long)]
    debug_json: Option<PathBuf>,

    /// Override the sampling seed
    #[arg(long)]
    seed: Option<u64>,
}

/// Result as printed, with the rotation in row-major order.
#[derive(Serialize)]
struct Output {
    success: bool,
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
    inliers: usize,
    iterations: usize,
}

impl From<&RegistrationResult> for Output {
    fn from(result: &RegistrationResult) -> Self {
        Self {
            success: result.success,
            rotation: rows(&result.rotation),
            translation: [
                result.translation.x,
                result.translation.y,
                result.translation.z,
            ],
            inliers: result.inliers,
            iterations: result.iterations,
        }
    }
}

fn rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

fn load_points(path: &Path) -> Result<Vec<[f64; 3]>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let points: Vec<[f64; 3]> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of [x, y, z]", path.display()))?;
    if points.is_empty() {
        bail!("{} holds no points", path.display());
    }
    Ok(points)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nmsac=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NmsacConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NmsacConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    info!("configuration:\n{config}");

    let source = load_points(&args.source)?;
    let target = load_points(&args.target)?;
    info!(source = source.len(), target = target.len(), "loaded point sets");

    let nmsac = Nmsac::with_config(config)?;
    let result = match &args.debug_json {
        Some(path) => {
            let (result, record) = nmsac.register_with_debug(&source, &target)?;
            fs::write(path, record.to_json_pretty()?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} trial records to {}", record.trials.len(), path.display());
            result
        }
        None => nmsac.register(&source, &target)?,
    };

    println!("{}", serde_json::to_string_pretty(&Output::from(&result))?);
    if !result.success {
        bail!("registration failed: no trial completed");
    }
    Ok(())
}
