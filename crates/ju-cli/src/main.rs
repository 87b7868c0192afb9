//! jetunfold CLI
//!
//! Entry points for the 1D jet-pT correction chain, the groomed-mass
//! unfolding and the multi-radius sweep.

mod config;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

use ju_unfold::{
    ChainConfig, ChainRun, MgConfig, MgRun, SvdUnfolding, correction_chain_1d, unfolding_mg,
};

#[derive(Parser)]
#[command(name = "jetunfold")]
#[command(about = "jetunfold - regularized unfolding of jet spectra")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the 1D jet-pT correction chain for one radius and pT cut
    Chain {
        /// Jet radius (e.g. 0.2)
        #[arg(long)]
        radius: f64,

        /// Minimum jet pT of the input trees (GeV/c)
        #[arg(long)]
        pt_cut: u32,

        /// Directory holding `data/` and `mc/`
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Directory receiving the result store (defaults to --data-dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Run configuration (JSON or YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed of the closure split (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Threads for the regularization scan (0 = auto; overrides the config)
        #[arg(long)]
        threads: Option<usize>,

        /// Output file for the run summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Unfold groomed mass in bins of jet pT
    Mg {
        /// Data tree store; the trigger is read from the file name
        #[arg(long)]
        data_file: PathBuf,

        /// Simulation tree store
        #[arg(long)]
        mc_file: PathBuf,

        /// Directory receiving the result store (defaults to the current directory)
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Fraction of simulated jets used for the closure test (overrides the config)
        #[arg(long)]
        closure_fraction: Option<f64>,

        /// Run configuration (JSON or YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed of the closure split (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Output file for the run summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the 1D correction chain for several jet radii
    Sweep {
        /// Jet radii, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        radii: Vec<f64>,

        /// Minimum jet pT of the input trees (GeV/c)
        #[arg(long)]
        pt_cut: u32,

        /// Directory holding `data/` and `mc/`
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Directory receiving the result stores (defaults to --data-dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Run configuration (JSON or YAML), shared by all radii
        #[arg(long)]
        config: Option<PathBuf>,

        /// Radii processed concurrently (0 = auto)
        #[arg(long, default_value = "1")]
        workers: usize,

        /// Output file for the sweep report (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Chain { radius, pt_cut, data_dir, output_dir, config, seed, threads, output } => {
            let mut cfg: ChainConfig = config::read_config(config.as_deref())?;
            if seed.is_some() {
                cfg.seed = seed;
            }
            if let Some(t) = threads {
                cfg.threads = t;
            }
            cmd_chain(radius, pt_cut, &data_dir, output_dir, &cfg, output.as_ref())
        }
        Commands::Mg {
            data_file,
            mc_file,
            output_dir,
            closure_fraction,
            config,
            seed,
            output,
        } => {
            let mut cfg: MgConfig = config::read_config(config.as_deref())?;
            if let Some(f) = closure_fraction {
                cfg.closure_fraction = f;
            }
            if seed.is_some() {
                cfg.seed = seed;
            }
            let run = MgRun { data_file, mc_file, output_dir };
            cmd_mg(&run, &cfg, output.as_ref())
        }
        Commands::Sweep { radii, pt_cut, data_dir, output_dir, config, workers, output } => {
            let cfg: ChainConfig = config::read_config(config.as_deref())?;
            cmd_sweep(&radii, pt_cut, &data_dir, output_dir, &cfg, workers, output.as_ref())
        }
    }
}

fn cmd_chain(
    radius: f64,
    pt_cut: u32,
    data_dir: &Path,
    output_dir: Option<PathBuf>,
    cfg: &ChainConfig,
    output: Option<&PathBuf>,
) -> Result<()> {
    let run = ChainRun {
        radius,
        pt_cut,
        data_dir: data_dir.to_path_buf(),
        output_dir: output_dir.unwrap_or_else(|| data_dir.to_path_buf()),
    };
    let summary = correction_chain_1d(&run, cfg, &SvdUnfolding::new())?;
    tracing::info!(
        output = %summary.output.display(),
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        "correction chain finished"
    );
    write_json(output, serde_json::to_value(&summary)?)
}

fn cmd_mg(run: &MgRun, cfg: &MgConfig, output: Option<&PathBuf>) -> Result<()> {
    let summary = unfolding_mg(run, cfg, &SvdUnfolding::new())?;
    tracing::info!(
        output = %summary.output.display(),
        trigger = %summary.trigger,
        completed = summary.completed.len(),
        "Mg unfolding finished"
    );
    write_json(output, serde_json::to_value(&summary)?)
}

#[derive(Debug, Serialize)]
struct SweepEntry {
    radius: f64,
    output: Option<PathBuf>,
    completed: usize,
    failed_strengths: usize,
    error: Option<String>,
}

fn cmd_sweep(
    radii: &[f64],
    pt_cut: u32,
    data_dir: &Path,
    output_dir: Option<PathBuf>,
    cfg: &ChainConfig,
    workers: usize,
    output: Option<&PathBuf>,
) -> Result<()> {
    let output_dir = output_dir.unwrap_or_else(|| data_dir.to_path_buf());
    let engine = SvdUnfolding::new();
    let run_one = |radius: f64| -> SweepEntry {
        let run = ChainRun {
            radius,
            pt_cut,
            data_dir: data_dir.to_path_buf(),
            output_dir: output_dir.clone(),
        };
        match correction_chain_1d(&run, cfg, &engine) {
            Ok(s) => SweepEntry {
                radius,
                output: Some(s.output),
                completed: s.completed.len(),
                failed_strengths: s.failed.len(),
                error: None,
            },
            Err(e) => {
                tracing::error!(radius, error = %e, "correction chain failed");
                SweepEntry {
                    radius,
                    output: None,
                    completed: 0,
                    failed_strengths: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let entries: Vec<SweepEntry> =
        pool.install(|| radii.par_iter().map(|&r| run_one(r)).collect());

    let n_failed = entries.iter().filter(|e| e.error.is_some()).count();
    write_json(
        output,
        serde_json::json!({
            "pt_cut": pt_cut,
            "radii": entries,
            "n_failed": n_failed,
        }),
    )?;
    if n_failed > 0 {
        bail!("{n_failed} of {} radii failed", radii.len());
    }
    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
