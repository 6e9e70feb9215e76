use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use svg_animator::cli::RunArgs;
use svg_animator::config::PipelineConfig;
use svg_animator::pipeline;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = RunArgs::parse();
    let config = PipelineConfig::from_args(&args).context("resolve configuration")?;
    init_tracing(args.verbose, &config.paths.run_log_path())?;
    tracing::debug!(?config, "resolved configuration");

    let report = pipeline::run(&config).with_context(|| {
        format!(
            "animate experiment {:?} from {}",
            config.paths.exp_name(),
            config.dataset_path.display()
        )
    })?;
    println!("{}", report.output_path.display());
    Ok(())
}

/// Log to stderr and to the run's `run.log`; `RUST_LOG` overrides the level.
fn init_tracing(verbose: bool, log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open run log {}", log_path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize logging: {err}"))
}
