//! Command line entry point: run one of the estimation pipelines and export its history.
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use statespace::Config;
use statespace::pipeline::{Pipeline, run_ekf_pipeline, run_kf_pipeline, run_state_space_pipeline};

const LONG_ABOUT: &str = "Run a state estimation scenario against a seeded ground-truth simulator.

Pipelines:
  KF           closed-loop mass-spring-damper with a linear Kalman filter
  EKF          unicycle robot localizing against landmarks with an extended Kalman filter
  STATE_SPACE  step and impulse responses of the mass-spring-damper model

Results are written as CSV files to the output directory. Tunables are read from a TOML or JSON
configuration file; missing fields take their defaults.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "State-space estimation scenarios.", long_about = LONG_ABOUT)]
struct Cli {
    /// Pipeline to run (KF, EKF, STATE_SPACE)
    #[arg(short, long)]
    pipeline: String,

    /// Configuration file (TOML/JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the exported CSV files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_log_level(log_level: &str) -> anyhow::Result<log::LevelFilter> {
    log_level
        .parse::<log::LevelFilter>()
        .map_err(|_| anyhow::anyhow!("invalid log level '{log_level}'"))
}

/// Timestamped `LEVEL - message` lines on stderr, or appended to `log_file` when given.
fn init_logger(level: log::LevelFilter, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn run(pipeline: Pipeline, config: &Config, output: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating output directory {}", output.display()))?;
    match pipeline {
        Pipeline::StateSpace => {
            let (step, impulse) = run_state_space_pipeline(config)?;
            step.to_csv(output.join("step_response.csv"))?;
            impulse.to_csv(output.join("impulse_response.csv"))?;
        }
        Pipeline::Kf => {
            let history = run_kf_pipeline(config)?;
            history.to_csv(output.join("kf_history.csv"))?;
        }
        Pipeline::Ekf => {
            let run = run_ekf_pipeline(config)?;
            run.history.to_csv(output.join("ekf_history.csv"))?;
            let landmarks = File::create(output.join("landmarks.json"))?;
            serde_json::to_writer_pretty(landmarks, &run.map.features)?;
            info!(
                "{} landmark readings over {} steps",
                run.measurements.len(),
                run.history.len()
            );
        }
    }
    info!("Results written to {}", output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(parse_log_level(&cli.log_level)?, cli.log_file.as_deref())?;

    let pipeline = match cli.pipeline.parse::<Pipeline>() {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}. Expected one of KF, EKF, STATE_SPACE.");
            std::process::exit(1);
        }
    };
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => Config::default(),
    };
    info!("Running pipeline {pipeline} with {config:?}");

    if let Err(e) = run(pipeline, &config, &cli.output) {
        error!("Pipeline {pipeline} failed: {e:#}");
        return Err(e);
    }
    info!("Program complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level("debug").unwrap(), log::LevelFilter::Debug);
        assert_eq!(parse_log_level("INFO").unwrap(), log::LevelFilter::Info);
        assert_eq!(parse_log_level("off").unwrap(), log::LevelFilter::Off);
        let err = parse_log_level("chatty").unwrap_err();
        assert!(err.to_string().contains("chatty"));
    }

    #[test]
    fn cli_requires_pipeline() {
        assert!(Cli::try_parse_from(["statespace"]).is_err());
        let cli = Cli::try_parse_from(["statespace", "-p", "ekf", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.pipeline.parse::<Pipeline>().unwrap(), Pipeline::Ekf);
        assert_eq!(cli.output, PathBuf::from("."));
        assert!(cli.config.is_none());
    }
}
