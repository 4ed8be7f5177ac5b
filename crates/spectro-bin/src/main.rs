//! `spectro` - command-line front end for the scanning spectrophotometer.
//!
//! # Usage
//!
//! Record a spectrum (reference in cuvette 1):
//! ```bash
//! spectro sweep --sample dye --min 400 --max 700 --step 1
//! ```
//!
//! Record the blank used by the mean and polynomial baselines:
//! ```bash
//! spectro baseline --min 400 --max 700 --step 1
//! ```
//!
//! Follow absorbance over time at two wavelengths:
//! ```bash
//! spectro kinetics --sample enzyme -w 340 -w 420 --duration 600 --delay 5
//! ```
//!
//! Reprocess a recorded sweep offline:
//! ```bash
//! spectro analyze data/2026/10/19/slit_2nm/raw_dye.csv --blank data/.../raw_baseline.csv
//! ```
//!
//! Configuration comes from `--config` (default `config/spectro.toml`) and
//! `SPECTRO_*` environment variables; `spectro config` prints the merged
//! result. Ctrl-C stops a running sweep or kinetics run cleanly at the next
//! point.

mod commands;
mod hardware;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use spectro_core::config::SpectroConfig;
use spectro_core::{Cuvette, SlitWidth};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spectro")]
#[command(about = "Dual-beam UV-Vis spectrophotometer acquisition", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "config/spectro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an absorbance spectrum
    Sweep {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Sample name (used in file names)
        #[arg(long)]
        sample: String,

        /// Process the spectrum after recording
        #[arg(long)]
        analyze: bool,

        /// Recorded blank for the mean or polynomial baseline
        #[arg(long, requires = "analyze")]
        blank: Option<PathBuf>,
    },

    /// Record a blank sweep (blank solution in both cuvettes)
    Baseline {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Record absorbance against time at fixed wavelengths
    Kinetics {
        #[command(flatten)]
        run: RunArgs,

        /// Sample name (used in file names)
        #[arg(long)]
        sample: String,

        /// Target wavelength in nm (repeat for several)
        #[arg(short = 'w', long = "wavelength", required = true)]
        wavelengths: Vec<f64>,

        /// Recording time per wavelength, seconds
        #[arg(long)]
        duration: f64,

        /// Interval between sample reads, seconds
        #[arg(long, default_value = "1")]
        delay: f64,

        /// Recorded blank for the mean or polynomial baseline
        #[arg(long, conflicts_with = "offset")]
        blank: Option<PathBuf>,

        /// Constant absorbance subtracted from every trace, instead of the
        /// configured baseline
        #[arg(long)]
        offset: Option<f64>,
    },

    /// Reprocess a recorded sweep
    Analyze {
        /// Raw sweep CSV
        input: PathBuf,

        /// Recorded blank for the mean or polynomial baseline
        #[arg(long)]
        blank: Option<PathBuf>,

        /// Output directory (defaults to the input's directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration (file, environment and defaults merged)
    Config,

    /// Show controller state and available serial ports
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by every measurement.
#[derive(Args, Clone)]
struct RunArgs {
    /// Slit width: 2, 1, 0.5 or 0.2 (nm)
    #[arg(long)]
    slit: Option<SlitWidth>,

    /// Cuvette holding the reference (1 or 2)
    #[arg(long, default_value = "1", value_parser = parse_cuvette)]
    reference: Cuvette,

    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Print live points as JSON lines on stdout
    #[arg(long)]
    live: bool,

    /// Run the simulated instrument without real-time delays
    #[arg(long)]
    instant: bool,
}

/// Wavelength range of a sweep.
#[derive(Args, Clone)]
struct SweepArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Short-wavelength end, nm
    #[arg(long)]
    min: f64,

    /// Long-wavelength end, nm
    #[arg(long)]
    max: f64,

    /// Wavelength step, nm
    #[arg(long, default_value = "1")]
    step: f64,
}

fn parse_cuvette(s: &str) -> Result<Cuvette, String> {
    match s.trim() {
        "1" | "one" => Ok(Cuvette::One),
        "2" | "two" => Ok(Cuvette::Two),
        other => Err(format!("cuvette must be 1 or 2, got '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SpectroConfig::load_from(&cli.config)?;
    config.validate()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sweep {
            sweep,
            sample,
            analyze,
            blank,
        } => commands::sweep(config, &sweep, &sample, analyze, blank).await,
        Commands::Baseline { sweep } => commands::baseline(config, &sweep).await,
        Commands::Kinetics {
            run,
            sample,
            wavelengths,
            duration,
            delay,
            blank,
            offset,
        } => {
            commands::kinetics(config, &run, &sample, wavelengths, duration, delay, blank, offset)
                .await
        }
        Commands::Analyze {
            input,
            blank,
            output,
        } => commands::analyze(&config, &input, blank.as_deref(), output).await,
        Commands::Config => commands::show_config(&config),
        Commands::Status { json } => commands::status(&config, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sweep_command() {
        let cli = Cli::try_parse_from([
            "spectro", "sweep", "--sample", "dye", "--min", "400", "--max", "700", "--slit",
            "0.5", "--reference", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Sweep { sweep, sample, .. } => {
                assert_eq!(sample, "dye");
                assert_eq!(sweep.step, 1.0);
                assert_eq!(sweep.run.slit, Some(SlitWidth::Nm0_5));
                assert_eq!(sweep.run.reference, Cuvette::Two);
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn kinetics_needs_a_wavelength() {
        assert!(Cli::try_parse_from(["spectro", "kinetics", "--sample", "k", "--duration", "10"]).is_err());
        let cli = Cli::try_parse_from([
            "spectro", "kinetics", "--sample", "k", "--duration", "10", "-w", "340", "-w", "420",
        ])
        .unwrap();
        match cli.command {
            Commands::Kinetics { wavelengths, delay, .. } => {
                assert_eq!(wavelengths, vec![340.0, 420.0]);
                assert_eq!(delay, 1.0);
            }
            _ => panic!("expected kinetics"),
        }
    }

    #[test]
    fn kinetics_offset_replaces_blank() {
        assert!(Cli::try_parse_from([
            "spectro", "kinetics", "--sample", "k", "--duration", "10", "-w", "340", "--blank",
            "b.csv", "--offset", "0.1",
        ])
        .is_err());
    }

    #[test]
    fn blank_requires_analyze() {
        assert!(Cli::try_parse_from([
            "spectro", "sweep", "--sample", "s", "--min", "400", "--max", "410", "--blank", "b.csv",
        ])
        .is_err());
    }

    #[test]
    fn cuvette_parser() {
        assert_eq!(parse_cuvette("1").unwrap(), Cuvette::One);
        assert!(parse_cuvette("3").is_err());
    }
}
