//! Cafeteria simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::convert::TryFrom;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use cafeteria::{run_model, ModelConfig};
use clap::Parser;
use eyre::WrapErr;

/// Runs the cafeteria simulation.
#[derive(Parser)]
#[clap(version)]
struct Opt {
    /// Path to a JSON file with the model configuration. Missing fields take default values.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Seed of the random stream.
    #[clap(long)]
    seed: Option<u64>,

    /// Simulated time in seconds.
    #[clap(long)]
    sim_time: Option<f64>,

    /// Number of plates the buffet holds.
    #[clap(long)]
    buffet_capacity: Option<f64>,

    /// Mean service time at the cashier in seconds.
    #[clap(long)]
    cashier_time: Option<f64>,

    /// Mean time between customer arrivals in seconds.
    #[clap(long)]
    mean_arrival: Option<f64>,

    /// Time between buffet refills in seconds.
    #[clap(long)]
    preparation_time: Option<f64>,

    /// Run in real time.
    #[clap(long)]
    real_time: bool,

    /// Wall-clock duration of one simulated second, e.g., `100ms`.
    #[clap(long, parse(try_from_str = humantime::parse_duration))]
    step_duration: Option<Duration>,

    /// Verbosity.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,

    /// Store the logs this file.
    #[clap(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[clap(long)]
    no_stderr: bool,
}

impl TryFrom<&Opt> for ModelConfig {
    type Error = eyre::Error;
    fn try_from(opt: &Opt) -> eyre::Result<Self> {
        let mut config = if let Some(path) = &opt.config {
            let file = File::open(path)
                .wrap_err_with(|| format!("unable to open config file: {}", path.display()))?;
            serde_json::from_reader(file).wrap_err("unable to parse model config")?
        } else {
            ModelConfig::default()
        };
        if let Some(seed) = opt.seed {
            config.seed = seed;
        }
        if let Some(sim_time) = opt.sim_time {
            config.sim_time = sim_time;
        }
        if let Some(capacity) = opt.buffet_capacity {
            config.buffet_capacity = capacity;
        }
        if let Some(cashier_time) = opt.cashier_time {
            config.cashier_time = cashier_time;
        }
        if let Some(mean_arrival) = opt.mean_arrival {
            config.mean_arrival = mean_arrival;
        }
        if let Some(preparation_time) = opt.preparation_time {
            config.preparation_time = preparation_time;
        }
        if opt.real_time {
            config.real_time = true;
        }
        if let Some(step_duration) = opt.step_duration {
            config.step_duration = step_duration;
        }
        Ok(config)
    }
}

/// Sets up a logger writing `[LEVEL] message` lines to the stderr and, optionally, a file.
fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let level = match opt.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(level);
    if let Some(path) = &opt.log_output {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        dispatch = dispatch.chain(file);
    }
    if !opt.no_stderr {
        dispatch = dispatch.chain(std::io::stderr());
    }
    dispatch.apply()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    set_up_logger(&opt)?;
    let config = ModelConfig::try_from(&opt)?;
    log::debug!("Model configuration: {:?}", config);
    let report = run_model(&config).wrap_err("simulation failed")?;
    println!("{}", report);
    Ok(())
}
