//! Trace Replay CLI
//!
//! Inspects the mapping catalog and drives replay instances from a TOML config.
//!
//! Usage:
//!   trace_replay values --field command
//!   trace_replay list --command TCPRTT --observer-pos edge
//!   trace_replay timeseries --config replay.toml --section conf1 --metric rtt --histo-time
//!   trace_replay replay --config replay.toml --section conf1 --step 0.5 --count 20
//!
//! Environment:
//!   TRACE_MAPPING_FILE - Catalog for `values` and `list` (default: inputFiles/mapping.json)
//!   RUST_LOG - Log filter (default: info)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use nettrace_replay::replay::clock::format_timestamp;
use nettrace_replay::replay::config::DEFAULT_MAPPING_FILE;
use nettrace_replay::replay::{
    histogram, CatalogField, ConfigFile, Direction, MappingCatalog, Metric, NetworkTraceManager, TraceFilter,
};

#[derive(Parser, Debug)]
#[command(name = "trace_replay")]
#[command(about = "Replay recorded RTT and bandwidth traces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every distinct value of a catalog field
    Values {
        /// Mapping catalog (JSON)
        #[arg(long, env = "TRACE_MAPPING_FILE", default_value = DEFAULT_MAPPING_FILE)]
        mapping_file: PathBuf,

        /// Catalog key, e.g. command, ObserverPos, noise
        #[arg(long)]
        field: String,
    },

    /// List catalog entries matching the given filters
    List {
        /// Mapping catalog (JSON)
        #[arg(long, env = "TRACE_MAPPING_FILE", default_value = DEFAULT_MAPPING_FILE)]
        mapping_file: PathBuf,

        #[arg(long)]
        typeofmeasure: Option<String>,

        #[arg(long)]
        command: Option<String>,

        /// upstream or downstream
        #[arg(long)]
        direction: Option<Direction>,

        #[arg(long)]
        observer_pos: Option<String>,

        /// Cross-traffic level, e.g. 0M
        #[arg(long)]
        noise: Option<String>,

        #[arg(long)]
        access_technology: Option<String>,

        #[arg(long)]
        sender: Option<String>,

        #[arg(long)]
        receiver: Option<String>,

        #[arg(long)]
        first_endpoint: Option<String>,

        #[arg(long)]
        second_endpoint: Option<String>,
    },

    /// Print a metric's timeseries, or a histogram of its values or intervals
    Timeseries {
        /// TOML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Section of the configuration file
        #[arg(long)]
        section: String,

        /// rtt or bandwidth
        #[arg(long)]
        metric: Metric,

        /// Histogram of sample values
        #[arg(long, conflicts_with = "histo_time")]
        histo_values: bool,

        /// Histogram of inter-sample intervals
        #[arg(long)]
        histo_time: bool,

        /// Number of histogram bins
        #[arg(long, default_value = "100")]
        bins: usize,

        /// Output file (stdout if not specified)
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Step both metrics and print the replayed values
    Replay {
        /// TOML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Section of the configuration file
        #[arg(long)]
        section: String,

        /// Elapsed seconds per step
        #[arg(long, default_value = "1.0")]
        step: f64,

        /// Number of steps
        #[arg(long, default_value = "10")]
        count: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into())),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Values { mapping_file, field } => print_values(&mapping_file, &field)?,
        Commands::List {
            mapping_file,
            typeofmeasure,
            command,
            direction,
            observer_pos,
            noise,
            access_technology,
            sender,
            receiver,
            first_endpoint,
            second_endpoint,
        } => {
            let filter = TraceFilter {
                typeofmeasure,
                command,
                direction,
                observer_pos,
                noise,
                access_technology,
                sender_identity: sender,
                receiver_identity: receiver,
                first_endpoint,
                second_endpoint,
            };
            print_tracelist(&mapping_file, &filter)?
        }
        Commands::Timeseries {
            config,
            section,
            metric,
            histo_values,
            histo_time,
            bins,
            save,
        } => {
            let manager = build_manager(&config, &section)?;
            let view = if histo_values {
                View::ValueHistogram(bins)
            } else if histo_time {
                View::IntervalHistogram(bins)
            } else {
                View::Series
            };
            write_timeseries(&manager, metric, view, save.as_deref())?
        }
        Commands::Replay {
            config,
            section,
            step,
            count,
        } => {
            let mut manager = build_manager(&config, &section)?;
            run_replay(&mut manager, step, count)?
        }
    }

    Ok(())
}

/// Build an instance; a rejected configuration ends the process with status 1.
fn build_manager(config: &Path, section: &str) -> Result<NetworkTraceManager> {
    let file = ConfigFile::load(config)?;
    let section = file.section(section)?;

    match NetworkTraceManager::from_section(&section) {
        Ok(manager) => Ok(manager),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn print_values(mapping_file: &Path, field: &str) -> Result<()> {
    let catalog = MappingCatalog::load(mapping_file)?;
    let field: CatalogField = field.parse().map_err(anyhow::Error::msg)?;
    for value in catalog.all_values(field) {
        println!("{}", value);
    }
    Ok(())
}

fn print_tracelist(mapping_file: &Path, filter: &TraceFilter) -> Result<()> {
    let entries = NetworkTraceManager::get_tracelist(mapping_file, filter)?;
    for entry in &entries {
        println!("{}", entry.describe());
    }
    info!("{} matching entries", entries.len());
    Ok(())
}

enum View {
    Series,
    ValueHistogram(usize),
    IntervalHistogram(usize),
}

fn write_timeseries(
    manager: &NetworkTraceManager,
    metric: Metric,
    view: View,
    save: Option<&Path>,
) -> Result<()> {
    let mut out: Box<dyn Write> = match save {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let series = manager.timeseries(metric);
    match view {
        View::Series => series.write_pairs(&mut out)?,
        View::ValueHistogram(bins) => {
            if let Some(h) = histogram(&series.values, bins) {
                h.write_nonzero(&mut out)?;
            }
        }
        View::IntervalHistogram(bins) => {
            if let Some(h) = histogram(&series.deltas(), bins) {
                h.write_nonzero(&mut out)?;
            }
        }
    }
    out.flush()?;

    if let Some(path) = save {
        println!("Saved {} {} samples to {}", series.len(), metric, path.display());
    }
    Ok(())
}

fn run_replay(manager: &mut NetworkTraceManager, step: f64, count: usize) -> Result<()> {
    println!(
        "rtt: {}  bandwidth: {}",
        manager.trace_file(Metric::Rtt).display(),
        manager.trace_file(Metric::Bandwidth).display()
    );
    println!("start: {}", format_timestamp(manager.anchor()));

    for _ in 0..count {
        let (rtt, bandwidth) = manager.get_networkvalues(step)?;
        println!(
            "{}  rtt {:>10.3} {}  bandwidth {:>10.3} {}",
            format_timestamp(rtt.playback_timestamp),
            rtt.value,
            Metric::Rtt.unit(),
            bandwidth.value,
            Metric::Bandwidth.unit()
        );
    }
    Ok(())
}
