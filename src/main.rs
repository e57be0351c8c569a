use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

use das_sampling::{split_samples_into_parcels, View};
use das_simulator::{client_version, Config, Simulation};

#[derive(Parser)]
#[command(name = "das-simulator")]
#[command(about = "Data availability sampling simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level, falls back to the config file and then `info`
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Configuration file, defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of builder peers
        #[arg(long)]
        builders: Option<usize>,

        /// Number of validator peers
        #[arg(long)]
        validators: Option<usize>,

        /// Number of non-validator peers
        #[arg(long)]
        non_validators: Option<usize>,

        /// Rows (and columns) of the block matrix
        #[arg(long)]
        row_count: Option<usize>,

        /// Samples per parcel
        #[arg(long)]
        parcel_size: Option<usize>,

        /// Blocks each peer processes
        #[arg(long)]
        blocks: Option<u64>,

        /// Per-block deadline in milliseconds
        #[arg(long)]
        block_timeout_ms: Option<u64>,

        /// Stop the run after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// JSON-lines event log file
        #[arg(long)]
        events: Option<PathBuf>,

        /// JSON report file, stdout when omitted
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print how a block matrix is cut into parcels
    Partition {
        /// Rows (and columns) of the block matrix
        #[arg(long, default_value = "64")]
        row_count: usize,

        /// Samples per parcel
        #[arg(long, default_value = "16")]
        parcel_size: usize,

        /// Which parcels to list: all, row or col
        #[arg(long, default_value = "all")]
        view: String,
    },

    /// Print the default configuration or write it to a file
    Config {
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load the config file first, it may set the log level
    let file_config = match &cli.command {
        Commands::Run {
            config: Some(path), ..
        } => Some(Config::from_file(path)?),
        _ => None,
    };

    // Initialize logging: RUST_LOG, then --log-level, then the config file
    let directive = file_config
        .as_ref()
        .map(|config| config.log.clone())
        .unwrap_or_default()
        .filter_directive(cli.log_level.as_deref());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            config: config_path,
            builders,
            validators,
            non_validators,
            row_count,
            parcel_size,
            blocks,
            block_timeout_ms,
            duration_secs,
            seed,
            events,
            report,
        } => {
            let mut config = match (file_config, config_path) {
                (Some(config), Some(path)) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                _ => Config::default(),
            };

            // Command line flags override the file
            if let Some(builders) = builders {
                config.peers.builders = builders;
            }
            if let Some(validators) = validators {
                config.peers.validators = validators;
            }
            if let Some(non_validators) = non_validators {
                config.peers.non_validators = non_validators;
            }
            if let Some(row_count) = row_count {
                config.simulation.row_count = row_count;
            }
            if let Some(parcel_size) = parcel_size {
                config.simulation.parcel_size = parcel_size;
            }
            if let Some(blocks) = blocks {
                config.simulation.blocks = blocks;
            }
            if let Some(block_timeout_ms) = block_timeout_ms {
                config.simulation.block_timeout_ms = block_timeout_ms;
            }
            if duration_secs.is_some() {
                config.simulation.duration_secs = duration_secs;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            if events.is_some() {
                config.log.events = events;
            }
            if report.is_some() {
                config.log.report = report;
            }

            run_simulation(config).await?;
        }

        Commands::Partition {
            row_count,
            parcel_size,
            view,
        } => {
            let view: View = view.parse()?;
            let partition = split_samples_into_parcels(row_count, parcel_size)?;

            info!(
                "{}x{} matrix, parcel size {}: {} row parcels, {} column parcels",
                row_count,
                row_count,
                parcel_size,
                partition.rows().len(),
                partition.cols().len()
            );

            for parcel in partition.select(view) {
                println!(
                    "{}\t{}\t{}\t{}",
                    if parcel.is_row { "row" } else { "col" },
                    parcel.starting_index,
                    parcel.last_index(row_count),
                    parcel.sample_count
                );
            }
        }

        Commands::Config { output } => {
            let config = Config::default();
            match output {
                Some(path) => {
                    config.to_file(&path)?;
                    info!("Default configuration written to {}", path.display());
                }
                None => {
                    let content = toml::to_string_pretty(&config)
                        .context("Failed to serialize configuration")?;
                    println!("{}", content);
                }
            }
        }
    }

    Ok(())
}

async fn run_simulation(config: Config) -> Result<()> {
    info!("Starting {}", client_version());
    info!(
        "Block matrix {}x{}, parcel size {}, {} blocks",
        config.simulation.row_count,
        config.simulation.row_count,
        config.simulation.parcel_size,
        config.simulation.blocks
    );

    let report_path = config.log.report.clone();
    let simulation = Simulation::new(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    let report = simulation.run(shutdown_rx).await?;

    match report_path {
        Some(path) => {
            report.to_file(&path)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", report.to_json_pretty()?),
    }

    Ok(())
}
