use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use das_sampling::SamplingConfig;
use das_storage::DhtConfig;
use serde::{Deserialize, Serialize};

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Block geometry and per-engine pacing
    pub simulation: SimulationConfig,
    /// How many peers of each role take part
    pub peers: PeersConfig,
    /// Latency and fault model of the simulated store
    pub store: StoreConfig,
    /// Logging and output files
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Rows (and columns) of the block matrix
    pub row_count: usize,
    /// Samples per parcel
    pub parcel_size: usize,
    /// Blocks every engine processes
    pub blocks: u64,
    /// Per-block deadline in milliseconds
    pub block_timeout_ms: u64,
    /// Pause between engine steps in milliseconds
    pub step_interval_ms: u64,
    /// Random parcels drawn per block
    pub random_samples: usize,
    /// Bytes per sample
    pub sample_size: usize,
    /// Wall-clock limit for the whole run, unbounded when unset
    pub duration_secs: Option<u64>,
    /// Base RNG seed; each peer derives its own from it
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    pub builders: usize,
    pub validators: usize,
    pub non_validators: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Minimum network delay per operation in milliseconds
    pub min_latency_ms: u64,
    /// Maximum network delay per operation in milliseconds
    pub max_latency_ms: u64,
    /// Probability that an operation fails
    pub failure_rate: f64,
    /// Upper bound on reported hop counts
    pub max_hops: u32,
    /// Echo timeout when checking the bootstrap peer, in milliseconds
    pub echo_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level, overridden by `--log-level` and `RUST_LOG`
    pub level: String,
    /// JSON-lines event log, events go to tracing when unset
    pub events: Option<PathBuf>,
    /// Where to write the JSON report, stdout when unset
    pub report: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let sampling = SamplingConfig::default();
        Self {
            row_count: sampling.row_count,
            parcel_size: sampling.parcel_size,
            blocks: sampling.total_blocks,
            block_timeout_ms: sampling.block_timeout.as_millis() as u64,
            step_interval_ms: sampling.step_interval.as_millis() as u64,
            random_samples: sampling.random_samples,
            sample_size: sampling.sample_size,
            duration_secs: None,
            seed: None,
        }
    }
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            builders: 1,
            validators: 4,
            non_validators: 4,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dht = DhtConfig::default();
        Self {
            min_latency_ms: dht.min_latency.as_millis() as u64,
            max_latency_ms: dht.max_latency.as_millis() as u64,
            failure_rate: dht.failure_rate,
            max_hops: dht.max_hops,
            echo_timeout_ms: 5_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            events: None,
            report: None,
        }
    }
}

impl LogConfig {
    /// Filter directive for the subscriber when `RUST_LOG` is unset.
    /// A command line level wins over the configured one.
    pub fn filter_directive(&self, cli_level: Option<&str>) -> String {
        match cli_level.map(str::trim).filter(|level| !level.is_empty()) {
            Some(level) => level.to_string(),
            None if self.level.trim().is_empty() => "info".to_string(),
            None => self.level.trim().to_string(),
        }
    }
}

impl PeersConfig {
    pub fn total(&self) -> usize {
        self.builders + self.validators + self.non_validators
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read configuration file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.sampling_config()
            .validate()
            .context("Invalid simulation section")?;

        if self.peers.builders == 0 {
            anyhow::bail!("At least one builder is required");
        }

        // A lone peer has nobody to route to
        if self.peers.total() < 2 {
            anyhow::bail!("At least two peers are required");
        }

        if !(0.0..=1.0).contains(&self.store.failure_rate) {
            anyhow::bail!("failure_rate must be between 0 and 1");
        }

        if self.store.min_latency_ms > self.store.max_latency_ms {
            anyhow::bail!("min_latency_ms must not exceed max_latency_ms");
        }

        if self.store.max_hops == 0 {
            anyhow::bail!("max_hops must be greater than 0");
        }

        if self.store.echo_timeout_ms == 0 {
            anyhow::bail!("echo_timeout_ms must be greater than 0");
        }

        Ok(())
    }

    /// Engine configuration shared by every peer
    pub fn sampling_config(&self) -> SamplingConfig {
        SamplingConfig {
            row_count: self.simulation.row_count,
            parcel_size: self.simulation.parcel_size,
            total_blocks: self.simulation.blocks,
            block_timeout: Duration::from_millis(self.simulation.block_timeout_ms),
            step_interval: Duration::from_millis(self.simulation.step_interval_ms),
            random_samples: self.simulation.random_samples,
            sample_size: self.simulation.sample_size,
            seed: self.simulation.seed,
        }
    }

    pub fn dht_config(&self) -> DhtConfig {
        DhtConfig {
            min_latency: Duration::from_millis(self.store.min_latency_ms),
            max_latency: Duration::from_millis(self.store.max_latency_ms),
            failure_rate: self.store.failure_rate,
            max_hops: self.store.max_hops,
            seed: self.simulation.seed,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.simulation.duration_secs.map(Duration::from_secs)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.store.echo_timeout_ms)
    }
}
