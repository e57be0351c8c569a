use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use das_network::{EchoService, Envelope, PeerId};
use das_sampling::{
    BlockStatus, EngineReport, EventSink, JsonLinesEventSink, Role, SamplingEngine, Stats,
    StatsSummary, TracingEventSink,
};
use das_storage::{DhtHandle, SimulatedDht};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Aggregated outcome of one role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleReport {
    pub role: Role,
    pub peers: usize,
    pub blocks_completed: usize,
    pub blocks_abandoned: usize,
    pub stats: StatsSummary,
}

/// Outcome of one simulated peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReport {
    pub peer: String,
    pub role: Role,
    pub blocks_completed: usize,
    pub blocks_abandoned: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub started_at: String,
    pub elapsed: Duration,
    /// True when at least one engine was stopped before its last block
    pub interrupted: bool,
    pub roles: Vec<RoleReport>,
    pub peers: Vec<PeerReport>,
}

impl SimulationReport {
    pub fn role(&self, role: Role) -> Option<&RoleReport> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?).context("Failed to write report file")
    }

    fn fold(started_at: String, elapsed: Duration, reports: Vec<EngineReport>) -> Self {
        let interrupted = reports.iter().any(|r| !r.finished);

        let peers = reports
            .iter()
            .map(|r| PeerReport {
                peer: r.peer.short(),
                role: r.role,
                blocks_completed: count_blocks(r, BlockStatus::Completed),
                blocks_abandoned: count_blocks(r, BlockStatus::Abandoned),
                finished: r.finished,
            })
            .collect();

        let roles = [Role::Builder, Role::Validator, Role::NonValidator]
            .into_iter()
            .filter_map(|role| {
                let members: Vec<&EngineReport> =
                    reports.iter().filter(|r| r.role == role).collect();
                if members.is_empty() {
                    return None;
                }

                let mut stats = Stats::new();
                for report in &members {
                    stats.merge(&report.stats);
                }

                Some(RoleReport {
                    role,
                    peers: members.len(),
                    blocks_completed: members
                        .iter()
                        .map(|r| count_blocks(r, BlockStatus::Completed))
                        .sum(),
                    blocks_abandoned: members
                        .iter()
                        .map(|r| count_blocks(r, BlockStatus::Abandoned))
                        .sum(),
                    stats: stats.summary(),
                })
            })
            .collect();

        Self {
            started_at,
            elapsed,
            interrupted,
            roles,
            peers,
        }
    }
}

fn count_blocks(report: &EngineReport, status: BlockStatus) -> usize {
    report.blocks.iter().filter(|b| b.status == status).count()
}

/// In-process simulation: one sampling engine per peer over a shared DHT
pub struct Simulation {
    config: Config,
    events: Arc<dyn EventSink>,
}

impl Simulation {
    /// Create a simulation; events go to the configured JSON-lines file or to tracing
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let events: Arc<dyn EventSink> = match &config.log.events {
            Some(path) => Arc::new(
                JsonLinesEventSink::create(path)
                    .with_context(|| format!("Failed to open event log {}", path.display()))?,
            ),
            None => Arc::new(TracingEventSink),
        };

        Ok(Self { config, events })
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Roles in spawn order; builders come first so the first peer can bootstrap
    pub fn roles(&self) -> Vec<Role> {
        let peers = &self.config.peers;
        std::iter::repeat(Role::Builder)
            .take(peers.builders)
            .chain(std::iter::repeat(Role::Validator).take(peers.validators))
            .chain(std::iter::repeat(Role::NonValidator).take(peers.non_validators))
            .collect()
    }

    /// Run every engine to completion, or until `shutdown` flips to true or
    /// the configured duration elapses. Engines are always drained before
    /// the report is built.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<SimulationReport> {
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let start = Instant::now();

        let dht = SimulatedDht::new(self.config.dht_config());
        let roles = self.roles();

        let mut rng = match self.config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ids: Vec<PeerId> = roles.iter().map(|_| PeerId::random_with(&mut rng)).collect();

        let mut handles: Vec<DhtHandle> = Vec::with_capacity(ids.len());
        for id in &ids {
            handles.push(dht.join(*id).await);
        }

        let bootstrap = *ids.first().context("No peers to simulate")?;
        self.check_bootstrap(&bootstrap, &ids[1..]).await?;

        info!(
            builders = self.config.peers.builders,
            validators = self.config.peers.validators,
            non_validators = self.config.peers.non_validators,
            bootstrap = %bootstrap.short(),
            "Starting simulation"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let sampling = self.config.sampling_config();

        let mut tasks = Vec::with_capacity(ids.len());
        for (index, ((role, id), handle)) in roles.iter().zip(&ids).zip(handles).enumerate() {
            let mut config = sampling.clone();
            config.seed = sampling.seed.map(|seed| seed.wrapping_add(index as u64 + 1));

            let engine = SamplingEngine::new(*role, config, *id, handle, self.events.clone())
                .context("Failed to create sampling engine")?;
            tasks.push(tokio::spawn(engine.run(stop_rx.clone())));
        }

        let supervisor = tokio::spawn(supervise(shutdown, self.config.duration(), stop_tx));

        let mut reports = Vec::with_capacity(tasks.len());
        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Sampling engine task failed: {}", e),
            }
        }
        supervisor.abort();

        for id in &ids {
            dht.leave(id).await;
        }
        debug!(peers = ids.len(), "Peers left the DHT");

        let report = SimulationReport::fold(started_at, start.elapsed(), reports);
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            interrupted = report.interrupted,
            "Simulation finished"
        );

        Ok(report)
    }

    /// Confirm the bootstrap peer answers before any engine starts
    async fn check_bootstrap(&self, bootstrap: &PeerId, peers: &[PeerId]) -> Result<()> {
        let echo = EchoService::with_timeout(self.config.echo_timeout());
        let server = echo.register(*bootstrap).await;

        for peer in peers {
            let request = Envelope::new(format!("hello from {}", peer.short()));
            let reply = echo
                .echo(bootstrap, request)
                .await
                .with_context(|| format!("Bootstrap peer {} unreachable", bootstrap.short()))?;
            debug!(peer = %peer.short(), reply = %reply.message, "Bootstrap peer answered");
        }

        echo.deregister(bootstrap).await;
        server.await.context("Echo server task failed")?;
        Ok(())
    }
}

/// Flip `stop` once the caller asks for shutdown or the run duration elapses
async fn supervise(
    mut shutdown: watch::Receiver<bool>,
    duration: Option<Duration>,
    stop: watch::Sender<bool>,
) {
    let expiry = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = expiry => info!("Simulation duration elapsed, draining engines"),
        _ = shutdown_requested(&mut shutdown) => info!("Shutdown requested, draining engines"),
    }

    let _ = stop.send(true);
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: nobody can ask for shutdown any more
            std::future::pending::<()>().await;
        }
    }
}
