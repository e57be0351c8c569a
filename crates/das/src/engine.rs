//! Per-peer sampling state machine.
//!
//! Each simulated peer owns one [`SamplingEngine`]. The engine walks blocks
//! `0..total_blocks` one at a time; every block is either completed (its
//! working set drained) or abandoned when its deadline passes. The engine is
//! driven one store operation at a time through [`SamplingEngine::step`],
//! either by [`SamplingEngine::run`] or by an external scheduler.

use bytes::Bytes;
use das_network::PeerId;
use das_storage::{keys, SampleStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    select_random_subset, Category, DASError, EventCode, EventSink, LogEvent, Parcel, Partition,
    Result, SamplingSession, Stats, View, WorkItem,
};

/// Role a peer plays for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publishes every parcel of each block
    Builder,
    /// Fetches row, column and random parcel quotas
    Validator,
    /// Fetches random parcels only
    NonValidator,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Builder => "BUILDER",
            Role::Validator => "VALIDATOR",
            Role::NonValidator => "NON VALIDATOR",
        }
    }
}

impl FromStr for Role {
    type Err = DASError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "builder" => Ok(Role::Builder),
            "validator" => Ok(Role::Validator),
            "nonvalidator" | "non-validator" | "regular" => Ok(Role::NonValidator),
            _ => Err(DASError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Builder => "builder",
            Role::Validator => "validator",
            Role::NonValidator => "nonvalidator",
        };
        f.write_str(name)
    }
}

/// Sampling configuration
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Rows (and columns) of the block matrix
    pub row_count: usize,
    /// Samples per parcel
    pub parcel_size: usize,
    /// Blocks to process before the engine terminates
    pub total_blocks: u64,
    /// Time allowed per block before it is abandoned. A timeout too large
    /// to add to the current instant never expires.
    pub block_timeout: Duration,
    /// Pause between two steps when driven by [`SamplingEngine::run`]
    pub step_interval: Duration,
    /// Random parcels drawn per block by validators and non-validators
    pub random_samples: usize,
    /// Bytes per sample
    pub sample_size: usize,
    /// RNG seed, entropy when unset
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            row_count: 64,
            parcel_size: 16,
            total_blocks: 10,
            block_timeout: Duration::from_secs(30),
            step_interval: Duration::from_millis(10),
            random_samples: 75,
            sample_size: 512,
            seed: None,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.row_count == 0 {
            return Err(DASError::InvalidConfig("row_count must be greater than 0".to_string()));
        }
        if self.parcel_size == 0 {
            return Err(DASError::InvalidConfig("parcel_size must be greater than 0".to_string()));
        }
        if self.total_blocks == 0 {
            return Err(DASError::InvalidConfig("total_blocks must be greater than 0".to_string()));
        }
        if self.block_timeout.is_zero() {
            return Err(DASError::InvalidConfig("block_timeout must be non-zero".to_string()));
        }
        if self.step_interval.is_zero() {
            return Err(DASError::InvalidConfig("step_interval must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Row (and column) parcels a validator draws per block
    pub fn line_quota(&self) -> usize {
        2 * ((self.row_count / 2) / self.parcel_size + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOutcome {
    pub block_id: u64,
    pub status: BlockStatus,
    pub elapsed: Duration,
}

/// Result of one [`SamplingEngine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One store operation was issued, the block is still active
    Progress,
    /// The block drained its working set
    Completed(u64),
    /// The block's deadline passed before it drained
    Abandoned(u64),
    /// Every block has been processed
    Finished,
}

/// What an engine leaves behind once it stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReport {
    pub peer: PeerId,
    pub role: Role,
    pub stats: Stats,
    pub blocks: Vec<BlockOutcome>,
    /// False when the run was stopped before the last block
    pub finished: bool,
}

pub struct SamplingEngine<S: SampleStore> {
    role: Role,
    config: SamplingConfig,
    local_id: PeerId,
    store: S,
    events: Arc<dyn EventSink>,
    partition: Partition,
    rng: StdRng,
    block_id: u64,
    session: Option<SamplingSession>,
    routing_seeded: bool,
    finished: bool,
    stats: Stats,
    history: Vec<BlockOutcome>,
}

impl<S: SampleStore> SamplingEngine<S> {
    pub fn new(
        role: Role,
        config: SamplingConfig,
        local_id: PeerId,
        store: S,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let partition = Partition::new(config.row_count, config.parcel_size)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            role,
            config,
            local_id,
            store,
            events,
            partition,
            rng,
            block_id: 0,
            session: None,
            routing_seeded: false,
            finished: false,
            stats: Stats::new(),
            history: Vec::new(),
        })
    }

    /// Build an engine from a textual role, rejecting unknown roles up front
    pub fn from_role_name(
        role: &str,
        config: SamplingConfig,
        local_id: PeerId,
        store: S,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let role = role.parse::<Role>()?;
        Self::new(role, config, local_id, store, events)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Block currently being processed, or the next one to start
    pub fn block_id(&self) -> u64 {
        self.block_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn history(&self) -> &[BlockOutcome] {
        &self.history
    }

    /// Work items left in the active block, `None` between blocks
    pub fn remaining(&self) -> Option<usize> {
        self.session.as_ref().map(SamplingSession::remaining)
    }

    pub fn session(&self) -> Option<&SamplingSession> {
        self.session.as_ref()
    }

    pub fn into_stats(self) -> Stats {
        self.stats
    }

    pub fn into_report(self) -> EngineReport {
        EngineReport {
            peer: self.local_id,
            role: self.role,
            stats: self.stats,
            blocks: self.history,
            finished: self.finished,
        }
    }

    /// Advance the state machine by at most one store operation.
    ///
    /// The block deadline is checked here, before issuing the next
    /// operation; a store call that is already running is never cut short.
    pub async fn step(&mut self) -> StepOutcome {
        if self.finished {
            return StepOutcome::Finished;
        }

        if !self.routing_seeded {
            let added = self.store.seed_routing().await;
            self.routing_seeded = true;
            if added > 0 {
                debug!(peer = %self.local_id.short(), added, "Seeded routing table");
            }
        }

        let now = Instant::now();
        let mut session = match self.session.take() {
            Some(session) => session,
            None => self.begin_block(now),
        };

        if session.is_expired(now) {
            return self.abandon_block(session, now);
        }

        let Some(index) = session.pick(&mut self.rng) else {
            return self.complete_block(session, now);
        };
        let Some(item) = session.item(index).copied() else {
            self.session = Some(session);
            return StepOutcome::Progress;
        };

        let succeeded = match self.role {
            Role::Builder => self.seed_parcel(&item.parcel).await,
            Role::Validator | Role::NonValidator => self.sample_parcel(&item.parcel).await,
        };

        if succeeded {
            let now = Instant::now();
            if let Some((category, latency)) = session.complete(index, now) {
                info!(
                    peer = %self.local_id.short(),
                    block = self.block_id,
                    %category,
                    latency_ms = latency.as_millis() as u64,
                    "Sampling category finished"
                );
                self.stats.record_sampling_latency(category, latency);
            }
        }

        if session.is_empty() {
            return self.complete_block(session, Instant::now());
        }

        self.session = Some(session);
        StepOutcome::Progress
    }

    /// Drive [`step`](Self::step) on a ticker until every block is processed
    /// or `shutdown` flips to true.
    ///
    /// Shutdown is observed between steps only, so the store call in flight
    /// when it is requested still completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EngineReport {
        let mut ticker = tokio::time::interval(self.config.step_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            peer = %self.local_id.short(),
            role = %self.role,
            blocks = self.config.total_blocks,
            "Sampling engine started"
        );

        while !self.finished && !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.finished {
            info!(peer = %self.local_id.short(), role = %self.role, "All blocks processed");
        } else {
            info!(
                peer = %self.local_id.short(),
                role = %self.role,
                block = self.block_id,
                "Sampling engine stopped before the last block"
            );
        }

        self.into_report()
    }

    fn begin_block(&mut self, now: Instant) -> SamplingSession {
        let items: Vec<WorkItem> = match self.role {
            Role::Builder => self
                .partition
                .select(View::All)
                .into_iter()
                .map(WorkItem::seed)
                .collect(),
            Role::Validator => {
                let quota = self.config.line_quota();
                let mut items = self.draw(Category::Row, self.partition.rows().to_vec(), quota);
                items.extend(self.draw(Category::Col, self.partition.cols().to_vec(), quota));
                items.extend(self.draw_random());
                items
            }
            Role::NonValidator => self.draw_random(),
        };

        let event = match self.role {
            Role::Builder => EventCode::HeaderSent,
            Role::Validator | Role::NonValidator => EventCode::HeaderReceived,
        };
        self.events.record(LogEvent::now(event, self.block_id));

        info!(
            peer = %self.local_id.short(),
            role = self.role.label(),
            block = self.block_id,
            parcels = items.len(),
            "Starting block"
        );

        SamplingSession::new(self.block_id, items, now, self.config.block_timeout)
    }

    fn draw(&mut self, category: Category, pool: Vec<Parcel>, count: usize) -> Vec<WorkItem> {
        select_random_subset(&pool, count, &mut self.rng)
            .into_iter()
            .map(|parcel| WorkItem::sample(parcel, category))
            .collect()
    }

    fn draw_random(&mut self) -> Vec<WorkItem> {
        let pool = self.partition.select(View::All);
        self.draw(Category::Random, pool, self.config.random_samples)
    }

    async fn seed_parcel(&mut self, parcel: &Parcel) -> bool {
        let key = parcel.key(self.block_id);
        let payload = Bytes::from(vec![0u8; parcel.payload_len(self.config.sample_size)]);

        let start = Instant::now();
        let result = self.store.put(&key, payload).await;
        let latency = start.elapsed();
        self.stats.record_put(latency, result.is_ok());

        match result {
            Ok(()) => {
                debug!(
                    peer = %self.local_id.short(),
                    block = self.block_id,
                    axis = keys::axis(parcel.is_row),
                    first = parcel.starting_index,
                    last = parcel.last_index(self.config.row_count),
                    "[{}] PUT parcel",
                    self.role.label()
                );
                true
            }
            Err(e) => {
                warn!(
                    peer = %self.local_id.short(),
                    block = self.block_id,
                    key = %key,
                    "[{}] put failed: {}",
                    self.role.label(),
                    e
                );
                false
            }
        }
    }

    async fn sample_parcel(&mut self, parcel: &Parcel) -> bool {
        let key = parcel.key(self.block_id);

        let start = Instant::now();
        let result = self.store.get(&key).await;
        let latency = start.elapsed();

        match result {
            Ok(retrieved) => {
                self.stats.record_get(latency, Some(retrieved.hops));
                debug!(
                    peer = %self.local_id.short(),
                    block = self.block_id,
                    axis = keys::axis(parcel.is_row),
                    first = parcel.starting_index,
                    hops = retrieved.hops,
                    "[{}] GET parcel",
                    self.role.label()
                );
                true
            }
            Err(e) => {
                self.stats.record_get(latency, None);
                debug!(
                    peer = %self.local_id.short(),
                    block = self.block_id,
                    key = %key,
                    "[{}] get failed: {}",
                    self.role.label(),
                    e
                );
                false
            }
        }
    }

    fn complete_block(&mut self, session: SamplingSession, now: Instant) -> StepOutcome {
        let block_id = session.block_id();
        let elapsed = session.elapsed(now);

        match self.role {
            Role::Builder => self.stats.record_seeding_latency(elapsed),
            Role::Validator | Role::NonValidator => {
                self.events
                    .record(LogEvent::now(EventCode::SamplingFinished, block_id));
            }
        }

        info!(
            peer = %self.local_id.short(),
            role = self.role.label(),
            block = block_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Block completed"
        );

        self.history.push(BlockOutcome {
            block_id,
            status: BlockStatus::Completed,
            elapsed,
        });
        self.advance();
        StepOutcome::Completed(block_id)
    }

    fn abandon_block(&mut self, session: SamplingSession, now: Instant) -> StepOutcome {
        let block_id = session.block_id();
        let elapsed = session.elapsed(now);

        warn!(
            peer = %self.local_id.short(),
            role = self.role.label(),
            block = block_id,
            remaining = session.remaining(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Block deadline passed, abandoning"
        );

        self.history.push(BlockOutcome {
            block_id,
            status: BlockStatus::Abandoned,
            elapsed,
        });
        self.advance();
        StepOutcome::Abandoned(block_id)
    }

    fn advance(&mut self) {
        if self.block_id + 1 >= self.config.total_blocks {
            self.finished = true;
        } else {
            self.block_id += 1;
        }
    }
}
