use async_trait::async_trait;
use bytes::Bytes;
use das_network::{filter_self, PeerId, RoutingTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{MemoryStore, Result, Retrieved, SampleStore, StorageError};

/// Fault and latency model of the simulated network
#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// Lower bound of the per-operation network delay
    pub min_latency: Duration,
    /// Upper bound of the per-operation network delay
    pub max_latency: Duration,
    /// Probability in `[0, 1]` that an operation fails after its delay
    pub failure_rate: f64,
    /// Upper bound on reported hop counts
    pub max_hops: u32,
    /// Seed for the fault model, entropy when unset
    pub seed: Option<u64>,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(1),
            max_latency: Duration::from_millis(20),
            failure_rate: 0.0,
            max_hops: 6,
            seed: None,
        }
    }
}

/// Shared record space and peer directory of the simulated network
///
/// Every simulated peer talks to it through its own [`DhtHandle`].
pub struct SimulatedDht {
    records: MemoryStore,
    directory: RwLock<Vec<PeerId>>,
    config: DhtConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedDht {
    pub fn new(config: DhtConfig) -> Arc<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Arc::new(Self {
            records: MemoryStore::new(),
            directory: RwLock::new(Vec::new()),
            config,
            rng: Mutex::new(rng),
        })
    }

    /// Register a peer and hand out its view of the network
    ///
    /// The returned handle starts with an empty routing table.
    pub async fn join(self: &Arc<Self>, local_id: PeerId) -> DhtHandle {
        let mut directory = self.directory.write().await;
        if !directory.contains(&local_id) {
            directory.push(local_id);
        }

        DhtHandle {
            dht: Arc::clone(self),
            local_id,
            routing: RoutingTable::new(local_id),
        }
    }

    /// Remove a peer from the directory. Routing tables already seeded
    /// with it are left untouched.
    pub async fn leave(&self, peer: &PeerId) {
        self.directory.write().await.retain(|p| p != peer);
    }

    pub async fn known_peers(&self) -> Vec<PeerId> {
        self.directory.read().await.clone()
    }

    pub fn records(&self) -> &MemoryStore {
        &self.records
    }

    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    async fn network_delay(&self) {
        let min = self.config.min_latency.as_micros() as u64;
        let max = self.config.max_latency.as_micros() as u64;
        let micros = if max > min {
            self.rng.lock().await.gen_range(min..=max)
        } else {
            min
        };

        if micros > 0 {
            tokio::time::sleep(Duration::from_micros(micros)).await;
        }
    }

    async fn should_fail(&self) -> bool {
        let rate = self.config.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && self.rng.lock().await.gen_bool(rate)
    }

    /// Hop count grows with the log of the routing table size
    async fn hops(&self, routing_len: usize) -> u32 {
        let ceiling = self.config.max_hops.max(1);
        let bound = (usize::BITS - routing_len.leading_zeros()).clamp(1, ceiling);
        self.rng.lock().await.gen_range(1..=bound)
    }
}

/// One peer's connection to the [`SimulatedDht`]
pub struct DhtHandle {
    dht: Arc<SimulatedDht>,
    local_id: PeerId,
    routing: RoutingTable,
}

impl DhtHandle {
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    /// Every registered peer except ourselves
    pub async fn known_peers(&self) -> Vec<PeerId> {
        filter_self(&self.dht.known_peers().await, &self.local_id)
    }

    pub async fn routing_peers(&self) -> Vec<PeerId> {
        filter_self(&self.routing.peers().await, &self.local_id)
    }

    /// Add specific peers to the routing table, returning how many were accepted
    pub async fn bootstrap(&self, peers: &[PeerId]) -> usize {
        let mut added = 0;
        for peer in filter_self(peers, &self.local_id) {
            if self.routing.add_peer(peer).await {
                added += 1;
            } else {
                warn!(
                    local = %self.local_id.short(),
                    peer = %peer.short(),
                    "Failed to add peer to routing table"
                );
            }
        }
        added
    }

    async fn ensure_routable(&self) -> Result<usize> {
        let len = self.routing.len().await;
        if len == 0 {
            return Err(StorageError::NoPeers);
        }
        Ok(len)
    }
}

#[async_trait]
impl SampleStore for DhtHandle {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.ensure_routable().await?;
        self.dht.network_delay().await;

        if self.dht.should_fail().await {
            return Err(StorageError::Unavailable(format!("put {} dropped", key)));
        }

        self.dht.records.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Retrieved> {
        let routing_len = self.ensure_routable().await?;
        self.dht.network_delay().await;

        if self.dht.should_fail().await {
            return Err(StorageError::Unavailable(format!("get {} dropped", key)));
        }

        let record = self.dht.records.get(key).await?;
        Ok(Retrieved {
            value: record.value,
            hops: self.dht.hops(routing_len).await,
        })
    }

    async fn seed_routing(&self) -> usize {
        let peers = self.known_peers().await;
        let routing_peers = self.routing_peers().await;

        if peers.is_empty() && routing_peers.is_empty() {
            debug!(local = %self.local_id.short(), "No peers known yet, nothing to seed");
            return 0;
        }

        if !routing_peers.is_empty() {
            return 0;
        }

        self.bootstrap(&peers).await
    }
}
