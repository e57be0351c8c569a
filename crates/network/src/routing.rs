use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::PeerId;

pub const BUCKET_SIZE: usize = 16;
const BUCKET_COUNT: usize = 256;

#[derive(Debug)]
pub struct KBucket {
    peers: VecDeque<PeerId>,
    capacity: usize,
}

impl KBucket {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: VecDeque::new(),
            capacity,
        }
    }

    pub fn add(&mut self, peer: PeerId) -> bool {
        // Move to front (most recently seen)
        if let Some(pos) = self.peers.iter().position(|p| *p == peer) {
            self.peers.remove(pos);
            self.peers.push_front(peer);
            return true;
        }

        if self.peers.len() < self.capacity {
            self.peers.push_front(peer);
            return true;
        }

        false
    }

    pub fn remove(&mut self, peer: &PeerId) {
        self.peers.retain(|p| p != peer);
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Per-peer routing state, bucketed by XOR log distance from the local id
pub struct RoutingTable {
    buckets: Vec<RwLock<KBucket>>,
    local_id: PeerId,
}

impl RoutingTable {
    pub fn new(local_id: PeerId) -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for _ in 0..BUCKET_COUNT {
            buckets.push(RwLock::new(KBucket::new(BUCKET_SIZE)));
        }

        Self { buckets, local_id }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Returns false for the local id or when the target bucket is full
    pub async fn add_peer(&self, peer: PeerId) -> bool {
        match self.local_id.log_distance(&peer) {
            Some(idx) => self.buckets[idx].write().await.add(peer),
            None => false,
        }
    }

    pub async fn remove_peer(&self, peer: &PeerId) {
        if let Some(idx) = self.local_id.log_distance(peer) {
            self.buckets[idx].write().await.remove(peer);
        }
    }

    pub async fn peers(&self) -> Vec<PeerId> {
        let mut peers = Vec::new();
        for bucket in &self.buckets {
            peers.extend(bucket.read().await.peers());
        }
        peers
    }

    pub async fn find_nearest(&self, target: &PeerId, count: usize) -> Vec<PeerId> {
        let mut peers = self.peers().await;
        peers.sort_by_key(|p| p.distance(target));
        peers.truncate(count);
        peers
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PEER_ID_LEN;

    fn peer_with_last_byte(byte: u8) -> PeerId {
        let mut bytes = [0u8; PEER_ID_LEN];
        bytes[PEER_ID_LEN - 1] = byte;
        PeerId::from_bytes(bytes)
    }

    #[test]
    fn test_bucket_capacity() {
        let mut bucket = KBucket::new(2);
        assert!(bucket.add(peer_with_last_byte(1)));
        assert!(bucket.add(peer_with_last_byte(2)));
        assert!(!bucket.add(peer_with_last_byte(3)));
        // Re-adding a known peer refreshes it instead of failing
        assert!(bucket.add(peer_with_last_byte(1)));
        assert_eq!(bucket.peers()[0], peer_with_last_byte(1));
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let local = peer_with_last_byte(0);
        let table = RoutingTable::new(local);

        assert!(!table.add_peer(local).await);
        assert!(table.is_empty().await);

        let other = peer_with_last_byte(7);
        assert!(table.add_peer(other).await);
        assert_eq!(table.len().await, 1);
        assert_eq!(table.peers().await, vec![other]);

        table.remove_peer(&other).await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_nearest() {
        let table = RoutingTable::new(peer_with_last_byte(0));
        for byte in [1u8, 4, 9, 200] {
            table.add_peer(peer_with_last_byte(byte)).await;
        }

        let nearest = table.find_nearest(&peer_with_last_byte(8), 2).await;
        assert_eq!(nearest, vec![peer_with_last_byte(9), peer_with_last_byte(1)]);
    }
}
