use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a peer identifier in bytes
pub const PEER_ID_LEN: usize = 32;

/// Identity of a simulated peer, compared by XOR distance
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    pub fn random_with<R: Rng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; PEER_ID_LEN];
        rng.fill(&mut bytes[..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    pub fn distance(&self, other: &PeerId) -> [u8; PEER_ID_LEN] {
        let mut result = [0u8; PEER_ID_LEN];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        result
    }

    /// Index of the highest differing bit, `None` for identical ids
    pub fn log_distance(&self, other: &PeerId) -> Option<usize> {
        let distance = self.distance(other);
        let bits = PEER_ID_LEN * 8;
        for i in 0..bits {
            let byte_idx = i / 8;
            let bit_idx = 7 - (i % 8);
            if (distance[byte_idx] >> bit_idx) & 1 == 1 {
                return Some(bits - 1 - i);
            }
        }
        None
    }

    /// Five hex characters, enough to tell peers apart in log lines
    pub fn short(&self) -> String {
        let mut encoded = hex::encode(&self.0[..3]);
        encoded.truncate(5);
        encoded
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

/// Drop the local peer from a peer listing
pub fn filter_self(peers: &[PeerId], local: &PeerId) -> Vec<PeerId> {
    peers.iter().filter(|p| *p != local).copied().collect()
}
