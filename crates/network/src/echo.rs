use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{NetworkError, PeerId, Result};

const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(5);
const MAILBOX_SIZE: usize = 32;

/// Request and reply body for the liveness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: String,
}

impl Envelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type EchoRequest = (Envelope, oneshot::Sender<Envelope>);

/// In-process request/reply service used to confirm that a peer is reachable
#[derive(Clone)]
pub struct EchoService {
    servers: Arc<RwLock<HashMap<PeerId, mpsc::Sender<EchoRequest>>>>,
    timeout: Duration,
}

impl EchoService {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_ECHO_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            servers: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Start answering echo requests on behalf of `peer`
    ///
    /// The server task ends once the peer is deregistered.
    pub async fn register(&self, peer: PeerId) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<EchoRequest>(MAILBOX_SIZE);
        self.servers.write().await.insert(peer, tx);

        tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                debug!(
                    peer = %peer.short(),
                    bytes = request.message.len(),
                    "Echo request received"
                );
                let response = Envelope::new(format!("Peer {} got 42KB", peer));
                if reply.send(response).is_err() {
                    warn!(peer = %peer.short(), "Echo caller went away before reply");
                }
            }
        })
    }

    pub async fn deregister(&self, peer: &PeerId) {
        self.servers.write().await.remove(peer);
    }

    pub async fn echo(&self, peer: &PeerId, envelope: Envelope) -> Result<Envelope> {
        let server = self
            .servers
            .read()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| NetworkError::Unreachable(peer.short()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        server
            .send((envelope, reply_tx))
            .await
            .map_err(|_| NetworkError::PeerDisconnected(peer.short()))?;

        match timeout(self.timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(NetworkError::PeerDisconnected(peer.short())),
            Err(_) => Err(NetworkError::Timeout),
        }
    }
}

impl Default for EchoService {
    fn default() -> Self {
        Self::new()
    }
}
