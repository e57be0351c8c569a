use thiserror::Error;

pub mod echo;
pub mod peer;
pub mod routing;

pub use echo::*;
pub use peer::*;
pub use routing::*;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Peer disconnected: {0}")]
    PeerDisconnected(String),

    #[error("Timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, NetworkError>;
