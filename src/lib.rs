// Core modules
pub mod config;
pub mod node;

// Re-export commonly used types
pub use config::{Config, LogConfig, PeersConfig, SimulationConfig, StoreConfig};
pub use node::{PeerReport, RoleReport, Simulation, SimulationReport};

// Re-export crate modules
pub use das_network as network;
pub use das_sampling as sampling;
pub use das_storage as storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get simulator version string
pub fn client_version() -> String {
    format!("das-simulator/v{}/rust", VERSION)
}
