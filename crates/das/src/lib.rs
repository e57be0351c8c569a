pub mod engine;
pub mod events;
pub mod partition;
pub mod selector;
pub mod session;
pub mod stats;

pub use engine::{
    BlockOutcome, BlockStatus, EngineReport, Role, SamplingConfig, SamplingEngine, StepOutcome,
};
pub use events::{
    EventCode, EventSink, JsonLinesEventSink, LogEvent, NoopEventSink, RecordingEventSink,
    TracingEventSink,
};
pub use partition::{split_samples_into_parcels, Parcel, ParcelId, Partition, View};
pub use selector::select_random_subset;
pub use session::{Category, CategoryProgress, SamplingSession, WorkItem};
pub use stats::{LatencySummary, Stats, StatsSummary};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DASError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown parcel view: {0}")]
    InvalidView(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown event code: {0}")]
    InvalidEventCode(u8),
}

pub type Result<T> = std::result::Result<T, DASError>;
