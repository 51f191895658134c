pub use analytics::{NetworkAnalytics, PeakSample, SignalStats};
pub use clock::{Clock, SystemClock, Timestamp, VirtualClock};
pub use config::{
    DensityThresholds, GreenDurations, NetworkConfig, PhaseBounds, SignalSpec, TimingConfig,
};
pub use controller::{SignalController, SignalInfo, SignalState};
pub use density::{check_count, parse_count, DensityBucket, DensityEstimator};
pub use error::{ConfigError, SignalError, StorageError};
pub use history::{HistoryRecord, HistoryStore, JsonLinesHistory, MemoryHistory, TransitionCause};
pub use light::Phase;
pub use network::{SignalNetwork, TickReport};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use synthetic::SyntheticCounts;
pub use timer::PhaseTimer;
pub use util::Interval;

mod analytics;
mod clock;
mod config;
mod controller;
mod density;
mod error;
mod history;
mod light;
mod network;
mod synthetic;
mod timer;
mod util;

new_key_type! {
    /// Unique ID of a signal in a [SignalNetwork].
    pub struct SignalId;
}
