use crate::SignalId;
use std::path::PathBuf;

/// An error returned by a [SignalNetwork](crate::SignalNetwork) operation.
///
/// None of these leave a signal in a partially updated state.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("unknown signal {0:?}")]
    UnknownSignal(SignalId),

    #[error("invalid vehicle count: {0}")]
    InvalidCount(String),

    /// The phase change was applied but could not be written to history.
    #[error("history storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}

/// A failure to append to or read from a durable history store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode record: {0}")]
    Encode(serde_json::Error),

    #[error("no history stream registered for signal {0:?}")]
    UnregisteredSignal(SignalId),
}

/// A fatal problem with the network configuration, detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{phase} duration bounds {min}..={max} are invalid")]
    InvalidBounds {
        phase: &'static str,
        min: u32,
        max: u32,
    },

    #[error("density thresholds must be strictly increasing")]
    UnorderedThresholds,

    #[error("green durations must not decrease with density")]
    UnorderedGreenDurations,

    #[error("emergency green duration {0}s lies outside the green bounds")]
    EmergencyOutOfBounds(u32),

    #[error("the network has no signals")]
    NoSignals,

    #[error("duplicate signal name {0:?}")]
    DuplicateSignal(String),

    #[error("Poisson mean {0} must be positive and finite")]
    InvalidPoissonMean(f64),
}
