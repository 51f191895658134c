//! The append-only record of phase transitions.

use crate::clock::Timestamp;
use crate::density::DensityBucket;
use crate::error::StorageError;
use crate::{Phase, SignalId};
use itertools::Itertools;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use file::JsonLinesHistory;

mod file;

/// A phase transition and the density sample it was timed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The signal that changed phase.
    pub signal_id: SignalId,
    /// When the phase was entered.
    pub timestamp: Timestamp,
    /// The phase just entered.
    pub phase: Phase,
    /// The vehicle count sampled at the transition.
    pub vehicle_count: u32,
    /// The density bucket of `vehicle_count`.
    pub density: DensityBucket,
    /// The duration given to the new phase, in s.
    pub duration_assigned: u32,
    /// What caused the transition.
    pub cause: TransitionCause,
}

/// The reason a signal changed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// The previous phase's timer expired.
    Cycle,
    /// Emergency preemption forced green.
    EmergencyActivated,
    /// Emergency preemption ended and a fresh cycle began.
    EmergencyCleared,
}

/// Storage for [HistoryRecord]s.
///
/// Each signal's records are appended in timestamp order, and stores must
/// accept concurrent appends from different signals.
pub trait HistoryStore: Send + Sync {
    /// Appends a record.
    fn append(&self, record: HistoryRecord) -> Result<(), StorageError>;

    /// Returns a signal's records with `from <= timestamp <= to`, oldest first.
    fn query(&self, signal_id: SignalId, from: Timestamp, to: Timestamp) -> Vec<HistoryRecord>;

    /// Returns a signal's latest `limit` records, oldest first.
    fn recent(&self, signal_id: SignalId, limit: usize) -> Vec<HistoryRecord>;

    /// Returns every record of every signal, ordered by timestamp then signal.
    fn records(&self) -> Vec<HistoryRecord>;

    /// Binds a signal's ID in this run to its stable name.
    ///
    /// Durable stores key their records by name, so records written by an
    /// earlier run reappear under whichever ID the name now has.
    fn register(&self, _signal_id: SignalId, _name: &str) {}

    /// Makes every appended record durable.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// An in-memory history store.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    streams: RwLock<HashMap<SignalId, Vec<HistoryRecord>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Default::default()
    }

    /// The total number of records held.
    pub fn len(&self) -> usize {
        self.streams.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a record, keeping its signal's stream sorted by timestamp.
    pub(crate) fn push(&self, record: HistoryRecord) {
        let mut streams = self.streams.write();
        let stream = streams.entry(record.signal_id).or_default();
        match stream.last() {
            Some(last) if last.timestamp > record.timestamp => {
                let idx = stream.partition_point(|r| r.timestamp <= record.timestamp);
                stream.insert(idx, record);
            }
            _ => stream.push(record),
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, record: HistoryRecord) -> Result<(), StorageError> {
        self.push(record);
        Ok(())
    }

    fn query(&self, signal_id: SignalId, from: Timestamp, to: Timestamp) -> Vec<HistoryRecord> {
        if from > to {
            return vec![];
        }
        let streams = self.streams.read();
        let Some(stream) = streams.get(&signal_id) else {
            return vec![];
        };
        let start = stream.partition_point(|r| r.timestamp < from);
        let end = stream.partition_point(|r| r.timestamp <= to);
        stream[start..end].to_vec()
    }

    fn recent(&self, signal_id: SignalId, limit: usize) -> Vec<HistoryRecord> {
        let streams = self.streams.read();
        streams
            .get(&signal_id)
            .map(|stream| stream[stream.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default()
    }

    fn records(&self) -> Vec<HistoryRecord> {
        let streams = self.streams.read();
        streams
            .values()
            .map(|stream| stream.iter().copied())
            .kmerge_by(|a, b| (a.timestamp, a.signal_id) < (b.timestamp, b.signal_id))
            .collect()
    }
}
