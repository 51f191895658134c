use super::{HistoryRecord, HistoryStore, MemoryHistory, TransitionCause};
use crate::clock::Timestamp;
use crate::density::DensityBucket;
use crate::error::StorageError;
use crate::{Phase, SignalId};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A durable history store that appends one JSON object per line.
///
/// Lines name their signal rather than carrying its ID, since IDs are only
/// meaningful within one run. Loaded records are held back until their
/// signal is registered. Writes go through a buffer that is emptied by
/// [HistoryStore::flush]; queries are answered from an in-memory index.
pub struct JsonLinesHistory {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    index: MemoryHistory,
    /// The name of every registered signal.
    names: RwLock<HashMap<SignalId, String>>,
    /// Loaded records whose signal has not been registered.
    unbound: Mutex<HashMap<String, Vec<StoredRecord>>>,
}

/// A [HistoryRecord] as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    signal: String,
    timestamp: Timestamp,
    phase: Phase,
    vehicle_count: u32,
    density: DensityBucket,
    duration_assigned: u32,
    cause: TransitionCause,
}

impl StoredRecord {
    fn new(name: &str, record: &HistoryRecord) -> Self {
        Self {
            signal: name.to_string(),
            timestamp: record.timestamp,
            phase: record.phase,
            vehicle_count: record.vehicle_count,
            density: record.density,
            duration_assigned: record.duration_assigned,
            cause: record.cause,
        }
    }

    fn bind(&self, signal_id: SignalId) -> HistoryRecord {
        HistoryRecord {
            signal_id,
            timestamp: self.timestamp,
            phase: self.phase,
            vehicle_count: self.vehicle_count,
            density: self.density,
            duration_assigned: self.duration_assigned,
            cause: self.cause,
        }
    }
}

impl JsonLinesHistory {
    /// Opens a history file, loading any records it already holds.
    ///
    /// A last line cut short by a crash is dropped from the file. Any other
    /// malformed line is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut unbound: HashMap<String, Vec<StoredRecord>> = HashMap::new();
        let mut truncate_to = None;
        let mut unterminated = false;

        match std::fs::read(&path) {
            Ok(content) => {
                let mut offset = 0;
                for (idx, line) in content.split_inclusive(|b| *b == b'\n').enumerate() {
                    let terminated = line.ends_with(b"\n");
                    if !line.iter().all(u8::is_ascii_whitespace) {
                        match serde_json::from_slice::<StoredRecord>(line) {
                            Ok(stored) => {
                                unterminated = !terminated;
                                unbound.entry(stored.signal.clone()).or_default().push(stored);
                            }
                            Err(source) if !terminated => {
                                warn!(
                                    "Dropping incomplete record on line {} of {}: {}",
                                    idx + 1,
                                    path.display(),
                                    source
                                );
                                truncate_to = Some(offset as u64);
                            }
                            Err(source) => {
                                return Err(StorageError::Decode {
                                    line: idx + 1,
                                    source,
                                })
                            }
                        }
                    }
                    offset += line.len();
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if let Some(len) = truncate_to {
            file.set_len(len)?;
        }
        let mut writer = BufWriter::new(file);
        if unterminated {
            writer.write_all(b"\n")?;
        }

        let loaded: usize = unbound.values().map(Vec::len).sum();
        if loaded > 0 {
            info!("Loaded {} history records from {}", loaded, path.display());
        }

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            index: MemoryHistory::new(),
            names: RwLock::new(HashMap::new()),
            unbound: Mutex::new(unbound),
        })
    }

    /// Gets the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The names of signals with loaded records that no registered signal
    /// has claimed.
    pub fn unclaimed(&self) -> Vec<String> {
        let mut names: Vec<_> = self.unbound.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl HistoryStore for JsonLinesHistory {
    fn append(&self, record: HistoryRecord) -> Result<(), StorageError> {
        let names = self.names.read();
        let name = names
            .get(&record.signal_id)
            .ok_or(StorageError::UnregisteredSignal(record.signal_id))?;
        let mut line = serde_json::to_vec(&StoredRecord::new(name, &record))
            .map_err(StorageError::Encode)?;
        line.push(b'\n');

        self.writer.lock().write_all(&line)?;
        self.index.push(record);
        Ok(())
    }

    fn query(&self, signal_id: SignalId, from: Timestamp, to: Timestamp) -> Vec<HistoryRecord> {
        self.index.query(signal_id, from, to)
    }

    fn recent(&self, signal_id: SignalId, limit: usize) -> Vec<HistoryRecord> {
        self.index.recent(signal_id, limit)
    }

    fn records(&self) -> Vec<HistoryRecord> {
        self.index.records()
    }

    fn register(&self, signal_id: SignalId, name: &str) {
        self.names.write().insert(signal_id, name.to_string());
        if let Some(stored) = self.unbound.lock().remove(name) {
            for record in &stored {
                self.index.push(record.bind(signal_id));
            }
        }
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.writer.lock().flush().map_err(|err| {
            warn!("Failed to flush history to {}: {}", self.path.display(), err);
            err.into()
        })
    }
}

impl Drop for JsonLinesHistory {
    fn drop(&mut self) {
        if let Err(err) = self.writer.get_mut().flush() {
            warn!("Failed to flush history to {}: {}", self.path.display(), err);
        }
    }
}
