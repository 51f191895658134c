use crate::analytics::NetworkAnalytics;
use crate::clock::{Clock, Timestamp};
use crate::config::{NetworkConfig, TimingConfig};
use crate::controller::{SignalController, SignalState};
use crate::density::DensityEstimator;
use crate::error::{ConfigError, SignalError, StorageError};
use crate::history::{HistoryRecord, HistoryStore};
use crate::synthetic::SyntheticCounts;
use crate::SignalId;
use log::info;
use parking_lot::Mutex;
use rand::Rng;
use rayon::prelude::*;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A network of independently timed traffic signals.
///
/// The set of signals is fixed at construction. Each signal sits behind its
/// own lock, so ticks, overrides and emergency toggles on different signals
/// never wait on each other, and every method takes `&self`.
pub struct SignalNetwork {
    /// The signal controllers.
    signals: SlotMap<SignalId, Mutex<SignalController>>,
    /// The timing policy shared by every controller.
    estimator: Arc<DensityEstimator>,
    /// The source of history timestamps.
    clock: Arc<dyn Clock>,
    /// Where phase transitions are recorded.
    history: Arc<dyn HistoryStore>,
}

/// The outcome of a [SignalNetwork::tick].
#[derive(Debug, Default)]
pub struct TickReport {
    /// The signals that changed phase.
    pub changed: Vec<SignalId>,
    /// The signals whose transitions could not all be recorded.
    pub failures: Vec<(SignalId, StorageError)>,
    /// Set if the tick's records were accepted but could not be made durable.
    pub flush_failure: Option<StorageError>,
}

impl TickReport {
    fn merge(mut self, other: Self) -> Self {
        self.changed.extend(other.changed);
        self.failures.extend(other.failures);
        self.flush_failure = self.flush_failure.or(other.flush_failure);
        self
    }

    /// Whether every transition in the tick was durably recorded.
    pub fn is_recorded(&self) -> bool {
        self.failures.is_empty() && self.flush_failure.is_none()
    }
}

impl SignalNetwork {
    /// Creates a network from a configuration, starting every signal at red.
    pub fn new(
        config: &NetworkConfig,
        clock: Arc<dyn Clock>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let estimator = Arc::new(DensityEstimator::new(config.timing.clone())?);

        let mut signals: SlotMap<SignalId, Mutex<SignalController>> = SlotMap::with_key();
        for spec in &config.signals {
            let id = signals.insert_with_key(|id| {
                Mutex::new(SignalController::new(id, spec, estimator.clone()))
            });
            history.register(id, &spec.name);
            if let Some(last) = history.recent(id, 1).first() {
                signals[id].get_mut().resume_after(last.timestamp);
            }
        }
        info!("Created signal network with {} signals", signals.len());

        Ok(Self {
            signals,
            estimator,
            clock,
            history,
        })
    }

    /// The number of signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Gets the timing policy.
    pub fn timing(&self) -> &TimingConfig {
        self.estimator.timing()
    }

    /// Returns an iterator over the IDs of every signal.
    pub fn ids(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals.keys()
    }

    /// Finds a signal by name.
    pub fn find(&self, name: &str) -> Option<SignalId> {
        self.signals
            .iter()
            .find(|(_, signal)| signal.lock().info().name == name)
            .map(|(id, _)| id)
    }

    /// Advances every signal by `elapsed` seconds.
    ///
    /// Signals are advanced in parallel and in no particular order. The
    /// history is flushed once every signal has been advanced.
    pub fn tick(&self, elapsed: u32) -> TickReport {
        let now = self.clock.now();
        let history = &*self.history;
        let signals: SmallVec<[&Mutex<SignalController>; 16]> = self.signals.values().collect();

        let mut report = signals
            .as_slice()
            .par_iter()
            .map(|signal| {
                let mut signal = signal.lock();
                let mut report = TickReport::default();
                match signal.advance(elapsed, now, history) {
                    Ok(0) => {}
                    Ok(_) => report.changed.push(signal.id()),
                    Err(err) => {
                        report.changed.push(signal.id());
                        report.failures.push((signal.id(), err));
                    }
                }
                report
            })
            .reduce(TickReport::default, TickReport::merge);

        report.flush_failure = self.history.flush().err();
        report
    }

    /// Gets a copy of a signal's state.
    pub fn get_signal(&self, id: SignalId) -> Result<SignalState, SignalError> {
        Ok(self.controller(id)?.lock().snapshot())
    }

    /// Gets a copy of every signal's state.
    pub fn get_all(&self) -> Vec<SignalState> {
        self.signals
            .values()
            .map(|signal| signal.lock().snapshot())
            .collect()
    }

    /// Replaces a signal's vehicle count. It takes effect at the signal's
    /// next transition.
    pub fn override_count(&self, id: SignalId, count: i64) -> Result<(), SignalError> {
        self.controller(id)?.lock().override_vehicle_count(count)
    }

    /// Turns emergency preemption on or off.
    ///
    /// Returns whether the signal changed. If the change could not be recorded
    /// durably, it is still applied and [SignalError::StorageUnavailable] is
    /// returned.
    pub fn set_emergency(&self, id: SignalId, active: bool) -> Result<bool, SignalError> {
        let signal = self.controller(id)?;
        let now = self.clock.now();
        let history = &*self.history;
        let mut signal = signal.lock();
        let changed = if active {
            signal.activate_emergency(now, history)?
        } else {
            signal.deactivate_emergency(now, history)?
        };
        if changed {
            history.flush()?;
        }
        Ok(changed)
    }

    /// Gets a signal's transitions with `from <= timestamp <= to`, oldest first.
    pub fn history(
        &self,
        id: SignalId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<HistoryRecord>, SignalError> {
        self.controller(id)?;
        Ok(self.history.query(id, from, to))
    }

    /// Gets a signal's latest `limit` transitions, oldest first.
    pub fn recent_history(
        &self,
        id: SignalId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, SignalError> {
        self.controller(id)?;
        Ok(self.history.recent(id, limit))
    }

    /// Computes statistics over the whole history.
    pub fn analytics(&self) -> NetworkAnalytics {
        let names: Vec<(SignalId, String)> = self
            .signals
            .iter()
            .map(|(id, signal)| (id, signal.lock().info().name.clone()))
            .collect();
        let records = self.history.records();
        NetworkAnalytics::compute(
            names.iter().map(|(id, name)| (*id, name.as_str())),
            &records,
        )
    }

    /// Gives every signal not under emergency preemption a freshly generated
    /// vehicle count. Returns the number of signals updated.
    pub fn resample_counts<R: Rng + ?Sized>(&self, rng: &mut R, source: &SyntheticCounts) -> usize {
        let mut updated = 0;
        for signal in self.signals.values() {
            let mut signal = signal.lock();
            if !signal.is_emergency() {
                signal.set_vehicle_count(source.sample(rng));
                updated += 1;
            }
        }
        updated
    }

    fn controller(&self, id: SignalId) -> Result<&Mutex<SignalController>, SignalError> {
        self.signals.get(id).ok_or(SignalError::UnknownSignal(id))
    }
}
