use crate::clock::Timestamp;
use crate::config::SignalSpec;
use crate::density::{check_count, DensityBucket, DensityEstimator};
use crate::error::{SignalError, StorageError};
use crate::history::{HistoryRecord, HistoryStore, TransitionCause};
use crate::timer::PhaseTimer;
use crate::{Phase, SignalId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The phase state machine of a single intersection.
///
/// Phases cycle green, yellow, red. Each phase's duration is fixed when it
/// is entered, using the vehicle count at that moment, so a new count only
/// takes effect at the next transition.
#[derive(Debug, Clone)]
pub struct SignalController {
    /// The signal's ID.
    id: SignalId,
    /// Descriptive details of the intersection.
    info: SignalInfo,
    /// The active phase.
    phase: Phase,
    /// The countdown for the active phase.
    timer: PhaseTimer,
    /// The last observed or overridden vehicle count.
    vehicle_count: u32,
    /// Whether emergency preemption is holding the signal green.
    emergency: bool,
    /// The green duration most recently assigned, in s.
    green_assigned: u32,
    /// The timestamp of the most recent history record.
    last_record: Option<Timestamp>,
    /// The shared timing policy.
    estimator: Arc<DensityEstimator>,
}

/// Descriptive details of an intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A point-in-time copy of a signal's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub id: SignalId,
    #[serde(flatten)]
    pub info: SignalInfo,
    pub phase: Phase,
    pub remaining_secs: u32,
    pub vehicle_count: u32,
    pub density: DensityBucket,
    pub emergency_active: bool,
    /// The green duration most recently assigned, in s.
    pub green_assigned: u32,
    /// How well the assigned green suits the current count, from 0 to 100.
    pub efficiency: u8,
}

impl SignalController {
    /// Creates a controller in the red phase.
    pub fn new(id: SignalId, spec: &SignalSpec, estimator: Arc<DensityEstimator>) -> Self {
        let mut timer = PhaseTimer::new();
        timer.start(estimator.duration_for(DensityBucket::Low, Phase::Red));
        Self {
            id,
            info: SignalInfo {
                name: spec.name.clone(),
                location: spec.location.clone(),
                latitude: spec.latitude,
                longitude: spec.longitude,
            },
            phase: Phase::Red,
            timer,
            vehicle_count: spec.initial_count,
            emergency: false,
            green_assigned: estimator.ideal_green(spec.initial_count),
            last_record: None,
            estimator,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn info(&self) -> &SignalInfo {
        &self.info
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The seconds left in the active phase.
    pub fn remaining(&self) -> u32 {
        self.timer.remaining()
    }

    pub fn vehicle_count(&self) -> u32 {
        self.vehicle_count
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Advances the signal by `elapsed` seconds.
    ///
    /// Time left over after an expiry carries into the next phase, so a long
    /// step may pass through several phases. While emergency preemption is
    /// active an expiry re-arms green instead.
    ///
    /// A step is cut short after the active phase plus one longest possible
    /// cycle, so a stalled caller cannot flood the history.
    ///
    /// Returns the number of transitions made. A history write failure does not
    /// stop the signal: every transition is still applied and the first
    /// failure is returned.
    pub fn advance(
        &mut self,
        elapsed: u32,
        now: Timestamp,
        history: &dyn HistoryStore,
    ) -> Result<usize, StorageError> {
        let limit = self.timer.remaining().saturating_add(self.estimator.longest_cycle());
        let elapsed = if elapsed > limit {
            warn!(
                "{}: step of {}s exceeds a full cycle, advancing {}s",
                self.info.name, elapsed, limit
            );
            limit
        } else {
            elapsed
        };

        let mut leftover = self.timer.tick(elapsed);
        let mut transitions = 0;
        let mut failure = None;

        while self.timer.is_expired() {
            if self.emergency {
                let secs = self.estimator.emergency_green();
                debug!("{}: re-arming emergency green for {}s", self.info.name, secs);
                self.timer.start(secs);
            } else {
                let next = self.phase.next();
                let bucket = self.estimator.classify(self.vehicle_count);
                let secs = self.estimator.duration_for(bucket, next);
                if let Err(err) = self.enter(next, secs, TransitionCause::Cycle, now, history) {
                    failure.get_or_insert(err);
                }
                transitions += 1;
            }
            leftover = self.timer.tick(leftover);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(transitions),
        }
    }

    /// Replaces the stored vehicle count.
    ///
    /// The phase and its remaining time are unchanged; the count is sampled at
    /// the next transition. Negative counts are rejected.
    pub fn override_vehicle_count(&mut self, count: i64) -> Result<(), SignalError> {
        let count = check_count(count).map_err(|err| {
            warn!("{}: rejected vehicle count {}", self.info.name, count);
            err
        })?;
        self.set_vehicle_count(count);
        Ok(())
    }

    /// Replaces the stored vehicle count with an already validated value.
    pub fn set_vehicle_count(&mut self, count: u32) {
        self.vehicle_count = count;
        if self.emergency {
            debug!(
                "{}: count set to {} (deferred until emergency ends)",
                self.info.name, count
            );
        } else {
            debug!("{}: count set to {}", self.info.name, count);
        }
    }

    /// Forces the signal green and holds it there.
    ///
    /// Returns false, without recording anything, if emergency preemption
    /// was already active.
    pub fn activate_emergency(
        &mut self,
        now: Timestamp,
        history: &dyn HistoryStore,
    ) -> Result<bool, StorageError> {
        if self.emergency {
            return Ok(false);
        }
        info!("{}: emergency preemption from {}", self.info.name, self.phase);
        self.emergency = true;
        let secs = self.estimator.emergency_green();
        self.enter(Phase::Green, secs, TransitionCause::EmergencyActivated, now, history)?;
        Ok(true)
    }

    /// Ends emergency preemption and starts a fresh cycle at green, timed
    /// from the current vehicle count.
    ///
    /// Returns false if emergency preemption was not active.
    pub fn deactivate_emergency(
        &mut self,
        now: Timestamp,
        history: &dyn HistoryStore,
    ) -> Result<bool, StorageError> {
        if !self.emergency {
            return Ok(false);
        }
        info!("{}: emergency preemption cleared", self.info.name);
        self.emergency = false;
        let secs = self.estimator.ideal_green(self.vehicle_count);
        self.enter(Phase::Green, secs, TransitionCause::EmergencyCleared, now, history)?;
        Ok(true)
    }

    /// Continues a history written by an earlier run, so new records are
    /// timestamped after `last`.
    pub(crate) fn resume_after(&mut self, last: Timestamp) {
        self.last_record = Some(last);
    }

    /// Takes a copy of the signal's state.
    pub fn snapshot(&self) -> SignalState {
        SignalState {
            id: self.id,
            info: self.info.clone(),
            phase: self.phase,
            remaining_secs: self.timer.remaining(),
            vehicle_count: self.vehicle_count,
            density: self.estimator.classify(self.vehicle_count),
            emergency_active: self.emergency,
            green_assigned: self.green_assigned,
            efficiency: self
                .estimator
                .efficiency(self.vehicle_count, self.green_assigned, self.phase),
        }
    }

    /// Enters a phase, starts its timer and records the transition.
    fn enter(
        &mut self,
        phase: Phase,
        secs: u32,
        cause: TransitionCause,
        now: Timestamp,
        history: &dyn HistoryStore,
    ) -> Result<(), StorageError> {
        self.phase = phase;
        self.timer.start(secs);
        if phase == Phase::Green {
            self.green_assigned = secs;
        }

        // Records for one signal must have strictly increasing timestamps
        let timestamp = match self.last_record {
            Some(last) if now <= last => last.next(),
            _ => now,
        };
        self.last_record = Some(timestamp);

        debug!("{}: {} for {}s ({:?})", self.info.name, phase, secs, cause);

        let record = HistoryRecord {
            signal_id: self.id,
            timestamp,
            phase,
            vehicle_count: self.vehicle_count,
            density: self.estimator.classify(self.vehicle_count),
            duration_assigned: secs,
            cause,
        };
        history.append(record).map_err(|err| {
            warn!("{}: history write failed: {}", self.info.name, err);
            err
        })
    }
}
