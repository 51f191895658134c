//! Vehicle density classification and adaptive phase durations.

use crate::config::TimingConfig;
use crate::error::{ConfigError, SignalError};
use crate::Phase;
use serde::{Deserialize, Serialize};

/// A discretised vehicle density, ordered from lightest to heaviest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityBucket {
    Low,
    Medium,
    High,
    Congested,
}

impl DensityBucket {
    pub const ALL: [DensityBucket; 4] = [
        DensityBucket::Low,
        DensityBucket::Medium,
        DensityBucket::High,
        DensityBucket::Congested,
    ];
}

/// Maps vehicle counts to phase durations according to a [TimingConfig].
#[derive(Debug, Clone)]
pub struct DensityEstimator {
    timing: TimingConfig,
}

impl DensityEstimator {
    /// Creates an estimator, rejecting timing that would break the timers.
    pub fn new(timing: TimingConfig) -> Result<Self, ConfigError> {
        timing.validate()?;
        Ok(Self { timing })
    }

    /// Gets the timing policy.
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Classifies a vehicle count.
    pub fn classify(&self, count: u32) -> DensityBucket {
        let t = &self.timing.thresholds;
        if count < t.low {
            DensityBucket::Low
        } else if count < t.medium {
            DensityBucket::Medium
        } else if count < t.high {
            DensityBucket::High
        } else {
            DensityBucket::Congested
        }
    }

    /// The duration to assign a phase entered at the given density, in s.
    ///
    /// Only green adapts to density. Yellow is fixed and red always
    /// runs for its minimum.
    pub fn duration_for(&self, bucket: DensityBucket, phase: Phase) -> u32 {
        let bounds = &self.timing.bounds;
        match phase {
            Phase::Green => {
                let green = &self.timing.green;
                let secs = match bucket {
                    DensityBucket::Low => green.low,
                    DensityBucket::Medium => green.medium,
                    DensityBucket::High => green.high,
                    DensityBucket::Congested => green.congested,
                };
                bounds.green.clamp(secs)
            }
            Phase::Yellow => bounds.yellow.clamp(self.timing.yellow_secs),
            Phase::Red => bounds.red.min,
        }
    }

    /// The green duration held during emergency preemption, in s.
    pub fn emergency_green(&self) -> u32 {
        self.timing.bounds.green.clamp(self.timing.emergency_green_secs)
    }

    /// The green duration appropriate for a vehicle count, in s.
    pub fn ideal_green(&self, count: u32) -> u32 {
        self.duration_for(self.classify(count), Phase::Green)
    }

    /// The longest green, yellow and red the bounds allow, end to end, in s.
    pub fn longest_cycle(&self) -> u32 {
        let bounds = &self.timing.bounds;
        bounds
            .green
            .max
            .saturating_add(bounds.yellow.max)
            .saturating_add(bounds.red.max)
    }

    /// Scores how well a green duration suits the traffic, from 0 to 100.
    ///
    /// Starts from the ratio between the assigned and ideal green time,
    /// rewards heavy traffic holding green or light traffic holding red,
    /// and penalises a short green for a long queue.
    ///
    /// "Heavy" is the high bucket or above and "light" is the low bucket. A
    /// congested queue is penalised if it got less than the congested green,
    /// and a high one if it got less than the medium green.
    pub fn efficiency(&self, count: u32, green_secs: u32, phase: Phase) -> u8 {
        let bucket = self.classify(count);
        let ideal = self.duration_for(bucket, Phase::Green);
        let timing_score = if ideal == 0 || green_secs == 0 {
            100
        } else {
            let ratio = u32::min(green_secs, ideal) as f64 / u32::max(green_secs, ideal) as f64;
            (ratio * 100.0) as i32
        };

        let bonus = match phase {
            Phase::Green if bucket >= DensityBucket::High => 10,
            Phase::Red if bucket == DensityBucket::Low => 5,
            _ => 0,
        };

        let green = |bucket| self.duration_for(bucket, Phase::Green);
        let penalty = if bucket == DensityBucket::Congested && green_secs < ideal {
            20
        } else if bucket >= DensityBucket::High && green_secs < green(DensityBucket::Medium) {
            15
        } else {
            0
        };

        (timing_score + bonus - penalty).clamp(0, 100) as u8
    }
}

/// Validates a vehicle count supplied as a signed integer.
pub fn check_count(count: i64) -> Result<u32, SignalError> {
    u32::try_from(count).map_err(|_| SignalError::InvalidCount(count.to_string()))
}

/// Parses a vehicle count supplied as text.
pub fn parse_count(text: &str) -> Result<u32, SignalError> {
    let count = text
        .trim()
        .parse::<i64>()
        .map_err(|_| SignalError::InvalidCount(text.to_string()))?;
    check_count(count)
}
