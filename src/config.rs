//! Network and timing configuration.

use crate::error::ConfigError;
use crate::util::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Configuration for a whole signal network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// The timing policy shared by every signal.
    #[serde(default)]
    pub timing: TimingConfig,
    /// The intersections to create at startup.
    pub signals: Vec<SignalSpec>,
}

/// The adaptive timing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Vehicle count thresholds separating the density buckets.
    pub thresholds: DensityThresholds,
    /// The green duration for each density bucket, in s.
    pub green: GreenDurations,
    /// The fixed amber duration, in s.
    pub yellow_secs: u32,
    /// The green duration held while emergency preemption is active, in s.
    pub emergency_green_secs: u32,
    /// Lower and upper limits on every assigned duration.
    pub bounds: PhaseBounds,
}

/// A count below `low` is LOW, below `medium` is MEDIUM, below `high` is HIGH,
/// and anything else is CONGESTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityThresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

/// Green durations per density bucket, in s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenDurations {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub congested: u32,
}

/// Duration bounds for each phase, in s.
///
/// The red phase always runs for its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBounds {
    pub green: Interval<u32>,
    pub yellow: Interval<u32>,
    pub red: Interval<u32>,
}

/// A single intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    /// A unique display name.
    pub name: String,
    /// A human readable description of where the signal is.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// The vehicle count the signal starts with.
    #[serde(default)]
    pub initial_count: u32,
}

impl Default for DensityThresholds {
    fn default() -> Self {
        Self {
            low: 10,
            medium: 30,
            high: 60,
        }
    }
}

impl Default for GreenDurations {
    fn default() -> Self {
        Self {
            low: 15,
            medium: 25,
            high: 35,
            congested: 45,
        }
    }
}

impl Default for PhaseBounds {
    fn default() -> Self {
        Self {
            green: Interval::new(10, 90),
            yellow: Interval::new(3, 6),
            red: Interval::new(10, 120),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            thresholds: DensityThresholds::default(),
            green: GreenDurations::default(),
            yellow_secs: 5,
            emergency_green_secs: 90,
            bounds: PhaseBounds::default(),
        }
    }
}

impl TimingConfig {
    /// Checks the policy for values that would break the timers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = [
            ("green", self.bounds.green),
            ("yellow", self.bounds.yellow),
            ("red", self.bounds.red),
        ];
        for (phase, bound) in bounds {
            if bound.min == 0 || !bound.is_ordered() {
                return Err(ConfigError::InvalidBounds {
                    phase,
                    min: bound.min,
                    max: bound.max,
                });
            }
        }

        let t = self.thresholds;
        if !(t.low < t.medium && t.medium < t.high) {
            return Err(ConfigError::UnorderedThresholds);
        }

        let g = self.green;
        if !(g.low <= g.medium && g.medium <= g.high && g.high <= g.congested) {
            return Err(ConfigError::UnorderedGreenDurations);
        }

        if !self.bounds.green.contains(self.emergency_green_secs) {
            return Err(ConfigError::EmergencyOutOfBounds(self.emergency_green_secs));
        }

        Ok(())
    }
}

impl SignalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            initial_count: 0,
        }
    }

    /// Sets the count the signal starts with.
    pub fn with_count(mut self, count: u32) -> Self {
        self.initial_count = count;
        self
    }

    fn seeded(name: &str, location: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            latitude,
            longitude,
            initial_count: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            signals: vec![
                SignalSpec::seeded("Signal-A", "Gandhipuram Bus Stand", 11.0168, 76.9558),
                SignalSpec::seeded("Signal-B", "RS Puram Junction", 11.0045, 76.9550),
                SignalSpec::seeded("Signal-C", "Ukkadam Bus Stop", 10.9925, 76.9610),
                SignalSpec::seeded("Signal-D", "Singanallur Signal", 11.0065, 77.0020),
                SignalSpec::seeded("Signal-E", "Peelamedu Junction", 11.0270, 77.0170),
                SignalSpec::seeded("Signal-F", "Saibaba Colony", 11.0240, 76.9660),
            ],
        }
    }
}

impl NetworkConfig {
    /// Reads a JSON config file. The result is not yet validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses a JSON config. The result is not yet validated.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the timing policy and the signal list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        if self.signals.is_empty() {
            return Err(ConfigError::NoSignals);
        }
        let mut names = HashSet::new();
        for signal in &self.signals {
            if !names.insert(signal.name.as_str()) {
                return Err(ConfigError::DuplicateSignal(signal.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        NetworkConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_bound_is_rejected() {
        let mut timing = TimingConfig::default();
        timing.bounds.yellow = Interval::new(0, 5);
        assert!(matches!(
            timing.validate(),
            Err(ConfigError::InvalidBounds { phase: "yellow", .. })
        ));
    }

    #[test]
    fn inverted_bound_is_rejected() {
        let mut timing = TimingConfig::default();
        timing.bounds.red = Interval::new(30, 20);
        assert!(matches!(
            timing.validate(),
            Err(ConfigError::InvalidBounds { phase: "red", .. })
        ));
    }

    #[test]
    fn thresholds_must_increase() {
        let mut timing = TimingConfig::default();
        timing.thresholds.medium = timing.thresholds.low;
        assert!(matches!(timing.validate(), Err(ConfigError::UnorderedThresholds)));
    }

    #[test]
    fn emergency_must_fit_green_bounds() {
        let mut timing = TimingConfig::default();
        timing.emergency_green_secs = 999;
        assert!(matches!(
            timing.validate(),
            Err(ConfigError::EmergencyOutOfBounds(999))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = NetworkConfig {
            timing: TimingConfig::default(),
            signals: vec![SignalSpec::new("S1"), SignalSpec::new("S1")],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSignal(name)) if name == "S1"
        ));
    }

    #[test]
    fn bundled_config_matches_default_timing() {
        let config = NetworkConfig::from_json(include_str!("../config/network.json")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.signals.len(), 6);
        assert_eq!(config.signals[4].initial_count, 70);
    }

    #[test]
    fn parses_partial_json() {
        let config = NetworkConfig::from_json(
            r#"{
                "timing": { "yellow_secs": 4 },
                "signals": [ { "name": "North", "initial_count": 12 } ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.timing.yellow_secs, 4);
        assert_eq!(config.timing.green, GreenDurations::default());
        assert_eq!(config.signals[0].initial_count, 12);
        config.validate().unwrap();
    }
}
