//! Summary statistics over the phase history.

use crate::clock::Timestamp;
use crate::density::DensityBucket;
use crate::history::HistoryRecord;
use crate::SignalId;
use itertools::{Itertools, MinMaxResult};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Network-wide statistics derived from the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkAnalytics {
    /// The number of history records.
    pub total_records: usize,
    /// The record with the highest vehicle count, earliest first on ties.
    pub peak: Option<PeakSample>,
    /// The mean vehicle count over all records.
    pub average_count: f64,
    /// Per-signal statistics, busiest first.
    pub rankings: Vec<SignalStats>,
    /// The number of records in each density bucket.
    pub density_distribution: BTreeMap<DensityBucket, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakSample {
    pub signal_id: SignalId,
    pub name: String,
    pub vehicle_count: u32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalStats {
    pub signal_id: SignalId,
    pub name: String,
    pub records: usize,
    pub average_count: f64,
    pub peak_count: u32,
    pub min_count: u32,
}

impl NetworkAnalytics {
    /// Computes statistics for the given signals from their records.
    ///
    /// Signals without records are still ranked, with zeroed statistics.
    pub fn compute<'a>(
        signals: impl IntoIterator<Item = (SignalId, &'a str)>,
        records: &[HistoryRecord],
    ) -> Self {
        let names: HashMap<SignalId, &str> = signals.into_iter().collect();
        let by_signal = records.iter().into_group_map_by(|r| r.signal_id);

        let mut rankings: Vec<_> = names
            .iter()
            .map(|(id, name)| {
                let samples = by_signal.get(id).map(Vec::as_slice).unwrap_or(&[]);
                let counts = samples.iter().map(|r| r.vehicle_count);
                let (min_count, peak_count) = match counts.clone().minmax() {
                    MinMaxResult::NoElements => (0, 0),
                    MinMaxResult::OneElement(count) => (count, count),
                    MinMaxResult::MinMax(min, max) => (min, max),
                };
                SignalStats {
                    signal_id: *id,
                    name: name.to_string(),
                    records: samples.len(),
                    average_count: mean(counts),
                    peak_count,
                    min_count,
                }
            })
            .collect();
        rankings.sort_by(|a, b| {
            b.average_count
                .total_cmp(&a.average_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        let peak = records
            .iter()
            .min_by_key(|r| (Reverse(r.vehicle_count), r.timestamp))
            .map(|r| PeakSample {
                signal_id: r.signal_id,
                name: names.get(&r.signal_id).copied().unwrap_or_default().to_string(),
                vehicle_count: r.vehicle_count,
                timestamp: r.timestamp,
            });

        Self {
            total_records: records.len(),
            peak,
            average_count: mean(records.iter().map(|r| r.vehicle_count)),
            rankings,
            density_distribution: records.iter().map(|r| r.density).counts().into_iter().collect(),
        }
    }
}

fn mean(counts: impl Iterator<Item = u32>) -> f64 {
    let (total, n) = counts.fold((0u64, 0usize), |(total, n), c| (total + c as u64, n + 1));
    if n == 0 {
        0.0
    } else {
        total as f64 / n as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::history::TransitionCause;
    use crate::Phase;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    fn record(signal_id: SignalId, ms: u64, count: u32, density: DensityBucket) -> HistoryRecord {
        HistoryRecord {
            signal_id,
            timestamp: Timestamp::from_millis(ms),
            phase: Phase::Green,
            vehicle_count: count,
            density,
            duration_assigned: 15,
            cause: TransitionCause::Cycle,
        }
    }

    #[test]
    fn summarises_history() {
        let mut ids = SlotMap::<SignalId, ()>::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));
        let records = [
            record(a, 1, 5, DensityBucket::Low),
            record(b, 2, 70, DensityBucket::Congested),
            record(a, 3, 15, DensityBucket::Medium),
            record(b, 4, 70, DensityBucket::Congested),
            record(b, 5, 40, DensityBucket::High),
        ];
        let stats = NetworkAnalytics::compute([(a, "A"), (b, "B"), (c, "C")], &records);

        assert_eq!(stats.total_records, 5);
        assert_approx_eq!(stats.average_count, 40.0, 1e-9);

        let peak = stats.peak.unwrap();
        assert_eq!(peak.name, "B");
        assert_eq!(peak.vehicle_count, 70);
        assert_eq!(peak.timestamp, Timestamp::from_millis(2));

        let names: Vec<_> = stats.rankings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["B", "A", "C"]);
        assert_approx_eq!(stats.rankings[0].average_count, 60.0, 1e-9);
        assert_eq!(stats.rankings[0].min_count, 40);
        assert_eq!(stats.rankings[1].peak_count, 15);
        assert_eq!(stats.rankings[2].records, 0);

        assert_eq!(stats.density_distribution[&DensityBucket::Congested], 2);
        assert_eq!(stats.density_distribution.get(&DensityBucket::Low), Some(&1));
    }

    #[test]
    fn empty_history() {
        let stats = NetworkAnalytics::compute(std::iter::empty::<(SignalId, &str)>(), &[]);
        assert_eq!(stats.total_records, 0);
        assert!(stats.peak.is_none());
        assert_eq!(stats.average_count, 0.0);
        assert!(stats.density_distribution.is_empty());
    }
}
