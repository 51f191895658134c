//! Tests for the JSON lines history store.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use traffic_signals::{
    HistoryStore, JsonLinesHistory, NetworkConfig, Phase, SignalNetwork, SignalSpec, StorageError,
    Timestamp, TimingConfig, TransitionCause, VirtualClock,
};

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "traffic-signals-{}-{}.jsonl",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn config(names: &[&str]) -> NetworkConfig {
    NetworkConfig {
        timing: TimingConfig::default(),
        signals: names
            .iter()
            .map(|name| SignalSpec::new(*name).with_count(12))
            .collect(),
    }
}

/// Opens the history at `path` and builds a network over it.
fn open(
    path: &PathBuf,
    names: &[&str],
    clock: &VirtualClock,
) -> (SignalNetwork, Arc<JsonLinesHistory>) {
    let history = Arc::new(JsonLinesHistory::open(path).unwrap());
    let network =
        SignalNetwork::new(&config(names), Arc::new(clock.clone()), history.clone()).unwrap();
    (network, history)
}

fn run(network: &SignalNetwork, clock: &VirtualClock, secs: u32) {
    for _ in 0..secs {
        clock.advance_secs(1);
        network.tick(1);
    }
}

/// Test that records written by one run are visible to the next.
#[test]
fn records_survive_reopen() {
    let path = temp_path("reopen");
    let clock = VirtualClock::new(Timestamp::from_secs(50));

    let written = {
        let (network, history) = open(&path, &["S1", "S2"], &clock);
        run(&network, &clock, 40);
        let s1 = network.find("S1").unwrap();
        network.set_emergency(s1, true).unwrap();
        history.records()
    };
    assert!(written.len() >= 6);

    let (network, reopened) = open(&path, &["S1", "S2"], &clock);
    assert_eq!(reopened.records(), written);

    let s1 = network.find("S1").unwrap();
    let queried = network.history(s1, Timestamp::MIN, Timestamp::MAX).unwrap();
    assert_eq!(queried.last().unwrap().phase, Phase::Green);
    assert_eq!(queried.last().unwrap().cause, TransitionCause::EmergencyActivated);
    assert_eq!(network.recent_history(s1, 1).unwrap(), queried[queried.len() - 1..]);

    std::fs::remove_file(&path).unwrap();
}

/// Test that records follow the signal's name when the config is reordered.
#[test]
fn records_follow_signal_names() {
    let path = temp_path("reorder");
    let clock = VirtualClock::new(Timestamp::from_secs(5));
    {
        let (network, _) = open(&path, &["North", "South"], &clock);
        let north = network.find("North").unwrap();
        network.set_emergency(north, true).unwrap();
    }

    let (network, history) = open(&path, &["South", "North"], &clock);
    let north = network.find("North").unwrap();
    let south = network.find("South").unwrap();
    let records = network.history(north, Timestamp::MIN, Timestamp::MAX).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cause, TransitionCause::EmergencyActivated);
    assert_eq!(records[0].signal_id, north);
    assert!(network.history(south, Timestamp::MIN, Timestamp::MAX).unwrap().is_empty());
    assert!(history.unclaimed().is_empty());

    // New records land after the old ones even though the clock has not moved.
    network.set_emergency(north, true).unwrap();
    let records = network.history(north, Timestamp::MIN, Timestamp::MAX).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].timestamp < records[1].timestamp);

    std::fs::remove_file(&path).unwrap();
}

/// Test that records of a signal dropped from the config are kept aside.
#[test]
fn removed_signal_is_unclaimed() {
    let path = temp_path("removed");
    let clock = VirtualClock::default();
    {
        let (network, _) = open(&path, &["North", "South"], &clock);
        run(&network, &clock, 10);
    }

    let (network, history) = open(&path, &["North"], &clock);
    assert_eq!(history.unclaimed(), ["South"]);
    assert_eq!(history.records().len(), 1);
    let north = network.find("North").unwrap();
    assert_eq!(network.history(north, Timestamp::MIN, Timestamp::MAX).unwrap().len(), 1);

    std::fs::remove_file(&path).unwrap();
}

/// Test that each record is on disk once the tick that made it returns.
#[test]
fn records_are_flushed_every_tick() {
    let path = temp_path("flush");
    let clock = VirtualClock::default();
    let (network, history) = open(&path, &["S1", "S2", "S3"], &clock);

    for _ in 0..200 {
        clock.advance_secs(1);
        let report = network.tick(1);
        assert!(report.is_recorded());
    }
    let s1 = network.find("S1").unwrap();
    network.set_emergency(s1, true).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), history.records().len());
    assert!(content.ends_with('\n'));

    drop(network);
    drop(history);
    std::fs::remove_file(&path).unwrap();
}

/// Test that each record occupies one line keyed by signal name and time.
#[test]
fn one_record_per_line() {
    let path = temp_path("lines");
    let clock = VirtualClock::default();
    {
        let (network, _) = open(&path, &["S1", "S2"], &clock);
        clock.advance_secs(10);
        network.tick(10);
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value["signal"] == "S1" || value["signal"] == "S2");
        assert!(value.get("signal_id").is_none());
        assert_eq!(value["timestamp"], 10_000);
        assert_eq!(value["phase"], "green");
        assert_eq!(value["vehicle_count"], 12);
        assert_eq!(value["duration_assigned"], 25);
    }

    std::fs::remove_file(&path).unwrap();
}

/// Test that a record cut short by a crash is dropped on the next open.
#[test]
fn torn_last_line_is_dropped() {
    let path = temp_path("torn");
    let clock = VirtualClock::default();
    {
        let (network, _) = open(&path, &["S1"], &clock);
        run(&network, &clock, 40);
    }
    let intact = std::fs::read_to_string(&path).unwrap();
    assert_eq!(intact.lines().count(), 3);

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    write!(file, r#"{{"signal":"S1","timesta"#).unwrap();
    drop(file);

    {
        let (network, history) = open(&path, &["S1"], &clock);
        assert_eq!(history.records().len(), 3);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), intact);
        run(&network, &clock, 10);
    }

    let (_, history) = open(&path, &["S1"], &clock);
    assert_eq!(history.records().len(), 4);

    std::fs::remove_file(&path).unwrap();
}

/// Test that a complete last record without a newline is kept.
#[test]
fn unterminated_last_record_is_kept() {
    let path = temp_path("unterminated");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{"signal":"S1","timestamp":5000,"phase":"green","vehicle_count":3,"density":"low","duration_assigned":15,"cause":"cycle"}}"#
    )
    .unwrap();
    drop(file);

    let clock = VirtualClock::new(Timestamp::from_secs(5));
    {
        let (network, history) = open(&path, &["S1"], &clock);
        assert_eq!(history.records().len(), 1);
        let s1 = network.find("S1").unwrap();
        network.set_emergency(s1, true).unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
    let (_, history) = open(&path, &["S1"], &clock);
    assert_eq!(history.records().len(), 2);

    std::fs::remove_file(&path).unwrap();
}

/// Test that a corrupt line before the end is reported rather than skipped.
#[test]
fn malformed_line_is_an_error() {
    let path = temp_path("malformed");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "not json").unwrap();
    writeln!(
        file,
        r#"{{"signal":"S1","timestamp":5000,"phase":"green","vehicle_count":3,"density":"low","duration_assigned":15,"cause":"cycle"}}"#
    )
    .unwrap();
    drop(file);

    let err = JsonLinesHistory::open(&path).err().unwrap();
    assert!(matches!(err, StorageError::Decode { line: 1, .. }));

    std::fs::remove_file(&path).unwrap();
}
