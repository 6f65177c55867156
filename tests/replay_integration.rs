//! Integration tests for trace replay
//!
//! Each test builds a throwaway dataset (catalog, recordings, TOML config) in a
//! temp directory and drives it through the public API or the `trace_replay`
//! binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use nettrace_replay::replay::clock::{parse_recording_timestamp, NANOS_PER_SEC};
use nettrace_replay::replay::{
    ConfigFile, Direction, InstanceStatus, Metric, NetworkTraceManager, TraceFilter,
};

/// Recording line from `(seconds after 15:36:00, value)` pairs, trailing comma included.
fn recording_line(points: &[(u32, f64)]) -> String {
    points
        .iter()
        .map(|(offset, value)| {
            format!(
                "2020-01-24 15:{:02}:{:02}.000000_{},",
                36 + offset / 60,
                offset % 60,
                value
            )
        })
        .collect()
}

struct Dataset {
    dir: TempDir,
}

impl Dataset {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let rtt = recording_line(&[(0, 20.0), (2, 22.5), (3, 21.0), (30, 35.0), (31, 30.0), (33, 25.0)]);
        let bw = recording_line(&[(1, 48.0), (4, 51.5), (10, 50.0), (29, 12.0), (32, 44.0)]);
        let udp_rtt = recording_line(&[(0, 5.0), (1, 6.0)]);
        fs::write(dir.path().join("tcp_rtt_edge.txt"), rtt).unwrap();
        fs::write(dir.path().join("tcp_bw_edge_down.txt"), bw).unwrap();
        fs::write(dir.path().join("udp_rtt_cloud.txt"), udp_rtt).unwrap();
        fs::write(dir.path().join("broken.txt"), "not a recording").unwrap();

        let mapping = serde_json::json!([
            {
                "typeofmeasure": "active", "command": "TCPRTT", "direction": "upstream",
                "ObserverPos": "edge", "noise": "0M", "access-technology": "wifi",
                "first-endpoint": "Client", "second-endpoint": "Observer",
                "path": "broken.txt"
            },
            {
                "typeofmeasure": "active", "command": "TCPRTT", "direction": null,
                "ObserverPos": "edge", "noise": "0M", "access-technology": "wifi",
                "first-endpoint": "Client", "second-endpoint": "Observer",
                "path": "tcp_rtt_edge.txt"
            },
            {
                "typeofmeasure": "active", "command": "TCPBandwidth", "direction": "upstream",
                "ObserverPos": "edge", "noise": "0M", "access-technology": "wifi",
                "senderIdentity": "Observer", "receiverIdentity": "Client",
                "path": "broken.txt"
            },
            {
                "typeofmeasure": "active", "command": "TCPBandwidth", "direction": "downstream",
                "ObserverPos": "edge", "noise": "0M", "access-technology": "wifi",
                "senderIdentity": "Observer", "receiverIdentity": "Client",
                "path": "tcp_bw_edge_down.txt"
            },
            {
                "typeofmeasure": "active", "command": "UDPRTT", "direction": null,
                "ObserverPos": "cloud", "noise": "10M", "access-technology": "lte",
                "first-endpoint": "Observer", "second-endpoint": "Server",
                "path": "udp_rtt_cloud.txt"
            },
            {
                "typeofmeasure": "active", "command": "UDPBandwidth", "direction": "upstream",
                "ObserverPos": "cloud", "noise": "10M", "access-technology": "lte",
                "senderIdentity": "Observer", "receiverIdentity": "Server",
                "path": "missing.txt"
            }
        ]);
        fs::write(dir.path().join("mapping.json"), mapping.to_string()).unwrap();

        let config = format!(
            r#"
[DEFAULT]
mapping_file = "{mapping}"
max_tracegap_seconds = 5
typeofmeasure = "active"
protocol = "TCP"
observerPos = "edge"
cross-traffic = "0M"
access-technology = "wifi"
sender-identity = "Observer"
receiver-identity = "Client"
trace = true

[conf1]
seed = 0

[conf2]
startingitemseed = 7

[fixed]
seed = 1
start_time = "2020-01-24 15:36:30.500000"

[noseed]
protocol = "TCP"

[noisy]
seed = 0
cross-traffic = "50M"

[cloud]
seed = 0
protocol = "UDP"
observerPos = "cloud"
cross-traffic = "10M"
access-technology = "lte"
receiver-identity = "Server"
"#,
            mapping = dir.path().join("mapping.json").display()
        );
        fs::write(dir.path().join("replay.toml"), config).unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn manager(&self, section: &str) -> Result<NetworkTraceManager, nettrace_replay::InvalidConfiguration> {
        let file = ConfigFile::load(self.path("replay.toml")).unwrap();
        NetworkTraceManager::from_section(&file.section(section).unwrap())
    }
}

fn trace_replay(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_trace_replay"))
        .args(args)
        .output()
        .expect("failed to run trace_replay")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_ready_instance_from_config_file() {
    let data = Dataset::new();
    let manager = data.manager("conf1").unwrap();

    assert_eq!(manager.status(), InstanceStatus::Ready);
    assert_eq!(manager.status().code(), 0);
    // Relative catalog paths resolve next to the catalog; directioned RTT entry skipped
    assert_eq!(manager.trace_file(Metric::Rtt), data.path("tcp_rtt_edge.txt"));
    // Upstream bandwidth entry contradicts the Observer -> Client leg
    assert_eq!(manager.trace_file(Metric::Bandwidth), data.path("tcp_bw_edge_down.txt"));
    assert_eq!(manager.config().max_tracegap_seconds, 5);
}

#[test]
fn test_missing_seed_is_wrong_configuration() {
    let data = Dataset::new();
    let err = data.manager("noseed").unwrap_err();
    assert_eq!(err.status(), InstanceStatus::WrongConfiguration);
    assert_eq!(err.status().code(), -1);
}

#[test]
fn test_unmatched_experiment_is_wrong_input_file_path() {
    let data = Dataset::new();
    let err = data.manager("noisy").unwrap_err();
    assert_eq!(err.status(), InstanceStatus::WrongInputFilePath);
    assert_eq!(err.status().code(), -2);

    // RTT resolves, but the bandwidth recording does not exist
    let err = data.manager("cloud").unwrap_err();
    assert_eq!(err.status(), InstanceStatus::WrongInputFilePath);
}

#[test]
fn test_alternate_seed_key() {
    let data = Dataset::new();
    let manager = data.manager("conf2").unwrap();
    assert_eq!(manager.config().seed, 7);
}

#[test]
fn test_seeded_start_is_reproducible() {
    let data = Dataset::new();
    let a = data.manager("conf1").unwrap();
    let b = data.manager("conf1").unwrap();

    assert_eq!(a.anchor(), b.anchor());
    assert_eq!(a.get_rtt_timeseries(), b.get_rtt_timeseries());
    assert_eq!(a.get_bandwidth_timeseries(), b.get_bandwidth_timeseries());
}

#[test]
fn test_metrics_start_at_same_real_time() {
    let data = Dataset::new();
    let manager = data.manager("fixed").unwrap();

    // Last RTT sample at or before 15:36:30.5 is the 15:36:30 one
    let anchor = parse_recording_timestamp("2020-01-24 15:36:30.000000").unwrap();
    assert_eq!(manager.anchor(), anchor);

    let rtt = manager.cursor(Metric::Rtt).sequence();
    assert_eq!(rtt.first().absolute_timestamp, anchor);
    assert_eq!(rtt.first().value, 35.0);

    // Bandwidth starts at 15:36:29, the last sample not after the anchor
    let bw = manager.cursor(Metric::Bandwidth).sequence();
    assert_eq!(bw.first().value, 12.0);
    assert!(bw.first().absolute_timestamp <= anchor);
    assert!(bw.samples()[1].absolute_timestamp > anchor);
}

#[test]
fn test_timeseries_shape() {
    let data = Dataset::new();
    let manager = data.manager("conf1").unwrap();

    for metric in Metric::ALL {
        let ts = manager.timeseries(metric);
        assert_eq!(ts.times[0], 0.0);
        assert_eq!(ts.times.len(), ts.values.len());
        assert_eq!(ts.len(), manager.cursor(metric).sequence().len());
        assert!(ts.deltas().iter().all(|d| *d >= 0.0 && *d <= 5.0), "{:?}", ts.deltas());
    }
}

#[test]
fn test_replay_loops_forever() {
    let data = Dataset::new();
    let mut manager = data.manager("conf1").unwrap();

    let rtt_values = [20.0, 22.5, 21.0, 35.0, 30.0, 25.0];
    let bw_values = [48.0, 51.5, 50.0, 12.0, 44.0];

    let mut last = manager.cursor(Metric::Rtt).playback_timestamp();
    let offset = manager.cursor(Metric::Bandwidth).playback_timestamp() - last;
    for _ in 0..200 {
        let (rtt, bw) = manager.get_networkvalues(0.5).unwrap();
        assert!(rtt.playback_timestamp > last);
        assert_eq!(bw.playback_timestamp - rtt.playback_timestamp, offset);
        last = rtt.playback_timestamp;
        assert!(rtt_values.contains(&rtt.value));
        assert!(bw_values.contains(&bw.value));
    }

    // 100 s of playback against loops of at most 33 s + 5 s
    assert!(manager.cursor(Metric::Rtt).wraps() >= 2);
    assert!(manager.cursor(Metric::Bandwidth).wraps() >= 2);
    assert!(manager.cursor(Metric::Rtt).sequence().is_monotonic());
}

#[test]
fn test_single_metric_advance() {
    let data = Dataset::new();
    let mut manager = data.manager("fixed").unwrap();
    let start = manager.cursor(Metric::Bandwidth).playback_timestamp();

    let out = manager.get_bandwidth(2.0).unwrap();
    assert_eq!(out.playback_timestamp, start + 2 * NANOS_PER_SEC);
    // Next sample is 15:36:32, still 1 s away
    assert_eq!(out.value, 12.0);
    // The wrapped head shares 15:36:32 with the tail's last sample and wins
    let out = manager.get_bandwidth(1.0).unwrap();
    assert_eq!(out.value, 48.0);
    assert_eq!(manager.cursor(Metric::Rtt).playback_timestamp(), manager.anchor());

    assert!(manager.get_rtt(-0.1).is_err());
}

#[test]
fn test_catalog_listing() {
    let data = Dataset::new();

    let rtt = NetworkTraceManager::get_tracelist(
        data.path("mapping.json"),
        &TraceFilter::default().command("TCPRTT"),
    )
    .unwrap();
    // The RTT entry labelled with a direction is hidden
    assert_eq!(rtt.len(), 1);
    assert_eq!(rtt[0].path, "tcp_rtt_edge.txt");

    let down = NetworkTraceManager::get_tracelist(
        data.path("mapping.json"),
        &TraceFilter::default().direction(Direction::Downstream),
    )
    .unwrap();
    assert_eq!(down.len(), 1);
    assert_eq!(down[0].command, "TCPBandwidth");

    let manager = data.manager("conf1").unwrap();
    let noise: Vec<String> = manager.get_all_values("noise").unwrap().into_iter().collect();
    assert_eq!(noise, vec!["0M", "10M"]);
    let positions: Vec<String> = manager.get_all_values("ObserverPos").unwrap().into_iter().collect();
    assert_eq!(positions, vec!["cloud", "edge"]);
}

#[test]
fn test_cli_values() {
    let data = Dataset::new();
    let mapping = path_arg(&data.path("mapping.json"));
    let out = trace_replay(&["values", "--mapping-file", &mapping, "--field", "access-technology"]);

    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "lte\nwifi\n");
}

#[test]
fn test_cli_rejects_invalid_configuration() {
    let data = Dataset::new();
    let config = path_arg(&data.path("replay.toml"));
    let out = trace_replay(&["replay", "--config", &config, "--section", "noseed"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("seed"));
}

#[test]
fn test_cli_saves_timeseries() {
    let data = Dataset::new();
    let config = path_arg(&data.path("replay.toml"));
    let save = data.path("rtt.dat");
    let out = trace_replay(&[
        "timeseries",
        "--config",
        &config,
        "--section",
        "fixed",
        "--metric",
        "rtt",
        "--save",
        &path_arg(&save),
    ]);
    assert!(out.status.success());

    let written = fs::read_to_string(&save).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "0 35");
}

#[test]
fn test_cli_interval_histogram_uses_100_bins() {
    let data = Dataset::new();
    let config = path_arg(&data.path("replay.toml"));
    let out = trace_replay(&[
        "timeseries",
        "--config",
        &config,
        "--section",
        "fixed",
        "--metric",
        "rtt",
        "--histo-time",
    ]);
    assert!(out.status.success());

    // Intervals 1, 2, 0, 2, 1 s over [0, 2]: bins of 0.02 s, so the top bin starts at 1.98
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{}", stdout);
    assert_eq!(lines[0], "0 1");
    assert!(lines[2].starts_with("1.98"), "{}", lines[2]);
    assert!(lines[2].ends_with(" 2"));
}
