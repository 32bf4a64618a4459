use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn write_config(dir: &Path, place: &str, total_days: usize) {
    let config_contents = String::new()
        + "[network]\n"
        + &format!("place = \"{place}\"\n")
        + "\n"
        + "[model]\n"
        + "infection_prob = 0.3\n"
        + "distance_threshold = 0.002\n"
        + "latent_period = 12\n"
        + "recovery_period = 48\n"
        + "death_rate = 0.05\n"
        + "\n"
        + "[init]\n"
        + "num_agents = 300\n"
        + "seed = 42\n"
        + "\n"
        + "[output]\n"
        + "steps_per_save = 6\n"
        + "saves_per_file = 8\n"
        + &format!("total_days = {total_days}\n");

    fs::write(dir.join("config.toml"), config_contents).expect("failed to write config file");
}

fn fresh_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    test_dir
}

fn run_bin(args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_epiroute"));

    Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn run_bin_ok(args: &[&str]) -> String {
    let output = run_bin(args);

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );

    stdout_str.to_string()
}

#[test]
fn basic_workflow() {
    let test_dir = fresh_dir("basic_workflow");
    write_config(&test_dir, "grid:8x8", 2);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin_ok(&["--sim-dir", test_dir_str, "create"]);
    run_bin_ok(&["--sim-dir", test_dir_str, "create"]);

    // 2 days = 48 ticks = one full file, so resuming is a no-op.
    run_bin_ok(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);
    run_bin_ok(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);
    run_bin_ok(&["--sim-dir", test_dir_str, "resume", "--run-idx", "1"]);

    let run_0 = test_dir.join("run-0000");
    assert!(run_0.join("checkpoint.msgpack").is_file());
    assert!(run_0.join("trajectory-0000.msgpack").is_file());
    assert!(!run_0.join("trajectory-0001.msgpack").exists());

    run_bin_ok(&["--sim-dir", test_dir_str, "analyze"]);

    let results = fs::read_to_string(run_0.join("results.json")).expect("failed to read results");
    let results: serde_json::Value =
        serde_json::from_str(&results).expect("failed to parse results");
    assert_eq!(results[3]["run"]["step"], 48);
    assert_eq!(results[3]["run"]["n_snapshots"], 8);
    assert_eq!(results[3]["run"]["population"], 300);

    let events = run_bin_ok(&["--sim-dir", test_dir_str, "events", "--run-idx", "0"]);
    let events: serde_json::Value = serde_json::from_str(&events).expect("failed to parse events");
    let events = events.as_array().expect("events must be an array");
    assert_eq!(events.len() as u64, results[3]["run"]["n_infection_events"]);
    assert!(
        events
            .iter()
            .all(|e| e["tick"].as_u64().is_some_and(|t| (1..=48).contains(&t)))
    );

    run_bin_ok(&["--sim-dir", test_dir_str, "clean"]);
    assert!(!run_0.exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn network_from_json_file() {
    let test_dir = fresh_dir("network_from_json_file");
    write_config(&test_dir, "village", 1);

    let network = r#"{
        "nodes": [
            {"x": 0.000, "y": 0.000}, {"x": 0.001, "y": 0.000}, {"x": 0.002, "y": 0.000},
            {"x": 0.000, "y": 0.001}, {"x": 0.001, "y": 0.001}, {"x": 0.002, "y": 0.001}
        ],
        "edges": [
            {"source": 0, "target": 1, "weight": 80.0},
            {"source": 1, "target": 2, "weight": 80.0},
            {"source": 3, "target": 4},
            {"source": 4, "target": 5},
            {"source": 0, "target": 3},
            {"source": 2, "target": 5, "weight": 110.0}
        ],
        "pois": {"schools": [5], "offices": [2], "shops": [4], "parks": [3]}
    }"#;
    fs::write(test_dir.join("village.json"), network).expect("failed to write network file");

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin_ok(&["--sim-dir", test_dir_str, "create"]);
    run_bin_ok(&["--sim-dir", test_dir_str, "analyze"]);
    assert!(test_dir.join("run-0000").join("results.json").is_file());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_inputs_fail() {
    let test_dir = fresh_dir("invalid_inputs_fail");

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    // Missing config.
    assert!(!run_bin(&["--sim-dir", test_dir_str, "create"]).status.success());

    // Missing network file.
    write_config(&test_dir, "nowhere", 1);
    assert!(!run_bin(&["--sim-dir", test_dir_str, "create"]).status.success());

    // Missing run.
    write_config(&test_dir, "grid:3x3", 1);
    assert!(
        !run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"])
            .status
            .success()
    );

    fs::remove_dir_all(&test_dir).ok();
}
