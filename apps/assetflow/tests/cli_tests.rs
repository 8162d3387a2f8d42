//! # CLI Integration Tests
//!
//! Drive the command layer against project files in a temporary directory.

#![allow(clippy::unwrap_used, clippy::panic)]

use assetflow::cli::{asset_report, graph_report, load_project, parse_now, render_json, run_tick};
use assetflow::status::StatusFile;
use assetflow_core::{AssetFlowError, AssetKey, EvaluationStateStore, RedbStateStore};
use std::path::Path;
use tempfile::TempDir;

const PROJECT: &str = r#"
    [settings]
    state_path = "state/assetflow.redb"
    keep_snapshots = 2

    [[source]]
    key = "raw/orders"

    [[asset]]
    key = "orders"
    deps = ["raw/orders"]
    preset = "missing"
    owners = ["data@example.com"]

    [[asset]]
    key = "report"
    deps = ["orders"]
    preset = "missing"

    [[check]]
    name = "not_empty"
    asset = "orders"
"#;

fn write_project(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("assetflow.toml");
    std::fs::write(&path, PROJECT).unwrap();
    path
}

fn materialized_status() -> StatusFile {
    StatusFile::from_json(
        br#"{
            "materializations": [
                { "asset": "orders", "at": "2024-01-02T00:00:00Z" },
                { "asset": "report", "at": "2024-01-02T00:05:00Z" }
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn load_project_resolves_state_path() {
    let dir = TempDir::new().unwrap();
    let config = write_project(&dir);

    let project = load_project(&config, None).unwrap();
    assert_eq!(project.graph.len(), 3);
    assert_eq!(
        project.state_path,
        dir.path().join("state").join("assetflow.redb")
    );

    let override_path = dir.path().join("other.redb");
    let project = load_project(&config, Some(&override_path)).unwrap();
    assert_eq!(project.state_path, override_path);
}

#[test]
fn missing_project_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let result = load_project(&dir.path().join("absent.toml"), None);
    assert!(matches!(result, Err(AssetFlowError::ConfigError(_))));
}

#[test]
fn graph_reports_levels_and_assets() {
    let dir = TempDir::new().unwrap();
    let project = load_project(&write_project(&dir), None).unwrap();

    let report = graph_report(&project.graph);
    assert_eq!(report["asset_count"], 3);
    assert_eq!(report["check_count"], 1);
    assert_eq!(report["levels"][0][0]["key"], "raw/orders");
    assert_eq!(report["levels"][0][0]["kind"], "external");
    assert_eq!(report["levels"][2][0]["key"], "report");

    let orders = asset_report(&project.graph, &AssetKey::from("orders")).unwrap();
    assert_eq!(orders["owners"][0], "data@example.com");
    assert_eq!(orders["children"][0], "report");
    assert_eq!(orders["checks"].as_array().unwrap().len(), 1);

    assert!(matches!(
        asset_report(&project.graph, &AssetKey::from("nope")),
        Err(AssetFlowError::AssetNotFound(_))
    ));
}

#[test]
fn ticks_commit_and_continue() {
    let dir = TempDir::new().unwrap();
    let project = load_project(&write_project(&dir), None).unwrap();
    let now = parse_now("2024-01-02T01:00:00Z").unwrap();

    let first = run_tick(&project, &StatusFile::default(), now, false).unwrap();
    assert_eq!(first["tick"], 0);
    assert_eq!(first["requested"]["orders"], "all");
    assert_eq!(first["requested"]["report"], "all");
    assert_eq!(first["runs"].as_array().unwrap().len(), 1);
    assert_eq!(first["runs"][0]["checks"].as_array().unwrap().len(), 1);

    let second = run_tick(&project, &materialized_status(), now, false).unwrap();
    assert_eq!(second["tick"], 1);
    assert!(second["requested"].as_object().unwrap().is_empty());
    assert!(second["runs"].as_array().unwrap().is_empty());

    let store = RedbStateStore::open(&project.state_path).unwrap();
    assert_eq!(store.latest_tick().unwrap(), Some(1));
}

#[test]
fn dry_run_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let project = load_project(&write_project(&dir), None).unwrap();
    let now = parse_now("2024-01-02T01:00:00Z").unwrap();

    let report = run_tick(&project, &StatusFile::default(), now, true).unwrap();
    assert_eq!(report["tick"], 0);
    assert_eq!(report["dry_run"], true);
    assert!(!Path::new(&project.state_path).exists());

    run_tick(&project, &StatusFile::default(), now, false).unwrap();
    let report = run_tick(&project, &StatusFile::default(), now, true).unwrap();
    assert_eq!(report["tick"], 1);

    let store = RedbStateStore::open(&project.state_path).unwrap();
    assert_eq!(store.latest_tick().unwrap(), Some(0));
}

#[test]
fn retention_prunes_old_snapshots() {
    let dir = TempDir::new().unwrap();
    let project = load_project(&write_project(&dir), None).unwrap();
    let now = parse_now("2024-01-02T01:00:00Z").unwrap();

    for _ in 0..4 {
        run_tick(&project, &StatusFile::default(), now, false).unwrap();
    }

    let store = RedbStateStore::open(&project.state_path).unwrap();
    assert_eq!(store.latest_tick().unwrap(), Some(3));
    assert_eq!(store.ticks(&AssetKey::from("orders")).unwrap(), vec![2, 3]);
}

#[test]
fn invalid_now_is_rejected() {
    assert!(matches!(
        parse_now("yesterday"),
        Err(AssetFlowError::ConfigError(_))
    ));
}

#[test]
fn json_output_renders_reports() {
    let dir = TempDir::new().unwrap();
    let project = load_project(&write_project(&dir), None).unwrap();
    let report = graph_report(&project.graph);

    let rendered = render_json(&report).unwrap();
    assert!(rendered.contains('\n'));
    let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(parsed, report);
}
