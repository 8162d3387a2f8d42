//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Each command builds a JSON report first; text output is rendered from
//! the same data so both modes stay in sync.

use crate::config::ProjectConfig;
use crate::status::StatusFile;
use assetflow_core::{
    AssetFlowError, AssetGraph, AssetKey, AssetNode, AssetSubset, Cadence, EvaluationStateStore,
    PartitionsDefinition, RedbStateStore, TickEvaluator, build_run_requests,
    materializable_in_same_run,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, AssetFlowError>;

// =============================================================================
// PROJECT LOADING
// =============================================================================

/// A loaded project: its configuration, graph and state location.
#[derive(Debug)]
pub struct Project {
    pub config: ProjectConfig,
    pub graph: AssetGraph,
    pub state_path: PathBuf,
}

/// Load the project file and build its graph.
///
/// `state_override` replaces the state path from the project settings.
pub fn load_project(config_path: &Path, state_override: Option<&Path>) -> Result<Project> {
    let config = ProjectConfig::from_file(config_path)?;
    let graph = AssetGraph::from_assets(config.definitions()?)?;

    let project_dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let state_path = match state_override {
        Some(path) => path.to_path_buf(),
        None => config.state_path(&project_dir),
    };

    tracing::info!(
        assets = graph.len(),
        checks = graph.asset_check_keys().len(),
        state = %state_path.display(),
        "graph built"
    );
    Ok(Project {
        config,
        graph,
        state_path,
    })
}

fn open_store(path: &Path) -> Result<RedbStateStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| AssetFlowError::IoError(format!("Create state directory: {e}")))?;
    }
    RedbStateStore::open(path)
}

/// Pretty-printed JSON for `--json-mode` output.
pub fn render_json(output: &Value) -> Result<String> {
    serde_json::to_string_pretty(output)
        .map_err(|e| AssetFlowError::SerializationError(format!("Render JSON output: {e}")))
}

fn print_json(output: &Value) -> Result<()> {
    println!("{}", render_json(output)?);
    Ok(())
}

// =============================================================================
// RENDERING HELPERS
// =============================================================================

/// `"all"`, `"none"` or the explicit partition keys.
pub fn subset_json(subset: &AssetSubset) -> Value {
    match subset {
        AssetSubset::Empty => json!("none"),
        AssetSubset::All => json!("all"),
        AssetSubset::Partitions(keys) => json!(keys),
    }
}

fn subset_text(subset: &AssetSubset) -> String {
    match subset {
        AssetSubset::Empty => "none".to_string(),
        AssetSubset::All => "all".to_string(),
        AssetSubset::Partitions(keys) => keys.iter().cloned().collect::<Vec<_>>().join(", "),
    }
}

fn node_kind(node: &AssetNode) -> &'static str {
    if node.is_auto_created_stub() {
        "stub"
    } else if node.is_materializable() {
        "materializable"
    } else if node.is_observable() {
        "observable"
    } else {
        "external"
    }
}

fn partitions_text(def: &PartitionsDefinition) -> String {
    match def {
        PartitionsDefinition::Static { keys } => format!("static ({} keys)", keys.len()),
        PartitionsDefinition::TimeWindow { cadence, start } => {
            let cadence = match cadence {
                Cadence::Hourly => "hourly",
                Cadence::Daily => "daily",
            };
            format!("{cadence} from {start}")
        }
    }
}

fn keys_json<'a>(keys: impl Iterator<Item = &'a AssetKey>) -> Value {
    json!(keys.map(AssetKey::to_user_string).collect::<Vec<_>>())
}

fn keys_text<'a>(keys: impl Iterator<Item = &'a AssetKey>) -> String {
    let keys: Vec<String> = keys.map(AssetKey::to_user_string).collect();
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}

// =============================================================================
// GRAPH COMMAND
// =============================================================================

/// Report of the whole graph, level by level.
pub fn graph_report(graph: &AssetGraph) -> Value {
    let levels: Vec<Value> = graph
        .topological_levels()
        .iter()
        .map(|level| {
            json!(
                level
                    .iter()
                    .filter_map(|key| graph.get(key))
                    .map(|node| json!({
                        "key": node.key().to_user_string(),
                        "kind": node_kind(node),
                        "group": node.group_name(),
                        "parents": keys_json(node.parent_keys().iter()),
                        "partitioned": node.is_partitioned(),
                        "condition": node.automation_condition().map(ToString::to_string),
                    }))
                    .collect::<Vec<_>>()
            )
        })
        .collect();

    json!({
        "asset_count": graph.len(),
        "check_count": graph.asset_check_keys().len(),
        "levels": levels,
    })
}

/// Report of one asset.
pub fn asset_report(graph: &AssetGraph, key: &AssetKey) -> Result<Value> {
    let node = graph.node(key)?;
    Ok(json!({
        "key": node.key().to_user_string(),
        "kind": node_kind(node),
        "group": node.group_name(),
        "description": node.description(),
        "code_version": node.code_version(),
        "owners": node.owners(),
        "tags": node.tags(),
        "metadata": node.metadata(),
        "location": node.location(),
        "partitions": node.partitions_def().map(partitions_text),
        "parents": keys_json(node.parent_keys().iter()),
        "children": keys_json(node.child_keys().iter()),
        "checks": node.check_keys().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "condition": node.automation_condition().map(ToString::to_string),
    }))
}

/// List the graph, or describe one asset.
pub fn cmd_graph(project: &Project, json_mode: bool, asset: Option<&str>) -> Result<()> {
    let graph = &project.graph;

    if let Some(asset) = asset {
        let key = AssetKey::from_user_string(asset);
        let report = asset_report(graph, &key)?;
        if json_mode {
            print_json(&report)?;
            return Ok(());
        }

        let node = graph.node(&key)?;
        println!("Asset {key}");
        println!("==========");
        println!("Kind:         {}", node_kind(node));
        println!("Group:        {}", node.group_name());
        if let Some(description) = node.description() {
            println!("Description:  {description}");
        }
        if let Some(version) = node.code_version() {
            println!("Code version: {version}");
        }
        if !node.owners().is_empty() {
            println!("Owners:       {}", node.owners().join(", "));
        }
        if let Some(location) = node.location() {
            println!("Location:     {location}");
        }
        if let Some(def) = node.partitions_def() {
            println!("Partitions:   {}", partitions_text(def));
        }
        println!("Parents:      {}", keys_text(node.parent_keys().iter()));
        println!("Children:     {}", keys_text(node.child_keys().iter()));
        for check in node.check_keys() {
            println!("Check:        {check}");
        }
        if let Some(condition) = node.automation_condition() {
            println!("Condition:    {condition}");
        }
        return Ok(());
    }

    if json_mode {
        print_json(&graph_report(graph))?;
        return Ok(());
    }

    println!("assetflow Graph");
    println!("===============");
    println!("Assets: {}", graph.len());
    println!("Checks: {}", graph.asset_check_keys().len());
    for (index, level) in graph.topological_levels().iter().enumerate() {
        println!();
        println!("Level {index}:");
        for node in level.iter().filter_map(|key| graph.get(key)) {
            let condition = node
                .automation_condition()
                .map(|c| format!("  [{}]", c.name()))
                .unwrap_or_default();
            println!("  {} ({}){condition}", node.key(), node_kind(node));
        }
    }
    Ok(())
}

// =============================================================================
// EXECUTION SET COMMAND
// =============================================================================

/// Show the assets and checks that must execute together with `asset`.
pub fn cmd_execution_set(project: &Project, json_mode: bool, asset: &str) -> Result<()> {
    let key = AssetKey::from_user_string(asset);
    let entities = project.graph.execution_set(&key.clone().into())?;

    if json_mode {
        print_json(&json!({
            "asset": key.to_user_string(),
            "execution_set": entities.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }))?;
        return Ok(());
    }

    println!("Execution set of {key}");
    for entity in &entities {
        println!("  {entity}");
    }
    Ok(())
}

// =============================================================================
// SAME-RUN COMMAND
// =============================================================================

/// Check whether `child` and `parent` can be materialized in the same run.
pub fn cmd_same_run(project: &Project, json_mode: bool, child: &str, parent: &str) -> Result<()> {
    let child = AssetKey::from_user_string(child);
    let parent = AssetKey::from_user_string(parent);
    project.graph.node(&child)?;
    project.graph.node(&parent)?;
    let same_run = materializable_in_same_run(&project.graph, &child, &parent);

    if json_mode {
        print_json(&json!({
            "child": child.to_user_string(),
            "parent": parent.to_user_string(),
            "same_run": same_run,
        }))?;
        return Ok(());
    }

    if same_run {
        println!("{child} can run together with {parent}");
    } else {
        println!("{child} cannot run together with {parent}");
    }
    Ok(())
}

// =============================================================================
// TICK COMMAND
// =============================================================================

/// Parse an RFC 3339 timestamp.
pub fn parse_now(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AssetFlowError::ConfigError(format!("Invalid --now '{value}': {e}")))
}

/// Evaluate one tick and plan its runs.
///
/// Without `dry_run` the tick's states are committed and old snapshots are
/// pruned to the configured retention.
pub fn run_tick(
    project: &Project,
    status: &StatusFile,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<Value> {
    let snapshot = status.to_snapshot();
    let evaluator = TickEvaluator::new(&project.graph, &snapshot);

    let result = if dry_run {
        let (tick, previous) = if project.state_path.exists() {
            let store = open_store(&project.state_path)?;
            let tick = store
                .latest_tick()?
                .map_or(0, |latest| latest.saturating_add(1));
            (tick, store.load_all_latest()?)
        } else {
            (0, BTreeMap::new())
        };
        evaluator.evaluate(tick, now, &previous)?
    } else {
        let mut store = open_store(&project.state_path)?;
        let result = evaluator.evaluate_and_commit(&mut store, now)?;
        if let Some(keep) = project.config.settings.keep_snapshots {
            let removed = store.prune(keep)?;
            tracing::debug!(removed, keep, "snapshots pruned");
        }
        result
    };

    let runs = build_run_requests(&project.graph, &result.requested, now)?;
    tracing::info!(
        tick = result.tick,
        requested = result.non_empty_requests().count(),
        runs = runs.len(),
        failures = result.failures.len(),
        dry_run,
        "tick complete"
    );

    let requested: serde_json::Map<String, Value> = result
        .non_empty_requests()
        .map(|(key, subset)| (key.to_user_string(), subset_json(subset)))
        .collect();
    let failures: serde_json::Map<String, Value> = result
        .failures
        .iter()
        .map(|(key, reason)| (key.to_user_string(), json!(reason)))
        .collect();
    let runs: Vec<Value> = runs
        .iter()
        .map(|run| {
            json!({
                "run_key": run.run_key,
                "partition": run.partition_key,
                "assets": keys_json(run.asset_keys.iter()),
                "checks": run.check_keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(json!({
        "tick": result.tick,
        "evaluated_at": result.evaluated_at.to_rfc3339(),
        "dry_run": dry_run,
        "requested": requested,
        "failures": failures,
        "runs": runs,
    }))
}

/// Evaluate one tick.
pub fn cmd_tick(
    project: &Project,
    json_mode: bool,
    status: Option<&Path>,
    now: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let status = match status {
        Some(path) => StatusFile::from_file(path)?,
        None => StatusFile::default(),
    };
    let now = match now {
        Some(value) => parse_now(value)?,
        None => Utc::now(),
    };

    let report = run_tick(project, &status, now, dry_run)?;
    if json_mode {
        print_json(&report)?;
        return Ok(());
    }

    let empty = serde_json::Map::new();
    println!(
        "Tick {}{}",
        report["tick"],
        if dry_run { " (dry run)" } else { "" }
    );
    println!("==========");
    println!("Evaluated at: {}", report["evaluated_at"].as_str().unwrap_or(""));

    let requested = report["requested"].as_object().unwrap_or(&empty);
    println!();
    if requested.is_empty() {
        println!("Nothing requested");
    } else {
        println!("Requested:");
        for (key, subset) in requested {
            let subset = match subset {
                Value::Array(keys) => keys
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.as_str().unwrap_or("").to_string(),
            };
            println!("  {key}: {subset}");
        }
    }

    let failures = report["failures"].as_object().unwrap_or(&empty);
    if !failures.is_empty() {
        println!();
        println!("Failures:");
        for (key, reason) in failures {
            println!("  {key}: {}", reason.as_str().unwrap_or(""));
        }
    }

    if let Some(runs) = report["runs"].as_array()
        && !runs.is_empty()
    {
        println!();
        println!("Runs:");
        for run in runs {
            let partition = run["partition"]
                .as_str()
                .map(|p| format!(" [{p}]"))
                .unwrap_or_default();
            let assets: Vec<&str> = run["assets"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            println!(
                "  {}{partition}: {}",
                run["run_key"].as_str().unwrap_or(""),
                assets.join(", ")
            );
        }
    }
    Ok(())
}

// =============================================================================
// STATE COMMAND
// =============================================================================

/// Inspect, prune or compact stored evaluation state.
pub fn cmd_state(
    project: &Project,
    json_mode: bool,
    asset: Option<&str>,
    prune: Option<usize>,
    compact: bool,
) -> Result<()> {
    let mut store = open_store(&project.state_path)?;

    let removed = match prune {
        Some(keep) => Some(store.prune(keep)?),
        None => None,
    };
    if compact {
        store.compact()?;
    }

    if let Some(asset) = asset {
        let key = AssetKey::from_user_string(asset);
        let state = store.load_latest(&key)?;
        let ticks = store.ticks(&key)?;
        let report = match &state {
            Some(state) => json!({
                "asset": key.to_user_string(),
                "tick": state.tick,
                "evaluated_at": state.evaluated_at().map(|at| at.to_rfc3339()),
                "tree_signature": state.tree_signature,
                "requested": subset_json(&state.requested_subset),
                "condition_nodes": state.node_states.len(),
                "stored_ticks": ticks,
            }),
            None => json!({ "asset": key.to_user_string(), "tick": null, "stored_ticks": ticks }),
        };
        if json_mode {
            print_json(&report)?;
            return Ok(());
        }

        match state {
            Some(state) => {
                println!("State of {key}");
                println!("==========");
                println!("Tick:            {}", state.tick);
                if let Some(at) = state.evaluated_at() {
                    println!("Evaluated at:    {}", at.to_rfc3339());
                }
                println!("Requested:       {}", subset_text(&state.requested_subset));
                println!("Condition nodes: {}", state.node_states.len());
                println!("Signature:       {}", state.tree_signature);
                println!("Stored ticks:    {}", ticks.len());
            }
            None => println!("No state stored for {key}"),
        }
        return Ok(());
    }

    let latest_tick = store.latest_tick()?;
    let states = store.load_all_latest()?;
    if json_mode {
        let assets: serde_json::Map<String, Value> = states
            .iter()
            .map(|(key, state)| {
                (
                    key.to_user_string(),
                    json!({
                        "tick": state.tick,
                        "requested": subset_json(&state.requested_subset),
                    }),
                )
            })
            .collect();
        print_json(&json!({
            "state_path": project.state_path.to_string_lossy(),
            "latest_tick": latest_tick,
            "pruned": removed,
            "compacted": compact,
            "assets": assets,
        }))?;
        return Ok(());
    }

    println!("assetflow State");
    println!("===============");
    println!("Database:    {}", project.state_path.display());
    match latest_tick {
        Some(tick) => println!("Latest tick: {tick}"),
        None => println!("Latest tick: none"),
    }
    if let Some(removed) = removed {
        println!("Pruned:      {removed} snapshots");
    }
    for (key, state) in &states {
        println!(
            "  {key}: tick {} requested {}",
            state.tick,
            subset_text(&state.requested_subset)
        );
    }
    Ok(())
}
