//! # Run Request Planning
//!
//! Turns the requested subsets of a tick into run requests:
//! 1. Every requested asset is widened to its execution set; members
//!    inherit the requester's partitions.
//! 2. Assets are bucketed by partition key (`None` for unpartitioned).
//! 3. Inside a bucket, assets sharing an execution set, or joined by an edge
//!    that passes `materializable_in_same_run`, land in the same run.
//!
//! Output order is deterministic: by partition key, then by smallest asset key.

use crate::graph::{AssetGraph, materializable_in_same_run};
use crate::subset::AssetSubset;
use crate::types::{AssetCheckKey, AssetKey, EntityKey, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One run to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    /// Stable identifier derived from the partition key and asset keys.
    pub run_key: String,
    pub asset_keys: BTreeSet<AssetKey>,
    pub check_keys: BTreeSet<AssetCheckKey>,
    pub partition_key: Option<String>,
}

impl RunRequest {
    fn new(
        asset_keys: BTreeSet<AssetKey>,
        check_keys: BTreeSet<AssetCheckKey>,
        partition_key: Option<String>,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(partition_key.as_deref().unwrap_or("").as_bytes());
        for key in &asset_keys {
            hasher.update(b"\0");
            hasher.update(key.to_user_string().as_bytes());
        }
        let digest = hasher.finalize().to_hex();
        Self {
            run_key: format!("run_{}", &digest[..16]),
            asset_keys,
            check_keys,
            partition_key,
        }
    }
}

/// Group the requested subsets of a tick into run requests.
///
/// Empty subsets are skipped. Unknown keys are an `AssetNotFound` error.
pub fn build_run_requests(
    graph: &AssetGraph,
    requested: &BTreeMap<AssetKey, AssetSubset>,
    now: DateTime<Utc>,
) -> Result<Vec<RunRequest>> {
    let mut buckets: BTreeMap<Option<String>, BTreeSet<AssetKey>> = BTreeMap::new();

    for (key, subset) in requested {
        let node = graph.node(key)?;
        let universe = node.universe(now)?;
        if subset.is_empty(&universe) {
            continue;
        }
        let partition_keys: Vec<Option<String>> = if universe.is_partitioned() {
            subset.keys(&universe).into_iter().map(Some).collect()
        } else {
            vec![None]
        };
        let members = graph.execution_set_asset_keys(key)?;
        for partition_key in partition_keys {
            buckets
                .entry(partition_key)
                .or_default()
                .extend(members.iter().cloned());
        }
    }

    let mut requests = Vec::new();
    for (partition_key, keys) in buckets {
        for component in components(graph, &keys)? {
            let check_keys = checks_for(graph, &component)?;
            requests.push(RunRequest::new(component, check_keys, partition_key.clone()));
        }
    }

    tracing::debug!(runs = requests.len(), "planned run requests");
    Ok(requests)
}

/// Connected components of `keys` under shared execution sets and same-run edges.
fn components(graph: &AssetGraph, keys: &BTreeSet<AssetKey>) -> Result<Vec<BTreeSet<AssetKey>>> {
    let index: BTreeMap<&AssetKey, usize> = keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let mut parent: Vec<usize> = (0..keys.len()).collect();

    for (key, &i) in &index {
        for member in graph.execution_set_asset_keys(key)? {
            if let Some(&j) = index.get(&member) {
                union(&mut parent, i, j);
            }
        }
        for upstream in graph.node(key)?.parents_excluding_self() {
            if let Some(&j) = index.get(upstream) {
                if materializable_in_same_run(graph, key, upstream) {
                    union(&mut parent, i, j);
                }
            }
        }
    }

    // Keys iterate in order, so each component's smallest key arrives first.
    let mut grouped: BTreeMap<usize, BTreeSet<AssetKey>> = BTreeMap::new();
    let mut order: Vec<usize> = Vec::new();
    for (key, &i) in &index {
        let root = find(&mut parent, i);
        if !grouped.contains_key(&root) {
            order.push(root);
        }
        grouped.entry(root).or_default().insert((*key).clone());
    }
    Ok(order
        .into_iter()
        .filter_map(|root| grouped.remove(&root))
        .collect())
}

/// Checks on the component's assets whose execution set fits inside the run.
fn checks_for(graph: &AssetGraph, assets: &BTreeSet<AssetKey>) -> Result<BTreeSet<AssetCheckKey>> {
    let mut checks = BTreeSet::new();
    for key in assets {
        for entity in graph.execution_set(&EntityKey::Asset(key.clone()))? {
            if let EntityKey::Check(check) = entity {
                checks.insert(check);
            }
        }
        for check in graph.node(key)?.check_keys() {
            let fits = graph
                .execution_set(&EntityKey::Check(check.clone()))?
                .iter()
                .all(|entity| match entity {
                    EntityKey::Asset(asset) => assets.contains(asset),
                    EntityKey::Check(_) => true,
                });
            if fits {
                checks.insert(check.clone());
            }
        }
    }
    Ok(checks)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // Smaller root wins so roots stay stable regardless of edge order.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AssetCheckSpec, AssetInput, AssetSpec, AssetsDefinition};
    use crate::node_def::NodeDefinition;
    use crate::partitions::PartitionsDefinition;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).single().expect("timestamp")
    }

    fn daily() -> PartitionsDefinition {
        PartitionsDefinition::daily(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"))
    }

    fn asset(key: &str, deps: &[&str], partitions: Option<PartitionsDefinition>) -> AssetInput {
        let inputs: Vec<String> = deps.iter().map(|d| (*d).to_string()).collect();
        let mut builder = AssetsDefinition::builder(NodeDefinition::op(key, inputs, ["result"]))
            .output("result", AssetSpec::new(key));
        for dep in deps {
            builder = builder.input(*dep, *dep);
        }
        if let Some(partitions) = partitions {
            builder = builder.partitions(partitions);
        }
        builder.build().expect("definition").into()
    }

    fn all(keys: &[&str]) -> BTreeMap<AssetKey, AssetSubset> {
        keys.iter()
            .map(|k| (AssetKey::from(*k), AssetSubset::All))
            .collect()
    }

    fn keys(request: &RunRequest) -> Vec<String> {
        request.asset_keys.iter().map(AssetKey::to_user_string).collect()
    }

    #[test]
    fn connected_chain_becomes_one_run() {
        let graph = AssetGraph::from_assets([
            asset("a", &[], None),
            asset("b", &["a"], None),
            asset("c", &["b"], None),
            asset("solo", &[], None),
        ])
        .expect("graph");

        let requests = build_run_requests(&graph, &all(&["a", "b", "c", "solo"]), now()).expect("plan");
        assert_eq!(requests.len(), 2);
        assert_eq!(keys(&requests[0]), vec!["a", "b", "c"]);
        assert_eq!(keys(&requests[1]), vec!["solo"]);
        assert!(requests[0].partition_key.is_none());
    }

    #[test]
    fn partitions_split_into_separate_runs() {
        let graph = AssetGraph::from_assets([
            asset("events", &[], Some(daily())),
            asset("daily_summary", &["events"], Some(daily())),
        ])
        .expect("graph");

        let mut requested = BTreeMap::new();
        requested.insert(AssetKey::from("events"), AssetSubset::from_keys(["2024-01-01", "2024-01-02"]));
        requested.insert(AssetKey::from("daily_summary"), AssetSubset::from_keys(["2024-01-02"]));

        let requests = build_run_requests(&graph, &requested, now()).expect("plan");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].partition_key.as_deref(), Some("2024-01-01"));
        assert_eq!(keys(&requests[0]), vec!["events"]);
        assert_eq!(requests[1].partition_key.as_deref(), Some("2024-01-02"));
        assert_eq!(keys(&requests[1]), vec!["daily_summary", "events"]);
    }

    #[test]
    fn incompatible_edge_keeps_runs_apart() {
        let graph = AssetGraph::from_assets([
            asset("events", &[], Some(daily())),
            asset("report", &["events"], None),
        ])
        .expect("graph");

        let mut requested = all(&["report"]);
        requested.insert(AssetKey::from("events"), AssetSubset::from_keys(["2024-01-01"]));
        let requests = build_run_requests(&graph, &requested, now()).expect("plan");
        assert_eq!(requests.len(), 2);
        assert!(requests[0].partition_key.is_none());
        assert_eq!(keys(&requests[0]), vec!["report"]);
    }

    #[test]
    fn execution_set_is_widened_with_checks() {
        let op = NodeDefinition::op("multi", Vec::<String>::new(), ["x", "y", "check"]);
        let definition = AssetsDefinition::builder(op)
            .output("x", AssetSpec::new("x"))
            .output("y", AssetSpec::new("y"))
            .check("check", AssetCheckSpec::new("positive", "x"))
            .can_subset(false)
            .build()
            .expect("definition");
        let graph = AssetGraph::from_assets([definition]).expect("graph");

        let requests = build_run_requests(&graph, &all(&["x"]), now()).expect("plan");
        assert_eq!(requests.len(), 1);
        assert_eq!(keys(&requests[0]), vec!["x", "y"]);
        assert_eq!(requests[0].check_keys.len(), 1);
    }

    #[test]
    fn empty_requests_and_stable_keys() {
        let graph = AssetGraph::from_assets([asset("a", &[], None)]).expect("graph");
        let mut requested = BTreeMap::new();
        requested.insert(AssetKey::from("a"), AssetSubset::Empty);
        assert!(build_run_requests(&graph, &requested, now()).expect("plan").is_empty());

        let first = build_run_requests(&graph, &all(&["a"]), now()).expect("plan");
        let second = build_run_requests(&graph, &all(&["a"]), now()).expect("plan");
        assert_eq!(first, second);
        assert!(first[0].run_key.starts_with("run_"));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let graph = AssetGraph::from_assets([asset("a", &[], None)]).expect("graph");
        assert!(build_run_requests(&graph, &all(&["ghost"]), now()).is_err());
    }
}
