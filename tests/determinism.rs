//! Property tests: identical graphs and payloads must produce identical
//! traces, and record sequences must be strictly increasing regardless
//! of topology.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use relaygraph::executor::{Executor, RunOptions};
use relaygraph::graph::{Edge, GraphStore};
use relaygraph::report::ExecutionReport;
use serde_json::json;

use common::{Tag, Uppercase};

/// Builds a root fanning out to `branches` tagged children and runs it
/// to completion on a fresh runtime.
fn run_once(payload: &str, branches: usize, depth: usize) -> ExecutionReport {
    common::init_tracing();
    let graph = GraphStore::new();
    graph.register_node("root", Uppercase).expect("root");
    for b in 0..branches {
        let mut parent = "root".to_string();
        for d in 0..depth {
            let name = format!("b{b}d{d}");
            graph
                .register_node(name.clone(), Tag(format!("-{b}.{d}")))
                .expect("branch node");
            graph.add_edge(Edge::new(parent, name.clone()));
            parent = name;
        }
    }

    let executor = Executor::new(Arc::new(graph));
    tokio::runtime::Runtime::new()
        .expect("runtime")
        .block_on(executor.run("root", json!(payload), RunOptions::new(256)))
        .expect("run")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn identical_inputs_yield_identical_traces(
        payload in "[a-z]{1,12}",
        branches in 1usize..5,
        depth in 1usize..4,
    ) {
        let first = run_once(&payload, branches, depth);
        let second = run_once(&payload, branches, depth);

        prop_assert_eq!(first.visit_order(), second.visit_order());
        prop_assert_eq!(first.steps, second.steps);
        for (node, record) in &first.last_by_node {
            let other = second
                .last_by_node
                .get(node)
                .expect("both runs visit the same node set");
            prop_assert_eq!(
                record.output().map(|m| &m.payload),
                other.output().map(|m| &m.payload)
            );
        }
    }

    #[test]
    fn record_sequences_strictly_increase(
        payload in "[a-z]{1,8}",
        branches in 1usize..6,
    ) {
        let report = run_once(&payload, branches, 2);

        prop_assert_eq!(report.steps as usize, report.records.len());
        let sequences: Vec<u64> = report.records.iter().map(|r| r.sequence).collect();
        prop_assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        // Sequence 0 belongs to the seed message, never to a record.
        prop_assert!(sequences.iter().all(|&s| s > 0));
    }
}
