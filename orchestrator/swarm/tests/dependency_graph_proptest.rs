// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use hivemind_swarm::domain::{DependencyError, DependencyGraph};

fn graph_with(nodes: u32) -> DependencyGraph<u32> {
    let mut graph = DependencyGraph::new();
    for node in 0..nodes {
        graph.add_task(node);
    }
    graph
}

fn edge_count(graph: &DependencyGraph<u32>, nodes: u32) -> usize {
    (0..nodes).map(|node| graph.dependencies_of(&node).len()).sum()
}

/// Edges that only point from a higher node to a lower one, so the result is
/// always a DAG.
fn forward_edges(max_nodes: u32) -> impl Strategy<Value = (u32, Vec<(u32, u32)>)> {
    (2..max_nodes).prop_flat_map(|nodes| {
        let edge = (1..nodes).prop_flat_map(|task| (Just(task), 0..task));
        (Just(nodes), prop::collection::vec(edge, 0..(nodes as usize * 2)))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_forward_edges_are_accepted_and_ordered((nodes, edges) in forward_edges(24)) {
        let mut graph = graph_with(nodes);
        for (task, dependency) in &edges {
            prop_assert!(graph.add_dependency(task, dependency).is_ok());
        }
        prop_assert!(!graph.has_cycle());

        let order = graph.topological_order().expect("acyclic graph has an order");
        prop_assert_eq!(order.len(), nodes as usize);
        let position: HashMap<u32, usize> =
            order.iter().enumerate().map(|(index, node)| (*node, index)).collect();
        for (task, dependency) in &edges {
            prop_assert!(position[dependency] < position[task]);
        }
    }

    #[test]
    fn prop_rejected_edges_leave_graph_unchanged(
        nodes in 2u32..16,
        edges in prop::collection::vec((0u32..16, 0u32..16), 0..48),
    ) {
        let mut graph = graph_with(nodes);
        for (task, dependency) in edges {
            let before = edge_count(&graph, nodes);
            match graph.add_dependency(&task, &dependency) {
                Ok(()) => prop_assert!(edge_count(&graph, nodes) >= before),
                Err(DependencyError::Cycle { cycle }) => {
                    prop_assert!(!cycle.is_empty());
                    prop_assert_eq!(edge_count(&graph, nodes), before);
                }
                Err(DependencyError::UnknownTask(_)) => {
                    prop_assert!(task >= nodes || dependency >= nodes);
                    prop_assert_eq!(edge_count(&graph, nodes), before);
                }
            }
            prop_assert!(!graph.has_cycle());
        }
    }

    #[test]
    fn prop_closing_a_chain_is_detected(nodes in 2u32..32) {
        let mut graph = graph_with(nodes);
        for node in 1..nodes {
            graph.add_dependency(&node, &(node - 1)).expect("chain edge");
        }
        let last = nodes - 1;
        match graph.add_dependency(&0, &last) {
            Err(DependencyError::Cycle { cycle }) => {
                let members: BTreeSet<&str> = cycle.iter().map(String::as_str).collect();
                for node in 0..nodes {
                    prop_assert!(members.contains(node.to_string().as_str()));
                }
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
        prop_assert!(graph.dependencies_of(&0).is_empty());
        prop_assert_eq!(graph.transitive_dependents(&0).len(), last as usize);
    }

    #[test]
    fn prop_transitive_dependents_match_reachability((nodes, edges) in forward_edges(16)) {
        let mut graph = graph_with(nodes);
        for (task, dependency) in &edges {
            graph.add_dependency(task, dependency).expect("forward edge");
        }
        for root in 0..nodes {
            let mut reachable = BTreeSet::new();
            let mut frontier = vec![root];
            while let Some(current) = frontier.pop() {
                for (task, dependency) in &edges {
                    if *dependency == current && reachable.insert(*task) {
                        frontier.push(*task);
                    }
                }
            }
            let expected: Vec<u32> = reachable.into_iter().collect();
            prop_assert_eq!(graph.transitive_dependents(&root), expected);
        }
    }
}
