//! Call-graph construction and translation ordering.
//!
//! The static-analysis snapshot is turned into a directed call graph (edge
//! `a -> b` means `a` calls `b`), restricted to what the entry function can
//! reach, and ordered callees-first so every translated function's callees
//! already have Rust bindings when it is patched in.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use petgraph::algo::{connected_components, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, DfsPostOrder, EdgeRef};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{FunctionDescriptor, FunctionRecord};

/// The analyzer renames `main` so the Rust side can own the real entry point.
pub const DEFAULT_ENTRY_FUNCTION: &str = "main_0";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to read static analysis snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse static analysis snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Entry function `{0}` does not appear in the call graph")]
    MissingEntry(String),
    #[error(
        "Functions reachable from `{entry}` form {components} weakly connected components; expected 1"
    )]
    Reachability { entry: String, components: usize },
}

/// Read `functions.json` as produced by the analyzer.
pub fn load_snapshot(path: &Path) -> Result<Vec<FunctionRecord>, AnalysisError> {
    let body = fs::read_to_string(path)
        .map_err(|source| AnalysisError::Read { path: path.to_path_buf(), source })?;
    Ok(serde_json::from_str(&body)?)
}

/// SHA-256 of the raw snapshot, recorded in the run log to tie results to the
/// analysis they were computed from.
pub fn snapshot_hash(path: &Path) -> Result<String, AnalysisError> {
    let bytes =
        fs::read(path).map_err(|source| AnalysisError::Read { path: path.to_path_buf(), source })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// How a `TranslationOrder` was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Reverse topological order: every function follows all of its callees.
    Topological,
    /// The reachable graph has a cycle, so this is a depth-first post-order
    /// from the entry. Callees still precede callers in acyclic regions, but
    /// nothing is promised across the members of a cycle.
    PostOrderFallback,
}

/// Directed call graph keyed by function name.
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl CallGraph {
    /// Build a graph from snapshot records. Records without callee information
    /// are skipped; callees without records still become nodes.
    pub fn from_records(records: &[FunctionRecord]) -> Self {
        let mut graph = CallGraph::default();
        for record in records {
            let Some(callees) = &record.called_functions else {
                continue;
            };
            let caller = graph.node(&record.name);
            for callee in callees {
                let callee = graph.node(callee);
                graph.graph.update_edge(caller, callee, ());
            }
        }
        graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct callees of `name`, sorted for stable output.
    pub fn callees(&self, name: &str) -> Vec<&str> {
        let Some(idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> =
            self.graph.neighbors(*idx).map(|n| self.graph[n].as_str()).collect();
        out.sort_unstable();
        out
    }

    /// Number of weakly connected components.
    pub fn weak_component_count(&self) -> usize {
        connected_components(&self.graph)
    }

    /// The subgraph induced by everything reachable from `entry` (inclusive).
    pub fn reachable_from(&self, entry: &str) -> Result<CallGraph, AnalysisError> {
        let start =
            *self.index.get(entry).ok_or_else(|| AnalysisError::MissingEntry(entry.to_string()))?;

        let mut reachable = vec![false; self.graph.node_count()];
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            reachable[idx.index()] = true;
        }

        let mut sub = CallGraph::default();
        for idx in self.graph.node_indices().filter(|idx| reachable[idx.index()]) {
            sub.node(&self.graph[idx]);
        }
        for edge in self.graph.edge_references() {
            if reachable[edge.source().index()] && reachable[edge.target().index()] {
                let from = sub.node(&self.graph[edge.source()]);
                let to = sub.node(&self.graph[edge.target()]);
                sub.graph.update_edge(from, to, ());
            }
        }
        Ok(sub)
    }

    /// Order the functions reachable from `entry` callees-first.
    pub fn translation_order(&self, entry: &str) -> Result<(Vec<String>, OrderKind), AnalysisError> {
        let sub = self.reachable_from(entry)?;
        let components = sub.weak_component_count();
        if components != 1 {
            return Err(AnalysisError::Reachability { entry: entry.to_string(), components });
        }

        match toposort(&sub.graph, None) {
            Ok(sorted) => {
                let names = sorted.into_iter().rev().map(|idx| sub.graph[idx].clone()).collect();
                Ok((names, OrderKind::Topological))
            }
            Err(cycle) => {
                warn!(
                    node = %sub.graph[cycle.node_id()],
                    "call graph has a cycle; falling back to depth-first post-order"
                );
                // Entry is present: reachable_from succeeded.
                let start = sub.index[entry];
                let mut names = Vec::with_capacity(sub.node_count());
                let mut dfs = DfsPostOrder::new(&sub.graph, start);
                while let Some(idx) = dfs.next(&sub.graph) {
                    names.push(sub.graph[idx].clone());
                }
                Ok((names, OrderKind::PostOrderFallback))
            }
        }
    }
}

/// Lazy, single-pass sequence of functions to translate.
///
/// Graph nodes without a matching snapshot record (library calls such as
/// `printf`) are skipped.
#[derive(Debug)]
pub struct TranslationOrder {
    names: std::vec::IntoIter<String>,
    records: HashMap<String, FunctionRecord>,
    kind: OrderKind,
}

impl TranslationOrder {
    pub fn kind(&self) -> OrderKind {
        self.kind
    }
}

impl Iterator for TranslationOrder {
    type Item = FunctionDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        for name in self.names.by_ref() {
            match self.records.get(&name) {
                Some(record) => return Some(FunctionDescriptor::from(record)),
                None => debug!(function = %name, "no snapshot record; skipping"),
            }
        }
        None
    }
}

/// Build the call graph from `records` and derive the translation order
/// rooted at `entry`.
pub fn plan_translation(
    records: Vec<FunctionRecord>,
    entry: &str,
) -> Result<TranslationOrder, AnalysisError> {
    let graph = CallGraph::from_records(&records);
    let (names, kind) = graph.translation_order(entry)?;

    // First record wins when the analyzer reports a name twice.
    let mut by_name: HashMap<String, FunctionRecord> = HashMap::new();
    for record in records {
        by_name.entry(record.name.clone()).or_insert(record);
    }

    Ok(TranslationOrder { names: names.into_iter(), records: by_name, kind })
}
