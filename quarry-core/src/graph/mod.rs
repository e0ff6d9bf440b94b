mod builder;
mod extract;
pub mod workspace;

pub use builder::build_graph;
pub use workspace::{reset_workspace_cache, workspace_table, WorkspaceTable};

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{CodeChunk, Import};

/// One file in the dependency graph. `chunks` stays empty until chunks are
/// attached after indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNode {
    pub filepath: String,
    pub exports: BTreeSet<String>,
    pub imports: Vec<Import>,
    pub chunks: Vec<CodeChunk>,
}

/// Directed file-level dependency graph with forward and reverse adjacency.
/// Cycles are allowed; BFS visits each node at most once.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
    edges: HashMap<String, BTreeSet<String>>,
    reverse_edges: HashMap<String, BTreeSet<String>>,
}

/// Options for BFS context expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandOptions {
    pub max_hops: usize,
    pub include_imports: bool,
    pub include_dependents: bool,
    pub max_files: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_hops: 2,
            include_imports: true,
            include_dependents: true,
            max_files: 20,
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_node(&mut self, node: DependencyNode) {
        let filepath = node.filepath.clone();
        self.nodes.insert(filepath.clone(), node);
        self.edges.entry(filepath.clone()).or_default();
        self.reverse_edges.entry(filepath).or_default();
    }

    /// Insert `from → to` plus the reverse edge. Both endpoints must already
    /// be nodes; anything else is silently ignored.
    pub(crate) fn add_edge(&mut self, from: &str, to: &str) {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return;
        }
        self.edges.entry(from.to_string()).or_default().insert(to.to_string());
        self.reverse_edges.entry(to.to_string()).or_default().insert(from.to_string());
    }

    pub fn node(&self, filepath: &str) -> Option<&DependencyNode> {
        self.nodes.get(filepath)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &DependencyNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Files `filepath` imports.
    pub fn dependencies(&self, filepath: &str) -> Vec<String> {
        self.edges
            .get(filepath)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Files that import `filepath`.
    pub fn dependents(&self, filepath: &str) -> Vec<String> {
        self.reverse_edges
            .get(filepath)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Files whose export set contains `symbol`, sorted for determinism.
    pub fn find_exporting_files(&self, symbol: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.exports.contains(symbol))
            .map(|(filepath, _)| filepath.clone())
            .collect();
        found.sort();
        found
    }

    /// Join chunks onto their nodes by filepath; chunks for unknown files are
    /// skipped.
    pub fn attach_chunks(&mut self, chunks: &[CodeChunk]) {
        for chunk in chunks {
            if let Some(node) = self.nodes.get_mut(&chunk.filepath) {
                node.chunks.push(chunk.clone());
            }
        }
    }

    /// BFS from `start_files` (depth 0) over the enabled edge directions.
    ///
    /// The visited set is seeded with the start files so they lead the output.
    /// Stops when the queue drains, the result reaches `max_files`, or a
    /// popped node sits at `max_hops` (which is not expanded further).
    /// Discovery order is preserved.
    pub fn expand_context(&self, start_files: &[String], options: &ExpandOptions) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut result: Vec<String> = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        for file in start_files {
            if visited.insert(file.clone()) {
                result.push(file.clone());
                queue.push_back((file.clone(), 0));
            }
        }

        'bfs: while let Some((file, depth)) = queue.pop_front() {
            if result.len() >= options.max_files {
                break;
            }
            if depth >= options.max_hops {
                continue;
            }

            let mut neighbors: Vec<&String> = Vec::new();
            if options.include_imports
                && let Some(deps) = self.edges.get(&file)
            {
                neighbors.extend(deps.iter());
            }
            if options.include_dependents
                && let Some(deps) = self.reverse_edges.get(&file)
            {
                neighbors.extend(deps.iter());
            }

            for neighbor in neighbors {
                if visited.insert(neighbor.clone()) {
                    result.push(neighbor.clone());
                    queue.push_back((neighbor.clone(), depth + 1));
                    if result.len() >= options.max_files {
                        break 'bfs;
                    }
                }
            }
        }

        result
    }

    /// Expand from the files of `start_chunks` and concatenate the chunks of
    /// every reached node (files in discovery order, chunks in node order),
    /// truncated to `max_chunks`.
    pub fn get_expanded_chunks(
        &self,
        start_chunks: &[CodeChunk],
        max_hops: usize,
        max_chunks: usize,
    ) -> Vec<CodeChunk> {
        let mut start_files: Vec<String> = Vec::new();
        for chunk in start_chunks {
            if !start_files.contains(&chunk.filepath) {
                start_files.push(chunk.filepath.clone());
            }
        }

        let options = ExpandOptions {
            max_hops,
            ..ExpandOptions::default()
        };

        let mut chunks = Vec::new();
        for file in self.expand_context(&start_files, &options) {
            if let Some(node) = self.nodes.get(&file) {
                for chunk in &node.chunks {
                    if chunks.len() >= max_chunks {
                        return chunks;
                    }
                    chunks.push(chunk.clone());
                }
            }
        }
        chunks
    }
}
