//! Self-describing JSON snapshots for the vector store, the dependency
//! graph, and the index metadata document.
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so readers never observe a partial snapshot.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use super::{VectorEntry, VectorStore};
use crate::error::{QuarryError, Result};
use crate::graph::{DependencyGraph, DependencyNode};
use crate::types::{Import, IndexMeta};

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotTimestamps {
    created_at: u64,
    updated_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorSnapshot {
    dimension: usize,
    model: String,
    metadata: SnapshotTimestamps,
    entries: Vec<VectorEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphNodeSnapshot {
    filepath: String,
    exports: Vec<String>,
    imports: Vec<Import>,
    /// Advisory; chunks are re-attached from the vector snapshot on load.
    chunk_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphSnapshot {
    nodes: BTreeMap<String, GraphNodeSnapshot>,
    edges: BTreeMap<String, Vec<String>>,
    reverse_edges: BTreeMap<String, Vec<String>>,
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| QuarryError::StoreIo(e.error))?;
    Ok(())
}

/// Serialize the store to `path`, entries in insertion order.
pub fn save_vector_store(store: &VectorStore, path: &Path) -> Result<()> {
    let snapshot = VectorSnapshot {
        dimension: store.dimension(),
        model: store.model_name().to_string(),
        metadata: SnapshotTimestamps {
            created_at: store.created_at(),
            updated_at: store.updated_at(),
        },
        entries: store.entries().cloned().collect(),
    };

    atomic_write(path, &serde_json::to_vec(&snapshot)?)?;
    info!(path = %path.display(), entries = snapshot.entries.len(), "saved vector snapshot");
    Ok(())
}

/// Load a store saved by [`save_vector_store`]. Every entry is re-checked
/// against the declared dimension.
pub fn load_vector_store(path: &Path) -> Result<VectorStore> {
    let raw = std::fs::read(path)?;
    let snapshot: VectorSnapshot = serde_json::from_slice(&raw)?;

    let mut entries = IndexMap::with_capacity(snapshot.entries.len());
    for entry in snapshot.entries {
        if entry.embedding.len() != snapshot.dimension {
            return Err(QuarryError::DimensionMismatch {
                expected: snapshot.dimension,
                actual: entry.embedding.len(),
            });
        }
        entries.insert(entry.id.clone(), entry);
    }

    Ok(VectorStore::from_parts(
        snapshot.dimension,
        snapshot.model,
        entries,
        snapshot.metadata.created_at,
        snapshot.metadata.updated_at,
    ))
}

/// Serialize the graph to `path`. Chunk contents are not persisted here, only
/// their ids.
pub fn save_graph(graph: &DependencyGraph, path: &Path) -> Result<()> {
    let nodes: BTreeMap<String, GraphNodeSnapshot> = graph
        .nodes()
        .map(|(filepath, node)| {
            (
                filepath.to_string(),
                GraphNodeSnapshot {
                    filepath: node.filepath.clone(),
                    exports: node.exports.iter().cloned().collect(),
                    imports: node.imports.clone(),
                    chunk_ids: node.chunks.iter().map(|c| c.id.clone()).collect(),
                },
            )
        })
        .collect();

    let edges: BTreeMap<String, Vec<String>> = graph
        .files()
        .map(|f| (f.to_string(), graph.dependencies(f)))
        .collect();
    let reverse_edges: BTreeMap<String, Vec<String>> = graph
        .files()
        .map(|f| (f.to_string(), graph.dependents(f)))
        .collect();

    let snapshot = GraphSnapshot {
        nodes,
        edges,
        reverse_edges,
    };
    atomic_write(path, &serde_json::to_vec(&snapshot)?)?;
    info!(path = %path.display(), nodes = snapshot.nodes.len(), "saved graph snapshot");
    Ok(())
}

/// Load a graph saved by [`save_graph`]. Nodes come back with empty chunk
/// lists; reverse edges are rebuilt from the forward edges so the adjacency
/// invariant holds regardless of what the document claims.
pub fn load_graph(path: &Path) -> Result<DependencyGraph> {
    let raw = std::fs::read(path)?;
    let snapshot: GraphSnapshot = serde_json::from_slice(&raw)?;

    let mut graph = DependencyGraph::new();
    for (_, node) in snapshot.nodes {
        graph.insert_node(DependencyNode {
            filepath: node.filepath,
            exports: node.exports.into_iter().collect(),
            imports: node.imports,
            chunks: Vec::new(),
        });
    }
    for (from, targets) in snapshot.edges {
        for to in targets {
            graph.add_edge(&from, &to);
        }
    }
    Ok(graph)
}

pub fn save_meta(meta: &IndexMeta, path: &Path) -> Result<()> {
    atomic_write(path, &serde_json::to_vec_pretty(meta)?)
}

pub fn load_meta(path: &Path) -> Result<IndexMeta> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}
