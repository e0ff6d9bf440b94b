//! Two-pass dependency graph construction.
//!
//! Pass 1 creates one node per input file from the regex extractor's output.
//! Pass 2 resolves each import specifier to a workspace filepath and inserts
//! forward/reverse edges. Unresolvable imports are dropped, never fatal.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use super::workspace;
use super::{extract, DependencyGraph, DependencyNode};
use crate::types::SourceFile;

/// Extensions tried, in order, when an import omits one.
const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

pub fn build_graph(files: &[SourceFile], project_root: &Path) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    // Pass 1: nodes.
    for file in files {
        graph.insert_node(DependencyNode {
            filepath: file.filepath.clone(),
            exports: extract::extract_exports(&file.content),
            imports: extract::extract_imports(&file.content),
            chunks: Vec::new(),
        });
    }

    // Pass 2: edges over resolved imports.
    let known: HashSet<String> = graph.files().map(str::to_string).collect();
    let mut pending = Vec::new();
    for (filepath, node) in graph.nodes() {
        for import in &node.imports {
            if let Some(target) = resolve_import(&import.from, filepath, project_root, &known) {
                pending.push((filepath.to_string(), target));
            } else {
                debug!(from = %import.from, importer = %filepath, "dropping unresolved import");
            }
        }
    }
    for (from, to) in pending {
        graph.add_edge(&from, &to);
    }

    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built dependency graph"
    );
    graph
}

/// Resolve one import specifier to a known filepath, or `None` to drop it.
fn resolve_import(
    specifier: &str,
    importer: &str,
    project_root: &Path,
    known: &HashSet<String>,
) -> Option<String> {
    let base = if specifier.starts_with('@') {
        // Workspace-scoped package: consult the package table.
        workspace::workspace_table(project_root).resolve(specifier)?
    } else if specifier.starts_with('.') || specifier.starts_with('/') {
        let dir = match importer.rfind('/') {
            Some(idx) => &importer[..idx],
            None => "",
        };
        normalize(&format!("{dir}/{specifier}"))?
    } else {
        // Bare specifier: external package.
        return None;
    };

    resolve_file(&base, known)
}

/// Lexically canonicalize a joined path. Returns `None` when the path walks
/// above the project root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Apply the extension fallback and require the target to be a known node.
fn resolve_file(path: &str, known: &HashSet<String>) -> Option<String> {
    if SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return known.contains(path).then(|| path.to_string());
    }

    for ext in SOURCE_EXTENSIONS {
        let candidate = format!("{path}{ext}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in SOURCE_EXTENSIONS {
        let candidate = format!("{path}/index{ext}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}
