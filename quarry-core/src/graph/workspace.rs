//! Workspace-package discovery for scoped (`@scope/name`) imports.
//!
//! The table maps a declared package name to its directory under the project
//! root. It is a process-wide cache behind an idempotent initializer;
//! `reset_workspace_cache` is the only other mutating operation, for callers
//! switching projects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

/// Directories scanned for workspace packages, one level deep.
const PACKAGE_NAMESPACES: &[&str] = &["packages", "apps", "libs", "modules"];

static WORKSPACE_CACHE: Lazy<RwLock<Option<WorkspaceTable>>> = Lazy::new(|| RwLock::new(None));

#[derive(Debug, Clone)]
pub struct WorkspaceTable {
    root: PathBuf,
    /// Declared package name → root-relative directory (forward slashes).
    packages: HashMap<String, String>,
}

impl WorkspaceTable {
    /// Resolve a scoped specifier to a root-relative path, before file
    /// extension fallback. Exact package match resolves to the package
    /// index; a `@scope/name/sub/path` specifier whose first two segments
    /// match a package resolves to the subpath inside it.
    pub fn resolve(&self, specifier: &str) -> Option<String> {
        if let Some(dir) = self.packages.get(specifier) {
            return Some(format!("{dir}/index"));
        }

        let mut segments = specifier.splitn(3, '/');
        let scope = segments.next()?;
        let name = segments.next()?;
        let rest = segments.next()?;
        let key = format!("{scope}/{name}");
        self.packages
            .get(&key)
            .map(|dir| format!("{dir}/{rest}"))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Build (or fetch the cached) workspace table for a project root.
pub fn workspace_table(project_root: &Path) -> WorkspaceTable {
    {
        let cache = WORKSPACE_CACHE.read();
        if let Some(table) = cache.as_ref()
            && table.root == project_root
        {
            return table.clone();
        }
    }

    let table = scan(project_root);
    *WORKSPACE_CACHE.write() = Some(table.clone());
    table
}

/// Drop the cached table. Call when switching projects.
pub fn reset_workspace_cache() {
    *WORKSPACE_CACHE.write() = None;
}

fn scan(root: &Path) -> WorkspaceTable {
    let mut packages = HashMap::new();

    for namespace in PACKAGE_NAMESPACES {
        let dir = root.join(namespace);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            // Manifest read or parse errors skip the directory.
            let Ok(manifest) = std::fs::read_to_string(path.join("package.json")) else {
                continue;
            };
            let Ok(json) = serde_json::from_str::<serde_json::Value>(&manifest) else {
                debug!(path = %path.display(), "skipping package with invalid manifest");
                continue;
            };
            if let Some(name) = json.get("name").and_then(|v| v.as_str()) {
                let rel = format!("{}/{}", namespace, entry.file_name().to_string_lossy());
                packages.insert(name.to_string(), rel);
            }
        }
    }

    debug!(
        root = %root.display(),
        packages = packages.len(),
        "scanned workspace packages"
    );

    WorkspaceTable {
        root: root.to_path_buf(),
        packages,
    }
}
