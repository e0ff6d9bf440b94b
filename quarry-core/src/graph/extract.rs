//! Regex-based import/export extraction over raw file contents.
//!
//! Deliberately independent of the tree-sitter chunker: no grammar loading
//! when only the graph is needed, and it records metadata the chunker does
//! not (per-symbol records, type-only flag, line numbers).

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Import;

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+(type\s+)?([^'"]+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});

static DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*export\s+(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum|const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .unwrap()
});

static EXPORT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*export\s*\{([^}]*)\}").unwrap());

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*export\s+default\b").unwrap());

/// Split an import clause (`Default, { a, b as c }`, `* as ns`, …) into the
/// imported symbols. Namespace imports collapse to `*`; named imports record
/// the source-side name (the one before `as`).
fn clause_symbols(clause: &str) -> Vec<String> {
    let mut outside = String::new();
    let mut braced = String::new();
    let mut depth = 0usize;

    for ch in clause.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                braced.push(',');
            }
            c if depth > 0 => braced.push(c),
            c => outside.push(c),
        }
    }

    let mut symbols = Vec::new();
    for part in outside.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.starts_with('*') {
            symbols.push("*".to_string());
        } else {
            symbols.push(part.to_string());
        }
    }
    for part in braced.split(',') {
        let part = part.trim();
        let part = part.strip_prefix("type ").unwrap_or(part).trim();
        if part.is_empty() {
            continue;
        }
        let name = part.split_whitespace().next().unwrap_or(part);
        symbols.push(name.to_string());
    }
    symbols
}

/// Extract one `Import` record per imported symbol, with 1-indexed lines.
pub(crate) fn extract_imports(content: &str) -> Vec<Import> {
    let mut imports = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(caps) = IMPORT_FROM.captures(line) {
            let is_type = caps.get(1).is_some();
            let from = caps[3].to_string();
            for symbol in clause_symbols(&caps[2]) {
                imports.push(Import {
                    symbol,
                    from: from.clone(),
                    is_type,
                    line: line_no,
                });
            }
            continue;
        }

        for caps in DYNAMIC_IMPORT.captures_iter(line) {
            imports.push(Import {
                symbol: "*".to_string(),
                from: caps[1].to_string(),
                is_type: false,
                line: line_no,
            });
        }
        for caps in REQUIRE.captures_iter(line) {
            imports.push(Import {
                symbol: "*".to_string(),
                from: caps[1].to_string(),
                is_type: false,
                line: line_no,
            });
        }
    }

    imports
}

/// Extract the exported symbol names of a file. Aliased re-exports keep the
/// alias; `export default` records `default`.
pub(crate) fn extract_exports(content: &str) -> BTreeSet<String> {
    let mut exports = BTreeSet::new();

    for line in content.lines() {
        if let Some(caps) = EXPORT_DECL.captures(line) {
            exports.insert(caps[1].to_string());
            continue;
        }
        if let Some(caps) = EXPORT_CLAUSE.captures(line) {
            for part in caps[1].split(',') {
                let part = part.trim();
                let part = part.strip_prefix("type ").unwrap_or(part).trim();
                if part.is_empty() {
                    continue;
                }
                let name = match part.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => part,
                };
                if !name.is_empty() {
                    exports.insert(name.to_string());
                }
            }
            continue;
        }
        if EXPORT_DEFAULT.is_match(line) {
            exports.insert("default".to_string());
        }
    }

    exports
}
