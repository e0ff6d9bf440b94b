//! Per-language extraction rules: symbol names, export detection, referenced
//! type identifiers, and file-level import specifiers.

use std::collections::HashSet;

use tree_sitter::Node;

use super::language::Language;
use crate::types::NodeType;

pub(crate) const ANONYMOUS: &str = "anonymous";

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| text(n, source).to_string())
}

/// Extract the display name for a chunkable node.
pub(crate) fn node_name(node: Node, source: &str, language: Language) -> String {
    let name = match language {
        Language::TypeScript | Language::JavaScript => ts_name(node, source),
        Language::Python => py_name(node, source),
        Language::Go => go_name(node, source),
        Language::Rust => rust_name(node, source),
    };
    name.unwrap_or_else(|| ANONYMOUS.to_string())
}

fn ts_name(node: Node, source: &str) -> Option<String> {
    match node.kind() {
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                return ts_name(decl, source);
            }
            // `export { a, b as c }`: join the specifier names.
            let mut names = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "export_clause" {
                    let mut inner = child.walk();
                    for spec in child.children(&mut inner) {
                        if spec.kind() == "export_specifier"
                            && let Some(name) = field_text(spec, "name", source)
                        {
                            names.push(name);
                        }
                    }
                }
            }
            if names.is_empty() {
                None
            } else {
                Some(names.join(", "))
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| field_text(d, "name", source))
        }
        _ => field_text(node, "name", source),
    }
}

fn py_name(node: Node, source: &str) -> Option<String> {
    if node.kind() == "decorated_definition" {
        return node
            .child_by_field_name("definition")
            .and_then(|d| py_name(d, source));
    }
    field_text(node, "name", source)
}

fn go_name(node: Node, source: &str) -> Option<String> {
    if node.kind() == "type_declaration" {
        let mut cursor = node.walk();
        return node
            .children(&mut cursor)
            .find(|c| c.kind() == "type_spec")
            .and_then(|s| field_text(s, "name", source));
    }
    field_text(node, "name", source)
}

fn rust_name(node: Node, source: &str) -> Option<String> {
    if node.kind() == "impl_item" {
        return node
            .child_by_field_name("type")
            .map(|t| format!("impl {}", text(t, source)));
    }
    field_text(node, "name", source)
}

/// Map a chunkable node to its `NodeType`. For wrapper kinds the type follows
/// the wrapped declaration.
pub(crate) fn node_type(node: Node, language: Language) -> NodeType {
    match language {
        Language::TypeScript | Language::JavaScript => ts_node_type(node),
        Language::Python => py_node_type(node),
        Language::Go => go_node_type(node),
        Language::Rust => rust_node_type(node),
    }
}

/// Does this subtree contain a function-valued expression?
pub(crate) fn contains_function(node: Node) -> bool {
    if matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function"
    ) {
        return true;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).any(contains_function)
}

fn ts_node_type(node: Node) -> NodeType {
    match node.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "arrow_function"
        | "function_expression"
        | "method_definition" => NodeType::Function,
        "lexical_declaration" | "variable_declaration" => {
            if contains_function(node) {
                NodeType::Function
            } else {
                NodeType::Other
            }
        }
        "class_declaration" => NodeType::Class,
        "interface_declaration" => NodeType::Interface,
        "type_alias_declaration" => NodeType::Type,
        "export_statement" => node
            .child_by_field_name("declaration")
            .map(ts_node_type)
            .unwrap_or(NodeType::Other),
        _ => NodeType::Other,
    }
}

fn py_node_type(node: Node) -> NodeType {
    match node.kind() {
        "function_definition" | "async_function_definition" => NodeType::Function,
        "class_definition" => NodeType::Class,
        "decorated_definition" => node
            .child_by_field_name("definition")
            .map(py_node_type)
            .unwrap_or(NodeType::Other),
        _ => NodeType::Other,
    }
}

fn go_node_type(node: Node) -> NodeType {
    match node.kind() {
        "function_declaration" | "method_declaration" => NodeType::Function,
        "type_spec" => {
            if node
                .child_by_field_name("type")
                .is_some_and(|t| t.kind() == "struct_type")
            {
                NodeType::Struct
            } else {
                NodeType::Type
            }
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| c.kind() == "type_spec")
                .map(go_node_type)
                .unwrap_or(NodeType::Type)
        }
        _ => NodeType::Other,
    }
}

fn rust_node_type(node: Node) -> NodeType {
    match node.kind() {
        "function_item" => NodeType::Function,
        "impl_item" => NodeType::Class,
        "struct_item" => NodeType::Struct,
        "enum_item" => NodeType::Type,
        "trait_item" => NodeType::Interface,
        "mod_item" => NodeType::Module,
        "type_item" => NodeType::Type,
        _ => NodeType::Other,
    }
}

/// Language-convention export check for Python/Go/Rust declarations.
/// TypeScript exports are decided by the walker from the export construct.
pub(crate) fn is_convention_export(
    node: Node,
    name: &str,
    language: Language,
    top_level: bool,
) -> bool {
    if !top_level || name == ANONYMOUS {
        return false;
    }
    match language {
        Language::Python => !name.starts_with('_'),
        Language::Go => name.chars().next().is_some_and(|c| c.is_uppercase()),
        Language::Rust => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .any(|c| c.kind() == "visibility_modifier")
        }
        Language::TypeScript | Language::JavaScript => false,
    }
}

fn type_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::TypeScript | Language::JavaScript => &["type_identifier", "predefined_type"],
        Language::Python => &["type", "subscript"],
        Language::Go => &["type_identifier", "qualified_type"],
        Language::Rust => &["type_identifier", "generic_type", "scoped_type_identifier"],
    }
}

/// Collect the type identifiers referenced inside a chunk's subtree,
/// deduplicated in discovery order.
pub(crate) fn referenced_types(node: Node, source: &str, language: Language) -> Vec<String> {
    let kinds = type_kinds(language);
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    collect_types(node, source, kinds, &mut seen, &mut found);
    found
}

fn collect_types(
    node: Node,
    source: &str,
    kinds: &[&str],
    seen: &mut HashSet<String>,
    found: &mut Vec<String>,
) {
    if kinds.contains(&node.kind()) {
        let t = text(node, source).to_string();
        if !t.is_empty() && seen.insert(t.clone()) {
            found.push(t);
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_types(child, source, kinds, seen, found);
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Collect every import specifier string in the file, in document order.
/// These are attached verbatim to every chunk emitted from the file.
pub(crate) fn file_imports(root: Node, source: &str, language: Language) -> Vec<String> {
    let mut specifiers = Vec::new();
    collect_imports(root, source, language, &mut specifiers);
    let mut seen = HashSet::new();
    specifiers.retain(|s: &String| seen.insert(s.clone()));
    specifiers
}

fn collect_imports(node: Node, source: &str, language: Language, out: &mut Vec<String>) {
    match (language, node.kind()) {
        (Language::TypeScript | Language::JavaScript, "import_statement") => {
            if let Some(src) = node.child_by_field_name("source") {
                let path = strip_quotes(text(src, source));
                if !path.is_empty() {
                    out.push(path.to_string());
                }
            }
        }
        (Language::Python, "import_statement") => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => out.push(text(child, source).to_string()),
                    "aliased_import" => {
                        if let Some(name) = field_text(child, "name", source) {
                            out.push(name);
                        }
                    }
                    _ => {}
                }
            }
        }
        (Language::Python, "import_from_statement") => {
            if let Some(module) = field_text(node, "module_name", source) {
                out.push(module);
            }
        }
        (Language::Go, "import_spec") => {
            if let Some(path) = node.child_by_field_name("path") {
                out.push(strip_quotes(text(path, source)).to_string());
            }
        }
        (Language::Rust, "use_declaration") => {
            if let Some(arg) = field_text(node, "argument", source) {
                out.push(arg);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_imports(child, source, language, out);
    }
}
