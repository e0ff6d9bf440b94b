//! Depth-first walk that turns chunkable syntax nodes into `CodeChunk`s.
//!
//! Container rules: an emitted `lexical_declaration` suppresses everything in
//! its subtree (the arrow function it binds is already covered), while an
//! emitted `export_statement` suppresses only its directly wrapped declaration
//! so the walk still descends into class bodies for method chunks.

use tree_sitter::Node;

use super::extract::{self, ANONYMOUS};
use super::language::Language;
use crate::types::{CodeChunk, NodeType};

pub(crate) struct FileContext<'a> {
    pub filepath: &'a str,
    pub language: Language,
    pub source: &'a str,
    pub lines: Vec<&'a str>,
    pub imports: Vec<String>,
}

pub(crate) fn walk(root: Node, ctx: &FileContext) -> Vec<CodeChunk> {
    let mut chunks = Vec::new();
    match ctx.language {
        Language::TypeScript | Language::JavaScript => walk_ts(root, ctx, &mut chunks),
        Language::Python => walk_py(root, ctx, &mut chunks),
        Language::Go => walk_go(root, ctx, &mut chunks),
        Language::Rust => walk_rust(root, ctx, &mut chunks),
    }
    chunks
}

fn emit(node: Node, ctx: &FileContext, node_type: NodeType, name: String, exports: Vec<String>, out: &mut Vec<CodeChunk>) {
    let start_row = node.start_position().row;
    let end_row = node.end_position().row.min(ctx.lines.len().saturating_sub(1));
    if ctx.lines.is_empty() {
        return;
    }
    let content = ctx.lines[start_row..=end_row].join("\n");
    let start_line = start_row + 1;
    let end_line = end_row + 1;

    out.push(CodeChunk {
        id: super::chunk_id(ctx.filepath, start_line, end_line, &content),
        filepath: ctx.filepath.to_string(),
        start_line,
        end_line,
        node_type,
        name,
        language: ctx.language.as_str().to_string(),
        content,
        imports: ctx.imports.clone(),
        exports,
        types: extract::referenced_types(node, ctx.source, ctx.language),
    });
}

fn recurse<'tree, F: FnMut(Node<'tree>)>(node: Node<'tree>, mut f: F) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        f(child);
    }
}

// ---------------------------------------------------------------------------
// TypeScript / JavaScript
// ---------------------------------------------------------------------------

const TS_CHUNKABLE: &[&str] = &[
    "function_declaration",
    "arrow_function",
    "method_definition",
    "class_declaration",
    "interface_declaration",
    "type_alias_declaration",
];

fn walk_ts(node: Node, ctx: &FileContext, out: &mut Vec<CodeChunk>) {
    match node.kind() {
        "export_statement" => {
            let name = extract::node_name(node, ctx.source, ctx.language);
            let exports = if name == ANONYMOUS { vec![] } else { vec![name.clone()] };
            emit(node, ctx, extract::node_type(node, ctx.language), name, exports, out);

            // Descend past the wrapped declaration without re-emitting it; a
            // function-bearing lexical declaration is consumed whole.
            if let Some(decl) = node.child_by_field_name("declaration")
                && !matches!(decl.kind(), "lexical_declaration" | "variable_declaration")
            {
                recurse(decl, |child| walk_ts(child, ctx, out));
            }
        }
        "lexical_declaration" => {
            if extract::contains_function(node) {
                let name = extract::node_name(node, ctx.source, ctx.language);
                emit(node, ctx, NodeType::Function, name, vec![], out);
            } else {
                recurse(node, |child| walk_ts(child, ctx, out));
            }
        }
        kind if TS_CHUNKABLE.contains(&kind) => {
            let name = extract::node_name(node, ctx.source, ctx.language);
            emit(node, ctx, extract::node_type(node, ctx.language), name, vec![], out);
            recurse(node, |child| walk_ts(child, ctx, out));
        }
        _ => recurse(node, |child| walk_ts(child, ctx, out)),
    }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn py_top_level(node: Node) -> bool {
    node.parent().is_none_or(|p| p.kind() == "module")
}

fn walk_py(node: Node, ctx: &FileContext, out: &mut Vec<CodeChunk>) {
    match node.kind() {
        "decorated_definition" => {
            let name = extract::node_name(node, ctx.source, ctx.language);
            let exported =
                extract::is_convention_export(node, &name, ctx.language, py_top_level(node));
            let exports = if exported { vec![name.clone()] } else { vec![] };
            emit(node, ctx, extract::node_type(node, ctx.language), name, exports, out);

            if let Some(def) = node.child_by_field_name("definition") {
                recurse(def, |child| walk_py(child, ctx, out));
            }
        }
        "function_definition" | "async_function_definition" | "class_definition" => {
            let name = extract::node_name(node, ctx.source, ctx.language);
            let exported =
                extract::is_convention_export(node, &name, ctx.language, py_top_level(node));
            let exports = if exported { vec![name.clone()] } else { vec![] };
            emit(node, ctx, extract::node_type(node, ctx.language), name, exports, out);
            recurse(node, |child| walk_py(child, ctx, out));
        }
        _ => recurse(node, |child| walk_py(child, ctx, out)),
    }
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn go_top_level(node: Node) -> bool {
    match node.parent() {
        None => true,
        Some(p) if p.kind() == "source_file" => true,
        // `type_spec` sits inside a `type_declaration` at the top level.
        Some(p) if p.kind() == "type_declaration" => go_top_level(p),
        _ => false,
    }
}

fn walk_go(node: Node, ctx: &FileContext, out: &mut Vec<CodeChunk>) {
    match node.kind() {
        "function_declaration" | "method_declaration" | "type_declaration" | "type_spec" => {
            let name = extract::node_name(node, ctx.source, ctx.language);
            let exported =
                extract::is_convention_export(node, &name, ctx.language, go_top_level(node));
            let exports = if exported { vec![name.clone()] } else { vec![] };
            emit(node, ctx, extract::node_type(node, ctx.language), name, exports, out);
            recurse(node, |child| walk_go(child, ctx, out));
        }
        _ => recurse(node, |child| walk_go(child, ctx, out)),
    }
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

const RUST_CHUNKABLE: &[&str] = &[
    "function_item",
    "impl_item",
    "struct_item",
    "enum_item",
    "trait_item",
    "mod_item",
    "type_item",
];

fn rust_top_level(node: Node) -> bool {
    node.parent().is_none_or(|p| p.kind() == "source_file")
}

fn walk_rust(node: Node, ctx: &FileContext, out: &mut Vec<CodeChunk>) {
    if RUST_CHUNKABLE.contains(&node.kind()) {
        let name = extract::node_name(node, ctx.source, ctx.language);
        let exported =
            extract::is_convention_export(node, &name, ctx.language, rust_top_level(node));
        let exports = if exported { vec![name.clone()] } else { vec![] };
        emit(node, ctx, extract::node_type(node, ctx.language), name, exports, out);
    }
    recurse(node, |child| walk_rust(child, ctx, out));
}
