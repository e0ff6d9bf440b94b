pub mod language;

mod extract;
mod walker;

pub use language::{Grammar, Language, SUPPORTED_EXTENSIONS, detect};

use std::collections::HashMap;

use tracing::{debug, warn};
use tree_sitter::Parser;

use self::walker::FileContext;
use crate::types::CodeChunk;

/// Multi-language syntactic chunker.
///
/// Parsers are loaded lazily per grammar and reused across files. Parsing is
/// pure (no I/O) and never fails a batch: unsupported extensions, grammar
/// load errors, and parser rejections all yield an empty chunk list.
pub struct Chunker {
    parsers: HashMap<Grammar, Parser>,
}

impl Chunker {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Parse one file into an ordered sequence of chunks.
    pub fn parse_file(&mut self, filepath: &str, content: &str) -> Vec<CodeChunk> {
        let Some((language, grammar)) = language::detect(filepath) else {
            debug!(filepath, "skipping file with unsupported extension");
            return Vec::new();
        };

        let Some(parser) = self.parser_for(grammar) else {
            return Vec::new();
        };

        let Some(tree) = parser.parse(content, None) else {
            debug!(filepath, "parser rejected input");
            return Vec::new();
        };

        let root = tree.root_node();
        let ctx = FileContext {
            filepath,
            language,
            source: content,
            lines: content.lines().collect(),
            imports: extract::file_imports(root, content, language),
        };

        walker::walk(root, &ctx)
    }

    fn parser_for(&mut self, grammar: Grammar) -> Option<&mut Parser> {
        if !self.parsers.contains_key(&grammar) {
            let mut parser = Parser::new();
            if let Err(e) = parser.set_language(&grammar.load()) {
                warn!(?grammar, error = %e, "failed to load grammar");
                return None;
            }
            self.parsers.insert(grammar, parser);
        }
        self.parsers.get_mut(&grammar)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic chunk id from the filepath, line span, and content hash,
/// shaped like a UUID so downstream stores can treat it as an opaque key.
pub(crate) fn chunk_id(filepath: &str, start_line: usize, end_line: usize, content: &str) -> String {
    let file_hash = blake3::hash(filepath.as_bytes());
    let content_hash = blake3::hash(content.as_bytes());
    let combined = format!(
        "{}{:08x}{:08x}{}",
        &file_hash.to_hex()[..16],
        start_line,
        end_line,
        &content_hash.to_hex()[..8]
    );

    format!(
        "{}-{}-{}-{}-{}",
        &combined[0..8],
        &combined[8..12],
        &combined[12..16],
        &combined[16..20],
        &combined[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use pretty_assertions::assert_eq;

    fn parse(filepath: &str, content: &str) -> Vec<CodeChunk> {
        Chunker::new().parse_file(filepath, content)
    }

    fn line_slice(content: &str, start: usize, end: usize) -> String {
        content
            .lines()
            .skip(start - 1)
            .take(end - start + 1)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_unsupported_extension_yields_empty() {
        assert!(parse("README.md", "# hello").is_empty());
        assert!(parse("query.sql", "SELECT 1;").is_empty());
    }

    #[test]
    fn test_empty_file_yields_empty() {
        assert!(parse("src/a.ts", "").is_empty());
    }

    #[test]
    fn test_ts_exported_class_with_methods() {
        let content = r#"import { Database } from './db';

export class AuthService {
  async login(user: string): Promise<Session> {
    return this.db.authenticate(user);
  }

  async logout(session: Session): Promise<void> {
    await this.db.drop(session);
  }
}
"#;
        let chunks = parse("src/auth.ts", content);

        let class_chunk = chunks
            .iter()
            .find(|c| c.name == "AuthService")
            .expect("class chunk");
        assert_eq!(class_chunk.node_type, NodeType::Class);
        assert_eq!(class_chunk.exports, vec!["AuthService".to_string()]);
        assert_eq!(class_chunk.imports, vec!["./db".to_string()]);

        // Recursion into the exported class yields method chunks.
        let methods: Vec<_> = chunks
            .iter()
            .filter(|c| c.node_type == NodeType::Function)
            .map(|c| c.name.as_str())
            .collect();
        assert!(methods.contains(&"login"), "methods: {:?}", methods);
        assert!(methods.contains(&"logout"), "methods: {:?}", methods);

        // The class declaration itself is not emitted twice.
        let auth_count = chunks.iter().filter(|c| c.name == "AuthService").count();
        assert_eq!(auth_count, 1);
    }

    #[test]
    fn test_ts_export_clause_joins_names() {
        let content = "const a = 1;\nconst b = 2;\nexport { a, b };\n";
        let chunks = parse("src/barrel.ts", content);
        let export = chunks
            .iter()
            .find(|c| c.name == "a, b")
            .expect("re-export chunk");
        assert_eq!(export.exports, vec!["a, b".to_string()]);
    }

    #[test]
    fn test_ts_lexical_declaration_consumes_arrow() {
        let content = "const handler = async (req: Request) => {\n  return respond(req);\n};\n";
        let chunks = parse("src/handler.ts", content);

        assert_eq!(chunks.len(), 1, "chunks: {:?}", chunks);
        assert_eq!(chunks[0].name, "handler");
        assert_eq!(chunks[0].node_type, NodeType::Function);
        assert!(chunks[0].types.contains(&"Request".to_string()));
    }

    #[test]
    fn test_ts_plain_const_not_chunked() {
        let content = "const LIMIT = 10;\n";
        assert!(parse("src/consts.ts", content).is_empty());
    }

    #[test]
    fn test_ts_interface_and_type_alias() {
        let content = "interface User {\n  id: string;\n}\n\ntype UserId = string;\n";
        let chunks = parse("src/types.ts", content);

        let iface = chunks.iter().find(|c| c.name == "User").unwrap();
        assert_eq!(iface.node_type, NodeType::Interface);
        assert!(iface.exports.is_empty());

        let alias = chunks.iter().find(|c| c.name == "UserId").unwrap();
        assert_eq!(alias.node_type, NodeType::Type);
    }

    #[test]
    fn test_python_decorated_function() {
        let content = "@app.route(\"/x\")\ndef handler():\n    return 1\n";
        let chunks = parse("app/routes.py", content);

        assert_eq!(chunks.len(), 1, "chunks: {:?}", chunks);
        assert_eq!(chunks[0].name, "handler");
        assert_eq!(chunks[0].node_type, NodeType::Function);
        assert_eq!(chunks[0].exports, vec!["handler".to_string()]);
    }

    #[test]
    fn test_python_underscore_not_exported() {
        let content = "def _internal():\n    pass\n\ndef public():\n    pass\n";
        let chunks = parse("lib/helpers.py", content);

        let internal = chunks.iter().find(|c| c.name == "_internal").unwrap();
        assert!(internal.exports.is_empty());

        let public = chunks.iter().find(|c| c.name == "public").unwrap();
        assert_eq!(public.exports, vec!["public".to_string()]);
    }

    #[test]
    fn test_python_nested_def_not_exported() {
        let content = "def outer():\n    def inner():\n        pass\n    return inner\n";
        let chunks = parse("lib/nest.py", content);

        let inner = chunks.iter().find(|c| c.name == "inner").unwrap();
        assert!(inner.exports.is_empty());
    }

    #[test]
    fn test_python_imports_attached_to_all_chunks() {
        let content = "import os\nfrom pathlib import Path\n\ndef a():\n    pass\n\nclass B:\n    def m(self):\n        pass\n";
        let chunks = parse("lib/mod.py", content);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.imports, vec!["os".to_string(), "pathlib".to_string()]);
        }
    }

    #[test]
    fn test_go_capitalized_exported() {
        let content = "package server\n\nfunc Serve(addr string) error {\n\treturn nil\n}\n\nfunc helper() {}\n\ntype Config struct {\n\tAddr string\n}\n";
        let chunks = parse("pkg/server.go", content);

        let serve = chunks.iter().find(|c| c.name == "Serve").unwrap();
        assert_eq!(serve.node_type, NodeType::Function);
        assert_eq!(serve.exports, vec!["Serve".to_string()]);

        let helper = chunks.iter().find(|c| c.name == "helper").unwrap();
        assert!(helper.exports.is_empty());

        let config = chunks
            .iter()
            .find(|c| c.name == "Config" && c.node_type == NodeType::Struct)
            .expect("struct type_spec chunk");
        assert_eq!(config.exports, vec!["Config".to_string()]);
    }

    #[test]
    fn test_rust_pub_and_impl() {
        let content = "pub struct Store {\n    entries: Vec<Entry>,\n}\n\nimpl Store {\n    pub fn new() -> Self {\n        Self { entries: Vec::new() }\n    }\n}\n\nfn private_helper() {}\n";
        let chunks = parse("src/store.rs", content);

        let store = chunks.iter().find(|c| c.name == "Store").unwrap();
        assert_eq!(store.node_type, NodeType::Struct);
        assert_eq!(store.exports, vec!["Store".to_string()]);

        let imp = chunks.iter().find(|c| c.name == "impl Store").unwrap();
        assert_eq!(imp.node_type, NodeType::Class);
        assert!(imp.exports.is_empty());

        // `new` is pub but nested inside the impl block.
        let new_fn = chunks.iter().find(|c| c.name == "new").unwrap();
        assert!(new_fn.exports.is_empty());

        let private = chunks.iter().find(|c| c.name == "private_helper").unwrap();
        assert!(private.exports.is_empty());
    }

    #[test]
    fn test_rust_types_collected() {
        let content = "fn load(path: PathBuf) -> Result<Vec<Entry>, StoreError> {\n    todo!()\n}\n";
        let chunks = parse("src/load.rs", content);
        let types = &chunks[0].types;
        assert!(types.contains(&"PathBuf".to_string()), "types: {:?}", types);
        assert!(types.contains(&"StoreError".to_string()), "types: {:?}", types);
    }

    #[test]
    fn test_content_matches_line_slice() {
        let content = "import { x } from './b';\n\nexport function first() {\n  return x;\n}\n\nfunction second() {\n  return 2;\n}\n";
        let chunks = parse("src/a.ts", content);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.start_line <= chunk.end_line);
            assert_eq!(
                chunk.content,
                line_slice(content, chunk.start_line, chunk.end_line),
                "content of {} must equal its inclusive line slice",
                chunk.name
            );
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let content = "export function f(a: number): number {\n  return a * 2;\n}\n";
        let first = parse("src/f.ts", content);
        let second = parse("src/f.ts", content);
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_id_depends_on_inputs() {
        let a = chunk_id("src/a.ts", 1, 3, "fn a() {}");
        let b = chunk_id("src/a.ts", 1, 3, "fn a() {}");
        assert_eq!(a, b);
        assert_ne!(a, chunk_id("src/b.ts", 1, 3, "fn a() {}"));
        assert_ne!(a, chunk_id("src/a.ts", 2, 4, "fn a() {}"));
        assert_ne!(a, chunk_id("src/a.ts", 1, 3, "fn b() {}"));
        // UUID shape: 8-4-4-4-12.
        assert_eq!(a.len(), 36);
        assert_eq!(a.split('-').map(str::len).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
    }

    #[test]
    fn test_broken_input_still_yields_chunks_or_empty() {
        // Tree-sitter produces a tree with error nodes; valid declarations
        // around the damage are still chunked.
        let content = "export function good() {\n  return 1;\n}\n\nfunction broken( {\n";
        let chunks = parse("src/broken.ts", content);
        assert!(chunks.iter().any(|c| c.name == "good"));
    }
}
