use std::path::Path;

use serde::{Deserialize, Serialize};

/// The five languages the chunker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Go,
    Rust,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

/// Which tree-sitter grammar to load for a file. `.js`/`.mjs`/`.cjs` parse
/// with the TypeScript grammar and `.jsx` with the TSX variant, so JavaScript
/// sources go through the same tree shapes as TypeScript ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    TypeScript,
    Tsx,
    Python,
    Go,
    Rust,
}

impl Grammar {
    pub fn load(&self) -> tree_sitter::Language {
        match self {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Grammar::Python => tree_sitter_python::LANGUAGE.into(),
            Grammar::Go => tree_sitter_go::LANGUAGE.into(),
            Grammar::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }
}

/// Map a filepath to its language and grammar. Returns `None` for anything
/// outside the supported extension set.
pub fn detect(filepath: &str) -> Option<(Language, Grammar)> {
    let ext = Path::new(filepath)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();

    match ext.as_str() {
        "ts" => Some((Language::TypeScript, Grammar::TypeScript)),
        "tsx" => Some((Language::TypeScript, Grammar::Tsx)),
        "js" | "mjs" | "cjs" => Some((Language::JavaScript, Grammar::TypeScript)),
        "jsx" => Some((Language::JavaScript, Grammar::Tsx)),
        "py" | "pyi" => Some((Language::Python, Grammar::Python)),
        "go" => Some((Language::Go, Grammar::Go)),
        "rs" => Some((Language::Rust, Grammar::Rust)),
        _ => None,
    }
}

/// Extensions the engine will pick up when walking a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "pyi", "go", "rs"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            detect("src/auth.ts"),
            Some((Language::TypeScript, Grammar::TypeScript))
        );
        assert_eq!(
            detect("src/App.tsx"),
            Some((Language::TypeScript, Grammar::Tsx))
        );
        assert_eq!(
            detect("lib/util.mjs"),
            Some((Language::JavaScript, Grammar::TypeScript))
        );
        assert_eq!(
            detect("components/Nav.jsx"),
            Some((Language::JavaScript, Grammar::Tsx))
        );
        assert_eq!(detect("app/main.py"), Some((Language::Python, Grammar::Python)));
        assert_eq!(detect("pkg/server.go"), Some((Language::Go, Grammar::Go)));
        assert_eq!(detect("src/lib.rs"), Some((Language::Rust, Grammar::Rust)));
    }

    #[test]
    fn test_detect_rejects_unknown() {
        assert_eq!(detect("README.md"), None);
        assert_eq!(detect("schema.sql"), None);
        assert_eq!(detect("Makefile"), None);
        assert_eq!(detect("noextension"), None);
    }

    #[test]
    fn test_detect_is_case_insensitive() {
        assert_eq!(detect("Main.TS"), Some((Language::TypeScript, Grammar::TypeScript)));
        assert_eq!(detect("script.PY"), Some((Language::Python, Grammar::Python)));
    }

    #[test]
    fn test_grammars_load() {
        for grammar in [
            Grammar::TypeScript,
            Grammar::Tsx,
            Grammar::Python,
            Grammar::Go,
            Grammar::Rust,
        ] {
            let lang = grammar.load();
            assert!(lang.abi_version() > 0);
        }
    }
}
