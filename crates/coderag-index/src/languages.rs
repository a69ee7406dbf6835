//! Extension-based language classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Rust,
    Lua,
    Scala,
    Bash,
    Html,
    Css,
    Scss,
    Sql,
    Markdown,
    Json,
    Xml,
    Yaml,
    Toml,
}

impl Lang {
    pub const ALL: [Self; 25] = [
        Self::Python,
        Self::JavaScript,
        Self::TypeScript,
        Self::Java,
        Self::C,
        Self::Cpp,
        Self::CSharp,
        Self::Go,
        Self::Ruby,
        Self::Php,
        Self::Swift,
        Self::Kotlin,
        Self::Rust,
        Self::Lua,
        Self::Scala,
        Self::Bash,
        Self::Html,
        Self::Css,
        Self::Scss,
        Self::Sql,
        Self::Markdown,
        Self::Json,
        Self::Xml,
        Self::Yaml,
        Self::Toml,
    ];

    /// Identifier stored in the index and accepted in filters.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Rust => "rust",
            Self::Lua => "lua",
            Self::Scala => "scala",
            Self::Bash => "bash",
            Self::Html => "html",
            Self::Css => "css",
            Self::Scss => "scss",
            Self::Sql => "sql",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.id() == id)
    }

    /// Tree-sitter grammar for the syntax-aware boundary strategy.
    #[cfg(feature = "syntax")]
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Top-level AST node kinds that start a `function` chunk.
    #[cfg(feature = "syntax")]
    #[must_use]
    pub fn entity_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "mod_item",
                "macro_definition",
            ],
            Self::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            Self::JavaScript | Self::TypeScript => &[
                "function_declaration",
                "class_declaration",
                "export_statement",
                "lexical_declaration",
            ],
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            _ => &[],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension. Matching ignores ASCII case.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "java" => Some(Lang::Java),
        "c" | "h" => Some(Lang::C),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Some(Lang::Cpp),
        "cs" => Some(Lang::CSharp),
        "go" => Some(Lang::Go),
        "rb" => Some(Lang::Ruby),
        "php" => Some(Lang::Php),
        "swift" => Some(Lang::Swift),
        "kt" | "kts" => Some(Lang::Kotlin),
        "rs" => Some(Lang::Rust),
        "lua" => Some(Lang::Lua),
        "scala" => Some(Lang::Scala),
        "sh" | "bash" | "zsh" => Some(Lang::Bash),
        "html" | "htm" => Some(Lang::Html),
        "css" => Some(Lang::Css),
        "scss" => Some(Lang::Scss),
        "sql" => Some(Lang::Sql),
        "md" | "markdown" => Some(Lang::Markdown),
        "json" | "jsonc" => Some(Lang::Json),
        "xml" => Some(Lang::Xml),
        "yaml" | "yml" => Some(Lang::Yaml),
        "toml" => Some(Lang::Toml),
        _ => None,
    }
}
