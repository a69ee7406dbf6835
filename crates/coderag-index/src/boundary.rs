//! Per-language detection of top-level definition boundaries.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::languages::Lang;

/// Byte offset where a definition starts, plus its name when one was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub offset: usize,
    pub name: Option<String>,
}

pub trait BoundaryStrategy: Send + Sync {
    /// Boundaries in ascending offset order, without duplicates.
    fn boundaries(&self, source: &str) -> Vec<Boundary>;
}

/// Multi-line regex whose matches start definitions. The first capture group
/// that participates in a match is taken as the definition name.
#[derive(Debug, Clone)]
pub struct RegexStrategy {
    pattern: Regex,
    rejected_names: &'static [&'static str],
}

impl RegexStrategy {
    /// # Errors
    ///
    /// Returns an error if `pattern` does not compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            rejected_names: &[],
        })
    }

    /// Drop matches whose captured name is one of `names`.
    #[must_use]
    pub fn rejecting(mut self, names: &'static [&'static str]) -> Self {
        self.rejected_names = names;
        self
    }
}

impl BoundaryStrategy for RegexStrategy {
    fn boundaries(&self, source: &str) -> Vec<Boundary> {
        let mut out: Vec<Boundary> = Vec::new();
        for caps in self.pattern.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if out.last().is_some_and(|b| b.offset == whole.start()) {
                continue;
            }
            let name = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().to_owned());
            if name
                .as_deref()
                .is_some_and(|n| self.rejected_names.contains(&n))
            {
                continue;
            }
            out.push(Boundary {
                offset: whole.start(),
                name,
            });
        }
        out
    }
}

const PYTHON: &str = r"(?m)^(?:@[^\n]*\n)*(?:async[ \t]+)?(?:def|class)[ \t]+(\w+)";
const RUST: &str = r#"(?m)^(?:(?:#\[|///)[^\n]*\n)*(?:pub(?:\([^)\n]*\))?[ \t]+)?(?:(?:async|const|unsafe|extern(?:[ \t]+"[^"\n]*")?)[ \t]+)*(?:fn|struct|enum|trait|union|mod|macro_rules!|impl(?:<[^>\n]*>)?)[ \t]+(\w+)"#;
const JAVASCRIPT: &str = r"(?m)^(?:export[ \t]+(?:default[ \t]+)?)?(?:(?:async[ \t]+)?function\*?[ \t]*([\w$]+)|class[ \t]+([\w$]+)|(?:const|let|var)[ \t]+([\w$]+)[ \t]*=[ \t]*(?:async[ \t]*)?(?:\([^)\n]*\)|[\w$]+)[ \t]*=>)";
const TYPESCRIPT: &str = r"(?m)^(?:export[ \t]+(?:default[ \t]+)?)?(?:declare[ \t]+)?(?:(?:async[ \t]+)?function\*?[ \t]*([\w$]+)|(?:abstract[ \t]+)?class[ \t]+([\w$]+)|interface[ \t]+([\w$]+)|type[ \t]+([\w$]+)[ \t]*(?:<[^>\n]*>)?[ \t]*=|(?:const[ \t]+)?enum[ \t]+([\w$]+)|(?:const|let|var)[ \t]+([\w$]+)[ \t]*(?::[^=\n]+)?=[ \t]*(?:async[ \t]*)?(?:\([^)\n]*\)|[\w$]+)[ \t]*(?::[^=\n]+)?=>)";
const GO: &str = r"(?m)^(?:func(?:[ \t]*\([^)\n]*\))?[ \t]+(\w+)|type[ \t]+(\w+))";
const JAVA: &str = r"(?m)^[ \t]*(?:@\w+(?:\([^)\n]*\))?[ \t]*\n[ \t]*)*(?:(?:public|private|protected|static|final|abstract|sealed|synchronized|native|default)[ \t]+)*(?:(?:class|interface|enum|record)[ \t]+(\w+)|[\w<>\[\],.?]+(?:[ \t]+[\w<>\[\],.?]+)*[ \t]+(\w+)[ \t]*\([^;\n]*$)";
const CSHARP: &str = r"(?m)^[ \t]*(?:\[[^\n]*\][ \t]*\n[ \t]*)*(?:(?:public|private|protected|internal|static|sealed|abstract|virtual|override|async|partial|readonly|unsafe)[ \t]+)*(?:(?:class|interface|struct|enum|record|namespace)[ \t]+([\w.]+)|[\w<>\[\],.?]+[ \t]+(\w+)[ \t]*(?:<[^>\n]*>)?[ \t]*\([^;\n]*$)";
const KOTLIN: &str = r"(?m)^[ \t]*(?:(?:public|private|internal|protected|override|suspend|inline|open|data|sealed|abstract|enum|annotation|inner)[ \t]+)*(?:fun|class|object|interface)[ \t]+(?:<[^>\n]*>[ \t]*)?(?:[\w.]+\.)?(\w+)";
const SWIFT: &str = r"(?m)^[ \t]*(?:@\w+[ \t]+)*(?:(?:public|private|internal|fileprivate|open|static|final|override|mutating|class)[ \t]+)*(?:func|class|struct|enum|protocol|extension|actor)[ \t]+(\w+)";
const C: &str = r"(?m)^(?:(?:typedef[ \t]+)?(?:struct|union|enum)[ \t]+(\w+)[ \t]*\{?[ \t]*$|(?:[\w*]+[ \t]+)+\**(\w+)[ \t]*\([^;\n]*$)";
const CPP: &str = r"(?m)^(?:template[ \t]*<[^\n]*>[ \t]*\n)?(?:(?:class|struct|union|enum(?:[ \t]+class)?|namespace)[ \t]+(\w+)[^;\n]*$|(?:[\w:*&<>,]+[ \t]+)+[*&]*([\w:~]+)[ \t]*\([^;\n]*$)";
const RUBY: &str = r"(?m)^[ \t]*(?:def|class|module)[ \t]+([\w.:?!=]+)";
const PHP: &str = r"(?m)^[ \t]*(?:(?:public|private|protected|static|abstract|final|readonly)[ \t]+)*(?:function|class|interface|trait|enum)[ \t]+&?(\w+)";
const LUA: &str = r"(?m)^(?:local[ \t]+)?function[ \t]+([\w.:]+)";
const SCALA: &str = r"(?m)^[ \t]*(?:(?:private|protected|override|final|implicit|case|sealed|abstract|lazy)[ \t]+)*(?:def|class|object|trait|enum)[ \t]+(\w+)";
const BASH: &str = r"(?m)^(?:function[ \t]+([\w-]+)|([\w-]+)[ \t]*\(\)[ \t]*\{?)";

/// Statement keywords the C-family method patterns would otherwise take for names.
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "switch", "catch", "return", "new", "throw",
    "sizeof", "using", "lock", "delete",
];

const PATTERNS: &[(Lang, &str, &[&str])] = &[
    (Lang::Python, PYTHON, &[]),
    (Lang::Rust, RUST, &[]),
    (Lang::JavaScript, JAVASCRIPT, &[]),
    (Lang::TypeScript, TYPESCRIPT, &[]),
    (Lang::Go, GO, &[]),
    (Lang::Java, JAVA, CONTROL_KEYWORDS),
    (Lang::CSharp, CSHARP, CONTROL_KEYWORDS),
    (Lang::Kotlin, KOTLIN, &[]),
    (Lang::Swift, SWIFT, &[]),
    (Lang::C, C, CONTROL_KEYWORDS),
    (Lang::Cpp, CPP, CONTROL_KEYWORDS),
    (Lang::Ruby, RUBY, &[]),
    (Lang::Php, PHP, &[]),
    (Lang::Lua, LUA, &[]),
    (Lang::Scala, SCALA, &[]),
    (Lang::Bash, BASH, &[]),
];

static REGEX_STRATEGIES: LazyLock<Vec<(Lang, Arc<RegexStrategy>)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(lang, pattern, rejected)| match RegexStrategy::new(pattern) {
            Ok(strategy) => Some((*lang, Arc::new(strategy.rejecting(*rejected)))),
            Err(e) => {
                tracing::error!(language = %lang, "boundary pattern failed to compile: {e}");
                None
            }
        })
        .collect()
});

/// Language to strategy lookup. Languages without an entry fall back to
/// sliding windows in the chunker.
#[derive(Clone, Default)]
pub struct BoundaryRegistry {
    strategies: HashMap<Lang, Arc<dyn BoundaryStrategy>>,
}

impl std::fmt::Debug for BoundaryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut langs: Vec<_> = self.strategies.keys().map(|l| l.id()).collect();
        langs.sort_unstable();
        f.debug_struct("BoundaryRegistry")
            .field("languages", &langs)
            .finish()
    }
}

impl BoundaryRegistry {
    /// Regex strategies for every built-in language, with syntax-tree
    /// strategies layered on top when the `syntax` feature is enabled.
    #[must_use]
    #[cfg_attr(not(feature = "syntax"), allow(unused_mut))]
    pub fn with_defaults() -> Self {
        let mut registry = Self::regex_only();
        #[cfg(feature = "syntax")]
        for lang in Lang::ALL {
            if lang.grammar().is_some() {
                registry.register(lang, Arc::new(crate::syntax::SyntaxStrategy::new(lang)));
            }
        }
        registry
    }

    #[must_use]
    pub fn regex_only() -> Self {
        let mut registry = Self::default();
        for (lang, strategy) in REGEX_STRATEGIES.iter() {
            registry.register(*lang, Arc::clone(strategy) as Arc<dyn BoundaryStrategy>);
        }
        registry
    }

    pub fn register(&mut self, lang: Lang, strategy: Arc<dyn BoundaryStrategy>) {
        self.strategies.insert(lang, strategy);
    }

    #[must_use]
    pub fn get(&self, lang: Lang) -> Option<&dyn BoundaryStrategy> {
        self.strategies.get(&lang).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, lang: Lang) -> bool {
        self.strategies.contains_key(&lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(lang: Lang, source: &str) -> Vec<Option<String>> {
        BoundaryRegistry::regex_only()
            .get(lang)
            .unwrap()
            .boundaries(source)
            .into_iter()
            .map(|b| b.name)
            .collect()
    }

    fn some(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|n| Some((*n).to_owned())).collect()
    }

    #[test]
    fn every_builtin_pattern_compiles() {
        assert_eq!(REGEX_STRATEGIES.len(), PATTERNS.len());
    }

    #[test]
    fn python_top_level_defs_and_classes() {
        let src = "import os\n\ndef fibonacci(n):\n    return n\n\nclass Tree:\n    def grow(self):\n        pass\n";
        assert_eq!(names(Lang::Python, src), some(&["fibonacci", "Tree"]));
    }

    #[test]
    fn python_decorator_belongs_to_definition() {
        let src = "x = 1\n@cache\n@trace(level=2)\ndef compute():\n    pass\n";
        let boundaries = BoundaryRegistry::regex_only()
            .get(Lang::Python)
            .unwrap()
            .boundaries(src);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(&src[boundaries[0].offset..boundaries[0].offset + 6], "@cache");
        assert_eq!(boundaries[0].name.as_deref(), Some("compute"));
    }

    #[test]
    fn python_async_def() {
        assert_eq!(
            names(Lang::Python, "async def fetch(url):\n    pass\n"),
            some(&["fetch"])
        );
    }

    #[test]
    fn rust_items_with_attributes() {
        let src = "use std::io;\n\n#[derive(Debug)]\npub struct Point {\n    x: i32,\n}\n\nimpl Point {\n    fn new() -> Self { todo!() }\n}\n\npub(crate) async fn run() {}\n";
        assert_eq!(names(Lang::Rust, src), some(&["Point", "Point", "run"]));
        let boundaries = BoundaryRegistry::regex_only()
            .get(Lang::Rust)
            .unwrap()
            .boundaries(src);
        assert!(src[boundaries[0].offset..].starts_with("#[derive(Debug)]"));
    }

    #[test]
    fn javascript_functions_classes_and_arrows() {
        let src = "const x = 1;\nfunction add(a, b) {\n  return a + b;\n}\nexport class Stack {}\nexport const mul = (a, b) => a * b;\n";
        assert_eq!(names(Lang::JavaScript, src), some(&["add", "Stack", "mul"]));
    }

    #[test]
    fn typescript_interfaces_and_types() {
        let src = "export interface User {\n  id: number;\n}\ntype Id = string;\nexport async function load(id: Id) {}\n";
        assert_eq!(names(Lang::TypeScript, src), some(&["User", "Id", "load"]));
    }

    #[test]
    fn go_funcs_methods_and_types() {
        let src = "package main\n\ntype Server struct{}\n\nfunc (s *Server) Start() error {\n\treturn nil\n}\n\nfunc main() {}\n";
        assert_eq!(names(Lang::Go, src), some(&["Server", "Start", "main"]));
    }

    #[test]
    fn java_class_and_methods() {
        let src = "package a;\n\npublic class Calc {\n    public int add(int a, int b) {\n        return a + b;\n    }\n}\n";
        assert_eq!(names(Lang::Java, src), some(&["Calc", "add"]));
    }

    #[test]
    fn java_control_flow_is_not_a_method() {
        let src = "class A {\n    void run(boolean b) {\n        else if (b) {\n        }\n    }\n}\n";
        assert_eq!(names(Lang::Java, src), some(&["A", "run"]));
    }

    #[test]
    fn c_functions_skip_prototypes() {
        let src = "#include <stdio.h>\nint helper(int x);\n\nint main(void) {\n    return 0;\n}\n";
        assert_eq!(names(Lang::C, src), some(&["main"]));
    }

    #[test]
    fn ruby_and_bash() {
        assert_eq!(
            names(Lang::Ruby, "class Dog\n  def bark\n  end\nend\n"),
            some(&["Dog", "bark"])
        );
        assert_eq!(
            names(Lang::Bash, "#!/bin/sh\nbuild() {\n  make\n}\nfunction clean {\n  rm -rf out\n}\n"),
            some(&["build", "clean"])
        );
    }

    #[test]
    fn markup_languages_have_no_strategy() {
        let registry = BoundaryRegistry::regex_only();
        assert!(!registry.contains(Lang::Markdown));
        assert!(!registry.contains(Lang::Json));
        assert!(registry.contains(Lang::Python));
    }

    #[test]
    fn custom_strategy_replaces_builtin() {
        struct Nothing;
        impl BoundaryStrategy for Nothing {
            fn boundaries(&self, _source: &str) -> Vec<Boundary> {
                Vec::new()
            }
        }
        let mut registry = BoundaryRegistry::regex_only();
        registry.register(Lang::Python, Arc::new(Nothing));
        assert!(registry.get(Lang::Python).unwrap().boundaries("def a():\n").is_empty());
    }
}
