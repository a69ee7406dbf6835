//! Repository walk with glob ignore rules.
//!
//! A [`Scanner`] is a reusable description of one pass over a tree. Each call
//! to [`Scanner::files`] starts a fresh walk, so the sequence is restartable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};

use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};

pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

pub const DEFAULT_IGNORE: &[&str] = &[
    "*.git/*",
    "*.hg/*",
    "*.svn/*",
    "*.pyc",
    "*__pycache__/*",
    "*.ipynb_checkpoints/*",
    "*.venv/*",
    "*venv/*",
    "*node_modules/*",
    "*target/*",
    "*dist/*",
    "*build/*",
    "*.DS_Store",
    "*.idea/*",
    "*.vscode/*",
    "*.cache/*",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.svg",
    "*.ico",
    "*.pdf",
    "*.zip",
    "*.tar.gz",
    "*.jar",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.exe",
    "*.o",
    "*.a",
    "*.class",
    "*.wasm",
    "*.lock",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled ignore globs. `*` crosses `/`, like shell `fnmatch`.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    patterns: Vec<Pattern>,
}

impl IgnoreSet {
    /// # Errors
    ///
    /// Returns [`IndexError::Pattern`] for the first pattern that is not a valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|e| IndexError::Pattern {
                    pattern: p.to_owned(),
                    reason: e.msg.to_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Default set extended with `extra`.
    ///
    /// # Errors
    ///
    /// Returns an error if any extra pattern is invalid.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let mut set = Self::default();
        set.patterns.extend(Self::new(extra)?.patterns);
        Ok(set)
    }

    /// Whether a repository-relative path is excluded. Directories are matched
    /// with a trailing `/` so `dir/*` patterns prune the whole subtree.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        if is_dir {
            let with_slash = format!("{rel_path}/");
            self.patterns
                .iter()
                .any(|p| p.matches_with(&with_slash, MATCH_OPTIONS))
        } else {
            self.patterns
                .iter()
                .any(|p| p.matches_with(rel_path, MATCH_OPTIONS))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        let patterns = DEFAULT_IGNORE
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        Self { patterns }
    }
}

/// One readable text file from a scan pass.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Repository-relative, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub language: Option<Lang>,
    pub content: String,
    /// blake3 hex digest of the raw bytes.
    pub content_hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotText,
    TooLarge { size: u64, limit: u64 },
    Unreadable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotText => f.write_str("not a text file"),
            Self::TooLarge { size, limit } => write!(f, "{size} bytes exceeds limit of {limit}"),
            Self::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

/// A file the scanner saw but could not use. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub ignore: Arc<IgnoreSet>,
    pub respect_gitignore: bool,
    pub max_file_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignore: Arc::new(IgnoreSet::default()),
            respect_gitignore: true,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
}

impl Scanner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn ignore_set(&self) -> &IgnoreSet {
        &self.options.ignore
    }

    /// Lazily walk the tree. Ignored paths are filtered before any content is
    /// read and ignored directories are never descended into.
    pub fn files(&self) -> impl Iterator<Item = std::result::Result<SourceFile, SkippedFile>> + '_ {
        let root = self.root.clone();
        let ignore = Arc::clone(&self.options.ignore);
        let gitignore = self.options.respect_gitignore;

        ignore::WalkBuilder::new(&self.root)
            .hidden(false)
            .parents(gitignore)
            .git_ignore(gitignore)
            .git_global(gitignore)
            .git_exclude(gitignore)
            .require_git(false)
            .ignore(gitignore)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(rel) = relative_path(&root, entry.path()) else {
                    return true;
                };
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !ignore.is_ignored(&rel, is_dir)
            })
            .build()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                    Some(self.read_entry(entry.path()))
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("scan error: {e}");
                    None
                }
            })
    }

    /// Read a single file the same way a full pass would.
    ///
    /// # Errors
    ///
    /// Returns the skip record when the file is too large, not text, or unreadable.
    pub fn read_file(&self, abs_path: &Path) -> std::result::Result<SourceFile, SkippedFile> {
        self.read_entry(abs_path)
    }

    /// Whether `abs_path` would be excluded by the ignore set.
    #[must_use]
    pub fn is_ignored(&self, abs_path: &Path) -> bool {
        let Some(rel) = relative_path(&self.root, abs_path) else {
            return true;
        };
        let mut prefix = String::new();
        for component in rel.split('/') {
            if !prefix.is_empty() {
                if self.options.ignore.is_ignored(&prefix, true) {
                    return true;
                }
                prefix.push('/');
            }
            prefix.push_str(component);
        }
        self.options.ignore.is_ignored(&rel, false)
    }

    fn read_entry(&self, abs_path: &Path) -> std::result::Result<SourceFile, SkippedFile> {
        let path = relative_path(&self.root, abs_path)
            .unwrap_or_else(|| abs_path.to_string_lossy().into_owned());
        let skip = |reason: SkipReason| {
            tracing::warn!(file = %path, %reason, "skipping file");
            SkippedFile {
                path: path.clone(),
                reason,
            }
        };

        let size = std::fs::metadata(abs_path)
            .map_err(|e| skip(SkipReason::Unreadable(e.to_string())))?
            .len();
        if size > self.options.max_file_bytes {
            return Err(skip(SkipReason::TooLarge {
                size,
                limit: self.options.max_file_bytes,
            }));
        }

        let bytes =
            std::fs::read(abs_path).map_err(|e| skip(SkipReason::Unreadable(e.to_string())))?;
        if bytes.contains(&0) {
            return Err(skip(SkipReason::NotText));
        }
        let content_hash = blake3::hash(&bytes).to_hex().to_string();
        let content = String::from_utf8(bytes).map_err(|_| skip(SkipReason::NotText))?;

        Ok(SourceFile {
            language: detect_language(abs_path),
            abs_path: abs_path.to_path_buf(),
            path,
            content,
            content_hash,
            size,
        })
    }
}

/// Repository-relative `/`-separated path, or `None` if `path` is outside `root`.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn scan_paths(scanner: &Scanner) -> Vec<String> {
        scanner
            .files()
            .filter_map(std::result::Result::ok)
            .map(|f| f.path)
            .collect()
    }

    #[test]
    fn default_patterns_match_vcs_and_deps() {
        let set = IgnoreSet::default();
        assert!(set.is_ignored(".git/HEAD", false));
        assert!(set.is_ignored("web/node_modules/react/index.js", false));
        assert!(set.is_ignored("pkg/__pycache__/mod.cpython-312.pyc", false));
        assert!(set.is_ignored("assets/logo.png", false));
        assert!(!set.is_ignored("src/main.rs", false));
    }

    #[test]
    fn directories_match_with_trailing_slash() {
        let set = IgnoreSet::default();
        assert!(set.is_ignored("node_modules", true));
        assert!(set.is_ignored("frontend/node_modules", true));
        assert!(!set.is_ignored("src", true));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = IgnoreSet::new(&["[unclosed"]).unwrap_err();
        assert!(matches!(err, IndexError::Pattern { .. }));
    }

    #[test]
    fn extra_patterns_extend_defaults() {
        let set = IgnoreSet::with_extra(&["*.generated.rs"]).unwrap();
        assert_eq!(set.len(), DEFAULT_IGNORE.len() + 1);
        assert!(set.is_ignored("src/api.generated.rs", false));
        assert!(set.is_ignored(".git/config", false));
    }

    #[test]
    fn walk_yields_sorted_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "file2.js", b"let a = 1;");
        write(dir.path(), "file1.py", b"x = 1");
        write(dir.path(), "subdir/file3.py", b"y = 2");
        write(dir.path(), "subdir/nested/file4.txt", b"notes");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert_eq!(
            scan_paths(&scanner),
            vec![
                "file1.py",
                "file2.js",
                "subdir/file3.py",
                "subdir/nested/file4.txt"
            ]
        );
    }

    #[test]
    fn walk_prunes_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/lib.rs", b"pub fn a() {}");
        write(dir.path(), ".git/HEAD", b"ref: refs/heads/main");
        write(dir.path(), "node_modules/pkg/index.js", b"module.exports = 1;");
        write(dir.path(), "logo.png", b"not really a png");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert_eq!(scan_paths(&scanner), vec!["src/lib.rs"]);
    }

    #[test]
    fn walk_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"a = 1");
        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert_eq!(scan_paths(&scanner), scan_paths(&scanner));
    }

    #[test]
    fn binary_and_invalid_utf8_are_reported_not_yielded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blob.bin", &[0x7f, 0x45, 0x00, 0x01]);
        write(dir.path(), "latin1.txt", &[0x63, 0x61, 0x66, 0xe9]);
        write(dir.path(), "ok.py", b"print('hi')");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let (ok, skipped): (Vec<_>, Vec<_>) = scanner.files().partition(std::result::Result::is_ok);
        assert_eq!(ok.len(), 1);
        assert_eq!(skipped.len(), 2);
        for skip in skipped {
            assert_eq!(skip.unwrap_err().reason, SkipReason::NotText);
        }
    }

    #[test]
    fn oversized_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.py", &[b'x'; 64]);
        let options = ScanOptions {
            max_file_bytes: 16,
            ..ScanOptions::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        let results: Vec<_> = scanner.files().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].as_ref().unwrap_err().reason,
            SkipReason::TooLarge { size: 64, limit: 16 }
        ));
    }

    #[test]
    fn gitignore_is_honoured_without_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", b"secret.py\n");
        write(dir.path(), "secret.py", b"token = 1");
        write(dir.path(), "public.py", b"name = 2");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let paths = scan_paths(&scanner);
        assert!(paths.contains(&"public.py".to_owned()));
        assert!(!paths.contains(&"secret.py".to_owned()));

        let options = ScanOptions {
            respect_gitignore: false,
            ..ScanOptions::default()
        };
        let paths = scan_paths(&Scanner::new(dir.path(), options));
        assert!(paths.contains(&"secret.py".to_owned()));
    }

    #[test]
    fn source_file_carries_language_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.rs", b"fn main() {}");
        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let file = scanner.files().next().unwrap().unwrap();
        assert_eq!(file.language, Some(Lang::Rust));
        assert_eq!(file.size, 12);
        assert_eq!(file.content_hash, blake3::hash(b"fn main() {}").to_hex().to_string());
    }

    #[test]
    fn is_ignored_checks_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert!(scanner.is_ignored(&dir.path().join("node_modules/a/b.js")));
        assert!(!scanner.is_ignored(&dir.path().join("src/b.js")));
        assert!(scanner.is_ignored(Path::new("/elsewhere/file.rs")));
    }

    #[test]
    fn relative_path_normalizes() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/./src/lib.rs")).as_deref(),
            Some("src/lib.rs")
        );
        assert_eq!(relative_path(root, Path::new("/repo")), None);
        assert_eq!(relative_path(root, Path::new("/other/x")), None);
    }
}
