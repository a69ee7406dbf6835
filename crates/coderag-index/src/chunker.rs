//! Boundary-aware chunking with a line-based sliding-window fallback.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryRegistry;
use crate::languages::Lang;
use crate::scanner::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "size-based-fragment")]
    SizeBasedFragment,
    #[serde(rename = "function-part")]
    FunctionPart,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::SizeBasedFragment => "size-based-fragment",
            Self::FunctionPart => "function-part",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "size-based-fragment" => Some(Self::SizeBasedFragment),
            "function-part" => Some(Self::FunctionPart),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous slice of a source file. `text == content[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub file_path: String,
    pub language: Option<Lang>,
    pub kind: ChunkKind,
    pub start: usize,
    pub end: usize,
    /// 1-based, inclusive.
    pub line_range: (usize, usize),
    pub name: Option<String>,
    pub text: String,
    pub content_hash: String,
}

impl CodeChunk {
    /// Stable identity within a collection.
    #[must_use]
    pub fn id(&self) -> String {
        entry_id(&self.file_path, self.kind, self.start)
    }
}

#[must_use]
pub fn entry_id(file_path: &str, kind: ChunkKind, start: usize) -> String {
    format!("{file_path}#{}@{start}", kind.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkerConfig {
    /// Maximum chunk length in bytes. Only a single longer line may exceed it.
    pub max_chunk_size: usize,
    /// Fraction of the previous window's lines repeated at the start of the next.
    pub overlap_ratio: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1500,
            overlap_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
    registry: Arc<BoundaryRegistry>,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig, registry: Arc<BoundaryRegistry>) -> Self {
        Self { config, registry }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    #[must_use]
    pub fn chunk(&self, file: &SourceFile) -> Vec<CodeChunk> {
        self.chunk_source(&file.path, file.language, &file.content)
    }

    /// Split `content` into chunks in file order. Deterministic.
    #[must_use]
    pub fn chunk_source(&self, path: &str, language: Option<Lang>, content: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let mut ctx = Ctx {
            path,
            language,
            content,
            lines: LineIndex::new(content),
            config: &self.config,
            out: Vec::new(),
        };

        let boundaries = language
            .and_then(|lang| self.registry.get(lang))
            .map(|strategy| strategy.boundaries(content))
            .unwrap_or_default();

        let Some(first) = boundaries.first() else {
            ctx.window(0..content.len(), ChunkKind::SizeBasedFragment, None);
            return ctx.out;
        };

        if first.offset > 0 {
            ctx.window(0..first.offset, ChunkKind::SizeBasedFragment, None);
        }

        for (i, boundary) in boundaries.iter().enumerate() {
            let end = boundaries.get(i + 1).map_or(content.len(), |b| b.offset);
            let span = boundary.offset..end;
            if content[span.clone()].trim().is_empty() {
                continue;
            }
            if span.len() <= self.config.max_chunk_size {
                ctx.push(span, ChunkKind::Function, boundary.name.clone());
            } else {
                ctx.window(span, ChunkKind::FunctionPart, boundary.name.as_deref());
            }
        }
        ctx.out
    }
}

struct Ctx<'a> {
    path: &'a str,
    language: Option<Lang>,
    content: &'a str,
    lines: LineIndex,
    config: &'a ChunkerConfig,
    out: Vec<CodeChunk>,
}

impl Ctx<'_> {
    fn push(&mut self, span: Range<usize>, kind: ChunkKind, name: Option<String>) {
        let text = &self.content[span.clone()];
        if text.trim().is_empty() {
            return;
        }
        self.out.push(CodeChunk {
            file_path: self.path.to_owned(),
            language: self.language,
            kind,
            line_range: self.lines.line_range(&span, text),
            start: span.start,
            end: span.end,
            name,
            text: text.to_owned(),
            content_hash: blake3::hash(text.as_bytes()).to_hex().to_string(),
        });
    }

    /// Line-accumulating window over `span`. Each flushed window seeds the
    /// next with its last `floor(lines * overlap_ratio)` lines, trimmed from
    /// the front until the incoming line fits.
    fn window(&mut self, span: Range<usize>, kind: ChunkKind, name: Option<&str>) {
        let max = self.config.max_chunk_size;
        let segment = &self.content[span.clone()];
        let base = span.start;

        let mut buf: Vec<Range<usize>> = Vec::new();
        let mut offset = 0;
        for line in segment.split_inclusive('\n') {
            let line_span = base + offset..base + offset + line.len();
            offset += line.len();

            if let (Some(first), Some(last)) = (buf.first(), buf.last()) {
                let buf_len = last.end - first.start;
                if buf_len + line.len() > max {
                    let flushed = first.start..last.end;
                    self.push(flushed, kind, name.map(str::to_owned));

                    let keep = overlap_lines(buf.len(), self.config.overlap_ratio);
                    let mut tail: Vec<_> = buf.split_off(buf.len() - keep);
                    while let (Some(first), Some(last)) = (tail.first(), tail.last()) {
                        if last.end - first.start + line.len() <= max {
                            break;
                        }
                        tail.remove(0);
                    }
                    buf = tail;
                }
            }
            buf.push(line_span);
        }
        if let (Some(first), Some(last)) = (buf.first(), buf.last()) {
            let rest = first.start..last.end;
            self.push(rest, kind, name.map(str::to_owned));
        }
    }
}

/// Overlap line count, always fewer than the lines in the flushed window.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn overlap_lines(lines: usize, ratio: f32) -> usize {
    if lines == 0 || ratio <= 0.0 {
        return 0;
    }
    let n = (lines as f64 * f64::from(ratio)).floor() as usize;
    n.min(lines - 1)
}

/// Byte offsets of line starts, for offset to line-number lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }

    fn line_range(&self, span: &Range<usize>, text: &str) -> (usize, usize) {
        let first = self.line_of(span.start);
        let trimmed = text.trim_end_matches('\n').len();
        let last = self.line_of(span.start + trimmed.saturating_sub(1));
        (first, last.max(first))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chunker(max: usize, ratio: f32) -> Chunker {
        Chunker::new(
            ChunkerConfig {
                max_chunk_size: max,
                overlap_ratio: ratio,
            },
            Arc::new(BoundaryRegistry::regex_only()),
        )
    }

    const FIB: &str = "def fibonacci(n):\n    if n <= 1:\n        return n\n    return fibonacci(n - 1) + fibonacci(n - 2)\n\ndef factorial(n):\n    if n == 0:\n        return 1\n    return n * factorial(n - 1)\n";

    #[test]
    fn empty_file_has_no_chunks() {
        let c = chunker(100, 0.2);
        assert!(c.chunk_source("a.py", Some(Lang::Python), "").is_empty());
        assert!(c.chunk_source("a.py", Some(Lang::Python), "   \n\n").is_empty());
    }

    #[test]
    fn two_python_functions_make_two_function_chunks() {
        let chunks = chunker(1000, 0.2).chunk_source("math.py", Some(Lang::Python), FIB);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Function));
        assert!(chunks[0].text.starts_with("def fibonacci"));
        assert!(chunks[1].text.starts_with("def factorial"));
        assert_eq!(chunks[0].name.as_deref(), Some("fibonacci"));
        assert_eq!(chunks[0].line_range, (1, 4));
        assert_eq!(chunks[1].line_range, (6, 9));
    }

    #[test]
    fn chunk_text_matches_offsets() {
        let chunks = chunker(1000, 0.2).chunk_source("math.py", Some(Lang::Python), FIB);
        for chunk in chunks {
            assert_eq!(&FIB[chunk.start..chunk.end], chunk.text);
        }
    }

    #[test]
    fn preamble_before_first_definition_is_kept() {
        let src = "import os\nimport sys\n\ndef main():\n    pass\n";
        let chunks = chunker(1000, 0.2).chunk_source("m.py", Some(Lang::Python), src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::SizeBasedFragment);
        assert!(chunks[0].text.starts_with("import os"));
        assert_eq!(chunks[1].kind, ChunkKind::Function);
    }

    #[test]
    fn oversized_function_is_split_into_parts_with_file_offsets() {
        let mut src = String::from("x = 1\n\ndef big():\n");
        for i in 0..20 {
            src.push_str(&format!("    value_{i} = {i}\n"));
        }
        let chunks = chunker(80, 0.0).chunk_source("big.py", Some(Lang::Python), &src);
        let parts: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::FunctionPart)
            .collect();
        assert!(parts.len() > 1);
        assert!(parts[0].start > 0);
        assert!(parts[0].text.starts_with("def big"));
        for part in &parts {
            assert_eq!(&src[part.start..part.end], part.text);
            assert!(part.text.len() <= 80);
            assert_eq!(part.name.as_deref(), Some("big"));
        }
    }

    #[test]
    fn unknown_language_uses_windows() {
        let src = "one\ntwo\nthree\nfour\n";
        let chunks = chunker(9, 0.0).chunk_source("notes.txt", None, src);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one\ntwo\n", "three\n", "four\n"]);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::SizeBasedFragment));
    }

    #[test]
    fn windows_overlap_by_ratio() {
        let src = "aaaa\nbbbb\ncccc\ndddd\neeee\nffff\n";
        let chunks = chunker(20, 0.5).chunk_source("t.txt", None, src);
        assert_eq!(chunks[0].text, "aaaa\nbbbb\ncccc\ndddd\n");
        assert_eq!(chunks[1].text, "cccc\ndddd\neeee\nffff\n");
    }

    #[test]
    fn single_long_line_is_emitted_whole() {
        let long = "x".repeat(50);
        let src = format!("short\n{long}\nend\n");
        let chunks = chunker(10, 0.5).chunk_source("t.txt", None, &src);
        assert!(chunks.iter().any(|c| c.text == format!("{long}\n")));
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let chunks = chunker(1000, 0.2).chunk_source("math.py", Some(Lang::Python), FIB);
        assert_eq!(chunks[0].id(), "math.py#function@0");
        assert_ne!(chunks[0].id(), chunks[1].id());
        assert_ne!(chunks[0].content_hash, chunks[1].content_hash);
    }

    #[test]
    fn overlap_is_always_fewer_than_buffer_lines() {
        assert_eq!(overlap_lines(1, 0.99), 0);
        assert_eq!(overlap_lines(4, 0.5), 2);
        assert_eq!(overlap_lines(10, 0.0), 0);
        assert_eq!(overlap_lines(3, 1.0), 2);
    }

    #[test]
    fn chunk_kind_roundtrip() {
        for kind in [ChunkKind::Function, ChunkKind::SizeBasedFragment, ChunkKind::FunctionPart] {
            assert_eq!(ChunkKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChunkKind::parse("class"), None);
    }

    proptest! {
        #[test]
        fn chunking_is_deterministic(src in "[a-z \n]{0,400}") {
            let c = chunker(40, 0.3);
            prop_assert_eq!(c.chunk_source("f.py", Some(Lang::Python), &src), c.chunk_source("f.py", Some(Lang::Python), &src));
        }

        #[test]
        fn chunks_respect_max_size_unless_single_line(
            lines in proptest::collection::vec("[a-z ]{0,30}", 0..40),
            max in 10usize..120,
        ) {
            let src = lines.join("\n");
            for chunk in chunker(max, 0.25).chunk_source("f.txt", None, &src) {
                let line_count = chunk.text.trim_end_matches('\n').lines().count();
                prop_assert!(chunk.text.len() <= max || line_count == 1);
                prop_assert_eq!(&src[chunk.start..chunk.end], chunk.text.as_str());
            }
        }

        #[test]
        fn adjacent_windows_overlap_within_ratio(
            lines in proptest::collection::vec("[a-z]{1,12}", 1..60),
            ratio in 0.0f32..0.9,
        ) {
            let src = lines.join("\n");
            let chunks = chunker(48, ratio).chunk_source("f.txt", None, &src);
            for pair in chunks.windows(2) {
                let overlap = pair[0].end.saturating_sub(pair[1].start);
                let prev_lines = pair[0].text.split_inclusive('\n').count();
                let overlap_lines = src[pair[1].start..pair[1].start + overlap].split_inclusive('\n').count();
                prop_assert!(pair[1].start >= pair[0].start);
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let allowed = (prev_lines as f32 * ratio).floor() as usize;
                prop_assert!(overlap_lines <= allowed);
            }
        }
    }
}
