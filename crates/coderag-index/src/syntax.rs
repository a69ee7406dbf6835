//! Tree-sitter boundary strategy.

use tree_sitter::{Node, Parser};

use crate::boundary::{Boundary, BoundaryStrategy};
use crate::languages::Lang;

/// Node kinds folded into the definition that follows them.
const LEADING_KINDS: &[&str] = &[
    "attribute_item",
    "line_comment",
    "block_comment",
    "comment",
    "decorator",
];

/// Top-level entity nodes of a parsed file, with leading attributes and doc
/// comments attached.
#[derive(Debug, Clone, Copy)]
pub struct SyntaxStrategy {
    lang: Lang,
}

impl SyntaxStrategy {
    #[must_use]
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }
}

impl BoundaryStrategy for SyntaxStrategy {
    fn boundaries(&self, source: &str) -> Vec<Boundary> {
        let Some(grammar) = self.lang.grammar() else {
            return Vec::new();
        };
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            tracing::warn!(language = %self.lang, "set_language failed: {e}");
            return Vec::new();
        }
        let Some(tree) = parser.parse(source, None) else {
            tracing::warn!(language = %self.lang, "parse failed");
            return Vec::new();
        };

        let kinds = self.lang.entity_node_kinds();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let mut out = Vec::new();
        let mut leading: Option<usize> = None;

        for child in root.children(&mut cursor) {
            if LEADING_KINDS.contains(&child.kind()) {
                leading.get_or_insert(child.start_byte());
                continue;
            }
            if kinds.contains(&child.kind()) {
                let offset = line_start(source, leading.unwrap_or(child.start_byte()));
                if out.last().is_none_or(|b: &Boundary| b.offset < offset) {
                    out.push(Boundary {
                        offset,
                        name: entity_name(&child, source),
                    });
                }
            }
            leading = None;
        }
        out
    }
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |i| i + 1)
}

fn entity_name(node: &Node, source: &str) -> Option<String> {
    for field in ["name", "type"] {
        if let Some(n) = node.child_by_field_name(field) {
            return n.utf8_text(source.as_bytes()).ok().map(str::to_owned);
        }
    }
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .find_map(|c| c.child_by_field_name("name"))
        .and_then(|n| n.utf8_text(source.as_bytes()).ok().map(str::to_owned))
}
