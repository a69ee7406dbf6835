//! Intent classification and query rewriting.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Completion,
    Explanation,
    Search,
    Fix,
    Refactor,
}

impl Intent {
    pub const ALL: [Self; 5] = [
        Self::Completion,
        Self::Explanation,
        Self::Search,
        Self::Fix,
        Self::Refactor,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Explanation => "explanation",
            Self::Search => "search",
            Self::Fix => "fix",
            Self::Refactor => "refactor",
        }
    }

    /// Chunks to retrieve: few for completion, many for explanation.
    #[must_use]
    pub fn default_limit(self) -> usize {
        match self {
            Self::Completion => 3,
            Self::Search | Self::Fix => 5,
            Self::Refactor => 6,
            Self::Explanation => 8,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in order; the first match decides the intent.
const INTENT_PATTERNS: &[(Intent, &str)] = &[
    (
        Intent::Fix,
        r"(?i)\b(fix(es|ing)?|bugs?|errors?|exceptions?|broken|crash(es|ing)?|fails?|failing|traceback|debug)\b",
    ),
    (
        Intent::Refactor,
        r"(?i)\b(refactor(ing)?|restructure|clean\s+up|simplify|rename|extract|optimi[sz]e|improve)\b",
    ),
    (
        Intent::Completion,
        r"(?i)\b(complete|finish|implement|autocomplete|continue|write)\b",
    ),
    (
        Intent::Explanation,
        r"(?i)\b(explain|describe|what\s+(does|is|are)|how\s+(does|do|is)|why|walk\s+me\s+through)\b",
    ),
    (
        Intent::Search,
        r"(?i)\b(find|search|locate|where|look\s+for|which)\b",
    ),
];

const FILLER: &str = r"(?i)\b(please|kindly|can\s+you|could\s+you|would\s+you|will\s+you|show\s+me|tell\s+me|help\s+me|give\s+me|i\s+want\s+to|i\s+need\s+to|i'd\s+like\s+to|let's)\b";

/// Leading articles and pronouns left dangling once trigger words are gone.
const DANGLING: &str = r"(?i)^(this|that|the|a|an|my|me|for|of|to|in)\b\s*";

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("invalid query pattern {pattern}: {e}");
            None
        }
    }
}

static INTENTS: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    INTENT_PATTERNS
        .iter()
        .filter_map(|(intent, p)| compile(p).map(|re| (*intent, re)))
        .collect()
});

static FILLER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(FILLER));
static DANGLING_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(DANGLING));
static QUOTED_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r#""([^"]+)"|`([^`]+)`|“([^”]+)”"#));
static ERROR_CLAUSE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\berror:\s*([^\n]+)"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedQuery {
    pub original: String,
    pub intent: Intent,
    /// Text sent to the embedder. Empty only for empty input.
    pub rewritten: String,
}

impl ProcessedQuery {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewritten.is_empty()
    }
}

#[must_use]
pub fn classify_intent(text: &str) -> Intent {
    INTENTS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map_or(Intent::Search, |(intent, _)| *intent)
}

/// Classify and rewrite a raw query.
#[must_use]
pub fn process_query(text: &str) -> ProcessedQuery {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ProcessedQuery {
            original: text.to_owned(),
            intent: Intent::Search,
            rewritten: String::new(),
        };
    }

    let intent = classify_intent(trimmed);
    let rewritten = rewrite(trimmed, intent);
    tracing::debug!(%intent, rewritten = %rewritten, "query processed");
    ProcessedQuery {
        original: text.to_owned(),
        intent,
        rewritten,
    }
}

fn rewrite(text: &str, intent: Intent) -> String {
    if intent == Intent::Fix
        && let Some(extracted) = extract_fix_target(text)
    {
        return extracted;
    }

    let mut out = strip(text, FILLER_RE.as_ref());
    if let Some((_, re)) = INTENTS.iter().find(|(i, _)| *i == intent) {
        out = strip(&out, Some(re));
    }
    let mut out = tidy(&out);
    if let Some(re) = DANGLING_RE.as_ref() {
        while let Some(m) = re.find(&out) {
            out = out[m.end()..].to_owned();
        }
    }

    if out.is_empty() {
        tidy(text)
    } else {
        out
    }
}

/// A quoted substring, else the clause after `error:`.
fn extract_fix_target(text: &str) -> Option<String> {
    if let Some(caps) = QUOTED_RE.as_ref().and_then(|re| re.captures(text)) {
        let quoted = caps.iter().skip(1).flatten().next().map(|m| tidy(m.as_str()));
        if let Some(q) = quoted.filter(|q| !q.is_empty()) {
            return Some(q);
        }
    }
    ERROR_CLAUSE_RE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| tidy(m.as_str()))
        .filter(|s| !s.is_empty())
}

fn strip(text: &str, re: Option<&Regex>) -> String {
    match re {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_owned(),
    }
}

/// Collapse whitespace and trim surrounding punctuation.
fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '?' | '!' | '.' | ',' | ':' | ';'))
        .to_owned()
}
