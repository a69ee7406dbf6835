//! Intent-specific prompt templates.

use std::collections::HashMap;

use crate::query::Intent;

pub const SYSTEM_INSTRUCTION: &str = "You are a coding assistant working inside a local code repository. \
Ground every answer in the repository context below and say so plainly when the context does not contain what is needed.";

const NO_CONTEXT: &str = "(no relevant code found in the index)";

/// Extra system clause and closing directive for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system_clause: String,
    pub directive: String,
}

impl PromptTemplate {
    #[must_use]
    pub fn new(system_clause: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            system_clause: system_clause.into(),
            directive: directive.into(),
        }
    }

    /// Used for any intent without its own template.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(
            "Help the user find and understand relevant code.",
            "Answer the query below, citing file paths from the context.",
        )
    }

    fn builtin(intent: Intent) -> Self {
        match intent {
            Intent::Completion => Self::new(
                "Continue code so it matches the style and APIs of the surrounding repository.",
                "Complete the code for the query below. Reply with code only, in one fenced block.",
            ),
            Intent::Explanation => Self::new(
                "Explain code clearly for a developer new to this repository.",
                "Explain the code relevant to the query below step by step, referring to file paths.",
            ),
            Intent::Fix => Self::new(
                "Diagnose defects and propose minimal, correct fixes.",
                "Identify the cause of the problem described below and show the corrected code.",
            ),
            Intent::Refactor => Self::new(
                "Improve structure and readability without changing behaviour.",
                "Propose a refactoring for the code described below and show the result.",
            ),
            Intent::Search => Self::fallback(),
        }
    }
}

/// Code the user is editing right now, passed alongside the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentFile {
    pub path: Option<String>,
    pub content: String,
}

/// Components of one prompt before rendering.
#[derive(Debug, Clone)]
pub struct Prompt<'a> {
    pub intent: Intent,
    pub context: &'a str,
    pub current_file: Option<&'a CurrentFile>,
    pub query: &'a str,
}

#[derive(Debug, Clone)]
pub struct PromptConstructor {
    system: String,
    templates: HashMap<Intent, PromptTemplate>,
}

impl Default for PromptConstructor {
    fn default() -> Self {
        let templates = Intent::ALL
            .iter()
            .map(|&intent| (intent, PromptTemplate::builtin(intent)))
            .collect();
        Self {
            system: SYSTEM_INSTRUCTION.to_owned(),
            templates,
        }
    }
}

impl PromptConstructor {
    /// Constructor with no per-intent templates; every intent uses the fallback.
    #[must_use]
    pub fn bare(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            templates: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_template(mut self, intent: Intent, template: PromptTemplate) -> Self {
        self.templates.insert(intent, template);
        self
    }

    #[must_use]
    pub fn template(&self, intent: Intent) -> PromptTemplate {
        self.templates
            .get(&intent)
            .cloned()
            .unwrap_or_else(PromptTemplate::fallback)
    }

    #[must_use]
    pub fn build(&self, prompt: &Prompt<'_>) -> String {
        let template = self.template(prompt.intent);
        let mut out = String::with_capacity(
            self.system.len() + prompt.context.len() + prompt.query.len() + 256,
        );

        out.push_str(&self.system);
        out.push(' ');
        out.push_str(&template.system_clause);
        out.push_str("\n\n## Repository context\n\n");
        if prompt.context.trim().is_empty() {
            out.push_str(NO_CONTEXT);
            out.push('\n');
        } else {
            out.push_str(prompt.context);
            if !prompt.context.ends_with('\n') {
                out.push('\n');
            }
        }

        if let Some(file) = prompt.current_file {
            out.push_str("\n## Current file");
            if let Some(path) = &file.path {
                out.push_str(": ");
                out.push_str(path);
            }
            out.push_str("\n\n```\n");
            out.push_str(&file.content);
            if !file.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }

        out.push('\n');
        out.push_str(&template.directive);
        out.push_str("\n\n## Query\n\n");
        out.push_str(prompt.query);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt<'a>(intent: Intent, context: &'a str, query: &'a str) -> Prompt<'a> {
        Prompt {
            intent,
            context,
            current_file: None,
            query,
        }
    }

    #[test]
    fn sections_appear_in_order() {
        let ctor = PromptConstructor::default();
        let file = CurrentFile {
            path: Some("src/lib.rs".into()),
            content: "fn main() {}".into(),
        };
        let mut p = prompt(Intent::Explanation, "### File: a.py (python, lines 1-1)\n", "what does a do?");
        p.current_file = Some(&file);
        let text = ctor.build(&p);

        let system = text.find(SYSTEM_INSTRUCTION).unwrap();
        let context = text.find("### File: a.py").unwrap();
        let current = text.find("## Current file: src/lib.rs").unwrap();
        let directive = text.find("Explain the code relevant").unwrap();
        let query = text.find("what does a do?").unwrap();
        assert!(system < context && context < current && current < directive && directive < query);
    }

    #[test]
    fn query_is_included_verbatim() {
        let text = PromptConstructor::default().build(&prompt(Intent::Fix, "ctx", "  fix \"this\" error:  x "));
        assert!(text.ends_with("  fix \"this\" error:  x \n"));
    }

    #[test]
    fn empty_context_is_stated() {
        let text = PromptConstructor::default().build(&prompt(Intent::Search, "", "q"));
        assert!(text.contains(NO_CONTEXT));
    }

    #[test]
    fn templates_differ_by_intent() {
        let ctor = PromptConstructor::default();
        let directives: std::collections::HashSet<_> = [
            Intent::Completion,
            Intent::Explanation,
            Intent::Fix,
            Intent::Refactor,
        ]
        .iter()
        .map(|&i| ctor.template(i).directive)
        .collect();
        assert_eq!(directives.len(), 4);
    }

    #[test]
    fn missing_template_uses_fallback() {
        let ctor = PromptConstructor::bare("sys");
        assert_eq!(ctor.template(Intent::Refactor), PromptTemplate::fallback());
        let custom = PromptTemplate::new("clause", "do it");
        let ctor = ctor.with_template(Intent::Refactor, custom.clone());
        assert_eq!(ctor.template(Intent::Refactor), custom);
        assert_eq!(ctor.template(Intent::Fix), PromptTemplate::fallback());
    }
}
