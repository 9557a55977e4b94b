//! Context Assembler (§4.H): a token-budgeted multi-source context pack for
//! prompt injection, pulling from the sources this substrate actually has:
//! memories, experiences, values, code, commits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::MetadataStore;
use crate::search::Searcher;

pub const VALID_KINDS: &[&str] = &["memories", "experiences", "values", "code", "commits"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssembledContext {
    pub markdown: String,
    pub item_count: usize,
    pub token_count: usize,
    pub truncated: bool,
}

pub struct ContextAssembler {
    pub(crate) metadata: MetadataStore,
    searcher: Arc<Searcher>,
}

/// Heuristic token estimate: chars / 4, ported from
/// `clams/utils/tokens.py`. `estimate_tokens_by_words` is the cross-check
/// used in tests there (`word_count * 1.3`).
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / 4.0).ceil() as usize
}

pub fn estimate_tokens_by_words(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * 1.3).ceil() as usize
}

fn validate_kind(kind: &str) -> Result<(), Error> {
    if VALID_KINDS.contains(&kind) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "unknown context kind '{kind}': must be one of [{}]",
            VALID_KINDS.join(", ")
        )))
    }
}

impl ContextAssembler {
    pub fn new(metadata: MetadataStore, searcher: Arc<Searcher>) -> Self {
        Self { metadata, searcher }
    }

    pub fn assemble(
        &self,
        query: &str,
        kinds: &[String],
        token_budget: usize,
        per_kind_cap: usize,
    ) -> Result<AssembledContext, Error> {
        for kind in kinds {
            validate_kind(kind)?;
        }

        let mut sections = Vec::new();
        let mut item_count = 0usize;

        for kind in kinds {
            let (header, items): (&str, Vec<String>) = match kind.as_str() {
                "memories" => (
                    "## Memories",
                    self.metadata
                        .list_memories()?
                        .into_iter()
                        .take(per_kind_cap)
                        .map(|m| format!("- ({}) {}", m.category, m.content))
                        .collect(),
                ),
                "experiences" => (
                    "## Experiences",
                    self.searcher
                        .search_experiences(query, "full", None, per_kind_cap.clamp(1, 50))?
                        .into_iter()
                        .map(|r| format!("- [{:.2}] {}", r.score, r.id))
                        .collect(),
                ),
                "values" => (
                    "## Values",
                    self.metadata
                        .list_values()?
                        .into_iter()
                        .take(per_kind_cap)
                        .map(|v| format!("- {}", v.text))
                        .collect(),
                ),
                "code" => (
                    "## Code",
                    self.searcher
                        .search_code(query, per_kind_cap.clamp(1, 50))?
                        .into_iter()
                        .map(|r| format!("- {}", r.id))
                        .collect(),
                ),
                "commits" => (
                    "## Commits",
                    self.searcher
                        .search_commits(query, per_kind_cap.clamp(1, 50))?
                        .into_iter()
                        .map(|r| format!("- {}", r.id))
                        .collect(),
                ),
                _ => unreachable!("validated above"),
            };

            if items.is_empty() {
                continue;
            }
            item_count += items.len();
            sections.push(format!("{header}\n{}", items.join("\n")));
        }

        let mut markdown = sections.join("\n\n");
        let mut truncated = false;
        let mut token_count = estimate_tokens(&markdown);
        if token_count > token_budget {
            let char_budget = token_budget * 4;
            if markdown.chars().count() > char_budget {
                markdown = markdown.chars().take(char_budget).collect();
                truncated = true;
                token_count = estimate_tokens(&markdown);
            }
        }

        Ok(AssembledContext {
            markdown,
            item_count,
            token_count,
            truncated,
        })
    }
}
