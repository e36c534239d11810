//! The context ledger: de-duplicated, append-only accumulation of document
//! text for the current session.
//!
//! Artifact identity is the document name. A name is only ever added once,
//! no matter how many times the same file is uploaded or re-surfaced by a
//! folder scan. Accumulated blocks keep strict append order and are never
//! dropped except by a full [`ContextLedger::reset`].

use std::collections::HashSet;

use crate::models::IngestOutcome;

/// One ingested document: its name (the citation header) and its text.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    pub name: String,
    pub text: String,
}

/// Session-scoped knowledge store backing the system instruction.
#[derive(Debug)]
pub struct ContextLedger {
    ingested: HashSet<String>,
    blocks: Vec<ContextBlock>,
    min_text_chars: usize,
}

impl ContextLedger {
    /// `min_text_chars` is the significance threshold: extractions with
    /// fewer non-whitespace characters report [`IngestOutcome::Empty`] and
    /// do not claim the name, so a later retry can succeed.
    pub fn new(min_text_chars: usize) -> Self {
        Self {
            ingested: HashSet::new(),
            blocks: Vec::new(),
            min_text_chars,
        }
    }

    /// Offer one artifact's extracted text to the ledger.
    pub fn ingest(&mut self, name: &str, text: &str) -> IngestOutcome {
        if self.ingested.contains(name) {
            return IngestOutcome::Skipped;
        }

        let significant = text.chars().filter(|c| !c.is_whitespace()).count();
        if significant < self.min_text_chars {
            return IngestOutcome::Empty;
        }

        self.ingested.insert(name.to_string());
        self.blocks.push(ContextBlock {
            name: name.to_string(),
            text: text.to_string(),
        });
        IngestOutcome::Accepted
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ingested.contains(name)
    }

    /// Ingested blocks in append order.
    pub fn blocks(&self) -> &[ContextBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Clears the dedup set and the accumulated text together. The two
    /// must never desynchronize: the set gates exactly the blocks held.
    pub fn reset(&mut self) {
        self.ingested.clear();
        self.blocks.clear();
    }

    /// Renders the full accumulated context, one tagged block per document,
    /// for verbatim inclusion in the model's system instruction. No ranking
    /// and no truncation: everything ingested goes in.
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&format!("--- Document: {} ---\n{}", block.name, block.text));
        }
        out
    }
}
