use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::backend::{InMemoryBackend, MemoryBackend};
use crate::modes::Mode;

pub const STYLE_MEMORY_KEY: &str = "lumen.style_memory";
pub const MAX_PATTERNS: usize = 100;
pub const RECALL_LIMIT: usize = 5;
const SCHEMA_VERSION: u64 = 1;

/// A refinement the user explicitly approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub mode: Mode,
    pub user_input: String,
    pub refined_prompt: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

/// Capped, deduplicated record of approved refinements, replayed into
/// future refinement as style guidance.
///
/// The store is the only writer of its key. Every call re-reads the backend,
/// so two stores over the same file see each other's writes; concurrent
/// `learn` calls are last-writer-wins.
#[derive(Clone)]
pub struct StyleMemory {
    backend: Arc<dyn MemoryBackend>,
}

impl StyleMemory {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// All persisted patterns, oldest first. Unreadable storage reads as empty.
    pub fn patterns(&self) -> Vec<LearnedPattern> {
        match self.backend.load(STYLE_MEMORY_KEY) {
            Ok(Some(blob)) => parse_blob(&blob),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "style memory unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Records an approved refinement. Returns whether a new record was
    /// stored; storage failures are logged and swallowed.
    pub fn learn(&self, mode: Mode, user_input: &str, refined_prompt: &str) -> bool {
        if refined_prompt.trim().is_empty() {
            return false;
        }
        let mut patterns = match self.backend.load(STYLE_MEMORY_KEY) {
            Ok(blob) => blob.as_deref().map(parse_blob).unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, %mode, "style memory unreadable; starting from empty");
                Vec::new()
            }
        };
        if patterns
            .iter()
            .any(|row| row.user_input == user_input && row.refined_prompt == refined_prompt)
        {
            return false;
        }

        patterns.push(LearnedPattern {
            mode,
            user_input: user_input.to_string(),
            refined_prompt: refined_prompt.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
        if patterns.len() > MAX_PATTERNS {
            let overflow = patterns.len() - MAX_PATTERNS;
            patterns.drain(..overflow);
        }

        let blob = json!({
            "schema_version": SCHEMA_VERSION,
            "patterns": patterns,
        });
        match self.backend.save(STYLE_MEMORY_KEY, &blob.to_string()) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, %mode, "style memory save failed; pattern not learned");
                false
            }
        }
    }

    /// Style directive built from the most recent approvals for `mode`, or
    /// an empty string when there are none.
    pub fn recall(&self, mode: Mode) -> String {
        let patterns = self.patterns();
        let recent = patterns
            .iter()
            .rev()
            .filter(|row| row.mode == mode)
            .take(RECALL_LIMIT)
            .collect::<Vec<&LearnedPattern>>();
        render_style_context(&recent)
    }
}

impl std::fmt::Debug for StyleMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleMemory").finish_non_exhaustive()
    }
}

pub fn render_style_context(patterns: &[&LearnedPattern]) -> String {
    if patterns.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "USER STYLE MEMORY (refinements this user approved in this mode, most recent first):\n",
    );
    for (idx, row) in patterns.iter().enumerate() {
        out.push_str(&format!(
            "{}. Request: \"{}\" -> Approved prompt: \"{}\"\n",
            idx + 1,
            row.user_input.trim(),
            row.refined_prompt.trim()
        ));
    }
    out.push_str(
        "Imitate the STYLE of these approved prompts: lighting, medium, composition, \
         color treatment and phrasing. Do NOT reuse their subjects. This style takes \
         precedence over the default strategy, but the subject must come from the \
         current request.",
    );
    out
}

fn parse_blob(blob: &str) -> Vec<LearnedPattern> {
    let parsed: Value = match serde_json::from_str(blob) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "style memory blob is corrupt; treating as empty");
            return Vec::new();
        }
    };
    let rows = match &parsed {
        Value::Array(rows) => rows.as_slice(),
        Value::Object(obj) => obj
            .get("patterns")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    rows.iter()
        .filter_map(|row| serde_json::from_value::<LearnedPattern>(row.clone()).ok())
        .collect()
}
