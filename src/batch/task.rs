//! Document tasks, priority heuristics and oversized-input splitting.

use crate::tokens::{CharacterEstimator, TokenCounter};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const HIGHEST_PRIORITY: u8 = 1;
pub const LOWEST_PRIORITY: u8 = 5;

static OVERVIEW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)overview|readme").unwrap());
static PLANNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)plan|spec|requirement").unwrap());
static DESIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)design|architecture|technical").unwrap());

/// One unit of work: a document to send through the remote analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTask {
    pub id: String,
    pub display_name: String,
    pub content: String,
    /// 1 (highest) to 5 (lowest).
    pub priority: u8,
    pub estimated_tokens: usize,
    /// Set on sub-tasks produced by [`split_large_document`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

impl DocumentTask {
    /// Builds a task with a heuristic priority and a token estimate.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        let content = content.into();
        Self {
            id: id.into(),
            priority: calculate_priority(&display_name, &content),
            estimated_tokens: CharacterEstimator::new().count(&content),
            display_name,
            content,
            parent_id: None,
            chunk_index: None,
        }
    }

    /// Explicit priority, clamped into 1..=5.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(HIGHEST_PRIORITY, LOWEST_PRIORITY);
        self
    }

    pub fn is_chunk(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Heuristic default priority from the document name, then its length.
pub fn calculate_priority(display_name: &str, content: &str) -> u8 {
    if OVERVIEW_RE.is_match(display_name) {
        return 1;
    }
    if PLANNING_RE.is_match(display_name) {
        return 2;
    }
    if DESIGN_RE.is_match(display_name) {
        return 3;
    }
    match content.chars().count() {
        n if n < 1_000 => 2,
        n if n < 5_000 => 3,
        n if n < 20_000 => 4,
        _ => 5,
    }
}

/// Splits a task whose content exceeds `threshold` characters into ordered
/// sub-tasks sharing the parent's priority.
///
/// Cuts prefer a paragraph break, then a line break, then any whitespace,
/// and fall back to a hard cut on a char boundary. A piece holding only
/// whitespace is folded into its neighbour, so a chunk can run past
/// `threshold` by that whitespace. Concatenating the chunk contents in order
/// yields the original content.
pub fn split_large_document(task: &DocumentTask, threshold: usize) -> Vec<DocumentTask> {
    if threshold == 0 || task.char_len() <= threshold {
        return vec![task.clone()];
    }

    let content = task.content.as_str();
    let mut spans: Vec<Range<usize>> = Vec::new();
    let mut start = 0;
    let mut remaining = task.char_len();
    while remaining > threshold {
        let rest = &content[start..];
        let window_end = rest
            .char_indices()
            .nth(threshold)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = find_cut(&rest[..window_end]).unwrap_or(window_end);
        remaining -= rest[..cut].chars().count();
        push_span(&mut spans, content, start..start + cut);
        start += cut;
    }
    if start < content.len() {
        push_span(&mut spans, content, start..content.len());
    }
    if spans.len() <= 1 {
        return vec![task.clone()];
    }

    let total = spans.len();
    let counter = CharacterEstimator::new();
    spans
        .into_iter()
        .enumerate()
        .map(|(i, span)| {
            let piece = &content[span];
            DocumentTask {
                id: format!("{}#chunk-{}", task.id, i),
                display_name: format!("{} (part {}/{})", task.display_name, i + 1, total),
                content: piece.to_string(),
                priority: task.priority,
                estimated_tokens: counter.count(piece),
                parent_id: Some(task.id.clone()),
                chunk_index: Some(i),
            }
        })
        .collect()
}

fn push_span(spans: &mut Vec<Range<usize>>, content: &str, span: Range<usize>) {
    match spans.last_mut() {
        Some(last)
            if content[span.clone()].trim().is_empty()
                || content[last.clone()].trim().is_empty() =>
        {
            last.end = span.end
        }
        _ => spans.push(span),
    }
}

/// Byte offset just past the preferred break inside `window`, if any.
fn find_cut(window: &str) -> Option<usize> {
    for sep in ["\n\n", "\n"] {
        if let Some(pos) = window.rfind(sep) {
            let cut = pos + sep.len();
            if pos > 0 {
                return Some(cut);
            }
        }
    }
    window
        .char_indices()
        .rev()
        .find(|(i, c)| *i > 0 && c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
}
