//! Splits a generated token sequence into the reasoning trace and the final answer.
//!
//! Qwen3 closes its reasoning with a dedicated `</think>` token. The split is done on token
//! ids, not on decoded text, because the reasoning may mention the literal tag.

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingResult {
    pub thinking: String,
    pub content: String,
}

/// Index of the last `sentinel` in `ids`, if any.
pub fn split_point(ids: &[u32], sentinel: u32) -> Option<usize> {
    ids.iter().rposition(|&id| id == sentinel)
}

/// Partitions `ids` at the last sentinel: `[0, i)` is thinking, `[i, end)` is content.
/// Without a sentinel the thinking half is empty.
pub fn partition(ids: &[u32], sentinel: u32) -> (&[u32], &[u32]) {
    match split_point(ids, sentinel) {
        Some(i) => ids.split_at(i),
        None => (&ids[..0], ids),
    }
}

/// Decodes both halves with `decode` and trims the newline runs the chat template leaves
/// around them.
///
/// The splitting sentinel is not decoded: Qwen3 tokenizers register `</think>` as a
/// non-special added token, so skipping special tokens would keep it in the content.
pub fn split_and_decode<F>(ids: &[u32], sentinel: u32, decode: F) -> Result<ThinkingResult>
where
    F: Fn(&[u32]) -> Result<String>,
{
    let (thinking_ids, content_ids) = partition(ids, sentinel);
    let content_ids = content_ids.strip_prefix(&[sentinel]).unwrap_or(content_ids);

    let thinking = if thinking_ids.is_empty() {
        String::new()
    } else {
        trim_newlines(&decode(thinking_ids)?).to_string()
    };
    let content = trim_newlines(&decode(content_ids)?).to_string();

    Ok(ThinkingResult { thinking, content })
}

/// Strips leading and trailing `\n` only; spaces and tabs are part of the text.
pub fn trim_newlines(s: &str) -> &str {
    s.trim_matches('\n')
}
