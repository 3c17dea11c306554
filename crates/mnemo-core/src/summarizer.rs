//! ============================================================================
//! Turn Summarizer - Memory search query from recent turns
//! ============================================================================
//! Takes the last few non-system turns in chronological order and renders
//! them as `User: ...` / `Assistant: ...` lines. Each turn is clipped so the
//! query stays bounded regardless of how long the caller's messages are.
//! ============================================================================

use crate::types::{ChatMessage, Role};

/// Default number of recent turns used for the query
pub const DEFAULT_SUMMARY_TURNS: usize = 4;

/// Default per-turn character cap
pub const DEFAULT_MAX_TURN_CHARS: usize = 500;

/// Builds memory search queries from a conversation
#[derive(Debug, Clone, Copy)]
pub struct TurnSummarizer {
    max_turns: usize,
    max_turn_chars: usize,
}

impl Default for TurnSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_TURNS, DEFAULT_MAX_TURN_CHARS)
    }
}

impl TurnSummarizer {
    pub fn new(max_turns: usize, max_turn_chars: usize) -> Self {
        Self {
            max_turns,
            max_turn_chars,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Build the query. An empty string means "skip the search": returned
    /// when the conversation has no user message or no usable turns.
    pub fn summarize(&self, messages: &[ChatMessage]) -> String {
        if !messages.iter().any(|m| m.role == Role::User) {
            return String::new();
        }

        let mut recent: Vec<&ChatMessage> = messages
            .iter()
            .rev()
            .filter(|m| m.role != Role::System)
            .take(self.max_turns)
            .filter(|m| !m.content.trim().is_empty())
            .collect();
        recent.reverse();

        recent
            .into_iter()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.role.display_name(),
                    clip(m.content.trim(), self.max_turn_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Keep at most `max_chars` characters of a string
fn clip(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
