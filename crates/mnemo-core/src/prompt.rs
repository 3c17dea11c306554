//! ============================================================================
//! Prompt Assembler - Inject recalled memories into the system instruction
//! ============================================================================

use crate::types::{ChatMessage, Role};

/// Header separating recalled memories from the caller's own instruction
pub const MEMORY_HEADER: &str = "Relevant memories (only use if necessary/useful)";

/// Produce the augmented conversation.
///
/// The first system message (or a synthesized empty one at the front) gets
/// the memories appended as a bulleted block after a blank line. Every other
/// message is passed through unchanged and in order.
pub fn assemble(messages: &[ChatMessage], memories: &[String]) -> Vec<ChatMessage> {
    let mut augmented = messages.to_vec();

    let system_index = match augmented.iter().position(|m| m.role == Role::System) {
        Some(index) => index,
        None => {
            augmented.insert(0, ChatMessage::system(""));
            0
        }
    };

    let block = format_memories(memories);
    if !block.is_empty() {
        let instruction = &mut augmented[system_index].content;
        if instruction.is_empty() {
            *instruction = block;
        } else {
            instruction.push_str("\n\n");
            instruction.push_str(&block);
        }
    }

    augmented
}

/// Render memories as a delimited block; empty when there is nothing to add
pub fn format_memories(memories: &[String]) -> String {
    let lines: Vec<String> = memories
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|m| format!("- {}", m))
        .collect();

    if lines.is_empty() {
        return String::new();
    }

    format!("{}\n{}", MEMORY_HEADER, lines.join("\n"))
}
