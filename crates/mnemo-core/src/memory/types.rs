//! ============================================================================
//! Memory Types - Records exchanged with the vector store backend
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChatMessage, Role};

/// A single memory entry stored in the vector database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// Caller identity the memory belongs to
    pub identity: String,
    /// The remembered text
    pub text: String,
    /// Who said it
    pub role: Role,
    /// Vector embedding (not serialized when empty)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Unix timestamp when the memory was created
    pub created_at: i64,
}

impl MemoryRecord {
    /// Create a record from a conversation turn
    pub fn from_turn(identity: &str, turn: &ChatMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            text: turn.content.clone(),
            role: turn.role,
            embedding: Vec::new(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Attach a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_turn() {
        let record = MemoryRecord::from_turn("caller-1", &ChatMessage::user("I like tea"));

        assert_eq!(record.identity, "caller-1");
        assert_eq!(record.text, "I like tea");
        assert_eq!(record.role, Role::User);
        assert!(record.embedding.is_empty());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("embedding").is_none());
    }
}
