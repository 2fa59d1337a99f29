//! Conversation turn records.
//!
//! A `ConversationTurn` is created whenever the session finalizes a
//! turn, never mutated, and persisted once (best effort) by the
//! transcript logger.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human participant.
    User,
    /// The agent.
    Assistant,
}

impl Role {
    /// Returns the canonical string label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown role string.
#[derive(Debug, Clone)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

/// One finalized conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Room session identifier.
    pub session_id: String,
    /// Identity of the human participant.
    pub participant_id: String,
    /// Who spoke.
    pub role: Role,
    /// Text content of the turn.
    pub message: String,
    /// Name of the agent configuration that produced the session.
    pub agent_name: String,
    /// ISO-8601 UTC timestamp, stamped at creation.
    pub created_at: String,
}

impl ConversationTurn {
    /// Creates a turn stamped with the current UTC time.
    pub fn new(
        session_id: impl Into<String>,
        participant_id: impl Into<String>,
        role: Role,
        message: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            role,
            message: message.into(),
            agent_name: agent_name.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_parse_round_trip() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
        assert!(Role::from_str("system").is_err());
    }

    #[test]
    fn new_turn_stamps_a_timestamp() {
        let turn = ConversationTurn::new("room-1", "p-1", Role::Assistant, "hi", "agent");
        assert!(!turn.created_at.is_empty());
        assert!(turn.created_at.contains('T'), "expected ISO-8601 timestamp");
    }
}
