//! Context module - Per-conversation mutable state
//!
//! A `TurnContext` travels through every turn: guards read it, actions may
//! mutate it. It is owned by a single conversation and never shared across
//! conversations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default = "generate_id")]
    pub id: String,
    pub sender: Sender,
    /// Structured payload; plain text messages are a JSON string.
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl ConversationMessage {
    pub fn user(payload: impl Into<Value>) -> Self {
        Self {
            id: generate_id(),
            sender: Sender::User,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }

    pub fn bot(payload: impl Into<Value>) -> Self {
        Self {
            id: generate_id(),
            sender: Sender::Bot,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }
}

/// Mutable per-conversation context.
///
/// Conditions receive `&TurnContext` (they cannot mutate it by construction);
/// actions receive `&mut TurnContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnContext {
    pub conversation_id: String,
    /// Channel correlating this conversation with asynchronously arriving
    /// inference results.
    pub channel_id: String,
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
    /// Free-form key/value payload for actions.
    #[serde(default)]
    pub slots: HashMap<String, Value>,
}

impl TurnContext {
    pub fn new(conversation_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            channel_id: channel_id.into(),
            history: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn push_message(&mut self, message: ConversationMessage) {
        self.history.push(message);
    }

    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.history.last()
    }

    /// Payload of the most recent user message, when it is plain text.
    pub fn last_user_payload(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|message| message.sender == Sender::User)
            .and_then(|message| message.payload.as_str())
    }

    pub fn set_slot(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.slots.insert(key.into(), value.into());
    }

    pub fn slot(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_user_payload_skips_bot_messages() {
        let mut ctx = TurnContext::new("conv-1", "chan-1");
        ctx.push_message(ConversationMessage::user("hello"));
        ctx.push_message(ConversationMessage::bot("hi there"));

        assert_eq!(ctx.last_user_payload(), Some("hello"));
        assert_eq!(
            ctx.last_message().map(|m| m.sender.clone()),
            Some(Sender::Bot)
        );
    }

    #[test]
    fn last_user_payload_requires_text() {
        let mut ctx = TurnContext::new("conv-1", "chan-1");
        ctx.push_message(ConversationMessage::user(json!({"attachment": "img.png"})));

        assert_eq!(ctx.last_user_payload(), None);
    }

    #[test]
    fn slots_roundtrip() {
        let mut ctx = TurnContext::new("conv-1", "chan-1");
        ctx.set_slot("language", "en");

        assert_eq!(ctx.slot("language"), Some(&json!("en")));
        assert_eq!(ctx.slot("missing"), None);
    }
}
