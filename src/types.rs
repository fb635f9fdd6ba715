//! Wire types for the agent server API.
//!
//! These mirror the server's JSON DTOs. Field names are part of the
//! contract; fields this client does not interpret are carried opaquely
//! through `#[serde(flatten)]` so round-tripping never drops data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An atomic content unit inside a message.
///
/// Only text-bearing parts are interpreted; any other part kind
/// (binary, function call, ...) is passed through unexamined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Text payload, if this is a text part.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Opaque remainder of the part.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl Part {
    /// Text part constructor.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            rest: serde_json::Map::new(),
        }
    }
}

/// A message: a role plus an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// Role of the message author ("user", "model", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered content parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A single-part user text message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part::text(text)],
        }
    }
}

/// One unit of agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Author identifier for this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Message content, if the event carries any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Opaque remainder of the event.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl Event {
    /// Author to attribute output to, defaulting to `agent`.
    #[must_use]
    pub fn author_label(&self) -> &str {
        self.author.as_deref().unwrap_or("agent")
    }

    /// The concatenation of all non-empty text parts, or `None` when the
    /// event carries no text.
    #[must_use]
    pub fn joined_text(&self) -> Option<String> {
        let content = self.content.as_ref()?;
        let mut joined = String::new();
        for part in &content.parts {
            if let Some(text) = part.text.as_deref()
                && !text.is_empty()
            {
                joined.push_str(text);
            }
        }
        if joined.is_empty() { None } else { Some(joined) }
    }
}

/// Request body for `/run` and `/run_sse`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunRequest {
    /// Target app.
    pub app_name: String,
    /// Calling user.
    pub user_id: String,
    /// Session to run within.
    pub session_id: String,
    /// The user's message.
    pub new_message: Content,
    /// Whether the server should stream partial output.
    pub streaming: bool,
}

/// A session as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Opaque remainder (state, timestamps, events, ...).
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl Session {
    /// Creation timestamp, when the server reports one.
    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.rest.get("created_at").and_then(Value::as_str)
    }
}

/// Result of an artifact upload.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactUpload {
    /// Stored artifact name.
    pub filename: String,
    /// Stored size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_text_concatenates_text_parts_in_order() {
        let event: Event = serde_json::from_str(
            r#"{"author":"agent","content":{"parts":[{"text":"Hel"},{"inline_data":{}},{"text":"lo"}]}}"#,
        )
        .unwrap();
        assert_eq!(event.joined_text().as_deref(), Some("Hello"));
        assert_eq!(event.author_label(), "agent");
    }

    #[test]
    fn joined_text_is_none_without_text_parts() {
        let event: Event =
            serde_json::from_str(r#"{"content":{"parts":[{"function_call":{"name":"f"}}]}}"#)
                .unwrap();
        assert_eq!(event.joined_text(), None);
        assert_eq!(event.author_label(), "agent");
    }

    #[test]
    fn unknown_event_fields_round_trip() {
        let raw = r#"{"author":"planner","invocation_id":"i-1","content":{"role":"model","parts":[{"text":"hi"}]}}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.rest.get("invocation_id").unwrap(), "i-1");
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["invocation_id"], "i-1");
    }

    #[test]
    fn run_request_serializes_contract_fields() {
        let req = AgentRunRequest {
            app_name: "weather".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            new_message: Content::user_text("hi"),
            streaming: true,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["app_name"], "weather");
        assert_eq!(v["new_message"]["role"], "user");
        assert_eq!(v["new_message"]["parts"][0]["text"], "hi");
        assert_eq!(v["streaming"], true);
    }
}
