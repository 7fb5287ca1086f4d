use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in the coaching conversation
///
/// Messages are immutable once appended to a buffer. Two messages are the
/// same turn when their `(role, content)` pair matches; the feedback flag and
/// the duplicate marker do not take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Marks the end-of-session feedback artifact (never a normal turn)
    #[serde(
        rename = "isFeedbackSummary",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_feedback_summary: bool,

    /// Disambiguating marker set when a reply repeats an earlier one verbatim
    #[serde(rename = "_uniqueId", default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_feedback_summary: false,
            unique_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant message carrying session feedback
    pub fn feedback(content: impl Into<String>) -> Self {
        Self {
            is_feedback_summary: true,
            ..Self::assistant(content)
        }
    }

    /// Dedup identity
    pub fn identity(&self) -> (Role, &str) {
        (self.role, self.content.as_str())
    }

    /// Read a message out of an arbitrary JSON value.
    ///
    /// Only objects with a known `role` and a non-empty string `content`
    /// count as messages; anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let role = object.get("role").and_then(Value::as_str).and_then(Role::parse)?;
        let content = object.get("content").and_then(Value::as_str)?;
        if content.is_empty() {
            return None;
        }

        Some(Self {
            role,
            content: content.to_string(),
            is_feedback_summary: object
                .get("isFeedbackSummary")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            unique_id: object
                .get("_uniqueId")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
