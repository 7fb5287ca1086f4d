use super::message::{Message, Role};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upper bound on retained messages; oldest entries are trimmed first
pub const MAX_MESSAGES: usize = 50;

/// Number of trailing messages sent to the model as context
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Recursively flatten nested arrays, keeping well-formed messages in
/// encounter order. A non-array top level yields nothing.
pub fn flatten(value: &Value) -> Vec<Message> {
    fn descend(items: &[Value], out: &mut Vec<Message>) {
        for item in items {
            match item {
                Value::Array(nested) => descend(nested, out),
                other => {
                    if let Some(message) = Message::from_value(other) {
                        out.push(message);
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    match value {
        Value::Array(items) => descend(items, &mut out),
        Value::Null => {}
        other => warn!("Ignoring non-array conversation data: {}", kind_of(other)),
    }
    out
}

/// Drop every message whose `(role, content)` pair was already kept; first
/// occurrence wins.
pub fn dedup(messages: Vec<Message>) -> Vec<Message> {
    let mut seen: HashSet<(Role, String)> = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|m| seen.insert((m.role, m.content.clone())))
        .collect()
}

/// Keep only the most recent `max` messages
pub fn cap(mut messages: Vec<Message>, max: usize) -> Vec<Message> {
    if messages.len() > max {
        messages.drain(..messages.len() - max);
    }
    messages
}

/// Flatten, dedup and cap raw conversation data.
///
/// Idempotent: `sanitize(&to_value(sanitize(x))) == sanitize(x)`.
pub fn sanitize(value: &Value) -> Vec<Message> {
    let flattened = flatten(value);
    let flattened_len = flattened.len();
    let deduplicated = dedup(flattened);
    let deduplicated_len = deduplicated.len();
    let limited = cap(deduplicated, MAX_MESSAGES);

    debug!(
        "Cleaned up conversation: {} flattened -> {} deduplicated -> {} limited",
        flattened_len,
        deduplicated_len,
        limited.len()
    );

    limited
}

/// Dedup and cap an already-flat message list
pub fn sanitize_messages(messages: Vec<Message>) -> Vec<Message> {
    cap(dedup(messages), MAX_MESSAGES)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordered, deduplicated, size-bounded conversation log
///
/// The buffer upholds its invariants on every mutation, so `materialize`
/// is just a copy of the current contents.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    messages: Vec<Message>,
    max_messages: usize,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGES)
    }

    pub fn with_limit(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    /// Build a buffer from persisted (possibly malformed) conversation data
    pub fn hydrated(value: &Value) -> Self {
        let mut buffer = Self::new();
        buffer.hydrate(value);
        buffer
    }

    /// Merge persisted conversation data behind the current contents
    pub fn hydrate(&mut self, value: &Value) {
        let mut merged = std::mem::take(&mut self.messages);
        merged.extend(flatten(value));
        self.messages = cap(dedup(merged), self.max_messages);
    }

    /// Append a message. Returns `false` when it duplicates a retained turn.
    pub fn append(&mut self, message: Message) -> bool {
        if self
            .messages
            .iter()
            .any(|m| m.identity() == message.identity())
        {
            debug!(
                "Dropping duplicate {} message ({} chars)",
                message.role,
                message.content.len()
            );
            return false;
        }

        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
        true
    }

    /// Flat, deduplicated, capped copy of the conversation
    pub fn materialize(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The last `n` messages, oldest first
    pub fn window(&self, n: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    /// Whether both the user and the assistant have spoken
    pub fn has_exchange(&self) -> bool {
        has_exchange(&self.messages)
    }

    /// Prior assistant replies, oldest first
    pub fn assistant_contents(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant && !m.is_feedback_summary)
            .map(|m| m.content.as_str())
            .collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Whether a conversation holds at least one message from each role
pub fn has_exchange(messages: &[Message]) -> bool {
    let user = messages.iter().any(|m| m.role == Role::User);
    let assistant = messages
        .iter()
        .any(|m| m.role == Role::Assistant && !m.is_feedback_summary);
    user && assistant
}
