//! Persistence collaborator
//!
//! The session orchestrator reads and writes session and user records only
//! through [`SessionStore`]. Two implementations ship with the crate:
//! `MemoryStore` (tests, console sessions) and `JsonFileStore` (one JSON
//! document per record under a data directory).

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stored record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted coaching session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub topic: String,
    pub coaching_option: String,
    pub expert_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Raw conversation data; may be nested or malformed
    #[serde(default)]
    pub conversation: Option<Value>,
    #[serde(default)]
    pub session_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(
        topic: impl Into<String>,
        coaching_option: impl Into<String>,
        expert_name: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            coaching_option: coaching_option.into(),
            expert_name: expert_name.into(),
            user_id,
            conversation: None,
            session_feedback: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub credits: i64,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, credits: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            credits,
        }
    }
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the new session id
    async fn create_session(
        &self,
        topic: &str,
        coaching_option: &str,
        expert_name: &str,
        user_id: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn get_session(&self, id: &str) -> Result<SessionRecord, StoreError>;

    /// Replace the stored conversation
    async fn update_conversation(&self, id: &str, conversation: Value) -> Result<(), StoreError>;

    async fn update_session_feedback(&self, id: &str, feedback: &str) -> Result<(), StoreError>;

    /// Set the user's balance
    async fn update_user_credits(&self, user_id: &str, credits: i64) -> Result<(), StoreError>;

    async fn get_user_credits(&self, user_id: &str) -> Result<i64, StoreError>;

    /// Returns the new user id
    async fn create_user(&self, name: &str, credits: i64) -> Result<String, StoreError>;
}
