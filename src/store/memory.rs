use super::{SessionRecord, SessionStore, StoreError, UserRecord};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prepared record, e.g. one carrying a legacy conversation
    pub async fn insert_session(&self, record: SessionRecord) {
        self.sessions.write().await.insert(record.id.clone(), record);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        topic: &str,
        coaching_option: &str,
        expert_name: &str,
        user_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let record = SessionRecord::new(topic, coaching_option, expert_name, user_id.map(str::to_string));
        let id = record.id.clone();
        self.sessions.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_session(&self, id: &str) -> Result<SessionRecord, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    async fn update_conversation(&self, id: &str, conversation: Value) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        record.conversation = Some(conversation);
        Ok(())
    }

    async fn update_session_feedback(&self, id: &str, feedback: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        record.session_feedback = Some(feedback.to_string());
        Ok(())
    }

    async fn update_user_credits(&self, user_id: &str, credits: i64) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))?;
        user.credits = credits;
        Ok(())
    }

    async fn get_user_credits(&self, user_id: &str) -> Result<i64, StoreError> {
        self.users
            .read()
            .await
            .get(user_id)
            .map(|u| u.credits)
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    async fn create_user(&self, name: &str, credits: i64) -> Result<String, StoreError> {
        let user = UserRecord::new(name, credits);
        let id = user.id.clone();
        self.users.write().await.insert(id.clone(), user);
        Ok(id)
    }
}
