use super::{SessionRecord, SessionStore, StoreError, UserRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One pretty-printed JSON document per record:
/// `{data_dir}/sessions/{id}.json` and `{data_dir}/users/{id}.json`
pub struct JsonFileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("sessions")).await?;
        tokio::fs::create_dir_all(root.join("users")).await?;
        info!("JSON file store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("sessions").join(format!("{}.json", valid_id(id)?)))
    }

    fn user_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("users").join(format!("{}.json", valid_id(id)?)))
    }

    async fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file and rename over the target
    async fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<SessionRecord, StoreError> {
        Self::read(&self.session_path(id)?)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    async fn load_user(&self, id: &str) -> Result<UserRecord, StoreError> {
        Self::read(&self.user_path(id)?)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }
}

// Ids become file names
fn valid_id(id: &str) -> Result<&str, StoreError> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(id)
    } else {
        Err(StoreError::Unavailable(format!("invalid record id: {:?}", id)))
    }
}

#[async_trait::async_trait]
impl SessionStore for JsonFileStore {
    async fn create_session(
        &self,
        topic: &str,
        coaching_option: &str,
        expert_name: &str,
        user_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let record = SessionRecord::new(topic, coaching_option, expert_name, user_id.map(str::to_string));
        let _guard = self.write_lock.lock().await;
        Self::write(&self.session_path(&record.id)?, &record).await?;
        Ok(record.id)
    }

    async fn get_session(&self, id: &str) -> Result<SessionRecord, StoreError> {
        self.load_session(id).await
    }

    async fn update_conversation(&self, id: &str, conversation: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_session(id).await?;
        record.conversation = Some(conversation);
        Self::write(&self.session_path(id)?, &record).await
    }

    async fn update_session_feedback(&self, id: &str, feedback: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_session(id).await?;
        record.session_feedback = Some(feedback.to_string());
        Self::write(&self.session_path(id)?, &record).await
    }

    async fn update_user_credits(&self, user_id: &str, credits: i64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut user = self.load_user(user_id).await?;
        user.credits = credits;
        Self::write(&self.user_path(user_id)?, &user).await
    }

    async fn get_user_credits(&self, user_id: &str) -> Result<i64, StoreError> {
        Ok(self.load_user(user_id).await?.credits)
    }

    async fn create_user(&self, name: &str, credits: i64) -> Result<String, StoreError> {
        let user = UserRecord::new(name, credits);
        let _guard = self.write_lock.lock().await;
        Self::write(&self.user_path(&user.id)?, &user).await?;
        Ok(user.id)
    }
}
