//! Credit accounting for generated replies

use crate::store::{SessionStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Whitespace-token count of a reply
pub fn estimate_cost(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAccount {
    pub credits_remaining: i64,
}

/// In-memory mirror of a user's balance, written through the store
pub struct UsageAccountant {
    store: Arc<dyn SessionStore>,
    user_id: Option<String>,
    account: Option<UsageAccount>,
}

impl UsageAccountant {
    pub fn new(store: Arc<dyn SessionStore>, user_id: Option<String>) -> Self {
        Self {
            store,
            user_id,
            account: None,
        }
    }

    /// Load the persisted balance. Sessions without a user are not metered.
    pub async fn load(&mut self) -> Result<Option<UsageAccount>, StoreError> {
        let Some(user_id) = &self.user_id else {
            return Ok(None);
        };
        let credits = self.store.get_user_credits(user_id).await?;
        let account = UsageAccount {
            credits_remaining: credits,
        };
        self.account = Some(account);
        info!("Loaded {} credits for user {}", credits, user_id);
        Ok(Some(account))
    }

    pub fn account(&self) -> Option<UsageAccount> {
        self.account
    }

    /// Deduct the cost of a generated reply. The mirror only changes once
    /// the persisted write succeeds. Returns the charged cost.
    ///
    /// A balance that failed to load earlier is loaded again first.
    pub async fn charge(&mut self, text: &str) -> Result<u64, StoreError> {
        let account = match self.account {
            Some(account) => account,
            None => match self.load().await? {
                Some(account) => account,
                None => return Ok(0),
            },
        };
        let Some(user_id) = &self.user_id else {
            return Ok(0);
        };

        let cost = estimate_cost(text);
        let balance = account.credits_remaining - cost as i64;
        if let Err(e) = self.store.update_user_credits(user_id, balance).await {
            warn!("Failed to persist credit deduction for {}: {}", user_id, e);
            return Err(e);
        }

        self.account = Some(UsageAccount {
            credits_remaining: balance,
        });
        Ok(cost)
    }
}
