use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use werewolf_rules::PlayerId;

use super::supabase::SupabaseRest;
use crate::error::ExternalError;

#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn grant(&self, user: PlayerId, amount: i64, reason: &str) -> Result<(), ExternalError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub user_id: PlayerId,
    pub amount: i64,
    pub reason: String,
}

/// Calls the `grant_reward` database function of the economy ledger.
#[derive(Clone)]
pub struct SupabaseRewards {
    rest: SupabaseRest,
}

impl SupabaseRewards {
    pub fn new(rest: SupabaseRest) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl RewardSink for SupabaseRewards {
    async fn grant(&self, user: PlayerId, amount: i64, reason: &str) -> Result<(), ExternalError> {
        let grant = Grant {
            user_id: user,
            amount,
            reason: reason.to_string(),
        };
        self.rest.rpc("grant_reward", &grant).await
    }
}

/// Keeps every grant in memory.
#[derive(Debug, Default)]
pub struct RecordingRewards {
    grants: Mutex<Vec<Grant>>,
}

impl RecordingRewards {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grants(&self) -> Vec<Grant> {
        self.grants.lock().await.clone()
    }
}

#[async_trait]
impl RewardSink for RecordingRewards {
    async fn grant(&self, user: PlayerId, amount: i64, reason: &str) -> Result<(), ExternalError> {
        tracing::info!(%user, amount, reason, "reward granted");
        self.grants.lock().await.push(Grant {
            user_id: user,
            amount,
            reason: reason.to_string(),
        });
        Ok(())
    }
}
