use std::{collections::HashMap, sync::Arc};
use tokio::sync::{broadcast, Mutex};
use werewolf_rules::ChannelId;

use crate::models::config::GameConfig;
use crate::models::session::FeedEvent;
use crate::platform::{ChatPlatform, MemoryPlatform};
use crate::services::entitlement::{EntitlementStore, StaticEntitlements, SupabaseEntitlements};
use crate::services::narration::{LogNarrator, Narrator};
use crate::services::rewards::{RecordingRewards, RewardSink, SupabaseRewards};
use crate::services::session::{SessionDeps, SessionHandle};
use crate::services::supabase::SupabaseRest;
use crate::utils::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    /// Live session per origin channel.
    pub sessions: Arc<Mutex<HashMap<ChannelId, SessionHandle>>>,
    /// Spectator feed per origin channel. Kept while a session or a spectator uses it.
    pub channel: Arc<Mutex<HashMap<ChannelId, broadcast::Sender<FeedEvent>>>>,
    pub platform: Arc<dyn ChatPlatform>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub rewards: Arc<dyn RewardSink>,
    pub narrator: Arc<dyn Narrator>,
    pub game_config: Arc<GameConfig>,
    pub server_config: Arc<ServerConfig>,
}

impl AppState {
    /// Supabase-backed entitlements and rewards when configured, in-process stand-ins otherwise.
    pub fn new(server_config: ServerConfig, game_config: GameConfig) -> Self {
        let state = Self::in_memory(server_config, game_config);
        match state.server_config.supabase.clone() {
            Some(supabase) => {
                let rest = SupabaseRest::new(&supabase);
                state
                    .with_entitlements(Arc::new(SupabaseEntitlements::new(rest.clone())))
                    .with_rewards(Arc::new(SupabaseRewards::new(rest)))
            }
            None => {
                tracing::warn!("SUPABASE_URL not set, every optional role is unlocked and rewards stay in memory");
                state
            }
        }
    }

    pub fn in_memory(server_config: ServerConfig, game_config: GameConfig) -> Self {
        AppState {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            channel: Arc::new(Mutex::new(HashMap::new())),
            platform: Arc::new(MemoryPlatform::new()),
            entitlements: Arc::new(StaticEntitlements::everything()),
            rewards: Arc::new(RecordingRewards::new()),
            narrator: Arc::new(LogNarrator),
            game_config: Arc::new(game_config),
            server_config: Arc::new(server_config),
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementStore>) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_rewards(mut self, rewards: Arc<dyn RewardSink>) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    pub async fn get_or_create_feed(&self, origin: ChannelId) -> broadcast::Sender<FeedEvent> {
        let mut channels = self.channel.lock().await;
        if let Some(channel) = channels.get(&origin) {
            channel.clone()
        } else {
            let (tx, _) = broadcast::channel(1000);
            channels.insert(origin, tx.clone());
            tx
        }
    }

    /// Forget an origin's feed once no session plays there and nobody is watching.
    pub async fn release_feed(&self, origin: ChannelId) {
        let sessions = self.sessions.lock().await;
        if sessions.get(&origin).map_or(false, |h| !h.is_closed()) {
            return;
        }
        let mut channels = self.channel.lock().await;
        if channels
            .get(&origin)
            .map_or(false, |tx| tx.receiver_count() == 0)
        {
            channels.remove(&origin);
            tracing::debug!(%origin, "feed released");
        }
    }

    pub fn session_deps(&self, feed: broadcast::Sender<FeedEvent>) -> SessionDeps {
        SessionDeps {
            platform: self.platform.clone(),
            entitlements: self.entitlements.clone(),
            rewards: self.rewards.clone(),
            narrator: self.narrator.clone(),
            feed,
            config: self.game_config.clone(),
        }
    }
}
