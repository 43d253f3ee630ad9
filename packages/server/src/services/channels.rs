//! Provisioning and teardown of the spaces one session plays in.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use werewolf_rules::{ChannelId, PlayerId};

use crate::models::config::{GameConfig, SpaceNames};
use crate::platform::{ChatPlatform, PlatformError, Space, VoiceState};

/// Spaces owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSpaces {
    pub village: Option<Space>,
    pub den: Option<Space>,
    pub voice: Option<Space>,
    /// Name the pre-existing voice space had before it was renamed for the game.
    pub voice_original_name: Option<String>,
}

impl SessionSpaces {
    pub fn ids(&self) -> Vec<ChannelId> {
        [&self.village, &self.den, &self.voice]
            .into_iter()
            .flatten()
            .map(|s| s.id)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct TeardownReport {
    pub unmuted: Vec<PlayerId>,
    pub deleted: Vec<ChannelId>,
    pub restored: Option<ChannelId>,
    pub failures: Vec<(ChannelId, PlatformError)>,
}

pub struct ChannelOrchestrator {
    platform: Arc<dyn ChatPlatform>,
    names: SpaceNames,
    voice_channel: Option<ChannelId>,
    attempts: u32,
    backoff: Duration,
    spaces: SessionSpaces,
    muted: BTreeSet<PlayerId>,
}

impl ChannelOrchestrator {
    pub fn new(platform: Arc<dyn ChatPlatform>, config: &GameConfig) -> Self {
        Self {
            platform,
            names: config.space_names.clone(),
            voice_channel: config.voice_channel,
            attempts: config.provision_attempts.max(1),
            backoff: config.provision_backoff,
            spaces: SessionSpaces::default(),
            muted: BTreeSet::new(),
        }
    }

    pub fn spaces(&self) -> &SessionSpaces {
        &self.spaces
    }

    pub fn village(&self) -> Option<ChannelId> {
        self.spaces.village.as_ref().map(|s| s.id)
    }

    pub fn den(&self) -> Option<ChannelId> {
        self.spaces.den.as_ref().map(|s| s.id)
    }

    /// Create the village, the den and the voice space under `origin`.
    ///
    /// Spaces created by an earlier attempt are kept, so a retry only creates what is missing.
    /// Backoff doubles after every failed attempt.
    pub async fn provision(&mut self, origin: ChannelId) -> Result<&SessionSpaces, PlatformError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.try_provision(origin).await {
                Ok(()) => {
                    tracing::info!(spaces = ?self.spaces.ids(), "spaces provisioned");
                    return Ok(&self.spaces);
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(attempt, "provisioning failed, retrying in {:?}: {}", delay, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, "provisioning failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn try_provision(&mut self, origin: ChannelId) -> Result<(), PlatformError> {
        if self.spaces.village.is_none() {
            let village = self
                .platform
                .create_text_space(origin, &self.names.village)
                .await?;
            self.spaces.village = Some(village);
        }
        if self.spaces.den.is_none() {
            let parent = self.village().unwrap_or(origin);
            let den = self
                .platform
                .create_private_thread(parent, &self.names.wolf_den)
                .await?;
            self.spaces.den = Some(den);
        }
        if self.spaces.voice.is_none() {
            let voice = match self.voice_channel {
                Some(existing) => {
                    let current = self.platform.fetch_space(existing).await?;
                    self.platform.rename_space(existing, &self.names.voice).await?;
                    self.spaces.voice_original_name = Some(current.name.clone());
                    Space {
                        name: self.names.voice.clone(),
                        ..current
                    }
                }
                None => {
                    self.platform
                        .create_voice_space(origin, &self.names.voice)
                        .await?
                }
            };
            self.spaces.voice = Some(voice);
        }
        Ok(())
    }

    /// Add werewolves to the den thread.
    pub async fn admit_werewolves(&self, wolves: &[PlayerId]) {
        let Some(den) = self.den() else {
            return;
        };
        for wolf in wolves {
            if let Err(e) = self.platform.add_member(den, *wolf).await {
                tracing::warn!(%wolf, "failed to add werewolf to the den: {}", e);
            }
        }
    }

    /// A real player died: leave the den if they were in it, and go quiet in voice.
    pub async fn player_died(&mut self, player: PlayerId, was_werewolf: bool) {
        if was_werewolf {
            if let Some(den) = self.den() {
                if let Err(e) = self.platform.remove_member(den, player).await {
                    tracing::warn!(%player, "failed to remove dead werewolf from the den: {}", e);
                }
            }
        }
        match self.platform.set_voice_state(player, VoiceState::MUTED).await {
            Ok(()) => {
                self.muted.insert(player);
            }
            Err(e) => tracing::warn!(%player, "failed to mute dead player: {}", e),
        }
    }

    pub fn muted(&self) -> &BTreeSet<PlayerId> {
        &self.muted
    }

    /// Release everything this session holds.
    ///
    /// Voice restrictions are lifted before any space goes away. A repurposed voice space gets
    /// its name back instead of being deleted. The den thread goes before the spaces it lives
    /// in, each space is fetched again right before it is deleted, and one failure does not
    /// stop the others.
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        for player in std::mem::take(&mut self.muted) {
            match self.platform.set_voice_state(player, VoiceState::default()).await {
                Ok(()) => report.unmuted.push(player),
                Err(e) => tracing::warn!(%player, "failed to clear voice state: {}", e),
            }
        }

        let spaces = std::mem::take(&mut self.spaces);
        let threads: Vec<ChannelId> = spaces.den.iter().map(|s| s.id).collect();
        let mut doomed: Vec<ChannelId> = spaces.village.iter().map(|s| s.id).collect();
        if let Some(voice) = &spaces.voice {
            match &spaces.voice_original_name {
                Some(name) => match self.platform.rename_space(voice.id, name).await {
                    Ok(()) => report.restored = Some(voice.id),
                    Err(e) => {
                        tracing::warn!(space = %voice.id, "failed to restore voice space name: {}", e);
                        report.failures.push((voice.id, e));
                    }
                },
                None => doomed.push(voice.id),
            }
        }

        // Threads first, since deleting a parent takes its threads along.
        let mut results = self.delete_all(threads).await;
        results.extend(self.delete_all(doomed).await);

        for (id, result) in results {
            match result {
                Ok(()) => report.deleted.push(id),
                Err(e) => {
                    tracing::warn!(space = %id, "failed to delete space: {}", e);
                    report.failures.push((id, e));
                }
            }
        }
        tracing::info!(
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            unmuted = report.unmuted.len(),
            "teardown finished"
        );
        report
    }

    /// Re-fetch and delete each space concurrently. A space that is already gone counts as
    /// deleted.
    async fn delete_all(&self, ids: Vec<ChannelId>) -> Vec<(ChannelId, Result<(), PlatformError>)> {
        let platform = &self.platform;
        join_all(ids.into_iter().map(|id| async move {
            let result = async {
                let fresh = platform.fetch_space(id).await?;
                platform.delete_space(fresh.id).await
            }
            .await;
            match result {
                Err(PlatformError::NotFound(_)) => {
                    tracing::debug!(space = %id, "space already gone");
                    (id, Ok(()))
                }
                other => (id, other),
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryPlatform, PlatformCall, SpaceKind};

    fn orchestrator(platform: &MemoryPlatform, config: &GameConfig) -> ChannelOrchestrator {
        ChannelOrchestrator::new(Arc::new(platform.clone()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_retries_only_what_is_missing() {
        let platform = MemoryPlatform::new();
        let mut channels = orchestrator(&platform, &GameConfig::default());
        platform.fail_next_creates(2).await;

        let spaces = channels.provision(ChannelId(1)).await.unwrap().clone();
        let den = spaces.den.unwrap();
        assert_eq!(den.kind, SpaceKind::Thread);
        assert_eq!(den.parent, spaces.village.as_ref().map(|v| v.id));
        assert_eq!(platform.live_spaces().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_gives_up_after_the_configured_attempts() {
        let platform = MemoryPlatform::new();
        let config = GameConfig {
            provision_attempts: 2,
            ..GameConfig::default()
        };
        let mut channels = orchestrator(&platform, &config);
        platform.fail_next_creates(5).await;

        assert!(matches!(
            channels.provision(ChannelId(1)).await,
            Err(PlatformError::Transport(_))
        ));
        channels.teardown().await;
        assert!(platform.live_spaces().await.is_empty());
    }

    #[tokio::test]
    async fn teardown_unmutes_before_deleting_anything() {
        let platform = MemoryPlatform::new();
        let mut channels = orchestrator(&platform, &GameConfig::default());
        channels.provision(ChannelId(1)).await.unwrap();
        channels.admit_werewolves(&[PlayerId(2)]).await;

        channels.player_died(PlayerId(2), true).await;
        channels.player_died(PlayerId(3), false).await;
        let den = channels.den().unwrap();
        assert!(platform.members(den).await.is_empty());
        assert_eq!(platform.restricted_voice_states().await.len(), 2);

        let report = channels.teardown().await;
        assert_eq!(report.unmuted, vec![PlayerId(2), PlayerId(3)]);
        assert_eq!(report.deleted.len(), 3);
        assert!(platform.restricted_voice_states().await.is_empty());
        assert!(platform.live_spaces().await.is_empty());

        let calls = platform.calls().await;
        let last_unmute = calls
            .iter()
            .rposition(|c| matches!(c, PlatformCall::SetVoiceState { .. }))
            .unwrap();
        let first_delete = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::DeleteSpace(_)))
            .unwrap();
        assert!(last_unmute < first_delete);
    }

    #[tokio::test]
    async fn repurposed_voice_space_gets_its_name_back() {
        let platform = MemoryPlatform::new();
        platform
            .add_existing_space(ChannelId(500), "General Voice", SpaceKind::Voice)
            .await;
        let config = GameConfig {
            voice_channel: Some(ChannelId(500)),
            ..GameConfig::default()
        };
        let mut channels = orchestrator(&platform, &config);
        channels.provision(ChannelId(1)).await.unwrap();
        assert_eq!(
            platform.space(ChannelId(500)).await.unwrap().name,
            "Werewolf Village"
        );

        let report = channels.teardown().await;
        assert_eq!(report.restored, Some(ChannelId(500)));
        assert_eq!(
            platform.space(ChannelId(500)).await.unwrap().name,
            "General Voice"
        );
        assert_eq!(platform.live_spaces().await.len(), 1);
    }

    #[tokio::test]
    async fn den_is_deleted_before_its_village() {
        let platform = MemoryPlatform::new();
        let mut channels = orchestrator(&platform, &GameConfig::default());
        channels.provision(ChannelId(1)).await.unwrap();
        let village = channels.village().unwrap();
        let den = channels.den().unwrap();

        let report = channels.teardown().await;
        assert!(report.failures.is_empty());
        assert_eq!(report.deleted.len(), 3);

        let calls = platform.calls().await;
        let position = |id| {
            calls
                .iter()
                .position(|c| *c == PlatformCall::DeleteSpace(id))
                .unwrap()
        };
        assert!(position(den) < position(village));
    }

    #[tokio::test]
    async fn spaces_removed_elsewhere_count_as_deleted() {
        let platform = MemoryPlatform::new();
        let mut channels = orchestrator(&platform, &GameConfig::default());
        channels.provision(ChannelId(1)).await.unwrap();
        let village = channels.village().unwrap();
        platform.delete_space(village).await.unwrap();

        let report = channels.teardown().await;
        assert!(report.failures.is_empty());
        assert_eq!(report.deleted.len(), 3);
        assert!(platform.live_spaces().await.is_empty());
    }

    #[tokio::test]
    async fn one_failed_deletion_does_not_stop_the_others() {
        let platform = MemoryPlatform::new();
        let mut channels = orchestrator(&platform, &GameConfig::default());
        channels.provision(ChannelId(1)).await.unwrap();
        let village = channels.village().unwrap();
        platform.fail_delete(village).await;

        let report = channels.teardown().await;
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, village);
        assert_eq!(platform.live_spaces().await.len(), 1);
    }
}
