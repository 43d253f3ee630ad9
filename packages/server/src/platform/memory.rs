use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use werewolf_rules::{ChannelId, PlayerId};

use super::{ChatPlatform, PlatformError, Space, SpaceKind, VoiceState};
use crate::models::chat::{ChatLog, ChatMessage, ChatMessageType};

/// Every call the platform received, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformCall {
    CreateSpace {
        id: ChannelId,
        kind: SpaceKind,
        name: String,
    },
    FetchSpace(ChannelId),
    RenameSpace {
        id: ChannelId,
        name: String,
    },
    DeleteSpace(ChannelId),
    AddMember {
        space: ChannelId,
        user: PlayerId,
    },
    RemoveMember {
        space: ChannelId,
        user: PlayerId,
    },
    SetVoiceState {
        user: PlayerId,
        state: VoiceState,
    },
    SendMessage(ChannelId),
    SendDirect(PlayerId),
}

struct SpaceRecord {
    space: Space,
    members: BTreeSet<PlayerId>,
}

struct Inner {
    next_id: u64,
    spaces: BTreeMap<ChannelId, SpaceRecord>,
    voice: BTreeMap<PlayerId, VoiceState>,
    log: ChatLog,
    calls: Vec<PlatformCall>,
    create_failures: u32,
    delete_failures: BTreeSet<ChannelId>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            next_id: 10_000,
            spaces: BTreeMap::new(),
            voice: BTreeMap::new(),
            log: ChatLog::default(),
            calls: Vec::new(),
            create_failures: 0,
            delete_failures: BTreeSet::new(),
        }
    }
}

impl Inner {
    fn create(
        &mut self,
        parent: ChannelId,
        name: &str,
        kind: SpaceKind,
    ) -> Result<Space, PlatformError> {
        if self.create_failures > 0 {
            self.create_failures -= 1;
            return Err(PlatformError::Transport("injected create failure".to_string()));
        }
        self.next_id += 1;
        let space = Space {
            id: ChannelId(self.next_id),
            name: name.to_string(),
            kind,
            parent: Some(parent),
        };
        self.calls.push(PlatformCall::CreateSpace {
            id: space.id,
            kind,
            name: space.name.clone(),
        });
        self.spaces.insert(
            space.id,
            SpaceRecord {
                space: space.clone(),
                members: BTreeSet::new(),
            },
        );
        Ok(space)
    }

    fn record(&mut self, id: ChannelId) -> Result<&mut SpaceRecord, PlatformError> {
        self.spaces.get_mut(&id).ok_or(PlatformError::NotFound(id))
    }
}

/// In-process chat platform. Backs the HTTP server when no external platform is wired in, and
/// records every call so tests can assert on ordering and leftovers.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a space that exists before any session, such as a voice channel to repurpose.
    pub async fn add_existing_space(&self, id: ChannelId, name: &str, kind: SpaceKind) {
        let mut inner = self.inner.lock().await;
        inner.spaces.insert(
            id,
            SpaceRecord {
                space: Space {
                    id,
                    name: name.to_string(),
                    kind,
                    parent: None,
                },
                members: BTreeSet::new(),
            },
        );
    }

    pub async fn fail_next_creates(&self, count: u32) {
        self.inner.lock().await.create_failures = count;
    }

    pub async fn fail_delete(&self, id: ChannelId) {
        self.inner.lock().await.delete_failures.insert(id);
    }

    pub async fn live_spaces(&self) -> Vec<Space> {
        let inner = self.inner.lock().await;
        inner.spaces.values().map(|r| r.space.clone()).collect()
    }

    pub async fn space(&self, id: ChannelId) -> Option<Space> {
        let inner = self.inner.lock().await;
        inner.spaces.get(&id).map(|r| r.space.clone())
    }

    pub async fn members(&self, id: ChannelId) -> BTreeSet<PlayerId> {
        let inner = self.inner.lock().await;
        inner
            .spaces
            .get(&id)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    /// Members currently carrying a non-default voice state.
    pub async fn restricted_voice_states(&self) -> BTreeMap<PlayerId, VoiceState> {
        let inner = self.inner.lock().await;
        inner
            .voice
            .iter()
            .filter(|(_, state)| **state != VoiceState::default())
            .map(|(user, state)| (*user, *state))
            .collect()
    }

    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn chat_log(&self) -> ChatLog {
        self.inner.lock().await.log.clone()
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    async fn create_text_space(&self, parent: ChannelId, name: &str) -> Result<Space, PlatformError> {
        self.inner.lock().await.create(parent, name, SpaceKind::Text)
    }

    async fn create_voice_space(&self, parent: ChannelId, name: &str) -> Result<Space, PlatformError> {
        self.inner.lock().await.create(parent, name, SpaceKind::Voice)
    }

    async fn create_private_thread(
        &self,
        parent: ChannelId,
        name: &str,
    ) -> Result<Space, PlatformError> {
        self.inner.lock().await.create(parent, name, SpaceKind::Thread)
    }

    async fn fetch_space(&self, id: ChannelId) -> Result<Space, PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::FetchSpace(id));
        inner.record(id).map(|r| r.space.clone())
    }

    async fn rename_space(&self, id: ChannelId, name: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::RenameSpace {
            id,
            name: name.to_string(),
        });
        inner.record(id)?.space.name = name.to_string();
        Ok(())
    }

    async fn delete_space(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::DeleteSpace(id));
        if inner.delete_failures.contains(&id) {
            return Err(PlatformError::Forbidden(format!("cannot delete {}", id)));
        }
        inner.spaces.remove(&id).ok_or(PlatformError::NotFound(id))?;
        // Threads go with their parent.
        inner
            .spaces
            .retain(|_, r| !(r.space.kind == SpaceKind::Thread && r.space.parent == Some(id)));
        Ok(())
    }

    async fn add_member(&self, space: ChannelId, user: PlayerId) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::AddMember { space, user });
        inner.record(space)?.members.insert(user);
        Ok(())
    }

    async fn remove_member(&self, space: ChannelId, user: PlayerId) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::RemoveMember { space, user });
        inner.record(space)?.members.remove(&user);
        Ok(())
    }

    async fn send_message(&self, space: ChannelId, content: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::SendMessage(space));
        let message_type = match inner.spaces.get(&space).map(|r| r.space.kind) {
            Some(SpaceKind::Thread) => ChatMessageType::Wolf,
            Some(_) => ChatMessageType::Public,
            None => return Err(PlatformError::NotFound(space)),
        };
        inner
            .log
            .add_message(ChatMessage::to_space(space, content.to_string(), message_type));
        Ok(())
    }

    async fn send_direct(&self, user: PlayerId, content: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::SendDirect(user));
        inner
            .log
            .add_message(ChatMessage::direct(user, content.to_string()));
        Ok(())
    }

    async fn set_voice_state(&self, user: PlayerId, state: VoiceState) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PlatformCall::SetVoiceState { user, state });
        inner.voice.insert(user, state);
        Ok(())
    }
}
