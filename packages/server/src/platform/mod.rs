//! Chat-platform seam. The session engine only talks to the platform through [`ChatPlatform`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use werewolf_rules::{ChannelId, PlayerId};

pub mod memory;

pub use memory::{MemoryPlatform, PlatformCall};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    Text,
    Voice,
    Thread,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: ChannelId,
    pub name: String,
    pub kind: SpaceKind,
    pub parent: Option<ChannelId>,
}

/// Server-side voice restrictions on one member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    pub mute: bool,
    pub deaf: bool,
}

impl VoiceState {
    pub const MUTED: VoiceState = VoiceState {
        mute: true,
        deaf: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("space {0} not found")]
    NotFound(ChannelId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("platform transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn create_text_space(&self, parent: ChannelId, name: &str) -> Result<Space, PlatformError>;

    async fn create_voice_space(&self, parent: ChannelId, name: &str) -> Result<Space, PlatformError>;

    /// A thread under `parent` visible only to members added explicitly.
    async fn create_private_thread(
        &self,
        parent: ChannelId,
        name: &str,
    ) -> Result<Space, PlatformError>;

    async fn fetch_space(&self, id: ChannelId) -> Result<Space, PlatformError>;

    async fn rename_space(&self, id: ChannelId, name: &str) -> Result<(), PlatformError>;

    async fn delete_space(&self, id: ChannelId) -> Result<(), PlatformError>;

    async fn add_member(&self, space: ChannelId, user: PlayerId) -> Result<(), PlatformError>;

    async fn remove_member(&self, space: ChannelId, user: PlayerId) -> Result<(), PlatformError>;

    async fn send_message(&self, space: ChannelId, content: &str) -> Result<(), PlatformError>;

    async fn send_direct(&self, user: PlayerId, content: &str) -> Result<(), PlatformError>;

    async fn set_voice_state(&self, user: PlayerId, state: VoiceState) -> Result<(), PlatformError>;
}
