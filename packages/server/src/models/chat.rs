use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use werewolf_rules::{ChannelId, PlayerId};

/// Messages the bot has delivered, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLog {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub space: Option<ChannelId>,
    pub recipient: Option<PlayerId>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: ChatMessageType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    /// Shared discussion space.
    Public,
    /// Werewolf den thread.
    Wolf,
    /// Direct message to one player.
    Private,
}

impl ChatLog {
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn get_messages_by_type(&self, message_type: ChatMessageType) -> Vec<&ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.message_type == message_type)
            .collect()
    }

    pub fn direct_messages_to(&self, player: PlayerId) -> Vec<&ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.recipient == Some(player))
            .collect()
    }
}

impl ChatMessage {
    pub fn to_space(space: ChannelId, content: String, message_type: ChatMessageType) -> Self {
        ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            space: Some(space),
            recipient: None,
            content,
            timestamp: Utc::now(),
            message_type,
        }
    }

    pub fn direct(recipient: PlayerId, content: String) -> Self {
        ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            space: None,
            recipient: Some(recipient),
            content,
            timestamp: Utc::now(),
            message_type: ChatMessageType::Private,
        }
    }
}
