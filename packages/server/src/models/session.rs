use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use werewolf_rules::{
    ChannelId, DeathCause, GamePhase, PauseCategory, PlayerId, Role, SeatKind, SessionId,
    VoteTarget, WinReport,
};

use crate::error::EventError;

/// Input to a running session. Everything a player or a timer can do arrives as one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Join { player: PlayerId, name: String },
    Leave { player: PlayerId },
    StartNow { by: PlayerId },
    Cancel { by: PlayerId, operator: bool },
    ToggleRole { by: PlayerId, role: Role },
    ConfirmRoles { by: PlayerId },
    CancelSelection { by: PlayerId },
    Vote { voter: PlayerId, target: VoteTarget },
    /// Night ability targets, or a death-triggered shot (empty to pass).
    NightAction { actor: PlayerId, targets: Vec<PlayerId> },
    Deadline { epoch: u64 },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Join { .. } => "join",
            SessionEvent::Leave { .. } => "leave",
            SessionEvent::StartNow { .. } => "start",
            SessionEvent::Cancel { .. } => "cancel",
            SessionEvent::ToggleRole { .. } => "toggle_role",
            SessionEvent::ConfirmRoles { .. } => "confirm_roles",
            SessionEvent::CancelSelection { .. } => "cancel_selection",
            SessionEvent::Vote { .. } => "vote",
            SessionEvent::NightAction { .. } => "night_action",
            SessionEvent::Deadline { .. } => "deadline",
        }
    }
}

pub type EventReply = oneshot::Sender<Result<(), EventError>>;

pub struct Envelope {
    pub event: SessionEvent,
    /// Absent for timer events.
    pub reply: Option<EventReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Provisioning,
    Lobby,
    RoleSelection,
    Playing,
    Finished,
    Aborted,
}

impl SessionStage {
    pub fn is_closed(self) -> bool {
        matches!(self, SessionStage::Finished | SessionStage::Aborted)
    }
}

/// The input a session is currently collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "window", content = "player", rename_all = "snake_case")]
pub enum InputWindow {
    Lobby,
    RoleSelection,
    Link,
    Pack,
    /// Guard, witch and seer.
    Powers,
    /// A fallen hunter's last shot.
    Reactive(PlayerId),
    Discussion,
    Vote,
}

impl InputWindow {
    /// Roles whose night submissions this window takes.
    pub fn night_roles(self) -> &'static [Role] {
        match self {
            InputWindow::Link => &[Role::Cupid],
            InputWindow::Pack => &[Role::Werewolf],
            InputWindow::Powers => &[Role::Guard, Role::Witch, Role::Seer],
            _ => &[],
        }
    }

    /// Whether the window closes early once every eligible player has submitted.
    pub fn closes_early(self) -> bool {
        matches!(
            self,
            InputWindow::Link
                | InputWindow::Pack
                | InputWindow::Powers
                | InputWindow::Reactive(_)
                | InputWindow::Vote
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            InputWindow::Lobby => "the lobby",
            InputWindow::RoleSelection => "role selection",
            InputWindow::Link => "cupid's turn",
            InputWindow::Pack => "the werewolves' turn",
            InputWindow::Powers => "the night",
            InputWindow::Reactive(_) => "the hunter's last shot",
            InputWindow::Discussion => "discussion",
            InputWindow::Vote => "the vote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub kind: SeatKind,
    pub alive: bool,
    /// Disclosed roles only, unless the server is configured to show everything.
    pub role: Option<Role>,
    pub death: Option<DeathCause>,
}

/// Public state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub session_id: SessionId,
    pub origin: ChannelId,
    pub initiator: PlayerId,
    pub stage: SessionStage,
    pub phase: GamePhase,
    pub awaiting: Option<InputWindow>,
    pub night: u32,
    pub day: u32,
    pub players: Vec<PlayerView>,
    pub offered_roles: Vec<Role>,
    pub enabled_roles: Vec<Role>,
    pub spaces: Vec<ChannelId>,
    pub outcome: Option<WinReport>,
    pub abort_reason: Option<String>,
}

impl GameSnapshot {
    pub fn new(session_id: SessionId, origin: ChannelId, initiator: PlayerId) -> Self {
        Self {
            session_id,
            origin,
            initiator,
            stage: SessionStage::Provisioning,
            phase: GamePhase::Lobby,
            awaiting: None,
            night: 0,
            day: 0,
            players: Vec::new(),
            offered_roles: Vec::new(),
            enabled_roles: Vec::new(),
            spaces: Vec::new(),
            outcome: None,
            abort_reason: None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// What WebSocket subscribers of an origin channel receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum FeedEvent {
    PhaseChange {
        origin: ChannelId,
        from_phase: GamePhase,
        to_phase: GamePhase,
        timestamp: DateTime<Utc>,
    },
    Announcement {
        origin: ChannelId,
        content: String,
        duration_ms: Option<u64>,
        category: Option<PauseCategory>,
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_events_are_tagged_by_message_type() {
        let event = FeedEvent::PhaseChange {
            origin: ChannelId(5),
            from_phase: GamePhase::Night,
            to_phase: GamePhase::DayDiscussion,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message_type"], "phase_change");
        assert_eq!(json["to_phase"], "day_discussion");
        assert_eq!(json["origin"], 5);
    }
}
