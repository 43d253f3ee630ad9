use crate::game::GamePhase;
use crate::player::PlayerId;
use crate::role::Role;

/// Fatal to one start attempt. Reported to the initiator, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("not enough players: {have} seated, {need} required")]
    NotEnoughPlayers { have: usize, need: usize },
    #[error("too many players: {have} seated, at most {max} allowed")]
    TooManyPlayers { have: usize, max: usize },
    #[error("role quotas cannot fit {players} players")]
    QuotaInfeasible { players: usize },
    #[error("seat count {seats} does not match {roles} dealt roles")]
    SeatMismatch { seats: usize, roles: usize },
}

/// A rejected player submission. Logged and dropped; never ends a game.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("player {0} is not seated in this game")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is dead")]
    ActorDead(PlayerId),
    #[error("target {0} is not a living player")]
    InvalidTarget(PlayerId),
    #[error("{0} has no ability to use now")]
    NoAbility(Role),
    #[error("{0} has already used their ability")]
    AbilitySpent(Role),
    #[error("{role} needs {expected} target(s), got {got}")]
    TargetCount {
        role: Role,
        expected: usize,
        got: usize,
    },
    #[error("{0} cannot target that player")]
    ForbiddenTarget(Role),
    #[error("not accepted during {0:?}")]
    WrongPhase(GamePhase),
}
