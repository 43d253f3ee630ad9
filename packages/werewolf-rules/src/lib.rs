//! Pure Werewolf rules: roles, seating, night resolution, day votes and victory checks.
//!
//! Nothing in this crate performs I/O or sleeps. The session engine in `werewolf-server` drives a
//! [`Game`] through its phases and feeds it the actions players submit.

pub mod assign;
pub mod error;
pub mod filler;
pub mod game;
pub mod narration;
pub mod night;
pub mod player;
pub mod role;
pub mod vote;
pub mod win;

pub use assign::{assign_roles, plan_roles, PlayerLimits, QuotaTier, RolePlan, RoleThresholds};
pub use error::{ActionError, SetupError};
pub use game::{ChannelId, Game, GamePhase, SessionId};
pub use narration::{NarrationTiming, PauseCategory};
pub use night::{Death, DeathCause, Inspection, NightAction, NightActionKind, NightResolution};
pub use player::{Player, PlayerId, Seat, SeatKind};
pub use role::{AbilityUse, Role, RoleSet, RoleSpec, Team};
pub use vote::{Ballot, TallyResult, VoteOutcome, VoteTarget};
pub use win::{Victory, WinReport};
