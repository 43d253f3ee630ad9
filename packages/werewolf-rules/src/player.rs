use serde::{Deserialize, Serialize};
use std::fmt;

use crate::night::DeathCause;
use crate::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synthetic seats are numbered down from the top of the id space so they never collide with
/// platform user ids.
const FILLER_BASE: u64 = u64::MAX - 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatKind {
    Human,
    Filler,
}

/// A lobby entry before roles are dealt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: PlayerId,
    pub name: String,
    pub kind: SeatKind,
}

impl Seat {
    pub fn human(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: SeatKind::Human,
        }
    }

    pub fn filler(index: usize) -> Self {
        Self {
            id: PlayerId(FILLER_BASE + index as u64),
            name: format!("Filler {}", index + 1),
            kind: SeatKind::Filler,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub kind: SeatKind,
    pub role: Role,
    pub is_dead: bool,
    pub death: Option<DeathCause>,
    /// Role disclosed to the table.
    pub revealed: bool,
    pub ability_spent: bool,
    /// Last player this guard protected; the same target cannot be chosen two nights running.
    pub last_protected: Option<PlayerId>,
}

impl Player {
    pub fn new(seat: Seat, role: Role) -> Self {
        Self {
            id: seat.id,
            name: seat.name,
            kind: seat.kind,
            role,
            is_dead: false,
            death: None,
            revealed: false,
            ability_spent: false,
            last_protected: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }

    pub fn is_filler(&self) -> bool {
        self.kind == SeatKind::Filler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_ids_do_not_collide_with_low_user_ids() {
        let filler = Seat::filler(0);
        assert_eq!(filler.kind, SeatKind::Filler);
        assert_ne!(filler.id, Seat::filler(1).id);
        assert!(filler.id.0 > 1 << 62);
        assert_eq!(filler.name, "Filler 1");
    }
}
