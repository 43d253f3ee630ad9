use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{ActionError, SetupError};
use crate::night::{Death, DeathCause, NightAction, NightActionKind};
use crate::player::{Player, PlayerId, Seat};
use crate::role::{Role, RoleSet};
use crate::vote::{tally, Ballot, TallyResult, VoteTarget};
use crate::win::Victory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Lobby,
    Night,
    DayDiscussion,
    DayVote,
    Resolution,
    GameOver,
}

/// One seated playthrough. Owned by exactly one session task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Game {
    pub id: SessionId,
    pub origin: ChannelId,
    pub phase: GamePhase,
    pub players: Vec<Player>,
    pub role_set: RoleSet,
    pub night: u32,
    pub day: u32,
    pub votes: BTreeMap<PlayerId, Ballot>,
    pub night_actions: BTreeMap<PlayerId, NightAction>,
    /// Werewolf target for the current night once the pack's choice is closed.
    pub team_target: Option<PlayerId>,
    /// Symmetric pair bound by Cupid.
    pub link: Option<(PlayerId, PlayerId)>,
    pub spaces: Vec<ChannelId>,
    pub outcome: Option<Victory>,
}

impl Game {
    /// Seat `seats[i]` with `roles[i]`.
    pub fn new(
        id: SessionId,
        origin: ChannelId,
        seats: Vec<Seat>,
        roles: Vec<Role>,
        role_set: RoleSet,
    ) -> Result<Self, SetupError> {
        if seats.len() != roles.len() {
            return Err(SetupError::SeatMismatch {
                seats: seats.len(),
                roles: roles.len(),
            });
        }
        let players = seats
            .into_iter()
            .zip(roles)
            .map(|(seat, role)| Player::new(seat, role))
            .collect();

        Ok(Game {
            id,
            origin,
            phase: GamePhase::Lobby,
            players,
            role_set,
            night: 0,
            day: 0,
            votes: BTreeMap::new(),
            night_actions: BTreeMap::new(),
            team_target: None,
            link: None,
            spaces: Vec::new(),
            outcome: None,
        })
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.player(id).map_or(false, Player::is_alive)
    }

    pub fn living(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive())
    }

    pub fn living_ids(&self) -> BTreeSet<PlayerId> {
        self.living().map(|p| p.id).collect()
    }

    pub fn living_with_role(&self, role: Role) -> Vec<PlayerId> {
        self.living().filter(|p| p.role == role).map(|p| p.id).collect()
    }

    pub fn living_werewolves(&self) -> Vec<PlayerId> {
        self.living()
            .filter(|p| p.role.is_werewolf())
            .map(|p| p.id)
            .collect()
    }

    pub fn partner_of(&self, id: PlayerId) -> Option<PlayerId> {
        match self.link {
            Some((a, b)) if a == id => Some(b),
            Some((a, b)) if b == id => Some(a),
            _ => None,
        }
    }

    /// Living players whose role may act at night right now.
    pub fn night_actors(&self, role: Role) -> Vec<PlayerId> {
        self.living()
            .filter(|p| p.role == role)
            .filter(|p| match role {
                Role::Cupid => self.night == 1 && !p.ability_spent,
                Role::Witch => !p.ability_spent,
                _ => role.night_priority().is_some(),
            })
            .map(|p| p.id)
            .collect()
    }

    pub fn begin_night(&mut self) {
        self.phase = GamePhase::Night;
        self.night += 1;
        self.night_actions.clear();
        self.team_target = None;
    }

    pub fn begin_discussion(&mut self) {
        self.phase = GamePhase::DayDiscussion;
        self.day += 1;
    }

    pub fn begin_vote(&mut self) {
        self.phase = GamePhase::DayVote;
        self.votes.clear();
    }

    pub fn begin_resolution(&mut self) {
        self.phase = GamePhase::Resolution;
    }

    fn living_actor(&self, actor: PlayerId) -> Result<&Player, ActionError> {
        let player = self
            .player(actor)
            .ok_or(ActionError::UnknownPlayer(actor))?;
        if player.is_dead {
            return Err(ActionError::ActorDead(actor));
        }
        Ok(player)
    }

    /// Record a day vote. A later ballot from the same voter replaces the earlier one.
    pub fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: VoteTarget,
        at: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        if self.phase != GamePhase::DayVote {
            return Err(ActionError::WrongPhase(self.phase));
        }
        self.living_actor(voter)?;
        if let VoteTarget::Player(target) = target {
            if !self.is_alive(target) {
                return Err(ActionError::InvalidTarget(target));
            }
        }
        self.votes.insert(voter, Ballot { voter, target, at });
        Ok(())
    }

    pub fn tally_votes(&self) -> TallyResult {
        tally(self.votes.values(), &self.living_ids())
    }

    /// Record a night ability target. Overwrites the actor's earlier submission this night.
    pub fn submit_night_action(
        &mut self,
        actor: PlayerId,
        targets: &[PlayerId],
        at: DateTime<Utc>,
    ) -> Result<NightActionKind, ActionError> {
        if self.phase != GamePhase::Night {
            return Err(ActionError::WrongPhase(self.phase));
        }
        let player = self.living_actor(actor)?;
        let role = player.role;
        if let Some(dead) = targets.iter().find(|t| !self.is_alive(**t)) {
            return Err(ActionError::InvalidTarget(*dead));
        }

        let kind = match role {
            Role::Cupid => {
                if self.night != 1 {
                    return Err(ActionError::NoAbility(role));
                }
                if player.ability_spent {
                    return Err(ActionError::AbilitySpent(role));
                }
                let [first, second] = targets else {
                    return Err(ActionError::TargetCount {
                        role,
                        expected: 2,
                        got: targets.len(),
                    });
                };
                if first == second {
                    return Err(ActionError::ForbiddenTarget(role));
                }
                NightActionKind::Link {
                    first: *first,
                    second: *second,
                }
            }
            Role::Werewolf => {
                let target = single_target(role, targets)?;
                if self.player(target).map_or(false, |p| p.role.is_werewolf()) {
                    return Err(ActionError::ForbiddenTarget(role));
                }
                NightActionKind::Kill { target }
            }
            Role::Guard => {
                let target = single_target(role, targets)?;
                if player.last_protected == Some(target) {
                    return Err(ActionError::ForbiddenTarget(role));
                }
                NightActionKind::Protect { target }
            }
            Role::Witch => {
                if player.ability_spent {
                    return Err(ActionError::AbilitySpent(role));
                }
                let target = single_target(role, targets)?;
                if self.team_target.is_some_and(|victim| victim != target) {
                    return Err(ActionError::ForbiddenTarget(role));
                }
                NightActionKind::Save { target }
            }
            Role::Seer => {
                let target = single_target(role, targets)?;
                if target == actor {
                    return Err(ActionError::ForbiddenTarget(role));
                }
                NightActionKind::Inspect { target }
            }
            Role::Hunter | Role::Villager => return Err(ActionError::NoAbility(role)),
        };

        self.night_actions
            .insert(actor, NightAction { actor, kind, at });
        Ok(kind)
    }

    /// Close the pack's choice for this night: the most-picked living target, with ties broken
    /// uniformly at random. Later calls return the same answer.
    pub fn lock_team_target(&mut self, rng: &mut dyn RngCore) -> Option<PlayerId> {
        if self.team_target.is_some() {
            return self.team_target;
        }
        let mut counts: BTreeMap<PlayerId, usize> = BTreeMap::new();
        for action in self.night_actions.values() {
            if let NightActionKind::Kill { target } = action.kind {
                let actor_is_wolf = self
                    .player(action.actor)
                    .map_or(false, |p| p.is_alive() && p.role.is_werewolf());
                if actor_is_wolf && self.is_alive(target) {
                    *counts.entry(target).or_default() += 1;
                }
            }
        }
        let top = counts.values().copied().max()?;
        let leaders: Vec<PlayerId> = counts
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(id, _)| *id)
            .collect();
        self.team_target = leaders.choose(rng).copied();
        self.team_target
    }

    /// Kill a living player. A linked partner follows immediately.
    pub fn kill(&mut self, id: PlayerId, cause: DeathCause) -> Vec<Death> {
        let mut deaths = Vec::new();
        let mut pending = vec![(id, cause)];
        while let Some((id, cause)) = pending.pop() {
            let Some(player) = self.player_mut(id) else {
                continue;
            };
            if player.is_dead {
                continue;
            }
            let revealed = cause.reveals_role();
            player.is_dead = true;
            player.death = Some(cause);
            player.revealed |= revealed;
            deaths.push(Death {
                player: id,
                role: player.role,
                cause,
                revealed,
            });
            if let Some(partner) = self.partner_of(id) {
                pending.push((partner, DeathCause::Heartbreak));
            }
        }
        deaths
    }

    /// Dead players holding an unspent death-triggered ability.
    pub fn pending_reactive(&self, deaths: &[Death]) -> Vec<PlayerId> {
        deaths
            .iter()
            .filter(|d| d.role.is_reactive())
            .filter(|d| self.player(d.player).map_or(false, |p| !p.ability_spent))
            .map(|d| d.player)
            .collect()
    }

    /// Fire a death-triggered ability. `None` passes; either way the ability is spent.
    pub fn resolve_reactive(
        &mut self,
        actor: PlayerId,
        target: Option<PlayerId>,
    ) -> Result<Vec<Death>, ActionError> {
        let player = self
            .player(actor)
            .ok_or(ActionError::UnknownPlayer(actor))?;
        let role = player.role;
        if !role.is_reactive() || player.is_alive() {
            return Err(ActionError::NoAbility(role));
        }
        if player.ability_spent {
            return Err(ActionError::AbilitySpent(role));
        }
        if let Some(target) = target {
            if !self.is_alive(target) {
                return Err(ActionError::InvalidTarget(target));
            }
        }
        if let Some(player) = self.player_mut(actor) {
            player.ability_spent = true;
        }
        Ok(match target {
            Some(target) => self.kill(target, DeathCause::Hunter),
            None => Vec::new(),
        })
    }
}

fn single_target(role: Role, targets: &[PlayerId]) -> Result<PlayerId, ActionError> {
    match targets {
        [target] => Ok(*target),
        _ => Err(ActionError::TargetCount {
            role,
            expected: 1,
            got: targets.len(),
        }),
    }
}
