use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SetupError;
use crate::role::{Role, RoleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for PlayerLimits {
    fn default() -> Self {
        Self { min: 4, max: 16 }
    }
}

/// From `min_players` seated upward, the role gets `count` copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTier {
    pub min_players: usize,
    pub count: usize,
}

/// Player-count tiers for every optional role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleThresholds {
    tiers: BTreeMap<Role, Vec<QuotaTier>>,
}

impl Default for RoleThresholds {
    fn default() -> Self {
        Self::empty()
            .with_threshold(Role::Seer, 4)
            .with_threshold(Role::Hunter, 5)
            .with_threshold(Role::Guard, 6)
            .with_threshold(Role::Witch, 6)
            .with_threshold(Role::Cupid, 7)
    }
}

impl RoleThresholds {
    pub fn empty() -> Self {
        Self {
            tiers: BTreeMap::new(),
        }
    }

    /// Single tier: one copy once `min_players` are seated.
    pub fn with_threshold(self, role: Role, min_players: usize) -> Self {
        self.with_tiers(
            role,
            vec![QuotaTier {
                min_players,
                count: 1,
            }],
        )
    }

    pub fn with_tiers(mut self, role: Role, mut tiers: Vec<QuotaTier>) -> Self {
        tiers.sort_by_key(|t| t.min_players);
        self.tiers.insert(role, tiers);
        self
    }

    /// Smallest player count at which the role appears at all.
    pub fn threshold(&self, role: Role) -> Option<usize> {
        self.tiers
            .get(&role)
            .and_then(|tiers| tiers.iter().find(|t| t.count > 0))
            .map(|t| t.min_players)
    }

    pub fn quota(&self, role: Role, players: usize) -> usize {
        self.tiers
            .get(&role)
            .and_then(|tiers| tiers.iter().rev().find(|t| t.min_players <= players))
            .map(|t| t.count)
            .unwrap_or(0)
    }
}

/// Per-role head counts for one game. Always sums to the seated player count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePlan {
    pub players: usize,
    pub quotas: BTreeMap<Role, usize>,
}

impl RolePlan {
    pub fn count(&self, role: Role) -> usize {
        self.quotas.get(&role).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.quotas.values().sum()
    }

    /// One entry per seat, in catalog order.
    pub fn pool(&self) -> Vec<Role> {
        self.quotas
            .iter()
            .flat_map(|(role, count)| std::iter::repeat(*role).take(*count))
            .collect()
    }
}

pub fn werewolf_quota(players: usize) -> usize {
    (players / 3).max(1)
}

/// Compute role quotas for `players` seats.
///
/// Optional roles whose threshold is not met are dropped silently. When the optional roles and
/// werewolves would overflow the table, optional quotas shrink starting with the role that has
/// the highest threshold.
pub fn plan_roles(
    players: usize,
    role_set: &RoleSet,
    thresholds: &RoleThresholds,
    limits: PlayerLimits,
) -> Result<RolePlan, SetupError> {
    if players < limits.min.max(1) {
        return Err(SetupError::NotEnoughPlayers {
            have: players,
            need: limits.min.max(1),
        });
    }
    if players > limits.max {
        return Err(SetupError::TooManyPlayers {
            have: players,
            max: limits.max,
        });
    }

    let wolves = werewolf_quota(players);
    if wolves > players {
        return Err(SetupError::QuotaInfeasible { players });
    }

    let mut optional: BTreeMap<Role, usize> = role_set
        .optional()
        .map(|role| (role, thresholds.quota(role, players)))
        .filter(|(_, count)| *count > 0)
        .collect();

    let seats = players - wolves;
    while optional.values().sum::<usize>() > seats {
        // Highest threshold first; later catalog entries break ties.
        let Some(role) = optional
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(role, _)| (thresholds.threshold(**role).unwrap_or(0), **role))
            .map(|(role, _)| *role)
        else {
            return Err(SetupError::QuotaInfeasible { players });
        };
        if let Some(count) = optional.get_mut(&role) {
            *count -= 1;
            tracing::debug!(%role, remaining = *count, "trimmed optional role quota");
        }
    }
    optional.retain(|_, count| *count > 0);

    let villagers = seats - optional.values().sum::<usize>();
    let mut quotas = optional;
    quotas.insert(Role::Werewolf, wolves);
    if villagers > 0 {
        quotas.insert(Role::Villager, villagers);
    }

    Ok(RolePlan { players, quotas })
}

/// Shuffle the plan's pool uniformly; index `i` is the role for seat `i`.
pub fn assign_roles<R: Rng + ?Sized>(plan: &RolePlan, rng: &mut R) -> Vec<Role> {
    let mut pool = plan.pool();
    pool.shuffle(rng);
    pool
}
