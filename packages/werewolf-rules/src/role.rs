use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Guard,
    Witch,
    Hunter,
    Cupid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Village,
    Werewolf,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityUse {
    None,
    Unlimited,
    OneShot,
}

/// Static description of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub role: Role,
    pub name: &'static str,
    pub team: Team,
    /// Lower acts first during the night. `None` for roles without a night ability.
    pub night_priority: Option<u8>,
    pub ability: AbilityUse,
    /// Whether a death caused by this role's ability discloses the victim's role.
    pub reveals_victim: bool,
    /// Fires once when the holder dies instead of acting at night.
    pub reactive: bool,
}

static CATALOG: [RoleSpec; 7] = [
    RoleSpec {
        role: Role::Cupid,
        name: "Cupid",
        team: Team::Village,
        night_priority: Some(0),
        ability: AbilityUse::OneShot,
        reveals_victim: false,
        reactive: false,
    },
    RoleSpec {
        role: Role::Werewolf,
        name: "Werewolf",
        team: Team::Werewolf,
        night_priority: Some(10),
        ability: AbilityUse::Unlimited,
        reveals_victim: true,
        reactive: false,
    },
    RoleSpec {
        role: Role::Guard,
        name: "Guard",
        team: Team::Village,
        night_priority: Some(20),
        ability: AbilityUse::Unlimited,
        reveals_victim: false,
        reactive: false,
    },
    RoleSpec {
        role: Role::Witch,
        name: "Witch",
        team: Team::Village,
        night_priority: Some(21),
        ability: AbilityUse::OneShot,
        reveals_victim: false,
        reactive: false,
    },
    RoleSpec {
        role: Role::Seer,
        name: "Seer",
        team: Team::Village,
        night_priority: Some(30),
        ability: AbilityUse::Unlimited,
        reveals_victim: false,
        reactive: false,
    },
    RoleSpec {
        role: Role::Hunter,
        name: "Hunter",
        team: Team::Village,
        night_priority: None,
        ability: AbilityUse::OneShot,
        reveals_victim: true,
        reactive: true,
    },
    RoleSpec {
        role: Role::Villager,
        name: "Villager",
        team: Team::Village,
        night_priority: None,
        ability: AbilityUse::None,
        reveals_victim: false,
        reactive: false,
    },
];

impl Role {
    /// Roles an initiator may switch on or off. Werewolf and Villager are always in play.
    pub const OPTIONAL: [Role; 5] = [Role::Seer, Role::Guard, Role::Witch, Role::Hunter, Role::Cupid];

    pub fn spec(self) -> &'static RoleSpec {
        CATALOG
            .iter()
            .find(|spec| spec.role == self)
            .unwrap_or(&CATALOG[CATALOG.len() - 1])
    }

    pub fn catalog() -> &'static [RoleSpec] {
        &CATALOG
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn team(self) -> Team {
        self.spec().team
    }

    pub fn night_priority(self) -> Option<u8> {
        self.spec().night_priority
    }

    pub fn is_optional(self) -> bool {
        Role::OPTIONAL.contains(&self)
    }

    pub fn is_reactive(self) -> bool {
        self.spec().reactive
    }

    pub fn is_werewolf(self) -> bool {
        self.team() == Team::Werewolf
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Village => write!(f, "Village"),
            Team::Werewolf => write!(f, "Werewolves"),
            Team::Neutral => write!(f, "Neutral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(s.trim()))
            .map(|spec| spec.role)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// The optional roles enabled for one game. Werewolf and Villager are implied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    optional: BTreeSet<Role>,
}

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            optional: roles.into_iter().filter(|r| r.is_optional()).collect(),
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        !role.is_optional() || self.optional.contains(&role)
    }

    pub fn optional(&self) -> impl Iterator<Item = Role> + '_ {
        self.optional.iter().copied()
    }

    /// Every role that may appear, core roles included.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = vec![Role::Werewolf, Role::Villager];
        roles.extend(self.optional.iter().copied());
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_role_once() {
        for role in [
            Role::Villager,
            Role::Werewolf,
            Role::Seer,
            Role::Guard,
            Role::Witch,
            Role::Hunter,
            Role::Cupid,
        ] {
            assert_eq!(Role::catalog().iter().filter(|s| s.role == role).count(), 1);
            assert_eq!(role.spec().role, role);
        }
    }

    #[test]
    fn night_order_is_link_kill_protect_inspect() {
        let mut acting: Vec<Role> = Role::catalog()
            .iter()
            .filter(|s| s.night_priority.is_some())
            .map(|s| s.role)
            .collect();
        acting.sort_by_key(|r| r.night_priority());
        assert_eq!(
            acting,
            vec![Role::Cupid, Role::Werewolf, Role::Guard, Role::Witch, Role::Seer]
        );
    }

    #[test]
    fn role_set_always_contains_core_roles() {
        let set = RoleSet::new([Role::Seer, Role::Werewolf]);
        assert!(set.contains(Role::Werewolf));
        assert!(set.contains(Role::Villager));
        assert!(set.contains(Role::Seer));
        assert!(!set.contains(Role::Witch));
        assert_eq!(set.optional().collect::<Vec<_>>(), vec![Role::Seer]);
    }

    #[test]
    fn parses_role_names_case_insensitively() {
        assert_eq!("witch".parse::<Role>().unwrap(), Role::Witch);
        assert_eq!(" Hunter ".parse::<Role>().unwrap(), Role::Hunter);
        assert!("mayor".parse::<Role>().is_err());
    }
}
