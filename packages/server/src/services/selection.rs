use std::collections::BTreeSet;
use werewolf_rules::{PlayerId, Role, RoleSet};

use crate::error::EventError;

/// The initiator's pre-game switchboard over the optional roles they own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSelection {
    initiator: PlayerId,
    offered: BTreeSet<Role>,
    enabled: BTreeSet<Role>,
}

impl RoleSelection {
    /// Everything offered starts switched on.
    pub fn new(initiator: PlayerId, offered: BTreeSet<Role>) -> Self {
        Self {
            initiator,
            enabled: offered.clone(),
            offered,
        }
    }

    pub fn authorize(&self, by: PlayerId) -> Result<(), EventError> {
        if by == self.initiator {
            Ok(())
        } else {
            Err(EventError::NotInitiator)
        }
    }

    /// Flip one role. Returns whether it is now enabled.
    pub fn toggle(&mut self, by: PlayerId, role: Role) -> Result<bool, EventError> {
        self.authorize(by)?;
        if !self.offered.contains(&role) {
            return Err(EventError::RoleNotOffered(role));
        }
        if self.enabled.remove(&role) {
            Ok(false)
        } else {
            self.enabled.insert(role);
            Ok(true)
        }
    }

    pub fn offered(&self) -> &BTreeSet<Role> {
        &self.offered
    }

    pub fn enabled(&self) -> &BTreeSet<Role> {
        &self.enabled
    }

    pub fn role_set(&self) -> RoleSet {
        RoleSet::new(self.enabled.iter().copied())
    }
}
