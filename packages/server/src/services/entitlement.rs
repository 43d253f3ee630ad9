//! Which optional roles a session initiator may put into play.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use werewolf_rules::{PlayerId, Role};

use super::supabase::SupabaseRest;
use crate::error::ExternalError;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn owns(&self, user: PlayerId, role: Role) -> Result<bool, ExternalError>;
}

/// Rows of `role_entitlements(user_id, role)`. Any matching row means the role is owned.
#[derive(Clone)]
pub struct SupabaseEntitlements {
    rest: SupabaseRest,
}

impl SupabaseEntitlements {
    pub fn new(rest: SupabaseRest) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl EntitlementStore for SupabaseEntitlements {
    async fn owns(&self, user: PlayerId, role: Role) -> Result<bool, ExternalError> {
        let filter = format!(
            "user_id=eq.{}&role=eq.{}",
            user,
            role.name().to_lowercase()
        );
        let rows = self.rest.select("role_entitlements", &filter).await?;
        Ok(!rows.is_empty())
    }
}

/// Fixed ownership table for development servers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    everything: bool,
    owned: BTreeMap<PlayerId, BTreeSet<Role>>,
}

impl StaticEntitlements {
    pub fn everything() -> Self {
        Self {
            everything: true,
            owned: BTreeMap::new(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user: PlayerId, roles: impl IntoIterator<Item = Role>) -> Self {
        self.owned.entry(user).or_default().extend(roles);
        self
    }
}

#[async_trait]
impl EntitlementStore for StaticEntitlements {
    async fn owns(&self, user: PlayerId, role: Role) -> Result<bool, ExternalError> {
        Ok(self.everything || self.owned.get(&user).map_or(false, |r| r.contains(&role)))
    }
}

/// Look up every candidate role at once. A failed lookup counts as not owned.
pub async fn owned_roles(
    store: &dyn EntitlementStore,
    user: PlayerId,
    candidates: &[Role],
) -> BTreeSet<Role> {
    let lookups = candidates.iter().map(|role| async move {
        match store.owns(user, *role).await {
            Ok(owned) => owned.then_some(*role),
            Err(e) => {
                tracing::warn!(%user, %role, "entitlement lookup failed, treating as not owned: {}", e);
                None
            }
        }
    });
    join_all(lookups).await.into_iter().flatten().collect()
}
