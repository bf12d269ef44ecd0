use crate::core::access::{Actor, Capability, PermissionChecker};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

/// Capabilities granted per user id, fixed at startup from configuration.
///
/// The system actor holds nothing here. Operations it runs (auto cleanup,
/// retention) do not go through capability checks.
pub struct StaticPermissions {
    grants: DashMap<i64, HashSet<Capability>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self {
            grants: DashMap::new(),
        }
    }

    /// Every listed user holds every capability.
    pub fn moderators(user_ids: impl IntoIterator<Item = i64>) -> Self {
        let permissions = Self::new();
        for user_id in user_ids {
            permissions.grant(user_id, Capability::ALL);
        }
        permissions
    }

    pub fn grant(&self, user_id: i64, capabilities: impl IntoIterator<Item = Capability>) {
        self.grants.entry(user_id).or_default().extend(capabilities);
    }
}

impl Default for StaticPermissions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn has_capability(&self, actor: &Actor, capability: Capability) -> bool {
        actor
            .user_id
            .and_then(|id| self.grants.get(&id).map(|caps| caps.contains(&capability)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_moderators_hold_everything() {
        let permissions = StaticPermissions::moderators([1, 2]);
        for capability in Capability::ALL {
            assert!(permissions.has_capability(&Actor::user(2), capability).await);
        }
        assert!(
            !permissions
                .has_capability(&Actor::user(3), Capability::ModerateArticles)
                .await
        );
        assert!(
            !permissions
                .has_capability(&Actor::system(), Capability::RunCleanup)
                .await
        );
    }

    #[tokio::test]
    async fn test_partial_grant() {
        let permissions = StaticPermissions::new();
        permissions.grant(5, [Capability::ManageWords]);
        assert!(permissions.has_capability(&Actor::user(5), Capability::ManageWords).await);
        assert!(!permissions.has_capability(&Actor::user(5), Capability::RunCleanup).await);
    }
}
