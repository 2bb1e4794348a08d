//! Admin access policy.

use std::collections::HashSet;

use common::CustomerId;

/// Decides which callers may use the admin surface.
pub trait AccessPolicy: Send + Sync {
    /// Returns true if the caller is an administrator.
    fn is_admin(&self, caller: &CustomerId) -> bool;
}

/// Policy backed by a fixed set of admin caller ids.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessPolicy {
    admins: HashSet<CustomerId>,
}

impl StaticAccessPolicy {
    /// Creates a policy with the given admin callers.
    pub fn new(admins: impl IntoIterator<Item = CustomerId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl AccessPolicy for StaticAccessPolicy {
    fn is_admin(&self, caller: &CustomerId) -> bool {
        self.admins.contains(caller)
    }
}
