//! Tenant (chatbot) activity lookups.

use async_trait::async_trait;
use std::collections::HashSet;

/// Answers whether a chatbot may currently serve queries.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// `true` when the tenant is active.
    async fn is_active(&self, tenant_id: &str) -> bool;
}

/// Directory backed by a fixed deny-list; every other tenant is active.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    inactive: HashSet<String>,
}

impl StaticTenantDirectory {
    /// Treat the listed tenants as inactive.
    pub fn new(inactive: impl IntoIterator<Item = String>) -> Self {
        Self {
            inactive: inactive.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn is_active(&self, tenant_id: &str) -> bool {
        !self.inactive.contains(tenant_id)
    }
}
