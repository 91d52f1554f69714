//! Group membership checks with cached, coalesced directory lookups.

use std::future::Future;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::directory::domain::{DirectoryDomains, ResolvedDomain};
use crate::directory::{DirectoryClient, DirectoryError, EntryKind};
use crate::error::GatehouseError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MembershipKey {
    domain: String,
    user: String,
    group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DnKey {
    domain: String,
    kind: EntryKind,
    id: String,
}

/// Answers "is this user in this group" for one resolved directory domain.
///
/// The domain is picked and checked once in [`GroupMembershipChecker::new`],
/// so misconfiguration surfaces at startup. Each answer is cached for the
/// domain's group TTL and each resolved DN for its DN TTL; concurrent misses
/// on the same key share a single directory query.
pub struct GroupMembershipChecker {
    domain: ResolvedDomain,
    client: Arc<dyn DirectoryClient>,
    memberships: TtlCache<MembershipKey, bool>,
    dns: TtlCache<DnKey, Option<String>>,
}

impl GroupMembershipChecker {
    /// Bind a checker to `domain_name`, or to the default domain when `None`.
    ///
    /// Fails when the name is unknown, when no domain is configured, or when
    /// the resolved domain lacks a controller, bind username or bind password.
    pub fn new(
        domains: &DirectoryDomains,
        domain_name: Option<&str>,
        client: Arc<dyn DirectoryClient>,
    ) -> crate::Result<Self> {
        let domain = domains.resolve(domain_name)?;
        tracing::info!(
            domain = %domain.name,
            base_dn = %domain.base_dn,
            controllers = domain.controllers.len(),
            "group membership checker ready"
        );
        Ok(Self {
            memberships: TtlCache::new(domain.group_cache_ttl),
            dns: TtlCache::new(domain.dn_cache_ttl),
            domain,
            client,
        })
    }

    pub fn domain(&self) -> &ResolvedDomain {
        &self.domain
    }

    /// Check membership, consulting the cache before the directory.
    ///
    /// A user or group the directory does not know is not a member. A failed
    /// or timed-out query is an error, never `false`.
    pub async fn is_user_in_group(&self, user_id: &str, group_id: &str) -> crate::Result<bool> {
        let key = MembershipKey {
            domain: self.domain.name.clone(),
            user: user_id.to_string(),
            group: group_id.to_string(),
        };
        self.memberships
            .get_or_try_load(key, move || async move {
                let user_dn = self.lookup_dn(EntryKind::User, user_id).await?;
                let group_dn = self.lookup_dn(EntryKind::Group, group_id).await?;
                let (Some(user_dn), Some(group_dn)) = (user_dn, group_dn) else {
                    tracing::debug!(
                        domain = %self.domain.name,
                        user = %user_id,
                        group = %group_id,
                        "user or group not found in directory"
                    );
                    return Ok::<bool, GatehouseError>(false);
                };
                let is_member = self
                    .bounded(self.client.is_member(&self.domain, &user_dn, &group_dn))
                    .await?;
                tracing::debug!(
                    domain = %self.domain.name,
                    user = %user_id,
                    group = %group_id,
                    is_member,
                    "directory membership query completed"
                );
                Ok(is_member)
            })
            .await
    }

    async fn lookup_dn(&self, kind: EntryKind, id: &str) -> crate::Result<Option<String>> {
        let key = DnKey {
            domain: self.domain.name.clone(),
            kind,
            id: id.to_string(),
        };
        self.dns
            .get_or_try_load(key, move || {
                self.bounded(self.client.resolve_dn(&self.domain, kind, id))
            })
            .await
    }

    /// Apply the domain's query timeout and map client errors.
    async fn bounded<T>(
        &self,
        query: impl Future<Output = Result<T, DirectoryError>>,
    ) -> crate::Result<T> {
        match tokio::time::timeout(self.domain.query_timeout, query).await {
            Err(_elapsed) => {
                tracing::warn!(
                    domain = %self.domain.name,
                    timeout_secs = self.domain.query_timeout.as_secs(),
                    "directory query timed out"
                );
                Err(GatehouseError::DirectoryTimeout(self.domain.name.clone()))
            }
            Ok(Err(e)) => {
                tracing::warn!(domain = %self.domain.name, error = %e, "directory query failed");
                Err(GatehouseError::DirectoryQuery(
                    self.domain.name.clone(),
                    e.to_string(),
                ))
            }
            Ok(Ok(value)) => Ok(value),
        }
    }
}
