//! Directory group membership.
//!
//! The wire protocol lives behind [`DirectoryClient`]; this module owns domain
//! resolution and the caches that bound directory round trips.

pub mod checker;
pub mod domain;

use async_trait::async_trait;
use thiserror::Error;

use crate::directory::domain::ResolvedDomain;

/// Kind of directory entry whose distinguished name is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    User,
    Group,
}

/// Failure reported by a directory client.
///
/// Local to the directory seam; mapped to `GatehouseError::DirectoryQuery` by
/// the checker.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Bind against the controller failed.
    #[error("bind failed: {0}")]
    Bind(String),
    /// No controller could be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    /// The search itself failed.
    #[error("search failed: {0}")]
    Search(String),
}

/// Narrow interface to a directory service, one call per round trip.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolve a user or group identifier to its distinguished name under the
    /// domain's base DN. `Ok(None)` when no such entry exists.
    async fn resolve_dn(
        &self,
        domain: &ResolvedDomain,
        kind: EntryKind,
        id: &str,
    ) -> Result<Option<String>, DirectoryError>;

    /// Whether `user_dn` is a member of `group_dn`.
    async fn is_member(
        &self,
        domain: &ResolvedDomain,
        user_dn: &str,
        group_dn: &str,
    ) -> Result<bool, DirectoryError>;
}
