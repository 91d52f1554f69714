//! Directory domain set and default-domain resolution.

use std::fmt;
use std::time::Duration;

use crate::error::GatehouseError;

/// Maximum number of host labels kept when deriving a base DN.
const DERIVED_DN_LABELS: usize = 3;

/// A configured directory domain, secrets already resolved.
#[derive(Clone)]
pub struct DirectoryDomain {
    pub name: String,
    pub controllers: Vec<String>,
    pub base_dn: Option<String>,
    pub bind_username: Option<String>,
    pub bind_password: Option<String>,
    pub is_default: bool,
    pub group_cache_ttl: Duration,
    pub dn_cache_ttl: Duration,
    pub query_timeout: Duration,
}

impl fmt::Debug for DirectoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryDomain")
            .field("name", &self.name)
            .field("controllers", &self.controllers)
            .field("base_dn", &self.base_dn)
            .field("bind_username", &self.bind_username)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "<redacted>"))
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Connection settings of one domain, checked complete and with a base DN.
#[derive(Clone)]
pub struct ResolvedDomain {
    pub name: String,
    pub controllers: Vec<String>,
    pub base_dn: String,
    pub bind_username: String,
    pub bind_password: String,
    pub group_cache_ttl: Duration,
    pub dn_cache_ttl: Duration,
    pub query_timeout: Duration,
}

impl fmt::Debug for ResolvedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDomain")
            .field("name", &self.name)
            .field("controllers", &self.controllers)
            .field("base_dn", &self.base_dn)
            .field("bind_username", &self.bind_username)
            .field("bind_password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// The immutable set of configured domains.
///
/// The default domain is decided once, here: the domain flagged `default`, or
/// failing that the first one declared.
#[derive(Debug, Clone)]
pub struct DirectoryDomains {
    domains: Vec<DirectoryDomain>,
    default_index: Option<usize>,
}

impl DirectoryDomains {
    pub fn new(domains: Vec<DirectoryDomain>) -> crate::Result<Self> {
        let mut default_index: Option<usize> = None;
        for (index, domain) in domains.iter().enumerate() {
            if domains[..index].iter().any(|d| d.name == domain.name) {
                return Err(GatehouseError::DuplicateDomain(domain.name.clone()));
            }
            if domain.is_default {
                if let Some(previous) = default_index {
                    return Err(GatehouseError::MultipleDefaultDomains(
                        domains[previous].name.clone(),
                        domain.name.clone(),
                    ));
                }
                default_index = Some(index);
            }
        }
        if default_index.is_none() && !domains.is_empty() {
            default_index = Some(0);
        }
        Ok(Self {
            domains,
            default_index,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }

    /// The default domain's name, if any domain is configured.
    pub fn default_name(&self) -> Option<&str> {
        self.default_index.map(|i| self.domains[i].name.as_str())
    }

    /// Pick a domain by name, or the default when `name` is `None`, and check
    /// it has everything needed to connect.
    pub fn resolve(&self, name: Option<&str>) -> crate::Result<ResolvedDomain> {
        let domain = match name {
            Some(name) => self
                .domains
                .iter()
                .find(|d| d.name == name)
                .ok_or_else(|| GatehouseError::UnknownDomain(name.to_string()))?,
            None => self
                .default_index
                .map(|i| &self.domains[i])
                .ok_or(GatehouseError::NoDomainsConfigured)?,
        };

        let first_controller = domain
            .controllers
            .first()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| incomplete(domain, "missing controller address"))?;
        let bind_username = non_empty(&domain.bind_username)
            .ok_or_else(|| incomplete(domain, "missing bind_username"))?;
        let bind_password = non_empty(&domain.bind_password)
            .ok_or_else(|| incomplete(domain, "missing bind_password"))?;

        let base_dn = match non_empty(&domain.base_dn) {
            Some(dn) => dn.to_string(),
            None => derive_base_dn(first_controller).ok_or_else(|| {
                incomplete(
                    domain,
                    &format!("cannot derive base DN from controller '{}'", first_controller),
                )
            })?,
        };

        Ok(ResolvedDomain {
            name: domain.name.clone(),
            controllers: domain.controllers.clone(),
            base_dn,
            bind_username: bind_username.to_string(),
            bind_password: bind_password.to_string(),
            group_cache_ttl: domain.group_cache_ttl,
            dn_cache_ttl: domain.dn_cache_ttl,
            query_timeout: domain.query_timeout,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn incomplete(domain: &DirectoryDomain, reason: &str) -> GatehouseError {
    GatehouseError::IncompleteDomain(domain.name.clone(), reason.to_string())
}

/// Derive a base DN from a controller URL by keeping the last three host labels.
///
/// `ldap://dc1.corp.example.com:636` gives `DC=corp,DC=example,DC=com`. This is
/// a fallback for simple topologies; set `base_dn` explicitly otherwise.
pub fn derive_base_dn(controller_url: &str) -> Option<String> {
    let without_scheme = controller_url
        .split_once("://")
        .map_or(controller_url, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default();

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.is_empty() {
        return None;
    }

    let mut kept: Vec<&str> = labels.iter().rev().take(DERIVED_DN_LABELS).copied().collect();
    kept.reverse();
    Some(
        kept.iter()
            .map(|label| format!("DC={}", label))
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(name: &str, is_default: bool) -> DirectoryDomain {
        DirectoryDomain {
            name: name.to_string(),
            controllers: vec![format!("ldap://dc1.{}.example.com", name)],
            base_dn: None,
            bind_username: Some("svc".to_string()),
            bind_password: Some("pw".to_string()),
            is_default,
            group_cache_ttl: Duration::from_secs(300),
            dn_cache_ttl: Duration::from_secs(3600),
            query_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_derive_base_dn_three_labels() {
        assert_eq!(
            derive_base_dn("ldap://dc1.corp.example.com").as_deref(),
            Some("DC=corp,DC=example,DC=com")
        );
    }

    #[test]
    fn test_derive_base_dn_strips_port_and_path() {
        assert_eq!(
            derive_base_dn("ldaps://dc1.corp.example.com:636/ou=x").as_deref(),
            Some("DC=corp,DC=example,DC=com")
        );
    }

    #[test]
    fn test_derive_base_dn_short_host() {
        assert_eq!(derive_base_dn("ldap://example.com").as_deref(), Some("DC=example,DC=com"));
        assert_eq!(derive_base_dn("ldap://"), None);
    }

    #[test]
    fn test_explicit_default_wins() {
        let domains = DirectoryDomains::new(vec![domain("a", false), domain("b", true)]).unwrap();
        assert_eq!(domains.resolve(None).unwrap().name, "b");
    }

    #[test]
    fn test_first_declared_is_default_and_stable() {
        let domains = DirectoryDomains::new(vec![domain("a", false), domain("b", false)]).unwrap();
        assert_eq!(domains.default_name(), Some("a"));
        for _ in 0..5 {
            assert_eq!(domains.resolve(None).unwrap().name, "a");
        }
    }

    #[test]
    fn test_named_domain_resolves() {
        let domains = DirectoryDomains::new(vec![domain("a", true), domain("b", false)]).unwrap();
        let resolved = domains.resolve(Some("b")).unwrap();
        assert_eq!(resolved.name, "b");
        assert_eq!(resolved.base_dn, "DC=b,DC=example,DC=com");
    }

    #[test]
    fn test_unknown_domain_fails() {
        let domains = DirectoryDomains::new(vec![domain("a", false)]).unwrap();
        assert!(matches!(
            domains.resolve(Some("nope")),
            Err(GatehouseError::UnknownDomain(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_no_domains_fails() {
        let domains = DirectoryDomains::new(Vec::new()).unwrap();
        assert!(matches!(domains.resolve(None), Err(GatehouseError::NoDomainsConfigured)));
    }

    #[test]
    fn test_incomplete_domain_fails() {
        let mut no_password = domain("a", false);
        no_password.bind_password = Some(String::new());
        let mut no_controller = domain("b", false);
        no_controller.controllers.clear();
        let domains = DirectoryDomains::new(vec![no_password, no_controller]).unwrap();

        assert!(matches!(
            domains.resolve(Some("a")),
            Err(GatehouseError::IncompleteDomain(name, msg)) if name == "a" && msg.contains("bind_password")
        ));
        assert!(matches!(
            domains.resolve(Some("b")),
            Err(GatehouseError::IncompleteDomain(name, msg)) if name == "b" && msg.contains("controller")
        ));
    }

    #[test]
    fn test_explicit_base_dn_preferred() {
        let mut explicit = domain("a", false);
        explicit.base_dn = Some("OU=People,DC=corp,DC=example,DC=co,DC=uk".to_string());
        let domains = DirectoryDomains::new(vec![explicit]).unwrap();
        assert_eq!(
            domains.resolve(None).unwrap().base_dn,
            "OU=People,DC=corp,DC=example,DC=co,DC=uk"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", domain("a", false));
        assert!(!rendered.contains("\"pw\""));
        assert!(rendered.contains("<redacted>"));
    }
}
