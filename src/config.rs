//! Gatehouse configuration: deserialization and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::directory::domain::{DirectoryDomain, DirectoryDomains};
use crate::error::GatehouseError;

/// Strip an env var reference to its variable name.
///
/// Accepts `${VAR_NAME}` syntax only. Returns `None` if the value is not a
/// valid env-var reference.
pub fn parse_env_ref(value: &str) -> Option<&str> {
    value.strip_prefix("${").and_then(|s| s.strip_suffix('}'))
}

/// Resolve a `${VAR}` reference to the variable's value.
///
/// Unknown variables resolve to the empty string (same as shell `${UNSET-}`).
/// Values that are not references are returned unchanged; `validate()`
/// rejects them for secret fields before this is reached.
pub fn resolve_env_ref(value: &str) -> String {
    match parse_env_ref(value) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Top-level Gatehouse configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatehouseConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Directory domains in declaration order; order decides the implicit default.
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// `[server]` section: transport selection and listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Single route shared by all protocol traffic on the HTTP transport.
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,
    /// Keep per-client MCP sessions; stateless mode lets any single POST be served.
    #[serde(default)]
    pub stateful_sessions: bool,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Catalog file with `[[resources]]` and `[[prompts]]`, hot-reloaded on change.
    pub catalog: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host: default_host(),
            port: default_port(),
            mcp_path: default_mcp_path(),
            stateful_sessions: false,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            catalog: None,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Supported inbound transports.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
}

/// `[auth]` section: gateway switch and token validator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Global switch, read once when the gateway is built.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_validator")]
    pub validator: ValidatorKind,
    /// Token-core validation endpoint for the remote validator.
    pub token_service_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Validation result cache lifetime. 0 disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Accepted tokens for the static validator, as `${VAR}` references.
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            validator: default_validator(),
            token_service_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    Remote,
    Static,
}

/// One `[[domains]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// Controller URLs in preference order.
    #[serde(default)]
    pub controllers: Vec<String>,
    pub base_dn: Option<String>,
    pub bind_username: Option<String>,
    /// `${VAR}` reference, resolved at startup.
    pub bind_password: Option<String>,
    #[serde(default, rename = "default")]
    pub is_default: bool,
    #[serde(default = "default_group_cache_ttl_secs")]
    pub group_cache_ttl_secs: u64,
    #[serde(default = "default_dn_cache_ttl_secs")]
    pub dn_cache_ttl_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_transport() -> TransportKind {
    TransportKind::Http
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_mcp_path() -> String {
    "/mcp".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

fn default_validator() -> ValidatorKind {
    ValidatorKind::Remote
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_group_cache_ttl_secs() -> u64 {
    300
}

fn default_dn_cache_ttl_secs() -> u64 {
    3600
}

fn default_query_timeout_secs() -> u64 {
    10
}

impl GatehouseConfig {
    /// Read and parse a gatehouse.toml file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatehouseError::InvalidConfig(path.display().to_string(), e.to_string())
        })?;
        toml::from_str(&content)
            .map_err(|e| GatehouseError::InvalidConfig(path.display().to_string(), e.to_string()))
    }

    /// Validate the config, failing fast on misconfigurations before anything starts.
    pub fn validate(&self) -> crate::Result<()> {
        // 1. Server section
        if !self.server.mcp_path.starts_with('/') {
            return Err(GatehouseError::InvalidConfig(
                "server".to_string(),
                format!("mcp_path must start with '/', got '{}'", self.server.mcp_path),
            ));
        }

        // 2. Auth section, only checked when the gateway is on
        if self.auth.enabled {
            if self.auth.request_timeout_secs == 0 {
                return Err(GatehouseError::InvalidConfig(
                    "auth".to_string(),
                    "request_timeout_secs must be > 0".to_string(),
                ));
            }
            match self.auth.validator {
                ValidatorKind::Remote => match self.auth.token_service_url.as_deref() {
                    Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                    Some(url) => {
                        return Err(GatehouseError::InvalidConfig(
                            "auth".to_string(),
                            format!("token_service_url must be an http(s) URL, got '{}'", url),
                        ));
                    }
                    None => {
                        return Err(GatehouseError::InvalidConfig(
                            "auth".to_string(),
                            "remote validator requires 'token_service_url'".to_string(),
                        ));
                    }
                },
                ValidatorKind::Static => {
                    if self.auth.tokens.is_empty() {
                        return Err(GatehouseError::InvalidConfig(
                            "auth".to_string(),
                            "static validator requires at least one entry in 'tokens'"
                                .to_string(),
                        ));
                    }
                    if let Some(token) = self.auth.tokens.iter().find(|t| parse_env_ref(t).is_none())
                    {
                        return Err(GatehouseError::InvalidConfig(
                            "auth".to_string(),
                            format!(
                                "tokens must be ${{VAR}} references, got a literal of length {}",
                                token.len()
                            ),
                        ));
                    }
                }
            }
        }

        // 3. Domains: names, secret references, then set-level rules
        let mut seen: HashSet<&str> = HashSet::new();
        for domain in &self.domains {
            if domain.name.is_empty() {
                return Err(GatehouseError::InvalidConfig(
                    "domains".to_string(),
                    "domain name must be non-empty".to_string(),
                ));
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(GatehouseError::DuplicateDomain(domain.name.clone()));
            }
            if let Some(password) = &domain.bind_password {
                if parse_env_ref(password).is_none() {
                    return Err(GatehouseError::InvalidConfig(
                        domain.name.clone(),
                        "bind_password must be a ${VAR} reference".to_string(),
                    ));
                }
            }
            if domain.query_timeout_secs == 0 {
                return Err(GatehouseError::InvalidConfig(
                    domain.name.clone(),
                    "query_timeout_secs must be > 0".to_string(),
                ));
            }
        }
        // Each domain must be connectable now, not on first membership check.
        let domains = self.directory_domains()?;
        for name in domains.names() {
            domains.resolve(Some(name))?;
        }

        Ok(())
    }

    /// Build the immutable domain set, resolving secret references.
    pub fn directory_domains(&self) -> crate::Result<DirectoryDomains> {
        let domains = self
            .domains
            .iter()
            .map(|d| DirectoryDomain {
                name: d.name.clone(),
                controllers: d.controllers.clone(),
                base_dn: d.base_dn.clone(),
                bind_username: d.bind_username.clone(),
                bind_password: d.bind_password.as_deref().map(resolve_env_ref),
                is_default: d.is_default,
                group_cache_ttl: Duration::from_secs(d.group_cache_ttl_secs),
                dn_cache_ttl: Duration::from_secs(d.dn_cache_ttl_secs),
                query_timeout: Duration::from_secs(d.query_timeout_secs),
            })
            .collect();
        DirectoryDomains::new(domains)
    }
}
