//! Error types for Gatehouse operations.

use thiserror::Error;

/// Main error type for Gatehouse operations
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// Invalid configuration in a named config section
    #[error("invalid config for '{0}': {1}")]
    InvalidConfig(String, String),

    /// Duplicate directory domain name
    #[error("duplicate directory domain: {0}")]
    DuplicateDomain(String),

    /// More than one directory domain carries `default = true`
    #[error("multiple default directory domains: {0} and {1}")]
    MultipleDefaultDomains(String, String),

    /// A domain was requested by name but is not configured
    #[error("directory domain '{0}' is not configured")]
    UnknownDomain(String),

    /// No domain configured and none requested
    #[error("no directory domains configured")]
    NoDomainsConfigured,

    /// Resolved domain is missing connection fields
    #[error("directory domain '{0}' is incomplete: {1}")]
    IncompleteDomain(String, String),

    /// Directory lookup failed for a named domain
    #[error("directory query failed for domain '{0}': {1}")]
    DirectoryQuery(String, String),

    /// Directory lookup exceeded the domain's query timeout
    #[error("directory query timed out for domain '{0}'")]
    DirectoryTimeout(String),

    /// Catalog file could not be loaded or is invalid
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Token validator could not be constructed
    #[error("token validator error: {0}")]
    TokenValidator(String),

    /// Transport failed to bind or initialize
    #[error("{0} transport error: {1}")]
    Transport(String, String),

    /// Shutdown did not complete within the grace period
    #[error("shutdown did not complete within {0}s")]
    ShutdownTimeout(u64),
}

/// Result type alias for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;
