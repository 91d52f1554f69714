//! Gatehouse: authorization gateway for an MCP server.
//!
//! Serves a catalog of resources and prompts over stdio or Streamable HTTP.
//! On HTTP every request passes the [`AuthorizationGateway`]: enumeration and
//! explicitly public entries go through untouched, everything else needs a
//! valid bearer token. [`GroupMembershipChecker`] answers cached directory
//! group-membership questions for callers that authorize by group.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod server;
pub mod standalone;

pub use auth::gateway::{AuthDecision, AuthorizationGateway, InboundCall};
pub use auth::token::{
    build_token_validator, RemoteTokenValidator, StaticTokenValidator, TokenValidation,
    TokenValidator,
};
pub use catalog::{Catalog, CatalogHandle, CatalogPrompt, CatalogResource};
pub use config::{parse_env_ref, AuthConfig, GatehouseConfig, ServerConfig, TransportKind};
pub use directory::checker::GroupMembershipChecker;
pub use directory::domain::{DirectoryDomain, DirectoryDomains, ResolvedDomain};
pub use directory::{DirectoryClient, DirectoryError, EntryKind};
pub use error::{GatehouseError, Result};
pub use server::shutdown::{run_with_grace, spawn_signal_handler};
pub use server::{select_transport, start};
pub use standalone::hot_reload::run_catalog_reload;
pub use standalone::server::GatehouseMcpServer;
