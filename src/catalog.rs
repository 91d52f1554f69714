//! Resource and prompt catalog.
//!
//! Entries are ingested from a TOML catalog file. Whether an entry needs
//! authentication is settled here, once: an explicit `require_auth` wins,
//! otherwise built-in entries are public and everything else requires auth.
//! Request handling only ever sees the resolved `bool`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::GatehouseError;

/// Shared catalog snapshot. The reload task swaps the inner `Arc`; readers
/// clone it and never hold the lock across I/O.
pub type CatalogHandle = Arc<RwLock<Arc<Catalog>>>;

pub fn catalog_handle(catalog: Catalog) -> CatalogHandle {
    Arc::new(RwLock::new(Arc::new(catalog)))
}

/// A resource the server exposes, addressed by URI.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogResource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub text: String,
    pub require_auth: bool,
}

/// A prompt the server exposes, addressed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPrompt {
    pub name: String,
    pub description: Option<String>,
    pub text: String,
    pub require_auth: bool,
}

/// Immutable snapshot of everything registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    resources: Vec<CatalogResource>,
    prompts: Vec<CatalogPrompt>,
}

impl Catalog {
    pub fn new(resources: Vec<CatalogResource>, prompts: Vec<CatalogPrompt>) -> Self {
        Self { resources, prompts }
    }

    pub fn resources(&self) -> &[CatalogResource] {
        &self.resources
    }

    pub fn prompts(&self) -> &[CatalogPrompt] {
        &self.prompts
    }

    pub fn resource(&self, uri: &str) -> Option<&CatalogResource> {
        self.resources.iter().find(|r| r.uri == uri)
    }

    pub fn prompt(&self, name: &str) -> Option<&CatalogPrompt> {
        self.prompts.iter().find(|p| p.name == name)
    }

    /// Parse and ingest a catalog file body.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| GatehouseError::Catalog(e.to_string()))?;
        file.into_catalog()
    }

    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatehouseError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }
}

/// Resolve the optional flag from the catalog file.
fn resolve_require_auth(require_auth: Option<bool>, builtin: bool) -> bool {
    require_auth.unwrap_or(!builtin)
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    #[serde(default)]
    prompts: Vec<PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    #[serde(default)]
    text: String,
    require_auth: Option<bool>,
    #[serde(default)]
    builtin: bool,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    name: String,
    description: Option<String>,
    #[serde(default)]
    text: String,
    require_auth: Option<bool>,
    #[serde(default)]
    builtin: bool,
}

impl CatalogFile {
    fn into_catalog(self) -> crate::Result<Catalog> {
        let mut seen: HashSet<String> = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.uri.clone()) {
                return Err(GatehouseError::Catalog(format!(
                    "duplicate resource uri '{}'",
                    resource.uri
                )));
            }
        }
        seen.clear();
        for prompt in &self.prompts {
            if !seen.insert(prompt.name.clone()) {
                return Err(GatehouseError::Catalog(format!(
                    "duplicate prompt name '{}'",
                    prompt.name
                )));
            }
        }

        let resources = self
            .resources
            .into_iter()
            .map(|r| CatalogResource {
                require_auth: resolve_require_auth(r.require_auth, r.builtin),
                uri: r.uri,
                name: r.name,
                description: r.description,
                mime_type: r.mime_type,
                text: r.text,
            })
            .collect();
        let prompts = self
            .prompts
            .into_iter()
            .map(|p| CatalogPrompt {
                require_auth: resolve_require_auth(p.require_auth, p.builtin),
                name: p.name,
                description: p.description,
                text: p.text,
            })
            .collect();
        Ok(Catalog::new(resources, prompts))
    }
}
