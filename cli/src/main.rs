//! Gatehouse: authorization-gated MCP catalog server.
//!
//! Two subcommands:
//! - `gatehouse serve`: serve over Streamable HTTP (gateway on) or `--stdio`
//! - `gatehouse check`: validate configuration and exit

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatehouse::{
    build_token_validator, run_catalog_reload, run_with_grace, select_transport,
    spawn_signal_handler, start, Catalog, GatehouseConfig, GatehouseError, GatehouseMcpServer,
    TransportKind,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gatehouse",
    version,
    about = "Gatehouse: authorization gateway for an MCP resource and prompt catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the catalog over HTTP (authorization enforced) or stdio
    Serve {
        /// Path to gatehouse.toml [default: ./gatehouse.toml or ~/.config/gatehouse/gatehouse.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Serve a single local client over stdin/stdout, overriding `server.transport`
        #[arg(long)]
        stdio: bool,
        /// Override `server.host`
        #[arg(long)]
        host: Option<String>,
        /// Override `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate configuration, token validator and directory domains, then exit
    Check {
        /// Path to gatehouse.toml [default: ./gatehouse.toml or ~/.config/gatehouse/gatehouse.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            stdio,
            host,
            port,
        } => {
            let config_path = resolve_config(config)?;
            run_serve(config_path, stdio, host, port).await?;
        }
        Commands::Check { config } => {
            let config_path = resolve_config(config)?;
            run_check(&config_path).await?;
        }
    }

    Ok(())
}

/// Load, validate, then run the selected transport until shutdown.
///
/// A server that does not stop within `shutdown_grace_secs` of the signal is
/// force-exited.
async fn run_serve(
    config_path: PathBuf,
    stdio: bool,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = load_config(&config_path).await?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    let kind = select_transport(stdio, &config.server);
    let catalog_path = catalog_path(&config_path, &config);
    let catalog = load_catalog(catalog_path.as_deref()).await?;
    tracing::info!(
        transport = ?kind,
        resources = catalog.resources().len(),
        prompts = catalog.prompts().len(),
        "starting gatehouse"
    );
    if kind == TransportKind::Stdio && config.auth.enabled {
        tracing::info!("stdio transport serves a trusted local client; authorization is not applied");
    }

    let server = GatehouseMcpServer::new(catalog);
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    if let Some(path) = catalog_path {
        tokio::spawn(run_catalog_reload(
            path,
            server.catalog_handle(),
            server.peers_handle(),
            cancel.child_token(),
        ));
    }

    let grace = config.server.shutdown_grace();
    match run_with_grace(start(kind, &config, server, cancel.clone()), &cancel, grace).await {
        Ok(()) => Ok(()),
        Err(GatehouseError::ShutdownTimeout(secs)) => {
            tracing::error!(grace_secs = secs, "forcing exit");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Validate everything `serve` would build, without binding anything.
async fn run_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    if config.auth.enabled {
        build_token_validator(&config.auth).context("token validator")?;
        println!("auth: enabled ({:?} validator)", config.auth.validator);
    } else {
        println!("auth: disabled, all requests will be allowed");
    }

    let catalog = load_catalog(catalog_path(config_path, &config).as_deref()).await?;
    let public_resources = catalog.resources().iter().filter(|r| !r.require_auth).count();
    let public_prompts = catalog.prompts().iter().filter(|p| !p.require_auth).count();
    println!(
        "catalog: {} resources ({} public), {} prompts ({} public)",
        catalog.resources().len(),
        public_resources,
        catalog.prompts().len(),
        public_prompts
    );

    let domains = config.directory_domains()?;
    for name in domains.names() {
        let domain = domains
            .resolve(Some(name))
            .with_context(|| format!("directory domain '{}'", name))?;
        let marker = if domains.default_name() == Some(name) {
            " (default)"
        } else {
            ""
        };
        println!("domain: {}{} base_dn={}", domain.name, marker, domain.base_dn);
    }

    println!("{}: ok", config_path.display());
    Ok(())
}

/// Resolve config file path: explicit flag → ./gatehouse.toml → ~/.config/gatehouse/gatehouse.toml.
fn resolve_config(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let local = Path::new("gatehouse.toml");
    if local.exists() {
        return Ok(local.to_path_buf());
    }

    if let Some(config_dir) = dirs::config_dir() {
        let xdg = config_dir.join("gatehouse").join("gatehouse.toml");
        if xdg.exists() {
            return Ok(xdg);
        }
    }

    Err(anyhow::anyhow!(
        "No gatehouse.toml found. Searched ./gatehouse.toml and ~/.config/gatehouse/gatehouse.toml. \
         Use --config to specify a path."
    ))
}

async fn load_config(config_path: &Path) -> Result<GatehouseConfig> {
    GatehouseConfig::load(config_path)
        .await
        .with_context(|| format!("Failed to load config file {}", config_path.display()))
}

/// Relative catalog paths are resolved against the config file's directory.
fn catalog_path(config_path: &Path, config: &GatehouseConfig) -> Option<PathBuf> {
    let catalog = config.server.catalog.as_ref()?;
    if catalog.is_absolute() {
        return Some(catalog.clone());
    }
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    Some(base.join(catalog))
}

async fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => Catalog::load(path)
            .await
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => {
            tracing::info!("no catalog configured; serving an empty catalog");
            Ok(Catalog::default())
        }
    }
}
