//! depotd - content mirror daemon
//!
//! Registers remote artifact repositories, syncs or lazily fetches their
//! content, and serves the mirrored units over HTTP with integrity
//! guarantees.

mod cli;

use crate::cli::{policy, split_pair, Cli, Commands};
use clap::Parser;
use depot_catalog::UnitCatalog;
use depot_config::Config;
use depot_errors::{ConfigError, Error};
use depot_net::Fetcher;
use depot_store::ContentStore;
use depot_sync::{ManifestIndex, MirrorService, RepositoryIndex, SyncOrchestrator};
use depot_types::MirrorPolicy;
use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("application error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::load_or_default(&cli.global.config).await?;

    match cli.command {
        Commands::Serve {
            remotes,
            on_demand,
            distributions,
        } => serve(&config, &remotes, policy(on_demand), &distributions).await,
        Commands::Sync { url, manifest_path } => sync_once(&config, &url, &manifest_path).await,
    }
}

async fn build_service(config: &Config) -> Result<MirrorService, Error> {
    let fetcher = Fetcher::new(config.fetch.to_fetch_config())?;
    let store = ContentStore::new(&config.general.store_path);
    store.init().await?;

    let orchestrator = SyncOrchestrator::new(fetcher, store, UnitCatalog::new())
        .with_concurrency(config.sync.concurrency);
    Ok(MirrorService::start_with_orchestrator(orchestrator))
}

async fn serve(
    config: &Config,
    remotes: &[String],
    policy: MirrorPolicy,
    distributions: &[String],
) -> Result<(), Error> {
    let service = build_service(config).await?;
    let mut remote_ids = HashMap::new();

    for raw in remotes {
        let (name, url) = split_pair(raw, "remote")?;
        let base_url = url::Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
            field: "remote".to_string(),
            message: e.to_string(),
        })?;
        let index: Arc<dyn RepositoryIndex> = Arc::new(ManifestIndex::new(
            service.orchestrator().fetcher().clone(),
            base_url,
        ));
        let remote = service.create_remote(&name, &url, policy, index)?;
        remote_ids.insert(name, remote.id);
    }

    for raw in distributions {
        let (base_path, remote_name) = split_pair(raw, "dist")?;
        let remote_id = remote_ids.get(&remote_name).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "dist".to_string(),
                message: format!("unknown remote {remote_name:?}"),
            }
        })?;
        service.create_distribution(base_path, *remote_id)?;
    }

    // Eager policy: populate the mirror before serving
    if policy == MirrorPolicy::FullSync {
        for (name, remote_id) in &remote_ids {
            let result = service.trigger_sync(*remote_id).await?;
            info!(
                remote = %name,
                added = result.units_added,
                failed = result.units_failed,
                "initial sync complete"
            );
        }
    }

    depot_serve::serve(config.general.bind_addr, service).await
}

async fn sync_once(config: &Config, url: &str, manifest_path: &str) -> Result<(), Error> {
    let service = build_service(config).await?;

    let base_url = url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        field: "url".to_string(),
        message: e.to_string(),
    })?;
    let index: Arc<dyn RepositoryIndex> = Arc::new(
        ManifestIndex::new(service.orchestrator().fetcher().clone(), base_url)
            .with_manifest_path(manifest_path),
    );

    let remote = service.create_remote("cli", url, MirrorPolicy::FullSync, index)?;
    let result = service.trigger_sync(remote.id).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).map_err(|e| Error::internal(e.to_string()))?
    );
    Ok(())
}
