//! Command line interface definitions

use clap::{Args, Parser, Subcommand};
use depot_errors::{ConfigError, Error};
use depot_types::MirrorPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "depotd", version, about = "Content mirror for artifact repositories")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "/etc/depot/config.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mirror remotes and serve their distributions over HTTP
    Serve {
        /// Remote repositories, as name=url (repeatable)
        #[arg(long = "remote", value_name = "NAME=URL")]
        remotes: Vec<String>,

        /// Fetch units on first request instead of eagerly syncing
        #[arg(long)]
        on_demand: bool,

        /// Distributions, as base_path=remote_name (repeatable)
        #[arg(long = "dist", value_name = "BASE_PATH=NAME")]
        distributions: Vec<String>,
    },
    /// Run one sync pass against a remote and print the result
    Sync {
        /// Upstream repository root URL
        url: String,

        /// Manifest path under the remote root
        #[arg(long, default_value = depot_sync::DEFAULT_MANIFEST_PATH)]
        manifest_path: String,
    },
}

/// A `key=value` CLI pair
pub fn split_pair(raw: &str, what: &str) -> Result<(String, String), Error> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| {
            ConfigError::InvalidValue {
                field: what.to_string(),
                message: format!("expected key=value, got {raw:?}"),
            }
            .into()
        })
}

/// Policy flag for all remotes of one serve invocation
pub fn policy(on_demand: bool) -> MirrorPolicy {
    if on_demand {
        MirrorPolicy::OnDemand
    } else {
        MirrorPolicy::FullSync
    }
}
