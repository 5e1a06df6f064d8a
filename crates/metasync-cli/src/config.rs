//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metasync_core::config::{QuiescencePolicy, SyncConfig};
use metasync_core::dialect::ConnectParams;

use crate::formatter::OutputFormat;

/// metasync command-line front-end
#[derive(Parser, Debug)]
#[command(name = "metasync")]
#[command(version, about = "Metadata-driven schema synchronization")]
pub struct Args {
    /// Metadata repository directory
    #[arg(short = 'm', long, default_value = "metadata")]
    pub meta: PathBuf,

    /// Database to use instead of the one registered with the task
    #[arg(short = 'd', long)]
    pub database: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export the metadata and client assets to a bundle
    Export {
        /// Bundle file to write
        output: PathBuf,

        #[command(flatten)]
        assets: AssetArgs,

        /// Asset file or directory to pack, relative to the asset root
        #[arg(short = 'a', long = "asset")]
        paths: Vec<PathBuf>,

        /// File extension to leave out of the bundle
        #[arg(long = "exclude")]
        excluded: Vec<String>,
    },

    /// Import a bundle and migrate the database
    Import {
        /// Bundle file to read
        bundle: PathBuf,

        #[command(flatten)]
        assets: AssetArgs,

        /// Do not grant full rights on new items to every role
        #[arg(long)]
        no_default_privileges: bool,

        /// Seconds to wait for in-flight requests
        #[arg(long, default_value_t = 300)]
        max_wait: u64,

        /// Fail instead of proceeding when requests do not drain in time
        #[arg(long)]
        abort_on_timeout: bool,
    },

    /// Show the DDL and warnings an import would produce
    Plan {
        /// Bundle file to read
        bundle: PathBuf,
    },

    /// List database tables no item refers to
    Tables,

    /// Show the columns of a database table
    Describe {
        /// Table name
        table: String,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct AssetArgs {
    /// Directory client assets live in
    #[arg(long)]
    pub asset_root: Option<PathBuf>,
}

impl Args {
    /// Build the library configuration for the selected command.
    pub fn to_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new();
        if let Some(database) = &self.database {
            config = config.with_connection(ConnectParams::file(database.clone()));
        }

        match &self.command {
            Command::Export {
                assets,
                paths,
                excluded,
                ..
            } => {
                config = assets.apply(config);
                for path in paths {
                    config = config.with_asset_path(path.clone());
                }
                for ext in excluded {
                    config = config.with_excluded_extension(ext.trim_start_matches('.'));
                }
            }
            Command::Import {
                assets,
                no_default_privileges,
                max_wait,
                abort_on_timeout,
                ..
            } => {
                let wait = Duration::from_secs(*max_wait);
                let policy = if *abort_on_timeout {
                    QuiescencePolicy::abort_after(wait)
                } else {
                    QuiescencePolicy::default().with_max_wait(wait)
                };
                config = assets
                    .apply(config)
                    .with_quiescence(policy)
                    .with_default_privileges(!no_default_privileges);
            }
            Command::Plan { .. } | Command::Tables | Command::Describe { .. } => {}
        }
        config
    }
}

impl AssetArgs {
    fn apply(&self, config: SyncConfig) -> SyncConfig {
        match &self.asset_root {
            Some(root) => config.with_asset_root(root),
            None => config,
        }
    }
}
