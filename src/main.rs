use anyhow::Result;
use clap::{Parser, Subcommand};
use plugctl::auth::DEFAULT_PROVIDER;
use plugctl::config::Config;
use plugctl::marketplace::{PluginSearchParams, SearchKind};
use plugctl::plugins::PluginCategory;
use plugctl::transport::{plugin_cli, PluginContext};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    env!("PLUGCTL_VERSION_SUFFIX"),
    " (",
    env!("PLUGCTL_GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(name = "plugctl")]
#[command(author, version = VERSION, about = "plugctl - manage workspace plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the OAuth sign-in link for a provider
    LoginUrl {
        /// OAuth provider
        #[arg(long, default_value = DEFAULT_PROVIDER)]
        provider: String,

        /// Query string of the sign-in page (e.g. "invite_token=abc")
        #[arg(long)]
        query: Option<String>,
    },

    /// List installed plugins
    List,

    /// Install or update the dependencies in a JSON file
    Install {
        /// JSON file with `dependencies`, `plugins` and optional `installed`
        deps: PathBuf,

        /// JSON map of installed versions keyed by org/name
        #[arg(long)]
        installed: Option<PathBuf>,
    },

    /// Show background install tasks
    Tasks {
        #[command(subcommand)]
        action: Option<TaskAction>,

        /// Keep polling until every task has finished
        #[arg(short, long)]
        watch: bool,

        /// Limit the post-install refresh to one category (tool, model, extension, agent-strategy)
        #[arg(long)]
        category: Option<PluginCategory>,
    },

    /// Search the marketplace
    Search {
        query: String,

        /// Category filter ("all" for none)
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        page_size: Option<u32>,

        /// Search bundles instead of plugins
        #[arg(long)]
        bundles: bool,
    },

    /// Show plugin permissions for the current workspace
    Permissions,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Clear one plugin from a task, or all tasks when no ids are given
    Clear {
        #[arg(long)]
        task: Option<String>,

        #[arg(long)]
        plugin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "plugctl=debug"
    } else {
        "plugctl=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::LoginUrl { provider, query } => {
            plugin_cli::run_login_url(&config, &provider, query.as_deref())?;
        }
        Commands::List => {
            let ctx = PluginContext::new(config)?;
            plugin_cli::run_plugin_list(&ctx).await?;
        }
        Commands::Install { deps, installed } => {
            let ctx = PluginContext::new(config)?;
            plugin_cli::run_install(&ctx, &deps, installed.as_deref()).await?;
        }
        Commands::Tasks {
            action,
            watch,
            category,
        } => {
            let ctx = PluginContext::new(config)?;
            match action {
                Some(TaskAction::Clear { task, plugin }) => {
                    plugin_cli::run_clear_tasks(&ctx, task.as_deref(), plugin.as_deref()).await?;
                }
                None => plugin_cli::run_tasks(&ctx, watch, category).await?,
            }
        }
        Commands::Search {
            query,
            category,
            page,
            page_size,
            bundles,
        } => {
            let ctx = PluginContext::new(config)?;
            let params = PluginSearchParams {
                query,
                category,
                page,
                page_size,
                kind: if bundles {
                    SearchKind::Bundle
                } else {
                    SearchKind::Plugin
                },
                ..Default::default()
            };
            plugin_cli::run_search(&ctx, &params).await?;
        }
        Commands::Permissions => {
            let ctx = PluginContext::new(config)?;
            plugin_cli::run_permissions(&ctx).await?;
        }
    }

    Ok(())
}
