//! CLI commands for plugin management

use crate::api::ApiClient;
use crate::auth::{login_path, oauth_link, SearchParams};
use crate::cache::QueryCache;
use crate::config::Config;
use crate::marketplace::{Marketplace, PluginSearchParams, SearchKind};
use crate::plugins::{
    CacheRefresher, InstallRequest, Installer, PluginCategory, PluginService, PluginTask,
    TaskPoller, TaskStatus,
};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

/// Service handles built from one config, sharing a cache
pub struct PluginContext {
    pub config: Config,
    pub service: PluginService,
    pub marketplace: Marketplace,
}

impl PluginContext {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config.api).context("Failed to build HTTP client")?;
        let cache = Arc::new(QueryCache::new(&config.cache));
        Ok(Self {
            service: PluginService::new(client.clone(), cache.clone()),
            marketplace: Marketplace::new(client, cache),
            config,
        })
    }
}

/// Print the OAuth redirect link for a provider
pub fn run_login_url(config: &Config, provider: &str, query: Option<&str>) -> Result<()> {
    let params = query.map(SearchParams::parse).unwrap_or_default();
    let link = oauth_link(&config.api.console_root(), &login_path(provider), &params);
    println!("{}", link);
    Ok(())
}

/// List installed plugins
pub async fn run_plugin_list(ctx: &PluginContext) -> Result<()> {
    let list = ctx
        .service
        .installed_plugin_list()
        .await
        .context("Failed to fetch installed plugins")?;

    println!("{}", "=== Installed Plugins ===".bold().cyan());
    println!();

    #[derive(Tabled)]
    struct PluginRow {
        #[tabled(rename = "Plugin")]
        plugin_id: String,
        #[tabled(rename = "Version")]
        version: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Update")]
        update: String,
    }

    let rows: Vec<PluginRow> = list
        .plugins
        .iter()
        .map(|p| PluginRow {
            plugin_id: p.plugin_id.clone(),
            version: p.version.clone(),
            category: p
                .category()
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            source: p.source.clone(),
            update: if p.has_update() {
                format!("→ {}", p.latest_version).yellow().to_string()
            } else {
                "✓".green().to_string()
            },
        })
        .collect();

    if rows.is_empty() {
        println!("No plugins installed.");
        println!();
        println!("Install plugins with:");
        println!("  plugctl install <deps.json>");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{}", table);
    }

    Ok(())
}

/// Install or update the dependencies listed in a JSON file
pub async fn run_install(
    ctx: &PluginContext,
    deps_path: &Path,
    installed_path: Option<&Path>,
) -> Result<()> {
    let content = std::fs::read_to_string(deps_path)
        .with_context(|| format!("Failed to read {}", deps_path.display()))?;
    let mut request: InstallRequest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", deps_path.display()))?;

    if let Some(path) = installed_path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        request.installed = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
    } else if request.installed.is_empty() && !request.plugins.is_empty() {
        let ids: Vec<String> = request.plugins.iter().map(|p| p.org_and_name()).collect();
        request.installed = ctx
            .service
            .check_installed(&ids)
            .await
            .context("Failed to check installed plugins")?
            .installed_info();
    }

    println!("{}", "=== Installing Plugins ===".bold().cyan());
    println!();

    let service = ctx.service.clone();
    let installer = Installer::new(Arc::new(ctx.service.clone()))
        .on_success(move |_| service.invalidate_installed_plugin_list());
    let results = installer.install_or_update(&request).await;

    for (i, (dep, result)) in request.dependencies.iter().zip(&results).enumerate() {
        let name = request
            .plugins
            .get(i)
            .map_or_else(|| format!("#{}", i + 1), |p| p.org_and_name());
        let mark = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {} ({})", mark, name, dep.kind());
    }

    let failed = results.iter().filter(|r| !r.success).count();
    println!();
    if failed == 0 {
        println!("✅ {} dependencies queued", results.len());
        println!("Follow progress with: plugctl tasks --watch");
        Ok(())
    } else {
        anyhow::bail!("{} of {} dependencies failed", failed, results.len())
    }
}

/// Show background install tasks, optionally until they settle
pub async fn run_tasks(
    ctx: &PluginContext,
    watch: bool,
    category: Option<PluginCategory>,
) -> Result<()> {
    let tasks = if watch {
        let can_manage = ctx
            .service
            .can_manage()
            .await
            .context("Failed to check plugin permissions")?;
        if !can_manage {
            println!("{}", "Your workspace role cannot manage plugins".yellow());
            return Ok(());
        }

        let refresher = Arc::new(CacheRefresher::new(ctx.service.cache().clone()));
        let mut handle = TaskPoller::new(Arc::new(ctx.service.clone()), refresher)
            .with_interval(ctx.config.polling.interval())
            .with_category(category)
            .start();

        let mut updates = handle.subscribe();
        let watcher = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.is_fetched && !snapshot.is_fetching {
                    let pending = snapshot
                        .plugin_tasks()
                        .iter()
                        .filter(|t| !t.status.is_terminal())
                        .count();
                    if pending > 0 {
                        eprintln!("{} task(s) still running...", pending);
                    }
                }
            }
        });

        // An unreachable console would otherwise keep the poller retrying forever
        let snapshot = handle
            .wait_for(|s| {
                (s.is_fetched && !s.is_fetching && !s.polling)
                    || (s.data.is_none() && s.last_error.is_some())
            })
            .await;
        handle.stop().await;
        watcher.abort();

        if let Some(error) = snapshot.last_error {
            anyhow::bail!("Failed to fetch plugin tasks: {}", error);
        }
        snapshot.plugin_tasks().to_vec()
    } else {
        ctx.service
            .plugin_tasks()
            .await
            .context("Failed to fetch plugin tasks")?
            .tasks
    };

    print_tasks(&tasks);
    Ok(())
}

fn print_tasks(tasks: &[PluginTask]) {
    println!("{}", "=== Plugin Tasks ===".bold().cyan());
    println!();

    if tasks.is_empty() {
        println!("No plugin tasks.");
        return;
    }

    #[derive(Tabled)]
    struct TaskRow {
        #[tabled(rename = "Task")]
        id: String,
        #[tabled(rename = "Plugin")]
        plugin: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Message")]
        message: String,
    }

    let rows: Vec<TaskRow> = tasks
        .iter()
        .flat_map(|task| {
            if task.plugins.is_empty() {
                return vec![TaskRow {
                    id: task.id.clone(),
                    plugin: "-".to_string(),
                    status: colored_status(task.status),
                    message: String::new(),
                }];
            }
            task.plugins
                .iter()
                .map(|item| TaskRow {
                    id: task.id.clone(),
                    plugin: item.plugin_id.clone(),
                    status: colored_status(item.status),
                    message: item.message.chars().take(60).collect(),
                })
                .collect()
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

fn colored_status(status: TaskStatus) -> String {
    let text = status.to_string();
    match status {
        TaskStatus::Success => text.green().to_string(),
        TaskStatus::Failed => text.red().to_string(),
        TaskStatus::Pending | TaskStatus::Running => text.yellow().to_string(),
    }
}

/// Clear one finished plugin from a task, or every task
pub async fn run_clear_tasks(
    ctx: &PluginContext,
    task_id: Option<&str>,
    plugin_id: Option<&str>,
) -> Result<()> {
    let response = match (task_id, plugin_id) {
        (Some(task_id), Some(plugin_id)) => ctx
            .service
            .clear_task(task_id, plugin_id)
            .await
            .context("Failed to clear task")?,
        (None, None) => ctx
            .service
            .clear_all_tasks()
            .await
            .context("Failed to clear tasks")?,
        _ => anyhow::bail!("--task and --plugin must be given together"),
    };

    if response.success {
        println!("✅ Cleared");
    } else {
        println!("{}", "Nothing cleared".yellow());
    }
    Ok(())
}

/// Search the marketplace
pub async fn run_search(ctx: &PluginContext, params: &PluginSearchParams) -> Result<()> {
    let result = ctx
        .marketplace
        .search_advanced(params)
        .await
        .context("Marketplace search failed")?;

    let heading = match params.kind {
        SearchKind::Plugin => "=== Marketplace Plugins ===",
        SearchKind::Bundle => "=== Marketplace Bundles ===",
    };
    println!("{}", heading.bold().cyan());
    println!();

    #[derive(Tabled)]
    struct ListingRow {
        #[tabled(rename = "Plugin")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Latest")]
        latest: String,
        #[tabled(rename = "Installs")]
        installs: u64,
    }

    let listings = match params.kind {
        SearchKind::Plugin => &result.plugins,
        SearchKind::Bundle => &result.bundles,
    };
    let rows: Vec<ListingRow> = listings
        .iter()
        .map(|p| ListingRow {
            id: format!("{}/{}", p.org, p.name),
            name: p.display_name().to_string(),
            category: p.category.clone(),
            latest: p.latest_version.clone(),
            installs: p.install_count,
        })
        .collect();

    if rows.is_empty() {
        println!("No results for '{}'.", params.query);
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{}", table);
        println!();
        println!("{} result(s)", result.total);
    }
    Ok(())
}

/// Show who may install and debug plugins
pub async fn run_permissions(ctx: &PluginContext) -> Result<()> {
    let permissions = ctx
        .service
        .permissions()
        .await
        .context("Failed to fetch plugin permissions")?;
    let role = ctx
        .service
        .current_role()
        .await
        .context("Failed to fetch workspace role")?;

    println!("{}", "=== Plugin Permissions ===".bold().cyan());
    println!();
    println!("{}:   {}", "Install".bold(), permissions.install_permission);
    println!("{}:     {}", "Debug".bold(), permissions.debug_permission);
    println!("{}: {}", "Your role".bold(), role);
    println!();

    let yes_no = |allowed: bool| {
        if allowed {
            "✓ yes".green()
        } else {
            "✗ no".red()
        }
    };
    println!("  Can manage: {}", yes_no(permissions.can_manage(role)));
    println!("  Can debug:  {}", yes_no(permissions.can_debug(role)));
    Ok(())
}
