//! Wire types for the workspace plugin API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Plugin category as reported by manifests and the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginCategory {
    Tool,
    Model,
    Extension,
    AgentStrategy,
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginCategory::Tool => write!(f, "tool"),
            PluginCategory::Model => write!(f, "model"),
            PluginCategory::Extension => write!(f, "extension"),
            PluginCategory::AgentStrategy => write!(f, "agent-strategy"),
        }
    }
}

impl FromStr for PluginCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(PluginCategory::Tool),
            "model" => Ok(PluginCategory::Model),
            "extension" => Ok(PluginCategory::Extension),
            "agent-strategy" => Ok(PluginCategory::AgentStrategy),
            other => Err(format!("unknown plugin category '{}'", other)),
        }
    }
}

/// A plugin to install, by source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Dependency {
    Github(GithubDependency),
    Marketplace(MarketplaceDependency),
    Package(PackageDependency),
}

impl Dependency {
    pub fn kind(&self) -> &'static str {
        match self {
            Dependency::Github(_) => "github",
            Dependency::Marketplace(_) => "marketplace",
            Dependency::Package(_) => "package",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithubDependency {
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Bundles name the release tag `release` instead of `version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<String>,
    /// Absent when the dependency comes from a local bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_plugin_unique_identifier: Option<String>,
}

impl GithubDependency {
    /// Release tag, preferring `release` over `version`
    pub fn release_tag(&self) -> &str {
        non_empty(&self.release)
            .or_else(|| non_empty(&self.version))
            .unwrap_or_default()
    }

    /// Package file name, preferring `packages` over `package`
    pub fn package_name(&self) -> &str {
        non_empty(&self.packages)
            .or_else(|| non_empty(&self.package))
            .unwrap_or_default()
    }

    pub fn precomputed_identifier(&self) -> Option<&str> {
        non_empty(&self.github_plugin_unique_identifier)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_plugin_unique_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MarketplaceDependency {
    pub fn unique_identifier(&self) -> Option<&str> {
        non_empty(&self.marketplace_plugin_unique_identifier)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub unique_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Descriptive metadata that travels alongside each dependency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginMeta {
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub name: String,
    #[serde(default)]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub category: Option<PluginCategory>,
    #[serde(default)]
    pub version: Option<String>,
}

impl PluginMeta {
    /// Key into the installed-version map: `{org or author}/{name}`
    pub fn org_and_name(&self) -> String {
        let org = non_empty(&self.org)
            .or_else(|| non_empty(&self.author))
            .unwrap_or_default();
        format!("{}/{}", org, self.name)
    }
}

/// What is installed for one `org/name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(alias = "installed_id")]
    pub installed_id: String,
    #[serde(alias = "unique_identifier")]
    pub unique_identifier: String,
    #[serde(default, alias = "installed_version")]
    pub installed_version: Option<String>,
}

/// Installed versions keyed by `org/name`
pub type InstalledInfo = HashMap<String, VersionInfo>;

/// Outcome of one dependency in an install-or-update batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
}

impl InstallResult {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPackageResponse {
    #[serde(default)]
    pub all_installed: bool,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadGithubResponse {
    pub unique_identifier: String,
    #[serde(default)]
    pub manifest: Option<Value>,
}

/// Repo, release and package that identify a github-hosted plugin package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubPackage {
    pub repo: String,
    pub version: String,
    pub package: String,
}

impl From<&GithubDependency> for GithubPackage {
    fn from(dep: &GithubDependency) -> Self {
        Self {
            repo: dep.repo.clone(),
            version: dep.release_tag().to_string(),
            package: dep.package_name().to_string(),
        }
    }
}

/// Background install/upgrade job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-plugin progress inside a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginTaskItem {
    pub plugin_unique_identifier: String,
    #[serde(default)]
    pub plugin_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginTask {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub total_plugins: u32,
    #[serde(default)]
    pub completed_plugins: u32,
    #[serde(default)]
    pub plugins: Vec<PluginTaskItem>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The current workspace's task list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<PluginTask>,
}

impl TaskList {
    /// Every task reached success or failed (vacuously true when empty)
    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn all_failed(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Failed)
    }
}

/// One installed plugin as listed by the console
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub plugin_id: String,
    pub plugin_unique_identifier: String,
    #[serde(default)]
    pub installation_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub latest_unique_identifier: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub declaration: Value,
}

impl PluginDetail {
    pub fn category(&self) -> Option<PluginCategory> {
        self.declaration
            .get("category")
            .and_then(Value::as_str)
            .and_then(|c| c.parse().ok())
    }

    pub fn has_update(&self) -> bool {
        !self.latest_version.is_empty() && self.latest_version != self.version
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstalledPluginList {
    #[serde(default)]
    pub plugins: Vec<PluginDetail>,
}

impl InstalledPluginList {
    /// Installed versions keyed by plugin id (`org/name`)
    pub fn installed_info(&self) -> InstalledInfo {
        self.plugins
            .iter()
            .map(|p| {
                (
                    p.plugin_id.clone(),
                    VersionInfo {
                        installed_id: p.installation_id.clone(),
                        unique_identifier: p.plugin_unique_identifier.clone(),
                        installed_version: Some(p.version.clone()).filter(|v| !v.is_empty()),
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersion {
    pub plugin_id: String,
    pub version: String,
    pub unique_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstalledLatestVersions {
    #[serde(default)]
    pub versions: HashMap<String, Option<LatestVersion>>,
}

/// Remote debugging endpoint for plugin development
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub key: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDeclaration {
    pub manifest: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakedDependencies {
    #[serde(default)]
    pub leaked_dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}
