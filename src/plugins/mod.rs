//! Plugin management for a workspace
//!
//! Resolves declared dependencies against what is installed, installs or
//! upgrades them through the console API, and tracks the background tasks
//! those calls start.
//!
//! # Layout
//!
//! - [`types`]: wire types for dependencies, tasks and installed plugins
//! - [`service`]: cached console endpoints ([`PluginService`])
//! - [`installer`]: the install-or-update flow over a [`PluginBackend`]
//! - [`tasks`]: background polling of the task list ([`TaskPoller`])
//! - [`permission`]: who may install and debug plugins
//! - [`refresh`]: what gets invalidated once tasks settle

pub mod installer;
pub mod keys;
pub mod permission;
pub mod refresh;
pub mod service;
pub mod tasks;
pub mod types;

pub use installer::{InstallRequest, Installer, PluginBackend};
pub use permission::{can_debug, can_manage, PermissionType, Permissions, WorkspaceRole};
pub use refresh::{CacheRefresher, RefreshPluginList};
pub use service::PluginService;
pub use tasks::{TaskPoller, TaskPollerHandle, TaskSnapshot, TaskSource};
pub use types::{
    Dependency, GithubDependency, InstallResult, InstalledInfo, MarketplaceDependency,
    PackageDependency, PluginCategory, PluginDetail, PluginMeta, PluginTask, TaskList,
    TaskStatus, VersionInfo,
};
