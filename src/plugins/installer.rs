//! Install-or-update orchestration for a batch of dependencies
//!
//! Each dependency is resolved to a unique identifier and compared with what
//! is installed under the same `org/name`:
//!
//! - same identifier: nothing to do
//! - not installed: install from the dependency's source
//! - installed, different identifier: local packages are uninstalled and
//!   reinstalled, github and marketplace plugins are upgraded in place
//!
//! Items run concurrently and fail independently. A failed item becomes
//! `{success: false}` in its slot; the batch itself never errors.

use super::types::{
    Dependency, GithubPackage, InstallPackageResponse, InstallResult, InstalledInfo, PluginMeta,
    SuccessResponse, UploadGithubResponse, VersionInfo,
};
use crate::api::ApiError;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The plugin mutations the orchestrator needs
#[async_trait]
pub trait PluginBackend: Send + Sync {
    /// Register a github release package and get its unique identifier
    async fn upload_github(&self, package: &GithubPackage)
        -> Result<UploadGithubResponse, ApiError>;

    async fn install_from_github(
        &self,
        package: &GithubPackage,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError>;

    async fn install_from_marketplace(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError>;

    async fn install_from_local(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError>;

    async fn upgrade_from_marketplace(
        &self,
        original_unique_identifier: &str,
        new_unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError>;

    async fn uninstall(&self, installation_id: &str) -> Result<SuccessResponse, ApiError>;
}

/// A batch to install: `plugins[i]` describes `dependencies[i]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallRequest {
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub plugins: Vec<PluginMeta>,
    #[serde(default)]
    pub installed: InstalledInfo,
}

/// What happened to one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    Installed,
    Upgraded,
    Reinstalled,
}

type SuccessCallback = Box<dyn Fn(&[InstallResult]) + Send + Sync>;

pub struct Installer {
    backend: Arc<dyn PluginBackend>,
    on_success: Option<SuccessCallback>,
}

impl Installer {
    pub fn new(backend: Arc<dyn PluginBackend>) -> Self {
        Self {
            backend,
            on_success: None,
        }
    }

    /// Called with the results once the whole batch has settled
    pub fn on_success(mut self, callback: impl Fn(&[InstallResult]) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Install or update every dependency; results keep the input order.
    pub async fn install_or_update(&self, request: &InstallRequest) -> Vec<InstallResult> {
        let items = request.dependencies.iter().enumerate().map(|(i, dep)| {
            let meta = request.plugins.get(i);
            async move {
                match self.install_one(dep, meta, &request.installed).await {
                    Ok(outcome) => {
                        tracing::debug!("dependency {} ({}): {:?}", i, dep.kind(), outcome);
                        InstallResult::ok()
                    }
                    Err(e) => {
                        tracing::warn!("dependency {} ({}) failed: {}", i, dep.kind(), e);
                        InstallResult::failed()
                    }
                }
            }
        });

        let results = join_all(items).await;
        tracing::info!(
            "install batch done: {}/{} succeeded",
            results.iter().filter(|r| r.success).count(),
            results.len()
        );

        if let Some(callback) = &self.on_success {
            callback(&results);
        }
        results
    }

    async fn install_one(
        &self,
        dep: &Dependency,
        meta: Option<&PluginMeta>,
        installed_info: &InstalledInfo,
    ) -> Result<Outcome, ApiError> {
        let installed = meta.and_then(|m| installed_info.get(&m.org_and_name()));
        let unique_identifier = self.resolve_identifier(dep, meta).await?;
        if unique_identifier.is_empty() {
            return Err(ApiError::InvalidArgument(format!(
                "{} dependency resolved to an empty identifier",
                dep.kind()
            )));
        }

        if installed.is_some_and(|v| v.unique_identifier == unique_identifier) {
            return Ok(Outcome::Unchanged);
        }

        match installed {
            None => {
                self.install_fresh(dep, &unique_identifier).await?;
                Ok(Outcome::Installed)
            }
            Some(current) => self.replace(dep, current, &unique_identifier).await,
        }
    }

    async fn resolve_identifier(
        &self,
        dep: &Dependency,
        meta: Option<&PluginMeta>,
    ) -> Result<String, ApiError> {
        match dep {
            Dependency::Github(github) => match github.precomputed_identifier() {
                Some(id) => Ok(id.to_string()),
                None => {
                    let package = GithubPackage::from(github);
                    let uploaded = self.backend.upload_github(&package).await?;
                    Ok(uploaded.unique_identifier)
                }
            },
            Dependency::Marketplace(market) => market
                .unique_identifier()
                .or_else(|| meta.and_then(|m| m.plugin_id.as_deref()))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ApiError::InvalidArgument(
                        "marketplace dependency has no unique identifier".to_string(),
                    )
                }),
            Dependency::Package(package) => Ok(package.unique_identifier.clone()),
        }
    }

    async fn install_fresh(&self, dep: &Dependency, unique_identifier: &str) -> Result<(), ApiError> {
        let response = match dep {
            Dependency::Github(github) => {
                self.backend
                    .install_from_github(&GithubPackage::from(github), unique_identifier)
                    .await?
            }
            Dependency::Marketplace(_) => {
                self.backend.install_from_marketplace(unique_identifier).await?
            }
            Dependency::Package(_) => self.backend.install_from_local(unique_identifier).await?,
        };
        tracing::debug!(
            "install of {} queued as task '{}'",
            unique_identifier,
            response.task_id
        );
        Ok(())
    }

    async fn replace(
        &self,
        dep: &Dependency,
        current: &VersionInfo,
        unique_identifier: &str,
    ) -> Result<Outcome, ApiError> {
        match dep {
            Dependency::Package(_) => {
                self.backend.uninstall(&current.installed_id).await?;
                self.backend.install_from_local(unique_identifier).await?;
                Ok(Outcome::Reinstalled)
            }
            Dependency::Github(_) | Dependency::Marketplace(_) => {
                self.backend
                    .upgrade_from_marketplace(&current.unique_identifier, unique_identifier)
                    .await?;
                Ok(Outcome::Upgraded)
            }
        }
    }
}
