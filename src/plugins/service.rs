//! Workspace plugin endpoints behind the request cache
//!
//! Reads go through [`QueryCache`] under the keys in [`super::keys`];
//! mutations hit the API directly and callers invalidate what they change.

use super::installer::PluginBackend;
use super::keys;
use super::permission::{Permissions, WorkspaceRole};
use super::types::{
    DebugInfo, GithubPackage, InstallPackageResponse, InstalledLatestVersions,
    InstalledPluginList, LeakedDependencies, PluginDeclaration, SuccessResponse, TaskList,
    UploadGithubResponse,
};
use crate::api::{ApiClient, ApiError};
use crate::cache::{QueryCache, QueryOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const TASK_PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, Deserialize, Serialize)]
struct CurrentWorkspace {
    role: WorkspaceRole,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ModelItem {
    model: String,
}

#[derive(Clone)]
pub struct PluginService {
    client: ApiClient,
    cache: Arc<QueryCache>,
}

impl PluginService {
    pub fn new(client: ApiClient, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Installed plugins among `plugin_ids`; never served from cache
    pub async fn check_installed(
        &self,
        plugin_ids: &[String],
    ) -> Result<InstalledPluginList, ApiError> {
        let key = keys::check_installed(plugin_ids);
        self.cache
            .fetch(&key, QueryOptions::always_fresh(), move || async move {
                self.client
                    .post(
                        "/workspaces/current/plugin/list/installations/ids",
                        Some(&json!({ "plugin_ids": plugin_ids })),
                    )
                    .await
            })
            .await
    }

    pub async fn installed_plugin_list(&self) -> Result<InstalledPluginList, ApiError> {
        self.cache
            .fetch(&keys::installed_plugin_list(), QueryOptions::default(), || {
                self.client.get("/workspaces/current/plugin/list", &[])
            })
            .await
    }

    /// Latest marketplace versions of installed plugins
    pub async fn installed_latest_version(
        &self,
        plugin_ids: &[String],
    ) -> Result<InstalledLatestVersions, ApiError> {
        if plugin_ids.is_empty() {
            return Ok(InstalledLatestVersions::default());
        }
        let key = keys::installed_latest_version(plugin_ids);
        self.cache
            .fetch(&key, QueryOptions::default(), move || async move {
                self.client
                    .post(
                        "/workspaces/current/plugin/list/latest-versions",
                        Some(&json!({ "plugin_ids": plugin_ids })),
                    )
                    .await
            })
            .await
    }

    /// Installed-list consumers refetch on next read; builtin tools follow
    pub fn invalidate_installed_plugin_list(&self) {
        self.cache.invalidate(&keys::installed_plugin_list());
        self.cache.invalidate(&keys::builtin_tools());
    }

    pub async fn install_from_marketplace(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        self.client
            .post(
                "/workspaces/current/plugin/install/marketplace",
                Some(&json!({ "plugin_unique_identifiers": [unique_identifier] })),
            )
            .await
    }

    pub async fn upgrade_from_marketplace(
        &self,
        original_unique_identifier: &str,
        new_unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        self.client
            .post(
                "/workspaces/current/plugin/upgrade/marketplace",
                Some(&json!({
                    "original_plugin_unique_identifier": original_unique_identifier,
                    "new_plugin_unique_identifier": new_unique_identifier,
                })),
            )
            .await
    }

    pub async fn install_from_local(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        self.client
            .post(
                "/workspaces/current/plugin/install/pkg",
                Some(&json!({ "plugin_unique_identifiers": [unique_identifier] })),
            )
            .await
    }

    pub async fn install_from_github(
        &self,
        package: &GithubPackage,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        self.client
            .post(
                "/workspaces/current/plugin/install/github",
                Some(&json!({
                    "repo": package.repo,
                    "version": package.version,
                    "package": package.package,
                    "plugin_unique_identifier": unique_identifier,
                })),
            )
            .await
    }

    /// Register a github release package; cached per payload, never retried
    pub async fn upload_github(
        &self,
        package: &GithubPackage,
    ) -> Result<UploadGithubResponse, ApiError> {
        let key = keys::upload_github(package);
        self.cache
            .fetch(&key, QueryOptions::no_retry(), || {
                self.client
                    .post("/workspaces/current/plugin/upload/github", Some(package))
            })
            .await
    }

    pub async fn uninstall(&self, installation_id: &str) -> Result<SuccessResponse, ApiError> {
        self.client
            .post(
                "/workspaces/current/plugin/uninstall",
                Some(&json!({ "plugin_installation_id": installation_id })),
            )
            .await
    }

    /// Manifest of a marketplace package, `None` for an empty identifier
    pub async fn plugin_declaration(
        &self,
        unique_identifier: &str,
    ) -> Result<Option<PluginDeclaration>, ApiError> {
        if unique_identifier.is_empty() {
            return Ok(None);
        }
        let key = keys::plugin_declaration(unique_identifier);
        self.cache
            .fetch(&key, QueryOptions::default(), move || async move {
                self.client
                    .get(
                        "/workspaces/current/plugin/marketplace/pkg",
                        &[("plugin_unique_identifier", unique_identifier)],
                    )
                    .await
            })
            .await
            .map(Some)
    }

    pub async fn debug_key(&self) -> Result<DebugInfo, ApiError> {
        self.cache
            .fetch(&keys::debug_key(), QueryOptions::default(), || {
                self.client
                    .get("/workspaces/current/plugin/debugging-key", &[])
            })
            .await
    }

    pub async fn permissions(&self) -> Result<Permissions, ApiError> {
        self.cache
            .fetch(&keys::permissions(), QueryOptions::default(), || {
                self.client
                    .get("/workspaces/current/plugin/permission/fetch", &[])
            })
            .await
    }

    pub fn invalidate_permissions(&self) {
        self.cache.invalidate(&keys::permissions());
    }

    pub async fn change_permissions(&self, permissions: &Permissions) -> Result<(), ApiError> {
        let _: Option<serde_json::Value> = self
            .client
            .post(
                "/workspaces/current/plugin/permission/change",
                Some(permissions),
            )
            .await?;
        self.invalidate_permissions();
        Ok(())
    }

    /// Caller's role in the current workspace
    pub async fn current_role(&self) -> Result<WorkspaceRole, ApiError> {
        let workspace: CurrentWorkspace = self
            .cache
            .fetch(&keys::workspace_role(), QueryOptions::default(), || {
                self.client.get("/workspaces/current", &[])
            })
            .await?;
        Ok(workspace.role)
    }

    /// Whether the caller may install plugins and watch their tasks
    pub async fn can_manage(&self) -> Result<bool, ApiError> {
        let permissions = self.permissions().await?;
        let role = self.current_role().await?;
        Ok(permissions.can_manage(role))
    }

    /// First page (100) of the workspace's install/upgrade tasks, always fetched
    pub async fn plugin_tasks(&self) -> Result<TaskList, ApiError> {
        self.cache
            .fetch(&keys::plugin_task_list(), QueryOptions::always_fresh(), || {
                self.client.get(
                    "/workspaces/current/plugin/tasks",
                    &[("page", "1"), ("page_size", TASK_PAGE_SIZE)],
                )
            })
            .await
    }

    /// Remove one plugin's entry from a task
    pub async fn clear_task(
        &self,
        task_id: &str,
        plugin_id: &str,
    ) -> Result<SuccessResponse, ApiError> {
        let path = format!(
            "/workspaces/current/plugin/tasks/{}/delete/{}",
            task_id, plugin_id
        );
        self.client.post::<_, ()>(&path, None).await.map(Option::unwrap_or_default)
    }

    pub async fn clear_all_tasks(&self) -> Result<SuccessResponse, ApiError> {
        self.client
            .post::<_, ()>("/workspaces/current/plugin/tasks/delete_all", None)
            .await
            .map(Option::unwrap_or_default)
    }

    /// Plugins an imported app needs that the workspace lacks
    pub async fn check_dependencies(&self, app_id: &str) -> Result<LeakedDependencies, ApiError> {
        let path = format!("/apps/imports/{}/check-dependencies", app_id);
        self.client.get(&path, &[]).await
    }

    /// Whether `provider` offers `model_id`. Lookup failures count as no.
    pub async fn model_in_list(&self, provider: Option<&str>, model_id: Option<&str>) -> bool {
        let (Some(provider), Some(model_id)) = (provider, model_id) else {
            return false;
        };
        if provider.is_empty() || model_id.is_empty() {
            return false;
        }

        let path = format!("/workspaces/current/model-providers/{}/models", provider);
        let path = path.as_str();
        let key = keys::model_in_list(provider, model_id);
        let result = self
            .cache
            .fetch(&key, QueryOptions::default(), move || async move {
                match self.client.get::<ModelList>(path, &[]).await {
                    Ok(models) => Ok(models.data.iter().any(|m| m.model == model_id)),
                    Err(e) => {
                        tracing::debug!("model list for {} unavailable: {}", provider, e);
                        Ok(false)
                    }
                }
            })
            .await;
        result.unwrap_or(false)
    }
}

#[async_trait]
impl PluginBackend for PluginService {
    async fn upload_github(
        &self,
        package: &GithubPackage,
    ) -> Result<UploadGithubResponse, ApiError> {
        PluginService::upload_github(self, package).await
    }

    async fn install_from_github(
        &self,
        package: &GithubPackage,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        PluginService::install_from_github(self, package, unique_identifier).await
    }

    async fn install_from_marketplace(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        PluginService::install_from_marketplace(self, unique_identifier).await
    }

    async fn install_from_local(
        &self,
        unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        PluginService::install_from_local(self, unique_identifier).await
    }

    async fn upgrade_from_marketplace(
        &self,
        original_unique_identifier: &str,
        new_unique_identifier: &str,
    ) -> Result<InstallPackageResponse, ApiError> {
        PluginService::upgrade_from_marketplace(
            self,
            original_unique_identifier,
            new_unique_identifier,
        )
        .await
    }

    async fn uninstall(&self, installation_id: &str) -> Result<SuccessResponse, ApiError> {
        PluginService::uninstall(self, installation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::plugins::permission::PermissionType;
    use crate::plugins::types::Dependency;
    use mockito::{Matcher, Server};

    fn service(server: &Server) -> PluginService {
        let cache = QueryCache::new(&CacheConfig {
            stale_time_ms: 60_000,
            retry: 0,
            retry_base_delay_ms: 1,
            ..Default::default()
        });
        PluginService::new(
            ApiClient::with_roots(&server.url(), &server.url()),
            Arc::new(cache),
        )
    }

    #[tokio::test]
    async fn test_install_from_marketplace_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/current/plugin/install/marketplace")
            .match_body(Matcher::Json(json!({
                "plugin_unique_identifiers": ["acme/search:1.0@x"]
            })))
            .with_body(r#"{"all_installed": false, "task_id": "t-1"}"#)
            .create_async()
            .await;

        let response = service(&server)
            .install_from_marketplace("acme/search:1.0@x")
            .await
            .unwrap();
        assert_eq!(response.task_id, "t-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_version_skips_request_for_no_ids() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/current/plugin/list/latest-versions")
            .expect(0)
            .create_async()
            .await;

        let versions = service(&server).installed_latest_version(&[]).await.unwrap();
        assert!(versions.versions.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_installed_list_cached_until_invalidated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/workspaces/current/plugin/list")
            .with_body(r#"{"plugins": []}"#)
            .expect(2)
            .create_async()
            .await;

        let service = service(&server);
        service.installed_plugin_list().await.unwrap();
        service.installed_plugin_list().await.unwrap();
        service.invalidate_installed_plugin_list();
        service.installed_plugin_list().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_installed_always_refetches() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/current/plugin/list/installations/ids")
            .match_body(Matcher::Json(json!({"plugin_ids": ["acme/search"]})))
            .with_body(r#"{"plugins": []}"#)
            .expect(2)
            .create_async()
            .await;

        let service = service(&server);
        let ids = vec!["acme/search".to_string()];
        service.check_installed(&ids).await.unwrap();
        service.check_installed(&ids).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_model_in_list_swallows_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/workspaces/current/model-providers/openai/models")
            .with_status(500)
            .create_async()
            .await;

        let service = service(&server);
        assert!(!service.model_in_list(Some("openai"), Some("gpt-4o")).await);
        assert!(!service.model_in_list(None, Some("gpt-4o")).await);
    }

    #[tokio::test]
    async fn test_model_in_list_finds_model() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/workspaces/current/model-providers/ollama/models")
            .with_body(r#"{"data": [{"model": "llama3.2"}, {"model": "llava"}]}"#)
            .create_async()
            .await;

        let service = service(&server);
        assert!(service.model_in_list(Some("ollama"), Some("llava")).await);
        assert!(!service.model_in_list(Some("ollama"), Some("mistral")).await);
    }

    #[tokio::test]
    async fn test_clear_task_path() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/current/plugin/tasks/t-9/delete/p-1")
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let response = service(&server)
            .clear_task("t-9", "p-1")
            .await
            .unwrap();
        assert!(response.success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_can_manage_combines_role_and_permissions() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/workspaces/current/plugin/permission/fetch")
            .with_body(r#"{"install_permission": "admins", "debug_permission": "noone"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/workspaces/current")
            .with_body(r#"{"id": "w1", "role": "editor"}"#)
            .create_async()
            .await;

        assert!(!service(&server).can_manage().await.unwrap());
    }

    #[tokio::test]
    async fn test_change_permissions_refetches_permissions() {
        let mut server = Server::new_async().await;
        let fetch = server
            .mock("GET", "/workspaces/current/plugin/permission/fetch")
            .with_body(r#"{"install_permission": "everyone", "debug_permission": "everyone"}"#)
            .expect(2)
            .create_async()
            .await;
        let change = server
            .mock("POST", "/workspaces/current/plugin/permission/change")
            .match_body(Matcher::Json(json!({
                "install_permission": "admins",
                "debug_permission": "noone"
            })))
            .with_body(r#"{"success": true}"#)
            .expect(1)
            .create_async()
            .await;

        let service = service(&server);
        service.permissions().await.unwrap();
        service.permissions().await.unwrap();
        service
            .change_permissions(&Permissions {
                install_permission: PermissionType::Admins,
                debug_permission: PermissionType::Noone,
            })
            .await
            .unwrap();
        service.permissions().await.unwrap();

        change.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_dependencies_decodes_each_kind() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/apps/imports/app-1/check-dependencies")
            .with_body(
                r#"{"leaked_dependencies": [
                    {"type": "github", "value": {"repo": "acme/weather", "version": "v1.0.0", "package": "weather.difypkg"}},
                    {"type": "marketplace", "value": {"marketplace_plugin_unique_identifier": "acme/search:2.0@m"}},
                    {"type": "package", "value": {"unique_identifier": "acme/local:1.0@p"}}
                ]}"#,
            )
            .create_async()
            .await;

        let leaked = service(&server)
            .check_dependencies("app-1")
            .await
            .unwrap()
            .leaked_dependencies;

        let kinds: Vec<&str> = leaked.iter().map(Dependency::kind).collect();
        assert_eq!(kinds, ["github", "marketplace", "package"]);
        match &leaked[0] {
            Dependency::Github(github) => {
                assert_eq!(github.repo, "acme/weather");
                assert_eq!(github.version.as_deref(), Some("v1.0.0"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &leaked[1] {
            Dependency::Marketplace(m) => {
                assert_eq!(m.unique_identifier(), Some("acme/search:2.0@m"))
            }
            other => panic!("unexpected {other:?}"),
        }
        match &leaked[2] {
            Dependency::Package(p) => assert_eq!(p.unique_identifier, "acme/local:1.0@p"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plugin_declaration_sends_identifier() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/workspaces/current/plugin/marketplace/pkg")
            .match_query(Matcher::UrlEncoded(
                "plugin_unique_identifier".into(),
                "acme/search:2.0@m".into(),
            ))
            .with_body(r#"{"manifest": {"name": "search", "version": "2.0"}}"#)
            .expect(1)
            .create_async()
            .await;

        let declaration = service(&server)
            .plugin_declaration("acme/search:2.0@m")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(declaration.manifest["name"], "search");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_plugin_declaration_empty_identifier_is_none() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/workspaces/current/plugin/marketplace/pkg")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        assert!(service(&server).plugin_declaration("").await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_debug_key_is_cached() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/workspaces/current/plugin/debugging-key")
            .with_body(r#"{"key": "k-1", "host": "localhost", "port": 5003}"#)
            .expect(1)
            .create_async()
            .await;

        let service = service(&server);
        let first = service.debug_key().await.unwrap();
        let second = service.debug_key().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.port, 5003);
        mock.assert_async().await;
    }
}
