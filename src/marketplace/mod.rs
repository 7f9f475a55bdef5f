//! Marketplace lookups: search, batch resolution, versions and downloads
//!
//! The marketplace host wraps every JSON payload in `{"data": ...}`; the
//! wrapper is stripped here so callers only see the inner types.

use crate::api::{ApiClient, ApiError};
use crate::cache::{QueryCache, QueryOptions};
use crate::plugins::keys;
use crate::plugins::types::PluginCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 40;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Whether a search targets single plugins or bundles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Plugin,
    Bundle,
}

impl SearchKind {
    fn route(self) -> &'static str {
        match self {
            SearchKind::Plugin => "/plugins/search/advanced",
            SearchKind::Bundle => "/bundles/search/advanced",
        }
    }
}

/// Parameters of an advanced search
#[derive(Debug, Clone, Default)]
pub struct PluginSearchParams {
    pub query: String,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// Category name; `all` means no filter
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub exclude: Vec<String>,
    pub kind: SearchKind,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    page: u32,
    page_size: u32,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_by: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_order: Option<&'a str>,
    category: &'a str,
    tags: &'a [String],
    exclude: &'a [String],
    #[serde(rename = "type")]
    kind: SearchKind,
}

impl<'a> From<&'a PluginSearchParams> for SearchBody<'a> {
    fn from(params: &'a PluginSearchParams) -> Self {
        let category = match params.category.as_deref() {
            Some("all") | None => "",
            Some(category) => category,
        };
        Self {
            page: params.page.unwrap_or(DEFAULT_PAGE),
            page_size: params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            query: &params.query,
            sort_by: params.sort_by.as_deref(),
            sort_order: params.sort_order.as_deref(),
            category,
            tags: &params.tags,
            exclude: &params.exclude,
            kind: params.kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceTag {
    #[serde(default)]
    pub name: String,
}

/// A plugin (or bundle) listing on the marketplace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplacePlugin {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub latest_package_identifier: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub label: HashMap<String, String>,
    #[serde(default)]
    pub brief: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<MarketplaceTag>,
    #[serde(default)]
    pub install_count: u64,
}

impl MarketplacePlugin {
    pub fn category(&self) -> Option<PluginCategory> {
        self.category.parse().ok()
    }

    /// English label, falling back to the plugin name
    pub fn display_name(&self) -> &str {
        self.label
            .get("en_US")
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Search and batch-by-id results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplacePlugins {
    #[serde(default)]
    pub plugins: Vec<MarketplacePlugin>,
    #[serde(default)]
    pub bundles: Vec<MarketplacePlugin>,
    #[serde(default)]
    pub total: u64,
}

/// `org/name@version` triple for batch version resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginTuple {
    pub org: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    #[serde(default)]
    pub plugin_org: String,
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub unique_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlugin {
    pub plugin: MarketplacePlugin,
    pub version: ResolvedVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplacePluginsByInfo {
    #[serde(default)]
    pub list: Vec<ResolvedPlugin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub unique_identifier: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionList {
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionTag {
    #[serde(default)]
    pub version: String,
}

/// One plugin with the version a lookup resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplacePluginInfo {
    pub plugin: MarketplacePlugin,
    #[serde(default)]
    pub version: VersionTag,
}

/// Client for the marketplace host, sharing the plugin query cache
#[derive(Clone)]
pub struct Marketplace {
    client: ApiClient,
    cache: Arc<QueryCache>,
}

impl Marketplace {
    pub fn new(client: ApiClient, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    /// Run an advanced search. Not cached.
    pub async fn search_advanced(
        &self,
        params: &PluginSearchParams,
    ) -> Result<MarketplacePlugins, ApiError> {
        let body = SearchBody::from(params);
        let response: Envelope<MarketplacePlugins> = self
            .client
            .post_marketplace(params.kind.route(), &body)
            .await?;
        Ok(response.data)
    }

    /// Resolve exact package identifiers. Skips the request when every id is empty.
    pub async fn fetch_by_ids(
        &self,
        unique_identifiers: &[String],
    ) -> Result<MarketplacePlugins, ApiError> {
        if unique_identifiers.iter().all(|id| id.is_empty()) {
            return Ok(MarketplacePlugins::default());
        }

        let key = keys::marketplace_by_ids(unique_identifiers);
        self.cache
            .fetch(&key, QueryOptions::no_retry(), move || async move {
                let body = serde_json::json!({ "unique_identifiers": unique_identifiers });
                let response: Envelope<MarketplacePlugins> = self
                    .client
                    .post_marketplace("/plugins/identifier/batch", &body)
                    .await?;
                Ok(response.data)
            })
            .await
    }

    /// Resolve `org/name@version` triples to packages
    pub async fn fetch_by_info(
        &self,
        tuples: &[PluginTuple],
    ) -> Result<MarketplacePluginsByInfo, ApiError> {
        if tuples.is_empty() {
            return Ok(MarketplacePluginsByInfo::default());
        }

        let key = keys::marketplace_by_info(&tuples);
        self.cache
            .fetch(&key, QueryOptions::no_retry(), move || async move {
                let body = serde_json::json!({ "plugin_tuples": tuples });
                let response: Envelope<MarketplacePluginsByInfo> = self
                    .client
                    .post_marketplace("/plugins/versions/batch", &body)
                    .await?;
                Ok(response.data)
            })
            .await
    }

    pub async fn version_list(&self, plugin_id: &str) -> Result<VersionList, ApiError> {
        let path = format!("/plugins/{}/versions", plugin_id);
        let path = path.as_str();
        self.cache
            .fetch(
                &keys::versions(plugin_id),
                QueryOptions::default(),
                move || async move {
                    let response: Envelope<VersionList> = self
                        .client
                        .get_marketplace(path, &[("page", "1"), ("page_size", "100")])
                        .await?;
                    Ok(response.data)
                },
            )
            .await
    }

    pub fn invalidate_version_list(&self, plugin_id: &str) {
        self.cache.invalidate(&keys::versions(plugin_id));
    }

    /// Manifest listing for a package identifier; `None` for an empty id
    pub async fn manifest_info(
        &self,
        unique_identifier: &str,
    ) -> Result<Option<MarketplacePluginInfo>, ApiError> {
        if unique_identifier.is_empty() {
            return Ok(None);
        }

        let path = format!("/plugins/{}", unique_identifier);
        let path = path.as_str();
        self.cache
            .fetch(
                &keys::manifest(unique_identifier),
                QueryOptions::no_retry(),
                move || async move {
                    let response: Envelope<MarketplacePluginInfo> =
                        self.client.get_marketplace(path, &[]).await?;
                    Ok(Some(response.data))
                },
            )
            .await
    }

    /// Download a package archive. Single attempt, not cached.
    pub async fn download(&self, org: &str, name: &str, version: &str) -> Result<Vec<u8>, ApiError> {
        let path = format!("/plugins/{}/{}/{}/download", org, name, version);
        let bytes = self.client.get_marketplace_bytes(&path).await?;
        tracing::info!("downloaded {}/{}:{} ({} bytes)", org, name, version, bytes.len());
        Ok(bytes)
    }

    /// Marketplace entry for a model provider named `org/name`.
    ///
    /// Returns `None` for other categories and when the lookup fails.
    pub async fn plugin_info(&self, provider: Option<&str>) -> Option<MarketplacePlugin> {
        let provider = provider.filter(|p| !p.is_empty())?;
        let mut parts = provider.split('/');
        let org = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        let path = format!("/plugins/{}/{}", org, name);
        let path = path.as_str();

        let result = self
            .cache
            .fetch(
                &keys::plugin_info(provider),
                QueryOptions::default(),
                move || async move {
                    match self
                        .client
                        .get_marketplace::<Envelope<MarketplacePluginInfo>>(path, &[])
                        .await
                    {
                        Ok(response) => {
                            let plugin = response.data.plugin;
                            Ok((plugin.category() == Some(PluginCategory::Model)).then_some(plugin))
                        }
                        Err(e) => {
                            tracing::debug!("plugin info for {} unavailable: {}", provider, e);
                            Ok(None)
                        }
                    }
                },
            )
            .await;
        result.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn marketplace(server: &Server) -> Marketplace {
        let cache = QueryCache::new(&CacheConfig {
            stale_time_ms: 60_000,
            retry: 3,
            retry_base_delay_ms: 1,
            ..Default::default()
        });
        Marketplace::new(
            ApiClient::with_roots(&server.url(), &server.url()),
            Arc::new(cache),
        )
    }

    #[tokio::test]
    async fn test_search_defaults_and_all_category() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bundles/search/advanced")
            .match_body(Matcher::PartialJson(json!({
                "page": 1,
                "page_size": 40,
                "query": "search",
                "category": "",
                "type": "bundle"
            })))
            .with_body(r#"{"data": {"bundles": [{"org": "acme", "name": "kit"}], "total": 1}}"#)
            .create_async()
            .await;

        let params = PluginSearchParams {
            query: "search".into(),
            category: Some("all".into()),
            kind: SearchKind::Bundle,
            ..Default::default()
        };
        let result = marketplace(&server).search_advanced(&params).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.bundles[0].name, "kit");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_keeps_explicit_category_and_paging() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/plugins/search/advanced")
            .match_body(Matcher::PartialJson(json!({
                "page": 3,
                "page_size": 10,
                "category": "tool"
            })))
            .with_body(r#"{"data": {"plugins": [], "total": 0}}"#)
            .create_async()
            .await;

        let params = PluginSearchParams {
            category: Some("tool".into()),
            page: Some(3),
            page_size: Some(10),
            ..Default::default()
        };
        marketplace(&server).search_advanced(&params).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_ids_skips_blank_ids() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/plugins/identifier/batch")
            .expect(0)
            .create_async()
            .await;

        let result = marketplace(&server)
            .fetch_by_ids(&[String::new()])
            .await
            .unwrap();
        assert!(result.plugins.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_ids_does_not_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/plugins/identifier/batch")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let err = marketplace(&server)
            .fetch_by_ids(&["acme/search:1.0@x".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_info_sends_tuples() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/plugins/versions/batch")
            .match_body(Matcher::Json(json!({
                "plugin_tuples": [{"org": "acme", "name": "search", "version": "1.0.0"}]
            })))
            .with_body(
                r#"{"data": {"list": [{
                    "plugin": {"org": "acme", "name": "search"},
                    "version": {"plugin_org": "acme", "plugin_name": "search", "version": "1.0.0", "unique_identifier": "acme/search:1.0.0@x"}
                }]}}"#,
            )
            .create_async()
            .await;

        let tuples = vec![PluginTuple {
            org: "acme".into(),
            name: "search".into(),
            version: "1.0.0".into(),
        }];
        let result = marketplace(&server).fetch_by_info(&tuples).await.unwrap();
        assert_eq!(result.list[0].version.unique_identifier, "acme/search:1.0.0@x");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_version_list_refetches_after_invalidate() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/plugins/acme/search/versions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("page_size".into(), "100".into()),
            ]))
            .with_body(r#"{"data": {"versions": [{"version": "1.0.0", "unique_identifier": "u1"}]}}"#)
            .expect(2)
            .create_async()
            .await;

        let market = marketplace(&server);
        market.version_list("acme/search").await.unwrap();
        market.version_list("acme/search").await.unwrap();
        market.invalidate_version_list("acme/search");
        let versions = market.version_list("acme/search").await.unwrap();
        assert_eq!(versions.versions[0].unique_identifier, "u1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_manifest_info_empty_id() {
        let server = Server::new_async().await;
        let info = marketplace(&server).manifest_info("").await.unwrap();
        assert!(info.is_none());
    }

    #[tokio::test]
    async fn test_download_returns_bytes() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/plugins/acme/search/1.0.0/download")
            .with_body(vec![1u8, 2, 3])
            .create_async()
            .await;

        let bytes = marketplace(&server)
            .download("acme", "search", "1.0.0")
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_plugin_info_only_for_models() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/plugins/acme/llm")
            .with_body(r#"{"data": {"plugin": {"org": "acme", "name": "llm", "category": "model"}}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/plugins/acme/search")
            .with_body(r#"{"data": {"plugin": {"org": "acme", "name": "search", "category": "tool"}}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/plugins/acme/broken")
            .with_status(404)
            .create_async()
            .await;

        let market = marketplace(&server);
        let model = market.plugin_info(Some("acme/llm")).await.unwrap();
        assert_eq!(model.name, "llm");
        assert!(market.plugin_info(Some("acme/search")).await.is_none());
        assert!(market.plugin_info(Some("acme/broken")).await.is_none());
        assert!(market.plugin_info(None).await.is_none());
    }
}
