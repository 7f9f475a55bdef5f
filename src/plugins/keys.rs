//! Cache keys for plugin queries and the views they invalidate

use crate::cache::QueryKey;

pub const NAMESPACE: &str = "plugins";

pub fn namespace() -> QueryKey {
    QueryKey::new(NAMESPACE)
}

pub fn installed_plugin_list() -> QueryKey {
    namespace().with("installedPluginList")
}

pub fn check_installed(plugin_ids: &[String]) -> QueryKey {
    namespace().with("checkInstalled").with_json(plugin_ids)
}

pub fn installed_latest_version(plugin_ids: &[String]) -> QueryKey {
    namespace().with("installedLatestVersion").with_json(plugin_ids)
}

pub fn plugin_declaration(unique_identifier: &str) -> QueryKey {
    namespace().with("pluginDeclaration").with(unique_identifier)
}

pub fn versions(plugin_id: &str) -> QueryKey {
    namespace().with("versions").with(plugin_id)
}

pub fn debug_key() -> QueryKey {
    namespace().with("debugKey")
}

pub fn permissions() -> QueryKey {
    namespace().with("permissions")
}

pub fn plugin_task_list() -> QueryKey {
    namespace().with("pluginTaskList")
}

pub fn manifest(unique_identifier: &str) -> QueryKey {
    namespace().with("manifest").with(unique_identifier)
}

pub fn upload_github<T: serde::Serialize>(payload: &T) -> QueryKey {
    namespace().with("uploadGitHub").with_json(payload)
}

pub fn marketplace_by_ids(unique_identifiers: &[String]) -> QueryKey {
    namespace()
        .with("fetchPluginsInMarketPlaceByIds")
        .with_json(unique_identifiers)
}

pub fn marketplace_by_info<T: serde::Serialize>(infos: &T) -> QueryKey {
    namespace()
        .with("fetchPluginsInMarketPlaceByInfo")
        .with_json(infos)
}

pub fn model_in_list(provider: &str, model: &str) -> QueryKey {
    QueryKey::new("modelInList").with(provider).with(model)
}

pub fn plugin_info(provider: &str) -> QueryKey {
    QueryKey::new("pluginInfo").with(provider)
}

pub fn workspace_role() -> QueryKey {
    QueryKey::new("workspace").with("current")
}

// Views outside the plugin namespace that depend on what is installed

pub fn builtin_tools() -> QueryKey {
    QueryKey::new("tools").with("builtIn")
}

pub fn tool_providers() -> QueryKey {
    QueryKey::new("tools")
}

pub fn model_providers() -> QueryKey {
    QueryKey::new("modelProviders")
}

pub fn agent_strategies() -> QueryKey {
    QueryKey::new("agentStrategies")
}
