//! Refreshing views that depend on the installed plugin set

use super::keys;
use super::types::PluginCategory;
use crate::cache::QueryCache;
use std::sync::Arc;

/// Side effect run once background tasks settle
pub trait RefreshPluginList: Send + Sync {
    /// Refresh the installed list and the views of `category`, or of every
    /// category when `None`.
    fn refresh(&self, category: Option<PluginCategory>);
}

/// Refreshes by invalidating cache entries; the next read refetches.
pub struct CacheRefresher {
    cache: Arc<QueryCache>,
}

impl CacheRefresher {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }
}

impl RefreshPluginList for CacheRefresher {
    fn refresh(&self, category: Option<PluginCategory>) {
        tracing::info!(
            "refreshing plugin list ({})",
            category.map_or_else(|| "all".to_string(), |c| c.to_string())
        );
        self.cache.invalidate(&keys::installed_plugin_list());
        self.cache.invalidate(&keys::builtin_tools());

        let all = category.is_none();
        if all || category == Some(PluginCategory::Model) {
            self.cache.invalidate(&keys::model_providers());
        }
        if all || category == Some(PluginCategory::Tool) {
            self.cache.invalidate(&keys::tool_providers());
        }
        if all || category == Some(PluginCategory::AgentStrategy) {
            self.cache.invalidate(&keys::agent_strategies());
        }
    }
}
