//! plugctl: workspace plugin management client
//!
//! This library provides:
//! - Dependency install/upgrade resolution across github, marketplace and local packages
//! - A query cache with per-key de-duplication, staleness and retries
//! - Background polling of install tasks with plugin-list refresh
//! - Marketplace search and lookups
//! - OAuth login link construction

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod marketplace;
pub mod plugins;
pub mod transport;

pub use api::{ApiClient, ApiError};
pub use cache::{QueryCache, QueryKey, QueryOptions};
pub use config::Config;
pub use marketplace::Marketplace;
pub use plugins::{Installer, PluginService, TaskPoller};
