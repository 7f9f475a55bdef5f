//! Command-line front end over the plugin services

pub mod plugin_cli;

pub use plugin_cli::PluginContext;
