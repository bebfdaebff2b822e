pub mod config;
pub mod init;
pub mod reconcile;
pub mod resolve;
pub mod template;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracemap_core::config::Config;
use tracemap_core::registry::TriggerResolver;

/// Config plus a resolver over every template in the configured directory.
pub(crate) fn load_resolver(root: &Path) -> anyhow::Result<(Config, TriggerResolver)> {
    let config = Config::load(root).context("failed to load config")?;
    let dir = config.templates_dir(root);
    let registry = config
        .load_registry(root)
        .with_context(|| format!("failed to load templates from {}", dir.display()))?;
    tracing::debug!(templates = registry.len(), dir = %dir.display(), "templates loaded");
    let resolver = TriggerResolver::new(Arc::new(registry), &config.aliases)
        .context("invalid alias rule in config")?;
    Ok((config, resolver))
}
