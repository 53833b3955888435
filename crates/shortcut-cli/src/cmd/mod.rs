pub mod bridge;
pub mod generate;
pub mod validate;

use anyhow::Context;
use shortcut_core::config::ShortcutConfig;
use shortcut_core::paths;
use std::path::{Path, PathBuf};

/// Load the config from `explicit` or the root's default location.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<(PathBuf, ShortcutConfig)> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths::config_path(root));
    let config = ShortcutConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok((path, config))
}
