use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "shortcuts.yaml";
pub const CONFIG_FILE_JSON: &str = "shortcuts.json";

pub const INTENTS_FILE: &str = "ShortcutIntents.swift";
pub const CATALOG_FILE: &str = "Localizable.xcstrings";
pub const PHRASES_FILE: &str = "AppShortcuts.strings";
pub const TYPES_FILE: &str = "shortcuts.d.ts";

pub const DEFAULT_OUT_DIR: &str = "ios";
pub const STORE_DIR: &str = ".shortcut-bridge";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Locate the config file in `root`, preferring YAML over JSON.
/// Returns the YAML path when neither exists so error messages name it.
pub fn config_path(root: &Path) -> PathBuf {
    let yaml = root.join(CONFIG_FILE);
    if yaml.exists() {
        return yaml;
    }
    let json = root.join(CONFIG_FILE_JSON);
    if json.exists() {
        return json;
    }
    yaml
}

pub fn intents_path(out_dir: &Path) -> PathBuf {
    out_dir.join(INTENTS_FILE)
}

pub fn catalog_path(out_dir: &Path) -> PathBuf {
    out_dir.join(CATALOG_FILE)
}

pub fn phrases_path(out_dir: &Path) -> PathBuf {
    out_dir.join(PHRASES_FILE)
}

pub fn default_out_dir(root: &Path) -> PathBuf {
    root.join(DEFAULT_OUT_DIR)
}

pub fn default_types_path(root: &Path) -> PathBuf {
    root.join(TYPES_FILE)
}

/// Local stand-in for the shared group container.
pub fn default_store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_defaults_to_yaml() {
        let dir = TempDir::new().unwrap();
        assert_eq!(config_path(dir.path()), dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn config_path_falls_back_to_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_JSON), "{}").unwrap();
        assert_eq!(config_path(dir.path()), dir.path().join(CONFIG_FILE_JSON));
    }
}
