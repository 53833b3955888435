use shortcut_core::paths::{CONFIG_FILE, CONFIG_FILE_JSON};
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `SHORTCUTS_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` holding a shortcuts config
/// 3. Nearest ancestor holding `.git/`
/// 4. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    find_upward(&cwd, |dir| {
        dir.join(CONFIG_FILE).is_file() || dir.join(CONFIG_FILE_JSON).is_file()
    })
    .or_else(|| find_upward(&cwd, |dir| dir.join(".git").is_dir()))
    .unwrap_or(cwd)
}

fn find_upward(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| found(dir)).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_config_above_start() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "shortcuts: []").unwrap();
        let deep = dir.path().join("app/src");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_upward(&deep, |d| d.join(CONFIG_FILE).is_file());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }

    #[test]
    fn nothing_found() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_upward(dir.path(), |d| d.join("nope.marker").exists()), None);
    }
}
