use crate::cmd::load_config;
use crate::output::print_json;
use shortcut_core::config::WarnLevel;
use std::path::Path;

pub fn run(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (path, config) = load_config(root, config)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({
            "config": path.display().to_string(),
            "warnings": warnings,
        }))?;
    } else if warnings.is_empty() {
        println!("{} is valid. No warnings.", path.display());
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
