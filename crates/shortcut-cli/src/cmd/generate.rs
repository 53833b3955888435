use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use shortcut_core::generate::{generate, GenerateOptions};
use shortcut_core::paths;
use std::path::{Path, PathBuf};

pub struct GenerateArgs {
    pub config: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub types_out: Option<PathBuf>,
    pub bundle_id: Option<String>,
}

pub fn run(root: &Path, args: GenerateArgs, json: bool) -> anyhow::Result<()> {
    let (config_path, config) = load_config(root, args.config.as_deref())?;
    let opts = GenerateOptions {
        out_dir: args.out.unwrap_or_else(|| paths::default_out_dir(root)),
        types_path: args
            .types_out
            .unwrap_or_else(|| paths::default_types_path(root)),
        bundle_id: args.bundle_id,
    };

    let artifacts = generate(&config, &opts)
        .with_context(|| format!("generation from {} failed", config_path.display()))?;

    let written: Vec<String> = artifacts
        .all()
        .iter()
        .map(|a| a.path.display().to_string())
        .collect();

    if json {
        print_json(&serde_json::json!({
            "config": config_path.display().to_string(),
            "shortcuts": config.shortcuts.len(),
            "written": written,
            "warnings": artifacts.warnings,
        }))?;
    } else {
        for warning in &artifacts.warnings {
            eprintln!("warning: {warning}");
        }
        for path in &written {
            println!("wrote {path}");
        }
        println!(
            "Generated {} shortcut(s) from {}",
            config.shortcuts.len(),
            config_path.display()
        );
    }
    Ok(())
}
