use crate::config::ShortcutConfig;
use crate::error::{Result, ShortcutError};
use crate::localization::{derive_localized_strings, derive_phrases, merge_catalog, merge_phrase_table};
use crate::{io, paths, swift, typescript};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Options / outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Existing directory that receives the Swift source and catalogs.
    pub out_dir: PathBuf,
    /// Destination of the TypeScript declaration file.
    pub types_path: PathBuf,
    /// Used for the default app group when the config has no override.
    pub bundle_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct Artifacts {
    pub intents: Artifact,
    pub catalog: Option<Artifact>,
    pub phrases: Option<Artifact>,
    pub types: Artifact,
    /// Recoverable problems met while merging existing files.
    pub warnings: Vec<String>,
}

impl Artifacts {
    pub fn all(&self) -> Vec<&Artifact> {
        let mut all = vec![&self.intents];
        all.extend(self.catalog.as_ref());
        all.extend(self.phrases.as_ref());
        all.push(&self.types);
        all
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Assemble every artifact in memory. Nothing is written.
///
/// Existing catalog and phrase files are read from `out_dir` and merged;
/// corrupt ones are replaced and reported in [`Artifacts::warnings`].
pub fn render(config: &ShortcutConfig, opts: &GenerateOptions) -> Result<Artifacts> {
    config.check()?;
    let app_group = config.resolve_app_group(opts.bundle_id.as_deref())?;
    let mut warnings = Vec::new();

    let intents = Artifact {
        path: paths::intents_path(&opts.out_dir),
        contents: swift::render_file(config, &app_group),
    };

    let (catalog, phrases) = if config.localization {
        let catalog_path = paths::catalog_path(&opts.out_dir);
        let existing = io::read_optional(&catalog_path)?;
        let merged = merge_catalog(&derive_localized_strings(config), existing.as_deref())?;
        if merged.recovered {
            tracing::warn!(path = %catalog_path.display(), "existing catalog is unreadable; starting fresh");
            warnings.push(format!(
                "{} could not be parsed; it was replaced with a fresh catalog",
                catalog_path.display()
            ));
        }
        tracing::debug!(added = merged.added, updated = merged.updated, "catalog merged");

        let phrases_path = paths::phrases_path(&opts.out_dir);
        let existing = io::read_optional(&phrases_path)?;
        let phrase_merge = merge_phrase_table(&derive_phrases(config), existing.as_deref());
        if phrase_merge.dropped_lines > 0 {
            tracing::warn!(
                path = %phrases_path.display(),
                dropped = phrase_merge.dropped_lines,
                "dropped malformed phrase lines"
            );
            warnings.push(format!(
                "{}: dropped {} malformed line(s)",
                phrases_path.display(),
                phrase_merge.dropped_lines
            ));
        }
        let mut phrase_text = phrase_merge.text;
        if !phrase_text.is_empty() {
            phrase_text.push('\n');
        }

        (
            Some(Artifact {
                path: catalog_path,
                contents: merged.text,
            }),
            Some(Artifact {
                path: phrases_path,
                contents: phrase_text,
            }),
        )
    } else {
        (None, None)
    };

    let types = Artifact {
        path: opts.types_path.clone(),
        contents: typescript::generate_type_surface(config),
    };

    Ok(Artifacts {
        intents,
        catalog,
        phrases,
        types,
        warnings,
    })
}

/// Write every artifact atomically.
pub fn write(artifacts: &Artifacts) -> Result<()> {
    for artifact in artifacts.all() {
        io::atomic_write(&artifact.path, artifact.contents.as_bytes())?;
        tracing::info!(path = %artifact.path.display(), "wrote artifact");
    }
    Ok(())
}

/// Validate, render, and write. The output directory must already exist.
pub fn generate(config: &ShortcutConfig, opts: &GenerateOptions) -> Result<Artifacts> {
    ensure_dir_exists(&opts.out_dir)?;
    let artifacts = render(config, opts)?;
    write(&artifacts)?;
    Ok(artifacts)
}

fn ensure_dir_exists(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ShortcutError::TargetDirMissing(dir.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::LocalizationCatalog;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
localization: true
appGroupId: group.com.example.timer
shortcuts:
  - identifier: startTimer
    title: Start Timer
    phrases: ["Start timer"]
    dialogs:
      - { stateKey: running, showWhen: true, message: Timer running, requiresConfirmation: false }
"#;

    fn opts(dir: &TempDir) -> GenerateOptions {
        GenerateOptions {
            out_dir: dir.path().join("ios"),
            types_path: dir.path().join("types/shortcuts.d.ts"),
            bundle_id: None,
        }
    }

    #[test]
    fn generate_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        let cfg = ShortcutConfig::from_yaml(CONFIG).unwrap();
        let artifacts = generate(&cfg, &opts(&dir)).unwrap();

        assert_eq!(artifacts.all().len(), 4);
        let swift = std::fs::read_to_string(dir.path().join("ios/ShortcutIntents.swift")).unwrap();
        assert!(swift.contains("struct StartTimerIntent: AppIntent"));
        let phrases =
            std::fs::read_to_string(dir.path().join("ios/AppShortcuts.strings")).unwrap();
        assert_eq!(
            phrases,
            "\"Start timer in ${applicationName}\" = \"Start timer in ${applicationName}\";\n"
        );
        let catalog =
            std::fs::read_to_string(dir.path().join("ios/Localizable.xcstrings")).unwrap();
        let catalog = LocalizationCatalog::parse(&catalog).unwrap();
        assert_eq!(catalog.value("startTimer.dialog.0", "en"), Some("Timer running"));
        assert!(dir.path().join("types/shortcuts.d.ts").exists());
    }

    #[test]
    fn regenerate_keeps_translations() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        let cfg = ShortcutConfig::from_yaml(CONFIG).unwrap();
        generate(&cfg, &opts(&dir)).unwrap();

        let phrases_path = dir.path().join("ios/AppShortcuts.strings");
        std::fs::write(
            &phrases_path,
            "\"Start timer in ${applicationName}\" = \"Iniciar en ${applicationName}\";\n",
        )
        .unwrap();
        generate(&cfg, &opts(&dir)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&phrases_path).unwrap(),
            "\"Start timer in ${applicationName}\" = \"Iniciar en ${applicationName}\";\n"
        );
    }

    #[test]
    fn corrupt_catalog_is_a_warning() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        std::fs::write(dir.path().join("ios/Localizable.xcstrings"), "not json").unwrap();
        let cfg = ShortcutConfig::from_yaml(CONFIG).unwrap();
        let artifacts = generate(&cfg, &opts(&dir)).unwrap();
        assert_eq!(artifacts.warnings.len(), 1);
    }

    #[test]
    fn localization_off_skips_catalogs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        let cfg = ShortcutConfig::from_yaml(&CONFIG.replace("localization: true", "localization: false")).unwrap();
        let artifacts = generate(&cfg, &opts(&dir)).unwrap();
        assert!(artifacts.catalog.is_none());
        assert!(!dir.path().join("ios/Localizable.xcstrings").exists());
    }

    #[test]
    fn missing_out_dir_is_fatal_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = ShortcutConfig::from_yaml(CONFIG).unwrap();
        assert!(matches!(
            generate(&cfg, &opts(&dir)),
            Err(ShortcutError::TargetDirMissing(_))
        ));
        assert!(!dir.path().join("types").exists());
    }

    #[test]
    fn invalid_config_writes_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        let cfg = ShortcutConfig::from_yaml(
            "appGroupId: g\nshortcuts: [{ identifier: a, title: A, phrases: [a] }, { identifier: a, title: B, phrases: [b] }]",
        )
        .unwrap();
        assert!(generate(&cfg, &opts(&dir)).is_err());
        assert!(std::fs::read_dir(dir.path().join("ios")).unwrap().next().is_none());
    }
}
