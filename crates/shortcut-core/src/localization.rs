//! Localization catalog and phrase table merging.
//!
//! Generation never discards translator work: catalog keys are only added
//! or have their source-language value refreshed, and phrase lines already on
//! disk are kept verbatim.

use crate::config::ShortcutConfig;
use crate::error::Result;
use crate::protocol::{APP_GROUP_ERROR_KEY, APP_GROUP_ERROR_REPLY, DEFAULT_REPLY, DEFAULT_REPLY_KEY};
use crate::template::{default_prompt, escape_for_embedded_literal, normalize_phrase};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

pub const DEFAULT_SOURCE_LANGUAGE: &str = "en";
pub const DEFAULT_CATALOG_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// String keys
// ---------------------------------------------------------------------------

pub fn title_key(identifier: &str) -> String {
    format!("{identifier}.title")
}

pub fn description_key(identifier: &str) -> String {
    format!("{identifier}.description")
}

pub fn param_title_key(identifier: &str, name: &str) -> String {
    format!("{identifier}.param.{name}.title")
}

pub fn param_prompt_key(identifier: &str, name: &str) -> String {
    format!("{identifier}.param.{name}.prompt")
}

pub fn dialog_key(identifier: &str, index: usize) -> String {
    format!("{identifier}.dialog.{index}")
}

/// Every localizable string the generated source looks up, with its
/// source-language text.
pub fn derive_localized_strings(config: &ShortcutConfig) -> BTreeMap<String, String> {
    let mut strings = BTreeMap::new();
    strings.insert(DEFAULT_REPLY_KEY.to_string(), DEFAULT_REPLY.to_string());
    strings.insert(
        APP_GROUP_ERROR_KEY.to_string(),
        APP_GROUP_ERROR_REPLY.to_string(),
    );

    for shortcut in &config.shortcuts {
        let id = &shortcut.identifier;
        strings.insert(title_key(id), shortcut.title.clone());
        if let Some(desc) = &shortcut.description {
            strings.insert(description_key(id), desc.clone());
        }
        for param in &shortcut.parameters {
            strings.insert(param_title_key(id, &param.name), param.title.clone());
            strings.insert(
                param_prompt_key(id, &param.name),
                default_prompt(&param.title),
            );
        }
        for (i, dialog) in shortcut.dialogs.iter().enumerate() {
            strings.insert(dialog_key(id, i), dialog.message.clone());
        }
    }
    strings
}

/// Normalized trigger phrases in config order.
pub fn derive_phrases(config: &ShortcutConfig) -> Vec<String> {
    config
        .shortcuts
        .iter()
        .flat_map(|s| s.phrases.iter())
        .filter(|p| !p.trim().is_empty())
        .map(|p| normalize_phrase(p))
        .collect()
}

// ---------------------------------------------------------------------------
// LocalizationCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationCatalog {
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default)]
    pub strings: BTreeMap<String, CatalogEntry>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Fields this tool does not interpret, written back unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Language tag → localization payload (`stringUnit`, `variations`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub localizations: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_source_language() -> String {
    DEFAULT_SOURCE_LANGUAGE.to_string()
}

fn default_version() -> String {
    DEFAULT_CATALOG_VERSION.to_string()
}

impl Default for LocalizationCatalog {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            strings: BTreeMap::new(),
            version: default_version(),
            extra: BTreeMap::new(),
        }
    }
}

impl LocalizationCatalog {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn to_text(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// `stringUnit.value` for `key` in `lang`, if it has one.
    pub fn value(&self, key: &str, lang: &str) -> Option<&str> {
        self.strings
            .get(key)?
            .localizations
            .get(lang)?
            .get("stringUnit")?
            .get("value")?
            .as_str()
    }

    /// Set the source-language text for `key`. Other languages are untouched.
    /// Returns `true` when the key was new.
    pub fn set_source_value(&mut self, key: &str, value: &str) -> bool {
        let unit = json!({ "state": "translated", "value": value });
        let lang = self.source_language.clone();
        let is_new = !self.strings.contains_key(key);
        let entry = self.strings.entry(key.to_string()).or_default();
        match entry.localizations.get_mut(&lang) {
            Some(Value::Object(existing)) => {
                existing.insert("stringUnit".to_string(), unit);
            }
            _ => {
                entry
                    .localizations
                    .insert(lang, json!({ "stringUnit": unit }));
            }
        }
        is_new
    }
}

#[derive(Debug, Clone)]
pub struct CatalogMerge {
    pub text: String,
    pub added: usize,
    pub updated: usize,
    /// The existing catalog could not be parsed and was replaced by a fresh one.
    pub recovered: bool,
}

/// Merge freshly derived source-language strings into an existing catalog.
///
/// An absent or unparsable catalog starts fresh; the caller decides whether
/// to warn (see [`CatalogMerge::recovered`]).
pub fn merge_catalog(
    new_defaults: &BTreeMap<String, String>,
    existing: Option<&str>,
) -> Result<CatalogMerge> {
    let parsed = existing.map(LocalizationCatalog::parse);
    let recovered = matches!(parsed, Some(None));
    let mut catalog = parsed.flatten().unwrap_or_default();

    let mut added = 0;
    let mut updated = 0;
    for (key, value) in new_defaults {
        if catalog.set_source_value(key, value) {
            added += 1;
        } else {
            updated += 1;
        }
    }

    Ok(CatalogMerge {
        text: catalog.to_text()?,
        added,
        updated,
        recovered,
    })
}

// ---------------------------------------------------------------------------
// Phrase table
// ---------------------------------------------------------------------------

static PHRASE_LINE_RE: OnceLock<Regex> = OnceLock::new();

fn phrase_line_re() -> &'static Regex {
    PHRASE_LINE_RE.get_or_init(|| {
        Regex::new(r#"^\s*"((?:[^"\\]|\\.)*)"\s*=\s*"((?:[^"\\]|\\.)*)"\s*;\s*$"#).unwrap()
    })
}

#[derive(Debug, Clone)]
pub struct PhraseMerge {
    pub text: String,
    pub retained: usize,
    pub added: usize,
    /// Non-blank lines that did not match `"key" = "value";`.
    pub dropped_lines: usize,
}

/// Merge phrases into an existing `.strings` phrase table.
///
/// Existing well-formed lines are kept verbatim and first; unseen phrases are
/// appended as identity translations in input order. Keys are compared as
/// the escaped literal text between the first pair of quotes.
pub fn merge_phrase_table(new_phrases: &[String], existing: Option<&str>) -> PhraseMerge {
    let mut lines: Vec<String> = Vec::new();
    let mut keys: HashSet<String> = HashSet::new();
    let mut dropped_lines = 0;

    for line in existing.unwrap_or("").lines() {
        match phrase_line_re().captures(line) {
            Some(caps) => {
                keys.insert(caps[1].to_string());
                lines.push(line.to_string());
            }
            None if line.trim().is_empty() => {}
            None => dropped_lines += 1,
        }
    }
    let retained = lines.len();

    for phrase in new_phrases {
        let key = escape_for_embedded_literal(phrase);
        if keys.insert(key.clone()) {
            lines.push(format!("\"{key}\" = \"{key}\";"));
        }
    }

    PhraseMerge {
        added: lines.len() - retained,
        text: lines.join("\n"),
        retained,
        dropped_lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(text: &str) -> LocalizationCatalog {
        LocalizationCatalog::parse(text).unwrap()
    }

    #[test]
    fn fresh_catalog_from_nothing() {
        let merged = merge_catalog(&defaults(&[("k", "Hello")]), None).unwrap();
        let cat = parse(&merged.text);
        assert_eq!(cat.source_language, "en");
        assert_eq!(cat.version, "1.0");
        assert_eq!(cat.value("k", "en"), Some("Hello"));
        assert_eq!(merged.added, 1);
        assert!(!merged.recovered);
    }

    #[test]
    fn merge_is_idempotent() {
        let d = defaults(&[("a", "A"), ("b", "B")]);
        let once = merge_catalog(&d, None).unwrap().text;
        let twice = merge_catalog(&d, Some(&once)).unwrap().text;
        let thrice = merge_catalog(&d, Some(&twice)).unwrap().text;
        assert_eq!(once, twice);
        assert_eq!(twice, thrice);
    }

    #[test]
    fn preserves_other_languages() {
        let existing = r#"{
  "sourceLanguage": "en",
  "strings": {
    "k": {
      "localizations": {
        "en": { "stringUnit": { "state": "translated", "value": "Old" } },
        "es": { "stringUnit": { "state": "translated", "value": "Vieja" } }
      }
    }
  },
  "version": "1.0"
}"#;
        let merged = merge_catalog(&defaults(&[("k", "New")]), Some(existing)).unwrap();
        let cat = parse(&merged.text);
        assert_eq!(cat.value("k", "en"), Some("New"));
        assert_eq!(cat.value("k", "es"), Some("Vieja"));
        assert_eq!(merged.updated, 1);
    }

    #[test]
    fn never_drops_keys() {
        let existing = merge_catalog(&defaults(&[("old.key", "Old")]), None)
            .unwrap()
            .text;
        let merged = merge_catalog(&BTreeMap::new(), Some(&existing)).unwrap();
        assert_eq!(parse(&merged.text).value("old.key", "en"), Some("Old"));
        assert_eq!(merged.text, existing);
    }

    #[test]
    fn unknown_fields_round_trip() {
        let existing = r#"{
  "sourceLanguage": "en",
  "strings": {
    "k": {
      "comment": "shown in the Shortcuts app",
      "extractionState": "manual",
      "localizations": {
        "en": { "stringUnit": { "state": "new", "value": "x" } },
        "de": { "variations": { "plural": {} } }
      }
    }
  },
  "version": "1.0",
  "generator": "xcode"
}"#;
        let merged = merge_catalog(&defaults(&[("k", "y")]), Some(existing)).unwrap();
        let cat = parse(&merged.text);
        let entry = &cat.strings["k"];
        assert_eq!(entry.extra["comment"], "shown in the Shortcuts app");
        assert_eq!(entry.localizations["de"], json!({ "variations": { "plural": {} } }));
        assert_eq!(cat.extra["generator"], "xcode");
        assert_eq!(
            entry.localizations["en"]["stringUnit"]["state"],
            "translated"
        );
    }

    #[test]
    fn corrupt_catalog_starts_fresh() {
        let merged = merge_catalog(&defaults(&[("k", "v")]), Some("{ not json")).unwrap();
        assert!(merged.recovered);
        assert_eq!(parse(&merged.text).value("k", "en"), Some("v"));
    }

    #[test]
    fn honours_catalog_source_language() {
        let existing = r#"{"sourceLanguage":"fr","strings":{},"version":"1.0"}"#;
        let merged = merge_catalog(&defaults(&[("k", "Bonjour")]), Some(existing)).unwrap();
        let cat = parse(&merged.text);
        assert_eq!(cat.value("k", "fr"), Some("Bonjour"));
        assert_eq!(cat.value("k", "en"), None);
    }

    #[test]
    fn phrase_dedup_by_key() {
        let merged = merge_phrase_table(&["A".into(), "A".into()], None);
        assert_eq!(merged.text, r#""A" = "A";"#);
        assert_eq!(merged.added, 1);
    }

    #[test]
    fn phrase_keeps_custom_translations_and_appends() {
        let existing = "\"Start timer\" = \"Iniciar temporizador\";\ngarbage line\n\n\"Say \\\"hi\\\"\" = \"Di \\\"hola\\\"\";";
        let merged = merge_phrase_table(
            &[
                "Start timer".into(),
                "Say \"hi\"".into(),
                "Stop timer".into(),
            ],
            Some(existing),
        );
        assert_eq!(
            merged.text,
            "\"Start timer\" = \"Iniciar temporizador\";\n\"Say \\\"hi\\\"\" = \"Di \\\"hola\\\"\";\n\"Stop timer\" = \"Stop timer\";"
        );
        assert_eq!(merged.retained, 2);
        assert_eq!(merged.added, 1);
        assert_eq!(merged.dropped_lines, 1);
    }

    #[test]
    fn derived_strings_cover_config() {
        let cfg = ShortcutConfig::from_yaml(
            r#"
shortcuts:
  - identifier: addTodo
    title: Add Todo
    description: Adds a todo
    phrases: ["Add todo"]
    parameters:
      - { name: text, title: Todo Text, type: string }
    dialogs:
      - { stateKey: full, showWhen: true, message: "List is full (${count})" }
"#,
        )
        .unwrap();
        let strings = derive_localized_strings(&cfg);
        assert_eq!(strings["addTodo.title"], "Add Todo");
        assert_eq!(strings["addTodo.description"], "Adds a todo");
        assert_eq!(strings["addTodo.param.text.title"], "Todo Text");
        assert_eq!(strings["addTodo.param.text.prompt"], "What todo text?");
        assert_eq!(strings["addTodo.dialog.0"], "List is full (${count})");
        assert_eq!(strings[DEFAULT_REPLY_KEY], "Done");
        assert_eq!(
            derive_phrases(&cfg),
            vec!["Add todo in ${applicationName}".to_string()]
        );
    }
}
