use crate::error::{Result, ShortcutError};
use crate::template::to_symbol_case;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Date,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Date => "date",
        }
    }

    pub fn swift_type(&self) -> &'static str {
        match self {
            ParamType::String => "String",
            ParamType::Number => "Double",
            ParamType::Boolean => "Bool",
            ParamType::Date => "Date",
        }
    }

    pub fn typescript_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Date => "Date",
        }
    }

    /// Tag written next to the raw value when the stored shape alone is
    /// ambiguous. Strings and numbers describe themselves.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            ParamType::Boolean => Some("boolean"),
            ParamType::Date => Some("date"),
            ParamType::String | ParamType::Number => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ParameterSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default = "default_optional")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_optional() -> bool {
    true
}

// ---------------------------------------------------------------------------
// StateDialog
// ---------------------------------------------------------------------------

/// Value a dialog's app-state key is compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShowWhen {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    /// Any other shape: the dialog fires whenever the key exists.
    Other(serde_json::Value),
}

impl Default for ShowWhen {
    fn default() -> Self {
        ShowWhen::Other(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDialog {
    pub state_key: String,
    #[serde(default)]
    pub show_when: ShowWhen,
    pub message: String,
    #[serde(default = "default_requires_confirmation")]
    pub requires_confirmation: bool,
}

fn default_requires_confirmation() -> bool {
    true
}

// ---------------------------------------------------------------------------
// ShortcutDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutDefinition {
    pub identifier: String,
    pub title: String,
    pub phrases: Vec<String>,
    #[serde(default, alias = "icon", skip_serializing_if = "Option::is_none")]
    pub system_image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialogs: Vec<StateDialog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSpec>,
}

impl ShortcutDefinition {
    /// Swift type name of the generated intent.
    pub fn intent_type_name(&self) -> String {
        format!("{}Intent", to_symbol_case(&self.identifier))
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn requires_confirmation(&self) -> bool {
        self.dialogs.iter().any(|d| d.requires_confirmation)
    }
}

// ---------------------------------------------------------------------------
// ShortcutConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutConfig {
    pub shortcuts: Vec<ShortcutDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_group_id: Option<String>,
    #[serde(default)]
    pub localization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_identifier: Option<String>,
}

impl ShortcutConfig {
    /// Load a config file. `.json` files are read as JSON, everything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ShortcutError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&data)
        } else {
            Self::from_yaml(&data)
        }
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn shortcut(&self, identifier: &str) -> Option<&ShortcutDefinition> {
        self.shortcuts.iter().find(|s| s.identifier == identifier)
    }

    /// Resolve the shared app group: explicit override first, then
    /// `group.<bundle id>` from the config or the caller.
    pub fn resolve_app_group(&self, bundle_id: Option<&str>) -> Result<String> {
        if let Some(group) = self.app_group_id.as_deref().filter(|g| !g.trim().is_empty()) {
            return Ok(group.to_string());
        }
        self.bundle_identifier
            .as_deref()
            .or(bundle_id)
            .filter(|b| !b.trim().is_empty())
            .map(|b| format!("group.{b}"))
            .ok_or(ShortcutError::MissingAppGroup)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Fail on the first structural problem that would produce broken output.
    pub fn check(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every structural problem, in config order.
    pub fn problems(&self) -> Vec<ShortcutError> {
        let mut problems = Vec::new();
        let mut identifiers = HashSet::new();
        let mut type_names = HashSet::new();

        for shortcut in &self.shortcuts {
            let id = &shortcut.identifier;
            if !identifier_re().is_match(id) || !symbol_re().is_match(&to_symbol_case(id)) {
                problems.push(ShortcutError::InvalidIdentifier(id.clone()));
            } else if !identifiers.insert(id.as_str()) {
                problems.push(ShortcutError::DuplicateIdentifier(id.clone()));
            } else if !type_names.insert(shortcut.intent_type_name()) {
                // Distinct identifiers that collapse to the same Swift type.
                problems.push(ShortcutError::DuplicateIdentifier(id.clone()));
            }

            if shortcut.phrases.iter().all(|p| p.trim().is_empty()) {
                problems.push(ShortcutError::EmptyPhrases(id.clone()));
            }

            let mut names = HashSet::new();
            for param in &shortcut.parameters {
                if !symbol_re().is_match(&param.name) || SWIFT_KEYWORDS.contains(&param.name.as_str())
                {
                    problems.push(ShortcutError::InvalidParameterName {
                        shortcut: id.clone(),
                        name: param.name.clone(),
                    });
                } else if PERFORM_LOCALS.contains(&param.name.as_str()) {
                    problems.push(ShortcutError::ReservedParameterName {
                        shortcut: id.clone(),
                        name: param.name.clone(),
                    });
                } else if !names.insert(param.name.as_str()) {
                    problems.push(ShortcutError::DuplicateParameter {
                        shortcut: id.clone(),
                        name: param.name.clone(),
                    });
                }
            }

            for (index, dialog) in shortcut.dialogs.iter().enumerate() {
                if dialog.state_key.trim().is_empty() {
                    problems.push(ShortcutError::EmptyStateKey {
                        shortcut: id.clone(),
                        index,
                    });
                }
            }
        }
        problems
    }

    /// Structural problems as errors plus non-fatal observations.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings: Vec<ConfigWarning> = self
            .problems()
            .into_iter()
            .map(|e| ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            })
            .collect();

        if self.shortcuts.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no shortcuts configured; generated files will be empty".to_string(),
            });
        }

        for shortcut in &self.shortcuts {
            let id = &shortcut.identifier;
            if shortcut.title.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("shortcut '{id}' has an empty title"),
                });
            }
            for (i, dialog) in shortcut.dialogs.iter().enumerate() {
                if matches!(dialog.show_when, ShowWhen::Other(_)) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "dialog {i} on shortcut '{id}' has no boolean, number, or string showWhen; it will fire whenever '{}' is set",
                            dialog.state_key
                        ),
                    });
                }
            }
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Symbol validation
// ---------------------------------------------------------------------------

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
static SYMBOL_RE: OnceLock<Regex> = OnceLock::new();

fn identifier_re() -> &'static Regex {
    IDENTIFIER_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").unwrap())
}

fn symbol_re() -> &'static Regex {
    SYMBOL_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Names that cannot be used as Swift property names without backticks.
const SWIFT_KEYWORDS: &[&str] = &[
    "as", "break", "case", "catch", "class", "continue", "default", "defer", "do", "else",
    "enum", "extension", "fallthrough", "false", "for", "func", "guard", "if", "import", "in",
    "init", "inout", "internal", "is", "let", "nil", "operator", "private", "protocol", "public",
    "repeat", "return", "self", "Self", "static", "struct", "subscript", "super", "switch",
    "throw", "throws", "true", "try", "typealias", "var", "where", "while",
];

/// Locals declared by the generated `perform()`; a parameter property with
/// one of these names would be shadowed.
const PERFORM_LOCALS: &[&str] = &["defaults", "nonce", "userConfirmed", "deadline", "responseKey"];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
localization: true
appGroupId: group.com.example.todo
shortcuts:
  - identifier: addTodo
    title: Add Todo
    phrases: ["Add a todo"]
    icon: checklist
    parameters:
      - name: text
        title: Todo Text
        type: string
        optional: false
      - name: due
        title: Due Date
        type: date
  - identifier: startTimer
    title: Start Timer
    phrases: ["Start timer"]
    dialogs:
      - stateKey: running
        showWhen: true
        message: Timer running
        requiresConfirmation: false
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = ShortcutConfig::from_yaml(SAMPLE).unwrap();
        assert!(cfg.localization);
        assert_eq!(cfg.shortcuts.len(), 2);

        let add = &cfg.shortcuts[0];
        assert_eq!(add.system_image_name.as_deref(), Some("checklist"));
        assert!(!add.parameters[0].optional);
        assert!(add.parameters[1].optional);
        assert_eq!(add.parameters[1].param_type, ParamType::Date);

        let timer = &cfg.shortcuts[1];
        assert_eq!(timer.dialogs[0].show_when, ShowWhen::Bool(true));
        assert!(!timer.dialogs[0].requires_confirmation);
        assert_eq!(timer.intent_type_name(), "StartTimerIntent");
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn localization_defaults_off() {
        let cfg = ShortcutConfig::from_yaml("shortcuts: []").unwrap();
        assert!(!cfg.localization);
        assert!(cfg.app_group_id.is_none());
    }

    #[test]
    fn missing_shortcuts_is_parse_error() {
        assert!(ShortcutConfig::from_yaml("localization: true").is_err());
    }

    #[test]
    fn show_when_variants() {
        let yaml = r#"
shortcuts:
  - identifier: a
    title: A
    phrases: [a]
    dialogs:
      - { stateKey: s, showWhen: 3, message: m }
      - { stateKey: s, showWhen: "on", message: m }
      - { stateKey: s, showWhen: [1], message: m }
      - { stateKey: s, message: m }
"#;
        let cfg = ShortcutConfig::from_yaml(yaml).unwrap();
        let d = &cfg.shortcuts[0].dialogs;
        assert!(matches!(d[0].show_when, ShowWhen::Number(_)));
        assert_eq!(d[1].show_when, ShowWhen::Text("on".into()));
        assert!(matches!(d[2].show_when, ShowWhen::Other(_)));
        assert_eq!(d[3].show_when, ShowWhen::Other(serde_json::Value::Null));
        assert!(d[0].requires_confirmation);
    }

    #[test]
    fn rejects_duplicate_identifiers() {
        let yaml = r#"
shortcuts:
  - { identifier: go, title: Go, phrases: [go] }
  - { identifier: go, title: Go again, phrases: [go again] }
"#;
        let cfg = ShortcutConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            cfg.check(),
            Err(ShortcutError::DuplicateIdentifier(id)) if id == "go"
        ));
    }

    #[test]
    fn rejects_identifiers_colliding_after_casing() {
        let yaml = r#"
shortcuts:
  - { identifier: start-timer, title: A, phrases: [a] }
  - { identifier: startTimer, title: B, phrases: [b] }
"#;
        let cfg = ShortcutConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            cfg.check(),
            Err(ShortcutError::DuplicateIdentifier(id)) if id == "startTimer"
        ));
    }

    #[test]
    fn rejects_bad_symbols() {
        let yaml = r#"
shortcuts:
  - identifier: "9lives"
    title: A
    phrases: [a]
  - identifier: ok
    title: B
    phrases: [b]
    parameters:
      - { name: "bad name", title: X, type: string }
      - { name: default, title: Y, type: number }
"#;
        let cfg = ShortcutConfig::from_yaml(yaml).unwrap();
        let problems = cfg.problems();
        assert_eq!(problems.len(), 3);
        assert!(matches!(&problems[0], ShortcutError::InvalidIdentifier(id) if id == "9lives"));
        assert!(matches!(&problems[2], ShortcutError::InvalidParameterName { name, .. } if name == "default"));
    }

    #[test]
    fn rejects_names_of_generated_locals() {
        let cfg = ShortcutConfig::from_yaml(
            r#"
shortcuts:
  - identifier: a
    title: A
    phrases: [a]
    parameters:
      - { name: nonce, title: Nonce, type: string }
      - { name: defaults, title: Defaults, type: string }
      - { name: noncence, title: Fine, type: string }
"#,
        )
        .unwrap();
        let problems = cfg.problems();
        assert_eq!(problems.len(), 2);
        assert!(matches!(
            &problems[0],
            ShortcutError::ReservedParameterName { name, .. } if name == "nonce"
        ));
        assert!(matches!(cfg.check(), Err(ShortcutError::ReservedParameterName { .. })));
    }

    #[test]
    fn empty_state_key_fails_check() {
        let cfg = ShortcutConfig::from_yaml(
            "shortcuts: [{ identifier: a, title: A, phrases: [a], dialogs: [{ stateKey: \" \", message: m }] }]",
        )
        .unwrap();
        assert!(matches!(
            cfg.check(),
            Err(ShortcutError::EmptyStateKey { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_empty_phrases() {
        let cfg = ShortcutConfig::from_yaml(
            "shortcuts: [{ identifier: a, title: A, phrases: [] }]",
        )
        .unwrap();
        assert!(matches!(cfg.check(), Err(ShortcutError::EmptyPhrases(_))));
    }

    #[test]
    fn validate_reports_errors_and_warnings() {
        let yaml = r#"
shortcuts:
  - identifier: a
    title: ""
    phrases: [a]
    dialogs:
      - { stateKey: "", message: m }
"#;
        let cfg = ShortcutConfig::from_yaml(yaml).unwrap();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("empty stateKey")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("empty title")));
    }

    #[test]
    fn resolve_app_group_prefers_override() {
        let mut cfg = ShortcutConfig::from_yaml("shortcuts: []").unwrap();
        assert!(matches!(
            cfg.resolve_app_group(None),
            Err(ShortcutError::MissingAppGroup)
        ));
        assert_eq!(
            cfg.resolve_app_group(Some("com.example.app")).unwrap(),
            "group.com.example.app"
        );
        cfg.app_group_id = Some("group.custom".into());
        assert_eq!(
            cfg.resolve_app_group(Some("com.example.app")).unwrap(),
            "group.custom"
        );
    }

    #[test]
    fn load_reads_json_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("shortcuts.yaml");
        assert!(matches!(
            ShortcutConfig::load(&missing),
            Err(ShortcutError::ConfigNotFound(_))
        ));

        let path = dir.path().join("shortcuts.json");
        std::fs::write(
            &path,
            r#"{"shortcuts":[{"identifier":"ping","title":"Ping","phrases":["Ping"]}],"localization":true}"#,
        )
        .unwrap();
        let cfg = ShortcutConfig::load(&path).unwrap();
        assert_eq!(cfg.shortcuts[0].identifier, "ping");
        assert!(cfg.localization);
    }
}
