use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("duplicate shortcut identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("invalid shortcut identifier '{0}': must start with a letter or underscore and contain only letters, digits, '_' or '-'")]
    InvalidIdentifier(String),

    #[error("invalid parameter name '{name}' on shortcut '{shortcut}': must be a valid symbol name")]
    InvalidParameterName { shortcut: String, name: String },

    #[error("parameter name '{name}' on shortcut '{shortcut}' is reserved by the generated intent")]
    ReservedParameterName { shortcut: String, name: String },

    #[error("dialog {index} on shortcut '{shortcut}' has an empty stateKey")]
    EmptyStateKey { shortcut: String, index: usize },

    #[error("duplicate parameter '{name}' on shortcut '{shortcut}'")]
    DuplicateParameter { shortcut: String, name: String },

    #[error("shortcut '{0}' has no phrases")]
    EmptyPhrases(String),

    #[error("no app group: set 'appGroupId' in the config or pass a bundle identifier")]
    MissingAppGroup,

    #[error("target directory does not exist: {}", .0.display())]
    TargetDirMissing(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShortcutError>;
