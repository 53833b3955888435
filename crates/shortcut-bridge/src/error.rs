use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("shared store is unavailable: {0}")]
    StoreUnavailable(String),

    #[error("shared store error: {0}")]
    Store(String),

    #[error("signal error: {0}")]
    Signal(String),

    #[error("invocation cancelled by the user")]
    Cancelled,

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' is not a valid {expected}")]
    ParameterType { name: String, expected: String },

    #[error("unknown shortcut: {0}")]
    UnknownShortcut(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
