//! Shared-namespace contract between generated intents and the app bridge.
//!
//! Both sides of the handshake key off these names, so the generator and
//! `shortcut-bridge` must read them from here rather than repeating literals.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub const PENDING_COMMAND_KEY: &str = "PendingCommand";
pub const COMMAND_NONCE_KEY: &str = "CommandNonce";
pub const COMMAND_TIMESTAMP_KEY: &str = "CommandTimestamp";
pub const USER_CONFIRMED_KEY: &str = "UserConfirmed";

pub const PARAM_PREFIX: &str = "Param_";
pub const PARAM_TYPE_PREFIX: &str = "ParamType_";
pub const RESPONSE_PREFIX: &str = "Response_";
pub const APP_STATE_PREFIX: &str = "appState_";

pub fn param_key(name: &str) -> String {
    format!("{PARAM_PREFIX}{name}")
}

pub fn param_type_key(name: &str) -> String {
    format!("{PARAM_TYPE_PREFIX}{name}")
}

pub fn response_key(nonce: &str) -> String {
    format!("{RESPONSE_PREFIX}{nonce}")
}

pub fn app_state_key(key: &str) -> String {
    format!("{APP_STATE_PREFIX}{key}")
}

// ---------------------------------------------------------------------------
// Signal and timing
// ---------------------------------------------------------------------------

/// Payload-less broadcast raised after a command is published.
pub const COMMAND_SIGNAL_NAME: &str = "com.shortcutbridge.command";

pub const RESPONSE_TIMEOUT_SECS: f64 = 5.0;
pub const POLL_INTERVAL_MS: u64 = 100;

pub fn response_timeout() -> Duration {
    Duration::from_secs_f64(RESPONSE_TIMEOUT_SECS)
}

pub fn poll_interval() -> Duration {
    Duration::from_millis(POLL_INTERVAL_MS)
}

// ---------------------------------------------------------------------------
// Fallback replies
// ---------------------------------------------------------------------------

pub const DEFAULT_REPLY: &str = "Done";
pub const DEFAULT_REPLY_KEY: &str = "shortcuts.done";

pub const APP_GROUP_ERROR_REPLY: &str = "Unable to reach the app.";
pub const APP_GROUP_ERROR_KEY: &str = "shortcuts.error.app_group";
