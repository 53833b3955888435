//! Store-level steps of the handshake.
//!
//! States are implicit in the store: a `CommandNonce` present means a command
//! is pending, a `Response_<nonce>` present means a reply is waiting.

use std::collections::BTreeMap;
use std::time::Duration;

use shortcut_core::protocol::{
    param_key, param_type_key, response_key, COMMAND_NONCE_KEY, COMMAND_TIMESTAMP_KEY,
    PARAM_PREFIX, PARAM_TYPE_PREFIX, PENDING_COMMAND_KEY, USER_CONFIRMED_KEY,
};

use crate::store::SharedStore;
use crate::value::{ParamValue, StoreValue};
use crate::Result;

/// How often `take_pending` re-reads when the nonce moves under it.
const READ_ATTEMPTS: usize = 3;

/// A command as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub identifier: String,
    pub nonce: String,
    /// Seconds since the epoch. Diagnostic only.
    pub timestamp: Option<f64>,
    pub parameters: BTreeMap<String, ParamValue>,
    /// Present only when a confirmation dialog ran.
    pub user_confirmed: Option<bool>,
}

// ---------------------------------------------------------------------------
// Intent side
// ---------------------------------------------------------------------------

/// Write a command and return its fresh nonce.
///
/// Parameters go in first so a reader that sees the nonce also sees them.
/// Anything an unconsumed earlier command left behind is removed first.
pub fn publish_command(
    store: &dyn SharedStore,
    identifier: &str,
    parameters: &BTreeMap<String, ParamValue>,
    user_confirmed: bool,
) -> Result<String> {
    let nonce = uuid::Uuid::new_v4().to_string().to_uppercase();

    let stale: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|key| {
            key.strip_prefix(PARAM_TYPE_PREFIX)
                .or_else(|| key.strip_prefix(PARAM_PREFIX))
                .is_some_and(|name| !parameters.contains_key(name))
        })
        .collect();
    store.remove_many(&stale)?;

    for (name, value) in parameters {
        let (raw, tag) = value.to_store();
        store.set(&param_key(name), raw)?;
        match tag {
            Some(tag) => store.set(&param_type_key(name), StoreValue::from(tag))?,
            None => store.remove(&param_type_key(name))?,
        }
    }
    store.set(PENDING_COMMAND_KEY, StoreValue::from(identifier))?;
    store.set(COMMAND_NONCE_KEY, StoreValue::from(nonce.as_str()))?;
    store.set(COMMAND_TIMESTAMP_KEY, StoreValue::Number(now_secs()))?;
    if user_confirmed {
        store.set(USER_CONFIRMED_KEY, StoreValue::Bool(true))?;
    } else {
        store.remove(USER_CONFIRMED_KEY)?;
    }

    tracing::debug!(identifier, nonce = %nonce, params = parameters.len(), "command published");
    Ok(nonce)
}

/// Wait for the reply to `nonce`, deleting it on first sight.
///
/// `None` means the window closed first; a reply written later is orphaned.
pub async fn poll_response(
    store: &dyn SharedStore,
    nonce: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<String>> {
    let key = response_key(nonce);
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Some(reply) = store.get_text(&key)? {
            store.remove(&key)?;
            return Ok(Some(reply));
        }
        tokio::time::sleep(interval).await;
    }
    tracing::debug!(nonce, "no response before timeout");
    Ok(None)
}

// ---------------------------------------------------------------------------
// App side
// ---------------------------------------------------------------------------

/// Read the pending command, if any, without clearing it.
///
/// Every `Param_*` key is collected since the receiving side does not know
/// the parameter set. If the nonce changes mid-read the read starts over.
pub fn take_pending(store: &dyn SharedStore) -> Result<Option<PendingCommand>> {
    for _ in 0..READ_ATTEMPTS {
        let Some(nonce) = store.get_text(COMMAND_NONCE_KEY)? else {
            return Ok(None);
        };
        let Some(identifier) = store.get_text(PENDING_COMMAND_KEY)? else {
            return Ok(None);
        };
        let timestamp = store.get(COMMAND_TIMESTAMP_KEY)?.map(|v| v.as_f64());
        let user_confirmed = store.get(USER_CONFIRMED_KEY)?.map(|v| v.as_integer() != 0);

        let mut parameters = BTreeMap::new();
        for key in store.keys()? {
            let Some(name) = key.strip_prefix(PARAM_PREFIX) else {
                continue;
            };
            if let Some(value) = decode_parameter(store, name)? {
                parameters.insert(name.to_string(), value);
            }
        }

        if store.get_text(COMMAND_NONCE_KEY)?.as_deref() == Some(nonce.as_str()) {
            return Ok(Some(PendingCommand {
                identifier,
                nonce,
                timestamp,
                parameters,
                user_confirmed,
            }));
        }
        tracing::debug!(nonce = %nonce, "command replaced during read; retrying");
    }
    Ok(None)
}

/// Read `Param_<name>` together with its type tag.
pub fn decode_parameter(store: &dyn SharedStore, name: &str) -> Result<Option<ParamValue>> {
    let Some(raw) = store.get(&param_key(name))? else {
        return Ok(None);
    };
    let tag = store.get_text(&param_type_key(name))?;
    Ok(Some(ParamValue::decode(&raw, tag.as_deref())))
}

/// Clear the command only if `nonce` is still the one in the store.
///
/// Returns false when a newer command has replaced it (or none is pending),
/// in which case nothing is touched.
pub fn clear_command(store: &dyn SharedStore, nonce: &str) -> Result<bool> {
    if store.get_text(COMMAND_NONCE_KEY)?.as_deref() != Some(nonce) {
        return Ok(false);
    }
    let mut keys: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|k| k.starts_with(PARAM_PREFIX) || k.starts_with(PARAM_TYPE_PREFIX))
        .collect();
    keys.extend(
        [
            PENDING_COMMAND_KEY,
            COMMAND_NONCE_KEY,
            COMMAND_TIMESTAMP_KEY,
            USER_CONFIRMED_KEY,
        ]
        .map(String::from),
    );
    store.remove_many(&keys)?;
    Ok(true)
}

/// Publish the reply for `nonce`. The last write wins.
pub fn write_response(store: &dyn SharedStore, nonce: &str, message: &str) -> Result<()> {
    store.set(&response_key(nonce), StoreValue::from(message))
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
