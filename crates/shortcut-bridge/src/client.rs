//! Intent-side actor: the same steps the generated intent performs, for
//! hosts that run shortcuts from Rust (tests, the CLI, headless runners).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shortcut_core::config::{ParameterSpec, ShortcutDefinition, ShowWhen, StateDialog};
use shortcut_core::protocol::{
    app_state_key, poll_interval, response_timeout, APP_GROUP_ERROR_REPLY, DEFAULT_REPLY,
};
use shortcut_core::template::{default_prompt, extract_placeholders};

use crate::error::BridgeError;
use crate::protocol;
use crate::signal::Signal;
use crate::store::SharedStore;
use crate::value::ParamValue;
use crate::Result;

// ---------------------------------------------------------------------------
// IntentClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IntentClient {
    store: Arc<dyn SharedStore>,
    signal: Arc<dyn Signal>,
    timeout: Duration,
    interval: Duration,
}

impl IntentClient {
    pub fn new(store: Arc<dyn SharedStore>, signal: Arc<dyn Signal>) -> Self {
        Self {
            store,
            signal,
            timeout: response_timeout(),
            interval: poll_interval(),
        }
    }

    pub fn with_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.timeout = timeout;
        self.interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// Write the command and raise the signal. Returns the nonce.
    ///
    /// A failed post is logged and ignored: the app re-scans on its own
    /// wake-ups anyway.
    pub fn publish(
        &self,
        identifier: &str,
        parameters: &BTreeMap<String, ParamValue>,
        user_confirmed: bool,
    ) -> Result<String> {
        let nonce =
            protocol::publish_command(self.store.as_ref(), identifier, parameters, user_confirmed)?;
        if let Err(e) = self.signal.post() {
            tracing::warn!(error = %e, "signal post failed");
        }
        Ok(nonce)
    }

    pub async fn await_response(&self, nonce: &str) -> Result<Option<String>> {
        protocol::poll_response(self.store.as_ref(), nonce, self.timeout, self.interval).await
    }

    /// Publish, signal, and wait. An empty reply or a timeout yields the
    /// default reply.
    pub async fn invoke(
        &self,
        identifier: &str,
        parameters: &BTreeMap<String, ParamValue>,
        user_confirmed: bool,
    ) -> Result<String> {
        let nonce = self.publish(identifier, parameters, user_confirmed)?;
        tracing::info!(identifier, nonce = %nonce, "waiting for response");
        Ok(match self.await_response(&nonce).await? {
            Some(reply) if !reply.is_empty() => reply,
            Some(_) => DEFAULT_REPLY.to_string(),
            None => {
                tracing::info!(identifier, nonce = %nonce, "no response; using default reply");
                DEFAULT_REPLY.to_string()
            }
        })
    }
}

// ---------------------------------------------------------------------------
// IntentRunner
// ---------------------------------------------------------------------------

/// The user-facing side of an intent run: value prompts and confirmations.
#[async_trait]
pub trait IntentHost: Send + Sync {
    /// Ask for a parameter the caller did not supply. `None` means no answer.
    async fn request_value(&self, param: &ParameterSpec, prompt: &str) -> Result<Option<ParamValue>>;

    /// `false` aborts the run.
    async fn request_confirmation(&self, message: &str) -> Result<bool>;
}

/// Runs a shortcut definition end to end against the shared store.
pub struct IntentRunner {
    client: IntentClient,
    host: Arc<dyn IntentHost>,
}

impl IntentRunner {
    pub fn new(client: IntentClient, host: Arc<dyn IntentHost>) -> Self {
        Self { client, host }
    }

    /// Returns the dialog text the intent would show.
    ///
    /// A refused confirmation is [`BridgeError::Cancelled`] and nothing is
    /// published.
    pub async fn run(
        &self,
        shortcut: &ShortcutDefinition,
        mut provided: BTreeMap<String, ParamValue>,
    ) -> Result<String> {
        let store = self.client.store();
        if let Err(e) = store.check() {
            tracing::warn!(identifier = %shortcut.identifier, error = %e, "shared store unavailable");
            return Ok(APP_GROUP_ERROR_REPLY.to_string());
        }

        let mut parameters = BTreeMap::new();
        for spec in &shortcut.parameters {
            let value = match provided.remove(&spec.name) {
                Some(value) => Some(value),
                None => {
                    self.host
                        .request_value(spec, &default_prompt(&spec.title))
                        .await?
                }
            };
            match value {
                Some(value) => {
                    parameters.insert(spec.name.clone(), value.coerce(&spec.name, spec.param_type)?);
                }
                None if !spec.optional => {
                    return Err(BridgeError::MissingParameter(spec.name.clone()));
                }
                None => {}
            }
        }

        let mut user_confirmed = false;
        for dialog in &shortcut.dialogs {
            if !condition_holds(store.as_ref(), dialog)? {
                continue;
            }
            let message = interpolate(store.as_ref(), &dialog.message)?;
            if !dialog.requires_confirmation {
                return Ok(message);
            }
            if !self.host.request_confirmation(&message).await? {
                tracing::info!(identifier = %shortcut.identifier, "confirmation declined");
                return Err(BridgeError::Cancelled);
            }
            user_confirmed = true;
        }

        self.client
            .invoke(&shortcut.identifier, &parameters, user_confirmed)
            .await
    }
}

/// Same comparison the generated guard makes.
fn condition_holds(store: &dyn SharedStore, dialog: &StateDialog) -> Result<bool> {
    let value = store.get(&app_state_key(&dialog.state_key))?;
    Ok(match &dialog.show_when {
        ShowWhen::Bool(b) => value.map_or(0, |v| v.as_integer()) == i64::from(*b),
        ShowWhen::Number(n) => value.map_or(0.0, |v| v.as_f64()) == n.as_f64().unwrap_or(f64::NAN),
        ShowWhen::Text(s) => value.map(|v| v.as_text()).as_deref() == Some(s.as_str()),
        ShowWhen::Other(_) => value.is_some(),
    })
}

/// Substitute `${name}` from app state; unknown names stay as written.
fn interpolate(store: &dyn SharedStore, template: &str) -> Result<String> {
    let mut message = template.to_string();
    for name in extract_placeholders(template) {
        if let Some(value) = store.get_text(&app_state_key(&name))? {
            message = message.replace(&format!("${{{name}}}"), &value);
        }
    }
    Ok(message)
}
