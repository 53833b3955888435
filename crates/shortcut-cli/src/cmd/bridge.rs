use crate::cmd::load_config;
use crate::output::{print_json, print_json_line, print_table};
use anyhow::Context;
use async_trait::async_trait;
use clap::Subcommand;
use shortcut_bridge::protocol::{take_pending, PendingCommand};
use shortcut_bridge::{
    Bridge, BridgeError, FileSignal, FnListener, IntentClient, IntentHost, IntentRunner,
    Invocation, ParamValue, RedbStore, Responder, SharedStore,
};
use shortcut_core::config::{ParameterSpec, ShortcutDefinition};
use shortcut_core::paths;
use shortcut_core::protocol::{
    poll_interval, APP_STATE_PREFIX, RESPONSE_PREFIX, RESPONSE_TIMEOUT_SECS,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum BridgeSubcommand {
    /// Show the pending command, app state, and unread responses
    Status,

    /// Set an app-state value (JSON; anything unparsable is stored as text)
    SetState { key: String, value: String },

    /// Remove app-state keys (every key when none are given)
    ClearState { keys: Vec<String> },

    /// Run a shortcut the way its generated intent would
    Invoke {
        identifier: String,

        /// Parameter value, repeatable
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Accept confirmation dialogs instead of declining them
        #[arg(long)]
        confirmed: bool,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds to wait for the app's reply
        #[arg(long, default_value_t = RESPONSE_TIMEOUT_SECS)]
        timeout: f64,
    },

    /// Serve invocations: print each one and reply
    Listen {
        /// Reply text (empty lets the intent use its default)
        #[arg(long, default_value = "")]
        reply: String,

        /// Exit after the first invocation
        #[arg(long)]
        once: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    store_dir: Option<PathBuf>,
    subcmd: BridgeSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let dir = store_dir.unwrap_or_else(|| paths::default_store_dir(root));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create store directory {}", dir.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match subcmd {
            BridgeSubcommand::Status => status(&dir, json),
            BridgeSubcommand::SetState { key, value } => set_state(&dir, &key, &value),
            BridgeSubcommand::ClearState { keys } => clear_state(&dir, keys),
            BridgeSubcommand::Invoke {
                identifier,
                params,
                confirmed,
                config,
                timeout,
            } => {
                let (_, config) = load_config(root, config.as_deref())?;
                let shortcut = config
                    .shortcut(&identifier)
                    .with_context(|| format!("unknown shortcut '{identifier}'"))?;
                invoke(&dir, shortcut, &params, confirmed, timeout, json).await
            }
            BridgeSubcommand::Listen { reply, once } => listen(&dir, reply, once, json).await,
        }
    })
}

fn open(dir: &Path) -> (Arc<dyn SharedStore>, Arc<FileSignal>) {
    (Arc::new(RedbStore::new(dir)), Arc::new(FileSignal::new(dir)))
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn status(dir: &Path, json: bool) -> anyhow::Result<()> {
    let store = RedbStore::new(dir);
    let pending = take_pending(&store)?;

    let mut state = BTreeMap::new();
    let mut responses = BTreeMap::new();
    for key in store.keys()? {
        if let Some(name) = key.strip_prefix(APP_STATE_PREFIX) {
            if let Some(value) = store.get(&key)? {
                state.insert(name.to_string(), value);
            }
        } else if let Some(nonce) = key.strip_prefix(RESPONSE_PREFIX) {
            if let Some(value) = store.get_text(&key)? {
                responses.insert(nonce.to_string(), value);
            }
        }
    }

    if json {
        return print_json(&serde_json::json!({
            "store": store.path().display().to_string(),
            "pending": pending.as_ref().map(pending_json),
            "state": state,
            "responses": responses,
        }));
    }

    match &pending {
        Some(cmd) => {
            println!("Pending: {} (nonce {})", cmd.identifier, cmd.nonce);
            for (name, value) in &cmd.parameters {
                println!("  {name} = {value}");
            }
        }
        None => println!("Pending: none"),
    }
    println!();
    if state.is_empty() {
        println!("No app state.");
    } else {
        let rows: Vec<Vec<String>> = state
            .iter()
            .map(|(k, v)| vec![k.clone(), v.as_text()])
            .collect();
        print_table(&["KEY", "VALUE"], &rows);
    }
    if !responses.is_empty() {
        println!();
        let rows: Vec<Vec<String>> = responses
            .iter()
            .map(|(nonce, reply)| vec![nonce.clone(), reply.clone()])
            .collect();
        print_table(&["UNREAD RESPONSE", "REPLY"], &rows);
    }
    Ok(())
}

fn pending_json(cmd: &PendingCommand) -> serde_json::Value {
    serde_json::json!({
        "identifier": cmd.identifier,
        "nonce": cmd.nonce,
        "timestamp": cmd.timestamp,
        "parameters": cmd.parameters,
        "userConfirmed": cmd.user_confirmed,
    })
}

// ---------------------------------------------------------------------------
// set-state / clear-state
// ---------------------------------------------------------------------------

fn set_state(dir: &Path, key: &str, raw: &str) -> anyhow::Result<()> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.into()));
    let (store, signal) = open(dir);
    let bridge = Bridge::new(store, signal);
    bridge.update_state(key, &value)?;
    println!("{APP_STATE_PREFIX}{key} = {value}");
    Ok(())
}

fn clear_state(dir: &Path, keys: Vec<String>) -> anyhow::Result<()> {
    let (store, signal) = open(dir);
    let keys = if keys.is_empty() {
        store
            .keys()?
            .iter()
            .filter_map(|k| k.strip_prefix(APP_STATE_PREFIX).map(str::to_string))
            .collect()
    } else {
        keys
    };
    let bridge = Bridge::new(store, signal);
    bridge.clear_state(&keys)?;
    println!("Cleared {} key(s).", keys.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// invoke
// ---------------------------------------------------------------------------

/// Non-interactive host: never supplies missing values, and answers every
/// confirmation with the `--confirmed` flag.
struct CliHost {
    confirmed: bool,
}

#[async_trait]
impl IntentHost for CliHost {
    async fn request_value(
        &self,
        param: &ParameterSpec,
        prompt: &str,
    ) -> shortcut_bridge::Result<Option<ParamValue>> {
        tracing::debug!(param = %param.name, prompt, "no value supplied");
        Ok(None)
    }

    async fn request_confirmation(&self, message: &str) -> shortcut_bridge::Result<bool> {
        eprintln!("confirm: {message} [{}]", if self.confirmed { "yes" } else { "no" });
        Ok(self.confirmed)
    }
}

fn parse_params(
    shortcut: &ShortcutDefinition,
    raw: &[String],
) -> anyhow::Result<BTreeMap<String, ParamValue>> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got '{entry}'"))?;
        let spec = shortcut.parameter(name).with_context(|| {
            format!("'{}' has no parameter named '{name}'", shortcut.identifier)
        })?;
        params.insert(
            name.to_string(),
            ParamValue::parse_as(name, value, spec.param_type)?,
        );
    }
    Ok(params)
}

async fn invoke(
    dir: &Path,
    shortcut: &ShortcutDefinition,
    raw_params: &[String],
    confirmed: bool,
    timeout: f64,
    json: bool,
) -> anyhow::Result<()> {
    let params = parse_params(shortcut, raw_params)?;
    let timeout = Duration::try_from_secs_f64(timeout).context("invalid --timeout")?;

    let (store, signal) = open(dir);
    let client = IntentClient::new(store, signal).with_timing(timeout, poll_interval());
    let runner = IntentRunner::new(client, Arc::new(CliHost { confirmed }));

    let reply = match runner.run(shortcut, params).await {
        Ok(reply) => Some(reply),
        Err(BridgeError::Cancelled) => None,
        Err(e) => return Err(e).context(format!("invoking '{}' failed", shortcut.identifier)),
    };

    if json {
        print_json(&serde_json::json!({
            "identifier": shortcut.identifier,
            "cancelled": reply.is_none(),
            "reply": reply,
        }))
    } else {
        match reply {
            Some(reply) => println!("{reply}"),
            None => println!("Cancelled."),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// listen
// ---------------------------------------------------------------------------

async fn listen(dir: &Path, reply: String, once: bool, json: bool) -> anyhow::Result<()> {
    let (store, signal) = open(dir);
    let bridge = Bridge::new(store, signal);

    let (tx, mut rx) = mpsc::unbounded_channel::<Invocation>();
    let listener = FnListener(move |invocation: Invocation, responder: Responder| {
        let tx = tx.clone();
        let reply = reply.clone();
        async move {
            responder.respond(&reply)?;
            let _ = tx.send(invocation);
            Ok::<(), anyhow::Error>(())
        }
    });
    bridge.add_listener(Arc::new(listener)).await;
    tracing::info!(dir = %dir.display(), "listening for shortcut invocations");

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(invocation) = received else { break };
                print_invocation(&invocation, json)?;
                if once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    bridge.remove_all_listeners();
    Ok(())
}

fn print_invocation(invocation: &Invocation, json: bool) -> anyhow::Result<()> {
    if json {
        let line = serde_json::json!({
            "identifier": invocation.identifier,
            "nonce": invocation.nonce,
            "timestamp": invocation.timestamp,
            "parameters": invocation.parameters,
            "userConfirmed": invocation.user_confirmed,
        });
        print_json_line(&line)?;
    } else {
        let params: Vec<String> = invocation
            .parameters
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let line = format!(
            "{} {} {}",
            invocation.identifier,
            invocation.nonce,
            params.join(" ")
        );
        println!("{}", line.trim_end());
    }
    Ok(())
}
