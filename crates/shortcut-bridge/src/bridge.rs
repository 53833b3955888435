//! App-side actor: wakes on the signal, consumes pending commands, and fans
//! them out to registered listeners.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shortcut_core::config::ShortcutDefinition;
use shortcut_core::protocol::app_state_key;
use tokio::sync::{broadcast, mpsc};

use crate::error::BridgeError;
use crate::protocol::{self, PendingCommand};
use crate::signal::Signal;
use crate::store::SharedStore;
use crate::value::{ParamValue, StoreValue};
use crate::Result;

// ─── Invocation ─────────────────────────────────────────────────────────────

/// One consumed command, as handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub identifier: String,
    pub nonce: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub parameters: BTreeMap<String, ParamValue>,
    pub user_confirmed: Option<bool>,
}

impl From<PendingCommand> for Invocation {
    fn from(cmd: PendingCommand) -> Self {
        let timestamp = cmd
            .timestamp
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64));
        Self {
            identifier: cmd.identifier,
            nonce: cmd.nonce,
            timestamp,
            parameters: cmd.parameters,
            user_confirmed: cmd.user_confirmed,
        }
    }
}

impl Invocation {
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    /// Check parameters against the shortcut's declaration.
    ///
    /// Declared values are coerced to their declared type; required ones must
    /// be present. Undeclared parameters pass through untouched.
    pub fn resolve(&self, shortcut: &ShortcutDefinition) -> Result<BTreeMap<String, ParamValue>> {
        if shortcut.identifier != self.identifier {
            return Err(BridgeError::UnknownShortcut(self.identifier.clone()));
        }
        let mut resolved = self.parameters.clone();
        for spec in &shortcut.parameters {
            match resolved.remove(&spec.name) {
                Some(value) => {
                    let value = value.coerce(&spec.name, spec.param_type)?;
                    resolved.insert(spec.name.clone(), value);
                }
                None if !spec.optional => {
                    return Err(BridgeError::MissingParameter(spec.name.clone()));
                }
                None => {}
            }
        }
        Ok(resolved)
    }
}

// ─── Listeners ──────────────────────────────────────────────────────────────

/// Writes the reply for one invocation.
#[derive(Clone)]
pub struct Responder {
    store: Arc<dyn SharedStore>,
    nonce: String,
}

impl Responder {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// An empty message tells the intent to use its default reply.
    pub fn respond(&self, message: &str) -> Result<()> {
        protocol::write_response(self.store.as_ref(), &self.nonce, message)
    }
}

#[async_trait]
pub trait InvocationListener: Send + Sync {
    async fn on_invocation(&self, invocation: Invocation, responder: Responder) -> anyhow::Result<()>;
}

/// Adapter for closure listeners.
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F, Fut> InvocationListener for FnListener<F>
where
    F: Fn(Invocation, Responder) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_invocation(&self, invocation: Invocation, responder: Responder) -> anyhow::Result<()> {
        (self.0)(invocation, responder).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

// ─── Bridge ─────────────────────────────────────────────────────────────────

struct Inner {
    store: Arc<dyn SharedStore>,
    listeners: Mutex<ListenerList>,
    next_id: AtomicU64,
    /// Serializes read-and-clear so duplicate wake-ups cannot double-consume.
    consume: tokio::sync::Mutex<()>,
    tracked_state: Mutex<BTreeSet<String>>,
    dispatch_tx: mpsc::UnboundedSender<Invocation>,
}

/// Explicit app-side context. Cloning shares the same listeners and state.
///
/// Must be created inside a Tokio runtime: it spawns the signal watcher and
/// the dispatch task, both of which end once every clone is dropped.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    pub fn new(store: Arc<dyn SharedStore>, signal: Arc<dyn Signal>) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            consume: tokio::sync::Mutex::new(()),
            tracked_state: Mutex::new(BTreeSet::new()),
            dispatch_tx,
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), dispatch_rx));
        tokio::spawn(signal_loop(Arc::downgrade(&inner), signal.subscribe()));

        Self { inner }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.inner.store
    }

    // -- listeners ---------------------------------------------------------

    /// Register a listener, then look for a command that arrived before any
    /// listener existed (the process may have been launched to serve it).
    pub async fn add_listener(&self, listener: Arc<dyn InvocationListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners().push((id, listener));
        if let Err(e) = self.check_pending().await {
            tracing::warn!(error = %e, "pending check after registration failed");
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn remove_all_listeners(&self) {
        self.inner.listeners().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    // -- consumption -------------------------------------------------------

    /// Consume the pending command, if any, and queue it for the listeners.
    ///
    /// Left untouched while no listener is registered. Returns the nonce of
    /// the consumed command.
    pub async fn check_pending(&self) -> Result<Option<String>> {
        self.inner.check_pending().await
    }

    // -- responses and state -----------------------------------------------

    pub fn respond(&self, nonce: &str, message: &str) -> Result<()> {
        protocol::write_response(self.inner.store.as_ref(), nonce, message)
    }

    /// Mirror a piece of app state for dialog conditions and placeholders.
    ///
    /// Booleans are stored as 1/0; `null` clears the key.
    pub fn update_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let store_key = app_state_key(key);
        match StoreValue::from_json(value)? {
            Some(encoded) => {
                self.inner.store.set(&store_key, encoded)?;
                if let Ok(mut tracked) = self.inner.tracked_state.lock() {
                    tracked.insert(key.to_string());
                }
            }
            None => {
                self.inner.store.remove(&store_key)?;
                if let Ok(mut tracked) = self.inner.tracked_state.lock() {
                    tracked.remove(key);
                }
            }
        }
        tracing::debug!(key, "app state updated");
        Ok(())
    }

    /// Remove the given state keys, or every key set through this bridge
    /// when `keys` is empty.
    pub fn clear_state(&self, keys: &[String]) -> Result<()> {
        let targets: Vec<String> = if keys.is_empty() {
            self.tracked_state()
        } else {
            keys.to_vec()
        };
        let store_keys: Vec<String> = targets.iter().map(|k| app_state_key(k)).collect();
        self.inner.store.remove_many(&store_keys)?;
        if let Ok(mut tracked) = self.inner.tracked_state.lock() {
            for key in &targets {
                tracked.remove(key);
            }
        }
        Ok(())
    }

    /// Drop every listener and every tracked state key.
    pub fn clear_all(&self) -> Result<()> {
        self.remove_all_listeners();
        self.clear_state(&[])
    }

    pub fn tracked_state(&self) -> Vec<String> {
        self.inner
            .tracked_state
            .lock()
            .ok()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }
}

type ListenerList = Vec<(ListenerId, Arc<dyn InvocationListener>)>;

impl Inner {
    /// A listener that panicked mid-call cannot leave the list half-edited,
    /// so a poisoned lock is still usable.
    fn listeners(&self) -> MutexGuard<'_, ListenerList> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn InvocationListener>> {
        self.listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    async fn check_pending(&self) -> Result<Option<String>> {
        let _guard = self.consume.lock().await;
        let idle = self.listeners().is_empty();
        if idle {
            return Ok(None);
        }
        // Never clear a command that nothing can deliver.
        if self.dispatch_tx.is_closed() {
            return Err(BridgeError::Signal("dispatch task has stopped".into()));
        }

        let store = Arc::clone(&self.store);
        let taken = tokio::task::spawn_blocking(move || -> Result<Option<PendingCommand>> {
            // A newer command can land between read and clear; read again.
            while let Some(cmd) = protocol::take_pending(store.as_ref())? {
                if protocol::clear_command(store.as_ref(), &cmd.nonce)? {
                    return Ok(Some(cmd));
                }
            }
            Ok(None)
        })
        .await
        .map_err(|e| BridgeError::Store(format!("store task failed: {e}")))??;

        let Some(cmd) = taken else {
            return Ok(None);
        };
        let nonce = cmd.nonce.clone();
        tracing::info!(identifier = %cmd.identifier, nonce = %nonce, "command consumed");
        self.dispatch_tx
            .send(Invocation::from(cmd))
            .map_err(|_| BridgeError::Signal("dispatch task has stopped".into()))?;
        Ok(Some(nonce))
    }
}

async fn signal_loop(inner: Weak<Inner>, mut rx: broadcast::Receiver<()>) {
    loop {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(e) = inner.check_pending().await {
            tracing::warn!(error = %e, "pending check after signal failed");
        }
    }
}

/// Runs listeners one invocation at a time, in registration order.
async fn dispatch_loop(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Invocation>) {
    while let Some(invocation) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let responder = Responder {
            store: Arc::clone(&inner.store),
            nonce: invocation.nonce.clone(),
        };
        let listeners = inner.snapshot_listeners();
        drop(inner);

        for listener in listeners {
            // Each call runs in its own task so a panic stays with that listener.
            let call = tokio::spawn({
                let invocation = invocation.clone();
                let responder = responder.clone();
                async move { listener.on_invocation(invocation, responder).await }
            });
            let failure = match call.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(e) => format!("listener panicked: {e}"),
            };
            tracing::error!(
                identifier = %invocation.identifier,
                nonce = %invocation.nonce,
                error = %failure,
                "listener failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::LocalSignal;
    use crate::store::MemoryStore;
    use shortcut_core::protocol::{COMMAND_NONCE_KEY, PENDING_COMMAND_KEY};
    use std::time::Duration;

    struct Recorder {
        tx: mpsc::UnboundedSender<Invocation>,
        reply: Option<&'static str>,
        fail: bool,
    }

    /// Panics on `boom`, answers everything else.
    struct Fragile {
        tx: mpsc::UnboundedSender<Invocation>,
    }

    #[async_trait]
    impl InvocationListener for Fragile {
        async fn on_invocation(
            &self,
            invocation: Invocation,
            responder: Responder,
        ) -> anyhow::Result<()> {
            if invocation.identifier == "boom" {
                panic!("listener blew up");
            }
            responder.respond(&format!("ran {}", invocation.identifier))?;
            let _ = self.tx.send(invocation);
            Ok(())
        }
    }

    #[async_trait]
    impl InvocationListener for Recorder {
        async fn on_invocation(
            &self,
            invocation: Invocation,
            responder: Responder,
        ) -> anyhow::Result<()> {
            let _ = self.tx.send(invocation);
            if let Some(reply) = self.reply {
                responder.respond(reply)?;
            }
            if self.fail {
                anyhow::bail!("listener exploded");
            }
            Ok(())
        }
    }

    fn recorder(
        reply: Option<&'static str>,
        fail: bool,
    ) -> (Arc<dyn InvocationListener>, mpsc::UnboundedReceiver<Invocation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx, reply, fail }), rx)
    }

    fn setup() -> (Arc<MemoryStore>, Arc<LocalSignal>, Bridge) {
        let store = Arc::new(MemoryStore::new());
        let signal = Arc::new(LocalSignal::new());
        let bridge = Bridge::new(store.clone(), signal.clone());
        (store, signal, bridge)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Invocation>) -> Invocation {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("listener was not called")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn registration_picks_up_cold_start_command() {
        let (store, _signal, bridge) = setup();
        let nonce = protocol::publish_command(store.as_ref(), "startTimer", &BTreeMap::new(), false)
            .unwrap();

        let (listener, mut rx) = recorder(Some("Started"), false);
        bridge.add_listener(listener).await;

        let inv = next(&mut rx).await;
        assert_eq!(inv.identifier, "startTimer");
        assert_eq!(inv.nonce, nonce);
        assert_eq!(store.get(COMMAND_NONCE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn command_waits_for_a_listener() {
        let (store, signal, bridge) = setup();
        protocol::publish_command(store.as_ref(), "go", &BTreeMap::new(), false).unwrap();
        signal.post().unwrap();
        assert_eq!(bridge.check_pending().await.unwrap(), None);
        assert!(store.get(PENDING_COMMAND_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn signal_wakes_bridge_and_reply_lands() {
        let (store, signal, bridge) = setup();
        let (listener, mut rx) = recorder(Some("Hello"), false);
        bridge.add_listener(listener).await;

        let nonce = protocol::publish_command(store.as_ref(), "greet", &BTreeMap::new(), false)
            .unwrap();
        signal.post().unwrap();

        next(&mut rx).await;
        let reply = protocol::poll_response(
            store.as_ref(),
            &nonce,
            Duration::from_secs(2),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(reply.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn duplicate_signals_consume_once() {
        let (store, signal, bridge) = setup();
        let (listener, mut rx) = recorder(None, false);
        bridge.add_listener(listener).await;

        protocol::publish_command(store.as_ref(), "go", &BTreeMap::new(), false).unwrap();
        for _ in 0..3 {
            signal.post().unwrap();
        }
        let (a, b) = tokio::join!(bridge.check_pending(), bridge.check_pending());
        let consumed = [a.unwrap(), b.unwrap()].iter().filter(|n| n.is_some()).count();
        assert!(consumed <= 1);

        next(&mut rx).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_listener_does_not_stop_fan_out() {
        let (store, signal, bridge) = setup();
        let (first, mut first_rx) = recorder(None, true);
        let (second, mut second_rx) = recorder(Some("ok"), false);
        bridge.add_listener(first).await;
        bridge.add_listener(second).await;

        protocol::publish_command(store.as_ref(), "go", &BTreeMap::new(), false).unwrap();
        signal.post().unwrap();

        next(&mut first_rx).await;
        next(&mut second_rx).await;
    }

    #[tokio::test]
    async fn panicking_listener_does_not_lose_later_commands() {
        let (store, _signal, bridge) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (healthy, mut healthy_rx) = recorder(None, false);
        bridge.add_listener(Arc::new(Fragile { tx })).await;
        bridge.add_listener(healthy).await;

        protocol::publish_command(store.as_ref(), "boom", &BTreeMap::new(), false).unwrap();
        assert!(bridge.check_pending().await.unwrap().is_some());
        // The panic does not keep later listeners from seeing the command.
        assert_eq!(next(&mut healthy_rx).await.identifier, "boom");

        let nonce = protocol::publish_command(store.as_ref(), "fine", &BTreeMap::new(), false)
            .unwrap();
        assert_eq!(bridge.check_pending().await.unwrap().as_deref(), Some(nonce.as_str()));
        assert_eq!(next(&mut rx).await.identifier, "fine");
        let reply = protocol::poll_response(
            store.as_ref(),
            &nonce,
            Duration::from_secs(2),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(reply.as_deref(), Some("ran fine"));
        assert_eq!(bridge.listener_count(), 2);
    }

    #[tokio::test]
    async fn registration_survives_poisoned_listener_lock() {
        let (_store, _signal, bridge) = setup();
        let holder = bridge.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.listeners.lock().unwrap();
            panic!("poisoned while registering");
        })
        .join();
        assert!(bridge.inner.listeners.is_poisoned());

        let (listener, _rx) = recorder(None, false);
        let id = bridge.add_listener(listener).await;
        assert_eq!(bridge.listener_count(), 1);
        assert!(bridge.remove_listener(id));
    }

    #[tokio::test]
    async fn removed_listener_is_not_called() {
        let (store, _signal, bridge) = setup();
        let (listener, _rx) = recorder(None, false);
        let id = bridge.add_listener(listener).await;
        assert!(bridge.remove_listener(id));
        assert!(!bridge.remove_listener(id));
        assert_eq!(bridge.listener_count(), 0);

        protocol::publish_command(store.as_ref(), "go", &BTreeMap::new(), false).unwrap();
        assert_eq!(bridge.check_pending().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closure_listeners() {
        let (store, signal, bridge) = setup();
        let listener = FnListener(|inv: Invocation, responder: Responder| async move {
            responder.respond(&format!("ran {}", inv.identifier))?;
            Ok::<(), anyhow::Error>(())
        });
        bridge.add_listener(Arc::new(listener)).await;

        let nonce = protocol::publish_command(store.as_ref(), "go", &BTreeMap::new(), false)
            .unwrap();
        signal.post().unwrap();
        let reply = protocol::poll_response(
            store.as_ref(),
            &nonce,
            Duration::from_secs(2),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(reply.as_deref(), Some("ran go"));
    }

    #[tokio::test]
    async fn state_updates_use_store_encoding() {
        let (store, _signal, bridge) = setup();
        bridge.update_state("running", &serde_json::json!(true)).unwrap();
        bridge.update_state("count", &serde_json::json!(3)).unwrap();
        bridge.update_state("name", &serde_json::json!("Ann")).unwrap();
        bridge.update_state("tags", &serde_json::json!(["a"])).unwrap();

        assert_eq!(store.get("appState_running").unwrap(), Some(StoreValue::Number(1.0)));
        assert_eq!(store.get("appState_count").unwrap(), Some(StoreValue::Number(3.0)));
        assert_eq!(store.get_text("appState_name").unwrap().as_deref(), Some("Ann"));
        assert_eq!(store.get_text("appState_tags").unwrap().as_deref(), Some("[\"a\"]"));
        assert_eq!(bridge.tracked_state(), vec!["count", "name", "running", "tags"]);

        bridge.update_state("running", &serde_json::Value::Null).unwrap();
        assert_eq!(store.get("appState_running").unwrap(), None);

        bridge.clear_state(&["count".to_string()]).unwrap();
        assert_eq!(bridge.tracked_state(), vec!["name", "tags"]);

        bridge.clear_all().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn resolve_checks_declared_parameters() {
        let config = shortcut_core::config::ShortcutConfig::from_yaml(
            "shortcuts:\n  - identifier: add\n    title: Add\n    phrases: [add]\n    parameters:\n      - { name: item, title: Item, type: string, optional: false }\n      - { name: count, title: Count, type: number }\n",
        )
        .unwrap();
        let shortcut = &config.shortcuts[0];
        let mut inv = Invocation {
            identifier: "add".into(),
            nonce: "N".into(),
            timestamp: None,
            parameters: BTreeMap::new(),
            user_confirmed: None,
        };
        assert!(matches!(
            inv.resolve(shortcut),
            Err(BridgeError::MissingParameter(name)) if name == "item"
        ));

        inv.parameters.insert("item".into(), ParamValue::Number(5.0));
        let resolved = inv.resolve(shortcut).unwrap();
        assert_eq!(resolved["item"], ParamValue::Text("5".into()));
        assert!(!resolved.contains_key("count"));
    }
}
