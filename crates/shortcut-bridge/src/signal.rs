use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shortcut_core::protocol::COMMAND_SIGNAL_NAME;
use tokio::sync::broadcast;

use crate::error::BridgeError;
use crate::Result;

/// Best-effort, payload-less wake-up between the two actors.
///
/// A post may be missed entirely; receivers must re-scan the store rather
/// than trust that every post arrives.
pub trait Signal: Send + Sync {
    fn post(&self) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<()>;
}

// ---------------------------------------------------------------------------
// LocalSignal
// ---------------------------------------------------------------------------

/// Both actors in one process.
#[derive(Debug, Clone)]
pub struct LocalSignal {
    tx: broadcast::Sender<()>,
}

impl LocalSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

impl Default for LocalSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for LocalSignal {
    fn post(&self) -> Result<()> {
        // No subscribers is fine: the signal is advisory.
        let _ = self.tx.send(());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// FileSignal
// ---------------------------------------------------------------------------

const WATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Cross-process signal: posting rewrites a token file in the shared
/// container, and a watcher task broadcasts whenever the token changes.
pub struct FileSignal {
    path: PathBuf,
    tx: broadcast::Sender<()>,
    stop: Arc<AtomicBool>,
}

impl FileSignal {
    /// Token file lives at `<dir>/<signal name>.signal`.
    ///
    /// The watcher only runs when created inside a Tokio runtime; outside
    /// one, the signal can still post.
    pub fn new(dir: &Path) -> Self {
        let path = dir.join(format!("{COMMAND_SIGNAL_NAME}.signal"));
        let (tx, _) = broadcast::channel(16);
        let stop = Arc::new(AtomicBool::new(false));

        if tokio::runtime::Handle::try_current().is_ok() {
            let watched = path.clone();
            let tx = tx.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut last = tokio::fs::read(&watched).await.ok();
                while !stop.load(Ordering::Relaxed) {
                    tokio::time::sleep(WATCH_INTERVAL).await;
                    let current = tokio::fs::read(&watched).await.ok();
                    if current.is_some() && current != last {
                        last = current;
                        tracing::debug!(path = %watched.display(), "signal token changed");
                        let _ = tx.send(());
                    }
                }
            });
        }

        Self { path, tx, stop }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Signal for FileSignal {
    fn post(&self) -> Result<()> {
        let token = uuid::Uuid::new_v4().to_string();
        shortcut_core::io::atomic_write(&self.path, token.as_bytes())
            .map_err(|e| BridgeError::Signal(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Drop for FileSignal {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
