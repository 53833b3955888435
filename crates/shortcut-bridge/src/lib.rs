//! Runtime half of the shortcut handshake.
//!
//! The intent side publishes a nonce-keyed command into a shared store and
//! polls for a reply; the app side wakes on a signal, consumes the command,
//! fans it out to listeners, and writes the reply back.

pub mod bridge;
pub mod client;
pub mod error;
pub mod protocol;
pub mod redb_store;
pub mod signal;
pub mod store;
pub mod value;

pub use bridge::{Bridge, FnListener, Invocation, InvocationListener, ListenerId, Responder};
pub use client::{IntentClient, IntentHost, IntentRunner};
pub use error::BridgeError;
pub use redb_store::RedbStore;
pub use signal::{FileSignal, LocalSignal, Signal};
pub use store::{MemoryStore, SharedStore};
pub use value::{ParamValue, StoreValue};

pub type Result<T> = std::result::Result<T, BridgeError>;
