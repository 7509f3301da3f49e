//! Push-hint listener for the QX finality monitor.
//!
//! The QX backend publishes state-change events over Socket.IO. This crate
//! listens for them and wakes the monitor's pollers early:
//! - Engine.IO v4 framing over websocket ([`packet`])
//! - heartbeat answering and liveness timeout
//! - automatic reconnection with exponential backoff
//!
//! Events are hints only. The monitor always confirms against the ledger.

pub mod error;
pub mod listener;
pub mod packet;

pub use error::{NotifyError, NotifyResult};
pub use listener::{HintListener, ListenerState, NotifierConfig};
pub use packet::{EnginePacket, OpenHandshake, SocketPacket};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
