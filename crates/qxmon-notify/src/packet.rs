//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only what the listener needs: the open handshake, heartbeats, namespace
//! connect and event packets. Binary attachments are skipped.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                    ping / pong
//! 40{"sid":".."}                                           namespace connected
//! 42["trades_updated",{...}]                               event
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{NotifyError, NotifyResult};

pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO open handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenHandshake {
    /// Longest silence allowed before the server is presumed gone.
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried in an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        data: Value,
    },
    Ack {
        namespace: String,
        id: Option<u64>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl EnginePacket {
    pub fn parse(text: &str) -> NotifyResult<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NotifyError::Protocol("empty packet".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(rest.to_string())),
            '3' => Ok(Self::Pong(rest.to_string())),
            '4' => Ok(Self::Message(SocketPacket::parse(rest)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(NotifyError::Protocol(format!(
                "unknown engine packet type {other:?}"
            ))),
        }
    }

    /// Reply to a server ping, echoing its probe payload.
    pub fn pong_frame(payload: &str) -> String {
        format!("3{payload}")
    }
}

impl SocketPacket {
    pub fn parse(text: &str) -> NotifyResult<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NotifyError::Protocol("empty socket packet".to_string()))?;
        let mut rest = chars.as_str();

        // Binary packets announce their attachment count as "<n>-".
        if matches!(kind, '5' | '6') {
            if let Some(idx) = rest.find('-') {
                rest = &rest[idx + 1..];
            }
        }

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let ns = &rest[..end];
            rest = rest.get(end + 1..).unwrap_or("");
            ns.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = rest[..digits].parse::<u64>().ok();
        rest = &rest[digits..];

        match kind {
            '0' => {
                let sid = if rest.is_empty() {
                    None
                } else {
                    let payload: Value = serde_json::from_str(rest)?;
                    payload.get("sid").and_then(Value::as_str).map(str::to_string)
                };
                Ok(Self::Connect { namespace, sid })
            }
            '1' => Ok(Self::Disconnect { namespace }),
            '2' | '5' => {
                let mut args: Vec<Value> = serde_json::from_str(rest)?;
                if args.is_empty() {
                    return Err(NotifyError::Protocol("event without name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(NotifyError::Protocol(format!(
                            "event name is not a string: {other}"
                        )))
                    }
                };
                let data = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                Ok(Self::Event {
                    namespace,
                    name,
                    data,
                })
            }
            '3' | '6' => Ok(Self::Ack {
                namespace,
                id: ack_id,
            }),
            '4' => {
                let message = serde_json::from_str::<Value>(rest)
                    .ok()
                    .and_then(|v| match v {
                        Value::String(s) => Some(s),
                        Value::Object(map) => map
                            .get("message")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        _ => None,
                    })
                    .unwrap_or_else(|| rest.to_string());
                Ok(Self::ConnectError { namespace, message })
            }
            other => Err(NotifyError::Protocol(format!(
                "unknown socket packet type {other:?}"
            ))),
        }
    }

    /// Frame requesting a namespace connection.
    pub fn connect_frame(namespace: &str) -> String {
        if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
            "40".to_string()
        } else {
            format!("40{namespace},")
        }
    }
}
