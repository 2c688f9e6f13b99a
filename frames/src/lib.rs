//! Packet model and text codec for the yard's realtime WS transport.
//!
//! The backend pushes events through Socket.IO, which layers its own packet
//! format (namespace, ack id, JSON argument array) on top of Engine.IO text
//! frames (open handshake, ping/pong, message). This crate owns both layers so
//! the channel client never touches raw strings.
//!
//! WIRE FORMAT
//! ===========
//! - Engine.IO: first character is the packet type (`0` open .. `6` noop),
//!   the remainder is the payload.
//! - Socket.IO (inside an Engine.IO `4` message): type digit, optional
//!   `/namespace,` prefix, optional ack id digits, optional JSON payload.
//!   Events carry `["name", arg, ...]`.
//!
//! Binary attachments (`5`/`6` Socket.IO types) are not used by the yard
//! backend and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when a packet carries no explicit `/namespace,` prefix.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Error returned by [`decode_packet`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame was empty.
    #[error("empty packet")]
    Empty,
    /// The leading Engine.IO type character is not `0`..=`6`.
    #[error("invalid engine packet type: {0:?}")]
    InvalidEngineType(char),
    /// The Socket.IO type digit is unknown.
    #[error("invalid socket packet type: {0:?}")]
    InvalidSocketType(char),
    /// The packet is valid but uses a feature this codec does not implement.
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
    /// An event packet had no name, or the name was not a string.
    #[error("event packet has no name")]
    MissingEventName,
    /// An ack packet had no id.
    #[error("ack packet has no id")]
    MissingAckId,
    /// The ack id digits overflowed.
    #[error("invalid ack id")]
    InvalidAckId,
    /// Event or ack payload was not a JSON array.
    #[error("expected a JSON array payload")]
    ExpectedArray,
    /// The JSON payload could not be parsed.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handshake data sent by the server in the Engine.IO open packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

/// Engine.IO transport packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, id: Option<u64>, name: String, args: Vec<Value> },
    Ack { namespace: String, id: u64, args: Vec<Value> },
    ConnectError { namespace: String, data: Value },
}

impl SocketPacket {
    /// Connect request for the default namespace.
    #[must_use]
    pub fn connect() -> Self {
        Self::Connect { namespace: DEFAULT_NAMESPACE.to_owned(), data: None }
    }

    /// Event on the default namespace with a single payload argument.
    #[must_use]
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event { namespace: DEFAULT_NAMESPACE.to_owned(), id: None, name: name.to_owned(), args: vec![payload] }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a packet as an Engine.IO text frame.
#[must_use]
pub fn encode_packet(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => {
            format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
        }
        Packet::Close => "1".to_owned(),
        Packet::Ping(data) => format!("2{}", data.as_deref().unwrap_or_default()),
        Packet::Pong(data) => format!("3{}", data.as_deref().unwrap_or_default()),
        Packet::Message(socket) => format!("4{}", encode_socket(socket)),
        Packet::Upgrade => "5".to_owned(),
        Packet::Noop => "6".to_owned(),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    let mut out = String::new();
    match packet {
        SocketPacket::Connect { namespace, data } => {
            out.push('0');
            push_namespace(&mut out, namespace, data.is_some());
            if let Some(data) = data {
                out.push_str(&data.to_string());
            }
        }
        SocketPacket::Disconnect { namespace } => {
            out.push('1');
            push_namespace(&mut out, namespace, false);
        }
        SocketPacket::Event { namespace, id, name, args } => {
            out.push('2');
            push_namespace(&mut out, namespace, true);
            if let Some(id) = id {
                out.push_str(&id.to_string());
            }
            let mut array = Vec::with_capacity(args.len() + 1);
            array.push(Value::String(name.clone()));
            array.extend(args.iter().cloned());
            out.push_str(&Value::Array(array).to_string());
        }
        SocketPacket::Ack { namespace, id, args } => {
            out.push('3');
            push_namespace(&mut out, namespace, true);
            out.push_str(&id.to_string());
            out.push_str(&Value::Array(args.clone()).to_string());
        }
        SocketPacket::ConnectError { namespace, data } => {
            out.push('4');
            push_namespace(&mut out, namespace, true);
            out.push_str(&data.to_string());
        }
    }
    out
}

fn push_namespace(out: &mut String, namespace: &str, has_more: bool) {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        return;
    }
    out.push_str(namespace);
    if has_more {
        out.push(',');
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode an Engine.IO text frame.
///
/// # Errors
///
/// Returns a [`CodecError`] for empty frames, unknown packet types, binary
/// Socket.IO packets, and malformed JSON payloads.
pub fn decode_packet(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(non_empty(rest))),
        '3' => Ok(Packet::Pong(non_empty(rest))),
        '4' => Ok(Packet::Message(decode_socket(rest)?)),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::InvalidEngineType(other)),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = body.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    if matches!(kind, '5' | '6') {
        return Err(CodecError::Unsupported("binary attachments"));
    }
    let mut rest = chars.as_str();

    let namespace = if rest.starts_with('/') {
        if let Some(idx) = rest.find(',') {
            let namespace = rest[..idx].to_owned();
            rest = &rest[idx + 1..];
            namespace
        } else {
            let namespace = rest.to_owned();
            rest = "";
            namespace
        }
    } else {
        DEFAULT_NAMESPACE.to_owned()
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let id = if digits > 0 {
        Some(rest[..digits].parse::<u64>().map_err(|_| CodecError::InvalidAckId)?)
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() { None } else { Some(serde_json::from_str::<Value>(rest)?) };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = into_array(data)?;
            if args.is_empty() {
                return Err(CodecError::MissingEventName);
            }
            let Value::String(name) = args.remove(0) else {
                return Err(CodecError::MissingEventName);
            };
            Ok(SocketPacket::Event { namespace, id, name, args })
        }
        '3' => {
            let id = id.ok_or(CodecError::MissingAckId)?;
            Ok(SocketPacket::Ack { namespace, id, args: into_array(data)? })
        }
        '4' => Ok(SocketPacket::ConnectError { namespace, data: data.unwrap_or(Value::Null) }),
        other => Err(CodecError::InvalidSocketType(other)),
    }
}

fn into_array(data: Option<Value>) -> Result<Vec<Value>, CodecError> {
    match data {
        Some(Value::Array(items)) => Ok(items),
        None => Ok(Vec::new()),
        Some(_) => Err(CodecError::ExpectedArray),
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() { None } else { Some(text.to_owned()) }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
