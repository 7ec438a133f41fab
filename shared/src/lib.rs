//! # Shared Protocol Library
//!
//! This crate contains the application-level message types exchanged by the
//! session server's RPC surface, shared between frontend and backend nodes.
//! It is the typed boundary between the transport layer and the service
//! logic: the transport moves opaque byte frames, this crate gives them
//! shape.
//!
//! ## Message Families
//!
//! ### RPC Envelope
//! `Request` and `Response` wrap every remote call. A request carries the
//! originating `Session` snapshot (when one is bound), the routed `Msg`
//! payload, and the frontend node that owns the connection.
//!
//! ### Session Control
//! `BindMsg` binds a user id to a frontend node, `KickMsg`/`KickAnswer`
//! evict a bound user, and `Push` delivers a server-initiated message to a
//! routed user.
//!
//! ## Serialization
//!
//! All types derive `Serialize`/`Deserialize` and are framed with `bincode`
//! through the [`encode`]/[`decode`] helpers. The codec is deliberately thin;
//! routing and retries belong to the transport, not to this crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Protocol revision carried in handshakes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Structured error payload carried inside a [`Response`].
///
/// `code` is a stable machine-readable identifier; `msg` is for humans.
/// `metadata` carries optional context such as the failing route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub msg: String,
    pub metadata: HashMap<String, String>,
}

impl RpcError {
    pub fn new(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            msg: msg.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Snapshot of a bound user session attached to a request.
///
/// `id` is the frontend-local session id, `uid` the bound user (empty until
/// bind), and `data` the serialized session attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub uid: String,
    pub data: Vec<u8>,
}

/// Direction and reply expectation of a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgKind {
    /// Client-initiated, expects a response.
    Request,
    /// Client-initiated, fire-and-forget.
    Notify,
    /// Server reply to a `Request`.
    Response,
    /// Server-initiated delivery to a client.
    Push,
}

/// A routed application message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    /// Client-assigned correlation id (0 for notifies and pushes).
    pub id: u64,
    /// Dot-separated route, e.g. `room.join`.
    pub route: String,
    /// Serialized payload, opaque to the envelope.
    pub data: Vec<u8>,
    /// Reply route for request/response pairing.
    pub reply: String,
    pub kind: MsgKind,
}

/// Whether an RPC originates from the system or from user logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcKind {
    Sys,
    User,
}

/// Envelope for a remote call between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub kind: RpcKind,
    /// Session snapshot of the calling user, if one is bound.
    pub session: Option<Session>,
    pub msg: Option<Msg>,
    /// Id of the frontend node owning the client connection.
    pub frontend_id: String,
    /// Opaque tracing/routing metadata.
    pub metadata: Vec<u8>,
}

/// Envelope for the reply to a [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub data: Vec<u8>,
    pub error: Option<RpcError>,
}

impl Response {
    /// A successful response wrapping `data`.
    pub fn ok(data: Vec<u8>) -> Self {
        Self { data, error: None }
    }

    /// An error response with no payload.
    pub fn err(error: RpcError) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error),
        }
    }
}

/// Server-initiated message delivered to a bound user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    pub route: String,
    pub uid: String,
    pub data: Vec<u8>,
}

/// Binds a user id to the frontend node that owns their connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMsg {
    pub uid: String,
    pub frontend_id: String,
}

/// Evicts a bound user from their frontend node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickMsg {
    pub user_id: String,
}

/// Outcome of a [`KickMsg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickAnswer {
    pub kicked: bool,
}

/// Encodes a message for the wire.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

/// Decodes a message received from the wire.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
