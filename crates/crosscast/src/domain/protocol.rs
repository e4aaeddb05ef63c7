//! Wire codec for the seven request/response kinds.
//!
//! Wire records are JSON objects. Field names (`requestid`, `type`, `rooms`,
//! `sid`, `room`, `close`, `data`, `clients`) and the numeric `type` values
//! are the compatibility surface with other cluster members regardless of
//! their implementation language - they must never change.
//!
//! Decoding is tolerant: unknown types and missing fields produce a
//! [`ProtocolError`] which the dispatcher drops silently; an inbound message
//! can never crash the dispatcher. On responses, an absent payload field is
//! a legal "not a usable answer" signal. The `data` field is special: a
//! present-but-null `data` is a real reply carrying null, distinct from an
//! absent `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Codec errors. Never surfaced to callers; malformed inbound messages are
/// dropped by the dispatcher.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload was not valid JSON (or not the expected shape).
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The numeric request type is not one of the seven known kinds.
    #[error("unknown request type {0}")]
    UnknownType(u8),

    /// A field the kind requires was absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

/// The seven distributed query kinds.
///
/// Discriminants are the wire `type` values and must stay aligned with every
/// other implementation in the cluster.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Connected client ids, optionally filtered by rooms. Quorum.
    Clients = 0,
    /// Rooms of one client. First response wins.
    ClientRooms = 1,
    /// All rooms known anywhere in the cluster. Quorum.
    AllRooms = 2,
    /// Join a client to a room wherever it lives. First response wins.
    RemoteJoin = 3,
    /// Remove a client from a room wherever it lives. First response wins.
    RemoteLeave = 4,
    /// Arbitrary application-defined query. Quorum.
    Custom = 5,
    /// Disconnect a client wherever it lives. First response wins.
    RemoteDisconnect = 6,
}

impl QueryKind {
    /// Decode a wire `type` value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Clients),
            1 => Some(Self::ClientRooms),
            2 => Some(Self::AllRooms),
            3 => Some(Self::RemoteJoin),
            4 => Some(Self::RemoteLeave),
            5 => Some(Self::Custom),
            6 => Some(Self::RemoteDisconnect),
            _ => None,
        }
    }

    /// Does this kind wait for a full quorum of responses?
    ///
    /// Quorum kinds accumulate until `received == expected`; the rest
    /// resolve on the first qualifying response.
    #[must_use]
    pub fn is_quorum(&self) -> bool {
        matches!(self, Self::Clients | Self::AllRooms | Self::Custom)
    }
}

/// A decoded request, one variant per kind.
///
/// The request id is carried as an opaque string: responders echo whatever
/// token the originator minted, which for a foreign-language cluster member
/// need not be a UUID.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestMessage {
    /// Client ids matching a room filter (empty filter = everyone).
    Clients {
        request_id: String,
        rooms: Vec<String>,
    },
    /// Rooms of the client with connection id `sid`.
    ClientRooms { request_id: String, sid: String },
    /// Every room known to any process.
    AllRooms { request_id: String },
    /// Join `sid` to `room`.
    RemoteJoin {
        request_id: String,
        sid: String,
        room: String,
    },
    /// Remove `sid` from `room`.
    RemoteLeave {
        request_id: String,
        sid: String,
        room: String,
    },
    /// Disconnect `sid`; `close` asks for the underlying socket to close.
    RemoteDisconnect {
        request_id: String,
        sid: String,
        close: bool,
    },
    /// Application-defined query payload.
    Custom { request_id: String, data: Value },
}

impl RequestMessage {
    /// The kind of this request.
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        match self {
            Self::Clients { .. } => QueryKind::Clients,
            Self::ClientRooms { .. } => QueryKind::ClientRooms,
            Self::AllRooms { .. } => QueryKind::AllRooms,
            Self::RemoteJoin { .. } => QueryKind::RemoteJoin,
            Self::RemoteLeave { .. } => QueryKind::RemoteLeave,
            Self::RemoteDisconnect { .. } => QueryKind::RemoteDisconnect,
            Self::Custom { .. } => QueryKind::Custom,
        }
    }

    /// The request id token.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Clients { request_id, .. }
            | Self::ClientRooms { request_id, .. }
            | Self::AllRooms { request_id }
            | Self::RemoteJoin { request_id, .. }
            | Self::RemoteLeave { request_id, .. }
            | Self::RemoteDisconnect { request_id, .. }
            | Self::Custom { request_id, .. } => request_id,
        }
    }
}

/// A decoded response.
///
/// Only `requestid` is required. Every payload field is optional, and the
/// aggregator treats absence as "not a usable answer yet" rather than an
/// error. `clients`/`rooms` set to JSON null read as absent (they carry no
/// usable list); `data` distinguishes null from absent because a custom
/// reply is allowed to *be* null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Token echoed from the request.
    #[serde(rename = "requestid")]
    pub request_id: String,

    /// Client ids local to the responder (Clients kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<String>>,

    /// Room names (ClientRooms and AllRooms kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,

    /// Custom reply payload. `None` = field absent, `Some(None)` = field
    /// present and null, `Some(Some(v))` = field present with a value.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub data: Option<Option<Value>>,
}

impl ResponseMessage {
    /// Bare acknowledgement (remote join/leave/disconnect).
    #[must_use]
    pub fn ack(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    /// Response carrying local client ids.
    #[must_use]
    pub fn with_clients(request_id: impl Into<String>, clients: Vec<String>) -> Self {
        Self {
            request_id: request_id.into(),
            clients: Some(clients),
            ..Default::default()
        }
    }

    /// Response carrying room names.
    #[must_use]
    pub fn with_rooms(request_id: impl Into<String>, rooms: Vec<String>) -> Self {
        Self {
            request_id: request_id.into(),
            rooms: Some(rooms),
            ..Default::default()
        }
    }

    /// Response carrying a custom reply payload (which may be null).
    #[must_use]
    pub fn with_data(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: request_id.into(),
            data: Some(Some(data)),
            ..Default::default()
        }
    }
}

/// Wire shape shared by all request kinds. Present fields vary by kind.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RequestFrame {
    requestid: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rooms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    close: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Serialize a request for the wire.
pub fn encode_request(msg: &RequestMessage) -> Result<String, ProtocolError> {
    let frame = match msg {
        RequestMessage::Clients { request_id, rooms } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::Clients as u8,
            rooms: Some(rooms.clone()),
            ..Default::default()
        },
        RequestMessage::ClientRooms { request_id, sid } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::ClientRooms as u8,
            sid: Some(sid.clone()),
            ..Default::default()
        },
        RequestMessage::AllRooms { request_id } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::AllRooms as u8,
            ..Default::default()
        },
        RequestMessage::RemoteJoin {
            request_id,
            sid,
            room,
        } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::RemoteJoin as u8,
            sid: Some(sid.clone()),
            room: Some(room.clone()),
            ..Default::default()
        },
        RequestMessage::RemoteLeave {
            request_id,
            sid,
            room,
        } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::RemoteLeave as u8,
            sid: Some(sid.clone()),
            room: Some(room.clone()),
            ..Default::default()
        },
        RequestMessage::RemoteDisconnect {
            request_id,
            sid,
            close,
        } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::RemoteDisconnect as u8,
            sid: Some(sid.clone()),
            close: Some(*close),
            ..Default::default()
        },
        RequestMessage::Custom { request_id, data } => RequestFrame {
            requestid: request_id.clone(),
            kind: QueryKind::Custom as u8,
            data: Some(data.clone()),
            ..Default::default()
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Deserialize a request from the wire.
///
/// Target fields (`sid`, `room`) are required for the kinds that act on a
/// specific connection; filter/payload fields default when absent.
pub fn decode_request(raw: &str) -> Result<RequestMessage, ProtocolError> {
    let frame: RequestFrame = serde_json::from_str(raw)?;
    let kind = QueryKind::from_u8(frame.kind).ok_or(ProtocolError::UnknownType(frame.kind))?;

    let msg = match kind {
        QueryKind::Clients => RequestMessage::Clients {
            request_id: frame.requestid,
            rooms: frame.rooms.unwrap_or_default(),
        },
        QueryKind::ClientRooms => RequestMessage::ClientRooms {
            request_id: frame.requestid,
            sid: frame.sid.ok_or(ProtocolError::MissingField("sid"))?,
        },
        QueryKind::AllRooms => RequestMessage::AllRooms {
            request_id: frame.requestid,
        },
        QueryKind::RemoteJoin => RequestMessage::RemoteJoin {
            request_id: frame.requestid,
            sid: frame.sid.ok_or(ProtocolError::MissingField("sid"))?,
            room: frame.room.ok_or(ProtocolError::MissingField("room"))?,
        },
        QueryKind::RemoteLeave => RequestMessage::RemoteLeave {
            request_id: frame.requestid,
            sid: frame.sid.ok_or(ProtocolError::MissingField("sid"))?,
            room: frame.room.ok_or(ProtocolError::MissingField("room"))?,
        },
        QueryKind::RemoteDisconnect => RequestMessage::RemoteDisconnect {
            request_id: frame.requestid,
            sid: frame.sid.ok_or(ProtocolError::MissingField("sid"))?,
            close: frame.close.unwrap_or(false),
        },
        QueryKind::Custom => RequestMessage::Custom {
            request_id: frame.requestid,
            data: frame.data.unwrap_or(Value::Null),
        },
    };
    Ok(msg)
}

/// Serialize a response for the wire.
pub fn encode_response(msg: &ResponseMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Deserialize a response from the wire. Only `requestid` is required.
pub fn decode_response(raw: &str) -> Result<ResponseMessage, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}
