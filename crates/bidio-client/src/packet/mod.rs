//! Wire packet model and codec.
//!
//! Every message exchanged on the stream event is one JSON object:
//!
//! ```text
//! { "type": "<action>", "id": <bid id | null>, "data": { ... } }
//! ```
//!
//! The payload shape depends on the action: `query` requests carry
//! `{ "query": criteria }`, `update` requests carry `{ "update": fields }`,
//! and every other request carries `{ "owner": owner | null }`. Error packets
//! carry the error payload directly in `data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionKind;
use crate::entity::EntityId;
use crate::error::CodecError;

/// Revision of the packet layout spoken by this client.
pub const PROTOCOL: u32 = 1;

/// One decoded wire packet.
///
/// # Example
///
/// ```
/// use bidio_client::{ActionKind, Packet, decode, encode};
/// use serde_json::json;
///
/// let packet = Packet::request(ActionKind::Lock, 7, Some(json!({"id": "u1"})));
/// let wire = encode(&packet).expect("encode");
/// assert_eq!(wire, json!({"type": "lock", "id": 7, "data": {"owner": {"id": "u1"}}}));
/// assert_eq!(decode(wire).expect("decode"), packet);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type")]
    kind: ActionKind,
    #[serde(default)]
    id: Option<EntityId>,
    #[serde(default)]
    data: Value,
}

impl Packet {
    /// Creates a packet from its parts.
    #[must_use]
    pub const fn new(kind: ActionKind, id: Option<EntityId>, data: Value) -> Self {
        Self { kind, id, data }
    }

    /// Creates a request packet, wrapping `owner` in the payload shape the
    /// action requires.
    #[must_use]
    pub fn request(kind: ActionKind, id: impl Into<EntityId>, owner: Option<Value>) -> Self {
        let data = request_payload(&kind, owner);
        Self::new(kind, Some(id.into()), data)
    }

    /// The packet's action.
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// The raw identifier, if any was sent.
    #[must_use]
    pub const fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// The identifier when it names a specific bid.
    ///
    /// Blank identifiers (`null`, `0`, `""`, `"*"`) yield `None`, which only
    /// wildcard-keyed watchers match.
    #[must_use]
    pub fn target(&self) -> Option<&EntityId> {
        self.id.as_ref().filter(|id| !id.is_unspecified())
    }

    /// The payload.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Splits the packet into its action and payload.
    #[must_use]
    pub fn into_parts(self) -> (ActionKind, Option<EntityId>, Value) {
        (self.kind, self.id, self.data)
    }
}

/// Wraps a request argument in the payload shape `kind` expects.
#[must_use]
pub fn request_payload(kind: &ActionKind, owner: Option<Value>) -> Value {
    let field = match kind {
        ActionKind::Query => "query",
        ActionKind::Update => "update",
        _ => "owner",
    };
    let mut payload = Map::new();
    payload.insert(field.to_owned(), owner.unwrap_or(Value::Null));
    Value::Object(payload)
}

/// Encodes a packet into the transport's message type.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if the packet cannot be represented as
/// JSON.
pub fn encode(packet: &Packet) -> Result<Value, CodecError> {
    serde_json::to_value(packet).map_err(CodecError::Serialize)
}

/// Decodes a transport message into a packet.
///
/// # Errors
///
/// Returns [`CodecError::Deserialize`] when the message does not have the
/// packet shape. Only JSON objects qualify; arrays are rejected even when
/// their elements line up with the packet fields.
pub fn decode(message: Value) -> Result<Packet, CodecError> {
    if !message.is_object() {
        return Err(CodecError::Deserialize {
            message: format!("expected a packet object, found {}", kind_of(&message)),
            source: None,
        });
    }
    serde_json::from_value(message).map_err(CodecError::from_json_error)
}

const fn kind_of(message: &Value) -> &'static str {
    match message {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
