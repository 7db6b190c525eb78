//! Wire message schema.
//!
//! The transport layer (gossip pubsub, external to this crate) moves
//! opaque byte frames; this module defines what those frames contain. A
//! frame is a JSON envelope `{type, version, payload}`; the version
//! string is checked on decode and a mismatch rejects the whole message.

use serde::{Deserialize, Serialize};

use crate::content::{DualHash, Extension, Query};
use crate::crypto::GroupHash;
use crate::error::Error;
use crate::semantic::{Features, KernelParams};

/// Protocol version carried by every message.
pub const PROTOCOL_VERSION: &str = "tera/1.0.0";

/// Pubsub topic on which extension announcements travel.
pub const TOPIC_EXTENSIONS: &str = "tera/extensions/v1";

/// Discriminant of the message payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Extension,
    Query,
    QueryResponse,
}

/// Top-level wire message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub version: String,
    pub payload: serde_json::Value,
}

/// Payload announcing a content extension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtensionPayload {
    pub parent_crypto: GroupHash,
    pub parent_semantic: Features,
    #[serde(with = "crate::encoding::b64")]
    pub new_data: Vec<u8>,
    pub new_crypto: GroupHash,
    pub new_semantic: Features,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

/// Payload requesting similar content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryPayload {
    #[serde(with = "crate::encoding::b64")]
    pub content: Vec<u8>,
    pub params: KernelParams,
    /// Optional anchor: search only below this hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_hash: Option<GroupHash>,
    /// Correlates responses with their query.
    pub request_id: String,
}

/// Payload answering a query with matching extensions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResponsePayload {
    pub request_id: String,
    pub matches: Vec<ExtensionPayload>,
}

impl Message {
    fn new<P: Serialize>(kind: MessageType, payload: &P) -> Result<Message, Error> {
        Ok(Message {
            kind,
            version: PROTOCOL_VERSION.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Builds an extension announcement.
    pub fn extension(ext: &Extension) -> Result<Message, Error> {
        Message::new(MessageType::Extension, &ExtensionPayload::from(ext))
    }

    /// Builds a query message.
    pub fn query(query: &Query, request_id: impl Into<String>) -> Result<Message, Error> {
        Message::new(
            MessageType::Query,
            &QueryPayload {
                content: query.content.clone(),
                params: query.params,
                from_hash: None,
                request_id: request_id.into(),
            },
        )
    }

    /// Builds a query response from matching extensions.
    pub fn query_response(
        request_id: impl Into<String>,
        matches: &[Extension],
    ) -> Result<Message, Error> {
        Message::new(
            MessageType::QueryResponse,
            &QueryResponsePayload {
                request_id: request_id.into(),
                matches: matches.iter().map(ExtensionPayload::from).collect(),
            },
        )
    }

    /// Serialises the message for the transport.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a frame and checks the protocol version.
    pub fn decode(data: &[u8]) -> Result<Message, Error> {
        let msg: Message = serde_json::from_slice(data)?;
        if msg.version != PROTOCOL_VERSION {
            return Err(Error::InvalidEncoding(format!(
                "unsupported protocol version {:?}, expected {PROTOCOL_VERSION:?}",
                msg.version
            )));
        }
        Ok(msg)
    }

    /// Extracts the extension payload; errors on other message types.
    pub fn extension_payload(&self) -> Result<ExtensionPayload, Error> {
        self.payload_as(MessageType::Extension)
    }

    /// Extracts the query payload; errors on other message types.
    pub fn query_payload(&self) -> Result<QueryPayload, Error> {
        self.payload_as(MessageType::Query)
    }

    /// Extracts the query-response payload; errors on other message types.
    pub fn query_response_payload(&self) -> Result<QueryResponsePayload, Error> {
        self.payload_as(MessageType::QueryResponse)
    }

    fn payload_as<P: for<'de> Deserialize<'de>>(&self, kind: MessageType) -> Result<P, Error> {
        if self.kind != kind {
            return Err(Error::InvalidEncoding(format!(
                "wrong message type {:?}, expected {kind:?}",
                self.kind
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl From<&Extension> for ExtensionPayload {
    fn from(ext: &Extension) -> Self {
        ExtensionPayload {
            parent_crypto: ext.parent.crypto,
            parent_semantic: ext.parent.semantic.clone(),
            new_data: ext.delta.clone(),
            new_crypto: ext.child.crypto,
            new_semantic: ext.child.semantic.clone(),
            timestamp: ext.timestamp,
            publisher: ext.publisher.clone(),
        }
    }
}

impl From<ExtensionPayload> for Extension {
    fn from(payload: ExtensionPayload) -> Self {
        Extension {
            parent: DualHash {
                crypto: payload.parent_crypto,
                semantic: payload.parent_semantic,
            },
            delta: payload.new_data,
            child: DualHash {
                crypto: payload.new_crypto,
                semantic: payload.new_semantic,
            },
            timestamp: payload.timestamp,
            publisher: payload.publisher,
        }
    }
}
