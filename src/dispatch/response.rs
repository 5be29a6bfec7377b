//! Response Encoder
//!
//! Builds the outbound envelope: status, body, content-type header map.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};

use crate::envelope::{layout, Builder, EnvelopeResult, Message};

use super::errors::BridgeError;

const JSON_HEADERS: &[u8] = br#"{"Content-Type":["application/json"]}"#;
const NDJSON_HEADERS: &[u8] = br#"{"Content-Type":["application/x-ndjson"]}"#;

/// Body encoding of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    NdJson,
}

impl ContentType {
    /// Serialized header map for the response envelope
    pub fn header_map(&self) -> &'static [u8] {
        match self {
            Self::Json => JSON_HEADERS,
            Self::NdJson => NDJSON_HEADERS,
        }
    }

    /// MIME type
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::NdJson => "application/x-ndjson",
        }
    }

    fn from_header_map(raw: &[u8]) -> Self {
        if raw == NDJSON_HEADERS {
            Self::NdJson
        } else {
            Self::Json
        }
    }
}

/// An adapter reply, before envelope encoding
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: u16,
    body: Bytes,
    content_type: ContentType,
}

impl Reply {
    /// JSON-encode `data` with the given status
    pub fn json<T: Serialize + ?Sized>(status: u16, data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(body) => Self::raw(status, Bytes::from(body), ContentType::Json),
            Err(e) => Self::error(500, format!("response encoding failed: {}", e)),
        }
    }

    /// 200 with a JSON body
    pub fn ok<T: Serialize + ?Sized>(data: &T) -> Self {
        Self::json(200, data)
    }

    /// Already-serialized body; no re-encode
    pub fn raw(status: u16, body: Bytes, content_type: ContentType) -> Self {
        Self {
            status,
            body,
            content_type,
        }
    }

    /// `{"error": message}` with the given status
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = json!({ "error": message.into() });
        Self::raw(status, Bytes::from(body.to_string()), ContentType::Json)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Parse the body as a single JSON value
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Encode as a response envelope
    pub fn to_message(&self) -> Message {
        let headers = self.content_type.header_map();
        let mut builder = Builder::new(64 + self.body.len() + headers.len());
        let mut object = builder.start_object(layout::RESPONSE_SIZE);
        object.set_u32(layout::RESPONSE_STATUS, u32::from(self.status));
        object.set_bytes(layout::RESPONSE_BODY, &self.body);
        object.set_bytes(layout::RESPONSE_HEADERS, headers);
        object.finish_as_root();
        builder.finish()
    }

    /// Decode a response envelope (client side)
    pub fn from_message(msg: &Message) -> EnvelopeResult<Self> {
        let root = msg.root();
        let status = root.uint32(layout::RESPONSE_STATUS)?;
        let body = root.bytes_shared(layout::RESPONSE_BODY)?;
        let headers = root.bytes(layout::RESPONSE_HEADERS)?;
        Ok(Self {
            status: u16::try_from(status).unwrap_or(u16::MAX),
            body,
            content_type: ContentType::from_header_map(headers),
        })
    }
}

impl From<BridgeError> for Reply {
    fn from(err: BridgeError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }
}
