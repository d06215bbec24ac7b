use std::convert::TryFrom;

use rmpv::Value;
use serde::Serialize;

use crate::codec::util;
use crate::{Result, SerfClientError};

pub(crate) mod handshake;

const SEQ_FIELD: &str = "Seq";
const ERROR_FIELD: &str = "Error";

#[derive(Serialize, Eq, PartialEq, Debug)]
pub(crate) struct RequestHeader<'a> {
    #[serde(rename = "Command")]
    command: &'a str,
    #[serde(rename = "Seq")]
    seq: u64,
}

impl<'a> RequestHeader<'a> {
    pub(crate) fn new(command: &'a str, seq: u64) -> Self {
        RequestHeader { command, seq }
    }
}

pub(crate) fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    util::encode_to(&mut bytes, body)?;
    Ok(bytes)
}

/// Header object followed by the already encoded body object, if any.
pub(crate) fn encode_request(header: &RequestHeader, body: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    util::encode_to(&mut bytes, header)?;
    if let Some(body) = body {
        bytes.extend_from_slice(body);
    }
    Ok(bytes)
}

#[derive(Clone, PartialEq, Debug)]
pub struct ResponseHead {
    seq: u64,
    error: String,
    extra: Vec<(Value, Value)>,
}

impl ResponseHead {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Empty on success, otherwise the agent's description of the failure.
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Fields other than `Seq` and `Error`, in wire order.
    pub fn extra(&self) -> &[(Value, Value)] {
        &self.extra
    }
}

impl TryFrom<Value> for ResponseHead {
    type Error = SerfClientError;

    fn try_from(value: Value) -> Result<Self> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => {
                return Err(SerfClientError::InvalidResponse(format!("head is not a map: {}", other)))
            }
        };

        let mut seq = None;
        let mut error = String::new();
        let mut extra = Vec::new();
        for (key, value) in entries {
            if util::key_matches(&key, SEQ_FIELD) {
                seq = Some(value.as_u64().ok_or_else(|| {
                    SerfClientError::InvalidResponse(format!("head sequence is not an unsigned integer: {}", value))
                })?);
            } else if util::key_matches(&key, ERROR_FIELD) {
                error = match util::as_bytes(&value) {
                    Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    None if value.is_nil() => String::new(),
                    None => {
                        return Err(SerfClientError::InvalidResponse(format!("head error is not text: {}", value)))
                    }
                };
            } else {
                extra.push((key, value));
            }
        }

        let seq = seq.ok_or_else(|| SerfClientError::InvalidResponse("head has no sequence".to_string()))?;
        Ok(ResponseHead { seq, error, extra })
    }
}

/// Outcome of one call: the head and, when the command defines one, the body.
#[derive(Clone, PartialEq, Debug)]
pub struct Response {
    head: ResponseHead,
    body: Option<Value>,
}

impl Response {
    pub(crate) fn new(head: ResponseHead, body: Option<Value>) -> Self {
        Response { head, body }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Value> {
        self.body
    }

    /// Whether the agent reported success for the command.
    pub fn is_ok(&self) -> bool {
        self.head.error.is_empty()
    }

    /// Looks up a top-level field of the body.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|body| util::map_get(body, field))
    }
}
