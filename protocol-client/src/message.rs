use crate::error::ProtocolError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A command to send to the server.
///
/// `binary`, when present, is written as a separate binary frame right after
/// the JSON frame, and the JSON frame carries `"binary": true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub method: String,
    pub params: Value,
    pub binary: Option<Vec<u8>>,
    pub session_id: Option<String>,
    pub pause_id: Option<String>,
}

impl Command {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            binary: None,
            session_id: None,
            pause_id: None,
        }
    }

    pub fn with_binary(mut self, data: Vec<u8>) -> Self {
        self.binary = Some(data);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_pause_id(mut self, pause_id: impl Into<String>) -> Self {
        self.pause_id = Some(pause_id.into());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingFrame<'a> {
    pub id: i64,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_id: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub binary: bool,
}

impl<'a> OutgoingFrame<'a> {
    pub(crate) fn new(id: i64, command: &'a Command) -> Self {
        Self {
            id,
            method: &command.method,
            params: &command.params,
            session_id: command.session_id.as_deref(),
            pause_id: command.pause_id.as_deref(),
            binary: command.binary.is_some(),
        }
    }
}

/// Every text frame the server sends is one of these.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IncomingMessage {
    Response { id: i64, result: Value },
    Error { id: i64, error: ProtocolError },
    Event { method: String, params: Value },
}

#[derive(Deserialize)]
struct RawFrame {
    id: Option<i64>,
    result: Option<Value>,
    error: Option<ProtocolError>,
    method: Option<String>,
    params: Option<Value>,
}

pub(crate) fn parse_incoming(text: &str) -> Result<IncomingMessage, String> {
    let frame: RawFrame = serde_json::from_str(text).map_err(|err| err.to_string())?;
    match frame {
        RawFrame {
            id: Some(id),
            error: Some(error),
            ..
        } => Ok(IncomingMessage::Error { id, error }),
        RawFrame {
            id: Some(id),
            result,
            ..
        } => Ok(IncomingMessage::Response {
            id,
            result: result.unwrap_or(Value::Null),
        }),
        RawFrame {
            id: None,
            method: Some(method),
            params,
            ..
        } => Ok(IncomingMessage::Event {
            method,
            params: params.unwrap_or(Value::Null),
        }),
        RawFrame { .. } => Err("frame has neither an id nor a method".to_string()),
    }
}
