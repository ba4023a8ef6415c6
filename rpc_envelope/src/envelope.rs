//! Request and response envelopes

use crate::error::{EnvelopeError, RemoteError};
use crate::transport::WirePayload;
use rpc_types::{CallId, ChannelName, SenderId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound call, as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Unique per sender while the call is outstanding
    pub call_id: CallId,
    /// Method to invoke on the peer
    pub method_name: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Endpoint that issued the call
    pub sender_id: SenderId,
    /// Logical RPC instance the call belongs to
    pub channel: ChannelName,
    /// Milliseconds since the Unix epoch when the call was built
    #[serde(default)]
    pub created_at: u64,
}

impl RequestEnvelope {
    pub fn new(
        call_id: CallId,
        method_name: impl Into<String>,
        args: Vec<Value>,
        sender_id: SenderId,
        channel: ChannelName,
        created_at: u64,
    ) -> Self {
        Self {
            call_id,
            method_name: method_name.into(),
            args,
            sender_id,
            channel,
            created_at,
        }
    }
}

/// Result half of a response: exactly one of `result` / `error` on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    Result(Value),
    Error(RemoteError),
}

/// Answer to a request, correlated by `call_id`
///
/// Serializes only; inbound payloads go through [`Envelope::from_payload`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub call_id: CallId,
    pub channel: ChannelName,
    /// Endpoint that produced the response
    pub sender_id: SenderId,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
    /// Intermediate update; the call stays outstanding
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_progress: bool,
}

impl ResponseEnvelope {
    /// Builds a final successful response
    pub fn result(call_id: CallId, channel: ChannelName, sender_id: SenderId, value: Value) -> Self {
        Self {
            call_id,
            channel,
            sender_id,
            outcome: ResponseOutcome::Result(value),
            is_progress: false,
        }
    }

    /// Builds a final error response
    pub fn error(
        call_id: CallId,
        channel: ChannelName,
        sender_id: SenderId,
        error: RemoteError,
    ) -> Self {
        Self {
            call_id,
            channel,
            sender_id,
            outcome: ResponseOutcome::Error(error),
            is_progress: false,
        }
    }

    /// Builds a progress update
    pub fn progress(
        call_id: CallId,
        channel: ChannelName,
        sender_id: SenderId,
        value: Value,
    ) -> Self {
        Self {
            call_id,
            channel,
            sender_id,
            outcome: ResponseOutcome::Result(value),
            is_progress: true,
        }
    }

    /// Returns the error body, if this is an error response
    pub fn error_body(&self) -> Option<&RemoteError> {
        match &self.outcome {
            ResponseOutcome::Error(error) => Some(error),
            ResponseOutcome::Result(_) => None,
        }
    }

    /// Returns the result value, if this is a successful response
    pub fn result_value(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(value) => Some(value),
            ResponseOutcome::Error(_) => None,
        }
    }
}

/// Either kind of envelope, after structural validation
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
}

impl Envelope {
    /// Structurally validates a raw payload
    ///
    /// A valid payload is an object with string `callId`, `channel` and
    /// `senderId`, plus either `methodName` and `args` (request) or exactly one
    /// of `result` / `error` (response).
    pub fn from_payload(payload: &WirePayload) -> Result<Self, EnvelopeError> {
        let map = payload.as_object().ok_or(EnvelopeError::NotAnObject)?;

        let call_id = required_str(map, "callId")?;
        if call_id.is_empty() {
            return Err(EnvelopeError::MissingField("callId"));
        }
        let channel = required_str(map, "channel")?;
        let sender_id = required_str(map, "senderId")?;

        let is_request = map.contains_key("methodName");
        let has_result = map.contains_key("result");
        let has_error = map.contains_key("error");

        if is_request {
            if has_result || has_error {
                return Err(EnvelopeError::Ambiguous);
            }
            let method_name = required_str(map, "methodName")?;
            if method_name.is_empty() {
                return Err(EnvelopeError::MissingField("methodName"));
            }
            let args = match map.get("args") {
                Some(Value::Array(args)) => args.clone(),
                Some(_) => return Err(EnvelopeError::WrongType("args")),
                None => return Err(EnvelopeError::MissingField("args")),
            };
            let created_at = match map.get("createdAt") {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_u64().ok_or(EnvelopeError::WrongType("createdAt"))?,
            };
            return Ok(Envelope::Request(RequestEnvelope {
                call_id: CallId::from_string(call_id),
                method_name: method_name.to_string(),
                args,
                sender_id: SenderId::new(sender_id),
                channel: ChannelName::new(channel),
                created_at,
            }));
        }

        let outcome = match (has_result, has_error) {
            (true, true) => return Err(EnvelopeError::Ambiguous),
            (false, false) => return Err(EnvelopeError::NotAnEnvelope),
            (true, false) => ResponseOutcome::Result(map["result"].clone()),
            (false, true) => {
                let error: RemoteError = serde_json::from_value(map["error"].clone())
                    .map_err(|_| EnvelopeError::WrongType("error"))?;
                ResponseOutcome::Error(error)
            }
        };
        let is_progress = match map.get("isProgress") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(EnvelopeError::WrongType("isProgress")),
        };

        Ok(Envelope::Response(ResponseEnvelope {
            call_id: CallId::from_string(call_id),
            channel: ChannelName::new(channel),
            sender_id: SenderId::new(sender_id),
            outcome,
            is_progress,
        }))
    }

    /// Converts the envelope into a plain serializable payload
    pub fn to_payload(&self) -> WirePayload {
        match self {
            Envelope::Request(request) => serde_json::to_value(request),
            Envelope::Response(response) => serde_json::to_value(response),
        }
        .unwrap_or(Value::Null)
    }

    pub fn call_id(&self) -> &CallId {
        match self {
            Envelope::Request(request) => &request.call_id,
            Envelope::Response(response) => &response.call_id,
        }
    }

    pub fn channel(&self) -> &ChannelName {
        match self {
            Envelope::Request(request) => &request.channel,
            Envelope::Response(response) => &response.channel,
        }
    }

    pub fn sender_id(&self) -> &SenderId {
        match self {
            Envelope::Request(request) => &request.sender_id,
            Envelope::Response(response) => &response.sender_id,
        }
    }

    /// Checks if this is a response to another message
    pub fn is_response(&self) -> bool {
        matches!(self, Envelope::Response(_))
    }
}

impl From<RequestEnvelope> for Envelope {
    fn from(request: RequestEnvelope) -> Self {
        Envelope::Request(request)
    }
}

impl From<ResponseEnvelope> for Envelope {
    fn from(response: ResponseEnvelope) -> Self {
        Envelope::Response(response)
    }
}

fn required_str<'a>(map: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, EnvelopeError> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(EnvelopeError::WrongType(field)),
        None => Err(EnvelopeError::MissingField(field)),
    }
}
