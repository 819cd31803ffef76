//! Wire shape of control messages exchanged with web clients.
//!
//! Inbound messages are JSON objects with exactly these fields:
//!
//! ```text
//! {"simtype" : "event", "type" : "system.control.start", "parameters" : null, "attributes" : null}
//! ```
//!
//! `parameters` and `attributes` are either `null` or an object and are
//! never interpreted here.

use crate::channel::{ControlEvent, ControlKind, Payload, SimulationState};
use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Value of the `simtype` field for every control message
pub const SIMTYPE_EVENT: &str = "event";

pub const START_TYPE: &str = "system.control.start";
pub const SHUTDOWN_TYPE: &str = "system.control.shutdown";
pub const PAUSE_TYPE: &str = "system.control.pause";

impl ControlKind {
    /// The `type` field value for this kind
    pub fn wire_type(self) -> &'static str {
        match self {
            ControlKind::Start => START_TYPE,
            ControlKind::Pause => PAUSE_TYPE,
            ControlKind::Shutdown => SHUTDOWN_TYPE,
        }
    }

    pub fn from_wire_type(value: &str) -> Option<Self> {
        match value {
            START_TYPE => Some(ControlKind::Start),
            PAUSE_TYPE => Some(ControlKind::Pause),
            SHUTDOWN_TYPE => Some(ControlKind::Shutdown),
            _ => None,
        }
    }
}

/// A control message as it travels between sender and channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ControlMessage {
    pub simtype: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub parameters: Option<Payload>,
    pub attributes: Option<Payload>,
}

impl ControlMessage {
    pub fn for_kind(kind: ControlKind) -> Self {
        Self {
            simtype: SIMTYPE_EVENT.to_string(),
            event_type: kind.wire_type().to_string(),
            parameters: None,
            attributes: None,
        }
    }

    pub fn start() -> Self {
        Self::for_kind(ControlKind::Start)
    }

    pub fn shutdown() -> Self {
        Self::for_kind(ControlKind::Shutdown)
    }

    pub fn pause() -> Self {
        Self::for_kind(ControlKind::Pause)
    }

    /// Decode one JSON message, rejecting anything that deviates from the
    /// wire shape.
    pub fn parse(input: &str) -> Result<Self, ControlError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| ControlError::malformed(format!("invalid JSON: {}", e)))?;
        Self::try_from(value)
    }
}

impl TryFrom<Value> for ControlMessage {
    type Error = ControlError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(ControlError::malformed(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let simtype = take_string(&mut object, "simtype")?;
        let event_type = take_string(&mut object, "type")?;
        let parameters = take_payload(&mut object, "parameters")?;
        let attributes = take_payload(&mut object, "attributes")?;

        let message = Self {
            simtype,
            event_type,
            parameters,
            attributes,
        };
        message.kind()?;
        Ok(message)
    }
}

impl ControlMessage {
    /// Validate the header fields and resolve the control kind
    pub fn kind(&self) -> Result<ControlKind, ControlError> {
        if self.simtype != SIMTYPE_EVENT {
            return Err(ControlError::malformed(format!(
                "unsupported simtype '{}'",
                self.simtype
            )));
        }

        ControlKind::from_wire_type(&self.event_type).ok_or_else(|| {
            ControlError::malformed(format!("unknown control type '{}'", self.event_type))
        })
    }

    /// Convert into a control event, validating the header
    pub fn into_event(self) -> Result<ControlEvent, ControlError> {
        let mut event = ControlEvent::new(self.kind()?);
        if let Some(parameters) = self.parameters {
            event = event.with_parameters(parameters);
        }
        if let Some(attributes) = self.attributes {
            event = event.with_attributes(attributes);
        }
        Ok(event)
    }

    /// Render in the legacy spacing used by existing web clients
    pub fn to_wire_string(&self) -> String {
        format!(
            r#"{{"simtype" : {}, "type" : {}, "parameters" : {}, "attributes" : {}}}"#,
            Value::String(self.simtype.clone()),
            Value::String(self.event_type.clone()),
            payload_json(&self.parameters),
            payload_json(&self.attributes),
        )
    }
}

impl From<&ControlEvent> for ControlMessage {
    fn from(event: &ControlEvent) -> Self {
        Self {
            parameters: event.parameters().cloned(),
            attributes: event.attributes().cloned(),
            ..Self::for_kind(event.kind())
        }
    }
}

impl TryFrom<ControlMessage> for ControlEvent {
    type Error = ControlError;

    fn try_from(message: ControlMessage) -> Result<Self, Self::Error> {
        message.into_event()
    }
}

impl FromStr for ControlMessage {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn take_string(
    object: &mut serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, ControlError> {
    match object.remove(field) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ControlError::malformed(format!(
            "field '{}' must be a string, got {}",
            field,
            json_kind(&other)
        ))),
        None => Err(ControlError::malformed(format!("missing field '{}'", field))),
    }
}

fn take_payload(
    object: &mut serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<Payload>, ControlError> {
    match object.remove(field) {
        Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(ControlError::malformed(format!(
            "field '{}' must be null or an object, got {}",
            field,
            json_kind(&other)
        ))),
        None => Err(ControlError::malformed(format!("missing field '{}'", field))),
    }
}

fn payload_json(payload: &Option<Payload>) -> Value {
    match payload {
        Some(map) => Value::Object(map.clone()),
        None => Value::Null,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Outbound answer to a single control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    pub state: SimulationState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ReplyError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: String,
    pub reason: String,
}

impl ControlReply {
    pub fn accepted(state: SimulationState) -> Self {
        Self {
            ok: true,
            state,
            error: None,
        }
    }

    /// Reply for a rejected event; `state` is the unchanged current state
    pub fn rejected(state: SimulationState, error: &ControlError) -> Self {
        Self {
            ok: false,
            state,
            error: Some(ReplyError {
                kind: error.kind().to_string(),
                reason: error.to_string(),
            }),
        }
    }
}
