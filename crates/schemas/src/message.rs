//! Convoy wire messages.
//!
//! Every message travels as a JSON object `{type, deviceRole, timestamp, data}`.
//! [`ConvoyMessage`] is the validated form: the `type` tag is a closed
//! [`MessageType`] and `data` has been decoded into the matching [`Payload`]
//! variant.

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::{
    ChatHistory, Location, NavigationInfo, NavigationStateUpdate, Place, RangeUpdate, Register,
    RoleAssigned, RoleRejected, StopRequest, StopRequestRef, WaypointAdded, Weather,
};
use crate::role::{DeviceRole, MessageOrigin};
use crate::route::Route;
use crate::snapshot::{ConvoySnapshot, VehicleStateUpdate};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Which connections a relayed message is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageScope {
    /// Other displays of the sender's vehicle.
    Vehicle,
    /// Every other connection.
    Convoy,
    /// Exchanged between a device and the relay only.
    Relay,
}

/// Closed set of message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Location,
    Destination,
    Waypoints,
    Route,
    NavigationState,
    NavigationInfo,
    Range,
    Weather,
    ChatHistory,
    RequestAddWaypoint,
    WaypointAdded,
    StopRequestDeclined,
    StopRequestCancelled,
    ResumeNavigation,
    Register,
    RoleAssigned,
    RoleRejected,
    ConvoyState,
    VehicleState,
}

impl MessageType {
    /// Every message type.
    pub const ALL: [Self; 19] = [
        Self::Location,
        Self::Destination,
        Self::Waypoints,
        Self::Route,
        Self::NavigationState,
        Self::NavigationInfo,
        Self::Range,
        Self::Weather,
        Self::ChatHistory,
        Self::RequestAddWaypoint,
        Self::WaypointAdded,
        Self::StopRequestDeclined,
        Self::StopRequestCancelled,
        Self::ResumeNavigation,
        Self::Register,
        Self::RoleAssigned,
        Self::RoleRejected,
        Self::ConvoyState,
        Self::VehicleState,
    ];

    /// Wire name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Destination => "destination",
            Self::Waypoints => "waypoints",
            Self::Route => "route",
            Self::NavigationState => "navigation_state",
            Self::NavigationInfo => "navigation_info",
            Self::Range => "range",
            Self::Weather => "weather",
            Self::ChatHistory => "chat_history",
            Self::RequestAddWaypoint => "request_add_waypoint",
            Self::WaypointAdded => "waypoint_added",
            Self::StopRequestDeclined => "stop_request_declined",
            Self::StopRequestCancelled => "stop_request_cancelled",
            Self::ResumeNavigation => "resume_navigation",
            Self::Register => "register",
            Self::RoleAssigned => "role_assigned",
            Self::RoleRejected => "role_rejected",
            Self::ConvoyState => "convoy_state",
            Self::VehicleState => "vehicle_state",
        }
    }

    /// Which devices receive messages of this type.
    pub fn scope(self) -> MessageScope {
        match self {
            Self::Location | Self::Range | Self::ChatHistory => MessageScope::Vehicle,
            Self::Destination
            | Self::Waypoints
            | Self::Route
            | Self::NavigationState
            | Self::NavigationInfo
            | Self::Weather
            | Self::RequestAddWaypoint
            | Self::WaypointAdded
            | Self::StopRequestDeclined
            | Self::StopRequestCancelled
            | Self::ResumeNavigation => MessageScope::Convoy,
            Self::Register
            | Self::RoleAssigned
            | Self::RoleRejected
            | Self::ConvoyState
            | Self::VehicleState => MessageScope::Relay,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

/// Decoded `data` field, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Location(Location),
    Destination(Place),
    Waypoints(Vec<Place>),
    Route(Box<Route>),
    NavigationState(NavigationStateUpdate),
    NavigationInfo(NavigationInfo),
    Range(RangeUpdate),
    Weather(Weather),
    ChatHistory(ChatHistory),
    RequestAddWaypoint(StopRequest),
    WaypointAdded(WaypointAdded),
    StopRequestDeclined(StopRequestRef),
    StopRequestCancelled(StopRequestRef),
    ResumeNavigation,
    Register(Register),
    RoleAssigned(RoleAssigned),
    RoleRejected(RoleRejected),
    ConvoyState(Box<ConvoySnapshot>),
    VehicleState(Box<VehicleStateUpdate>),
}

impl Payload {
    /// Message type of this payload.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Location(_) => MessageType::Location,
            Self::Destination(_) => MessageType::Destination,
            Self::Waypoints(_) => MessageType::Waypoints,
            Self::Route(_) => MessageType::Route,
            Self::NavigationState(_) => MessageType::NavigationState,
            Self::NavigationInfo(_) => MessageType::NavigationInfo,
            Self::Range(_) => MessageType::Range,
            Self::Weather(_) => MessageType::Weather,
            Self::ChatHistory(_) => MessageType::ChatHistory,
            Self::RequestAddWaypoint(_) => MessageType::RequestAddWaypoint,
            Self::WaypointAdded(_) => MessageType::WaypointAdded,
            Self::StopRequestDeclined(_) => MessageType::StopRequestDeclined,
            Self::StopRequestCancelled(_) => MessageType::StopRequestCancelled,
            Self::ResumeNavigation => MessageType::ResumeNavigation,
            Self::Register(_) => MessageType::Register,
            Self::RoleAssigned(_) => MessageType::RoleAssigned,
            Self::RoleRejected(_) => MessageType::RoleRejected,
            Self::ConvoyState(_) => MessageType::ConvoyState,
            Self::VehicleState(_) => MessageType::VehicleState,
        }
    }

    /// Encode as the JSON value placed in the `data` field.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Location(v) => serde_json::to_value(v),
            Self::Destination(v) => serde_json::to_value(v),
            Self::Waypoints(v) => serde_json::to_value(v),
            Self::Route(v) => serde_json::to_value(v),
            Self::NavigationState(v) => serde_json::to_value(v),
            Self::NavigationInfo(v) => serde_json::to_value(v),
            Self::Range(v) => serde_json::to_value(v),
            Self::Weather(v) => serde_json::to_value(v),
            Self::ChatHistory(v) => serde_json::to_value(v),
            Self::RequestAddWaypoint(v) => serde_json::to_value(v),
            Self::WaypointAdded(v) => serde_json::to_value(v),
            Self::StopRequestDeclined(v) | Self::StopRequestCancelled(v) => {
                serde_json::to_value(v)
            }
            Self::ResumeNavigation => Ok(Value::Object(serde_json::Map::new())),
            Self::Register(v) => serde_json::to_value(v),
            Self::RoleAssigned(v) => serde_json::to_value(v),
            Self::RoleRejected(v) => serde_json::to_value(v),
            Self::ConvoyState(v) => serde_json::to_value(v),
            Self::VehicleState(v) => serde_json::to_value(v),
        }
    }

    /// Decode a `data` value for the given tag.
    pub fn from_data(kind: MessageType, data: Value) -> ProtocolResult<Self> {
        let data = match data {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        let invalid = |source| ProtocolError::InvalidPayload { kind, source };
        let payload = match kind {
            MessageType::Location => Self::Location(serde_json::from_value(data).map_err(invalid)?),
            MessageType::Destination => {
                Self::Destination(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::Waypoints => {
                Self::Waypoints(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::Route => Self::Route(serde_json::from_value(data).map_err(invalid)?),
            MessageType::NavigationState => {
                Self::NavigationState(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::NavigationInfo => {
                Self::NavigationInfo(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::Range => Self::Range(serde_json::from_value(data).map_err(invalid)?),
            MessageType::Weather => Self::Weather(serde_json::from_value(data).map_err(invalid)?),
            MessageType::ChatHistory => {
                Self::ChatHistory(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::RequestAddWaypoint => {
                Self::RequestAddWaypoint(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::WaypointAdded => {
                Self::WaypointAdded(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::StopRequestDeclined => {
                Self::StopRequestDeclined(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::StopRequestCancelled => {
                Self::StopRequestCancelled(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::ResumeNavigation => Self::ResumeNavigation,
            MessageType::Register => Self::Register(serde_json::from_value(data).map_err(invalid)?),
            MessageType::RoleAssigned => {
                Self::RoleAssigned(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::RoleRejected => {
                Self::RoleRejected(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::ConvoyState => {
                Self::ConvoyState(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageType::VehicleState => {
                Self::VehicleState(serde_json::from_value(data).map_err(invalid)?)
            }
        };
        Ok(payload)
    }
}

/// Untyped wire form, the shape every transport carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    /// Message type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender role in wire form.
    #[serde(default)]
    pub device_role: Option<String>,
    /// Send time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// Validated convoy message.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvoyMessage {
    /// Who sent the message.
    pub origin: MessageOrigin,
    /// Epoch milliseconds at the sender.
    pub timestamp: i64,
    /// Typed payload.
    pub payload: Payload,
}

impl ConvoyMessage {
    /// Create a message stamped with the current time.
    pub fn new(origin: MessageOrigin, payload: Payload) -> Self {
        Self {
            origin,
            timestamp: now_millis(),
            payload,
        }
    }

    /// Create a message sent by a device.
    pub fn from_device(role: DeviceRole, payload: Payload) -> Self {
        Self::new(MessageOrigin::Device(role), payload)
    }

    /// Create a message sent by the relay.
    pub fn from_relay(payload: Payload) -> Self {
        Self::new(MessageOrigin::Server, payload)
    }

    /// Message type of the payload.
    pub fn kind(&self) -> MessageType {
        self.payload.kind()
    }

    /// Device that sent the message, if any.
    pub fn sender(&self) -> Option<DeviceRole> {
        self.origin.device()
    }

    /// Convert into the untyped wire envelope.
    pub fn to_envelope(&self) -> Result<WireEnvelope, serde_json::Error> {
        Ok(WireEnvelope {
            kind: self.kind().as_str().to_string(),
            device_role: Some(self.origin.to_string()),
            timestamp: Some(self.timestamp),
            data: self.payload.to_data()?,
        })
    }

    /// Validate an envelope into a typed message.
    pub fn from_envelope(envelope: WireEnvelope) -> ProtocolResult<Self> {
        let kind: MessageType = envelope.kind.parse()?;
        let origin = match envelope.device_role.as_deref() {
            Some(role) => role.parse()?,
            None => MessageOrigin::Unassigned,
        };
        let payload = Payload::from_data(kind, envelope.data)?;
        Ok(Self {
            origin,
            timestamp: envelope.timestamp.unwrap_or_default(),
            payload,
        })
    }

    /// Encode to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let envelope: WireEnvelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    /// Decode an already parsed JSON value.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let envelope: WireEnvelope = serde_json::from_value(value)?;
        Self::from_envelope(envelope)
    }
}

impl Serialize for ConvoyMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.payload.to_data().map_err(S::Error::custom)?;
        let mut state = serializer.serialize_struct("ConvoyMessage", 4)?;
        state.serialize_field("type", self.kind().as_str())?;
        state.serialize_field("deviceRole", &self.origin.to_string())?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("data", &data)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ConvoyMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = WireEnvelope::deserialize(deserializer)?;
        Self::from_envelope(envelope).map_err(D::Error::custom)
    }
}
