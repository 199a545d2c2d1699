//! Device roles.
//!
//! A convoy has two vehicles with two displays each. The relay hands out the
//! four slots in [`DeviceRole::PRIORITY`] order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Vehicle in the convoy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleId {
    /// Lead vehicle, the one whose driver display runs the simulation.
    #[serde(rename = "car1")]
    Lead,
    #[serde(rename = "car2")]
    Trailing,
}

impl VehicleId {
    /// Wire name of the vehicle.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "car1",
            Self::Trailing => "car2",
        }
    }
}

/// Display position inside a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Main,
    Rear,
}

impl Seat {
    /// Wire name of the seat.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Rear => "rear",
        }
    }
}

/// One of the four device slots, serialized as `car<N>-<seat>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceRole {
    /// Vehicle the device sits in.
    pub vehicle: VehicleId,
    /// Seat within the vehicle.
    pub seat: Seat,
}

impl DeviceRole {
    /// Main display of the lead vehicle.
    pub const LEAD_MAIN: Self = Self::new(VehicleId::Lead, Seat::Main);
    /// Rear seat of the lead vehicle.
    pub const LEAD_REAR: Self = Self::new(VehicleId::Lead, Seat::Rear);
    /// Main display of the trailing vehicle.
    pub const TRAILING_MAIN: Self = Self::new(VehicleId::Trailing, Seat::Main);
    /// Rear seat of the trailing vehicle.
    pub const TRAILING_REAR: Self = Self::new(VehicleId::Trailing, Seat::Rear);

    /// Slot assignment order used by the relay.
    pub const PRIORITY: [Self; 4] = [
        Self::LEAD_MAIN,
        Self::LEAD_REAR,
        Self::TRAILING_MAIN,
        Self::TRAILING_REAR,
    ];

    /// Create a role from vehicle and seat.
    pub const fn new(vehicle: VehicleId, seat: Seat) -> Self {
        Self { vehicle, seat }
    }

    /// Check whether this is a main display.
    pub fn is_main(self) -> bool {
        self.seat == Seat::Main
    }

    /// Check whether this is a rear seat.
    pub fn is_rear(self) -> bool {
        self.seat == Seat::Rear
    }

    /// Check whether both roles sit in the same vehicle.
    pub fn same_vehicle(self, other: Self) -> bool {
        self.vehicle == other.vehicle
    }

    /// The other display of the same vehicle.
    pub fn sibling(self) -> Self {
        let seat = match self.seat {
            Seat::Main => Seat::Rear,
            Seat::Rear => Seat::Main,
        };
        Self::new(self.vehicle, seat)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.vehicle.as_str(), self.seat.as_str())
    }
}

impl FromStr for DeviceRole {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vehicle, seat) = s
            .split_once('-')
            .ok_or_else(|| SchemaError::InvalidRole(s.to_string()))?;
        let vehicle = match vehicle {
            "car1" => VehicleId::Lead,
            "car2" => VehicleId::Trailing,
            _ => return Err(SchemaError::InvalidRole(s.to_string())),
        };
        let seat = match seat {
            "main" => Seat::Main,
            "rear" => Seat::Rear,
            _ => return Err(SchemaError::InvalidRole(s.to_string())),
        };
        Ok(Self::new(vehicle, seat))
    }
}

impl TryFrom<String> for DeviceRole {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceRole> for String {
    fn from(role: DeviceRole) -> Self {
        role.to_string()
    }
}

/// Sender of a message as written in the `deviceRole` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOrigin {
    /// Relay-generated message.
    Server,
    /// Device that has not been assigned a role yet.
    Unassigned,
    Device(DeviceRole),
}

impl MessageOrigin {
    /// Device role of the sender, if it is a device.
    pub fn device(self) -> Option<DeviceRole> {
        match self {
            Self::Device(role) => Some(role),
            Self::Server | Self::Unassigned => None,
        }
    }
}

impl From<DeviceRole> for MessageOrigin {
    fn from(role: DeviceRole) -> Self {
        Self::Device(role)
    }
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Unassigned => f.write_str("unassigned"),
            Self::Device(role) => role.fmt(f),
        }
    }
}

impl FromStr for MessageOrigin {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Self::Server),
            "" | "unassigned" | "unknown" => Ok(Self::Unassigned),
            other => other.parse().map(Self::Device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_role_string_round_trip() -> TestResult {
        for role in DeviceRole::PRIORITY {
            let parsed: DeviceRole = role.to_string().parse()?;
            assert_eq!(parsed, role);
        }
        assert_eq!(DeviceRole::TRAILING_REAR.to_string(), "car2-rear");
        Ok(())
    }

    #[test]
    fn test_role_rejects_unknown_strings() {
        assert!("car3-main".parse::<DeviceRole>().is_err());
        assert!("car1-front".parse::<DeviceRole>().is_err());
        assert!("car1main".parse::<DeviceRole>().is_err());
    }

    #[test]
    fn test_role_serializes_as_string() -> TestResult {
        let json = serde_json::to_string(&DeviceRole::LEAD_REAR)?;
        assert_eq!(json, "\"car1-rear\"");
        let back: DeviceRole = serde_json::from_str(&json)?;
        assert_eq!(back, DeviceRole::LEAD_REAR);
        Ok(())
    }

    #[test]
    fn test_sibling_stays_in_vehicle() {
        assert_eq!(DeviceRole::LEAD_MAIN.sibling(), DeviceRole::LEAD_REAR);
        assert_eq!(DeviceRole::TRAILING_REAR.sibling(), DeviceRole::TRAILING_MAIN);
    }

    #[test]
    fn test_origin_parsing() -> TestResult {
        assert_eq!("server".parse::<MessageOrigin>()?, MessageOrigin::Server);
        assert_eq!(
            "car2-main".parse::<MessageOrigin>()?,
            MessageOrigin::Device(DeviceRole::TRAILING_MAIN)
        );
        assert_eq!("unknown".parse::<MessageOrigin>()?, MessageOrigin::Unassigned);
        Ok(())
    }
}
