//! Role replication rules.
//!
//! Every decision is a lookup in [`RULES`]: the receiving device's class, how
//! the sender relates to it, and the message type. Anything not listed is
//! ignored, so a new message type is inert until a rule names it.

use convoy_schemas::{DeviceRole, MessageOrigin, MessageType, Seat, VehicleId};
use serde::{Deserialize, Serialize};

/// What the receiving device does with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Overwrite local state with the payload.
    Apply,
    /// Apply only while the receiver has no trip of its own.
    ApplyWhenIdle,
    /// Ask the user, auto-accepting at the deadline.
    Prompt,
    /// Ask the user while a trip is active, otherwise append directly.
    PromptWhenActive,
    /// Settle one of our own pending stop requests.
    Resolve,
    /// Withdraw an open prompt.
    Withdraw,
    Ignore,
}

/// Kind of receiver a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverClass {
    /// Driver display of the lead vehicle, the trip authority.
    LeadMain,
    TrailingMain,
    /// Any rear display.
    Rear,
}

impl ReceiverClass {
    /// Classify a device role.
    pub fn of(role: DeviceRole) -> Self {
        match (role.vehicle, role.seat) {
            (VehicleId::Lead, Seat::Main) => ReceiverClass::LeadMain,
            (VehicleId::Trailing, Seat::Main) => ReceiverClass::TrailingMain,
            (_, Seat::Rear) => ReceiverClass::Rear,
        }
    }
}

/// Sender as seen from the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRelation {
    OwnMain,
    OwnRear,
    OtherMain,
    OtherRear,
    Relay,
    /// Unassigned sender or our own echo.
    Unknown,
}

impl SenderRelation {
    /// How the sender of a message relates to the receiver.
    pub fn between(receiver: DeviceRole, origin: MessageOrigin) -> Self {
        match origin {
            MessageOrigin::Server => SenderRelation::Relay,
            MessageOrigin::Unassigned => SenderRelation::Unknown,
            MessageOrigin::Device(sender) if sender == receiver => SenderRelation::Unknown,
            MessageOrigin::Device(sender) => match (sender.same_vehicle(receiver), sender.seat) {
                (true, Seat::Main) => SenderRelation::OwnMain,
                (true, Seat::Rear) => SenderRelation::OwnRear,
                (false, Seat::Main) => SenderRelation::OtherMain,
                (false, Seat::Rear) => SenderRelation::OtherRear,
            },
        }
    }
}

struct Rule {
    receiver: ReceiverClass,
    from: SenderRelation,
    kinds: &'static [MessageType],
    action: Action,
}

const RULES: &[Rule] = &[
    // Rear displays mirror their own main display.
    Rule {
        receiver: ReceiverClass::Rear,
        from: SenderRelation::OwnMain,
        kinds: &[
            MessageType::Location,
            MessageType::Destination,
            MessageType::Waypoints,
            MessageType::Route,
            MessageType::NavigationState,
            MessageType::NavigationInfo,
            MessageType::Range,
            MessageType::Weather,
            MessageType::ChatHistory,
            MessageType::ResumeNavigation,
        ],
        action: Action::Apply,
    },
    Rule {
        receiver: ReceiverClass::Rear,
        from: SenderRelation::OwnMain,
        kinds: &[MessageType::WaypointAdded, MessageType::StopRequestDeclined],
        action: Action::Resolve,
    },
    Rule {
        receiver: ReceiverClass::Rear,
        from: SenderRelation::Relay,
        kinds: &[MessageType::ConvoyState, MessageType::VehicleState],
        action: Action::Apply,
    },
    // Main displays confirm stops requested from their own rear seat.
    Rule {
        receiver: ReceiverClass::LeadMain,
        from: SenderRelation::OwnRear,
        kinds: &[MessageType::RequestAddWaypoint],
        action: Action::Prompt,
    },
    Rule {
        receiver: ReceiverClass::LeadMain,
        from: SenderRelation::OwnRear,
        kinds: &[MessageType::StopRequestCancelled],
        action: Action::Withdraw,
    },
    Rule {
        receiver: ReceiverClass::TrailingMain,
        from: SenderRelation::OwnRear,
        kinds: &[MessageType::RequestAddWaypoint],
        action: Action::Prompt,
    },
    Rule {
        receiver: ReceiverClass::TrailingMain,
        from: SenderRelation::OwnRear,
        kinds: &[MessageType::StopRequestCancelled],
        action: Action::Withdraw,
    },
    // The trailing vehicle follows the lead's trip without losing its own.
    Rule {
        receiver: ReceiverClass::TrailingMain,
        from: SenderRelation::OtherMain,
        kinds: &[MessageType::Destination, MessageType::Waypoints],
        action: Action::ApplyWhenIdle,
    },
    Rule {
        receiver: ReceiverClass::TrailingMain,
        from: SenderRelation::OtherMain,
        kinds: &[MessageType::WaypointAdded],
        action: Action::PromptWhenActive,
    },
    Rule {
        receiver: ReceiverClass::TrailingMain,
        from: SenderRelation::Relay,
        kinds: &[MessageType::ConvoyState],
        action: Action::ApplyWhenIdle,
    },
];

/// Replication rules for one device role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationPolicy {
    role: DeviceRole,
}

impl ReplicationPolicy {
    /// Policy for the device playing `role`.
    pub fn for_role(role: DeviceRole) -> Self {
        Self { role }
    }

    /// Role this policy decides for.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Decide what to do with a message of type `kind` from `origin`.
    pub fn decide(&self, origin: MessageOrigin, kind: MessageType) -> Action {
        let receiver = ReceiverClass::of(self.role);
        let from = SenderRelation::between(self.role, origin);
        RULES
            .iter()
            .find(|rule| rule.receiver == receiver && rule.from == from && rule.kinds.contains(&kind))
            .map_or(Action::Ignore, |rule| rule.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn from(role: DeviceRole) -> MessageOrigin {
        MessageOrigin::Device(role)
    }

    #[test]
    fn test_rear_mirrors_only_its_own_main() {
        let rear = ReplicationPolicy::for_role(DeviceRole::LEAD_REAR);
        assert_eq!(rear.decide(from(DeviceRole::LEAD_MAIN), MessageType::Location), Action::Apply);
        assert_eq!(rear.decide(from(DeviceRole::LEAD_MAIN), MessageType::Route), Action::Apply);
        assert_eq!(rear.decide(from(DeviceRole::LEAD_MAIN), MessageType::Weather), Action::Apply);
        assert_eq!(rear.decide(from(DeviceRole::TRAILING_MAIN), MessageType::Route), Action::Ignore);
        assert_eq!(
            rear.decide(from(DeviceRole::TRAILING_MAIN), MessageType::Destination),
            Action::Ignore
        );
    }

    #[test]
    fn test_rear_resolves_own_requests() {
        let rear = ReplicationPolicy::for_role(DeviceRole::TRAILING_REAR);
        assert_eq!(
            rear.decide(from(DeviceRole::TRAILING_MAIN), MessageType::WaypointAdded),
            Action::Resolve
        );
        assert_eq!(
            rear.decide(from(DeviceRole::TRAILING_MAIN), MessageType::StopRequestDeclined),
            Action::Resolve
        );
        assert_eq!(
            rear.decide(from(DeviceRole::LEAD_MAIN), MessageType::WaypointAdded),
            Action::Ignore
        );
    }

    #[test]
    fn test_trailing_main_follows_lead() {
        let trailing = ReplicationPolicy::for_role(DeviceRole::TRAILING_MAIN);
        assert_eq!(
            trailing.decide(from(DeviceRole::LEAD_MAIN), MessageType::Destination),
            Action::ApplyWhenIdle
        );
        assert_eq!(
            trailing.decide(from(DeviceRole::LEAD_MAIN), MessageType::WaypointAdded),
            Action::PromptWhenActive
        );
        assert_eq!(
            trailing.decide(from(DeviceRole::LEAD_MAIN), MessageType::Route),
            Action::Ignore
        );
        assert_eq!(
            trailing.decide(from(DeviceRole::LEAD_REAR), MessageType::RequestAddWaypoint),
            Action::Ignore
        );
    }

    #[test]
    fn test_lead_main_prompts_for_own_rear_requests() {
        let lead = ReplicationPolicy::for_role(DeviceRole::LEAD_MAIN);
        assert_eq!(
            lead.decide(from(DeviceRole::LEAD_REAR), MessageType::RequestAddWaypoint),
            Action::Prompt
        );
        assert_eq!(
            lead.decide(from(DeviceRole::LEAD_REAR), MessageType::StopRequestCancelled),
            Action::Withdraw
        );
        assert_eq!(
            lead.decide(from(DeviceRole::TRAILING_MAIN), MessageType::Destination),
            Action::Ignore
        );
        assert_eq!(lead.decide(MessageOrigin::Server, MessageType::ConvoyState), Action::Ignore);
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let lead = ReplicationPolicy::for_role(DeviceRole::LEAD_MAIN);
        assert_eq!(
            SenderRelation::between(DeviceRole::LEAD_MAIN, from(DeviceRole::LEAD_MAIN)),
            SenderRelation::Unknown
        );
        assert_eq!(
            lead.decide(from(DeviceRole::LEAD_MAIN), MessageType::RequestAddWaypoint),
            Action::Ignore
        );
    }

    fn any_role() -> impl Strategy<Value = DeviceRole> {
        prop::sample::select(DeviceRole::PRIORITY.to_vec())
    }

    proptest! {
        #[test]
        fn prop_unassigned_senders_never_act(
            role in any_role(),
            kind in prop::sample::select(MessageType::ALL.to_vec()),
        ) {
            let policy = ReplicationPolicy::for_role(role);
            prop_assert_eq!(policy.decide(MessageOrigin::Unassigned, kind), Action::Ignore);
        }

        #[test]
        fn prop_lead_main_never_takes_trip_state(
            sender in any_role(),
            kind in prop::sample::select(vec![
                MessageType::Destination,
                MessageType::Waypoints,
                MessageType::Route,
                MessageType::NavigationState,
            ]),
        ) {
            let policy = ReplicationPolicy::for_role(DeviceRole::LEAD_MAIN);
            prop_assert_eq!(policy.decide(MessageOrigin::Device(sender), kind), Action::Ignore);
        }
    }
}
