//! Per-device replication state machine.
//!
//! [`DeviceSession`] owns no I/O. The runtime feeds it relayed messages,
//! user answers and the clock, and executes the [`SessionEffect`]s it returns.

use std::time::Instant;

use convoy_schemas::{
    ConvoyMessage, ConvoySnapshot, DeviceRole, MessageType, NavigationInfo, NavigationPhase,
    Payload, Place, StopRequestRef, VehicleSnapshot,
};
use tracing::{debug, info};

use crate::camera::{CameraDirective, camera_directive};
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::policy::{Action, ReplicationPolicy};
use crate::prompt::{Prompt, PromptId, PromptQueue, PromptSource};
use crate::stop_request::{StopOutcome, StopRequestTracker};

/// Something the runtime has to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Mirrored state changed.
    Mirrored(MessageType),
    Camera(CameraDirective),
    SetDestination(Place),
    SetWaypoints(Vec<Place>),
    /// Append to the current plan without rerouting an active trip.
    AppendWaypoint(Place),
    PromptOpened(Prompt),
    PromptClosed(PromptId),
    /// Reroute through an extra stop. `request_id` is echoed in `waypoint_added`.
    AddStop {
        place: Place,
        request_id: Option<String>,
    },
    Send(Payload),
    StopSettled {
        request_id: String,
        place: Place,
        outcome: StopOutcome,
    },
}

/// What a rear display shows of its main display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MirrorState {
    /// Convoy state as last relayed.
    pub convoy: ConvoySnapshot,
    /// State of this device's vehicle.
    pub vehicle: VehicleSnapshot,
    /// Latest navigation info from the lead.
    pub navigation_info: Option<NavigationInfo>,
}

impl MirrorState {
    fn apply(&mut self, role: DeviceRole, payload: &Payload) -> bool {
        if self.convoy.apply(payload) || self.vehicle.apply(payload) {
            return true;
        }
        match payload {
            Payload::NavigationInfo(info) => {
                self.navigation_info = Some(*info);
                true
            }
            Payload::WaypointAdded(added) => {
                if !self.convoy.waypoints.contains(&added.place) {
                    self.convoy.waypoints.push(added.place.clone());
                }
                true
            }
            Payload::ConvoyState(snapshot) => {
                self.convoy = snapshot.as_ref().clone();
                true
            }
            Payload::VehicleState(update) if update.vehicle == role.vehicle => {
                self.vehicle = update.state.clone();
                true
            }
            Payload::ResumeNavigation => true,
            _ => false,
        }
    }

    fn trip_stops(&self) -> Vec<&Place> {
        self.convoy
            .destination
            .iter()
            .chain(self.convoy.waypoints.iter())
            .collect()
    }
}

/// Replication state of one device.
#[derive(Debug)]
pub struct DeviceSession {
    role: DeviceRole,
    policy: ReplicationPolicy,
    config: ReplicationConfig,
    phase: NavigationPhase,
    mirror: MirrorState,
    prompts: PromptQueue,
    stops: StopRequestTracker,
    selected_place: Option<Place>,
}

impl DeviceSession {
    /// Create a session for `role` with nothing mirrored.
    pub fn new(role: DeviceRole, config: ReplicationConfig) -> Self {
        Self {
            role,
            policy: ReplicationPolicy::for_role(role),
            prompts: PromptQueue::new(config.prompt_timeout()),
            config,
            phase: NavigationPhase::Idle,
            mirror: MirrorState::default(),
            stops: StopRequestTracker::new(),
            selected_place: None,
        }
    }

    /// Role this session replicates for.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Local navigation phase.
    pub fn phase(&self) -> NavigationPhase {
        self.phase
    }

    /// Navigation phase of this device's own trip.
    pub fn set_phase(&mut self, phase: NavigationPhase) {
        self.phase = phase;
    }

    /// Place the UI is currently showing details for.
    pub fn set_selected_place(&mut self, place: Option<Place>) {
        self.selected_place = place;
    }

    /// State mirrored from other devices.
    pub fn mirror(&self) -> &MirrorState {
        &self.mirror
    }

    /// Open prompts.
    pub fn prompts(&self) -> &PromptQueue {
        &self.prompts
    }

    /// Stop requests sent from this device.
    pub fn stops(&self) -> &StopRequestTracker {
        &self.stops
    }

    /// Nearest prompt deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.prompts.next_deadline()
    }

    /// Turn one relayed message into the effects the device should apply.
    pub fn handle(&mut self, message: &ConvoyMessage, now: Instant) -> Vec<SessionEffect> {
        let kind = message.kind();
        let action = self.policy.decide(message.origin, kind);
        debug!(role = %self.role, from = %message.origin, %kind, ?action, "Replication decision");

        match action {
            Action::Ignore => Vec::new(),
            Action::Apply => self.mirror_payload(&message.payload),
            Action::ApplyWhenIdle => self.follow_lead(&message.payload),
            Action::Prompt => {
                let (Payload::RequestAddWaypoint(request), Some(from)) =
                    (&message.payload, message.sender())
                else {
                    return Vec::new();
                };
                let source = PromptSource::StopRequest {
                    request_id: request.request_id.clone(),
                    from,
                };
                let prompt = self.prompts.open(source, request.place.clone(), now);
                vec![SessionEffect::PromptOpened(prompt)]
            }
            Action::PromptWhenActive => {
                let Payload::WaypointAdded(added) = &message.payload else {
                    return Vec::new();
                };
                if self.phase == NavigationPhase::Active {
                    let source = PromptSource::LeadWaypoint {
                        request_id: added.request_id.clone(),
                    };
                    let prompt = self.prompts.open(source, added.place.clone(), now);
                    vec![SessionEffect::PromptOpened(prompt)]
                } else {
                    vec![SessionEffect::AppendWaypoint(added.place.clone())]
                }
            }
            Action::Resolve => {
                let mut effects = Vec::new();
                if let Some((request_id, pending, outcome)) = self.stops.observe(&message.payload) {
                    effects.push(SessionEffect::StopSettled {
                        request_id,
                        place: pending.place,
                        outcome,
                    });
                }
                if kind == MessageType::WaypointAdded {
                    effects.extend(self.mirror_payload(&message.payload));
                }
                effects
            }
            Action::Withdraw => {
                let Payload::StopRequestCancelled(cancelled) = &message.payload else {
                    return Vec::new();
                };
                self.prompts
                    .withdraw(&cancelled.request_id)
                    .map(|prompt| vec![SessionEffect::PromptClosed(prompt.id)])
                    .unwrap_or_default()
            }
        }
    }

    /// Ask for a stop. Rear displays send a request; main displays add it directly.
    pub fn request_stop(&mut self, place: Place, now: Instant) -> Vec<SessionEffect> {
        if self.role.is_rear() {
            let request = self.stops.request(place, now);
            vec![SessionEffect::Send(Payload::RequestAddWaypoint(request))]
        } else {
            vec![SessionEffect::AddStop {
                place,
                request_id: None,
            }]
        }
    }

    /// Cancel a pending stop request. Only rear seats send requests.
    pub fn cancel_stop(&mut self, request_id: &str) -> ReplicationResult<Vec<SessionEffect>> {
        if !self.role.is_rear() {
            return Err(ReplicationError::NotPermitted(self.role, "cancel stop requests"));
        }
        let cancel = self.stops.cancel(request_id)?;
        Ok(vec![SessionEffect::Send(Payload::StopRequestCancelled(cancel))])
    }

    /// Accept an open prompt.
    pub fn accept_prompt(&mut self, id: PromptId) -> ReplicationResult<Vec<SessionEffect>> {
        let prompt = self.prompts.take(id)?;
        info!(prompt = %id, place = %prompt.place.name, "Prompt accepted");
        Ok(Self::accepted(prompt))
    }

    /// Decline an open prompt.
    pub fn decline_prompt(&mut self, id: PromptId) -> ReplicationResult<Vec<SessionEffect>> {
        let prompt = self.prompts.take(id)?;
        info!(prompt = %id, place = %prompt.place.name, "Prompt declined");
        let mut effects = vec![SessionEffect::PromptClosed(prompt.id)];
        if let PromptSource::StopRequest { request_id, .. } = prompt.source {
            effects.push(SessionEffect::Send(Payload::StopRequestDeclined(
                StopRequestRef { request_id },
            )));
        }
        Ok(effects)
    }

    /// Auto-accept every prompt whose deadline has passed.
    pub fn expire_prompts(&mut self, now: Instant) -> Vec<SessionEffect> {
        self.prompts
            .expire(now)
            .into_iter()
            .flat_map(|prompt| {
                info!(prompt = %prompt.id, place = %prompt.place.name, "Prompt timed out, accepting");
                Self::accepted(prompt)
            })
            .collect()
    }

    fn accepted(prompt: Prompt) -> Vec<SessionEffect> {
        let request_id = match &prompt.source {
            PromptSource::StopRequest { request_id, .. } => Some(request_id.clone()),
            PromptSource::LeadWaypoint { .. } => None,
        };
        vec![
            SessionEffect::PromptClosed(prompt.id),
            SessionEffect::AddStop {
                place: prompt.place,
                request_id,
            },
        ]
    }

    fn mirror_payload(&mut self, payload: &Payload) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if let Payload::Location(location) = payload {
            let previous = self.mirror.vehicle.position.map(|p| p.point());
            let directive = camera_directive(
                previous,
                location.point(),
                self.selected_place.as_ref(),
                &self.mirror.trip_stops(),
                self.config.camera_snap_distance_m,
            );
            effects.push(SessionEffect::Camera(directive));
        }
        if self.mirror.apply(self.role, payload) {
            effects.push(SessionEffect::Mirrored(payload.kind()));
        }
        effects
    }

    fn follow_lead(&mut self, payload: &Payload) -> Vec<SessionEffect> {
        if self.phase != NavigationPhase::Idle {
            debug!(kind = %payload.kind(), "Own trip in progress, not following lead");
            return Vec::new();
        }
        match payload {
            Payload::Destination(place) => vec![SessionEffect::SetDestination(place.clone())],
            Payload::Waypoints(places) => vec![SessionEffect::SetWaypoints(places.clone())],
            Payload::ConvoyState(snapshot) => {
                let mut effects = Vec::new();
                if let Some(destination) = &snapshot.destination {
                    effects.push(SessionEffect::SetDestination(destination.clone()));
                }
                if !snapshot.waypoints.is_empty() {
                    effects.push(SessionEffect::SetWaypoints(snapshot.waypoints.clone()));
                }
                effects
            }
            _ => Vec::new(),
        }
    }
}
