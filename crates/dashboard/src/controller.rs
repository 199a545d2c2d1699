//! Device-local navigation state.
//!
//! The controller is driven from a single task: ticks, relayed messages and
//! user commands arrive one at a time, so none of its state is locked.
//! Everything it wants to broadcast is collected in an outbox that the
//! runtime hands to the sync client.

use std::sync::Arc;
use std::time::Instant;

use convoy_nav_engine::{
    AvoidanceFlags, Maneuver, RouteProvider, RouteRequest, SimulationEvent, SimulationState,
    TickClock, VoiceGuidance, VoiceSink, advance, fetch_route, leg_progress, next_maneuver,
};
use convoy_replication::{CameraDirective, DeviceSession, PromptId, SessionEffect};
use convoy_schemas::{
    ConvoyMessage, DeviceRole, LatLng, Location, NavigationInfo, NavigationPhase,
    NavigationStateUpdate, Payload, Place, RangeUpdate, Route, StopRequestRef, WaypointAdded,
    now_millis,
};
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::throttle::{PeriodicGate, RangeTracker};

/// Trip state and simulation for one display.
pub struct Controller {
    role: DeviceRole,
    config: DashboardConfig,
    provider: Arc<dyn RouteProvider>,
    voice: Arc<dyn VoiceSink>,
    phase: NavigationPhase,
    position: LatLng,
    heading: Option<f64>,
    speed_kmh: f64,
    destination: Option<Place>,
    waypoints: Vec<Place>,
    route: Option<Route>,
    simulation: SimulationState,
    clock: TickClock,
    guidance: VoiceGuidance,
    maneuver: Option<Maneuver>,
    session: DeviceSession,
    range: RangeTracker,
    location_gate: PeriodicGate,
    info_gate: PeriodicGate,
    camera: Option<CameraDirective>,
    outbox: Vec<Payload>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("position", &self.position)
            .field("waypoints", &self.waypoints.len())
            .finish()
    }
}

impl Controller {
    /// Create an idle controller at the configured start position.
    pub fn new(
        role: DeviceRole,
        config: DashboardConfig,
        provider: Arc<dyn RouteProvider>,
        voice: Arc<dyn VoiceSink>,
    ) -> Self {
        Self {
            role,
            position: config.start,
            heading: None,
            speed_kmh: 0.0,
            phase: NavigationPhase::Idle,
            destination: None,
            waypoints: Vec::new(),
            route: None,
            simulation: SimulationState::default(),
            clock: TickClock::new(),
            guidance: VoiceGuidance::new(config.guidance.clone()),
            maneuver: None,
            session: DeviceSession::new(role, config.replication.clone()),
            range: RangeTracker::new(config.initial_range_km),
            location_gate: PeriodicGate::new(config.location_period()),
            info_gate: PeriodicGate::new(config.navigation_info_period()),
            camera: None,
            outbox: Vec::new(),
            provider,
            voice,
            config,
        }
    }

    /// Role this display currently plays.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Current navigation phase.
    pub fn phase(&self) -> NavigationPhase {
        self.phase
    }

    /// Simulated or mirrored vehicle position.
    pub fn position(&self) -> LatLng {
        self.position
    }

    /// Trip destination, if one is set.
    pub fn destination(&self) -> Option<&Place> {
        self.destination.as_ref()
    }

    /// Planned stops in visiting order.
    pub fn waypoints(&self) -> &[Place] {
        &self.waypoints
    }

    /// Route being previewed or driven.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Motion simulation state.
    pub fn simulation(&self) -> &SimulationState {
        &self.simulation
    }

    /// Upcoming maneuver as of the last tick.
    pub fn maneuver(&self) -> Option<&Maneuver> {
        self.maneuver.as_ref()
    }

    /// Replication session for this role.
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Remaining range in kilometers.
    pub fn range_km(&self) -> f64 {
        self.range.remaining_km()
    }

    /// Last camera directive derived from mirrored positions.
    pub fn camera(&self) -> Option<CameraDirective> {
        self.camera
    }

    /// Nearest prompt deadline, if a prompt is open.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.next_deadline()
    }

    /// Take everything queued for broadcast.
    pub fn drain_outbox(&mut self) -> Vec<Payload> {
        std::mem::take(&mut self.outbox)
    }

    /// The relay gave us a different role than the one we were built for.
    pub fn set_role(&mut self, role: DeviceRole) {
        if role == self.role {
            return;
        }
        info!(from = %self.role, to = %role, "Device role changed");
        self.role = role;
        let phase = self.session.phase();
        self.session = DeviceSession::new(role, self.config.replication.clone());
        self.session.set_phase(phase);
    }

    fn broadcast(&mut self, payload: Payload) {
        // Rear displays only ever speak through stop requests.
        if self.role.is_main() {
            self.outbox.push(payload);
        }
    }

    /// Initial position and full range for a fresh session.
    pub fn announce_reset(&mut self) {
        self.range.reset(self.config.initial_range_km);
        self.broadcast(Payload::Location(self.location_payload()));
        if let Some(range) = self.range.report() {
            self.broadcast(Payload::Range(RangeUpdate {
                remaining_range: range,
            }));
        }
    }

    fn location_payload(&self) -> Location {
        Location {
            latitude: self.position.latitude,
            longitude: self.position.longitude,
            heading: self.heading,
            speed: Some(self.speed_kmh),
        }
    }

    fn set_phase(&mut self, phase: NavigationPhase) {
        if self.phase == phase {
            return;
        }
        info!(from = ?self.phase, to = ?phase, "Navigation phase changed");
        self.phase = phase;
        self.session.set_phase(phase);
        self.broadcast(Payload::NavigationState(NavigationStateUpdate { state: phase }));
    }

    async fn compute_route(&self, waypoints: &[Place]) -> Option<Route> {
        let destination = self.destination.as_ref()?;
        let request = RouteRequest::new(self.position, destination.point())
            .with_waypoints(waypoints.iter().map(Place::point).collect())
            .with_avoidance(self.config.avoid);
        fetch_route(self.provider.as_ref(), &request).await
    }

    /// Pick a destination and preview the route to it.
    pub async fn set_destination(&mut self, place: Place) -> bool {
        info!(place = %place.name, "Destination set");
        self.destination = Some(place.clone());
        self.broadcast(Payload::Destination(place));
        self.refresh_preview().await
    }

    /// Replace the planned stops and refresh the preview.
    pub async fn set_waypoints(&mut self, waypoints: Vec<Place>) -> bool {
        self.waypoints = waypoints;
        self.broadcast(Payload::Waypoints(self.waypoints.clone()));
        self.refresh_preview().await
    }

    /// Change the avoided road classes. A previewed route is recomputed,
    /// an active trip picks them up on its next reroute.
    pub async fn set_avoidance(&mut self, avoid: AvoidanceFlags) -> bool {
        if self.config.avoid == avoid {
            return false;
        }
        info!(?avoid, "Route avoidance changed");
        self.config.avoid = avoid;
        self.refresh_preview().await
    }

    /// Recompute the preview route. Active trips are rerouted through `add_stop` instead.
    async fn refresh_preview(&mut self) -> bool {
        if self.phase == NavigationPhase::Active || self.destination.is_none() {
            return false;
        }
        let waypoints = self.waypoints.clone();
        match self.compute_route(&waypoints).await {
            Some(route) => {
                self.route = Some(route.clone());
                self.broadcast(Payload::Route(Box::new(route)));
                self.set_phase(NavigationPhase::Preview);
                true
            }
            None => {
                warn!("No route to destination, staying idle");
                self.route = None;
                false
            }
        }
    }

    /// Start driving the previewed route.
    pub fn start_navigation(&mut self) -> bool {
        let Some(route) = &self.route else {
            warn!("Cannot start navigation without a route");
            return false;
        };
        self.simulation = SimulationState::start(route);
        self.clock.reset();
        self.guidance.reset();
        self.maneuver = None;
        self.location_gate.reset();
        self.info_gate.reset();
        self.set_phase(NavigationPhase::Active);
        true
    }

    /// Leave navigation and clear the trip.
    pub fn end_navigation(&mut self) {
        self.destination = None;
        self.waypoints.clear();
        self.route = None;
        self.maneuver = None;
        self.simulation = SimulationState::default();
        self.clock.reset();
        self.set_phase(NavigationPhase::Idle);
    }

    /// Leave a stop pause. The stop just reached is dropped from the plan.
    pub fn resume(&mut self) -> bool {
        if !self.simulation.paused {
            return false;
        }
        self.simulation.resume();
        self.clock.reset();
        if !self.waypoints.is_empty() {
            let reached = self.waypoints.remove(0);
            info!(place = %reached.name, "Leaving stop");
            self.broadcast(Payload::Waypoints(self.waypoints.clone()));
        }
        self.broadcast(Payload::ResumeNavigation);
        true
    }

    /// Add a stop after the current position. Mid-trip this reroutes from the
    /// simulated position and keeps the session's driven distance.
    pub async fn add_stop(&mut self, place: Place, request_id: Option<String>) -> bool {
        if self.phase != NavigationPhase::Active {
            self.waypoints.push(place.clone());
            self.broadcast(Payload::Waypoints(self.waypoints.clone()));
            self.broadcast(Payload::WaypointAdded(WaypointAdded { request_id, place }));
            self.refresh_preview().await;
            return true;
        }

        let mut waypoints = self.waypoints.clone();
        waypoints.push(place.clone());
        let Some(route) = self.compute_route(&waypoints).await else {
            warn!(place = %place.name, "Reroute failed, stop not added");
            if let Some(request_id) = request_id {
                self.broadcast(Payload::StopRequestDeclined(StopRequestRef { request_id }));
            }
            return false;
        };

        info!(place = %place.name, distance = route.distance, "Rerouted through new stop");
        self.simulation.reset_for_reroute(&route);
        self.clock.reset();
        self.waypoints = waypoints;
        self.route = Some(route.clone());
        self.broadcast(Payload::Waypoints(self.waypoints.clone()));
        self.broadcast(Payload::Route(Box::new(route)));
        self.broadcast(Payload::WaypointAdded(WaypointAdded { request_id, place }));
        true
    }

    /// Ask for a stop. Rear seats send a request, main displays add it directly.
    pub async fn request_stop(&mut self, place: Place, now: Instant) {
        let effects = self.session.request_stop(place, now);
        self.execute(effects).await;
    }

    /// Withdraw a pending stop request from this rear seat.
    pub async fn cancel_stop(&mut self, request_id: &str) -> anyhow::Result<()> {
        let effects = self.session.cancel_stop(request_id)?;
        self.execute(effects).await;
        Ok(())
    }

    /// Accept an open prompt.
    pub async fn accept_prompt(&mut self, id: PromptId) -> anyhow::Result<()> {
        let effects = self.session.accept_prompt(id)?;
        self.execute(effects).await;
        Ok(())
    }

    /// Decline an open prompt.
    pub async fn decline_prompt(&mut self, id: PromptId) -> anyhow::Result<()> {
        let effects = self.session.decline_prompt(id)?;
        self.execute(effects).await;
        Ok(())
    }

    /// Place currently shown in the UI, used to hold the camera still.
    pub fn select_place(&mut self, place: Option<Place>) {
        self.session.set_selected_place(place);
    }

    /// Apply one relayed message according to the replication policy.
    pub async fn handle_message(&mut self, message: &ConvoyMessage, now: Instant) {
        let effects = self.session.handle(message, now);
        self.execute(effects).await;
    }

    /// Auto-accept prompts whose deadline has passed.
    pub async fn expire_prompts(&mut self, now: Instant) {
        let effects = self.session.expire_prompts(now);
        self.execute(effects).await;
    }

    async fn execute(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Mirrored(kind) => debug!(%kind, "Mirrored"),
                SessionEffect::Camera(directive) => self.camera = Some(directive),
                SessionEffect::SetDestination(place) => {
                    self.set_destination(place).await;
                }
                SessionEffect::SetWaypoints(places) => {
                    self.set_waypoints(places).await;
                }
                SessionEffect::AppendWaypoint(place) => {
                    self.waypoints.push(place);
                    self.broadcast(Payload::Waypoints(self.waypoints.clone()));
                    self.refresh_preview().await;
                }
                SessionEffect::PromptOpened(prompt) => {
                    info!(prompt = %prompt.id, place = %prompt.place.name, "Add this stop?");
                }
                SessionEffect::PromptClosed(id) => debug!(prompt = %id, "Prompt closed"),
                SessionEffect::AddStop { place, request_id } => {
                    self.add_stop(place, request_id).await;
                }
                SessionEffect::Send(payload) => self.outbox.push(payload),
                SessionEffect::StopSettled {
                    request_id,
                    place,
                    outcome,
                } => info!(%request_id, place = %place.name, ?outcome, "Stop request settled"),
            }
        }
    }

    /// Advance the simulated drive to `now`.
    pub fn tick(&mut self, now: Instant) {
        let dt = self.clock.tick(now);
        if self.phase != NavigationPhase::Active || !self.role.is_main() {
            return;
        }
        let Some(route) = &self.route else {
            return;
        };

        let tick = advance(&self.simulation, route, dt, &self.config.simulation);
        let Some(report) = tick.report else {
            return;
        };
        self.simulation = tick.state;
        self.position = report.position;
        self.heading = Some(report.heading);
        self.speed_kmh = report.speed_kmh;

        self.maneuver = next_maneuver(route, self.simulation.distance_on_route, self.guidance.config());
        if let Some(announcement) = self.guidance.update(self.maneuver.as_ref(), report.leg) {
            self.voice.speak(&announcement);
        }

        let remaining_m = (route.distance - self.simulation.distance_on_route).max(0.0);
        let time_left = if route.distance > 0.0 {
            route.duration * remaining_m / route.distance
        } else {
            0.0
        };
        let leg = leg_progress(route, self.simulation.distance_on_route);

        for event in &tick.events {
            match event {
                SimulationEvent::LegBoundaryPause { leg } => {
                    info!(leg, "Paused at stop, waiting for resume");
                }
                SimulationEvent::Arrived => info!("Arrived at destination"),
            }
        }
        let force_report = !tick.events.is_empty();

        if let Some(range) = self.range.consume(report.distance_moved) {
            self.broadcast(Payload::Range(RangeUpdate {
                remaining_range: range,
            }));
        }
        if self.location_gate.ready(now) || force_report {
            self.broadcast(Payload::Location(self.location_payload()));
        }
        if self.info_gate.ready(now) || force_report {
            self.broadcast(Payload::NavigationInfo(NavigationInfo {
                eta: now_millis() + (time_left * 1000.0) as i64,
                time_left,
                distance: remaining_m,
                next_stop_distance: leg.filter(|leg| !leg.is_final()).map(|leg| leg.remaining_m),
                next_stop_duration: report.next_stop_duration,
            }));
        }
    }
}
