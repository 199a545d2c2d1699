//! Motion simulation.
//!
//! [`advance`] is a pure step function: it takes the previous
//! [`SimulationState`], the route being driven and the elapsed time, and
//! returns the next state together with what happened during the tick. The
//! caller owns scheduling.

use std::time::Instant;

use convoy_schemas::{LatLng, Route};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::geo::{bearing_delta, bearing_deg, haversine_m, interpolate};
use crate::maneuver::{LegProgress, leg_progress};

/// Segments shorter than this are stepped over.
const DEGENERATE_SEGMENT_M: f64 = 1e-3;

/// Simulated vehicle state on the driving display.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationState {
    /// Index of the polyline vertex the current segment starts at.
    pub segment_index: usize,
    /// Fraction of the current segment already driven, `[0, 1)`.
    pub segment_progress: f64,
    /// m/s.
    pub speed_mps: f64,
    /// Distance driven in this navigation session, survives reroutes.
    pub cumulative_distance: f64,
    /// Distance driven on the current route, reset on reroute.
    pub distance_on_route: f64,
    /// Whether the vehicle is held at a waypoint.
    pub paused: bool,
    /// Last leg the vehicle paused at the end of.
    pub last_paused_leg: Option<usize>,
    /// Whether the destination has been reached.
    pub arrived: bool,
    /// Last computed position.
    pub position: Option<LatLng>,
    /// Degrees clockwise from north.
    pub heading: f64,
}

impl SimulationState {
    /// Fresh state for a new navigation session on `route`.
    pub fn start(route: &Route) -> Self {
        let mut state = Self::default();
        state.place_at_route_start(route);
        state
    }

    /// The route was recomputed mid-trip. Cumulative distance and speed carry over.
    pub fn reset_for_reroute(&mut self, route: &Route) {
        self.segment_index = 0;
        self.segment_progress = 0.0;
        self.distance_on_route = 0.0;
        self.last_paused_leg = None;
        self.paused = false;
        self.arrived = false;
        self.place_at_route_start(route);
    }

    /// Leave a stop pause.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Current speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }

    fn place_at_route_start(&mut self, route: &Route) {
        if let [first, second, ..] = route.coordinates.as_slice() {
            self.position = Some(*first);
            self.heading = bearing_deg(*first, *second);
        }
    }
}

/// Something the caller must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEvent {
    /// Vehicle stopped at the end of a non-final leg.
    LegBoundaryPause { leg: usize },
    /// Final vertex reached.
    Arrived,
}

/// Display values derived during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationReport {
    /// Position after the tick.
    pub position: LatLng,
    /// Heading in degrees clockwise from north.
    pub heading: f64,
    /// Speed in km/h.
    pub speed_kmh: f64,
    /// Speed limit of the current segment.
    pub speed_limit_kmh: u32,
    /// Meters driven during this tick.
    pub distance_moved: f64,
    /// Progress through the route legs.
    pub leg: Option<LegProgress>,
    /// Estimated seconds to the end of the current leg.
    pub next_stop_duration: Option<f64>,
}

/// Result of one call to [`advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// State to feed into the next tick.
    pub state: SimulationState,
    /// `None` when the tick was a no-op.
    pub report: Option<SimulationReport>,
    /// Events raised during the tick.
    pub events: Vec<SimulationEvent>,
}

impl Tick {
    fn idle(state: SimulationState) -> Self {
        Self {
            state,
            report: None,
            events: Vec::new(),
        }
    }

    /// Check whether the tick changed nothing.
    pub fn is_noop(&self) -> bool {
        self.report.is_none()
    }
}

/// Advance the simulation by `dt_secs`.
pub fn advance(
    state: &SimulationState,
    route: &Route,
    dt_secs: f64,
    config: &SimulationConfig,
) -> Tick {
    if state.paused || state.arrived {
        return Tick::idle(state.clone());
    }
    if !dt_secs.is_finite() || dt_secs <= 0.0 || dt_secs > config.max_tick_gap_secs {
        return Tick::idle(state.clone());
    }
    if route.validate().is_err() || state.segment_index + 1 >= route.coordinates.len() {
        debug!(
            segment_index = state.segment_index,
            "Skipping tick on unusable route"
        );
        return Tick::idle(state.clone());
    }

    let mut next = state.clone();
    let mut events = Vec::new();

    let target = target_speed_mps(route, state.segment_index, config);
    next.speed_mps = if state.speed_mps < target {
        target.min(state.speed_mps + config.acceleration_mps2 * dt_secs)
    } else {
        target.max(state.speed_mps - config.deceleration_mps2 * dt_secs)
    };

    let walk = walk_polyline(
        &route.coordinates,
        state.segment_index,
        state.segment_progress,
        next.speed_mps * dt_secs,
    );

    let limit = if route.distance > 0.0 {
        route.distance
    } else {
        f64::INFINITY
    };
    let mut on_route = (state.distance_on_route + walk.moved).min(limit);
    if walk.arrived && limit.is_finite() {
        on_route = limit;
    }
    on_route = on_route.max(state.distance_on_route);
    next.cumulative_distance += on_route - state.distance_on_route;
    next.distance_on_route = on_route;

    let coords = &route.coordinates;
    let last = coords.len() - 1;
    if walk.arrived {
        next.segment_index = last;
        next.segment_progress = 0.0;
        next.speed_mps = 0.0;
        next.arrived = true;
        if let [.., before, end] = coords.as_slice() {
            next.position = Some(*end);
            next.heading = bearing_deg(*before, *end);
        }
        info!(
            distance = next.distance_on_route,
            "Arrived at final route point"
        );
        events.push(SimulationEvent::Arrived);
    } else {
        next.segment_index = walk.index;
        next.segment_progress = walk.progress;
        if let (Some(a), Some(b)) = (coords.get(walk.index), coords.get(walk.index + 1)) {
            next.position = Some(interpolate(*a, *b, walk.progress));
            next.heading = bearing_deg(*a, *b);
        }
    }

    let leg = leg_progress(route, next.distance_on_route);
    if let Some(progress) = leg {
        let already_paused = state
            .last_paused_leg
            .is_some_and(|paused| progress.leg_index <= paused);
        if !walk.arrived
            && !progress.is_final()
            && progress.remaining_m < config.leg_pause_distance_m
            && !already_paused
        {
            next.paused = true;
            next.speed_mps = 0.0;
            next.last_paused_leg = Some(progress.leg_index);
            info!(
                leg = progress.leg_index,
                remaining = progress.remaining_m,
                "Pausing at stop"
            );
            events.push(SimulationEvent::LegBoundaryPause {
                leg: progress.leg_index,
            });
        }
    }

    let next_stop_duration =
        leg.map(|p| p.remaining_m / next.speed_mps.max(config.min_eta_speed_mps));

    let report = next.position.map(|position| SimulationReport {
        position,
        heading: next.heading,
        speed_kmh: next.speed_kmh(),
        speed_limit_kmh: config.speed_limit_for(next.speed_kmh()),
        distance_moved: on_route - state.distance_on_route,
        leg,
        next_stop_duration,
    });

    Tick {
        state: next,
        report,
        events,
    }
}

/// Corner speed if any of the upcoming vertices turns sharper than the threshold.
fn target_speed_mps(route: &Route, index: usize, config: &SimulationConfig) -> f64 {
    let coords = &route.coordinates;
    let cornering = (1..=config.corner_lookahead_vertices).any(|k| {
        let vertex = index + k;
        match (coords.get(vertex - 1), coords.get(vertex), coords.get(vertex + 1)) {
            (Some(a), Some(b), Some(c)) => {
                if haversine_m(*a, *b) < DEGENERATE_SEGMENT_M
                    || haversine_m(*b, *c) < DEGENERATE_SEGMENT_M
                {
                    return false;
                }
                let turn = bearing_delta(bearing_deg(*a, *b), bearing_deg(*b, *c));
                turn.abs() > config.corner_threshold_deg
            }
            _ => false,
        }
    });

    if cornering {
        config.corner_speed_mps()
    } else {
        config.cruise_speed_mps()
    }
}

struct Walk {
    index: usize,
    progress: f64,
    moved: f64,
    arrived: bool,
}

/// Move `distance` meters along the polyline, carrying overflow into later segments.
fn walk_polyline(coords: &[LatLng], index: usize, progress: f64, distance: f64) -> Walk {
    let mut walk = Walk {
        index,
        progress,
        moved: 0.0,
        arrived: false,
    };
    let mut remaining = distance;

    loop {
        let (Some(a), Some(b)) = (coords.get(walk.index), coords.get(walk.index + 1)) else {
            walk.arrived = true;
            walk.progress = 0.0;
            break;
        };
        let segment = haversine_m(*a, *b);
        if segment < DEGENERATE_SEGMENT_M {
            walk.index += 1;
            walk.progress = 0.0;
            continue;
        }

        let left = segment * (1.0 - walk.progress);
        if remaining < left {
            walk.progress += remaining / segment;
            walk.moved += remaining;
            if walk.progress >= 1.0 {
                walk.index += 1;
                walk.progress = 0.0;
                if walk.index + 1 >= coords.len() {
                    walk.arrived = true;
                }
            }
            break;
        }

        remaining -= left;
        walk.moved += left;
        walk.index += 1;
        walk.progress = 0.0;
    }

    walk
}

/// Turns wall-clock instants into tick deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickClock {
    last: Option<Instant>,
}

impl TickClock {
    /// Create a clock with no previous tick.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous call, zero on the first call.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let dt = self
            .last
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f64());
        self.last = Some(now);
        dt
    }

    /// Forget the previous tick so the next one starts fresh.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
