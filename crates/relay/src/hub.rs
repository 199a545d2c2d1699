//! Connection registry, scoped broadcast and cached trip state.
//!
//! All relay state sits behind one lock so that slot changes, cache updates
//! and fan-out for a single message are applied as one step. Nothing awaits
//! while the lock is held; sockets are fed through unbounded channels.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use convoy_schemas::{
    ConvoyMessage, ConvoySnapshot, DeviceRole, MessageOrigin, MessageScope, Payload,
    ProtocolError, RoleAssigned, RoleRejected, VehicleId, VehicleSnapshot, VehicleStateUpdate,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::slots::{ConnectionId, SlotStatus, SlotTable};

/// Frame queued for a socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Close the socket with this reason after flushing earlier frames.
    Close(String),
}

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Assigned(DeviceRole),
    Rejected,
}

#[derive(Debug)]
struct PollQueue {
    messages: VecDeque<Value>,
    last_poll: Instant,
}

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
    slots: SlotTable,
    convoy: ConvoySnapshot,
    vehicles: BTreeMap<VehicleId, VehicleSnapshot>,
    polls: HashMap<DeviceRole, PollQueue>,
}

/// `/health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always `running` while the relay serves requests.
    pub status: &'static str,
    /// Number of open sockets.
    pub connections: usize,
    /// Slot occupancy in priority order.
    pub slots: Vec<SlotStatus>,
    /// Roles with a live poll queue.
    pub polling: Vec<DeviceRole>,
    /// Cached convoy state.
    pub convoy: ConvoySnapshot,
    /// Cached state per vehicle.
    pub vehicles: BTreeMap<VehicleId, VehicleSnapshot>,
}

/// Shared relay state: live connections, slots, cached state and poll queues.
#[derive(Debug)]
pub struct Hub {
    config: RelayConfig,
    state: Mutex<HubState>,
}

fn to_wire(message: &ConvoyMessage) -> RelayResult<Value> {
    Ok(serde_json::to_value(message).map_err(ProtocolError::from)?)
}

fn send_to(tx: &mpsc::UnboundedSender<Outbound>, message: &ConvoyMessage) -> RelayResult<()> {
    let text = to_wire(message)?.to_string();
    if tx.send(Outbound::Text(text)).is_err() {
        debug!(kind = %message.kind(), "Connection writer gone");
    }
    Ok(())
}

impl Hub {
    /// Create an empty hub.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Relay settings in use.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Track a new socket. Frames for it are pushed into `tx`.
    pub fn connect(&self, tx: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ConnectionId(state.next_id);
        state.connections.insert(id, tx);
        debug!(connection = %id, total = state.connections.len(), "Connection opened");
        id
    }

    /// Forget a socket and free its slot if it still holds one.
    pub fn disconnect(&self, id: ConnectionId) -> Option<DeviceRole> {
        let mut state = self.state.lock();
        state.connections.remove(&id);
        let role = state.slots.release(id);
        info!(connection = %id, role = ?role.map(|r| r.to_string()), "Connection closed");
        role
    }

    /// Bind a connection to a slot and greet it with the cached state, or
    /// reject it when every slot is held by a live connection.
    pub fn register(&self, id: ConnectionId, requested: Option<DeviceRole>) -> RelayResult<Registration> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let connections = &state.connections;
        let assigned = state.slots.assign(id, requested, |holder| {
            connections.get(&holder).is_some_and(|tx| !tx.is_closed())
        });

        let Some(tx) = connections.get(&id) else {
            warn!(connection = %id, "Registration from unknown connection");
            return Ok(Registration::Rejected);
        };

        let Some(role) = assigned else {
            warn!(connection = %id, "All slots taken, rejecting registration");
            let rejected = RoleRejected::no_role_available();
            let reason = rejected.reason.clone();
            send_to(tx, &ConvoyMessage::from_relay(Payload::RoleRejected(rejected)))?;
            let _ = tx.send(Outbound::Close(reason));
            return Ok(Registration::Rejected);
        };

        send_to(
            tx,
            &ConvoyMessage::from_relay(Payload::RoleAssigned(RoleAssigned { assigned_role: role })),
        )?;
        send_to(
            tx,
            &ConvoyMessage::from_relay(Payload::ConvoyState(Box::new(state.convoy.clone()))),
        )?;
        let vehicle = state.vehicles.get(&role.vehicle).cloned().unwrap_or_default();
        send_to(
            tx,
            &ConvoyMessage::from_relay(Payload::VehicleState(Box::new(VehicleStateUpdate {
                vehicle: role.vehicle,
                state: vehicle,
            }))),
        )?;
        Ok(Registration::Assigned(role))
    }

    /// Handle one text frame from a socket. Malformed frames are dropped.
    pub fn handle_text(&self, id: ConnectionId, text: &str) {
        let message = match ConvoyMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection = %id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        let result = match &message.payload {
            Payload::Register(register) => self.register(id, register.requested_role).map(|_| ()),
            _ => self.route(message, Some(id)).map(|_| ()),
        };
        if let Err(e) = result {
            warn!(connection = %id, error = %e, "Dropping frame");
        }
    }

    /// Fold a message into the cache and fan it out by scope. The sender's
    /// slot, when known, overrides the role claimed in the message. Returns
    /// the number of sockets and poll queues that received it.
    pub fn route(&self, mut message: ConvoyMessage, from: Option<ConnectionId>) -> RelayResult<usize> {
        let kind = message.kind();
        let scope = kind.scope();
        if scope == MessageScope::Relay {
            return Err(RelayError::NotRoutable(kind));
        }

        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.expire_locked(state, now);

        let sender = from
            .and_then(|id| state.slots.role_of(id))
            .or_else(|| message.sender());
        if let Some(role) = sender {
            message.origin = MessageOrigin::Device(role);
        }
        if scope == MessageScope::Vehicle && sender.is_none() {
            return Err(RelayError::UnknownSender(kind));
        }

        state.convoy.apply(&message.payload);
        if let Some(role) = sender {
            state
                .vehicles
                .entry(role.vehicle)
                .or_default()
                .apply(&message.payload);
        }

        let value = to_wire(&message)?;
        let text = value.to_string();
        let mut delivered = 0;

        for target in DeviceRole::PRIORITY {
            if Some(target) == sender {
                continue;
            }
            if scope == MessageScope::Vehicle && !sender.is_some_and(|s| s.same_vehicle(target)) {
                continue;
            }

            let live = state
                .slots
                .holder(target)
                .and_then(|id| state.connections.get(&id))
                .filter(|tx| !tx.is_closed());
            if let Some(tx) = live {
                if tx.send(Outbound::Text(text.clone())).is_ok() {
                    delivered += 1;
                    continue;
                }
            }

            if let Some(queue) = state.polls.get_mut(&target) {
                if queue.messages.len() >= self.config.poll_queue_capacity {
                    queue.messages.pop_front();
                    debug!(role = %target, "Poll queue full, dropped oldest");
                }
                queue.messages.push_back(value.clone());
                delivered += 1;
            }
        }

        debug!(%kind, sender = ?sender.map(|r| r.to_string()), delivered, "Routed message");
        Ok(delivered)
    }

    /// Drain the queue for `role` and keep queueing for it until it goes idle.
    pub fn poll(&self, role: DeviceRole) -> Vec<Value> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.expire_locked(state, now);

        let queue = state.polls.entry(role).or_insert_with(|| {
            info!(%role, "Device started polling");
            PollQueue {
                messages: VecDeque::new(),
                last_poll: now,
            }
        });
        queue.last_poll = now;
        queue.messages.drain(..).collect()
    }

    /// Drop the queues of devices that stopped polling. Returns how many went.
    pub fn expire_poll_queues(&self, now: Instant) -> usize {
        let mut guard = self.state.lock();
        self.expire_locked(&mut guard, now)
    }

    fn expire_locked(&self, state: &mut HubState, now: Instant) -> usize {
        let timeout = self.config.poll_idle_timeout();
        let before = state.polls.len();
        state.polls.retain(|role, queue| {
            let keep = now.saturating_duration_since(queue.last_poll) < timeout;
            if !keep {
                info!(%role, dropped = queue.messages.len(), "Poll queue expired");
            }
            keep
        });
        before - state.polls.len()
    }

    /// Number of open sockets.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Snapshot for the `/health` endpoint.
    pub fn health(&self) -> HealthReport {
        let state = self.state.lock();
        let mut polling: Vec<DeviceRole> = state.polls.keys().copied().collect();
        polling.sort();
        HealthReport {
            status: "running",
            connections: state.connections.len(),
            slots: state.slots.occupancy(),
            polling,
            convoy: state.convoy.clone(),
            vehicles: state.vehicles.clone(),
        }
    }
}
