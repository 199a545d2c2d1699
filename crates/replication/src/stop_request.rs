//! Stop requests sent by a rear display.
//!
//! A rear display never adds a stop itself. It sends `request_add_waypoint`
//! under a fresh id and holds the request until its main display answers with
//! `waypoint_added` or `stop_request_declined` for that id, or until it is
//! cancelled locally.

use std::collections::HashMap;
use std::time::Instant;

use convoy_schemas::{Payload, Place, StopRequest, StopRequestRef};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ReplicationError, ReplicationResult};

/// A stop request waiting for an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStop {
    /// Requested stop.
    pub place: Place,
    /// When the request was sent.
    pub requested_at: Instant,
}

/// How a stop request was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Accepted,
    Declined,
}

/// Stop requests sent from this rear seat, keyed by request id.
#[derive(Debug, Default)]
pub struct StopRequestTracker {
    pending: HashMap<String, PendingStop>,
}

impl StopRequestTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request and return the payload to send.
    pub fn request(&mut self, place: Place, now: Instant) -> StopRequest {
        let request_id = Uuid::new_v4().to_string();
        info!(request_id = %request_id, place = %place.name, "Requesting stop");
        self.pending.insert(
            request_id.clone(),
            PendingStop {
                place: place.clone(),
                requested_at: now,
            },
        );
        StopRequest { request_id, place }
    }

    /// Settle a pending request from a main display's answer. Answers to
    /// requests we never sent, or already settled, return `None`.
    pub fn observe(&mut self, payload: &Payload) -> Option<(String, PendingStop, StopOutcome)> {
        let (request_id, outcome) = match payload {
            Payload::WaypointAdded(added) => (added.request_id.as_deref()?, StopOutcome::Accepted),
            Payload::StopRequestDeclined(declined) => {
                (declined.request_id.as_str(), StopOutcome::Declined)
            }
            _ => return None,
        };
        let pending = self.pending.remove(request_id)?;
        debug!(request_id, ?outcome, "Stop request settled");
        Some((request_id.to_string(), pending, outcome))
    }

    /// Withdraw a request and return the payload telling the main display.
    pub fn cancel(&mut self, request_id: &str) -> ReplicationResult<StopRequestRef> {
        match self.pending.remove(request_id) {
            Some(_) => {
                info!(request_id, "Stop request cancelled");
                Ok(StopRequestRef {
                    request_id: request_id.to_string(),
                })
            }
            None => Err(ReplicationError::UnknownStopRequest(request_id.to_string())),
        }
    }

    /// Pending request by id.
    pub fn get(&self, request_id: &str) -> Option<&PendingStop> {
        self.pending.get(request_id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
