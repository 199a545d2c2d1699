//! Accept/decline prompts with an auto-accept deadline.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use convoy_schemas::{DeviceRole, Place};
use tracing::{debug, info};

use crate::error::{ReplicationError, ReplicationResult};

/// Identifier of an open prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromptId(pub u64);

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a prompt was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// A rear display asked its main display for a stop.
    StopRequest { request_id: String, from: DeviceRole },
    /// The lead vehicle added a waypoint to a trip we are already driving.
    LeadWaypoint { request_id: Option<String> },
}

/// An accept or decline question waiting on the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Prompt identifier.
    pub id: PromptId,
    /// What raised the prompt.
    pub source: PromptSource,
    /// Place the prompt asks about.
    pub place: Place,
    /// When the prompt auto-accepts.
    pub deadline: Instant,
}

impl Prompt {
    /// Stop request id this prompt answers, if any.
    pub fn request_id(&self) -> Option<&str> {
        match &self.source {
            PromptSource::StopRequest { request_id, .. } => Some(request_id),
            PromptSource::LeadWaypoint { request_id } => request_id.as_deref(),
        }
    }

    /// Time left before the prompt auto-accepts.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Open prompts in arrival order.
#[derive(Debug)]
pub struct PromptQueue {
    timeout: Duration,
    next_id: u64,
    open: VecDeque<Prompt>,
}

impl PromptQueue {
    /// Create an empty queue with the given auto-accept timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_id: 1,
            open: VecDeque::new(),
        }
    }

    /// Open a prompt with a deadline `timeout` from `now`.
    pub fn open(&mut self, source: PromptSource, place: Place, now: Instant) -> Prompt {
        let prompt = Prompt {
            id: PromptId(self.next_id),
            source,
            place,
            deadline: now + self.timeout,
        };
        self.next_id += 1;
        info!(prompt = %prompt.id, place = %prompt.place.name, "Prompt opened");
        self.open.push_back(prompt.clone());
        prompt
    }

    /// Close a prompt the user answered.
    pub fn take(&mut self, id: PromptId) -> ReplicationResult<Prompt> {
        let index = self
            .open
            .iter()
            .position(|prompt| prompt.id == id)
            .ok_or(ReplicationError::UnknownPrompt(id.0))?;
        self.open
            .remove(index)
            .ok_or(ReplicationError::UnknownPrompt(id.0))
    }

    /// Drop the prompt opened for a stop request that was withdrawn.
    pub fn withdraw(&mut self, request_id: &str) -> Option<Prompt> {
        let index = self
            .open
            .iter()
            .position(|prompt| prompt.request_id() == Some(request_id))?;
        let prompt = self.open.remove(index)?;
        debug!(prompt = %prompt.id, request_id, "Prompt withdrawn");
        Some(prompt)
    }

    /// Remove and return every prompt whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<Prompt> {
        let mut expired = Vec::new();
        self.open.retain(|prompt| {
            if prompt.deadline <= now {
                expired.push(prompt.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Earliest prompt deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open.iter().map(|prompt| prompt.deadline).min()
    }

    /// Oldest open prompt.
    pub fn front(&self) -> Option<&Prompt> {
        self.open.front()
    }

    /// Number of open prompts.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn stop(id: &str) -> PromptSource {
        PromptSource::StopRequest {
            request_id: id.to_string(),
            from: DeviceRole::LEAD_REAR,
        }
    }

    #[test]
    fn test_expire_returns_only_due_prompts() {
        let start = Instant::now();
        let mut queue = PromptQueue::new(Duration::from_secs(8));
        queue.open(stop("a"), Place::new("A", 0.0, 0.0), start);
        queue.open(stop("b"), Place::new("B", 0.0, 0.0), start + Duration::from_secs(3));

        assert!(queue.expire(start + Duration::from_millis(7_999)).is_empty());
        let due = queue.expire(start + Duration::from_secs(8));
        assert_eq!(due.len(), 1);
        assert_eq!(due.first().and_then(Prompt::request_id), Some("a"));
        assert_eq!(queue.next_deadline(), Some(start + Duration::from_secs(11)));
    }

    #[test]
    fn test_take_and_withdraw() -> TestResult {
        let now = Instant::now();
        let mut queue = PromptQueue::new(Duration::from_secs(8));
        let first = queue.open(stop("a"), Place::new("A", 0.0, 0.0), now);
        queue.open(stop("b"), Place::new("B", 0.0, 0.0), now);

        assert_eq!(queue.take(first.id)?.place.name, "A");
        assert_eq!(queue.take(first.id), Err(ReplicationError::UnknownPrompt(first.id.0)));
        assert!(queue.withdraw("b").is_some());
        assert!(queue.withdraw("b").is_none());
        assert!(queue.is_empty());
        Ok(())
    }
}
