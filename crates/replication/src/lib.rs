//! Convoy Navigation - Replication.
//!
//! Decides what a device does with a message relayed from a peer:
//!
//! - `policy` - static rule table keyed by receiving role, sender relation and message type
//! - `camera` - how a mirrored position moves the map camera
//! - `stop_request` - stop requests a rear display has sent and not yet seen resolved
//! - `prompt` - accept/decline prompts that auto-accept when their deadline passes
//! - `session` - per-device state machine that turns messages into [`SessionEffect`]s.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod camera;
pub mod config;
pub mod error;
pub mod policy;
pub mod prompt;
pub mod session;
pub mod stop_request;

pub use camera::{CameraDirective, camera_directive};
pub use config::ReplicationConfig;
pub use error::{ReplicationError, ReplicationResult};
pub use policy::{Action, ReceiverClass, ReplicationPolicy, SenderRelation};
pub use prompt::{Prompt, PromptId, PromptQueue, PromptSource};
pub use session::{DeviceSession, MirrorState, SessionEffect};
pub use stop_request::{PendingStop, StopOutcome, StopRequestTracker};
