//! Event loop of one display.
//!
//! A single task owns the [`Controller`]. It multiplexes the tick interval,
//! relayed messages forwarded from the sync client subscriber, user commands
//! and the nearest prompt deadline, then flushes the controller's outbox.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use convoy_nav_engine::{AvoidanceFlags, RouteProvider, VoiceSink};
use convoy_replication::PromptId;
use convoy_schemas::{ConvoyMessage, DeviceRole, Payload, Place};
use convoy_sync_client::{SyncClient, Subscription};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::controller::Controller;

/// User intent from whatever front end drives the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DashboardCommand {
    SetDestination { place: Place },
    SetAvoidance { avoid: AvoidanceFlags },
    StartNavigation,
    EndNavigation,
    Resume,
    RequestStop { place: Place },
    CancelStop { request_id: String },
    AcceptPrompt { id: u64 },
    DeclinePrompt { id: u64 },
    SelectPlace { place: Option<Place> },
}

/// A display connected to the relay, ready to run its event loop.
pub struct Dashboard {
    controller: Controller,
    client: SyncClient,
    inbound: mpsc::UnboundedReceiver<ConvoyMessage>,
    _subscription: Subscription,
    tick_period: Duration,
    startup_destination: Option<Place>,
    auto_start: bool,
}

impl Dashboard {
    /// Connect to the relay and build the controller for the configured role.
    pub fn start(
        config: DashboardConfig,
        provider: Arc<dyn RouteProvider>,
        voice: Arc<dyn VoiceSink>,
    ) -> Result<Self> {
        let role = config.sync.requested_role.unwrap_or(DeviceRole::LEAD_MAIN);
        let client = SyncClient::start(config.sync.clone())?;
        let (tx, inbound) = mpsc::unbounded_channel();
        let subscription = client.subscribe(move |message| {
            tx.send(message.clone())?;
            Ok(())
        });
        let tick_period = config.tick_period();
        let startup_destination = config.destination.clone();
        let auto_start = config.auto_start;
        let controller = Controller::new(role, config, provider, voice);
        Ok(Self {
            controller,
            client,
            inbound,
            _subscription: subscription,
            tick_period,
            startup_destination,
            auto_start,
        })
    }

    /// Controller state before the loop starts.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Sync client this display talks through.
    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    /// Run until `shutdown` resolves, then disconnect from the relay.
    pub async fn run<F>(
        mut self,
        mut commands: mpsc::UnboundedReceiver<DashboardCommand>,
        shutdown: F,
    ) -> Result<Controller>
    where
        F: Future<Output = ()>,
    {
        let mut ticks = tokio::time::interval(self.tick_period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        self.controller.announce_reset();
        self.autostart().await;
        self.flush();

        let mut commands_open = true;
        loop {
            let deadline = self.controller.next_deadline().map(Instant::from_std);

            tokio::select! {
                _ = &mut shutdown => break,
                now = ticks.tick() => self.controller.tick(now.into_std()),
                Some(message) = self.inbound.recv() => {
                    if let Payload::RoleAssigned(assigned) = &message.payload {
                        self.controller.set_role(assigned.assigned_role);
                    }
                    self.controller.handle_message(&message, Instant::now().into_std()).await;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.apply(command).await,
                    None => commands_open = false,
                },
                _ = sleep_until_opt(deadline) => {
                    self.controller.expire_prompts(Instant::now().into_std()).await;
                }
            }
            self.flush();
        }

        info!("Dashboard stopping");
        self.client.disconnect().await;
        Ok(self.controller)
    }

    async fn autostart(&mut self) {
        let Some(destination) = self.startup_destination.take() else {
            return;
        };
        if !self.controller.role().is_main() {
            return;
        }
        if self.controller.set_destination(destination).await && self.auto_start {
            self.controller.start_navigation();
        }
    }

    async fn apply(&mut self, command: DashboardCommand) {
        debug!(?command, "Command");
        let now = Instant::now().into_std();
        let result = match command {
            DashboardCommand::SetDestination { place } => {
                self.controller.set_destination(place).await;
                Ok(())
            }
            DashboardCommand::SetAvoidance { avoid } => {
                self.controller.set_avoidance(avoid).await;
                Ok(())
            }
            DashboardCommand::StartNavigation => {
                self.controller.start_navigation();
                Ok(())
            }
            DashboardCommand::EndNavigation => {
                self.controller.end_navigation();
                Ok(())
            }
            DashboardCommand::Resume => {
                self.controller.resume();
                Ok(())
            }
            DashboardCommand::RequestStop { place } => {
                self.controller.request_stop(place, now).await;
                Ok(())
            }
            DashboardCommand::CancelStop { request_id } => {
                self.controller.cancel_stop(&request_id).await
            }
            DashboardCommand::AcceptPrompt { id } => self.controller.accept_prompt(PromptId(id)).await,
            DashboardCommand::DeclinePrompt { id } => {
                self.controller.decline_prompt(PromptId(id)).await
            }
            DashboardCommand::SelectPlace { place } => {
                self.controller.select_place(place);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Command failed");
        }
    }

    fn flush(&mut self) {
        for payload in self.controller.drain_outbox() {
            let kind = payload.kind();
            if let Err(e) = self.client.send(payload) {
                warn!(%kind, error = %e, "Broadcast failed");
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
