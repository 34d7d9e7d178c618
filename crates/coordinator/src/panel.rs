//! Side-panel lifecycle and command hand-off.
//!
//! A panel instance is `NotReady` until it announces itself with
//! `PanelReady`. Commands issued before that are held, one at a time, until
//! the panel is ready or the hold times out.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::PanelInstanceId,
    protocol::{Command, ExtensionMessage},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{bus::Mailbox, executor::PanelInput};

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_millis(1500);

/// Platform hook that surfaces the side panel. Implementations de-duplicate
/// repeated opens themselves.
pub trait PanelSurface: Send + Sync {
    fn open(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelReadiness {
    NotReady,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    ReadinessTimeout,
    Superseded,
    SurfaceUnavailable,
    MailboxClosed,
}

impl DeliveryFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadinessTimeout => "panel did not become ready in time",
            Self::Superseded => "superseded by a newer command",
            Self::SurfaceUnavailable => "panel could not be opened",
            Self::MailboxClosed => "panel mailbox closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedCommand {
    pub command: Command,
    pub reason: DeliveryFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFailed {
    pub dropped: Option<DroppedCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Forwarded,
    Held { superseded: Option<DroppedCommand> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Repeated signal from the current instance.
    AlreadyReady,
    Ready { flushed: Option<Command> },
}

struct PendingCommand {
    command: Command,
    received_at: Instant,
    deadline: Instant,
}

pub struct PanelCoordinator {
    surface: Arc<dyn PanelSurface>,
    port: Mailbox<PanelInput>,
    panel: Option<PanelInstanceId>,
    readiness: PanelReadiness,
    pending: Option<PendingCommand>,
    hold_timeout: Duration,
}

impl PanelCoordinator {
    pub fn new(
        surface: Arc<dyn PanelSurface>,
        port: Mailbox<PanelInput>,
        hold_timeout: Duration,
    ) -> Self {
        Self {
            surface,
            port,
            panel: None,
            readiness: PanelReadiness::NotReady,
            pending: None,
            hold_timeout,
        }
    }

    pub fn readiness(&self) -> PanelReadiness {
        self.readiness
    }

    pub fn current_panel(&self) -> Option<PanelInstanceId> {
        self.panel
    }

    pub fn port(&self) -> &Mailbox<PanelInput> {
        &self.port
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Asks the platform to show the panel. Opening says nothing about
    /// readiness. If the surface refuses, any held command is dropped.
    pub fn open(&mut self) -> Result<(), OpenFailed> {
        if let Err(err) = self.surface.open() {
            warn!(error = %err, "panel surface refused to open");
            let dropped = self.pending.take().map(|pending| DroppedCommand {
                command: pending.command,
                reason: DeliveryFailure::SurfaceUnavailable,
            });
            return Err(OpenFailed { dropped });
        }
        debug!(readiness = ?self.readiness, "panel open requested");
        Ok(())
    }

    pub fn deliver(&mut self, command: Command, now: Instant) -> Result<Delivery, DroppedCommand> {
        if self.readiness == PanelReadiness::Ready {
            self.forward(command, now)?;
            return Ok(Delivery::Forwarded);
        }

        debug!(command = command.name(), "panel not ready; holding command");
        let superseded = self
            .pending
            .replace(PendingCommand {
                command,
                received_at: now,
                deadline: now + self.hold_timeout,
            })
            .map(|previous| DroppedCommand {
                command: previous.command,
                reason: DeliveryFailure::Superseded,
            });
        Ok(Delivery::Held { superseded })
    }

    /// Handles the panel's readiness signal. A signal from a new instance
    /// starts a new lifetime; a held command is flushed if still fresh.
    pub fn mark_ready(
        &mut self,
        panel_id: PanelInstanceId,
        now: Instant,
    ) -> Result<ReadyOutcome, DroppedCommand> {
        if self.panel == Some(panel_id) && self.readiness == PanelReadiness::Ready {
            return Ok(ReadyOutcome::AlreadyReady);
        }
        if let Some(previous) = self.panel.filter(|id| *id != panel_id) {
            info!(%previous, %panel_id, "panel instance replaced");
        }
        self.panel = Some(panel_id);
        self.readiness = PanelReadiness::Ready;
        info!(%panel_id, "panel ready");

        let Some(pending) = self.pending.take() else {
            return Ok(ReadyOutcome::Ready { flushed: None });
        };
        if pending.deadline <= now {
            return Err(DroppedCommand {
                command: pending.command,
                reason: DeliveryFailure::ReadinessTimeout,
            });
        }
        self.forward(pending.command.clone(), pending.received_at)?;
        Ok(ReadyOutcome::Ready {
            flushed: Some(pending.command),
        })
    }

    pub fn panel_closed(&mut self, panel_id: PanelInstanceId) {
        if self.panel == Some(panel_id) {
            info!(%panel_id, "panel closed");
            self.panel = None;
            self.readiness = PanelReadiness::NotReady;
        } else {
            debug!(%panel_id, "ignoring close from stale panel instance");
        }
    }

    /// Drops the held command once its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<DroppedCommand> {
        let expired = self.pending.as_ref().is_some_and(|p| p.deadline <= now);
        if !expired {
            return None;
        }
        self.pending.take().map(|pending| DroppedCommand {
            command: pending.command,
            reason: DeliveryFailure::ReadinessTimeout,
        })
    }

    /// Posts the command stamped with the time it was first handed over.
    fn forward(&mut self, command: Command, received_at: Instant) -> Result<(), DroppedCommand> {
        let name = command.name();
        let message = ExtensionMessage::PanelCommand(command.clone());
        if self.port.post(PanelInput::message(message, received_at)) {
            debug!(command = name, "command forwarded to panel");
            return Ok(());
        }
        self.panel = None;
        self.readiness = PanelReadiness::NotReady;
        Err(DroppedCommand {
            command,
            reason: DeliveryFailure::MailboxClosed,
        })
    }
}

#[cfg(test)]
#[path = "tests/panel_tests.rs"]
mod tests;
