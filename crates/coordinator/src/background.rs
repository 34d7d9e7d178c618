//! Background context: receives triggers and page messages, routes them
//! into commands and hands those to the panel.

use shared::protocol::{Command, Envelope, ExtensionMessage, SessionSnapshot};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    notices::CoordinatorEvent,
    panel::{Delivery, DroppedCommand, PanelCoordinator, PanelReadiness, ReadyOutcome},
    router::{route_context_menu, route_forwarded_drag_drop},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ContextMenu {
        selection_text: Option<String>,
        tab_url: Option<String>,
    },
    IconActivated,
}

#[derive(Debug)]
pub enum BackgroundInput {
    Trigger(Trigger),
    Message(Envelope),
}

pub struct BackgroundService {
    panel: PanelCoordinator,
    session: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl BackgroundService {
    /// `session` is the panel's published selection and bounds.
    pub fn new(
        panel: PanelCoordinator,
        session: watch::Receiver<SessionSnapshot>,
        events: broadcast::Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            panel,
            session,
            events,
        }
    }

    pub fn panel(&self) -> &PanelCoordinator {
        &self.panel
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<BackgroundInput>) {
        info!("background service started");
        loop {
            let deadline = self.panel.pending_deadline();
            tokio::select! {
                input = inbox.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
                _ = wait_until(deadline) => {
                    if let Some(dropped) = self.panel.expire(Instant::now()) {
                        self.report_failure(&dropped);
                    }
                }
            }
        }
        info!("background inbox closed");
    }

    pub fn handle(&mut self, input: BackgroundInput) {
        match input {
            BackgroundInput::Trigger(trigger) => self.handle_trigger(trigger),
            BackgroundInput::Message(envelope) => self.handle_message(envelope),
        }
    }

    fn handle_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::ContextMenu {
                selection_text,
                tab_url,
            } => {
                let session = self.current_session();
                let decision =
                    route_context_menu(&session, selection_text.as_deref(), tab_url.as_deref());
                debug!(command = decision.command.name(), "context menu routed");
                self.deliver(decision.command);
                if decision.open_panel {
                    self.open_panel();
                }
            }
            Trigger::IconActivated => self.open_panel(),
        }
    }

    fn handle_message(&mut self, envelope: Envelope) {
        let sender_url = envelope.sender_url().map(str::to_string);
        match envelope.message {
            ExtensionMessage::DragDropText { text } => {
                let session = self.current_session();
                let command =
                    route_forwarded_drag_drop(&session, Some(text.as_str()), sender_url.as_deref());
                self.deliver(command);
            }
            ExtensionMessage::PanelReady { panel_id } => {
                self.emit(CoordinatorEvent::PanelReady { panel_id });
                match self.panel.mark_ready(panel_id, Instant::now()) {
                    Ok(ReadyOutcome::Ready {
                        flushed: Some(command),
                    }) => self.emit(CoordinatorEvent::Delivered {
                        command_name: command.name(),
                    }),
                    Ok(_) => {}
                    Err(dropped) => self.report_failure(&dropped),
                }
            }
            ExtensionMessage::PanelClosed { panel_id } => self.panel.panel_closed(panel_id),
            ExtensionMessage::PanelCommand(command) => {
                debug!(command = command.name(), "background ignoring panel command");
            }
        }
    }

    /// Latest published session. A panel that is not ready holds no
    /// destination; its last bounds still apply.
    pub fn current_session(&self) -> SessionSnapshot {
        let published = self.session.borrow().clone();
        if self.panel.readiness() == PanelReadiness::Ready {
            published
        } else {
            SessionSnapshot::without_destination(published.bounds)
        }
    }

    fn deliver(&mut self, command: Command) {
        let command_name = command.name();
        match self.panel.deliver(command, Instant::now()) {
            Ok(Delivery::Forwarded) => self.emit(CoordinatorEvent::Delivered { command_name }),
            Ok(Delivery::Held {
                superseded: Some(dropped),
            }) => self.report_failure(&dropped),
            Ok(Delivery::Held { superseded: None }) => {}
            Err(dropped) => self.report_failure(&dropped),
        }
    }

    fn open_panel(&mut self) {
        match self.panel.open() {
            Ok(()) => self.emit(CoordinatorEvent::PanelOpened),
            Err(failed) => {
                if let Some(dropped) = failed.dropped {
                    self.report_failure(&dropped);
                }
            }
        }
    }

    fn report_failure(&self, dropped: &DroppedCommand) {
        warn!(
            command = dropped.command.name(),
            reason = dropped.reason.as_str(),
            "command delivery failed"
        );
        self.emit(CoordinatorEvent::delivery_failed(dropped));
    }

    fn emit(&self, event: CoordinatorEvent) {
        if self.events.send(event).is_err() {
            debug!("no coordinator event subscribers");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/background_tests.rs"]
mod tests;
