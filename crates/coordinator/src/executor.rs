//! Side-panel context: owns the cabinet selection, executes commands from
//! the background and the user's own panel actions.

use std::sync::Arc;

use cabinet_client::{CabinetApi, CreateOutcome, DeleteOutcome, HealthStatus, QueryOptions};
use shared::{
    domain::{CabinetName, CaptureOrigin, PanelInstanceId},
    error::{ErrorCode, ReportedError, ValidationError},
    protocol::{Command, Envelope, ExtensionMessage, SessionSnapshot},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    background::BackgroundInput,
    bus::Mailbox,
    dedup::DropDeduplicator,
    notices::{ConnectionStatus, PanelError, PanelErrorContext, PanelNotice},
    session::CabinetSessionState,
    settings::SettingsStore,
};

pub const PROMPT_MESSAGE: &str = "Please select a cabinet to add the selected text";
pub const NO_CABINET_MESSAGE: &str = "No cabinet selected";
const LOCAL_DROP_SOURCE: &str = "Drag & Drop";

/// User interactions inside the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelAction {
    SelectCabinet(CabinetName),
    ClearSelection,
    CreateCabinet { name: String },
    DeleteSelected,
    Search {
        query: String,
        options: Option<QueryOptions>,
    },
    SaveBounds { min: usize, max: usize },
    RefreshCabinets,
    CheckConnection,
    LocalDrop { text: String },
}

/// Everything the panel inbox carries, stamped when it was posted. Drop
/// de-duplication compares these stamps, not the time the panel gets around
/// to an input.
#[derive(Debug)]
pub enum PanelInput {
    Message {
        message: ExtensionMessage,
        received_at: Instant,
    },
    Action {
        action: PanelAction,
        received_at: Instant,
    },
}

impl PanelInput {
    pub fn message(message: ExtensionMessage, received_at: Instant) -> Self {
        Self::Message {
            message,
            received_at,
        }
    }

    pub fn action(action: PanelAction) -> Self {
        Self::Action {
            action,
            received_at: Instant::now(),
        }
    }
}

pub struct PanelExecutor {
    panel_id: PanelInstanceId,
    api: Arc<dyn CabinetApi>,
    store: SettingsStore,
    session: CabinetSessionState,
    dedup: DropDeduplicator,
    published: watch::Sender<SessionSnapshot>,
    background: Mailbox<BackgroundInput>,
    notices: broadcast::Sender<PanelNotice>,
}

impl PanelExecutor {
    pub fn new(
        api: Arc<dyn CabinetApi>,
        store: SettingsStore,
        background: Mailbox<BackgroundInput>,
        notices: broadcast::Sender<PanelNotice>,
    ) -> Self {
        let session = CabinetSessionState::start(store.settings().bounds());
        let dedup = DropDeduplicator::new(store.settings().dedup_window());
        let (published, _) = watch::channel(session.snapshot());
        Self {
            panel_id: PanelInstanceId::new(),
            api,
            store,
            session,
            dedup,
            published,
            background,
            notices,
        }
    }

    pub fn panel_id(&self) -> PanelInstanceId {
        self.panel_id
    }

    pub fn session(&self) -> &CabinetSessionState {
        &self.session
    }

    /// Read-only view of the selection and bounds, updated on every change.
    /// Readers never wait on the panel's own work.
    pub fn session_feed(&self) -> watch::Receiver<SessionSnapshot> {
        self.published.subscribe()
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PanelInput>) {
        self.start().await;
        while let Some(input) = inbox.recv().await {
            self.handle(input).await;
        }
        info!(panel_id = %self.panel_id, "panel inbox closed");
        self.background
            .post(BackgroundInput::Message(Envelope::internal(
                ExtensionMessage::PanelClosed {
                    panel_id: self.panel_id,
                },
            )));
    }

    /// Announces the panel, then loads remote state. Readiness does not wait
    /// on the network.
    pub async fn start(&mut self) {
        info!(panel_id = %self.panel_id, "panel starting");
        self.publish_session();
        self.notify(PanelNotice::BoundsUpdated(self.session.bounds()));
        self.background
            .post(BackgroundInput::Message(Envelope::internal(
                ExtensionMessage::PanelReady {
                    panel_id: self.panel_id,
                },
            )));

        if self.check_connection().await {
            self.refresh_cabinets().await;
        }
    }

    pub async fn handle(&mut self, input: PanelInput) {
        match input {
            PanelInput::Message {
                message: ExtensionMessage::PanelCommand(command),
                received_at,
            } => self.execute_at(command, received_at).await,
            PanelInput::Message { message, .. } => {
                debug!(?message, "panel ignoring message not addressed to it");
            }
            PanelInput::Action {
                action,
                received_at,
            } => self.perform_at(action, received_at).await,
        }
    }

    pub async fn execute(&mut self, command: Command) {
        self.execute_at(command, Instant::now()).await
    }

    async fn execute_at(&mut self, command: Command, received_at: Instant) {
        debug!(command = command.name(), "executing panel command");
        match command {
            Command::DeliverText {
                text,
                source_url,
                destination,
                origin,
            } => {
                let is_drag = origin == CaptureOrigin::DragDrop;
                if is_drag && !self.dedup.register(&text, received_at) {
                    return;
                }
                self.add_text(&destination, &text, &source_url).await;
            }
            Command::PromptForDestination { text, source_url } => {
                self.notify(PanelNotice::Prompt { text, source_url });
                self.notify(PanelNotice::info(PROMPT_MESSAGE));
            }
            Command::ShowError { message } => self.notify(PanelNotice::Error(PanelError::new(
                PanelErrorContext::Capture,
                ReportedError::new(ErrorCode::Validation, message),
            ))),
            Command::ShowInfo { message } => self.notify(PanelNotice::info(message)),
        }
    }

    pub async fn perform(&mut self, action: PanelAction) {
        self.perform_at(action, Instant::now()).await
    }

    async fn perform_at(&mut self, action: PanelAction, received_at: Instant) {
        match action {
            PanelAction::SelectCabinet(name) => {
                info!(cabinet = %name, "cabinet selected");
                self.session.select(name);
                self.publish_session();
            }
            PanelAction::ClearSelection => {
                self.session.clear();
                self.publish_session();
            }
            PanelAction::CreateCabinet { name } => self.create_cabinet(&name).await,
            PanelAction::DeleteSelected => self.delete_selected().await,
            PanelAction::Search { query, options } => {
                let options = options.unwrap_or_else(|| self.store.settings().query_options());
                self.search(&query, options).await
            }
            PanelAction::SaveBounds { min, max } => self.save_bounds(min, max),
            PanelAction::RefreshCabinets => self.refresh_cabinets().await,
            PanelAction::CheckConnection => {
                if self.check_connection().await {
                    self.refresh_cabinets().await;
                }
            }
            PanelAction::LocalDrop { text } => {
                let Some(destination) = self.session.current().cloned() else {
                    self.no_cabinet(PanelErrorContext::Capture);
                    return;
                };
                if !self.dedup.register(&text, received_at) {
                    return;
                }
                self.add_text(&destination, &text, LOCAL_DROP_SOURCE).await;
            }
        }
    }

    async fn add_text(&mut self, destination: &CabinetName, text: &str, source_url: &str) {
        if let Err(violation) = self.session.validate_length(text).into_result() {
            self.fail_validation(PanelErrorContext::AddText, violation);
            return;
        }
        match self.api.add_text(destination, text, source_url).await {
            Ok(_) => {
                info!(cabinet = %destination, "text added");
                self.notify(PanelNotice::TextAdded {
                    cabinet: destination.clone(),
                    source_url: source_url.to_string(),
                });
                self.notify(PanelNotice::success(format!("Added text to \"{destination}\"")));
                self.refresh_cabinets().await;
            }
            Err(err) => {
                warn!(cabinet = %destination, error = %err, "add to cabinet failed");
                self.notify(PanelNotice::Error(PanelError::from_client(
                    PanelErrorContext::AddText,
                    &err,
                )));
            }
        }
    }

    async fn create_cabinet(&mut self, raw_name: &str) {
        match self.api.create_cabinet(raw_name).await {
            Ok(CreateOutcome::Created { name, .. }) => {
                info!(cabinet = %name, "cabinet created");
                self.notify(PanelNotice::success(format!("Created cabinet \"{name}\"")));
                self.session.select(name);
                self.publish_session();
                self.refresh_cabinets().await;
            }
            Ok(CreateOutcome::Conflict { detail }) => {
                self.notify(PanelNotice::Error(PanelError::new(
                    PanelErrorContext::CreateCabinet,
                    ReportedError::new(ErrorCode::Conflict, detail),
                )));
            }
            Err(err) => self.notify(PanelNotice::Error(PanelError::from_client(
                PanelErrorContext::CreateCabinet,
                &err,
            ))),
        }
    }

    async fn delete_selected(&mut self) {
        let Some(name) = self.session.current().cloned() else {
            self.no_cabinet(PanelErrorContext::DeleteCabinet);
            return;
        };
        match self.api.delete_cabinet(&name).await {
            Ok(DeleteOutcome::Deleted { .. }) => {
                info!(cabinet = %name, "cabinet deleted");
                self.notify(PanelNotice::success(format!("Deleted cabinet \"{name}\"")));
            }
            Ok(DeleteOutcome::NotFound { detail }) => {
                self.notify(PanelNotice::Error(PanelError::new(
                    PanelErrorContext::DeleteCabinet,
                    ReportedError::new(ErrorCode::Server, detail),
                )));
            }
            Err(err) => {
                self.notify(PanelNotice::Error(PanelError::from_client(
                    PanelErrorContext::DeleteCabinet,
                    &err,
                )));
                return;
            }
        }
        self.session.clear();
        self.publish_session();
        self.refresh_cabinets().await;
    }

    async fn search(&mut self, query: &str, options: QueryOptions) {
        let Some(cabinet) = self.session.current().cloned() else {
            self.no_cabinet(PanelErrorContext::Search);
            return;
        };
        let query = query.trim();
        if query.is_empty() {
            self.fail_validation(PanelErrorContext::Search, ValidationError::EmptyQuery);
            return;
        }
        match self.api.query(&cabinet, query, options).await {
            Ok(hits) => {
                debug!(cabinet = %cabinet, hits = hits.len(), "search finished");
                self.notify(PanelNotice::SearchResults {
                    cabinet,
                    query: query.to_string(),
                    hits,
                });
            }
            Err(err) => self.notify(PanelNotice::Error(PanelError::from_client(
                PanelErrorContext::Search,
                &err,
            ))),
        }
    }

    fn save_bounds(&mut self, min: usize, max: usize) {
        let bounds = match self.session.update_bounds(min, max) {
            Ok(bounds) => bounds,
            Err(violation) => {
                self.fail_validation(PanelErrorContext::SaveBounds, violation);
                return;
            }
        };
        if let Err(err) = self.store.update_bounds(bounds) {
            warn!(error = %err, "failed to persist length bounds");
            self.notify(PanelNotice::Error(PanelError::new(
                PanelErrorContext::SaveBounds,
                ReportedError::new(ErrorCode::Internal, format!("{err:#}")),
            )));
        } else {
            self.notify(PanelNotice::success("Settings saved successfully"));
        }
        self.notify(PanelNotice::BoundsUpdated(bounds));
        self.publish_session();
    }

    async fn refresh_cabinets(&mut self) {
        match self.api.list_cabinets().await {
            Ok(cabinets) => self.notify(PanelNotice::CabinetsUpdated(cabinets)),
            Err(err) => {
                warn!(error = %err, "failed to load cabinets");
                self.notify(PanelNotice::Error(PanelError::from_client(
                    PanelErrorContext::LoadCabinets,
                    &err,
                )));
            }
        }
    }

    async fn check_connection(&mut self) -> bool {
        self.notify(PanelNotice::ConnectionStatus(ConnectionStatus::Connecting));
        let (status, connected) = match self.api.health().await {
            HealthStatus::Healthy => (ConnectionStatus::Connected, true),
            HealthStatus::Unhealthy { status } => {
                warn!(%status, "cabinet server reports unhealthy");
                (ConnectionStatus::ServerError, false)
            }
            HealthStatus::Unreachable { reason } => {
                warn!(%reason, "cabinet server unreachable");
                self.notify(PanelNotice::Error(PanelError::new(
                    PanelErrorContext::Startup,
                    ReportedError::new(
                        ErrorCode::Transport,
                        "Cannot connect to the cabinet server",
                    ),
                )));
                (ConnectionStatus::Disconnected, false)
            }
        };
        self.notify(PanelNotice::ConnectionStatus(status));
        connected
    }

    fn publish_session(&self) {
        let snapshot = self.session.snapshot();
        self.notify(PanelNotice::SelectionChanged(snapshot.destination.clone()));
        self.published.send_replace(snapshot);
    }

    fn no_cabinet(&self, context: PanelErrorContext) {
        self.notify(PanelNotice::Error(PanelError::new(
            context,
            ReportedError::new(ErrorCode::NoDestinationSelected, NO_CABINET_MESSAGE),
        )));
    }

    fn fail_validation(&self, context: PanelErrorContext, violation: ValidationError) {
        debug!(error = %violation, "panel input rejected");
        self.notify(PanelNotice::Error(PanelError::validation(context, violation)));
    }

    fn notify(&self, notice: PanelNotice) {
        if self.notices.send(notice).is_err() {
            debug!("no panel notice subscribers");
        }
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
