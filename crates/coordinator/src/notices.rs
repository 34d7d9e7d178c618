//! Panel notices and coordinator events.

use cabinet_client::{CabinetDescriptor, ClientError, SearchHit};
use chrono::{DateTime, Utc};
use shared::{
    domain::{CabinetName, LengthBounds, PanelInstanceId},
    error::{ErrorCode, ReportedError, ValidationError},
};

use crate::panel::DroppedCommand;

/// What the side panel shows the user.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelNotice {
    Message {
        kind: NoticeKind,
        text: String,
    },
    Error(PanelError),
    Prompt {
        text: Option<String>,
        source_url: String,
    },
    CabinetsUpdated(Vec<CabinetDescriptor>),
    SelectionChanged(Option<CabinetName>),
    SearchResults {
        cabinet: CabinetName,
        query: String,
        hits: Vec<SearchHit>,
    },
    ConnectionStatus(ConnectionStatus),
    BoundsUpdated(LengthBounds),
    TextAdded {
        cabinet: CabinetName,
        source_url: String,
    },
}

impl PanelNotice {
    pub fn info(text: impl Into<String>) -> Self {
        Self::Message {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::Message {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    ServerError,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelErrorContext {
    Startup,
    LoadCabinets,
    CreateCabinet,
    DeleteCabinet,
    AddText,
    Search,
    SaveBounds,
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelError {
    context: PanelErrorContext,
    reported: ReportedError,
}

impl PanelError {
    pub fn new(context: PanelErrorContext, reported: ReportedError) -> Self {
        Self { context, reported }
    }

    pub fn validation(context: PanelErrorContext, error: ValidationError) -> Self {
        Self::new(context, error.into())
    }

    pub fn from_client(context: PanelErrorContext, error: &ClientError) -> Self {
        Self::new(context, describe_client_error(error))
    }

    pub fn context(&self) -> PanelErrorContext {
        self.context
    }

    pub fn code(&self) -> ErrorCode {
        self.reported.code
    }

    pub fn message(&self) -> &str {
        &self.reported.message
    }

    pub fn is_retryable(&self) -> bool {
        self.reported.code.is_transient()
    }
}

pub fn describe_client_error(error: &ClientError) -> ReportedError {
    let message = match error {
        ClientError::Validation(inner) => inner.to_string(),
        ClientError::Timeout { after, .. } => format!(
            "The cabinet server did not answer within {}s; try again",
            after.as_secs_f64()
        ),
        ClientError::Transport { .. } => {
            "Cannot connect to the cabinet server; check that it is running".to_string()
        }
        ClientError::Server {
            detail: Some(detail),
            ..
        } => detail.clone(),
        ClientError::Server { status, .. } => format!("Cabinet server error (HTTP {status})"),
        ClientError::Decode { .. } => "Cabinet server sent an unexpected response".to_string(),
        ClientError::InvalidBaseUrl { url, .. } => format!("Invalid server url: {url}"),
    };
    ReportedError::new(error.code(), message)
}

/// Coordinator-level events for observers outside the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    PanelOpened,
    PanelReady {
        panel_id: PanelInstanceId,
    },
    Delivered {
        command_name: &'static str,
    },
    DeliveryFailed {
        command_name: &'static str,
        reason: &'static str,
        at: DateTime<Utc>,
    },
}

impl CoordinatorEvent {
    pub fn delivery_failed(dropped: &DroppedCommand) -> Self {
        Self::DeliveryFailed {
            command_name: dropped.command.name(),
            reason: dropped.reason.as_str(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_and_transport_failures_are_retryable() {
        let timeout = PanelError::from_client(
            PanelErrorContext::AddText,
            &ClientError::Timeout {
                operation: "add_to_cabinet",
                after: Duration::from_secs(10),
            },
        );
        assert_eq!(timeout.code(), ErrorCode::Timeout);
        assert!(timeout.is_retryable());
        assert!(timeout.message().contains("10s"), "{}", timeout.message());

        let refused = PanelError::from_client(
            PanelErrorContext::LoadCabinets,
            &ClientError::Transport {
                operation: "list_cabinets",
                detail: "connection refused".to_string(),
            },
        );
        assert_eq!(refused.code(), ErrorCode::Transport);
        assert_eq!(refused.context(), PanelErrorContext::LoadCabinets);
    }

    #[test]
    fn server_detail_is_shown_verbatim() {
        let reported = describe_client_error(&ClientError::Server {
            operation: "create_cabinet",
            status: 500,
            detail: Some("disk full".to_string()),
        });
        assert_eq!(reported.message, "disk full");

        let bare = describe_client_error(&ClientError::Server {
            operation: "create_cabinet",
            status: 502,
            detail: None,
        });
        assert_eq!(bare.message, "Cabinet server error (HTTP 502)");
    }

    #[test]
    fn validation_failures_are_not_retryable() {
        let error = PanelError::validation(PanelErrorContext::Search, ValidationError::EmptyQuery);
        assert_eq!(error.code(), ErrorCode::Validation);
        assert!(!error.is_retryable());
        assert_eq!(error.message(), "Please enter a search query");
    }
}
