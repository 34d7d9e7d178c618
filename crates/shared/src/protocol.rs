use serde::{Deserialize, Serialize};

use crate::domain::{CabinetName, CaptureOrigin, LengthBounds, PanelInstanceId};

/// Normalized instruction for the side panel. Built by the background router,
/// handed to the panel exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    PromptForDestination {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        source_url: String,
    },
    DeliverText {
        text: String,
        source_url: String,
        destination: CabinetName,
        origin: CaptureOrigin,
    },
    ShowError {
        message: String,
    },
    ShowInfo {
        message: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PromptForDestination { .. } => "prompt_for_destination",
            Self::DeliverText { .. } => "deliver_text",
            Self::ShowError { .. } => "show_error",
            Self::ShowInfo { .. } => "show_info",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::ShowError {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::ShowInfo {
            message: message.into(),
        }
    }
}

/// Read-only copy of the panel's selection state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub destination: Option<CabinetName>,
    pub bounds: LengthBounds,
}

impl SessionSnapshot {
    pub fn without_destination(bounds: LengthBounds) -> Self {
        Self {
            destination: None,
            bounds,
        }
    }
}

/// Messages exchanged between execution contexts on the extension bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessage {
    DragDropText { text: String },
    PanelCommand(Command),
    PanelReady { panel_id: PanelInstanceId },
    PanelClosed { panel_id: PanelInstanceId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: ExtensionMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
}

impl Envelope {
    pub fn internal(message: ExtensionMessage) -> Self {
        Self {
            message,
            sender: None,
        }
    }

    pub fn from_tab(message: ExtensionMessage, tab_url: impl Into<String>) -> Self {
        Self {
            message,
            sender: Some(SenderInfo {
                tab_url: Some(tab_url.into()),
            }),
        }
    }

    pub fn sender_url(&self) -> Option<&str> {
        self.sender.as_ref().and_then(|s| s.tab_url.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CabinetSummary {
    pub name: CabinetName,
    #[serde(default)]
    pub chunk_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCabinetsResponse {
    pub success: bool,
    #[serde(default)]
    pub cabinets: Vec<CabinetSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCabinetRequest {
    pub cabinet_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCabinetRequest {
    pub cabinet_name: String,
    pub text: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCabinetParams {
    pub cabinet_name: String,
    pub query: String,
    pub top_k: u32,
    pub similarity_threshold: f64,
}

/// One raw hit; score fields are loosely typed because servers disagree on
/// the field name and sometimes send numbers as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSearchResult {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCabinetResponse {
    pub success: bool,
    #[serde(default)]
    pub results_found: Option<usize>,
    #[serde(default)]
    pub results: Vec<RawSearchResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body in the `{"detail": ...}` shape; `detail` may be a string or a
/// structured validation report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_command_uses_tagged_wire_shape() {
        let message = ExtensionMessage::PanelCommand(Command::error("boom"));
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["type"], "PANEL_COMMAND");
        assert_eq!(json["payload"]["type"], "show_error");
        assert_eq!(json["payload"]["payload"]["message"], "boom");
    }

    #[test]
    fn drag_drop_message_matches_page_script_name() {
        let json = serde_json::to_value(ExtensionMessage::DragDropText {
            text: "hello".into(),
        })
        .expect("serialize");
        assert_eq!(json["type"], "DRAG_DROP_TEXT");
    }

    #[test]
    fn error_body_detail_accepts_strings_and_structures() {
        let plain: ErrorBody =
            serde_json::from_str(r#"{"detail":"Cabinet already exists"}"#).expect("decode");
        assert_eq!(plain.detail_text().as_deref(), Some("Cabinet already exists"));

        let structured: ErrorBody =
            serde_json::from_str(r#"{"detail":[{"msg":"field required"}]}"#).expect("decode");
        assert!(structured
            .detail_text()
            .expect("detail")
            .contains("field required"));

        let missing: ErrorBody = serde_json::from_str("{}").expect("decode");
        assert_eq!(missing.detail_text(), None);
    }

    #[test]
    fn cabinet_listing_tolerates_missing_counts() {
        let listing: ListCabinetsResponse = serde_json::from_str(
            r#"{"success":true,"cabinets":[{"name":"notes"},{"name":"work","chunk_count":4}]}"#,
        )
        .expect("decode");
        assert_eq!(listing.cabinets[0].chunk_count, None);
        assert_eq!(listing.cabinets[1].chunk_count, Some(4));
    }
}
