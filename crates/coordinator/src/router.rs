//! Turns raw triggers into [`Command`]s. Pure: no I/O, no clocks.

use shared::{
    domain::{source_or_unknown, CaptureOrigin},
    protocol::{Command, SessionSnapshot},
};

pub const NO_DESTINATION_MESSAGE: &str = "No destination selected; please select a cabinet first";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub command: Command,
    pub open_panel: bool,
}

/// Context-menu capture. The destination check comes before the length
/// check, so a short selection with no cabinet still prompts.
pub fn route_context_menu(
    session: &SessionSnapshot,
    selected_text: Option<&str>,
    source_url: Option<&str>,
) -> RouteDecision {
    let source_url = source_or_unknown(source_url);
    let Some(destination) = session.destination.clone() else {
        return RouteDecision {
            command: Command::PromptForDestination {
                text: selected_text.map(str::to_string),
                source_url,
            },
            open_panel: true,
        };
    };

    let text = selected_text.unwrap_or_default();
    let command = match session.bounds.check(text).into_result() {
        Ok(()) => Command::DeliverText {
            text: text.to_string(),
            source_url,
            destination,
            origin: CaptureOrigin::ContextMenu,
        },
        Err(violation) => Command::error(violation.to_string()),
    };
    RouteDecision {
        command,
        open_panel: true,
    }
}

/// Drag-drop forwarded from a page. Never prompts: a drop implies the panel
/// is already open.
pub fn route_forwarded_drag_drop(
    session: &SessionSnapshot,
    text: Option<&str>,
    source_url: Option<&str>,
) -> Command {
    let Some(destination) = session.destination.clone() else {
        return Command::error(NO_DESTINATION_MESSAGE);
    };
    let text = text.unwrap_or_default();
    match session.bounds.check(text).into_result() {
        Ok(()) => Command::DeliverText {
            text: text.to_string(),
            source_url: source_or_unknown(source_url),
            destination,
            origin: CaptureOrigin::DragDrop,
        },
        Err(violation) => Command::error(violation.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
