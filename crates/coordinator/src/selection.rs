//! Per-page selection tracking and drag capture.

use std::sync::Arc;

use shared::protocol::{Envelope, ExtensionMessage};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{background::BackgroundInput, bus::Mailbox};

pub const DRAG_MIME_TYPE: &str = "text/plain";

/// Host page hooks. Every call is best-effort.
pub trait PageSurface: Send + Sync {
    fn mark_draggable(&self, anchor: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEffect {
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragTransfer {
    pub mime_type: &'static str,
    pub data: String,
    pub effect: DropEffect,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    selection: String,
    dragging: bool,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer_up(&mut self, selection: Option<&str>) {
        self.selection = selection.map(str::trim).unwrap_or_default().to_string();
        trace!(len = self.selection.len(), "selection recorded");
    }

    pub fn current_selection(&self) -> &str {
        &self.selection
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn drag_start(&mut self) -> Option<DragTransfer> {
        if self.selection.is_empty() {
            return None;
        }
        self.dragging = true;
        Some(DragTransfer {
            mime_type: DRAG_MIME_TYPE,
            data: self.selection.clone(),
            effect: DropEffect::Copy,
        })
    }

    /// Ends a drag. Emits the drag-drop message only if a drag with a
    /// non-empty payload was in progress.
    pub fn drag_end(&mut self) -> Option<ExtensionMessage> {
        if !std::mem::take(&mut self.dragging) || self.selection.is_empty() {
            return None;
        }
        Some(ExtensionMessage::DragDropText {
            text: self.selection.clone(),
        })
    }

    /// Whether the page's default drag-over handling should be suppressed.
    pub fn drag_over(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn select_start(&self, surface: &dyn PageSurface, anchor: &str) {
        if let Err(err) = surface.mark_draggable(anchor) {
            debug!(anchor, error = %err, "could not mark selection container draggable");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    PointerUp { selection: Option<String> },
    DragStart,
    DragEnd,
    DragOver,
    SelectStart { anchor: String },
}

/// Drives one page's tracker, forwarding completed drags to the background
/// tagged with the page URL.
pub async fn run_page_observer(
    tab_url: String,
    surface: Arc<dyn PageSurface>,
    mut events: mpsc::Receiver<PageEvent>,
    background: Mailbox<BackgroundInput>,
) {
    let mut tracker = SelectionTracker::new();
    debug!(%tab_url, "page observer started");
    while let Some(event) = events.recv().await {
        match event {
            PageEvent::PointerUp { selection } => tracker.pointer_up(selection.as_deref()),
            PageEvent::DragStart => {
                if let Some(transfer) = tracker.drag_start() {
                    trace!(len = transfer.data.len(), "drag payload set");
                }
            }
            PageEvent::DragEnd => {
                if let Some(message) = tracker.drag_end() {
                    background.post(BackgroundInput::Message(Envelope::from_tab(
                        message,
                        tab_url.clone(),
                    )));
                }
            }
            PageEvent::DragOver => {
                trace!(suppress = tracker.drag_over(), "drag over");
            }
            PageEvent::SelectStart { anchor } => tracker.select_start(surface.as_ref(), &anchor),
        }
    }
    debug!(%tab_url, "page observer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct BrokenSurface {
        attempts: AtomicUsize,
    }

    impl PageSurface for BrokenSurface {
        fn mark_draggable(&self, _anchor: &str) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("container is detached")
        }
    }

    #[test]
    fn pointer_up_records_trimmed_selection() {
        let mut tracker = SelectionTracker::new();
        tracker.pointer_up(Some("  some words \n"));
        assert_eq!(tracker.current_selection(), "some words");
        tracker.pointer_up(None);
        assert_eq!(tracker.current_selection(), "");
    }

    #[test]
    fn drag_cycle_emits_payload_once() {
        let mut tracker = SelectionTracker::new();
        tracker.pointer_up(Some("dragged words"));

        let transfer = tracker.drag_start().expect("transfer");
        assert_eq!(transfer.mime_type, "text/plain");
        assert_eq!(transfer.effect, DropEffect::Copy);
        assert!(tracker.is_dragging());

        assert_eq!(
            tracker.drag_end(),
            Some(ExtensionMessage::DragDropText {
                text: "dragged words".to_string()
            })
        );
        assert!(!tracker.is_dragging());
        assert_eq!(tracker.drag_end(), None);
    }

    #[test]
    fn drag_without_selection_does_nothing() {
        let mut tracker = SelectionTracker::new();
        assert!(tracker.drag_start().is_none());
        assert!(tracker.drag_end().is_none());
        assert!(!tracker.drag_over());
    }

    #[test]
    fn selection_cleared_mid_drag_emits_nothing() {
        let mut tracker = SelectionTracker::new();
        tracker.pointer_up(Some("dragged words"));
        tracker.drag_start().expect("transfer");
        tracker.pointer_up(Some("   "));
        assert!(tracker.drag_end().is_none());
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn select_start_swallows_surface_failures() {
        let surface = BrokenSurface {
            attempts: AtomicUsize::new(0),
        };
        let tracker = SelectionTracker::new();
        tracker.select_start(&surface, "article > p");
        assert_eq!(surface.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observer_forwards_drag_with_tab_url() {
        struct NoopSurface;
        impl PageSurface for NoopSurface {
            fn mark_draggable(&self, _anchor: &str) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let (events_tx, events_rx) = mpsc::channel(8);
        let (background, mut background_rx) = Mailbox::channel("background", 8);
        let observer = tokio::spawn(run_page_observer(
            "https://example.com/post".to_string(),
            Arc::new(NoopSurface),
            events_rx,
            background,
        ));

        for event in [
            PageEvent::SelectStart {
                anchor: "main".to_string(),
            },
            PageEvent::PointerUp {
                selection: Some("a dragged sentence".to_string()),
            },
            PageEvent::DragStart,
            PageEvent::DragOver,
            PageEvent::DragEnd,
        ] {
            events_tx.send(event).await.expect("send");
        }
        drop(events_tx);
        observer.await.expect("observer");

        match background_rx.recv().await {
            Some(BackgroundInput::Message(envelope)) => {
                assert_eq!(envelope.sender_url(), Some("https://example.com/post"));
                assert_eq!(
                    envelope.message,
                    ExtensionMessage::DragDropText {
                        text: "a dragged sentence".to_string()
                    }
                );
            }
            other => panic!("unexpected background input: {other:?}"),
        }
    }
}
