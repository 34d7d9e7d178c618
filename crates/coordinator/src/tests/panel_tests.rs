use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::*;
use tokio::sync::mpsc;

const HOLD: Duration = Duration::from_millis(1500);

#[derive(Default)]
struct FakeSurface {
    opens: AtomicUsize,
    refuse: AtomicBool,
}

impl PanelSurface for FakeSurface {
    fn open(&self) -> anyhow::Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            anyhow::bail!("no window to attach the panel to");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn coordinator() -> (PanelCoordinator, Arc<FakeSurface>, mpsc::Receiver<PanelInput>) {
    let surface = Arc::new(FakeSurface::default());
    let (port, rx) = Mailbox::channel("panel", 8);
    let coordinator = PanelCoordinator::new(surface.clone(), port, HOLD);
    (coordinator, surface, rx)
}

fn forwarded(rx: &mut mpsc::Receiver<PanelInput>) -> Vec<Command> {
    let mut commands = Vec::new();
    while let Ok(input) = rx.try_recv() {
        if let PanelInput::Message {
            message: ExtensionMessage::PanelCommand(command),
            ..
        } = input
        {
            commands.push(command);
        }
    }
    commands
}

fn prompt(text: &str) -> Command {
    Command::PromptForDestination {
        text: Some(text.to_string()),
        source_url: "https://example.com".to_string(),
    }
}

#[test]
fn starts_not_ready_and_opening_does_not_change_that() {
    let (mut coordinator, surface, _rx) = coordinator();
    assert_eq!(coordinator.readiness(), PanelReadiness::NotReady);
    assert_eq!(coordinator.open(), Ok(()));
    assert_eq!(surface.opens.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.readiness(), PanelReadiness::NotReady);
}

#[test]
fn command_before_ready_is_held_then_flushed_once() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let start = Instant::now();

    let delivery = coordinator.deliver(prompt("hi"), start).expect("deliver");
    assert_eq!(delivery, Delivery::Held { superseded: None });
    assert!(forwarded(&mut rx).is_empty());

    let panel_id = PanelInstanceId::new();
    let outcome = coordinator
        .mark_ready(panel_id, start + Duration::from_millis(200))
        .expect("ready");
    assert_eq!(
        outcome,
        ReadyOutcome::Ready {
            flushed: Some(prompt("hi"))
        }
    );
    assert_eq!(forwarded(&mut rx), vec![prompt("hi")]);

    assert_eq!(
        coordinator.mark_ready(panel_id, start + Duration::from_millis(300)),
        Ok(ReadyOutcome::AlreadyReady)
    );
    assert!(forwarded(&mut rx).is_empty());
}

#[test]
fn flushed_command_keeps_the_time_it_was_handed_over() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let start = Instant::now();
    coordinator.deliver(prompt("hi"), start).expect("deliver");
    coordinator
        .mark_ready(PanelInstanceId::new(), start + Duration::from_millis(900))
        .expect("ready");

    match rx.try_recv() {
        Ok(PanelInput::Message { received_at, .. }) => assert_eq!(received_at, start),
        other => panic!("unexpected panel input: {other:?}"),
    }
}

#[test]
fn ready_panel_receives_commands_immediately() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let now = Instant::now();
    coordinator
        .mark_ready(PanelInstanceId::new(), now)
        .expect("ready");

    let delivery = coordinator
        .deliver(Command::info("saved"), now)
        .expect("deliver");
    assert_eq!(delivery, Delivery::Forwarded);
    assert_eq!(forwarded(&mut rx), vec![Command::info("saved")]);
    assert!(coordinator.pending_deadline().is_none());
}

#[test]
fn newer_command_supersedes_held_one() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let start = Instant::now();
    coordinator.deliver(prompt("first"), start).expect("deliver");

    let delivery = coordinator
        .deliver(prompt("second"), start + Duration::from_millis(10))
        .expect("deliver");
    assert_eq!(
        delivery,
        Delivery::Held {
            superseded: Some(DroppedCommand {
                command: prompt("first"),
                reason: DeliveryFailure::Superseded,
            })
        }
    );

    coordinator
        .mark_ready(PanelInstanceId::new(), start + Duration::from_millis(20))
        .expect("ready");
    assert_eq!(forwarded(&mut rx), vec![prompt("second")]);
}

#[test]
fn held_command_expires_at_deadline() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let start = Instant::now();
    coordinator.deliver(prompt("late"), start).expect("deliver");
    assert_eq!(coordinator.pending_deadline(), Some(start + HOLD));

    assert!(coordinator.expire(start + HOLD - Duration::from_millis(1)).is_none());
    let dropped = coordinator.expire(start + HOLD).expect("expired");
    assert_eq!(dropped.reason, DeliveryFailure::ReadinessTimeout);
    assert!(coordinator.pending_deadline().is_none());

    coordinator
        .mark_ready(PanelInstanceId::new(), start + HOLD + Duration::from_millis(5))
        .expect("ready");
    assert!(forwarded(&mut rx).is_empty());
}

#[test]
fn stale_hold_is_dropped_when_ready_arrives_late() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let start = Instant::now();
    coordinator.deliver(prompt("late"), start).expect("deliver");

    let dropped = coordinator
        .mark_ready(PanelInstanceId::new(), start + HOLD)
        .expect_err("held command should have expired");
    assert_eq!(dropped.command, prompt("late"));
    assert_eq!(dropped.reason, DeliveryFailure::ReadinessTimeout);
    assert_eq!(coordinator.readiness(), PanelReadiness::Ready);
    assert!(forwarded(&mut rx).is_empty());
}

#[test]
fn closing_the_panel_resets_readiness() {
    let (mut coordinator, _surface, mut rx) = coordinator();
    let now = Instant::now();
    let first = PanelInstanceId::new();
    coordinator.mark_ready(first, now).expect("ready");

    coordinator.panel_closed(first);
    assert_eq!(coordinator.readiness(), PanelReadiness::NotReady);
    assert_eq!(coordinator.current_panel(), None);

    let delivery = coordinator.deliver(prompt("again"), now).expect("deliver");
    assert!(matches!(delivery, Delivery::Held { .. }));
    assert!(forwarded(&mut rx).is_empty());
}

#[test]
fn close_from_stale_instance_is_ignored() {
    let (mut coordinator, _surface, _rx) = coordinator();
    let now = Instant::now();
    let first = PanelInstanceId::new();
    let second = PanelInstanceId::new();
    coordinator.mark_ready(first, now).expect("ready");
    coordinator.mark_ready(second, now).expect("ready");

    coordinator.panel_closed(first);
    assert_eq!(coordinator.readiness(), PanelReadiness::Ready);
    assert_eq!(coordinator.current_panel(), Some(second));
}

#[test]
fn refused_open_drops_held_command() {
    let (mut coordinator, surface, _rx) = coordinator();
    surface.refuse.store(true, Ordering::SeqCst);
    coordinator
        .deliver(prompt("held"), Instant::now())
        .expect("deliver");

    let failed = coordinator.open().expect_err("surface refused");
    let dropped = failed.dropped.expect("held command dropped");
    assert_eq!(dropped.reason, DeliveryFailure::SurfaceUnavailable);
    assert!(coordinator.pending_deadline().is_none());
}

#[test]
fn closed_mailbox_reports_failure_and_resets_readiness() {
    let (mut coordinator, _surface, rx) = coordinator();
    let now = Instant::now();
    coordinator
        .mark_ready(PanelInstanceId::new(), now)
        .expect("ready");
    drop(rx);

    let dropped = coordinator
        .deliver(Command::info("lost"), now)
        .expect_err("mailbox closed");
    assert_eq!(dropped.reason, DeliveryFailure::MailboxClosed);
    assert_eq!(coordinator.readiness(), PanelReadiness::NotReady);
}
