//! In-process wiring of the background, panel and page contexts.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use cabinet_client::CabinetApi;
use futures::future::join_all;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    background::{BackgroundInput, BackgroundService, Trigger},
    bus::{Mailbox, DEFAULT_MAILBOX_CAPACITY},
    executor::{PanelAction, PanelExecutor, PanelInput},
    notices::{CoordinatorEvent, PanelNotice},
    panel::{PanelCoordinator, PanelSurface},
    selection::{run_page_observer, PageEvent, PageSurface},
    settings::SettingsStore,
};

const NOTICE_CAPACITY: usize = 256;

type TaskList = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Starts the panel task on first open; later opens are no-ops.
struct InProcessPanel {
    launch: Mutex<Option<(PanelExecutor, mpsc::Receiver<PanelInput>)>>,
    tasks: TaskList,
}

impl PanelSurface for InProcessPanel {
    fn open(&self) -> anyhow::Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .context("panel can only be opened inside a tokio runtime")?;
        let mut launch = self
            .launch
            .lock()
            .map_err(|_| anyhow!("panel launcher lock poisoned"))?;
        let Some((executor, inbox)) = launch.take() else {
            debug!("panel already open");
            return Ok(());
        };
        let task = handle.spawn(executor.run(inbox));
        push_task(&self.tasks, task)
    }
}

fn push_task(tasks: &TaskList, task: JoinHandle<()>) -> anyhow::Result<()> {
    tasks
        .lock()
        .map_err(|_| anyhow!("task list lock poisoned"))?
        .push(task);
    Ok(())
}

#[derive(Clone)]
pub struct PageHandle {
    events: Mailbox<PageEvent>,
}

impl PageHandle {
    pub fn send(&self, event: PageEvent) -> bool {
        self.events.post(event)
    }
}

pub struct ExtensionRuntime {
    background: Mailbox<BackgroundInput>,
    panel_port: Mailbox<PanelInput>,
    notices: broadcast::Sender<PanelNotice>,
    events: broadcast::Sender<CoordinatorEvent>,
    tasks: TaskList,
}

impl ExtensionRuntime {
    /// Spawns the background context. The panel context starts the first
    /// time something opens the panel. Must be called inside a tokio runtime.
    pub fn launch(store: SettingsStore, api: Arc<dyn CabinetApi>) -> Self {
        let settings = store.settings().clone();
        let (background, background_inbox) =
            Mailbox::channel("background", DEFAULT_MAILBOX_CAPACITY);
        let (panel_port, panel_inbox) = Mailbox::channel("panel", DEFAULT_MAILBOX_CAPACITY);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (events, _) = broadcast::channel(NOTICE_CAPACITY);
        let tasks: TaskList = Arc::default();

        let executor = PanelExecutor::new(api, store, background.clone(), notices.clone());
        let session_feed = executor.session_feed();
        let surface = Arc::new(InProcessPanel {
            launch: Mutex::new(Some((executor, panel_inbox))),
            tasks: tasks.clone(),
        });
        let coordinator =
            PanelCoordinator::new(surface, panel_port.clone(), settings.readiness_timeout());
        let service = BackgroundService::new(coordinator, session_feed, events.clone());

        let background_task = tokio::spawn(service.run(background_inbox));
        if let Ok(mut list) = tasks.lock() {
            list.push(background_task);
        }
        info!(server_url = %settings.server_url, "extension runtime launched");

        Self {
            background,
            panel_port,
            notices,
            events,
            tasks,
        }
    }

    pub fn trigger(&self, trigger: Trigger) -> bool {
        self.background.post(BackgroundInput::Trigger(trigger))
    }

    pub fn panel_action(&self, action: PanelAction) -> bool {
        self.panel_port.post(PanelInput::action(action))
    }

    pub fn page(
        &self,
        tab_url: impl Into<String>,
        surface: Arc<dyn PageSurface>,
    ) -> anyhow::Result<PageHandle> {
        let (events, inbox) = Mailbox::channel("page", DEFAULT_MAILBOX_CAPACITY);
        let task = tokio::spawn(run_page_observer(
            tab_url.into(),
            surface,
            inbox,
            self.background.clone(),
        ));
        push_task(&self.tasks, task)?;
        Ok(PageHandle { events })
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<PanelNotice> {
        self.notices.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(self) {
        let tasks = match self.tasks.lock() {
            Ok(mut list) => std::mem::take(&mut *list),
            Err(_) => Vec::new(),
        };
        for task in &tasks {
            task.abort();
        }
        let stopped = join_all(tasks).await.len();
        info!(stopped, "extension runtime stopped");
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
