pub mod background;
pub mod bus;
pub mod dedup;
pub mod executor;
pub mod notices;
pub mod panel;
pub mod router;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod settings;

pub use background::{BackgroundInput, BackgroundService, Trigger};
pub use executor::{PanelAction, PanelExecutor, PanelInput};
pub use notices::{ConnectionStatus, CoordinatorEvent, NoticeKind, PanelError, PanelNotice};
pub use panel::{PanelCoordinator, PanelReadiness, PanelSurface};
pub use runtime::{ExtensionRuntime, PageHandle};
pub use selection::{PageEvent, PageSurface, SelectionTracker};
pub use session::CabinetSessionState;
pub use settings::{CaddySettings, SettingsStore};
