//! Tab bar visibility, shared by every screen of the shell.

use core_runtime::events::{CoreEvent, EventBus, UiEvent};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct UiStore {
    tab_bar_visible: Arc<watch::Sender<bool>>,
    events: Option<EventBus>,
}

impl UiStore {
    /// Visible tab bar, no event reporting.
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_events(events: EventBus) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<EventBus>) -> Self {
        let (tab_bar_visible, _) = watch::channel(true);
        Self {
            tab_bar_visible: Arc::new(tab_bar_visible),
            events,
        }
    }

    pub fn show(&self) {
        self.set_visible(true);
    }

    pub fn hide(&self) {
        self.set_visible(false);
    }

    pub fn set_visible(&self, visible: bool) {
        self.tab_bar_visible.send_replace(visible);
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Ui(UiEvent::TabBarVisibilityChanged { visible }));
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.tab_bar_visible.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tab_bar_visible.subscribe()
    }
}

impl Default for UiStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiStore")
            .field("tab_bar_visible", &self.is_visible())
            .finish()
    }
}
