//! Tab and window queries against the host browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use st_core::{TabId, WindowId};

use crate::event::FocusEvent;

/// A browser tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    /// Current URL. `None` while the host has not assigned one yet.
    #[serde(default)]
    pub url: Option<String>,
}

/// Host query failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("tab {0} not found")]
    TabNotFound(TabId),
    #[error("window {0} not found")]
    WindowNotFound(WindowId),
    #[error("host query failed: {0}")]
    Query(String),
}

/// Queries the router needs to resolve events into URLs.
#[async_trait]
pub trait HostBrowser: Send + Sync {
    /// Returns the tab with the given ID.
    async fn tab(&self, tab_id: TabId) -> Result<Tab, HostError>;

    /// Returns the active tab of a window, if it has one.
    async fn active_tab(&self, window_id: WindowId) -> Result<Option<Tab>, HostError>;

    /// Returns the active tab of the focused window, if any.
    async fn focused_tab(&self) -> Result<Option<Tab>, HostError>;
}

#[derive(Debug, Default)]
struct RegistryState {
    tabs: HashMap<TabId, Tab>,
    tab_windows: HashMap<TabId, WindowId>,
    active_by_window: HashMap<WindowId, TabId>,
    focused_window: Option<WindowId>,
}

/// In-memory model of the browser's tabs and windows, built from the same
/// events that drive the engine.
///
/// Feed every event to [`TabRegistry::observe`] before handing it to the
/// engine. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct TabRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>, HostError> {
        self.state
            .lock()
            .map_err(|_| HostError::Query("tab registry lock poisoned".to_string()))
    }

    /// Applies an event to the model.
    pub fn observe(&self, event: &FocusEvent) {
        let Ok(mut state) = self.lock() else {
            tracing::warn!("tab registry unavailable; event not recorded");
            return;
        };
        match event {
            FocusEvent::TabActivated { tab_id, window_id } => {
                state.tabs.entry(*tab_id).or_insert_with(|| Tab {
                    id: *tab_id,
                    url: None,
                });
                state.tab_windows.insert(*tab_id, *window_id);
                state.active_by_window.insert(*window_id, *tab_id);
                // Activation only happens in the window the user is looking at.
                state.focused_window = Some(*window_id);
            }
            FocusEvent::TabUpdated { tab_id, url } => {
                let tab = state.tabs.entry(*tab_id).or_insert_with(|| Tab {
                    id: *tab_id,
                    url: None,
                });
                if let Some(url) = url {
                    tab.url = Some(url.clone());
                }
            }
            FocusEvent::TabRemoved { tab_id } => {
                state.tabs.remove(tab_id);
                if let Some(window_id) = state.tab_windows.remove(tab_id) {
                    if state.active_by_window.get(&window_id) == Some(tab_id) {
                        state.active_by_window.remove(&window_id);
                    }
                }
            }
            FocusEvent::WindowFocusChanged { window_id } => {
                if let Some(window_id) = window_id {
                    state.focused_window = Some(*window_id);
                }
            }
        }
    }
}

#[async_trait]
impl HostBrowser for TabRegistry {
    async fn tab(&self, tab_id: TabId) -> Result<Tab, HostError> {
        self.lock()?
            .tabs
            .get(&tab_id)
            .cloned()
            .ok_or(HostError::TabNotFound(tab_id))
    }

    async fn active_tab(&self, window_id: WindowId) -> Result<Option<Tab>, HostError> {
        let state = self.lock()?;
        Ok(state
            .active_by_window
            .get(&window_id)
            .and_then(|tab_id| state.tabs.get(tab_id))
            .cloned())
    }

    async fn focused_tab(&self) -> Result<Option<Tab>, HostError> {
        let window_id = self.lock()?.focused_window;
        match window_id {
            Some(window_id) => self.active_tab(window_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activated(tab: i64, window: i64) -> FocusEvent {
        FocusEvent::TabActivated {
            tab_id: TabId(tab),
            window_id: WindowId(window),
        }
    }

    fn updated(tab: i64, url: &str) -> FocusEvent {
        FocusEvent::TabUpdated {
            tab_id: TabId(tab),
            url: Some(url.to_string()),
        }
    }

    #[tokio::test]
    async fn tracks_urls_and_active_tabs() {
        let registry = TabRegistry::new();
        registry.observe(&updated(1, "https://example.com/"));
        registry.observe(&activated(1, 10));

        let tab = registry.tab(TabId(1)).await.unwrap();
        assert_eq!(tab.url.as_deref(), Some("https://example.com/"));
        let active = registry.active_tab(WindowId(10)).await.unwrap().unwrap();
        assert_eq!(active.id, TabId(1));
        let focused = registry.focused_tab().await.unwrap().unwrap();
        assert_eq!(focused.id, TabId(1));
    }

    #[tokio::test]
    async fn removed_tab_is_not_found() {
        let registry = TabRegistry::new();
        registry.observe(&updated(1, "https://example.com/"));
        registry.observe(&activated(1, 10));
        registry.observe(&FocusEvent::TabRemoved { tab_id: TabId(1) });

        assert_eq!(
            registry.tab(TabId(1)).await,
            Err(HostError::TabNotFound(TabId(1)))
        );
        assert_eq!(registry.active_tab(WindowId(10)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn focus_follows_window_events() {
        let registry = TabRegistry::new();
        registry.observe(&updated(1, "https://a.com/"));
        registry.observe(&activated(1, 10));
        registry.observe(&updated(2, "https://b.com/"));
        registry.observe(&activated(2, 20));
        registry.observe(&FocusEvent::WindowFocusChanged {
            window_id: Some(WindowId(20)),
        });
        registry.observe(&FocusEvent::WindowFocusChanged { window_id: None });

        let focused = registry.focused_tab().await.unwrap().unwrap();
        assert_eq!(focused.id, TabId(2));
    }

    #[tokio::test]
    async fn activation_in_another_window_moves_focus() {
        let registry = TabRegistry::new();
        registry.observe(&updated(1, "https://a.com/"));
        registry.observe(&activated(1, 10));
        registry.observe(&updated(2, "https://b.com/"));
        registry.observe(&activated(2, 20));

        let focused = registry.focused_tab().await.unwrap().unwrap();
        assert_eq!(focused.id, TabId(2));

        registry.observe(&activated(1, 10));
        let focused = registry.focused_tab().await.unwrap().unwrap();
        assert_eq!(focused.id, TabId(1));
    }
}
