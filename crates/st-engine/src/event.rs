//! Focus and navigation events delivered by the host browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use st_core::{TabId, WindowId};

/// A focus-relevant change in the host browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocusEvent {
    /// A tab became the active tab of its window.
    TabActivated { tab_id: TabId, window_id: WindowId },
    /// A tab changed. Only URL changes matter for attribution.
    TabUpdated {
        tab_id: TabId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// A tab was closed.
    TabRemoved { tab_id: TabId },
    /// A window gained focus, or every browser window lost it (`None`).
    WindowFocusChanged {
        #[serde(default)]
        window_id: Option<WindowId>,
    },
}

/// One line of an event feed: an event plus, optionally, when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub event: FocusEvent,
}
