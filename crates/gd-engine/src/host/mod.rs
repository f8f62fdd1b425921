//! Host platform collaborators
//!
//! The engine never intercepts traffic or touches pages itself. It drives
//! these four host primitives: the enforcement surface that installs network
//! rules, the page channel that delivers cosmetic selectors, the tab API,
//! and the toolbar badge.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use ts_rs::TS;

use gd_core::types::NetworkRule;

/// Opaque host tab handle. Negative values are not tabs (background requests).
pub type TabId = i32;

/// Error type for host calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Host rejected the operation: {0}")]
    Rejected(String),
    #[error("Tab {0} not found")]
    TabNotFound(TabId),
    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// Failure to deliver a message to a page context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// No content script listening in that page. Expected, non-fatal.
    #[error("No receiver in tab {0}")]
    NoReceiver(TabId),
    #[error("Delivery to tab {tab} failed: {reason}")]
    Failed { tab: TabId, reason: String },
}

/// Messages pushed to a page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageMessage {
    ApplyCosmeticRules { rules: Vec<String> },
}

/// The subsystem that actually blocks or allows requests.
#[async_trait]
pub trait EnforcementSurface: Send + Sync {
    /// Maximum number of simultaneously active rules.
    fn capacity(&self) -> usize;

    async fn active_rule_ids(&self) -> Result<Vec<u32>, HostError>;

    /// Remove `remove_ids` and add `add_rules` as one atomic update.
    /// On error the previously active set must be left as it was.
    async fn replace_rules(&self, remove_ids: &[u32], add_rules: &[NetworkRule]) -> Result<(), HostError>;

    /// Enable or disable the whole rule namespace without touching its rules.
    async fn set_enabled(&self, enabled: bool) -> Result<(), HostError>;
}

#[async_trait]
pub trait PageChannel: Send + Sync {
    async fn send(&self, tab: TabId, message: &PageMessage) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// Current URL of a tab.
    async fn tab_url(&self, tab: TabId) -> Result<String, HostError>;

    /// Tabs whose current page is on `host`.
    async fn tabs_showing(&self, host: &str) -> Result<Vec<TabId>, HostError>;

    async fn reload(&self, tab: TabId) -> Result<(), HostError>;

    async fn close(&self, tab: TabId) -> Result<(), HostError>;
}

#[async_trait]
pub trait Badge: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<(), HostError>;

    async fn set_color(&self, color: &str) -> Result<(), HostError>;
}

/// Every host collaborator the engine drives.
#[derive(Clone)]
pub struct HostBindings {
    pub surface: Arc<dyn EnforcementSurface>,
    pub pages: Arc<dyn PageChannel>,
    pub tabs: Arc<dyn TabHost>,
    pub badge: Arc<dyn Badge>,
}
