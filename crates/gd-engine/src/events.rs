//! Engine inputs and their results
//!
//! Every host callback maps to one [`EngineEvent`]; [`crate::Engine::dispatch`]
//! handles it to completion and returns an [`EventOutcome`].

use gd_core::types::RuleAction;

use crate::host::TabId;
use crate::overrides::OverrideRule;
use crate::popup::PopupVerdict;
use crate::sync::SyncOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Re-fetch and recompile every enabled list.
    SourcesChanged,
    SetSourceEnabled { source_id: String, enabled: bool },
    AddOverride { domain: String, action: RuleAction },
    RemoveOverride { domain: String },
    ToggleGlobal,
    ToggleWhitelist { host: String },
    AddCosmeticRule { selector: String },
    PageLoaded { tab: TabId, url: String },
    NavigationTargetCreated { source_tab: TabId, target_tab: TabId },
    RequestObserved { tab: TabId, request_id: String, url: String },
    RuleMatched { tab: TabId, request_id: String, url: String },
    TabClosed { tab: TabId },
}

/// Summary of one list refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub fetched: Vec<String>,
    pub failed: Vec<String>,
    pub network_rules: usize,
    pub cosmetic_selectors: usize,
    /// `None` when nothing was fetched and the previous rules were kept.
    pub sync: Option<SyncOutcome>,
}

/// Result of a cosmetic push for one page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePush {
    /// Disabled, whitelisted, or no host.
    Skipped,
    /// No selectors to send.
    Empty,
    Sent(usize),
    /// The page had no listener, or delivery failed.
    Undelivered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Refreshed(RefreshReport),
    OverrideAdded(OverrideRule),
    OverridesRemoved(usize),
    GlobalEnabled(bool),
    Whitelist { host: String, whitelisted: bool },
    CosmeticRuleAdded { added: bool },
    Page(PagePush),
    Popup(PopupVerdict),
    /// New block total, or `None` when nothing was counted.
    Counted(Option<u64>),
    RequestLogged(bool),
    TabCleared(usize),
}
