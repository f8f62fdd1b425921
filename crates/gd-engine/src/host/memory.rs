//! In-memory host collaborators
//!
//! Used by the CLI to simulate a host and by tests to observe exactly what
//! the engine pushed. They enforce the same contracts a real host does:
//! replacements are atomic, IDs must be unique, capacity is a hard limit.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use gd_core::types::NetworkRule;
use gd_core::url::{extract_host, normalize_host};

use super::{Badge, DeliveryError, EnforcementSurface, HostError, PageChannel, PageMessage, TabHost, TabId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Enforcement surface
// =============================================================================

#[derive(Default)]
struct SurfaceState {
    rules: BTreeMap<u32, NetworkRule>,
    enabled: bool,
    replace_calls: usize,
    disable_calls: usize,
    failures_to_inject: usize,
}

pub struct MemorySurface {
    capacity: usize,
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(SurfaceState {
                enabled: true,
                ..SurfaceState::default()
            }),
        }
    }

    /// Start from an already populated rule set, as after a restart.
    pub fn with_rules(capacity: usize, rules: Vec<NetworkRule>) -> Self {
        let surface = Self::new(capacity);
        lock(&surface.state).rules = rules.into_iter().map(|r| (r.id, r)).collect();
        surface
    }

    /// Active rules in ID order.
    pub fn rules(&self) -> Vec<NetworkRule> {
        lock(&self.state).rules.values().cloned().collect()
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Successful replacements so far.
    pub fn replace_calls(&self) -> usize {
        lock(&self.state).replace_calls
    }

    pub fn disable_calls(&self) -> usize {
        lock(&self.state).disable_calls
    }

    /// Make the next `count` replacements fail without side effects.
    pub fn fail_next_replaces(&self, count: usize) {
        lock(&self.state).failures_to_inject = count;
    }
}

#[async_trait]
impl EnforcementSurface for MemorySurface {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn active_rule_ids(&self) -> Result<Vec<u32>, HostError> {
        Ok(lock(&self.state).rules.keys().copied().collect())
    }

    async fn replace_rules(&self, remove_ids: &[u32], add_rules: &[NetworkRule]) -> Result<(), HostError> {
        let mut state = lock(&self.state);

        if state.failures_to_inject > 0 {
            state.failures_to_inject -= 1;
            return Err(HostError::Rejected("injected failure".to_string()));
        }

        let mut next = state.rules.clone();
        for id in remove_ids {
            next.remove(id);
        }
        for rule in add_rules {
            if rule.id == 0 {
                return Err(HostError::Rejected("rule id must be positive".to_string()));
            }
            if next.insert(rule.id, rule.clone()).is_some() {
                return Err(HostError::Rejected(format!("duplicate rule id {}", rule.id)));
            }
        }
        if next.len() > self.capacity {
            return Err(HostError::Rejected(format!(
                "{} rules exceed capacity {}",
                next.len(),
                self.capacity
            )));
        }

        state.rules = next;
        state.replace_calls += 1;
        Ok(())
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if !enabled {
            state.disable_calls += 1;
        }
        state.enabled = enabled;
        Ok(())
    }
}

// =============================================================================
// Page channel
// =============================================================================

#[derive(Default)]
pub struct RecordingPages {
    sent: Mutex<Vec<(TabId, PageMessage)>>,
    deaf_tabs: Mutex<HashSet<TabId>>,
}

impl RecordingPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages in `tab` have no content script listening.
    pub fn without_receiver(&self, tab: TabId) {
        lock(&self.deaf_tabs).insert(tab);
    }

    /// Delivered messages, in order.
    pub fn sent(&self) -> Vec<(TabId, PageMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl PageChannel for RecordingPages {
    async fn send(&self, tab: TabId, message: &PageMessage) -> Result<(), DeliveryError> {
        if lock(&self.deaf_tabs).contains(&tab) {
            return Err(DeliveryError::NoReceiver(tab));
        }
        lock(&self.sent).push((tab, message.clone()));
        Ok(())
    }
}

// =============================================================================
// Tabs
// =============================================================================

#[derive(Default)]
pub struct MemoryTabs {
    open: Mutex<BTreeMap<TabId, String>>,
    reloaded: Mutex<Vec<TabId>>,
    closed: Mutex<Vec<TabId>>,
}

impl MemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, tab: TabId, url: &str) {
        lock(&self.open).insert(tab, url.to_string());
    }

    pub fn reloaded(&self) -> Vec<TabId> {
        lock(&self.reloaded).clone()
    }

    pub fn closed(&self) -> Vec<TabId> {
        lock(&self.closed).clone()
    }

    pub fn open_tabs(&self) -> BTreeSet<TabId> {
        lock(&self.open).keys().copied().collect()
    }
}

#[async_trait]
impl TabHost for MemoryTabs {
    async fn tab_url(&self, tab: TabId) -> Result<String, HostError> {
        lock(&self.open).get(&tab).cloned().ok_or(HostError::TabNotFound(tab))
    }

    async fn tabs_showing(&self, host: &str) -> Result<Vec<TabId>, HostError> {
        let wanted = normalize_host(host);
        Ok(lock(&self.open)
            .iter()
            .filter(|(_, url)| extract_host(url).is_some_and(|h| normalize_host(h) == wanted))
            .map(|(tab, _)| *tab)
            .collect())
    }

    async fn reload(&self, tab: TabId) -> Result<(), HostError> {
        if !lock(&self.open).contains_key(&tab) {
            return Err(HostError::TabNotFound(tab));
        }
        lock(&self.reloaded).push(tab);
        Ok(())
    }

    async fn close(&self, tab: TabId) -> Result<(), HostError> {
        if lock(&self.open).remove(&tab).is_none() {
            return Err(HostError::TabNotFound(tab));
        }
        lock(&self.closed).push(tab);
        Ok(())
    }
}

// =============================================================================
// Badge
// =============================================================================

#[derive(Default)]
pub struct MemoryBadge {
    text: Mutex<String>,
    color: Mutex<String>,
}

impl MemoryBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        lock(&self.text).clone()
    }

    pub fn color(&self) -> String {
        lock(&self.color).clone()
    }
}

#[async_trait]
impl Badge for MemoryBadge {
    async fn set_text(&self, text: &str) -> Result<(), HostError> {
        *lock(&self.text) = text.to_string();
        Ok(())
    }

    async fn set_color(&self, color: &str) -> Result<(), HostError> {
        *lock(&self.color) = color.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gd_core::types::{RuleAction, LIST_RULE_PRIORITY};

    use super::*;

    fn rule(id: u32) -> NetworkRule {
        NetworkRule::host_anchored(id, LIST_RULE_PRIORITY, RuleAction::Block, "ads.example.com")
    }

    #[tokio::test]
    async fn rejected_replace_leaves_rules_untouched() {
        let surface = MemorySurface::with_rules(2, vec![rule(1)]);

        let err = surface.replace_rules(&[], &[rule(1)]).await.unwrap_err();
        assert!(matches!(err, HostError::Rejected(_)));

        let err = surface.replace_rules(&[1], &[rule(2), rule(3), rule(4)]).await.unwrap_err();
        assert!(matches!(err, HostError::Rejected(_)));

        assert_eq!(surface.active_rule_ids().await.unwrap(), vec![1]);
        assert_eq!(surface.replace_calls(), 0);
    }

    #[tokio::test]
    async fn tabs_showing_matches_normalized_host() {
        let tabs = MemoryTabs::new();
        tabs.open(1, "https://News.Example.com/story");
        tabs.open(2, "https://example.com/");
        tabs.open(3, "about:blank");

        assert_eq!(tabs.tabs_showing("news.example.com").await.unwrap(), vec![1]);
    }
}
