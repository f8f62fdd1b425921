//! The coordinator
//!
//! Owns the engine state and drives the host collaborators. Handlers take
//! the state lock only to read or mutate and persist; fetching, replacing
//! rules and talking to tabs happen with the lock released, so every
//! handler re-reads what it needs after a suspend point.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use ts_rs::TS;

use gd_compiler::compile_sources;
use gd_core::types::RuleAction;
use gd_core::url::{extract_host, normalize_host};

use crate::config::{ConfigError, EngineConfig};
use crate::events::{EngineEvent, EventOutcome, PagePush, RefreshReport};
use crate::fetcher::{fetch_all, FetchError, ListFetcher};
use crate::host::{DeliveryError, HostBindings, HostError, PageMessage, TabId};
use crate::overrides::{OverrideError, OverrideRule};
use crate::policy::PageAction;
use crate::popup::{self, PopupVerdict};
use crate::state::EngineState;
use crate::store::{keys, save, KeyValueStore, StoreError};
use crate::sync::{SyncError, SyncOutcome, Synchronizer};
use crate::tabs::{BlockMark, RequestRecord};
use crate::telemetry::reflect_on_badge;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("Unknown filter list '{0}'")]
    UnknownSource(String),
    #[error("Cosmetic selector must not be empty")]
    EmptySelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub enabled: bool,
    #[ts(type = "number")]
    pub blocked_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub host: String,
    pub whitelisted: bool,
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    host: HostBindings,
    fetcher: Arc<dyn ListFetcher>,
    state: Mutex<EngineState>,
    sync: Synchronizer,
    refresh_gate: Mutex<()>,
}

impl Engine {
    /// Validate `config`, rehydrate state from `store` and show the counter.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        host: HostBindings,
        fetcher: Arc<dyn ListFetcher>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let state = EngineState::load(store.as_ref(), &config).await?;
        let count = state.counter.get();

        let engine = Self {
            sync: Synchronizer::new(host.surface.clone()),
            config,
            store,
            host,
            fetcher,
            state: Mutex::new(state),
            refresh_gate: Mutex::new(()),
        };
        reflect_on_badge(engine.host.badge.as_ref(), count, &engine.config.badge_color).await;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn dispatch(&self, event: EngineEvent) -> Result<EventOutcome, EngineError> {
        match event {
            EngineEvent::SourcesChanged => self.refresh().await.map(EventOutcome::Refreshed),
            EngineEvent::SetSourceEnabled { source_id, enabled } => self
                .set_source_enabled(&source_id, enabled)
                .await
                .map(EventOutcome::Refreshed),
            EngineEvent::AddOverride { domain, action } => {
                self.add_override(&domain, action).await.map(EventOutcome::OverrideAdded)
            }
            EngineEvent::RemoveOverride { domain } => {
                self.remove_override(&domain).await.map(EventOutcome::OverridesRemoved)
            }
            EngineEvent::ToggleGlobal => self.toggle_global().await.map(EventOutcome::GlobalEnabled),
            EngineEvent::ToggleWhitelist { host } => {
                let whitelisted = self.toggle_whitelist(&host).await?;
                Ok(EventOutcome::Whitelist {
                    host: normalize_host(&host),
                    whitelisted,
                })
            }
            EngineEvent::AddCosmeticRule { selector } => {
                let added = self.add_cosmetic_rule(&selector).await?;
                Ok(EventOutcome::CosmeticRuleAdded { added })
            }
            EngineEvent::PageLoaded { tab, url } => Ok(EventOutcome::Page(self.page_loaded(tab, &url).await)),
            EngineEvent::NavigationTargetCreated { source_tab, target_tab } => self
                .navigation_target_created(source_tab, target_tab)
                .await
                .map(EventOutcome::Popup),
            EngineEvent::RequestObserved { tab, request_id, url } => {
                Ok(EventOutcome::RequestLogged(self.request_observed(tab, &request_id, &url).await))
            }
            EngineEvent::RuleMatched { tab, request_id, url } => {
                self.rule_matched(tab, &request_id, &url).await.map(EventOutcome::Counted)
            }
            EngineEvent::TabClosed { tab } => Ok(EventOutcome::TabCleared(self.tab_closed(tab).await)),
        }
    }

    // =========================================================================
    // Lists and rules
    // =========================================================================

    /// Fetch every enabled list, compile, persist the selectors and sync.
    ///
    /// When every enabled list fails, the previous rules stay in place and
    /// no sync runs.
    pub async fn refresh(&self) -> Result<RefreshReport, EngineError> {
        let _gate = self.refresh_gate.lock().await;

        let sources = self.state.lock().await.enabled_sources(&self.config);
        log::info!("Refreshing {} filter lists", sources.len());

        let round = fetch_all(self.fetcher.as_ref(), &sources).await;
        let fetched: Vec<String> = round.texts.iter().map(|(id, _)| id.clone()).collect();
        let failed: Vec<String> = round.failures.iter().map(|(id, _)| id.clone()).collect();

        if !sources.is_empty() && fetched.is_empty() {
            log::error!("No filter list could be fetched, keeping the current rules");
            let state = self.state.lock().await;
            return Ok(RefreshReport {
                fetched,
                failed,
                network_rules: state.list_rules.len(),
                cosmetic_selectors: state.cosmetic_selectors.len(),
                sync: None,
            });
        }

        let (compiled, stats) = compile_sources(round.texts.iter().map(|(id, text)| (id.as_str(), text.as_str())));
        {
            let mut state = self.state.lock().await;
            save(self.store.as_ref(), keys::COSMETIC_RULES, &compiled.cosmetic_selectors).await?;
            state.list_rules = compiled.network_rules;
            state.cosmetic_selectors = compiled.cosmetic_selectors;
            state.lists_compiled = true;
        }

        let sync = self.synchronize().await?;
        log::info!(
            "Refresh done: {} network rules, {} cosmetic selectors from {} lists ({} failed)",
            stats.network_rules,
            stats.cosmetic_after,
            fetched.len(),
            failed.len()
        );

        Ok(RefreshReport {
            fetched,
            failed,
            network_rules: stats.network_rules,
            cosmetic_selectors: stats.cosmetic_after,
            sync: Some(sync),
        })
    }

    pub async fn set_source_enabled(&self, source_id: &str, enabled: bool) -> Result<RefreshReport, EngineError> {
        if self.config.source(source_id).is_none() {
            return Err(EngineError::UnknownSource(source_id.to_string()));
        }
        {
            let mut state = self.state.lock().await;
            let mut enabled_lists = state.enabled_lists.clone();
            enabled_lists.insert(source_id.to_string(), enabled);
            save(self.store.as_ref(), keys::ENABLED_LISTS, &enabled_lists).await?;
            state.enabled_lists = enabled_lists;
        }
        self.refresh().await
    }

    /// Install the current rules, coalescing with any run in flight.
    pub async fn synchronize(&self) -> Result<SyncOutcome, EngineError> {
        let outcome = self
            .sync
            .run_coalesced(move || async move { self.state.lock().await.sync_inputs() })
            .await?;
        Ok(outcome)
    }

    /// Sync after a rule or flag change. Before any list has been compiled
    /// this session a refresh runs first, so list rules are not replaced by
    /// an overrides-only set while the lists are still reachable. If that
    /// refresh could not fetch anything, the last known list rules are
    /// synced anyway so overrides and the enable flag still reach the host.
    async fn reconcile(&self) -> Result<SyncOutcome, EngineError> {
        let (enabled, compiled) = {
            let state = self.state.lock().await;
            (state.policy.is_enabled(), state.lists_compiled)
        };
        if enabled && !compiled {
            if let Some(sync) = self.refresh().await?.sync {
                return Ok(sync);
            }
            log::warn!("No filter list available, syncing overrides with the last known list rules");
        }
        self.synchronize().await
    }

    pub async fn add_override(&self, domain: &str, action: RuleAction) -> Result<OverrideRule, EngineError> {
        let rule = {
            let mut state = self.state.lock().await;
            let mut overrides = state.overrides.clone();
            let rule = overrides.add(domain, action)?;
            save(self.store.as_ref(), keys::USER_RULES, overrides.rules()).await?;
            save(self.store.as_ref(), keys::NEXT_USER_RULE_ID, &overrides.next_id()).await?;
            state.overrides = overrides;
            rule
        };
        log::info!("Added {} override for {} (id {})", rule.rule.action, rule.domain, rule.rule.id);

        self.reconcile().await?;
        Ok(rule)
    }

    pub async fn remove_override(&self, domain: &str) -> Result<usize, EngineError> {
        let removed = {
            let mut state = self.state.lock().await;
            let mut overrides = state.overrides.clone();
            let removed = overrides.remove(domain);
            if removed == 0 {
                return Ok(0);
            }
            save(self.store.as_ref(), keys::USER_RULES, overrides.rules()).await?;
            state.overrides = overrides;
            removed
        };
        log::info!("Removed {} overrides for {}", removed, domain.trim());

        self.reconcile().await?;
        Ok(removed)
    }

    // =========================================================================
    // Site policy
    // =========================================================================

    /// Flip global filtering. Returns the new state.
    pub async fn toggle_global(&self) -> Result<bool, EngineError> {
        let enabled = {
            let mut state = self.state.lock().await;
            let mut policy = state.policy.clone();
            let enabled = policy.toggle_enabled();
            save(self.store.as_ref(), keys::IS_ENABLED, &enabled).await?;
            state.policy = policy;
            enabled
        };
        if !enabled {
            log::info!("Filtering disabled");
        }

        self.reconcile().await?;
        Ok(enabled)
    }

    /// Flip the whitelist status of `host` and reload its tabs.
    pub async fn toggle_whitelist(&self, host: &str) -> Result<bool, EngineError> {
        let host = normalize_host(host);
        let whitelisted = {
            let mut state = self.state.lock().await;
            let mut policy = state.policy.clone();
            let whitelisted = policy.toggle_whitelist(&host);
            let hosts: Vec<&str> = policy.whitelist().collect();
            save(self.store.as_ref(), keys::WHITELIST, &hosts).await?;
            state.policy = policy;
            whitelisted
        };
        log::info!("Whitelist {} {}", if whitelisted { "added" } else { "removed" }, host);

        match self.host.tabs.tabs_showing(&host).await {
            Ok(tabs) => {
                for tab in tabs {
                    if let Err(e) = self.host.tabs.reload(tab).await {
                        log::warn!("Failed to reload tab {}: {}", tab, e);
                    }
                }
            }
            Err(e) => log::warn!("Failed to list tabs showing {}: {}", host, e),
        }

        Ok(whitelisted)
    }

    /// Remember a user-picked selector. Returns false if it was already known.
    pub async fn add_cosmetic_rule(&self, selector: &str) -> Result<bool, EngineError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(EngineError::EmptySelector);
        }

        let mut state = self.state.lock().await;
        if state.user_cosmetic_selectors.iter().any(|s| s == selector) {
            return Ok(false);
        }
        let mut selectors = state.user_cosmetic_selectors.clone();
        selectors.push(selector.to_string());
        save(self.store.as_ref(), keys::USER_COSMETIC_RULES, &selectors).await?;
        state.user_cosmetic_selectors = selectors;
        log::debug!("Added cosmetic rule {}", selector);
        Ok(true)
    }

    // =========================================================================
    // Page events
    // =========================================================================

    /// Push the cosmetic selectors to a freshly loaded page.
    pub async fn page_loaded(&self, tab: TabId, url: &str) -> PagePush {
        let Some(host) = extract_host(url) else {
            return PagePush::Skipped;
        };

        let selectors = {
            let state = self.state.lock().await;
            match state.policy.page_action(host) {
                PageAction::Disabled | PageAction::Whitelisted => return PagePush::Skipped,
                PageAction::Apply => state.cosmetic_union(),
            }
        };
        if selectors.is_empty() {
            return PagePush::Empty;
        }

        let count = selectors.len();
        let message = PageMessage::ApplyCosmeticRules { rules: selectors };
        match self.host.pages.send(tab, &message).await {
            Ok(()) => PagePush::Sent(count),
            Err(DeliveryError::NoReceiver(_)) => {
                log::debug!("No content script in tab {}", tab);
                PagePush::Undelivered
            }
            Err(e) => {
                log::error!("Failed to push cosmetic rules: {}", e);
                PagePush::Undelivered
            }
        }
    }

    /// Close popups and redirects opened from guarded pages.
    pub async fn navigation_target_created(
        &self,
        source_tab: TabId,
        target_tab: TabId,
    ) -> Result<PopupVerdict, EngineError> {
        let source_url = match self.host.tabs.tab_url(source_tab).await {
            Ok(url) => Some(url),
            Err(e) => {
                log::debug!("Could not resolve source tab {}: {}", source_tab, e);
                None
            }
        };

        let verdict = {
            let state = self.state.lock().await;
            popup::judge(&state.policy, source_url.as_deref())
        };
        if let PopupVerdict::Close { source_host } = &verdict {
            match self.host.tabs.close(target_tab).await {
                Ok(()) => {
                    log::info!("Blocked a popup/redirect from {}", source_host);
                    self.count_block().await?;
                }
                Err(e) => log::warn!("Failed to close popup tab {}: {}", target_tab, e),
            }
        }
        Ok(verdict)
    }

    pub async fn request_observed(&self, tab: TabId, request_id: &str, url: &str) -> bool {
        self.state.lock().await.requests.record(tab, request_id, url)
    }

    /// Count a block reported by the enforcement surface, once per request.
    pub async fn rule_matched(&self, tab: TabId, request_id: &str, url: &str) -> Result<Option<u64>, EngineError> {
        {
            let mut state = self.state.lock().await;
            if !state.policy.is_enabled() {
                return Ok(None);
            }
            if state.requests.mark_blocked(tab, request_id, url) == BlockMark::Duplicate {
                return Ok(None);
            }
        }
        log::debug!("Blocked {}", url);
        self.count_block().await.map(Some)
    }

    pub async fn tab_closed(&self, tab: TabId) -> usize {
        self.state.lock().await.requests.clear_tab(tab)
    }

    async fn count_block(&self) -> Result<u64, EngineError> {
        let count = {
            let mut state = self.state.lock().await;
            let mut counter = state.counter;
            let count = counter.increment();
            save(self.store.as_ref(), keys::TOTAL_BLOCKED, &count).await?;
            state.counter = counter;
            count
        };
        reflect_on_badge(self.host.badge.as_ref(), count, &self.config.badge_color).await;
        Ok(count)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn status(&self) -> EngineStatus {
        let state = self.state.lock().await;
        EngineStatus {
            enabled: state.policy.is_enabled(),
            blocked_count: state.counter.get(),
        }
    }

    pub async fn site_status(&self, host: &str) -> SiteStatus {
        let state = self.state.lock().await;
        SiteStatus {
            host: normalize_host(host),
            whitelisted: state.policy.is_whitelisted(host),
        }
    }

    pub async fn network_log(&self, tab: TabId) -> Vec<RequestRecord> {
        self.state.lock().await.requests.records(tab)
    }

    pub async fn overrides(&self) -> Vec<OverrideRule> {
        self.state.lock().await.overrides.rules().to_vec()
    }

    /// Selectors a page would receive right now.
    pub async fn cosmetic_selectors(&self) -> Vec<String> {
        self.state.lock().await.cosmetic_union()
    }

    pub async fn list_rule_count(&self) -> usize {
        self.state.lock().await.list_rules.len()
    }
}

#[cfg(test)]
mod tests {
    use gd_core::decide;
    use gd_core::types::{MatchDecision, ResourceTypes, RESERVED_OVERRIDE_ID_OFFSET};
    use serde_json::json;

    use super::*;
    use crate::fetcher::StaticFetcher;
    use crate::host::memory::{MemoryBadge, MemorySurface, MemoryTabs, RecordingPages};
    use crate::store::MemoryStore;

    const SAMPLE: &str = "||ads.example.com^\nexample.com##.sponsor-block\nnot a rule line";

    struct Harness {
        engine: Engine,
        store: Arc<MemoryStore>,
        surface: Arc<MemorySurface>,
        pages: Arc<RecordingPages>,
        tabs: Arc<MemoryTabs>,
        badge: Arc<MemoryBadge>,
    }

    async fn harness_with(store: Arc<MemoryStore>, fetcher: StaticFetcher, capacity: usize) -> Harness {
        let surface = Arc::new(MemorySurface::new(capacity));
        let pages = Arc::new(RecordingPages::new());
        let tabs = Arc::new(MemoryTabs::new());
        let badge = Arc::new(MemoryBadge::new());
        let host = HostBindings {
            surface: surface.clone(),
            pages: pages.clone(),
            tabs: tabs.clone(),
            badge: badge.clone(),
        };
        let engine = Engine::start(EngineConfig::default(), store.clone(), host, Arc::new(fetcher))
            .await
            .unwrap();
        Harness {
            engine,
            store,
            surface,
            pages,
            tabs,
            badge,
        }
    }

    async fn harness() -> Harness {
        harness_with(
            Arc::new(MemoryStore::new()),
            StaticFetcher::new().with_list("easylist", SAMPLE),
            5000,
        )
        .await
    }

    fn ids(surface: &MemorySurface) -> Vec<u32> {
        surface.rules().iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn refresh_installs_the_sample_list() {
        let h = harness().await;
        let report = h.engine.refresh().await.unwrap();

        assert_eq!(report.fetched, vec!["easylist"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.network_rules, 1);
        assert_eq!(report.cosmetic_selectors, 1);

        let rules = h.surface.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[0].priority, 1);
        assert_eq!(rules[0].action, RuleAction::Block);
        assert_eq!(rules[0].url_filter(), "||ads.example.com");

        assert_eq!(h.engine.cosmetic_selectors().await, vec![".sponsor-block"]);
        assert_eq!(h.store.snapshot().await[keys::COSMETIC_RULES], json!([".sponsor-block"]));
    }

    #[tokio::test]
    async fn allow_override_wins_over_list_block() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();

        let rule = h.engine.add_override("ads.example.com", RuleAction::Allow).await.unwrap();
        assert_eq!(rule.rule.id, RESERVED_OVERRIDE_ID_OFFSET);

        let active = h.surface.rules();
        assert_eq!(active.len(), 2);
        assert_eq!(
            decide(&active, "https://ads.example.com/banner.js", ResourceTypes::SCRIPT),
            MatchDecision::Allow
        );

        assert_eq!(h.engine.remove_override("ads.example.com").await.unwrap(), 1);
        assert_eq!(
            decide(&h.surface.rules(), "https://ads.example.com/banner.js", ResourceTypes::SCRIPT),
            MatchDecision::Block
        );
    }

    #[tokio::test]
    async fn empty_override_domain_is_rejected() {
        let h = harness().await;
        let err = h.engine.add_override("  ", RuleAction::Block).await.unwrap_err();
        assert!(matches!(err, EngineError::Override(OverrideError::EmptyDomain)));
        assert!(h.engine.overrides().await.is_empty());
    }

    #[tokio::test]
    async fn first_override_on_a_cold_start_refreshes_lists() {
        let h = harness().await;
        h.engine.add_override("cdn.example.org", RuleAction::Block).await.unwrap();

        assert_eq!(ids(&h.surface), vec![1, RESERVED_OVERRIDE_ID_OFFSET]);
        assert_eq!(h.engine.list_rule_count().await, 1);
    }

    #[tokio::test]
    async fn override_ids_survive_restart() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = || StaticFetcher::new().with_list("easylist", SAMPLE);

        let first = harness_with(store.clone(), fetcher(), 5000).await;
        first.engine.add_override("a.example", RuleAction::Block).await.unwrap();
        first.engine.add_override("b.example", RuleAction::Block).await.unwrap();
        first.engine.remove_override("a.example").await.unwrap();
        drop(first);

        let second = harness_with(store, fetcher(), 5000).await;
        let rule = second.engine.add_override("c.example", RuleAction::Allow).await.unwrap();

        assert_eq!(rule.rule.id, RESERVED_OVERRIDE_ID_OFFSET + 2);
        assert_eq!(
            ids(&second.surface),
            vec![1, RESERVED_OVERRIDE_ID_OFFSET + 1, RESERVED_OVERRIDE_ID_OFFSET + 2]
        );
    }

    #[tokio::test]
    async fn capacity_keeps_overrides_and_lowest_list_rules() {
        let list = "||a1.example^\n||a2.example^\n||a3.example^\n||a4.example^\n||a5.example^";
        let h = harness_with(
            Arc::new(MemoryStore::new()),
            StaticFetcher::new().with_list("easylist", list),
            3,
        )
        .await;

        let report = h.engine.refresh().await.unwrap();
        assert!(matches!(
            report.sync,
            Some(SyncOutcome::Replaced(crate::sync::SyncReport { truncated: 2, .. }))
        ));

        h.engine.add_override("ok.example", RuleAction::Allow).await.unwrap();
        assert_eq!(ids(&h.surface), vec![1, 2, RESERVED_OVERRIDE_ID_OFFSET]);
    }

    #[tokio::test]
    async fn global_toggle_restores_the_active_set() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();
        h.engine.add_override("cdn.example.org", RuleAction::Allow).await.unwrap();
        let before = h.surface.rules();

        assert_eq!(h.engine.dispatch(EngineEvent::ToggleGlobal).await.unwrap(), EventOutcome::GlobalEnabled(false));
        assert!(!h.surface.is_enabled());
        assert_eq!(h.surface.disable_calls(), 1);
        assert_eq!(h.store.snapshot().await[keys::IS_ENABLED], json!(false));

        assert_eq!(h.engine.dispatch(EngineEvent::ToggleGlobal).await.unwrap(), EventOutcome::GlobalEnabled(true));
        assert!(h.surface.is_enabled());
        assert_eq!(h.surface.rules(), before);
    }

    #[tokio::test]
    async fn partial_fetch_failure_still_compiles_the_rest() {
        let h = harness().await;
        let report = h.engine.set_source_enabled("easyprivacy", true).await.unwrap();

        assert_eq!(report.fetched, vec!["easylist"]);
        assert_eq!(report.failed, vec!["easyprivacy"]);
        assert_eq!(ids(&h.surface), vec![1]);
        assert_eq!(
            h.store.snapshot().await[keys::ENABLED_LISTS],
            json!({"easyprivacy": true})
        );
    }

    #[tokio::test]
    async fn total_fetch_failure_keeps_the_previous_rules() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();

        h.engine.set_source_enabled("easyprivacy", true).await.unwrap();
        let report = h.engine.set_source_enabled("easylist", false).await.unwrap();

        assert!(report.fetched.is_empty());
        assert_eq!(report.sync, None);
        assert_eq!(ids(&h.surface), vec![1]);
    }

    #[tokio::test]
    async fn no_enabled_sources_leaves_only_overrides() {
        let h = harness().await;
        h.engine.add_override("cdn.example.org", RuleAction::Block).await.unwrap();

        let report = h.engine.set_source_enabled("easylist", false).await.unwrap();
        assert!(report.fetched.is_empty());
        assert!(report.sync.is_some());
        assert_eq!(ids(&h.surface), vec![RESERVED_OVERRIDE_ID_OFFSET]);
    }

    #[tokio::test]
    async fn overrides_and_reenable_reach_the_host_when_no_list_fetches() {
        let h = harness_with(Arc::new(MemoryStore::new()), StaticFetcher::new(), 5000).await;

        h.engine.add_override("cdn.example.org", RuleAction::Block).await.unwrap();
        assert_eq!(ids(&h.surface), vec![RESERVED_OVERRIDE_ID_OFFSET]);
        assert_eq!(h.engine.list_rule_count().await, 0);

        assert!(!h.engine.toggle_global().await.unwrap());
        assert!(!h.surface.is_enabled());

        assert!(h.engine.toggle_global().await.unwrap());
        assert!(h.surface.is_enabled());
        assert!(h.engine.status().await.enabled);
        assert_eq!(ids(&h.surface), vec![RESERVED_OVERRIDE_ID_OFFSET]);
    }

    #[tokio::test]
    async fn failed_saves_leave_state_unchanged() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();
        h.tabs.open(1, "https://news.example.com/");
        h.store.reject_writes(true);

        assert!(matches!(h.engine.toggle_global().await, Err(EngineError::Store(_))));
        assert!(h.engine.status().await.enabled);
        assert!(h.surface.is_enabled());

        assert!(h.engine.add_override("cdn.example.org", RuleAction::Allow).await.is_err());
        assert!(h.engine.overrides().await.is_empty());
        assert_eq!(ids(&h.surface), vec![1]);

        assert!(h.engine.toggle_whitelist("news.example.com").await.is_err());
        assert!(!h.engine.site_status("news.example.com").await.whitelisted);
        assert!(h.tabs.reloaded().is_empty());

        assert!(h.engine.add_cosmetic_rule("#modal").await.is_err());
        assert!(h.engine.rule_matched(1, "r1", "https://ads.example.com/a.js").await.is_err());
        assert_eq!(h.engine.status().await.blocked_count, 0);
        assert_eq!(h.engine.cosmetic_selectors().await, vec![".sponsor-block"]);

        h.store.reject_writes(false);
        let rule = h.engine.add_override("cdn.example.org", RuleAction::Allow).await.unwrap();
        assert_eq!(rule.rule.id, RESERVED_OVERRIDE_ID_OFFSET);
        assert!(h.engine.add_cosmetic_rule("#modal").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let h = harness().await;
        let err = h.engine.set_source_enabled("nope", true).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn whitelisted_site_gets_no_push_and_no_popup_block() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();
        h.tabs.open(1, "https://news.example.com/today");
        h.tabs.open(2, "https://popup.example/offer");

        let outcome = h
            .engine
            .dispatch(EngineEvent::ToggleWhitelist {
                host: "news.example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Whitelist {
                host: "news.example.com".to_string(),
                whitelisted: true
            }
        );
        assert_eq!(h.tabs.reloaded(), vec![1]);

        assert_eq!(
            h.engine.page_loaded(1, "https://news.example.com/today").await,
            PagePush::Skipped
        );
        let verdict = h.engine.navigation_target_created(1, 2).await.unwrap();
        assert!(matches!(verdict, PopupVerdict::Allow { .. }));

        assert!(h.pages.sent().is_empty());
        assert!(h.tabs.closed().is_empty());
        assert_eq!(h.engine.status().await.blocked_count, 0);
        assert!(h.engine.site_status("news.example.com").await.whitelisted);
    }

    #[tokio::test]
    async fn page_load_pushes_list_and_user_selectors() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();
        assert!(h.engine.add_cosmetic_rule("#newsletter-modal").await.unwrap());
        assert!(!h.engine.add_cosmetic_rule("#newsletter-modal").await.unwrap());

        assert_eq!(h.engine.page_loaded(4, "https://shop.example.com/").await, PagePush::Sent(2));
        assert_eq!(
            h.pages.sent(),
            vec![(
                4,
                PageMessage::ApplyCosmeticRules {
                    rules: vec![".sponsor-block".to_string(), "#newsletter-modal".to_string()]
                }
            )]
        );

        h.pages.without_receiver(5);
        assert_eq!(h.engine.page_loaded(5, "https://shop.example.com/").await, PagePush::Undelivered);
        assert_eq!(h.engine.page_loaded(6, "about:blank").await, PagePush::Skipped);
    }

    #[tokio::test]
    async fn disabled_engine_pushes_nothing() {
        let h = harness().await;
        h.engine.refresh().await.unwrap();
        h.engine.toggle_global().await.unwrap();

        assert_eq!(h.engine.page_loaded(1, "https://shop.example.com/").await, PagePush::Skipped);
        assert!(h.pages.sent().is_empty());
    }

    #[tokio::test]
    async fn popups_are_closed_and_counted() {
        let h = harness().await;
        h.tabs.open(1, "https://shop.example.com/");
        h.tabs.open(2, "https://popup.example/");
        h.tabs.open(3, "https://other.example/");

        let verdict = h.engine.navigation_target_created(1, 2).await.unwrap();
        assert_eq!(
            verdict,
            PopupVerdict::Close {
                source_host: "shop.example.com".to_string()
            }
        );
        assert_eq!(h.tabs.closed(), vec![2]);
        assert_eq!(h.engine.status().await.blocked_count, 1);
        assert_eq!(h.badge.text(), "1");
        assert_eq!(h.badge.color(), "#e11d48");

        let verdict = h.engine.navigation_target_created(99, 3).await.unwrap();
        assert_eq!(verdict, PopupVerdict::Unresolved);
        assert_eq!(h.tabs.closed(), vec![2]);
    }

    #[tokio::test]
    async fn block_notifications_count_once_per_request() {
        let h = harness().await;
        let url = "https://ads.example.com/banner.js";

        assert!(h.engine.request_observed(7, "r1", url).await);
        assert_eq!(h.engine.rule_matched(7, "r1", url).await.unwrap(), Some(1));
        assert_eq!(h.engine.rule_matched(7, "r1", url).await.unwrap(), None);
        assert_eq!(h.engine.rule_matched(-1, "bg", url).await.unwrap(), Some(2));

        assert_eq!(h.badge.text(), "2");
        assert_eq!(h.store.snapshot().await[keys::TOTAL_BLOCKED], json!(2));

        let log = h.engine.network_log(7).await;
        assert_eq!(log.len(), 1);
        assert!(log[0].blocked);

        assert_eq!(
            h.engine.dispatch(EngineEvent::TabClosed { tab: 7 }).await.unwrap(),
            EventOutcome::TabCleared(1)
        );
        assert!(h.engine.network_log(7).await.is_empty());
    }

    #[tokio::test]
    async fn disabled_engine_counts_nothing() {
        let h = harness().await;
        h.engine.toggle_global().await.unwrap();

        assert_eq!(h.engine.rule_matched(7, "r1", "https://ads.example.com/").await.unwrap(), None);
        assert_eq!(
            h.engine.status().await,
            EngineStatus {
                enabled: false,
                blocked_count: 0
            }
        );
    }

    #[tokio::test]
    async fn counter_is_rehydrated_on_start() {
        let store = Arc::new(MemoryStore::new());
        save(store.as_ref(), keys::TOTAL_BLOCKED, &41u64).await.unwrap();

        let h = harness_with(store, StaticFetcher::new(), 5000).await;
        assert_eq!(h.badge.text(), "41");
        assert_eq!(h.engine.rule_matched(1, "r1", "https://ads.example.com/").await.unwrap(), Some(42));
    }
}
