//! Engine state
//!
//! The single in-memory copy of everything the engine knows. It is loaded
//! from the store at startup and each mutation is written back under its key
//! before the lock is released.

use std::collections::BTreeMap;

use gd_core::types::{FilterListSource, NetworkRule};

use crate::config::EngineConfig;
use crate::overrides::{OverrideRule, OverrideStore};
use crate::policy::SitePolicy;
use crate::store::{keys, load_or, KeyValueStore, StoreError};
use crate::sync::SyncInputs;
use crate::tabs::TabRequestLog;
use crate::telemetry::BlockCounter;

#[derive(Debug)]
pub struct EngineState {
    pub policy: SitePolicy,
    pub counter: BlockCounter,
    pub overrides: OverrideStore,
    /// Persisted per-source switches; sources not listed use their configured default.
    pub enabled_lists: BTreeMap<String, bool>,
    /// Compiled list rules of the last successful refresh. Not persisted.
    pub list_rules: Vec<NetworkRule>,
    /// Whether a refresh has compiled lists during this session.
    pub lists_compiled: bool,
    pub cosmetic_selectors: Vec<String>,
    pub user_cosmetic_selectors: Vec<String>,
    pub requests: TabRequestLog,
}

impl EngineState {
    pub async fn load(store: &dyn KeyValueStore, config: &EngineConfig) -> Result<Self, StoreError> {
        let enabled = load_or(store, keys::IS_ENABLED, true).await?;
        let whitelist: Vec<String> = load_or(store, keys::WHITELIST, Vec::new()).await?;
        let count = load_or(store, keys::TOTAL_BLOCKED, 0u64).await?;
        let user_rules: Vec<OverrideRule> = load_or(store, keys::USER_RULES, Vec::new()).await?;
        let next_user_rule_id: Option<u32> = load_or(store, keys::NEXT_USER_RULE_ID, None).await?;
        let enabled_lists = load_or(store, keys::ENABLED_LISTS, BTreeMap::new()).await?;
        let cosmetic_selectors = load_or(store, keys::COSMETIC_RULES, Vec::new()).await?;
        let user_cosmetic_selectors = load_or(store, keys::USER_COSMETIC_RULES, Vec::new()).await?;

        let state = Self {
            policy: SitePolicy::new(enabled, whitelist),
            counter: BlockCounter::new(count),
            overrides: OverrideStore::from_persisted(user_rules, next_user_rule_id),
            enabled_lists,
            list_rules: Vec::new(),
            lists_compiled: false,
            cosmetic_selectors,
            user_cosmetic_selectors,
            requests: TabRequestLog::new(config.tab_log_limit),
        };
        log::debug!(
            "Loaded state: enabled={}, {} overrides, {} cosmetic selectors, count={}",
            state.policy.is_enabled(),
            state.overrides.len(),
            state.cosmetic_selectors.len(),
            state.counter.get()
        );
        Ok(state)
    }

    pub fn source_enabled(&self, source: &FilterListSource) -> bool {
        self.enabled_lists.get(&source.id).copied().unwrap_or(source.enabled)
    }

    /// Enabled sources in declared order.
    pub fn enabled_sources(&self, config: &EngineConfig) -> Vec<FilterListSource> {
        config
            .sources
            .iter()
            .filter(|s| self.source_enabled(s))
            .cloned()
            .collect()
    }

    /// List selectors followed by user selectors, without duplicates.
    pub fn cosmetic_union(&self) -> Vec<String> {
        let mut union = self.cosmetic_selectors.clone();
        for selector in &self.user_cosmetic_selectors {
            if !union.contains(selector) {
                union.push(selector.clone());
            }
        }
        union
    }

    pub fn sync_inputs(&self) -> SyncInputs {
        SyncInputs {
            enabled: self.policy.is_enabled(),
            list_rules: self.list_rules.clone(),
            overrides: self.overrides.network_rules(),
        }
    }
}

#[cfg(test)]
mod tests {
    use gd_core::types::RuleAction;

    use super::*;
    use crate::store::{save, MemoryStore};

    #[tokio::test]
    async fn fresh_store_loads_defaults() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let state = EngineState::load(&store, &config).await.unwrap();

        assert!(state.policy.is_enabled());
        assert_eq!(state.counter.get(), 0);
        assert!(state.overrides.is_empty());

        let ids: Vec<String> = state.enabled_sources(&config).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["easylist"]);
    }

    #[tokio::test]
    async fn persisted_values_are_rehydrated() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();

        let mut overrides = OverrideStore::new();
        overrides.add("ads.example.com", RuleAction::Allow).unwrap();

        save(&store, keys::IS_ENABLED, &false).await.unwrap();
        save(&store, keys::TOTAL_BLOCKED, &12u64).await.unwrap();
        save(&store, keys::WHITELIST, &["news.example.com"]).await.unwrap();
        save(&store, keys::USER_RULES, overrides.rules()).await.unwrap();
        save(&store, keys::NEXT_USER_RULE_ID, &overrides.next_id()).await.unwrap();
        save(&store, keys::ENABLED_LISTS, &BTreeMap::from([("easylist", false), ("easyprivacy", true)]))
            .await
            .unwrap();

        let state = EngineState::load(&store, &config).await.unwrap();

        assert!(!state.policy.is_enabled());
        assert_eq!(state.counter.get(), 12);
        assert!(state.policy.is_whitelisted("news.example.com"));
        assert_eq!(state.overrides.rules(), overrides.rules());
        assert_eq!(state.overrides.next_id(), overrides.next_id());

        let ids: Vec<String> = state.enabled_sources(&config).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["easyprivacy"]);
    }

    #[tokio::test]
    async fn cosmetic_union_keeps_list_order_first() {
        let store = MemoryStore::new();
        save(&store, keys::COSMETIC_RULES, &[".ad", "#banner"]).await.unwrap();
        save(&store, keys::USER_COSMETIC_RULES, &["#banner", ".promo"]).await.unwrap();

        let state = EngineState::load(&store, &EngineConfig::default()).await.unwrap();
        assert_eq!(state.cosmetic_union(), vec![".ad", "#banner", ".promo"]);
    }
}
