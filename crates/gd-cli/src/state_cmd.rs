//! `state` subcommands
//!
//! Runs the engine against a JSON state file with in-memory host
//! collaborators, so overrides, the whitelist and the global switch can be
//! inspected and changed from a shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gd_core::types::RuleAction;
use gd_engine::fetcher::{HttpFetcher, ListFetcher, StaticFetcher};
use gd_engine::host::memory::{MemoryBadge, MemorySurface, MemoryTabs, RecordingPages};
use gd_engine::{Engine, EngineConfig, HostBindings, JsonFileStore, RefreshReport, SyncOutcome};

pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(path).await.map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

/// Build a fetcher from `id=path` pairs, or fetch over HTTP when none are given.
pub fn build_fetcher(config: &EngineConfig, lists: &[String]) -> Result<Arc<dyn ListFetcher>, String> {
    if lists.is_empty() {
        let fetcher = HttpFetcher::new(&config.user_agent, config.fetch_timeout()).map_err(|e| e.to_string())?;
        return Ok(Arc::new(fetcher));
    }

    let mut fetcher = StaticFetcher::new();
    for entry in lists {
        let (id, path) = entry
            .split_once('=')
            .ok_or_else(|| format!("Expected ID=PATH, got '{}'", entry))?;
        let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        fetcher = fetcher.with_list(id, &text);
    }
    Ok(Arc::new(fetcher))
}

pub struct StateSession {
    pub engine: Engine,
    pub surface: Arc<MemorySurface>,
}

pub async fn open(state: &Path, config: Option<&PathBuf>, lists: &[String]) -> Result<StateSession, String> {
    let config = load_config(config.map(PathBuf::as_path)).await?;
    let fetcher = build_fetcher(&config, lists)?;

    let surface = Arc::new(MemorySurface::new(config.surface_capacity));
    let host = HostBindings {
        surface: surface.clone(),
        pages: Arc::new(RecordingPages::new()),
        tabs: Arc::new(MemoryTabs::new()),
        badge: Arc::new(MemoryBadge::new()),
    };
    let store = Arc::new(JsonFileStore::new(state));

    let engine = Engine::start(config, store, host, fetcher)
        .await
        .map_err(|e| e.to_string())?;
    Ok(StateSession { engine, surface })
}

impl StateSession {
    pub async fn status(&self) -> Result<(), String> {
        let status = self.engine.status().await;
        let overrides = self.engine.overrides().await;

        println!("Filtering:  {}", if status.enabled { "enabled" } else { "disabled" });
        println!("Blocked:    {}", status.blocked_count);
        println!("Selectors:  {}", self.engine.cosmetic_selectors().await.len());
        println!("Overrides:  {}", overrides.len());
        for entry in &overrides {
            println!("  [{}] {} {}", entry.rule.id, entry.rule.action, entry.domain);
        }
        Ok(())
    }

    pub async fn toggle(&self) -> Result<(), String> {
        let enabled = self.engine.toggle_global().await.map_err(|e| e.to_string())?;
        println!("Filtering {}", if enabled { "enabled" } else { "disabled" });
        self.print_installed();
        Ok(())
    }

    pub async fn whitelist(&self, host: &str) -> Result<(), String> {
        let whitelisted = self.engine.toggle_whitelist(host).await.map_err(|e| e.to_string())?;
        let site = self.engine.site_status(host).await;
        println!(
            "{} {} the whitelist",
            site.host,
            if whitelisted { "added to" } else { "removed from" }
        );
        Ok(())
    }

    pub async fn add_override(&self, domain: &str, action: &str) -> Result<(), String> {
        let action = action.parse::<RuleAction>().map_err(|e| e.to_string())?;
        let entry = self
            .engine
            .add_override(domain, action)
            .await
            .map_err(|e| e.to_string())?;
        println!("Added override [{}] {} {}", entry.rule.id, entry.rule.action, entry.domain);
        self.print_installed();
        Ok(())
    }

    pub async fn remove_override(&self, domain: &str) -> Result<(), String> {
        let removed = self.engine.remove_override(domain).await.map_err(|e| e.to_string())?;
        println!("Removed {} overrides for {}", removed, domain);
        if removed > 0 {
            self.print_installed();
        }
        Ok(())
    }

    pub async fn add_cosmetic(&self, selector: &str) -> Result<(), String> {
        let added = self.engine.add_cosmetic_rule(selector).await.map_err(|e| e.to_string())?;
        if added {
            println!("Added cosmetic rule {}", selector.trim());
        } else {
            println!("Cosmetic rule {} already present", selector.trim());
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<(), String> {
        let report = self.engine.refresh().await.map_err(|e| e.to_string())?;
        print_refresh(&report);
        self.print_installed();
        Ok(())
    }

    fn print_installed(&self) {
        let rules = self.surface.rules();
        let overrides = rules.iter().filter(|r| r.priority > gd_core::LIST_RULE_PRIORITY).count();
        println!(
            "Installed:  {} rules ({} list, {} override){}",
            rules.len(),
            rules.len() - overrides,
            overrides,
            if self.surface.is_enabled() { "" } else { ", namespace disabled" }
        );
    }
}

pub fn print_refresh(report: &RefreshReport) {
    println!("Fetched:    {}", report.fetched.join(", "));
    if !report.failed.is_empty() {
        println!("Failed:     {}", report.failed.join(", "));
    }
    println!("Network:    {}", report.network_rules);
    println!("Cosmetic:   {}", report.cosmetic_selectors);
    match report.sync {
        Some(SyncOutcome::Replaced(sync)) => {
            println!("Sync:       {} removed, {} added, {} truncated", sync.removed, sync.added, sync.truncated)
        }
        Some(SyncOutcome::Disabled) => println!("Sync:       filtering disabled"),
        Some(SyncOutcome::Coalesced) => println!("Sync:       queued behind a running sync"),
        None => println!("Sync:       skipped, previous rules kept"),
    }
}
