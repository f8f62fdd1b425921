//! Rule synchronizer
//!
//! Merges compiled list rules with user overrides, fits the result into the
//! surface capacity and installs it with one atomic full replace. Only one
//! run is in flight at a time; triggers that arrive mid-run collapse into a
//! single re-run that reads fresh inputs.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use gd_core::types::NetworkRule;

use crate::host::{EnforcementSurface, HostError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Rule replace failed after retry: {0}")]
    Host(#[source] HostError),
    #[error("Failed to switch the rule namespace: {0}")]
    Toggle(#[source] HostError),
    #[error("Rule id {0} appears more than once in the target set")]
    DuplicateRuleId(u32),
    #[error("{overrides} overrides exceed the surface capacity of {capacity}")]
    OverridesExceedCapacity { overrides: usize, capacity: usize },
}

/// Everything one run needs, read fresh from engine state.
#[derive(Debug, Clone, Default)]
pub struct SyncInputs {
    pub enabled: bool,
    pub list_rules: Vec<NetworkRule>,
    pub overrides: Vec<NetworkRule>,
}

/// The rule set to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    /// Surviving list rules in ID order, then every override
    pub rules: Vec<NetworkRule>,
    /// List rules dropped to fit the capacity
    pub truncated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: usize,
    pub added: usize,
    pub truncated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Filtering is off; the namespace was disabled and nothing else changed.
    Disabled,
    Replaced(SyncReport),
    /// Another run was in flight and will pick this trigger up.
    Coalesced,
}

/// Compute the target set for `capacity`.
///
/// Overrides are always kept. When the total exceeds the capacity, the
/// highest-ID list rules are dropped first.
pub fn plan_target(
    list_rules: &[NetworkRule],
    overrides: &[NetworkRule],
    capacity: usize,
) -> Result<TargetPlan, SyncError> {
    if overrides.len() > capacity {
        return Err(SyncError::OverridesExceedCapacity {
            overrides: overrides.len(),
            capacity,
        });
    }

    let mut list: Vec<&NetworkRule> = list_rules.iter().collect();
    list.sort_by_key(|r| r.id);

    let room = capacity - overrides.len();
    let truncated = list.len().saturating_sub(room);
    list.truncate(room);

    let mut seen = HashSet::with_capacity(list.len() + overrides.len());
    let mut rules = Vec::with_capacity(list.len() + overrides.len());
    for rule in list.into_iter().chain(overrides) {
        if !seen.insert(rule.id) {
            return Err(SyncError::DuplicateRuleId(rule.id));
        }
        rules.push(rule.clone());
    }

    Ok(TargetPlan { rules, truncated })
}

pub struct Synchronizer {
    surface: Arc<dyn EnforcementSurface>,
    running: Mutex<()>,
    rerun: AtomicBool,
}

impl Synchronizer {
    pub fn new(surface: Arc<dyn EnforcementSurface>) -> Self {
        Self {
            surface,
            running: Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn surface(&self) -> &Arc<dyn EnforcementSurface> {
        &self.surface
    }

    /// Run once with `inputs`, waiting for any in-flight run to finish first.
    pub async fn run(&self, inputs: &SyncInputs) -> Result<SyncOutcome, SyncError> {
        let _guard = self.running.lock().await;
        self.execute(inputs).await
    }

    /// Run with inputs from `read_inputs`, or mark a re-run if one is in flight.
    ///
    /// The caller holding the run loops until no trigger arrived during its
    /// last pass, reading inputs again each time.
    pub async fn run_coalesced<F, Fut>(&self, read_inputs: F) -> Result<SyncOutcome, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SyncInputs>,
    {
        let mut last = None;
        loop {
            let guard = match self.running.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    self.rerun.store(true, Ordering::SeqCst);
                    return last.unwrap_or(Ok(SyncOutcome::Coalesced));
                }
            };
            self.rerun.store(false, Ordering::SeqCst);

            let inputs = read_inputs().await;
            let result = self.execute(&inputs).await;
            drop(guard);

            if !self.rerun.load(Ordering::SeqCst) {
                return result;
            }
            log::debug!("Sync triggered mid-run, running again");
            last = Some(result);
        }
    }

    async fn execute(&self, inputs: &SyncInputs) -> Result<SyncOutcome, SyncError> {
        if !inputs.enabled {
            self.surface.set_enabled(false).await.map_err(SyncError::Toggle)?;
            log::info!("Filtering disabled, rule namespace switched off");
            return Ok(SyncOutcome::Disabled);
        }

        let plan = plan_target(&inputs.list_rules, &inputs.overrides, self.surface.capacity())?;
        if plan.truncated > 0 {
            log::warn!(
                "Rule set exceeds capacity {}, dropped {} list rules",
                self.surface.capacity(),
                plan.truncated
            );
        }

        let removed = match self.replace_all(&plan.rules).await {
            Ok(removed) => removed,
            Err(e) => {
                log::warn!("Rule replace rejected ({}), retrying once", e);
                self.replace_all(&plan.rules).await.map_err(SyncError::Host)?
            }
        };
        self.surface.set_enabled(true).await.map_err(SyncError::Toggle)?;

        let report = SyncReport {
            removed,
            added: plan.rules.len(),
            truncated: plan.truncated,
        };
        log::info!(
            "Installed {} rules ({} removed, {} truncated)",
            report.added,
            report.removed,
            report.truncated
        );
        Ok(SyncOutcome::Replaced(report))
    }

    async fn replace_all(&self, rules: &[NetworkRule]) -> Result<usize, HostError> {
        let active = self.surface.active_rule_ids().await?;
        self.surface.replace_rules(&active, rules).await?;
        Ok(active.len())
    }
}
