//! User override rules
//!
//! Overrides are host-anchored allow/block rules the user adds per domain.
//! They sit one priority tier above every list-derived rule and take IDs
//! from the reserved range, so they never collide with list IDs and win
//! every conflict on the same pattern.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use gd_core::types::{NetworkRule, RuleAction, OVERRIDE_RULE_PRIORITY, RESERVED_OVERRIDE_ID_OFFSET};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    #[error("Override domain must not be empty")]
    EmptyDomain,
    #[error("Override ID space exhausted")]
    IdSpaceExhausted,
}

/// A user override as persisted under `userRules`: the installed rule plus
/// the domain it was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OverrideRule {
    pub domain: String,
    #[serde(flatten)]
    pub rule: NetworkRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideStore {
    rules: Vec<OverrideRule>,
    next_id: u32,
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverrideStore {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            next_id: RESERVED_OVERRIDE_ID_OFFSET,
        }
    }

    /// Rehydrate from persisted rules and the persisted allocation counter.
    ///
    /// The counter never moves backwards: it is at least one past every
    /// stored ID and at least `OFFSET + count`.
    pub fn from_persisted(rules: Vec<OverrideRule>, next_id: Option<u32>) -> Self {
        let past_max = rules
            .iter()
            .map(|o| o.rule.id.saturating_add(1))
            .max()
            .unwrap_or(RESERVED_OVERRIDE_ID_OFFSET);
        let by_count = RESERVED_OVERRIDE_ID_OFFSET.saturating_add(rules.len() as u32);
        let next_id = next_id
            .unwrap_or(RESERVED_OVERRIDE_ID_OFFSET)
            .max(past_max)
            .max(by_count);

        Self { rules, next_id }
    }

    pub fn add(&mut self, domain: &str, action: RuleAction) -> Result<OverrideRule, OverrideError> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(OverrideError::EmptyDomain);
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(OverrideError::IdSpaceExhausted)?;

        let entry = OverrideRule {
            domain: domain.to_string(),
            rule: NetworkRule::host_anchored(id, OVERRIDE_RULE_PRIORITY, action, domain),
        };
        self.rules.push(entry.clone());
        Ok(entry)
    }

    /// Remove every override for `domain`. Returns how many were removed.
    pub fn remove(&mut self, domain: &str) -> usize {
        let domain = domain.trim();
        let before = self.rules.len();
        self.rules.retain(|o| o.domain != domain);
        before - self.rules.len()
    }

    pub fn rules(&self) -> &[OverrideRule] {
        &self.rules
    }

    pub fn network_rules(&self) -> Vec<NetworkRule> {
        self.rules.iter().map(|o| o.rule.clone()).collect()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
