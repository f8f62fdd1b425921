//! Guardian Core Library
//!
//! This crate provides the shared rule model for the Guardian policy engine.
//! Everything that crosses a crate boundary (compiled network rules, parsed
//! filter list entries, filter list sources) is defined here, along with the
//! conflict resolution the host enforcement surface applies to those rules.
//!
//! # Modules
//!
//! - `types`: Rule, action, resource type and source definitions
//! - `url`: Allocation-free host extraction for page and request URLs
//! - `matcher`: Priority-based conflict resolution between network rules

pub mod matcher;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use matcher::{decide, resolve};
pub use types::{
    FilterListSource, MatchDecision, NetworkRule, ParsedEntry, ResourceTypes, RuleAction,
    RuleCondition, LIST_RULE_PRIORITY, OVERRIDE_RULE_PRIORITY, RESERVED_OVERRIDE_ID_OFFSET,
};
pub use url::extract_host;
