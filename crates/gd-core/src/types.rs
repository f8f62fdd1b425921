//! Core type definitions for Guardian
//!
//! These types map directly to the rule JSON accepted by the host
//! enforcement surface and are used throughout the compiler and engine.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

// =============================================================================
// Priorities and ID ranges
// =============================================================================

/// Priority of every rule compiled from a filter list.
pub const LIST_RULE_PRIORITY: u32 = 1;

/// Priority of user overrides. Strictly above [`LIST_RULE_PRIORITY`].
pub const OVERRIDE_RULE_PRIORITY: u32 = 2;

/// First ID of the override range. List-derived IDs live in `1..OFFSET`.
pub const RESERVED_OVERRIDE_ID_OFFSET: u32 = 100_000;

/// Host anchor that prefixes every domain match pattern.
pub const HOST_ANCHOR: &str = "||";

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
///
/// Serialized the way the enforcement surface expects it: `{"type": "block"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleAction {
    /// Exception - allows the request
    Allow,
    /// Block rule - cancels the request
    Block,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown rule action: {0}")]
pub struct UnknownRuleAction(pub String);

impl FromStr for RuleAction {
    type Err = UnknownRuleAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "block" => Ok(Self::Block),
            _ => Err(UnknownRuleAction(s.to_string())),
        }
    }
}

// =============================================================================
// Resource Types (bit mask for type scoping)
// =============================================================================

bitflags::bitflags! {
    /// Resource type scope of a rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceTypes: u16 {
        const MAIN_FRAME = 1 << 0;     // main document
        const SUB_FRAME = 1 << 1;      // iframe/frame
        const SCRIPT = 1 << 2;
        const IMAGE = 1 << 3;
        const XMLHTTPREQUEST = 1 << 4;
        const STYLESHEET = 1 << 5;
        const OBJECT = 1 << 6;
        const MEDIA = 1 << 7;
        const FONT = 1 << 8;
        const PING = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const OTHER = 1 << 11;

        /// Fixed scope of every host-anchored rule
        const HOST_RULE_SCOPE = Self::MAIN_FRAME.bits()
            | Self::SUB_FRAME.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::STYLESHEET.bits()
            | Self::OBJECT.bits()
            | Self::MEDIA.bits();
    }
}

const RESOURCE_TYPE_NAMES: [(ResourceTypes, &str); 12] = [
    (ResourceTypes::MAIN_FRAME, "main_frame"),
    (ResourceTypes::SUB_FRAME, "sub_frame"),
    (ResourceTypes::SCRIPT, "script"),
    (ResourceTypes::IMAGE, "image"),
    (ResourceTypes::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceTypes::STYLESHEET, "stylesheet"),
    (ResourceTypes::OBJECT, "object"),
    (ResourceTypes::MEDIA, "media"),
    (ResourceTypes::FONT, "font"),
    (ResourceTypes::PING, "ping"),
    (ResourceTypes::WEBSOCKET, "websocket"),
    (ResourceTypes::OTHER, "other"),
];

impl ResourceTypes {
    /// Parse a single host resource type name.
    pub fn from_host_name(name: &str) -> Option<Self> {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Host names of every type in the set, in canonical order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }
}

impl Serialize for ResourceTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

impl<'de> Deserialize<'de> for ResourceTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.iter().try_fold(ResourceTypes::empty(), |acc, name| {
            ResourceTypes::from_host_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| D::Error::custom(format!("unknown resource type '{name}'")))
        })
    }
}

// =============================================================================
// Network Rules
// =============================================================================

/// Match condition of a network rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// Match pattern, e.g. `||ads.example.com`
    pub url_filter: String,
    /// Request kinds the rule applies to
    #[ts(type = "Array<string>")]
    pub resource_types: ResourceTypes,
}

/// A rule as installed on the enforcement surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NetworkRule {
    /// Unique across the whole active rule set
    pub id: u32,
    /// Higher wins on conflict
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl NetworkRule {
    /// Build a host-anchored rule over the fixed resource scope.
    pub fn host_anchored(id: u32, priority: u32, action: RuleAction, domain: &str) -> Self {
        Self {
            id,
            priority,
            action,
            condition: RuleCondition {
                url_filter: format!("{HOST_ANCHOR}{domain}"),
                resource_types: ResourceTypes::HOST_RULE_SCOPE,
            },
        }
    }

    pub fn url_filter(&self) -> &str {
        &self.condition.url_filter
    }

    /// The domain fragment of a host-anchored pattern.
    pub fn anchored_domain(&self) -> Option<&str> {
        self.condition.url_filter.strip_prefix(HOST_ANCHOR)
    }
}

// =============================================================================
// Parsed Entries
// =============================================================================

/// One recognized filter list line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParsedEntry {
    /// `||fragment^...`
    NetworkBlock { domain_fragment: String },
    /// `...##selector`
    CosmeticHide { selector: String },
}

// =============================================================================
// Filter List Sources
// =============================================================================

/// A remote filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FilterListSource {
    /// Stable key, used in `enabledFilterLists`
    pub id: String,
    /// Display name
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

// =============================================================================
// Match Decision
// =============================================================================

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// No rule matched, or an allow rule won
    Allow,
    /// A block rule won
    Block,
}

impl From<RuleAction> for MatchDecision {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => Self::Allow,
            RuleAction::Block => Self::Block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_anchored_rule_serializes_to_host_shape() {
        let rule = NetworkRule::host_anchored(1, LIST_RULE_PRIORITY, RuleAction::Block, "ads.example.com");
        let value = serde_json::to_value(&rule).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["priority"], 1);
        assert_eq!(value["action"]["type"], "block");
        assert_eq!(value["condition"]["urlFilter"], "||ads.example.com");
        assert_eq!(
            value["condition"]["resourceTypes"],
            serde_json::json!([
                "main_frame",
                "sub_frame",
                "script",
                "image",
                "xmlhttprequest",
                "stylesheet",
                "object",
                "media"
            ])
        );
    }

    #[test]
    fn rule_json_reads_back() {
        let json = r#"{"id":100000,"priority":2,"action":{"type":"allow"},
            "condition":{"urlFilter":"||cdn.example.org","resourceTypes":["script","image"]}}"#;
        let rule: NetworkRule = serde_json::from_str(json).unwrap();

        assert_eq!(rule.action, RuleAction::Allow);
        assert_eq!(rule.anchored_domain(), Some("cdn.example.org"));
        assert_eq!(
            rule.condition.resource_types,
            ResourceTypes::SCRIPT | ResourceTypes::IMAGE
        );
    }

    #[test]
    fn unknown_resource_type_is_rejected() {
        let json = r#"["script","teleport"]"#;
        assert!(serde_json::from_str::<ResourceTypes>(json).is_err());
    }

    #[test]
    fn resource_types_parse_host_names() {
        assert_eq!(ResourceTypes::from_host_name("main_frame"), Some(ResourceTypes::MAIN_FRAME));
        assert_eq!(ResourceTypes::from_host_name("xmlhttprequest"), Some(ResourceTypes::XMLHTTPREQUEST));
        assert_eq!(ResourceTypes::from_host_name("MAIN_FRAME"), None);
        assert_eq!(ResourceTypes::from_host_name("HOST_RULE_SCOPE"), None);
    }

    #[test]
    fn parses_rule_action_names() {
        assert_eq!("Allow".parse::<RuleAction>(), Ok(RuleAction::Allow));
        assert_eq!(" block ".parse::<RuleAction>(), Ok(RuleAction::Block));
        assert!("redirect".parse::<RuleAction>().is_err());
    }
}
