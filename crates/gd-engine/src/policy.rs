//! Site policy
//!
//! Global enable flag plus the per-host whitelist. Every page-level decision
//! (cosmetic push, popup guard) goes through here.

use std::collections::BTreeSet;

use gd_core::url::normalize_host;

/// What to do for a page on a given host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    /// Filtering is off globally.
    Disabled,
    /// The host is whitelisted; leave the page alone.
    Whitelisted,
    /// Push cosmetic selectors and guard popups.
    Apply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePolicy {
    enabled: bool,
    whitelist: BTreeSet<String>,
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self::new(true, Vec::<String>::new())
    }
}

impl SitePolicy {
    pub fn new<I, S>(enabled: bool, whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            enabled,
            whitelist: whitelist
                .into_iter()
                .map(|h| normalize_host(h.as_ref()))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip the global flag. Returns the new value.
    pub fn toggle_enabled(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.whitelist.contains(&normalize_host(host))
    }

    /// Flip the whitelist status of `host`. Returns whether it is now whitelisted.
    pub fn toggle_whitelist(&mut self, host: &str) -> bool {
        let host = normalize_host(host);
        if self.whitelist.remove(&host) {
            false
        } else {
            self.whitelist.insert(host);
            true
        }
    }

    pub fn whitelist(&self) -> impl Iterator<Item = &str> {
        self.whitelist.iter().map(String::as_str)
    }

    pub fn page_action(&self, host: &str) -> PageAction {
        if !self.enabled {
            PageAction::Disabled
        } else if self.is_whitelisted(host) {
            PageAction::Whitelisted
        } else {
            PageAction::Apply
        }
    }

    /// Whether new navigation targets opened from `host` get closed.
    pub fn guards_popups_from(&self, host: &str) -> bool {
        self.page_action(host) == PageAction::Apply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_wins_over_whitelist() {
        let mut policy = SitePolicy::new(true, ["news.example.com"]);
        assert_eq!(policy.page_action("news.example.com"), PageAction::Whitelisted);
        assert_eq!(policy.page_action("shop.example.com"), PageAction::Apply);

        policy.set_enabled(false);
        assert_eq!(policy.page_action("news.example.com"), PageAction::Disabled);
        assert_eq!(policy.page_action("shop.example.com"), PageAction::Disabled);
        assert!(!policy.guards_popups_from("shop.example.com"));
    }

    #[test]
    fn whitelist_toggles_and_normalizes() {
        let mut policy = SitePolicy::default();

        assert!(policy.toggle_whitelist("News.Example.com."));
        assert!(policy.is_whitelisted("news.example.com"));
        assert!(!policy.guards_popups_from("news.example.com"));

        assert!(!policy.toggle_whitelist("news.example.com"));
        assert!(policy.guards_popups_from("news.example.com"));
        assert_eq!(policy.whitelist().count(), 0);
    }

    #[test]
    fn toggle_enabled_round_trips() {
        let mut policy = SitePolicy::default();
        assert!(!policy.toggle_enabled());
        assert!(policy.toggle_enabled());
    }
}
