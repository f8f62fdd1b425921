//! Popup and redirect guard

use gd_core::url::extract_host;

use crate::policy::SitePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupVerdict {
    /// The opener could not be resolved. Fail open.
    Unresolved,
    /// Filtering is off or the opener's host is whitelisted.
    Allow { source_host: String },
    /// Close the new target and count a block.
    Close { source_host: String },
}

/// Judge a new navigation target opened from a page at `source_url`.
pub fn judge(policy: &SitePolicy, source_url: Option<&str>) -> PopupVerdict {
    let Some(host) = source_url.and_then(extract_host) else {
        return PopupVerdict::Unresolved;
    };

    let source_host = host.to_ascii_lowercase();
    if policy.guards_popups_from(&source_host) {
        PopupVerdict::Close { source_host }
    } else {
        PopupVerdict::Allow { source_host }
    }
}
