//! Rule Conflict Resolution
//!
//! Mirrors how the host enforcement surface picks a winner when several
//! installed rules match the same request: the highest priority wins, and
//! at equal priority an allow rule beats a block rule.

use crate::types::{MatchDecision, NetworkRule, ResourceTypes, RuleAction, HOST_ANCHOR};
use crate::url::{get_host_position, label_starts};

/// Find the rule that decides a request, if any rule matches.
pub fn resolve<'r>(
    rules: &'r [NetworkRule],
    url: &str,
    request_type: ResourceTypes,
) -> Option<&'r NetworkRule> {
    let mut best: Option<&NetworkRule> = None;

    for rule in rules {
        if !rule.condition.resource_types.intersects(request_type) {
            continue;
        }
        if !pattern_matches(rule.url_filter(), url) {
            continue;
        }
        if best.map_or(true, |current| outranks(rule, current)) {
            best = Some(rule);
        }
    }

    best
}

/// Final decision for a request. Unmatched requests are allowed.
pub fn decide(rules: &[NetworkRule], url: &str, request_type: ResourceTypes) -> MatchDecision {
    resolve(rules, url, request_type).map_or(MatchDecision::Allow, |rule| rule.action.into())
}

/// Does `url_filter` match `url`?
///
/// `||fragment` matches when the fragment is a prefix of the URL starting
/// at any hostname label boundary. Any other filter is a plain substring.
/// Matching is ASCII case-insensitive.
pub fn pattern_matches(url_filter: &str, url: &str) -> bool {
    match url_filter.strip_prefix(HOST_ANCHOR) {
        Some(fragment) => {
            let Some((host_start, host_end)) = get_host_position(url) else {
                return false;
            };
            let host = &url[host_start..host_end];
            label_starts(host).any(|offset| starts_with_ignore_case(&url[host_start + offset..], fragment))
        }
        None => find_case_insensitive(url.as_bytes(), url_filter.as_bytes()).is_some(),
    }
}

fn outranks(candidate: &NetworkRule, current: &NetworkRule) -> bool {
    if candidate.priority != current.priority {
        return candidate.priority > current.priority;
    }
    candidate.action == RuleAction::Allow && current.action == RuleAction::Block
}

fn starts_with_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len()
        && haystack.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
}

fn find_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
